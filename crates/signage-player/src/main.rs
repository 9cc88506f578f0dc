mod auth;
mod clock;
mod core;
mod engine;
mod error;
mod http;
mod media;
mod news;
mod repository;
mod retry;

use signage_proto::config::Config;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // File logging — the terminal stays free for whatever launched us.
    let data_dir = Config::data_dir();
    std::fs::create_dir_all(&data_dir)?;
    let log_path = data_dir.join("player.log");

    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)?;

    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_ansi(false)
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,signage_player=debug")),
        )
        .init();

    info!("Log file: {:?}", log_path);

    let config = Config::load()?;
    info!("Config loaded from: {:?}", Config::config_path());

    // Event channel — all external inputs funnel into the player core
    let (event_tx, event_rx) = tokio::sync::mpsc::channel::<core::PlayerEvent>(256);

    let mut player = core::PlayerCore::new(
        config.clone(),
        media::LogBackend::default(),
        event_tx.clone(),
    )?;
    player.init(&auth::EnvTokenProvider).await;

    if config.http.enabled {
        let _http_handle = http::start_server(
            config.http.bind_address.clone(),
            config.http.port,
            player.state_manager().arc(),
            event_tx.clone(),
        );
    }

    info!("Player initialised, running event loop");
    player.run(event_rx).await?;

    Ok(())
}
