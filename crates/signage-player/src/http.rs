use crate::core::PlayerEvent;
use crate::media::MediaSignal;
use axum::{
    extract::State,
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use serde::Serialize;
use signage_proto::state::PlayerState;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, RwLock};
use tracing::{error, info};

#[derive(Clone)]
struct HttpState {
    player_state: Arc<RwLock<PlayerState>>,
    event_tx: mpsc::Sender<PlayerEvent>,
}

/// Local HTTP surface: state snapshots for a display frontend, plus inbound
/// media signals and refresh requests.
pub fn start_server(
    bind_address: String,
    port: u16,
    player_state: Arc<RwLock<PlayerState>>,
    event_tx: mpsc::Sender<PlayerEvent>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let app_state = HttpState { player_state, event_tx };

        let app = Router::new()
            .route("/api/state", get(get_state))
            .route("/api/news", get(get_news))
            .route("/api/refresh", post(refresh).get(refresh))
            .route("/api/media/ready", post(media_ready))
            .route("/api/media/ended", post(media_ended))
            .route("/api/media/error", post(media_error))
            .with_state(app_state);

        let addr = format!("{}:{}", bind_address, port);
        let listener = match TcpListener::bind(&addr).await {
            Ok(l) => l,
            Err(e) => {
                error!("Failed to bind HTTP server to {}: {}", addr, e);
                return;
            }
        };

        info!("HTTP API listening on http://{}", addr);

        if let Err(e) = axum::serve(listener, app).await {
            error!("HTTP server error: {}", e);
        }
    })
}

#[derive(Serialize)]
struct NewsResponse {
    items: Vec<String>,
    source_available: bool,
}

async fn get_state(State(state): State<HttpState>) -> Json<PlayerState> {
    let snapshot = state.player_state.read().await.clone();
    Json(snapshot)
}

async fn get_news(State(state): State<HttpState>) -> Json<NewsResponse> {
    let snapshot = state.player_state.read().await;
    Json(NewsResponse {
        items: snapshot.news_items.clone(),
        source_available: snapshot.news_source_available,
    })
}

async fn refresh(State(state): State<HttpState>) -> StatusCode {
    info!("HTTP API: refresh requested");
    send_event(&state, PlayerEvent::Refresh).await
}

async fn media_ready(State(state): State<HttpState>) -> StatusCode {
    send_event(&state, PlayerEvent::Media(MediaSignal::Ready)).await
}

async fn media_ended(State(state): State<HttpState>) -> StatusCode {
    send_event(&state, PlayerEvent::Media(MediaSignal::Ended)).await
}

async fn media_error(State(state): State<HttpState>, body: String) -> StatusCode {
    send_event(&state, PlayerEvent::Media(MediaSignal::Error(body))).await
}

async fn send_event(state: &HttpState, event: PlayerEvent) -> StatusCode {
    if state.event_tx.send(event).await.is_err() {
        error!("Failed to forward event to the player core");
        return StatusCode::INTERNAL_SERVER_ERROR;
    }
    StatusCode::OK
}
