use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub remote: RemoteConfig,
    #[serde(default)]
    pub playback: PlaybackConfig,
    #[serde(default)]
    pub news: NewsConfig,
    #[serde(default)]
    pub http: HttpConfig,
}

/// Remote schedule/news source (an OData-style REST endpoint).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteConfig {
    #[serde(default = "default_api_base")]
    pub api_base: String,
    /// Optional table-name prefix applied to entity set names in queries.
    #[serde(default)]
    pub table_prefix: String,
    #[serde(default = "default_schedule_page_size")]
    pub schedule_page_size: u32,
    #[serde(default = "default_news_page_size")]
    pub news_page_size: u32,
    /// Bounded-retry settings shared by schedule and news loading.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_delay_secs")]
    pub retry_delay_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaybackConfig {
    /// Abandon a video that has produced no data after this long.
    #[serde(default = "default_media_timeout_secs")]
    pub media_timeout_secs: u64,
    /// Placeholder run length when a session has neither duration nor media.
    #[serde(default = "default_placeholder_duration_secs")]
    pub placeholder_duration_secs: u32,
    /// Refresh the schedule when it is older than this and nothing is playing.
    #[serde(default = "default_schedule_stale_secs")]
    pub schedule_stale_secs: u64,
    #[serde(default = "default_fallback_program_count")]
    pub fallback_program_count: u32,
    #[serde(default = "default_fallback_spacing_secs")]
    pub fallback_spacing_secs: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewsConfig {
    #[serde(default = "default_news_rotate_secs")]
    pub rotate_interval_secs: u64,
    #[serde(default = "default_news_refresh_secs")]
    pub refresh_interval_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_http_enabled")]
    pub enabled: bool,
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            api_base: default_api_base(),
            table_prefix: String::new(),
            schedule_page_size: default_schedule_page_size(),
            news_page_size: default_news_page_size(),
            max_retries: default_max_retries(),
            retry_delay_secs: default_retry_delay_secs(),
        }
    }
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            media_timeout_secs: default_media_timeout_secs(),
            placeholder_duration_secs: default_placeholder_duration_secs(),
            schedule_stale_secs: default_schedule_stale_secs(),
            fallback_program_count: default_fallback_program_count(),
            fallback_spacing_secs: default_fallback_spacing_secs(),
        }
    }
}

impl Default for NewsConfig {
    fn default() -> Self {
        Self {
            rotate_interval_secs: default_news_rotate_secs(),
            refresh_interval_secs: default_news_refresh_secs(),
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            enabled: default_http_enabled(),
            bind_address: default_bind_address(),
            port: default_port(),
        }
    }
}

fn default_api_base() -> String {
    "https://example.api.invalid/api/data/v9.2".to_string()
}

fn default_schedule_page_size() -> u32 {
    50
}

fn default_news_page_size() -> u32 {
    20
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_delay_secs() -> u64 {
    5
}

fn default_media_timeout_secs() -> u64 {
    15
}

fn default_placeholder_duration_secs() -> u32 {
    30
}

fn default_schedule_stale_secs() -> u64 {
    120
}

fn default_fallback_program_count() -> u32 {
    20
}

fn default_fallback_spacing_secs() -> u32 {
    30
}

fn default_news_rotate_secs() -> u64 {
    8
}

fn default_news_refresh_secs() -> u64 {
    300
}

fn default_http_enabled() -> bool {
    true
}

fn default_bind_address() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8990
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        let config_path = Self::config_path();

        if !config_path.exists() {
            let config = Self::default();
            config.save()?;
            return Ok(config);
        }

        let content = std::fs::read_to_string(&config_path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn save(&self) -> anyhow::Result<()> {
        let config_path = Self::config_path();
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(&config_path, content)?;
        Ok(())
    }

    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("signage")
            .join("config.toml")
    }

    pub fn data_dir() -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("signage")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.http.enabled);
        assert_eq!(config.http.port, 8990);
        assert_eq!(config.remote.schedule_page_size, 50);
        assert_eq!(config.remote.max_retries, 3);
        assert_eq!(config.playback.media_timeout_secs, 15);
        assert_eq!(config.news.rotate_interval_secs, 8);
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let config: Config = toml::from_str(
            r#"
            [playback]
            media_timeout_secs = 4
            "#,
        )
        .unwrap();
        assert_eq!(config.playback.media_timeout_secs, 4);
        assert_eq!(config.playback.fallback_program_count, 20);
        assert_eq!(config.remote.retry_delay_secs, 5);
    }

    #[test]
    fn test_config_round_trips_through_toml() {
        let config = Config::default();
        let text = toml::to_string_pretty(&config).unwrap();
        let back: Config = toml::from_str(&text).unwrap();
        assert_eq!(back.http.port, config.http.port);
        assert_eq!(back.playback.schedule_stale_secs, config.playback.schedule_stale_secs);
    }
}
