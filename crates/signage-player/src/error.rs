use thiserror::Error;

/// Player error taxonomy.  Media failures are always non-fatal — they
/// degrade the current session to placeholder rendering.  Fetch failures
/// are retried up to a bound, then degrade to fallback data.
#[derive(Debug, Error)]
pub enum PlayerError {
    #[error("a bearer token is required")]
    AuthRequired,

    #[error("authentication failed: {0}")]
    AuthFailed(String),

    #[error("fetch failed with HTTP {status}: {message}")]
    FetchFailed { status: u16, message: String },

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("malformed response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("the schedule contains no active programs")]
    ScheduleEmpty,

    #[error("media did not become ready before the timeout")]
    MediaLoadTimeout,

    #[error("media failure: {0}")]
    Media(String),

    #[error("not a playable media URL: {0}")]
    InvalidMediaUrl(String),
}
