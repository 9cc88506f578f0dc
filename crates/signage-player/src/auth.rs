use std::env;

use crate::error::PlayerError;

/// A bearer token plus the account identity it belongs to.
#[derive(Debug, Clone)]
pub struct AccessToken {
    pub token: String,
    pub account: String,
}

/// Seam for token acquisition.  The daemon reads from the environment; an
/// embedding host (kiosk shell, test harness) supplies its own source.
pub trait TokenProvider {
    fn acquire(&self) -> impl std::future::Future<Output = Result<AccessToken, PlayerError>> + Send;
}

/// Reads `SIGNAGE_TOKEN` and `SIGNAGE_ACCOUNT` from the environment.
/// Failure here is what drops the player into demo mode.
#[derive(Debug, Default)]
pub struct EnvTokenProvider;

impl TokenProvider for EnvTokenProvider {
    async fn acquire(&self) -> Result<AccessToken, PlayerError> {
        let token = env::var("SIGNAGE_TOKEN")
            .ok()
            .filter(|t| !t.trim().is_empty())
            .ok_or(PlayerError::AuthRequired)?;
        let account = env::var("SIGNAGE_ACCOUNT").unwrap_or_else(|_| "Signage Display".to_string());
        Ok(AccessToken { token, account })
    }
}
