use async_trait::async_trait;

use super::{LoginError, RefreshError, TokenPair};

/// Network side of authentication: exchanging credentials or a refresh token
/// for a new pair.
///
/// `api::HttpAuthBackend` talks to the real server; tests substitute fakes.
#[async_trait]
pub trait AuthBackend: Send + Sync {
    async fn login(&self, username: &str, password: &str) -> Result<TokenPair, LoginError>;

    /// Exchange `refresh_token` for a new pair. Callers bound this with their
    /// own timeout.
    async fn refresh(&self, refresh_token: &str) -> Result<TokenPair, RefreshError>;
}
