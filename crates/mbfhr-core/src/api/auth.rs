use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use tracing::debug;

use crate::auth::{AuthBackend, LoginError, RefreshError, TokenPair};

#[derive(Serialize)]
struct LoginRequest<'a> {
    username: &'a str,
    password: &'a str,
}

#[derive(Serialize)]
struct RefreshRequest<'a> {
    refresh_token: &'a str,
}

/// `AuthBackend` over the server's `/api/auth` endpoints.
#[derive(Clone)]
pub struct HttpAuthBackend {
    client: Client,
    base_url: String,
}

impl HttpAuthBackend {
    /// `client` should carry a request timeout; the session layer adds its own
    /// bound on refresh on top.
    pub fn new(client: Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl AuthBackend for HttpAuthBackend {
    async fn login(&self, username: &str, password: &str) -> Result<TokenPair, LoginError> {
        let url = format!("{}/api/auth/login", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&LoginRequest { username, password })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            debug!(status = status.as_u16(), "Login rejected");
            return Err(LoginError::rejected(status.as_u16(), &body));
        }

        response
            .json::<TokenPair>()
            .await
            .map_err(|e| LoginError::InvalidResponse(e.to_string()))
    }

    async fn refresh(&self, refresh_token: &str) -> Result<TokenPair, RefreshError> {
        let url = format!("{}/api/auth/refresh", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&RefreshRequest { refresh_token })
            .send()
            .await
            .map_err(|e| RefreshError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            debug!(status = status.as_u16(), "Refresh rejected");
            return Err(RefreshError::Rejected {
                status: status.as_u16(),
            });
        }

        response
            .json::<TokenPair>()
            .await
            .map_err(|e| RefreshError::InvalidResponse(e.to_string()))
    }
}
