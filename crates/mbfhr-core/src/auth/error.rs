use std::time::Duration;

use thiserror::Error;

/// Why a login attempt did not produce a session.
#[derive(Error, Debug)]
pub enum LoginError {
    /// The server answered non-2xx. `message` is the server's `error` or
    /// `detail` field when it sent one.
    #[error("{message}")]
    Rejected { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Invalid login response: {0}")]
    InvalidResponse(String),
}

impl LoginError {
    /// Build a rejection from the error body, falling back to a generic
    /// message when the body carries neither `error` nor `detail`.
    pub fn rejected(status: u16, body: &str) -> Self {
        let parsed: Option<serde_json::Value> = serde_json::from_str(body).ok();
        let message = parsed
            .as_ref()
            .and_then(|v| {
                ["error", "detail"]
                    .iter()
                    .find_map(|key| v.get(*key).and_then(|m| m.as_str()))
            })
            .filter(|m| !m.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| format!("Login failed ({})", status));
        LoginError::Rejected { status, message }
    }
}

/// Why a refresh did not produce a new pair.
///
/// `Rejected`, `Transport`, `Timeout` and `InvalidResponse` all end the
/// session the same way. `Clone` because one outcome is handed to every
/// caller waiting on the same refresh.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RefreshError {
    #[error("Refresh rejected by server (status {status})")]
    Rejected { status: u16 },

    #[error("Refresh request failed: {0}")]
    Transport(String),

    #[error("Refresh timed out after {0:?}")]
    Timeout(Duration),

    #[error("Invalid refresh response: {0}")]
    InvalidResponse(String),

    #[error("No refresh token available")]
    NoRefreshToken,

    /// The session changed while the refresh was in flight; its result was
    /// discarded.
    #[error("Session changed during refresh")]
    Superseded,
}

impl RefreshError {
    /// Whether this failure ends the session it was attempted for.
    pub fn ends_session(&self) -> bool {
        !matches!(self, RefreshError::NoRefreshToken | RefreshError::Superseded)
    }
}
