use serde::{Deserialize, Serialize};

/// Access/refresh credential pair issued by the backend.
///
/// The access token is a compact signed token (three dot-separated base64url
/// segments). The refresh token is opaque to this crate.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPair {
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
}

impl TokenPair {
    pub fn new(access_token: impl Into<String>, refresh_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: Some(refresh_token.into()),
        }
    }

    /// A pair without a refresh capability. 401s on such a session are
    /// returned to the caller untouched.
    pub fn access_only(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: None,
        }
    }

    /// The refresh token, if one exists and is non-empty.
    pub fn refresh_token(&self) -> Option<&str> {
        self.refresh_token.as_deref().filter(|t| !t.is_empty())
    }

    pub fn has_refresh_token(&self) -> bool {
        self.refresh_token().is_some()
    }
}

// Tokens are credentials; keep them out of logs and panic messages.
impl std::fmt::Debug for TokenPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenPair")
            .field("access_token", &"<redacted>")
            .field(
                "refresh_token",
                &self.refresh_token.as_ref().map(|_| "<redacted>"),
            )
            .finish()
    }
}

/// Published session state.
///
/// Only `SessionController` produces new values; everything else observes
/// them through `SessionController::subscribe`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Session {
    Authenticated(TokenPair),
    #[default]
    Anonymous,
}

impl Session {
    pub fn is_authenticated(&self) -> bool {
        matches!(self, Session::Authenticated(_))
    }

    pub fn tokens(&self) -> Option<&TokenPair> {
        match self {
            Session::Authenticated(pair) => Some(pair),
            Session::Anonymous => None,
        }
    }
}

impl From<Option<TokenPair>> for Session {
    fn from(pair: Option<TokenPair>) -> Self {
        match pair {
            Some(pair) => Session::Authenticated(pair),
            None => Session::Anonymous,
        }
    }
}
