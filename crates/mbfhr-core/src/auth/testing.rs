//! Fakes shared by the session tests.

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use super::{AuthBackend, LoginError, RefreshError, TokenPair};

/// Scripted `AuthBackend` that records every refresh call.
pub(crate) struct FakeBackend {
    refresh_result: Mutex<Result<TokenPair, RefreshError>>,
    login_result: Mutex<Option<TokenPair>>,
    latency: Duration,
    refresh_calls: Mutex<Vec<String>>,
}

impl FakeBackend {
    pub(crate) fn renewing(pair: TokenPair) -> Self {
        Self::with_result(Ok(pair))
    }

    pub(crate) fn rejecting(status: u16) -> Self {
        Self::with_result(Err(RefreshError::Rejected { status }))
    }

    fn with_result(result: Result<TokenPair, RefreshError>) -> Self {
        Self {
            refresh_result: Mutex::new(result),
            login_result: Mutex::new(None),
            latency: Duration::ZERO,
            refresh_calls: Mutex::new(Vec::new()),
        }
    }

    /// Every refresh takes this long to answer.
    pub(crate) fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Successful logins hand out `pair`; without this every login is rejected.
    pub(crate) fn with_login(self, pair: TokenPair) -> Self {
        *self.login_result.lock().expect("lock") = Some(pair);
        self
    }

    pub(crate) fn set_refresh_result(&self, result: Result<TokenPair, RefreshError>) {
        *self.refresh_result.lock().expect("lock") = result;
    }

    pub(crate) fn refresh_calls(&self) -> Vec<String> {
        self.refresh_calls.lock().expect("lock").clone()
    }

    pub(crate) fn refresh_count(&self) -> usize {
        self.refresh_calls.lock().expect("lock").len()
    }
}

#[async_trait]
impl AuthBackend for FakeBackend {
    async fn login(&self, username: &str, password: &str) -> Result<TokenPair, LoginError> {
        let issued = self.login_result.lock().expect("lock").clone();
        match issued {
            Some(pair) if username == "admin" && password == "admin123" => Ok(pair),
            _ => Err(LoginError::rejected(401, r#"{"detail":"Invalid credentials"}"#)),
        }
    }

    async fn refresh(&self, refresh_token: &str) -> Result<TokenPair, RefreshError> {
        self.refresh_calls
            .lock()
            .expect("lock")
            .push(refresh_token.to_string());
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        self.refresh_result.lock().expect("lock").clone()
    }
}
