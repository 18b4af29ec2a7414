use std::future::Future;

use reqwest::StatusCode;
use tracing::{debug, warn};

use super::{RefreshOutcome, SessionController, TokenPair};

/// Anything the gate can inspect for an authentication failure.
pub trait HasStatus {
    fn status(&self) -> StatusCode;
}

impl HasStatus for reqwest::Response {
    fn status(&self) -> StatusCode {
        reqwest::Response::status(self)
    }
}

/// Wraps outbound authenticated calls with one reactive refresh-and-retry.
///
/// The gate never turns a session problem into an error. Callers get either
/// the server's response or, for transport failures of their own request,
/// their own error type back; an expired session shows up as a transition to
/// `Session::Anonymous` on `SessionController::subscribe`.
#[derive(Clone)]
pub struct AuthenticatedRequestGate {
    session: SessionController,
}

impl AuthenticatedRequestGate {
    pub fn new(session: SessionController) -> Self {
        Self { session }
    }

    pub fn session(&self) -> &SessionController {
        &self.session
    }

    /// Send a request built by `send`, which receives the bearer token to put
    /// in `Authorization` (or `None` when there is no session).
    ///
    /// On 401 with a refresh token available: wait for the shared refresh, then
    /// retry exactly once with the new token and return whatever that yields.
    /// If the refresh fails, the original 401 is returned. 403 and every other
    /// status pass straight through.
    pub async fn execute<F, Fut, R, E>(&self, send: F) -> Result<R, E>
    where
        F: Fn(Option<String>) -> Fut,
        Fut: Future<Output = Result<R, E>>,
        R: HasStatus,
    {
        let used = self.session.tokens();
        let response = send(used.as_ref().map(|p| p.access_token.clone())).await?;

        if response.status() != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }

        let Some(used) = used.filter(TokenPair::has_refresh_token) else {
            debug!("401 with no refresh capability, returning response unchanged");
            return Ok(response);
        };

        let retry_token = match self.session.tokens() {
            // Someone else already renewed the session after this request left.
            Some(current) if current.access_token != used.access_token => current.access_token,
            _ => match self.session.refresh().await {
                RefreshOutcome::Renewed(pair) => pair.access_token,
                RefreshOutcome::Failed(e) => {
                    warn!(error = %e, "Reactive refresh failed, returning original response");
                    return Ok(response);
                }
            },
        };

        debug!("Retrying request with renewed access token");
        send(Some(retry_token)).await
    }
}
