//! Session state owner.
//!
//! `SessionController` is the only place the session changes. It keeps the
//! published `Session`, the persisted pair and the proactive timer in
//! lock-step, and it owns the single in-flight refresh operation that both the
//! timer and the request gate attach to.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt, Shared};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::{
    AuthBackend, LoginError, RefreshError, RefreshScheduler, Session, TokenPair, TokenStore,
};

/// Upper bound on a single refresh call.
pub const DEFAULT_REFRESH_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub refresh_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            refresh_timeout: DEFAULT_REFRESH_TIMEOUT,
        }
    }
}

/// Settled result of a refresh, identical for every caller that waited on it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshOutcome {
    Renewed(TokenPair),
    Failed(RefreshError),
}

type RefreshOperation = Shared<BoxFuture<'static, RefreshOutcome>>;

/// Cheap to clone; all clones drive the same session.
#[derive(Clone)]
pub struct SessionController {
    inner: Arc<Inner>,
}

struct Inner {
    store: TokenStore,
    scheduler: RefreshScheduler,
    backend: Arc<dyn AuthBackend>,
    config: SessionConfig,
    state: watch::Sender<Session>,
    // Serializes transitions so check-then-commit is atomic.
    transition: Mutex<()>,
    in_flight: Mutex<Option<RefreshOperation>>,
}

impl SessionController {
    /// Build a controller and restore whatever session `store` holds.
    ///
    /// A restored pair arms the proactive timer, so this must run inside a
    /// Tokio runtime.
    pub fn start(store: TokenStore, backend: Arc<dyn AuthBackend>, config: SessionConfig) -> Self {
        let restored = store.get();
        let inner = Arc::new(Inner {
            store,
            scheduler: RefreshScheduler::new(),
            backend,
            config,
            state: watch::Sender::new(Session::Anonymous),
            transition: Mutex::new(()),
            in_flight: Mutex::new(None),
        });

        if let Some(pair) = restored {
            info!("Restoring persisted session");
            let _guard = lock(&inner.transition);
            inner.apply(Some(pair));
        }

        Self { inner }
    }

    /// Observe session transitions. The receiver starts at the current value.
    pub fn subscribe(&self) -> watch::Receiver<Session> {
        self.inner.state.subscribe()
    }

    pub fn session(&self) -> Session {
        self.inner.state.borrow().clone()
    }

    pub fn tokens(&self) -> Option<TokenPair> {
        self.inner.current_tokens()
    }

    pub fn is_authenticated(&self) -> bool {
        self.inner.state.borrow().is_authenticated()
    }

    /// Replace the session. `None` logs out.
    pub fn set_session(&self, pair: Option<TokenPair>) {
        let _guard = lock(&self.inner.transition);
        self.inner.apply(pair);
    }

    pub fn clear_session(&self) {
        self.set_session(None);
    }

    /// Exchange credentials for a session. On failure the session is left as
    /// it was.
    pub async fn login(&self, username: &str, password: &str) -> Result<(), LoginError> {
        let pair = self.inner.backend.login(username, password).await?;
        info!(username = username, "Login succeeded");
        self.set_session(Some(pair));
        Ok(())
    }

    pub fn logout(&self) {
        info!("Logging out");
        self.clear_session();
    }

    /// Refresh the session, joining the in-flight refresh if there is one.
    ///
    /// The outcome has already been committed to the session by the time this
    /// returns: `Renewed` means the new pair is live, a session-ending
    /// `Failed` means the session is now `Anonymous`.
    pub async fn refresh(&self) -> RefreshOutcome {
        Inner::refresh_operation(&self.inner).await
    }

    pub fn refresh_in_flight(&self) -> bool {
        lock(&self.inner.in_flight).is_some()
    }

    /// Whether a proactive refresh timer is pending.
    pub fn timer_armed(&self) -> bool {
        self.inner.scheduler.is_armed()
    }
}

impl Inner {
    /// Caller must hold `transition`.
    fn apply(self: &Arc<Self>, pair: Option<TokenPair>) {
        match pair {
            None => {
                self.store.clear();
                self.scheduler.cancel();
                self.state.send_replace(Session::Anonymous);
                info!("Session cleared");
            }
            Some(pair) => {
                self.store.set(pair.clone());
                let weak = Arc::downgrade(self);
                self.scheduler.schedule(Some(&pair), move || async move {
                    if let Some(inner) = weak.upgrade() {
                        let outcome = Inner::refresh_operation(&inner).await;
                        debug!(
                            renewed = matches!(outcome, RefreshOutcome::Renewed(_)),
                            "Proactive refresh settled"
                        );
                    }
                });
                self.state.send_replace(Session::Authenticated(pair));
                debug!("Session updated");
            }
        }
    }

    fn current_tokens(&self) -> Option<TokenPair> {
        self.state.borrow().tokens().cloned()
    }

    fn current_refresh_token(&self) -> Option<String> {
        self.current_tokens()
            .and_then(|pair| pair.refresh_token().map(str::to_string))
    }

    /// The shared refresh, starting one if none is outstanding.
    fn refresh_operation(self: &Arc<Self>) -> RefreshOperation {
        let mut slot = lock(&self.in_flight);
        if let Some(op) = slot.as_ref() {
            debug!("Joining in-flight refresh");
            return op.clone();
        }

        let Some(refresh_token) = self.current_refresh_token() else {
            return futures::future::ready(RefreshOutcome::Failed(RefreshError::NoRefreshToken))
                .boxed()
                .shared();
        };

        // Spawned so the refresh settles and commits even if every waiter
        // goes away.
        let inner = Arc::clone(self);
        let task = tokio::spawn(async move { inner.run_refresh(refresh_token).await });
        let op = async move {
            task.await.unwrap_or_else(|e| {
                let reason = format!("refresh task failed: {}", e);
                RefreshOutcome::Failed(RefreshError::Transport(reason))
            })
        }
        .boxed()
        .shared();

        *slot = Some(op.clone());
        op
    }

    async fn run_refresh(self: Arc<Self>, refresh_token: String) -> RefreshOutcome {
        info!("Refreshing session tokens");
        let timeout = self.config.refresh_timeout;
        let call = self.backend.refresh(&refresh_token);
        let result = match tokio::time::timeout(timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(RefreshError::Timeout(timeout)),
        };

        // Non-rotating servers answer with an access token only.
        let result = result.map(|mut pair| {
            if !pair.has_refresh_token() {
                pair.refresh_token = Some(refresh_token.clone());
            }
            pair
        });

        let outcome = self.commit(&refresh_token, result);
        *lock(&self.in_flight) = None;
        outcome
    }

    /// Apply a refresh result, unless the session moved on while it was in
    /// flight.
    fn commit(
        self: &Arc<Self>,
        used: &str,
        result: Result<TokenPair, RefreshError>,
    ) -> RefreshOutcome {
        let _guard = lock(&self.transition);
        if self.current_refresh_token().as_deref() != Some(used) {
            debug!("Session changed during refresh, discarding result");
            return RefreshOutcome::Failed(RefreshError::Superseded);
        }

        match result {
            Ok(pair) => {
                info!("Session tokens refreshed");
                self.apply(Some(pair.clone()));
                RefreshOutcome::Renewed(pair)
            }
            Err(e) => {
                warn!(error = %e, "Refresh failed, ending session");
                self.apply(None);
                RefreshOutcome::Failed(e)
            }
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}
