use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;
use tracing::debug;

use super::claims::read_unverified_claims;
use super::TokenPair;

/// Renew this long before the access token expires.
pub const REFRESH_LEAD: Duration = Duration::from_millis(60_000);

/// Never arm a timer shorter than this. Keeps an already-expired token from
/// driving a tight refresh loop.
pub const REFRESH_FLOOR: Duration = Duration::from_millis(5_000);

/// `max(FLOOR, exp*1000 - now - LEAD)` in milliseconds.
pub fn refresh_delay(exp_secs: i64, now_ms: i64) -> Duration {
    let lead = REFRESH_LEAD.as_millis() as i64;
    let floor = REFRESH_FLOOR.as_millis() as i64;
    let due = exp_secs.saturating_mul(1000).saturating_sub(now_ms).saturating_sub(lead);
    Duration::from_millis(due.max(floor) as u64)
}

struct PendingTimer {
    id: u64,
    handle: JoinHandle<()>,
}

/// Single one-shot timer that fires a proactive refresh shortly before the
/// access token expires.
///
/// Arming always replaces the previous timer. Once a timer fires it removes
/// itself from the slot before running its callback, so the callback may
/// re-arm or cancel without aborting itself.
#[derive(Default)]
pub struct RefreshScheduler {
    slot: Arc<Mutex<Option<PendingTimer>>>,
    next_id: AtomicU64,
}

impl RefreshScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay the timer for `pair` would use right now, or `None` when no
    /// timer should be armed (no refresh token, or no readable `exp`).
    pub fn delay_for(pair: &TokenPair) -> Option<Duration> {
        pair.refresh_token()?;
        let exp = read_unverified_claims(&pair.access_token)?.exp?;
        Some(refresh_delay(exp, Utc::now().timestamp_millis()))
    }

    /// Cancel any pending timer, then arm a new one for `pair`.
    ///
    /// Returns the armed delay, or `None` if nothing was armed. Must be called
    /// from within a Tokio runtime.
    pub fn schedule<F, Fut>(&self, pair: Option<&TokenPair>, on_fire: F) -> Option<Duration>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.cancel();

        let Some(delay) = pair.and_then(Self::delay_for) else {
            debug!("No usable expiry, proactive refresh not armed");
            return None;
        };

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let slot = Arc::clone(&self.slot);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            {
                let mut pending = lock(&slot);
                // Cancelled or replaced while we were waking up.
                if pending.as_ref().map(|p| p.id) != Some(id) {
                    return;
                }
                pending.take();
            }
            debug!("Proactive refresh timer fired");
            on_fire().await;
        });

        *lock(&self.slot) = Some(PendingTimer { id, handle });
        debug!(delay_ms = delay.as_millis() as u64, "Proactive refresh armed");
        Some(delay)
    }

    /// Abort the pending timer, if any. Returns whether one was pending.
    pub fn cancel(&self) -> bool {
        match lock(&self.slot).take() {
            Some(pending) => {
                pending.handle.abort();
                debug!("Proactive refresh timer cancelled");
                true
            }
            None => false,
        }
    }

    pub fn is_armed(&self) -> bool {
        lock(&self.slot).is_some()
    }
}

impl Drop for RefreshScheduler {
    fn drop(&mut self) {
        self.cancel();
    }
}

fn lock(slot: &Mutex<Option<PendingTimer>>) -> MutexGuard<'_, Option<PendingTimer>> {
    slot.lock().unwrap_or_else(|e| e.into_inner())
}
