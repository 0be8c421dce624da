//! Server-driven submission cooldown
//!
//! A rate-limit response arms a `RateLimitWindow`. While it is active the
//! orchestrator refuses submissions. A single tick task publishes the
//! remaining whole seconds on a watch channel for the countdown display and
//! stops itself at zero. Arming again replaces the window and the task.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::error::mapping::MAX_RETRY_AFTER;

/// Snapshot of the cooldown window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitWindow {
    pub active: bool,
    pub expires_at: Instant,
}

struct Shared {
    expires_at: Mutex<Option<Instant>>,
    remaining_tx: watch::Sender<u64>,
}

impl Shared {
    /// Drop the window if it is still the one that expired
    fn clear_if(&self, expires_at: Instant) {
        let mut window = self.expires_at.lock();
        if *window == Some(expires_at) {
            *window = None;
        }
    }
}

/// Tracks the active cooldown and drives its countdown
pub struct RateLimiter {
    shared: Arc<Shared>,
    tick_interval: Duration,
    ticker: Mutex<Option<JoinHandle<()>>>,
}

impl RateLimiter {
    pub fn new(tick_interval: Duration) -> Self {
        let (remaining_tx, _) = watch::channel(0);

        Self {
            shared: Arc::new(Shared {
                expires_at: Mutex::new(None),
                remaining_tx,
            }),
            tick_interval,
            ticker: Mutex::new(None),
        }
    }

    /// Arm (or re-arm) the cooldown for `retry_after` from now.
    ///
    /// Any previous window and its countdown task are replaced, never
    /// stacked. Outside a Tokio runtime the window is still enforced but
    /// the countdown channel is not ticked. The window never exceeds
    /// `MAX_RETRY_AFTER`.
    pub fn observe(&self, retry_after: Duration) {
        let retry_after = retry_after.min(MAX_RETRY_AFTER);
        let now = Instant::now();
        let expires_at = now.checked_add(retry_after).unwrap_or(now);
        *self.shared.expires_at.lock() = Some(expires_at);
        self.shared.remaining_tx.send_replace(remaining_secs(expires_at));

        log::info!("Assistant rate limit armed for {}s", retry_after.as_secs_f64().ceil());

        let mut ticker = self.ticker.lock();
        if let Some(previous) = ticker.take() {
            previous.abort();
        }

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let shared = Arc::clone(&self.shared);
                *ticker = Some(handle.spawn(countdown(shared, expires_at, self.tick_interval)));
            }
            Err(_) => log::warn!("No Tokio runtime; rate-limit countdown will not tick"),
        }
    }

    /// Whether submissions are currently refused
    pub fn is_blocked(&self) -> bool {
        matches!(*self.shared.expires_at.lock(), Some(expires_at) if Instant::now() < expires_at)
    }

    /// Whole seconds until the window closes, rounded up; 0 when inactive
    pub fn remaining_seconds(&self) -> u64 {
        self.shared.expires_at.lock().map(remaining_secs).unwrap_or(0)
    }

    /// Current window, if one has been armed and not yet cleared
    pub fn window(&self) -> Option<RateLimitWindow> {
        self.shared.expires_at.lock().map(|expires_at| RateLimitWindow {
            active: Instant::now() < expires_at,
            expires_at,
        })
    }

    /// Countdown of remaining seconds, updated once per tick
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.shared.remaining_tx.subscribe()
    }

    /// Whether a countdown task is alive
    pub fn is_ticking(&self) -> bool {
        self.ticker.lock().as_ref().map_or(false, |h| !h.is_finished())
    }

    /// Clear the window and stop the countdown
    pub fn disarm(&self) {
        if let Some(ticker) = self.ticker.lock().take() {
            ticker.abort();
        }
        *self.shared.expires_at.lock() = None;
        self.shared.remaining_tx.send_replace(0);
    }
}

impl Drop for RateLimiter {
    fn drop(&mut self) {
        if let Some(ticker) = self.ticker.get_mut().take() {
            ticker.abort();
        }
    }
}

async fn countdown(shared: Arc<Shared>, expires_at: Instant, tick_interval: Duration) {
    let mut interval = tokio::time::interval_at(Instant::now() + tick_interval, tick_interval);

    loop {
        interval.tick().await;

        let remaining = remaining_secs(expires_at);
        shared.remaining_tx.send_replace(remaining);

        if remaining == 0 {
            shared.clear_if(expires_at);
            log::debug!("Assistant rate limit window closed");
            break;
        }
    }
}

fn remaining_secs(expires_at: Instant) -> u64 {
    let left = expires_at.saturating_duration_since(Instant::now());
    let secs = left.as_secs();
    if left.subsec_nanos() > 0 {
        secs + 1
    } else {
        secs
    }
}
