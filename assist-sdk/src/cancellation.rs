//! Supersession and teardown of in-flight attempts
//!
//! Exactly one `AttemptToken` is current at a time. Starting a new attempt
//! cancels the previous token; a response is applied only while its token
//! is still current, which makes "last submission wins" independent of the
//! order in which responses arrive.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

/// Handle for one attempt. Equality is identity: two tokens are equal only
/// if they come from the same `begin()` call.
#[derive(Clone)]
pub struct AttemptToken {
    id: u64,
    cancel: CancellationToken,
}

impl AttemptToken {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Resolves once the attempt is superseded or torn down
    pub async fn cancelled(&self) {
        self.cancel.cancelled().await
    }
}

impl PartialEq for AttemptToken {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for AttemptToken {}

impl fmt::Debug for AttemptToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AttemptToken")
            .field("id", &self.id)
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

/// Owns the single current token
#[derive(Debug, Default)]
pub struct CancellationController {
    next_id: AtomicU64,
    current: Mutex<Option<AttemptToken>>,
}

impl CancellationController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Issue a new current token, cancelling the previous one.
    ///
    /// Does not wait for the cancelled attempt to stop.
    pub fn begin(&self) -> AttemptToken {
        let token = AttemptToken {
            id: self.next_id.fetch_add(1, Ordering::Relaxed) + 1,
            cancel: CancellationToken::new(),
        };

        let previous = self.current.lock().replace(token.clone());
        if let Some(previous) = previous {
            log::debug!("Attempt {} superseded by {}", previous.id, token.id);
            previous.cancel.cancel();
        }

        token
    }

    pub fn is_current(&self, token: &AttemptToken) -> bool {
        self.current.lock().as_ref() == Some(token)
    }

    /// Cancel the current token, if any. Afterwards no token is current.
    pub fn cancel_all(&self) {
        if let Some(previous) = self.current.lock().take() {
            log::debug!("Attempt {} cancelled on teardown", previous.id);
            previous.cancel.cancel();
        }
    }
}
