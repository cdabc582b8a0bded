//! Stop signal for a single run of a job.
//!
//! The manager holds one [`RunControl`] per run and hands a clone to the
//! runner. `pause` and `cancel` both fire the same cancellation token; the
//! first request decides how the run ends.

use std::sync::{Arc, OnceLock};
use tokio_util::sync::CancellationToken;

/// Why a run was asked to stop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// Ends in `Canceled`
    Cancel,
    /// Ends in `Paused`; the job can be re-queued later
    Pause,
}

#[derive(Debug, Clone, Default)]
pub struct RunControl {
    token: CancellationToken,
    reason: Arc<OnceLock<StopReason>>,
}

impl RunControl {
    pub fn new() -> Self {
        Self::default()
    }

    /// Signal the run to stop. Returns false if it had already been signaled.
    pub fn request_stop(&self, reason: StopReason) -> bool {
        let first = self.reason.set(reason).is_ok();
        self.token.cancel();
        first
    }

    pub fn is_stopped(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn reason(&self) -> Option<StopReason> {
        self.reason.get().copied()
    }

    /// Resolves once a stop has been requested
    pub async fn stopped(&self) {
        self.token.cancelled().await
    }
}
