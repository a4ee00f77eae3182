use core_frame::AccessError;
use std::time::Duration;

/// Session-level failure taxonomy. None of these reach the host as an `Err`;
/// they become phase transitions and status messages.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SyncError {
    /// A strategy lost access to a pane (cross-origin denial, detached frame).
    /// Recoverable by downgrading.
    #[error("pane access lost: {0}")]
    AccessDenied(#[from] AccessError),
    /// Frames did not signal load in time. Probing proceeds anyway.
    #[error("frames not ready after {}ms", .0.as_millis())]
    ReadinessTimeout(Duration),
    /// Neither pane exposes any scrollable element. Terminal for the session.
    #[error("no scrollable element in either pane")]
    NoScrollableContainer,
    /// Every strategy failed. Retried while the session is first probing,
    /// then ends it.
    #[error("no usable scroll access strategy")]
    StrategyExhausted,
}

impl SyncError {
    /// Worth another probing round once layout settles.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, SyncError::NoScrollableContainer)
    }
}
