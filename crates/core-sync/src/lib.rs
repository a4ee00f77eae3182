//! Dual-pane scroll synchronization.
//!
//! Keeps two independently scrolling frames at the same proportional scroll
//! position. The host hands two frames to a [`SyncCoordinator`]; a session
//! task waits for both frames to load, probes the access strategies in rank
//! order (direct document access, outer container proxy, polling), wires the
//! chosen strategy's listeners through per-direction throttles and a
//! reentrancy guard, and reports every phase change through the host's status
//! callback.
//!
//! Failures never reach the host as errors: a strategy that stops working is
//! replaced by a lower-ranked one, and a session with no usable strategy ends
//! in an inert "unavailable" status while the panes stay usable.

pub mod coordinator;
pub mod error;
pub mod guard;
pub mod pane;
pub mod readiness;
mod session;
pub mod status;
pub mod strategy;
pub mod throttle;

/// Ratio mapping shared with the frame layer.
pub use core_frame::ratio;

pub use coordinator::SyncCoordinator;
pub use error::SyncError;
pub use guard::ReentrancyGuard;
pub use pane::{AccessState, Pane};
pub use readiness::{Readiness, ReadinessWaiter};
pub use status::{SyncPhase, SyncStatus};
pub use strategy::{AccessStrategy, StrategyKind};
pub use throttle::Throttle;
