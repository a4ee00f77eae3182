//! Frame boundary: the narrow interface between the sync runtime and the
//! embedding elements that render each pane.
//!
//! A [`FrameHost`] is owned by the host UI. It exposes two scroll surfaces
//! (the frame's inner document and the outer container hosting it), a load
//! signal, and optionally a cooperative message channel. Every call may fail
//! with an [`AccessError`]; cross-origin denial is an ordinary value here, not
//! a panic, so callers can branch on it.

pub mod protocol;
pub mod ratio;
pub mod sim;

use core_events::{EventNotifier, ScrollSurface};
use std::fmt;
use tokio::sync::watch;

pub use ratio::{apply_ratio, compute_ratio};
pub use sim::{SimulatedFrame, SimulatedFrameBuilder};

/// Extents of one scrollable element, in CSS pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScrollMetrics {
    pub offset: f64,
    pub content_extent: f64,
    pub viewport_extent: f64,
}

impl ScrollMetrics {
    pub const fn new(offset: f64, content_extent: f64, viewport_extent: f64) -> Self {
        Self {
            offset,
            content_extent,
            viewport_extent,
        }
    }

    /// Maximum scroll offset (`content - viewport`), never negative.
    pub fn scroll_range(&self) -> f64 {
        let range = self.content_extent - self.viewport_extent;
        if range.is_finite() && range > 0.0 { range } else { 0.0 }
    }

    pub fn is_scrollable(&self) -> bool {
        self.scroll_range() > 0.0
    }

    /// Normalized position of this element.
    pub fn ratio(&self) -> f64 {
        compute_ratio(self.offset, self.content_extent, self.viewport_extent)
    }

    /// Offset that places this element at `ratio`.
    pub fn offset_for(&self, ratio: f64) -> f64 {
        apply_ratio(ratio, self.content_extent, self.viewport_extent)
    }
}

/// Failure of a single frame interaction.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AccessError {
    /// Cross-origin policy refused access. Recoverable by switching strategy.
    #[error("access to the {surface} of frame `{frame}` was denied")]
    AccessDenied {
        frame: String,
        surface: ScrollSurface,
    },
    /// The surface does not exist in the current layout.
    #[error("frame `{frame}` has no scrollable {surface}")]
    NoScrollableElement {
        frame: String,
        surface: ScrollSurface,
    },
    /// The host dropped the frame (view destroyed or replaced).
    #[error("frame is detached")]
    Detached,
    #[error("frame `{frame}` does not support {what}")]
    Unsupported { frame: String, what: &'static str },
}

impl AccessError {
    pub fn is_access_denied(&self) -> bool {
        matches!(self, AccessError::AccessDenied { .. })
    }

    pub fn is_not_scrollable(&self) -> bool {
        matches!(self, AccessError::NoScrollableElement { .. })
    }

    /// Short stable label for structured logs.
    pub fn kind(&self) -> &'static str {
        match self {
            AccessError::AccessDenied { .. } => "access_denied",
            AccessError::NoScrollableElement { .. } => "no_scrollable_element",
            AccessError::Detached => "detached",
            AccessError::Unsupported { .. } => "unsupported",
        }
    }
}

/// Registered listener. Dropping it removes the listener from the frame.
#[must_use = "dropping a Subscription immediately unsubscribes"]
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    pub fn new(cancel: impl FnOnce() + Send + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    /// Subscription with nothing to release.
    pub fn noop() -> Self {
        Self { cancel: None }
    }

    /// Remove the listener now.
    pub fn unsubscribe(mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.cancel.is_some())
            .finish()
    }
}

/// One embedding frame as seen by the sync runtime.
///
/// Implementations must not block and must not call back into the runtime
/// synchronously except through the supplied [`EventNotifier`], which never
/// blocks either.
pub trait FrameHost: Send + Sync {
    /// Human-readable identifier for logs.
    fn label(&self) -> &str;

    /// Load-complete signal; `true` once the frame's content has loaded.
    fn load_signal(&self) -> watch::Receiver<bool>;

    fn metrics(&self, surface: ScrollSurface) -> Result<ScrollMetrics, AccessError>;

    fn scroll_to(&self, surface: ScrollSurface, offset: f64) -> Result<(), AccessError>;

    /// Register for scroll notifications on `surface`. Programmatic scrolls
    /// may be reported too, possibly after `scroll_to` returned.
    fn listen(
        &self,
        surface: ScrollSurface,
        notifier: EventNotifier,
    ) -> Result<Subscription, AccessError>;

    /// Whether hosted content speaks the cross-frame message protocol.
    fn supports_messaging(&self) -> bool {
        false
    }

    fn listen_messages(&self, _notifier: EventNotifier) -> Result<Subscription, AccessError> {
        Err(AccessError::Unsupported {
            frame: self.label().to_string(),
            what: "messaging",
        })
    }

    fn post_message(&self, _payload: &str) -> Result<(), AccessError> {
        Err(AccessError::Unsupported {
            frame: self.label().to_string(),
            what: "messaging",
        })
    }
}
