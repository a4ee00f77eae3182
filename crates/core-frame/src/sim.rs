//! In-memory [`FrameHost`] used by tests and the scenario runner.
//!
//! Mirrors the browser behaviours the sync runtime has to cope with:
//! cross-origin documents refuse access, programmatic scrolls are reported to
//! the frame's own listeners (the echo), load completes asynchronously, and
//! cooperative content talks through the message protocol instead of exposing
//! its document.

use crate::{AccessError, FrameHost, ScrollMetrics, Subscription, protocol};
use core_events::{EventNotifier, ScrollSurface};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use tokio::sync::watch;
use tracing::trace;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentAccess {
    Allowed,
    Denied,
}

#[derive(Debug)]
enum ListenerKind {
    Scroll(ScrollSurface),
    Messages,
}

#[derive(Debug)]
struct Listener {
    id: u64,
    kind: ListenerKind,
    notifier: EventNotifier,
}

#[derive(Debug)]
struct State {
    document: Option<ScrollMetrics>,
    document_access: DocumentAccess,
    container: Option<ScrollMetrics>,
    cooperative: bool,
    echo_programmatic: bool,
    listeners: Vec<Listener>,
    next_listener_id: u64,
    writes: usize,
    posted: Vec<String>,
}

impl State {
    fn surface_mut(&mut self, surface: ScrollSurface) -> Option<&mut ScrollMetrics> {
        match surface {
            ScrollSurface::Document => self.document.as_mut(),
            ScrollSurface::Container => self.container.as_mut(),
        }
    }

    fn notify_scroll(&self, surface: ScrollSurface) {
        for l in &self.listeners {
            if matches!(l.kind, ListenerKind::Scroll(s) if s == surface) {
                l.notifier.scrolled(surface);
            }
        }
    }

    fn notify_message(&self, payload: &str) {
        for l in &self.listeners {
            if matches!(l.kind, ListenerKind::Messages) {
                l.notifier.message(payload);
            }
        }
    }

    /// Injected content reports its document position after every scroll.
    fn report_document_position(&self) {
        if !self.cooperative {
            return;
        }
        if let Some(doc) = self.document {
            self.notify_message(&protocol::encode(doc.ratio()));
        }
    }
}

/// Builder for [`SimulatedFrame`].
#[derive(Debug)]
pub struct SimulatedFrameBuilder {
    label: String,
    document: Option<ScrollMetrics>,
    document_access: DocumentAccess,
    container: Option<ScrollMetrics>,
    cooperative: bool,
    echo_programmatic: bool,
    loaded: bool,
}

impl SimulatedFrameBuilder {
    /// Scrollable inner document with the given extents, scrolled to the top.
    pub fn document(mut self, content_extent: f64, viewport_extent: f64) -> Self {
        self.document = Some(ScrollMetrics::new(0.0, content_extent, viewport_extent));
        self
    }

    /// Outer scroll viewport hosting the frame.
    pub fn container(mut self, content_extent: f64, viewport_extent: f64) -> Self {
        self.container = Some(ScrollMetrics::new(0.0, content_extent, viewport_extent));
        self
    }

    /// Content is cross-origin: the document exists but cannot be touched.
    pub fn cross_origin(mut self) -> Self {
        self.document_access = DocumentAccess::Denied;
        self
    }

    /// Content runs the scroll-sync message script.
    pub fn cooperative(mut self) -> Self {
        self.cooperative = true;
        self
    }

    /// Programmatic scrolls do not notify listeners.
    pub fn silent_writes(mut self) -> Self {
        self.echo_programmatic = false;
        self
    }

    /// Frame starts in the loaded state.
    pub fn loaded(mut self) -> Self {
        self.loaded = true;
        self
    }

    pub fn build(self) -> Arc<SimulatedFrame> {
        let (loaded, _) = watch::channel(self.loaded);
        Arc::new(SimulatedFrame {
            label: self.label,
            loaded,
            state: Arc::new(Mutex::new(State {
                document: self.document,
                document_access: self.document_access,
                container: self.container,
                cooperative: self.cooperative,
                echo_programmatic: self.echo_programmatic,
                listeners: Vec::new(),
                next_listener_id: 0,
                writes: 0,
                posted: Vec::new(),
            })),
        })
    }
}

#[derive(Debug)]
pub struct SimulatedFrame {
    label: String,
    loaded: watch::Sender<bool>,
    state: Arc<Mutex<State>>,
}

impl SimulatedFrame {
    pub fn builder(label: impl Into<String>) -> SimulatedFrameBuilder {
        SimulatedFrameBuilder {
            label: label.into(),
            document: None,
            document_access: DocumentAccess::Allowed,
            container: None,
            cooperative: false,
            echo_programmatic: true,
            loaded: false,
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Fire the load-complete signal.
    pub fn mark_loaded(&self) {
        self.loaded.send_replace(true);
        trace!(target: "frame.sim", frame = self.label.as_str(), "loaded");
    }

    /// Simulate a user scroll. Listeners on `surface` are notified; cooperative
    /// content also reports its position through the message channel.
    pub fn user_scroll(&self, surface: ScrollSurface, offset: f64) {
        let mut st = self.lock();
        let Some(m) = st.surface_mut(surface) else {
            return;
        };
        m.offset = offset.clamp(0.0, m.scroll_range());
        st.notify_scroll(surface);
        if surface == ScrollSurface::Document {
            st.report_document_position();
        }
    }

    /// Simulate a navigation inside the frame to a cross-origin page.
    pub fn revoke_document_access(&self) {
        self.lock().document_access = DocumentAccess::Denied;
    }

    /// Deliver an arbitrary payload on the message channel.
    pub fn emit_message(&self, payload: &str) {
        self.lock().notify_message(payload);
    }

    /// Current offset of `surface`, bypassing access checks.
    pub fn offset(&self, surface: ScrollSurface) -> Option<f64> {
        let st = self.lock();
        match surface {
            ScrollSurface::Document => st.document.map(|m| m.offset),
            ScrollSurface::Container => st.container.map(|m| m.offset),
        }
    }

    pub fn listener_count(&self) -> usize {
        self.lock().listeners.len()
    }

    /// Number of programmatic scrolls applied (including message-driven ones).
    pub fn write_count(&self) -> usize {
        self.lock().writes
    }

    pub fn posted_messages(&self) -> Vec<String> {
        self.lock().posted.clone()
    }

    fn check_surface(&self, st: &State, surface: ScrollSurface) -> Result<ScrollMetrics, AccessError> {
        let found = match surface {
            ScrollSurface::Document => {
                if st.document_access == DocumentAccess::Denied {
                    return Err(AccessError::AccessDenied {
                        frame: self.label.clone(),
                        surface,
                    });
                }
                st.document
            }
            ScrollSurface::Container => st.container,
        };
        found.ok_or_else(|| AccessError::NoScrollableElement {
            frame: self.label.clone(),
            surface,
        })
    }

    fn add_listener(&self, kind: ListenerKind, notifier: EventNotifier) -> Subscription {
        let mut st = self.lock();
        let id = st.next_listener_id;
        st.next_listener_id += 1;
        st.listeners.push(Listener { id, kind, notifier });
        let weak: Weak<Mutex<State>> = Arc::downgrade(&self.state);
        Subscription::new(move || {
            if let Some(state) = weak.upgrade() {
                let mut st = state.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
                st.listeners.retain(|l| l.id != id);
            }
        })
    }
}

impl FrameHost for SimulatedFrame {
    fn label(&self) -> &str {
        &self.label
    }

    fn load_signal(&self) -> watch::Receiver<bool> {
        self.loaded.subscribe()
    }

    fn metrics(&self, surface: ScrollSurface) -> Result<ScrollMetrics, AccessError> {
        let st = self.lock();
        self.check_surface(&st, surface)
    }

    fn scroll_to(&self, surface: ScrollSurface, offset: f64) -> Result<(), AccessError> {
        let mut st = self.lock();
        self.check_surface(&st, surface)?;
        if let Some(m) = st.surface_mut(surface) {
            m.offset = offset.clamp(0.0, m.scroll_range());
        }
        st.writes += 1;
        if st.echo_programmatic {
            st.notify_scroll(surface);
        }
        Ok(())
    }

    fn listen(
        &self,
        surface: ScrollSurface,
        notifier: EventNotifier,
    ) -> Result<Subscription, AccessError> {
        {
            let st = self.lock();
            self.check_surface(&st, surface)?;
        }
        Ok(self.add_listener(ListenerKind::Scroll(surface), notifier))
    }

    fn supports_messaging(&self) -> bool {
        self.lock().cooperative
    }

    fn listen_messages(&self, notifier: EventNotifier) -> Result<Subscription, AccessError> {
        if !self.supports_messaging() {
            return Err(AccessError::Unsupported {
                frame: self.label.clone(),
                what: "messaging",
            });
        }
        Ok(self.add_listener(ListenerKind::Messages, notifier))
    }

    fn post_message(&self, payload: &str) -> Result<(), AccessError> {
        let mut st = self.lock();
        if !st.cooperative {
            return Err(AccessError::Unsupported {
                frame: self.label.clone(),
                what: "messaging",
            });
        }
        st.posted.push(payload.to_string());
        // Injected script: scroll the document and report back like a user scroll would.
        if let Some(ratio) = protocol::parse(payload)
            && let Some(doc) = st.document.as_mut()
        {
            doc.offset = doc.offset_for(ratio);
            st.writes += 1;
            if st.echo_programmatic {
                st.report_document_position();
            }
        }
        Ok(())
    }
}
