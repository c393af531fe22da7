//! Delivery surface: user-visible alerts and badge counts.
//!
//! The rendering itself belongs to the host (a toast library, a terminal,
//! a test recorder) behind the [`AlertSink`] trait. [`DeliverySurface`]
//! sits in front of the sink and guarantees at most one visible toast per
//! key among the most recent [`SHOWN_KEY_CAPACITY`] keys, so redundant
//! pushes of the same notification never stack.

use std::collections::{HashSet, VecDeque};
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::domain::{Identity, Notification};
use crate::sync::lock;

/// A transient alert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Toast {
    /// De-duplication key.
    pub key: String,
    /// Text to show.
    pub text: String,
    /// Route to open when the toast is clicked.
    pub route: Option<String>,
    /// How long the toast stays visible.
    pub auto_close: Duration,
}

/// Host-side renderer of alerts.
pub trait AlertSink: Send + Sync + fmt::Debug {
    /// Shows one toast.
    fn show_toast(&self, toast: &Toast);

    /// Updates the unread badge of an identity.
    fn set_badge(&self, identity: &Identity, unread: usize);
}

/// Sink that writes alerts to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl AlertSink for TracingSink {
    fn show_toast(&self, toast: &Toast) {
        tracing::info!(key = %toast.key, route = ?toast.route, "{}", toast.text);
    }

    fn set_badge(&self, identity: &Identity, unread: usize) {
        tracing::info!(%identity, unread, "badge updated");
    }
}

/// Toast keys remembered for de-duplication; the oldest is forgotten first.
pub const SHOWN_KEY_CAPACITY: usize = 1024;

/// Recently shown toast keys, oldest first.
#[derive(Debug)]
struct ShownKeys {
    capacity: usize,
    order: VecDeque<String>,
    keys: HashSet<String>,
}

impl ShownKeys {
    fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            order: VecDeque::new(),
            keys: HashSet::new(),
        }
    }

    /// Returns `false` if `key` is already remembered.
    fn insert(&mut self, key: &str) -> bool {
        if self.keys.contains(key) {
            return false;
        }
        while self.order.len() >= self.capacity {
            let Some(oldest) = self.order.pop_front() else {
                break;
            };
            self.keys.remove(&oldest);
        }
        self.order.push_back(key.to_string());
        self.keys.insert(key.to_string());
        true
    }
}

/// At-most-once front for an [`AlertSink`].
#[derive(Debug, Clone)]
pub struct DeliverySurface {
    sink: Arc<dyn AlertSink>,
    shown: Arc<Mutex<ShownKeys>>,
    auto_close: Duration,
}

impl DeliverySurface {
    /// Wraps `sink`; toasts stay visible for `auto_close`.
    #[must_use]
    pub fn new(sink: Arc<dyn AlertSink>, auto_close: Duration) -> Self {
        Self::with_key_capacity(sink, auto_close, SHOWN_KEY_CAPACITY)
    }

    /// Like [`DeliverySurface::new`], remembering at most `capacity` keys.
    #[must_use]
    pub fn with_key_capacity(sink: Arc<dyn AlertSink>, auto_close: Duration, capacity: usize) -> Self {
        Self {
            sink,
            shown: Arc::new(Mutex::new(ShownKeys::new(capacity))),
            auto_close,
        }
    }

    /// Shows a toast unless one with the same key was shown recently.
    /// Returns `true` if the toast reached the sink.
    pub fn toast(&self, key: &str, text: &str, route: Option<String>) -> bool {
        if !lock(&self.shown).insert(key) {
            tracing::debug!(key, "toast already shown");
            return false;
        }
        self.sink.show_toast(&Toast {
            key: key.to_string(),
            text: text.to_string(),
            route,
            auto_close: self.auto_close,
        });
        true
    }

    /// Shows the toast of a pushed notification, keyed by its id, with the
    /// click target resolved for `viewer`.
    pub fn notify(&self, viewer: &Identity, notification: &Notification) -> bool {
        let route = notification
            .navigation_target(viewer.kind)
            .route()
            .to_string();
        self.toast(
            &format!("notification:{}", notification.id),
            &notification.message,
            Some(route),
        )
    }

    /// Forwards an unread count to the sink.
    pub fn badge(&self, identity: &Identity, unread: usize) {
        self.sink.set_badge(identity, unread);
    }

    /// Returns `true` if a toast with `key` was shown.
    #[must_use]
    pub fn has_shown(&self, key: &str) -> bool {
        lock(&self.shown).keys.contains(key)
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use serde_json::json;

    use super::*;

    #[derive(Debug, Default)]
    struct Recorder {
        toasts: Mutex<Vec<Toast>>,
        badges: Mutex<Vec<usize>>,
    }

    impl AlertSink for Recorder {
        fn show_toast(&self, toast: &Toast) {
            lock(&self.toasts).push(toast.clone());
        }

        fn set_badge(&self, _: &Identity, unread: usize) {
            lock(&self.badges).push(unread);
        }
    }

    fn notification(id: &str, kind: &str) -> Notification {
        let Ok(n) = serde_json::from_value(json!({ "_id": id, "message": "New message", "type": kind }))
        else {
            panic!("fixture must decode");
        };
        n
    }

    #[test]
    fn one_toast_per_notification_id() {
        let recorder = Arc::new(Recorder::default());
        let surface = DeliverySurface::new(Arc::clone(&recorder) as Arc<dyn AlertSink>, Duration::from_secs(5));
        let viewer = Identity::vendor("v1");

        assert!(surface.notify(&viewer, &notification("n1", "message")));
        assert!(!surface.notify(&viewer, &notification("n1", "message")));
        assert!(surface.notify(&viewer, &notification("n2", "booking")));

        let toasts = lock(&recorder.toasts).clone();
        let routes: Vec<Option<String>> = toasts.iter().map(|t| t.route.clone()).collect();
        assert_eq!(
            routes,
            vec![Some("/vendor-chats".to_string()), Some("/vendor-bookings".to_string())]
        );
        assert!(surface.has_shown("notification:n1"));
    }

    #[test]
    fn remembered_keys_stay_bounded() {
        let recorder = Arc::new(Recorder::default());
        let surface = DeliverySurface::with_key_capacity(
            Arc::clone(&recorder) as Arc<dyn AlertSink>,
            Duration::from_secs(5),
            3,
        );
        let viewer = Identity::user("u1");
        for n in 0..10 {
            assert!(surface.notify(&viewer, &notification(&format!("n{n}"), "booking")));
        }
        {
            let shown = lock(&surface.shown);
            assert_eq!(shown.order.len(), 3);
            assert_eq!(shown.keys.len(), 3);
        }
        assert!(!surface.has_shown("notification:n0"));
        assert!(!surface.notify(&viewer, &notification("n9", "booking")));
        assert_eq!(lock(&recorder.toasts).len(), 10);
    }

    #[test]
    fn badge_is_forwarded() {
        let recorder = Arc::new(Recorder::default());
        let surface = DeliverySurface::new(Arc::clone(&recorder) as Arc<dyn AlertSink>, Duration::from_secs(5));
        surface.badge(&Identity::user("u1"), 3);
        assert_eq!(*lock(&recorder.badges), vec![3]);
    }
}
