//! Fan-out of view events to interested screens.
//!
//! Chat sessions, notification aggregators, and booking watchers publish a
//! [`ViewEvent`] after every local mutation. A screen opens a [`ViewStream`]
//! scoped by a [`ViewFilter`] and only wakes for its own conversation or
//! feed. A stream that falls behind gets a [`ViewUpdate::Resync`] telling
//! it to re-read snapshots instead of a replay.

use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;

use super::{ChatId, Identity, ViewEvent};

/// Which events a [`ViewStream`] delivers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViewFilter {
    /// Every event.
    All,
    /// Events of one conversation.
    Chat(ChatId),
    /// Feed events of one identity.
    Feed(Identity),
    /// Booking updates only.
    Bookings,
}

impl ViewFilter {
    /// Returns `true` if `event` is in scope.
    #[must_use]
    pub fn accepts(&self, event: &ViewEvent) -> bool {
        match self {
            Self::All => true,
            Self::Chat(chat_id) => event.chat_id() == Some(chat_id),
            Self::Feed(identity) => event.identity() == Some(identity),
            Self::Bookings => matches!(event, ViewEvent::BookingUpdated { .. }),
        }
    }
}

/// One item from a [`ViewStream`].
#[derive(Debug, Clone)]
pub enum ViewUpdate {
    /// An in-scope event.
    Event(ViewEvent),
    /// Events were dropped while the view lagged; snapshots must be re-read.
    Resync {
        /// Number of events skipped, in or out of scope.
        missed: u64,
    },
}

/// Filtered receiver of view events.
#[derive(Debug)]
pub struct ViewStream {
    filter: ViewFilter,
    rx: broadcast::Receiver<ViewEvent>,
}

impl ViewStream {
    /// Returns the filter this stream applies.
    #[must_use]
    pub fn filter(&self) -> &ViewFilter {
        &self.filter
    }

    /// Waits for the next in-scope event or a resync marker.
    ///
    /// Returns `None` once every publisher is gone.
    pub async fn next(&mut self) -> Option<ViewUpdate> {
        loop {
            match self.rx.recv().await {
                Ok(event) if self.filter.accepts(&event) => return Some(ViewUpdate::Event(event)),
                Ok(_) => {}
                Err(RecvError::Lagged(missed)) => {
                    tracing::debug!(filter = ?self.filter, missed, "view stream lagged");
                    return Some(ViewUpdate::Resync { missed });
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }
}

/// Broadcast bus for [`ViewEvent`]s.
///
/// Holds up to `capacity` undelivered events per view; the oldest are
/// dropped for views that fall further behind.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<ViewEvent>,
}

impl EventBus {
    /// Creates a bus holding up to `capacity` undelivered events per view.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publishes an event. Returns how many views it reached; with no views
    /// open it is dropped.
    pub fn publish(&self, event: ViewEvent) -> usize {
        self.sender.send(event).unwrap_or(0)
    }

    /// Creates an unfiltered receiver for all future events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<ViewEvent> {
        self.sender.subscribe()
    }

    /// Opens a stream of future events matching `filter`.
    #[must_use]
    pub fn watch(&self, filter: ViewFilter) -> ViewStream {
        ViewStream {
            filter,
            rx: self.sender.subscribe(),
        }
    }

    /// Returns the number of open views.
    #[must_use]
    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1024)
    }
}
