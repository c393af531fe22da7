//! View-facing events raised by the real-time core.
//!
//! Every local state change that a screen may want to render is published
//! as a [`ViewEvent`] through the [`super::EventBus`]. Subscribers (the
//! delivery surface, a terminal printer, a UI binding) filter what they
//! need.

use serde::Serialize;
use uuid::Uuid;

use super::{Booking, ChatId, ChatMessage, Identity, MessageId, Notification};

/// Local state change published after a mutation.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum ViewEvent {
    /// History finished loading for a conversation.
    HistoryLoaded {
        /// Conversation id.
        chat_id: ChatId,
        /// Number of messages now visible.
        count: usize,
    },

    /// A message became visible at the end of a conversation.
    MessageAppended {
        /// Conversation id.
        chat_id: ChatId,
        /// The appended message.
        message: ChatMessage,
    },

    /// An optimistic message settled.
    MessageSettled {
        /// Conversation id.
        chat_id: ChatId,
        /// Client-side handle of the optimistic entry.
        local_id: Uuid,
        /// Id assigned by the remote store, if it answered with one.
        message_id: Option<MessageId>,
        /// `false` when persistence failed and the entry is unconfirmed.
        confirmed: bool,
    },

    /// The peer typing flag changed.
    PeerTyping {
        /// Conversation id.
        chat_id: ChatId,
        /// Whether the peer is currently typing.
        active: bool,
    },

    /// A notification was inserted into an identity's feed.
    NotificationReceived {
        /// Recipient.
        identity: Identity,
        /// The inserted notification.
        notification: Notification,
    },

    /// The unread notification count of an identity changed.
    UnreadChanged {
        /// Recipient.
        identity: Identity,
        /// New unread count.
        unread: usize,
    },

    /// A watched booking changed status.
    BookingUpdated {
        /// The updated booking.
        booking: Booking,
    },
}

impl ViewEvent {
    /// Returns the conversation this event belongs to, if any.
    #[must_use]
    pub fn chat_id(&self) -> Option<&ChatId> {
        match self {
            Self::HistoryLoaded { chat_id, .. }
            | Self::MessageAppended { chat_id, .. }
            | Self::MessageSettled { chat_id, .. }
            | Self::PeerTyping { chat_id, .. } => Some(chat_id),
            Self::NotificationReceived { .. }
            | Self::UnreadChanged { .. }
            | Self::BookingUpdated { .. } => None,
        }
    }

    /// Returns the identity whose feed this event belongs to, if any.
    #[must_use]
    pub fn identity(&self) -> Option<&Identity> {
        match self {
            Self::NotificationReceived { identity, .. } | Self::UnreadChanged { identity, .. } => {
                Some(identity)
            }
            _ => None,
        }
    }
}
