//! Domain layer: identifiers, documents, and wire events.
//!
//! This module contains the client-side model of the marketplace's
//! real-time surface: typed ids, identities, chat messages,
//! notifications, bookings, the named events exchanged with the
//! backend, and the view events published to screens.

pub mod booking;
pub mod conversation;
pub mod event_bus;
pub mod events;
pub mod identity;
pub mod ids;
pub mod message;
pub mod notification;
pub mod view_event;

pub use booking::{Booking, BookingStatus};
pub use conversation::{ConversationSummary, ParticipantRef};
pub use event_bus::{EventBus, ViewFilter, ViewStream, ViewUpdate};
pub use events::{ClientEvent, ServerEvent, TypingSignal};
pub use identity::{Identity, IdentityType};
pub use ids::{BookingId, ChatId, IdentityId, MessageId, NotificationId};
pub use message::{ChatMessage, DeliveryState, MessageContent};
pub use notification::{NavigationTarget, Notification, NotificationKind};
pub use view_event::ViewEvent;
