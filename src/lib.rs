//! # wedding-realtime
//!
//! Real-time messaging and notification delivery core for a
//! wedding-services marketplace client.
//!
//! Users and vendors chat one-to-one per conversation and receive
//! notifications about bookings and messages. This crate keeps one
//! reference-counted transport link to the backend, tracks which rooms and
//! identity channels the process wants to be in, keeps each open
//! conversation's message list ordered and free of duplicates, and keeps
//! each identity's notification list and unread counter consistent with
//! both live pushes and the REST source of truth.
//!
//! ## Architecture
//!
//! ```text
//! Views (terminal client, embedding UI)
//!     │
//!     ├── RealtimeClient (client/)          one per process, injected
//!     │
//!     ├── ChatSession (chat/)               per open conversation
//!     ├── NotificationAggregator (notifications/)
//!     ├── BookingWatcher (bookings/)
//!     │       │
//!     │       ├── EventBus (domain/)        view events out
//!     │       ├── DeliverySurface (delivery/)
//!     │       └── ChatApi / NotificationApi (api/)   REST in
//!     │
//!     ├── RoomMembership (membership/)      re-joins on every connect
//!     │
//!     └── ConnectionManager (transport/)
//!             └── Connector: WebSocket | in-memory
//! ```

pub mod api;
pub mod bookings;
pub mod chat;
pub mod client;
pub mod config;
pub mod delivery;
pub mod domain;
pub mod error;
pub mod membership;
pub mod notifications;
pub mod transport;

mod sync;

pub use client::RealtimeClient;
pub use config::RealtimeConfig;
pub use error::RealtimeError;
