//! Notification aggregator.
//!
//! [`NotificationFeed`] holds the list invariants (unique ids, newest
//! first, counter equal to unread entries). [`NotificationAggregator`]
//! wires a feed to the transport, the REST source of truth, and the
//! delivery surface for one identity.

pub mod aggregator;
pub mod feed;

pub use aggregator::NotificationAggregator;
pub use feed::NotificationFeed;
