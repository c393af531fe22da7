//! Transport layer: frame envelope, connectors, fan-out, and the
//! connection manager.
//!
//! Only [`ConnectionManager`] talks to a [`Connector`]; every other
//! component holds a clone of the manager and never opens its own link.

pub mod connector;
pub mod dispatcher;
pub mod frame;
pub mod manager;
pub mod memory;

pub use connector::{Connector, Link, WsConnector};
pub use dispatcher::{Dispatcher, HandlerId};
pub use frame::Frame;
pub use manager::{
    ConnectionLease, ConnectionManager, ConnectionStatus, HookId, ReconnectPolicy, Subscription,
};
pub use memory::{MemoryConnector, MemoryListener, MemoryPeer, memory_transport};
