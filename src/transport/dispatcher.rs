//! Named-event fan-out registry.
//!
//! [`Dispatcher`] maps event names to any number of independent handlers.
//! Every handler registered for a name receives every frame with that
//! name, in registration order.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Handle returned by [`Dispatcher::on`], used to unregister.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandlerId(u64);

/// Callback invoked with a context value and the event payload.
pub type Handler<C> = Arc<dyn Fn(&C, &serde_json::Value) + Send + Sync>;

/// Registry of handlers keyed by event name.
pub struct Dispatcher<C> {
    next_id: u64,
    handlers: HashMap<String, Vec<(HandlerId, Handler<C>)>>,
}

impl<C> Dispatcher<C> {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            next_id: 0,
            handlers: HashMap::new(),
        }
    }

    /// Registers a handler for `event`.
    pub fn on(&mut self, event: &str, handler: Handler<C>) -> HandlerId {
        self.next_id = self.next_id.wrapping_add(1);
        let id = HandlerId(self.next_id);
        self.handlers
            .entry(event.to_string())
            .or_default()
            .push((id, handler));
        id
    }

    /// Unregisters one handler. Returns `false` if it was already gone.
    pub fn off(&mut self, id: HandlerId) -> bool {
        let mut removed = false;
        self.handlers.retain(|_, list| {
            let before = list.len();
            list.retain(|(hid, _)| *hid != id);
            removed |= list.len() != before;
            !list.is_empty()
        });
        removed
    }

    /// Unregisters every handler for `event`, returning how many were removed.
    pub fn off_all(&mut self, event: &str) -> usize {
        self.handlers.remove(event).map_or(0, |list| list.len())
    }

    /// Returns a snapshot of the handlers for `event`.
    ///
    /// Callers invoke the snapshot after releasing any lock around the
    /// registry, so a handler may itself call [`Dispatcher::off`].
    #[must_use]
    pub fn handlers_for(&self, event: &str) -> Vec<Handler<C>> {
        self.handlers
            .get(event)
            .map(|list| list.iter().map(|(_, h)| Arc::clone(h)).collect())
            .unwrap_or_default()
    }

    /// Returns the number of handlers registered for `event`.
    #[must_use]
    pub fn handler_count(&self, event: &str) -> usize {
        self.handlers.get(event).map_or(0, Vec::len)
    }

    /// Returns the total number of registered handlers.
    #[must_use]
    pub fn total(&self) -> usize {
        self.handlers.values().map(Vec::len).sum()
    }
}

impl<C> Default for Dispatcher<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> fmt::Debug for Dispatcher<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let counts: HashMap<&str, usize> = self
            .handlers
            .iter()
            .map(|(name, list)| (name.as_str(), list.len()))
            .collect();
        f.debug_struct("Dispatcher")
            .field("handlers", &counts)
            .finish()
    }
}
