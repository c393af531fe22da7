//! Transport connection manager.
//!
//! [`ConnectionManager`] owns the single real-time link of the process.
//! It is constructed once and cloned into every component that needs it;
//! clones share the same link, handler registry, and status.
//!
//! # Lifecycle
//!
//! ```text
//!   acquire() ──► connect() ──► Disconnected ─► Connecting ─► Connected
//!                                   ▲                             │
//!                                   │      link lost, leases > 0  │
//!                                   └──── reconnect w/ backoff ◄──┘
//! ```
//!
//! Consumers hold a [`ConnectionLease`]; dropping the last lease
//! disconnects. Every successful establishment runs the `on_connected`
//! hooks, which is where room membership re-issues its joins.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use serde_json::Value;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use super::dispatcher::{Dispatcher, HandlerId};
use super::{Connector, Frame, Link, WsConnector};
use crate::config::RealtimeConfig;
use crate::domain::ClientEvent;
use crate::error::RealtimeError;
use crate::sync::lock;

/// Connection status as observed by consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    /// No link.
    Disconnected,
    /// A connect attempt is in flight.
    Connecting,
    /// The link is up; emits are delivered.
    Connected,
}

/// Reconnection schedule after an unexpected link loss.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Delay before the first attempt.
    pub delay: Duration,
    /// Cap for the doubled delay.
    pub max_delay: Duration,
    /// Attempts per link loss; 0 = unlimited.
    pub max_attempts: u32,
}

impl ReconnectPolicy {
    /// Builds the policy from configuration.
    #[must_use]
    pub fn from_config(config: &RealtimeConfig) -> Self {
        Self {
            delay: config.reconnect_delay,
            max_delay: config.reconnect_max_delay,
            max_attempts: config.reconnect_max_attempts,
        }
    }

    /// Delay before attempt number `attempt` (1-based): doubles each time,
    /// capped at `max_delay`.
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.delay
            .saturating_mul(1u32 << exponent)
            .min(self.max_delay.max(self.delay))
    }

    /// Returns `true` if attempt number `attempt` may run.
    #[must_use]
    pub const fn allows(&self, attempt: u32) -> bool {
        self.max_attempts == 0 || attempt <= self.max_attempts
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(5),
            max_attempts: 0,
        }
    }
}

/// Handle returned by [`ConnectionManager::on_connected`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HookId(u64);

type ConnectedHook = Arc<dyn Fn(&ConnectionManager) + Send + Sync>;

struct LinkState {
    outbound: Option<mpsc::Sender<Frame>>,
    /// Bumped on every connect attempt and every disconnect; stale readers
    /// and superseded connects compare against it.
    generation: u64,
    /// Bumped on every explicit disconnect; cancels a running reconnect loop.
    teardowns: u64,
    consumers: usize,
    reader: Option<JoinHandle<()>>,
    reconnecting: bool,
}

struct Shared {
    endpoint: String,
    connector: Arc<dyn Connector>,
    policy: ReconnectPolicy,
    status: watch::Sender<ConnectionStatus>,
    link: Mutex<LinkState>,
    dispatcher: Mutex<Dispatcher<ConnectionManager>>,
    hooks: Mutex<Vec<(HookId, ConnectedHook)>>,
    next_hook: AtomicU64,
}

impl fmt::Debug for Shared {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Shared")
            .field("endpoint", &self.endpoint)
            .field("connector", &self.connector)
            .field("status", &*self.status.borrow())
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

/// Process-wide owner of the real-time link.
#[derive(Debug, Clone)]
pub struct ConnectionManager {
    shared: Arc<Shared>,
}

impl ConnectionManager {
    /// Creates a manager for `endpoint` using the given connector.
    ///
    /// Nothing is opened until [`ConnectionManager::connect`] runs.
    #[must_use]
    pub fn new(
        endpoint: impl Into<String>,
        connector: Arc<dyn Connector>,
        policy: ReconnectPolicy,
    ) -> Self {
        let (status, _) = watch::channel(ConnectionStatus::Disconnected);
        Self {
            shared: Arc::new(Shared {
                endpoint: endpoint.into(),
                connector,
                policy,
                status,
                link: Mutex::new(LinkState {
                    outbound: None,
                    generation: 0,
                    teardowns: 0,
                    consumers: 0,
                    reader: None,
                    reconnecting: false,
                }),
                dispatcher: Mutex::new(Dispatcher::new()),
                hooks: Mutex::new(Vec::new()),
                next_hook: AtomicU64::new(1),
            }),
        }
    }

    /// Creates a WebSocket-backed manager from configuration.
    ///
    /// # Errors
    ///
    /// Returns [`RealtimeError::InvalidConfig`] if the socket endpoint
    /// cannot be derived from the base URL.
    pub fn from_config(config: &RealtimeConfig) -> Result<Self, RealtimeError> {
        let endpoint = config.socket_endpoint()?;
        let connector = Arc::new(WsConnector::new(config.outbound_queue_capacity));
        Ok(Self::new(
            endpoint,
            connector,
            ReconnectPolicy::from_config(config),
        ))
    }

    /// Returns the transport endpoint.
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.shared.endpoint
    }

    /// Returns the current status.
    #[must_use]
    pub fn status(&self) -> ConnectionStatus {
        *self.shared.status.borrow()
    }

    /// Returns `true` while the link is up.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.status() == ConnectionStatus::Connected
    }

    /// Returns a receiver that observes every status transition.
    #[must_use]
    pub fn watch_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.shared.status.subscribe()
    }

    /// Waits until the status equals `target`.
    pub async fn wait_for_status(&self, target: ConnectionStatus) {
        let mut rx = self.watch_status();
        let _ = rx.wait_for(|status| *status == target).await;
    }

    /// Opens the link. A no-op if already connected or connecting.
    ///
    /// On failure while leases are held, background reconnection starts.
    ///
    /// # Errors
    ///
    /// Returns [`RealtimeError::TransportUnavailable`] if the connector
    /// cannot reach the endpoint.
    pub async fn connect(&self) -> Result<(), RealtimeError> {
        Shared::establish(&self.shared).await
    }

    /// Tears down the link. A no-op if already disconnected.
    ///
    /// Server-side room membership ends with the link. Explicit
    /// disconnection never triggers reconnection.
    pub fn disconnect(&self) {
        let (reader, was) = {
            let mut link = lock(&self.shared.link);
            let was = *self.shared.status.borrow();
            link.generation = link.generation.wrapping_add(1);
            link.teardowns = link.teardowns.wrapping_add(1);
            link.outbound = None;
            link.reconnecting = false;
            self.shared.status.send_replace(ConnectionStatus::Disconnected);
            (link.reader.take(), was)
        };
        if let Some(reader) = reader {
            reader.abort();
        }
        if was != ConnectionStatus::Disconnected {
            tracing::info!(endpoint = %self.shared.endpoint, "transport disconnected");
        }
    }

    /// Registers a consumer of the link.
    ///
    /// The link stays open while any lease is alive; dropping the last
    /// lease disconnects. Acquiring does not connect by itself.
    #[must_use]
    pub fn acquire(&self) -> ConnectionLease {
        let mut link = lock(&self.shared.link);
        link.consumers = link.consumers.saturating_add(1);
        ConnectionLease {
            manager: self.clone(),
        }
    }

    /// Returns the number of live leases.
    #[must_use]
    pub fn consumer_count(&self) -> usize {
        lock(&self.shared.link).consumers
    }

    /// Sends a named event. Best effort: when the link is not up the
    /// event is logged and dropped, and `false` is returned.
    pub fn emit(&self, event: &str, payload: Value) -> bool {
        let outbound = lock(&self.shared.link).outbound.clone();
        let Some(outbound) = outbound else {
            tracing::warn!(event, "transport not connected; dropping emit");
            return false;
        };
        match outbound.try_send(Frame::new(event, payload)) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::warn!(event, "outbound queue full; dropping emit");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                tracing::warn!(event, "transport closed; dropping emit");
                false
            }
        }
    }

    /// Sends a typed client event. See [`ConnectionManager::emit`].
    pub fn send_event(&self, event: &ClientEvent) -> bool {
        self.emit(event.name(), event.payload())
    }

    /// Registers a handler for an inbound event name.
    ///
    /// Any number of handlers may coexist for one name; each receives
    /// every matching frame.
    pub fn on<F>(&self, event: &str, handler: F) -> HandlerId
    where
        F: Fn(&ConnectionManager, &Value) + Send + Sync + 'static,
    {
        lock(&self.shared.dispatcher).on(event, Arc::new(handler))
    }

    /// Unregisters a handler. Returns `false` if it was already removed.
    pub fn off(&self, id: HandlerId) -> bool {
        lock(&self.shared.dispatcher).off(id)
    }

    /// Like [`ConnectionManager::on`], but unregisters when the returned
    /// guard is dropped.
    #[must_use]
    pub fn subscribe<F>(&self, event: &str, handler: F) -> Subscription
    where
        F: Fn(&ConnectionManager, &Value) + Send + Sync + 'static,
    {
        let id = self.on(event, handler);
        Subscription {
            shared: Arc::downgrade(&self.shared),
            id: Some(id),
        }
    }

    /// Returns the number of handlers registered for `event`.
    #[must_use]
    pub fn handler_count(&self, event: &str) -> usize {
        lock(&self.shared.dispatcher).handler_count(event)
    }

    /// Registers a hook run after every successful connection.
    pub fn on_connected<F>(&self, hook: F) -> HookId
    where
        F: Fn(&ConnectionManager) + Send + Sync + 'static,
    {
        let id = HookId(self.shared.next_hook.fetch_add(1, Ordering::Relaxed));
        lock(&self.shared.hooks).push((id, Arc::new(hook)));
        id
    }

    /// Removes a connection hook. Returns `false` if it was already gone.
    pub fn remove_hook(&self, id: HookId) -> bool {
        let mut hooks = lock(&self.shared.hooks);
        let before = hooks.len();
        hooks.retain(|(hid, _)| *hid != id);
        hooks.len() != before
    }

    /// Delivers one inbound frame to every handler registered for it.
    fn dispatch(&self, frame: &Frame) {
        let handlers = lock(&self.shared.dispatcher).handlers_for(&frame.event);
        if handlers.is_empty() {
            tracing::debug!(event = %frame.event, "no handler for inbound event");
            return;
        }
        tracing::debug!(event = %frame.event, handlers = handlers.len(), "dispatching inbound event");
        for handler in handlers {
            handler(self, &frame.data);
        }
    }

    fn release_consumer(&self) {
        let last = {
            let mut link = lock(&self.shared.link);
            link.consumers = link.consumers.saturating_sub(1);
            link.consumers == 0
        };
        if last {
            self.disconnect();
        }
    }
}

impl Shared {
    async fn establish(shared: &Arc<Self>) -> Result<(), RealtimeError> {
        let generation = {
            let mut link = lock(&shared.link);
            if *shared.status.borrow() != ConnectionStatus::Disconnected {
                return Ok(());
            }
            link.generation = link.generation.wrapping_add(1);
            shared.status.send_replace(ConnectionStatus::Connecting);
            link.generation
        };

        let Link { outbound, inbound } = match shared.connector.connect(&shared.endpoint).await {
            Ok(link) => link,
            Err(e) => {
                {
                    let link = lock(&shared.link);
                    if link.generation == generation {
                        shared.status.send_replace(ConnectionStatus::Disconnected);
                    }
                }
                tracing::warn!(endpoint = %shared.endpoint, error = %e, "transport connect failed");
                Self::schedule_reconnect(shared);
                return Err(e);
            }
        };

        {
            let mut link = lock(&shared.link);
            if link.generation != generation {
                tracing::debug!(generation, "discarding link from superseded connect");
                return Ok(());
            }
            link.outbound = Some(outbound);
            link.reader = Some(spawn_reader(Arc::downgrade(shared), inbound, generation));
            shared.status.send_replace(ConnectionStatus::Connected);
        }
        tracing::info!(endpoint = %shared.endpoint, "transport connected");

        let hooks: Vec<ConnectedHook> = lock(&shared.hooks)
            .iter()
            .map(|(_, hook)| Arc::clone(hook))
            .collect();
        let manager = ConnectionManager {
            shared: Arc::clone(shared),
        };
        for hook in hooks {
            hook(&manager);
        }
        Ok(())
    }

    fn link_lost(shared: &Arc<Self>, generation: u64) {
        {
            let mut link = lock(&shared.link);
            if link.generation != generation {
                tracing::debug!(generation, "ignoring end of stale link");
                return;
            }
            link.outbound = None;
            link.reader = None;
            shared.status.send_replace(ConnectionStatus::Disconnected);
        }
        tracing::warn!(endpoint = %shared.endpoint, "transport link lost");
        Self::schedule_reconnect(shared);
    }

    fn schedule_reconnect(shared: &Arc<Self>) {
        let teardowns = {
            let mut link = lock(&shared.link);
            if link.consumers == 0 || link.reconnecting {
                return;
            }
            link.reconnecting = true;
            link.teardowns
        };
        tokio::spawn(reconnect_loop(Arc::downgrade(shared), teardowns));
    }

    /// Returns `true` if a reconnect loop started before teardown number
    /// `teardowns` should keep going.
    fn should_reconnect(&self, teardowns: u64) -> bool {
        let link = lock(&self.link);
        link.teardowns == teardowns
            && link.consumers > 0
            && *self.status.borrow() == ConnectionStatus::Disconnected
    }

    fn finish_reconnect(&self, teardowns: u64) {
        let mut link = lock(&self.link);
        if link.teardowns == teardowns {
            link.reconnecting = false;
        }
    }
}

fn spawn_reader(
    shared: Weak<Shared>,
    mut inbound: mpsc::Receiver<Frame>,
    generation: u64,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(frame) = inbound.recv().await {
            let Some(shared) = shared.upgrade() else {
                return;
            };
            ConnectionManager { shared }.dispatch(&frame);
        }
        if let Some(shared) = shared.upgrade() {
            Shared::link_lost(&shared, generation);
        }
    })
}

async fn reconnect_loop(shared: Weak<Shared>, teardowns: u64) {
    let mut attempt: u32 = 0;
    loop {
        attempt = attempt.saturating_add(1);
        let delay = {
            let Some(strong) = shared.upgrade() else {
                return;
            };
            if !strong.policy.allows(attempt) {
                tracing::warn!(endpoint = %strong.endpoint, attempts = attempt - 1, "giving up reconnecting");
                strong.finish_reconnect(teardowns);
                return;
            }
            strong.policy.delay_for(attempt)
        };

        tokio::time::sleep(delay).await;

        let Some(strong) = shared.upgrade() else {
            return;
        };
        if !strong.should_reconnect(teardowns) {
            strong.finish_reconnect(teardowns);
            return;
        }
        match Shared::establish(&strong).await {
            Ok(()) => {
                strong.finish_reconnect(teardowns);
                return;
            }
            Err(e) => {
                tracing::warn!(attempt, error = %e, "reconnect attempt failed");
            }
        }
    }
}

/// A consumer's claim on the link. Dropping the last lease disconnects.
#[derive(Debug)]
pub struct ConnectionLease {
    manager: ConnectionManager,
}

impl ConnectionLease {
    /// Returns the manager this lease belongs to.
    #[must_use]
    pub fn manager(&self) -> &ConnectionManager {
        &self.manager
    }
}

impl Drop for ConnectionLease {
    fn drop(&mut self) {
        self.manager.release_consumer();
    }
}

/// Handler registration that is removed when dropped.
#[derive(Debug)]
pub struct Subscription {
    shared: Weak<Shared>,
    id: Option<HandlerId>,
}

impl Subscription {
    /// Returns the underlying handler id.
    #[must_use]
    pub fn id(&self) -> Option<HandlerId> {
        self.id
    }

    /// Unregisters now instead of at drop.
    pub fn cancel(mut self) {
        self.remove();
    }

    fn remove(&mut self) {
        if let (Some(id), Some(shared)) = (self.id.take(), self.shared.upgrade()) {
            lock(&shared.dispatcher).off(id);
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.remove();
    }
}
