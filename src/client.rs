//! Composition root.
//!
//! One [`RealtimeClient`] is built at process start and handed to every
//! view that needs real-time data. It owns the single connection manager,
//! the room membership tracker, the view event bus, the REST
//! collaborators, and the delivery surface, so components never reach for
//! ambient globals.

use std::sync::Arc;

use tokio::sync::broadcast;

use crate::api::{ChatApi, NotificationApi, RestClient};
use crate::bookings::BookingWatcher;
use crate::chat::{ChatSession, ChatTarget, load_conversations};
use crate::config::RealtimeConfig;
use crate::delivery::{AlertSink, DeliverySurface, TracingSink};
use crate::domain::{
    Booking, ConversationSummary, EventBus, Identity, ViewEvent, ViewFilter, ViewStream,
};
use crate::error::RealtimeError;
use crate::membership::RoomMembership;
use crate::notifications::NotificationAggregator;
use crate::transport::{ConnectionManager, ConnectionStatus};

/// Capacity of the view event bus.
const BUS_CAPACITY: usize = 1024;

/// Shared real-time services of one process.
#[derive(Debug, Clone)]
pub struct RealtimeClient {
    config: RealtimeConfig,
    manager: ConnectionManager,
    membership: RoomMembership,
    bus: EventBus,
    chat_api: Arc<dyn ChatApi>,
    notification_api: Arc<dyn NotificationApi>,
    surface: DeliverySurface,
}

impl RealtimeClient {
    /// Builds the production stack: WebSocket transport, `reqwest`
    /// collaborators, and alerts written to the log.
    ///
    /// # Errors
    ///
    /// Returns [`RealtimeError::InvalidConfig`] if the socket endpoint
    /// cannot be derived, or [`RealtimeError::Internal`] if the HTTP client
    /// cannot be built.
    pub fn new(config: RealtimeConfig) -> Result<Self, RealtimeError> {
        Self::with_sink(config, Arc::new(TracingSink))
    }

    /// Like [`RealtimeClient::new`] with a host-provided alert renderer.
    ///
    /// # Errors
    ///
    /// Same as [`RealtimeClient::new`].
    pub fn with_sink(
        config: RealtimeConfig,
        sink: Arc<dyn AlertSink>,
    ) -> Result<Self, RealtimeError> {
        let manager = ConnectionManager::from_config(&config)?;
        let rest = Arc::new(RestClient::new(&config)?);
        Ok(Self::from_parts(
            config,
            manager,
            Arc::clone(&rest) as Arc<dyn ChatApi>,
            rest,
            sink,
        ))
    }

    /// Assembles a client from already-built parts, e.g. an in-memory
    /// transport and fake collaborators.
    #[must_use]
    pub fn from_parts(
        config: RealtimeConfig,
        manager: ConnectionManager,
        chat_api: Arc<dyn ChatApi>,
        notification_api: Arc<dyn NotificationApi>,
        sink: Arc<dyn AlertSink>,
    ) -> Self {
        let membership = RoomMembership::new(&manager);
        let surface = DeliverySurface::new(sink, config.toast_auto_close);
        tracing::debug!(endpoint = manager.endpoint(), "realtime client assembled");
        Self {
            config,
            manager,
            membership,
            bus: EventBus::new(BUS_CAPACITY),
            chat_api,
            notification_api,
            surface,
        }
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &RealtimeConfig {
        &self.config
    }

    /// Returns the shared connection manager.
    #[must_use]
    pub fn manager(&self) -> &ConnectionManager {
        &self.manager
    }

    /// Returns the room membership tracker.
    #[must_use]
    pub fn membership(&self) -> &RoomMembership {
        &self.membership
    }

    /// Returns the delivery surface.
    #[must_use]
    pub fn surface(&self) -> &DeliverySurface {
        &self.surface
    }

    /// Returns the current link status.
    #[must_use]
    pub fn status(&self) -> ConnectionStatus {
        self.manager.status()
    }

    /// Subscribes to view events from every component of this client.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<ViewEvent> {
        self.bus.subscribe()
    }

    /// Opens a view stream scoped to one conversation, one feed, or
    /// bookings.
    #[must_use]
    pub fn watch(&self, filter: ViewFilter) -> ViewStream {
        self.bus.watch(filter)
    }

    /// Opens a conversation and loads its history.
    ///
    /// A failed history load does not fail the call: the session is
    /// returned in the failed phase with `last_error` set, and
    /// [`ChatSession::load_history`] may be retried.
    pub async fn open_chat(&self, target: ChatTarget) -> ChatSession {
        let session = ChatSession::open(
            &self.manager,
            &self.membership,
            Arc::clone(&self.chat_api),
            self.bus.clone(),
            self.config.typing_quiet_window,
            target,
        )
        .await;
        if let Err(e) = session.load_history().await {
            tracing::warn!(chat_id = %session.chat_id(), error = %e, "history load failed");
        }
        session
    }

    /// Starts the notification aggregator of `identity` and bootstraps it.
    ///
    /// A failed bootstrap is recorded on the aggregator, which keeps
    /// accepting pushes.
    pub async fn start_notifications(&self, identity: Identity) -> NotificationAggregator {
        let aggregator = NotificationAggregator::start(
            &self.manager,
            &self.membership,
            Arc::clone(&self.notification_api),
            self.bus.clone(),
            self.surface.clone(),
            identity,
        )
        .await;
        if let Err(e) = aggregator.bootstrap().await {
            tracing::warn!(identity = %aggregator.identity(), error = %e, "notification bootstrap failed");
        }
        aggregator
    }

    /// Starts keeping `bookings` current for `viewer`.
    pub async fn watch_bookings(&self, viewer: Identity, bookings: Vec<Booking>) -> BookingWatcher {
        BookingWatcher::start(
            &self.manager,
            &self.membership,
            self.bus.clone(),
            self.surface.clone(),
            viewer,
            bookings,
        )
        .await
    }

    /// Lists the conversations of `identity`, most recently active first.
    ///
    /// # Errors
    ///
    /// Returns the chat collaborator's error.
    pub async fn conversations(
        &self,
        identity: &Identity,
    ) -> Result<Vec<ConversationSummary>, RealtimeError> {
        load_conversations(self.chat_api.as_ref(), identity).await
    }
}
