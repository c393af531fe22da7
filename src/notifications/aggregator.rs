//! Per-identity notification aggregator.
//!
//! One generic aggregator serves both users and vendors; the identity
//! kind is a parameter, not a separate code path. Starting it registers
//! the identity channel and subscribes to `newNotification`. Dropping the
//! last handle unsubscribes and releases the registration and the lease.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, Weak};

use super::feed::NotificationFeed;
use crate::api::NotificationApi;
use crate::delivery::DeliverySurface;
use crate::domain::events::names;
use crate::domain::{EventBus, Identity, Notification, NotificationId, ServerEvent, ViewEvent};
use crate::error::RealtimeError;
use crate::membership::{RegistrationGuard, RoomMembership};
use crate::sync::lock;
use crate::transport::{ConnectionLease, ConnectionManager, Subscription};

/// Pushes and local read flips seen while a bootstrap fetch is in flight;
/// re-applied after the fetched snapshot replaces the feed.
#[derive(Debug, Default)]
struct Racing {
    in_flight: bool,
    pushes: Vec<Notification>,
    reads: HashSet<NotificationId>,
}

#[derive(Debug)]
struct AggregatorInner {
    identity: Identity,
    api: Arc<dyn NotificationApi>,
    bus: EventBus,
    surface: DeliverySurface,
    feed: Mutex<NotificationFeed>,
    racing: Mutex<Racing>,
    last_error: Mutex<Option<RealtimeError>>,
    bootstrap_gate: tokio::sync::Mutex<()>,
    _subscription: Subscription,
    registration: RegistrationGuard,
    lease: ConnectionLease,
}

/// Notification list and unread counter of one identity.
#[derive(Debug, Clone)]
pub struct NotificationAggregator {
    inner: Arc<AggregatorInner>,
}

impl NotificationAggregator {
    /// Starts aggregating for `identity`: leases the link, registers the
    /// identity channel, subscribes to pushes, and connects.
    ///
    /// The list starts empty; call [`NotificationAggregator::bootstrap`].
    pub async fn start(
        manager: &ConnectionManager,
        membership: &RoomMembership,
        api: Arc<dyn NotificationApi>,
        bus: EventBus,
        surface: DeliverySurface,
        identity: Identity,
    ) -> Self {
        let inner = Arc::new_cyclic(|weak: &Weak<AggregatorInner>| {
            let lease = manager.acquire();
            let registration = membership.register_identity(identity.clone());
            let handler = Weak::clone(weak);
            let subscription = manager.subscribe(names::NEW_NOTIFICATION, move |_, data| {
                let Some(inner) = handler.upgrade() else {
                    return;
                };
                match ServerEvent::decode(names::NEW_NOTIFICATION, data) {
                    Ok(Some(ServerEvent::NewNotification(notification))) => {
                        inner.on_push(notification);
                    }
                    Ok(_) => {}
                    Err(e) => tracing::debug!(error = %e, "dropping undecodable notification"),
                }
            });
            AggregatorInner {
                identity,
                api,
                bus,
                surface,
                feed: Mutex::new(NotificationFeed::new()),
                racing: Mutex::new(Racing::default()),
                last_error: Mutex::new(None),
                bootstrap_gate: tokio::sync::Mutex::new(()),
                _subscription: subscription,
                registration,
                lease,
            }
        });
        tracing::info!(identity = %inner.identity, "notification aggregator started");

        let _ = inner.lease.manager().connect().await;
        Self { inner }
    }

    /// Returns the identity this aggregator serves.
    #[must_use]
    pub fn identity(&self) -> &Identity {
        self.inner.registration.identity()
    }

    /// Fetches the full notification list and replaces local state.
    ///
    /// Pushes that arrive while the fetch is in flight are re-applied on
    /// top of the fetched list, de-duplicated by id. Entries marked read
    /// meanwhile stay read even if the snapshot predates the acknowledgement.
    ///
    /// # Errors
    ///
    /// Returns the fetch error, which is also kept as
    /// [`NotificationAggregator::last_error`]. Local state is unchanged.
    pub async fn bootstrap(&self) -> Result<(), RealtimeError> {
        let _gate = self.inner.bootstrap_gate.lock().await;
        lock(&self.inner.racing).in_flight = true;

        let fetched = self.inner.api.fetch_notifications(&self.inner.identity).await;
        let mut racing = lock(&self.inner.racing);
        racing.in_flight = false;
        let pushes = std::mem::take(&mut racing.pushes);
        let reads = std::mem::take(&mut racing.reads);

        match fetched {
            Ok(notifications) => {
                let unread = {
                    let mut feed = lock(&self.inner.feed);
                    feed.replace(notifications);
                    for notification in pushes {
                        feed.push(notification);
                    }
                    for id in &reads {
                        feed.mark_read(id);
                    }
                    feed.unread_count()
                };
                drop(racing);
                *lock(&self.inner.last_error) = None;
                tracing::info!(identity = %self.inner.identity, unread, "notifications bootstrapped");
                self.inner.unread_changed(unread);
                Ok(())
            }
            Err(e) => {
                drop(racing);
                tracing::warn!(identity = %self.inner.identity, error = %e, "notification bootstrap failed");
                *lock(&self.inner.last_error) = Some(e.clone());
                Err(e)
            }
        }
    }

    /// Applies one pushed notification as if it arrived on the transport.
    ///
    /// Returns `true` if it was inserted.
    pub fn push(&self, notification: Notification) -> bool {
        self.inner.on_push(notification)
    }

    /// Marks one notification read: flips it locally first, then
    /// acknowledges it remotely.
    ///
    /// Returns `Ok(false)` when the entry was already read or unknown; no
    /// remote call is made then. A remote failure does not roll back the
    /// local flip.
    ///
    /// # Errors
    ///
    /// Returns the remote error, which is also kept as
    /// [`NotificationAggregator::last_error`].
    pub async fn mark_read(&self, id: &NotificationId) -> Result<bool, RealtimeError> {
        if !self.inner.flip_read(id) {
            return Ok(false);
        }
        self.inner.acknowledge_remote(id).await?;
        Ok(true)
    }

    /// Like [`NotificationAggregator::mark_read`], but only the local flip
    /// happens now; the remote call runs on a spawned task and its failure
    /// only shows up in the log and in `last_error`. Must be called within a Tokio runtime.
    pub fn mark_read_detached(&self, id: NotificationId) -> bool {
        if !self.inner.flip_read(&id) {
            return false;
        }
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            let _ = inner.acknowledge_remote(&id).await;
        });
        true
    }

    /// Flips every local entry to read and zeroes the counter. Local only.
    pub fn mark_all_read(&self) -> usize {
        let changed = {
            let mut racing = lock(&self.inner.racing);
            let mut feed = lock(&self.inner.feed);
            if racing.in_flight {
                let unread = feed.entries().iter().filter(|n| !n.is_read).map(|n| n.id.clone());
                racing.reads.extend(unread);
            }
            feed.mark_all_read()
        };
        if changed > 0 {
            self.inner.unread_changed(0);
        }
        changed
    }

    /// Returns a snapshot of the entries, newest first.
    #[must_use]
    pub fn notifications(&self) -> Vec<Notification> {
        lock(&self.inner.feed).entries().to_vec()
    }

    /// Returns the unread count.
    #[must_use]
    pub fn unread_count(&self) -> usize {
        lock(&self.inner.feed).unread_count()
    }

    /// Returns the most recent bootstrap or mark-read failure, if any.
    #[must_use]
    pub fn last_error(&self) -> Option<RealtimeError> {
        lock(&self.inner.last_error).clone()
    }
}

impl AggregatorInner {
    // Lock order is racing, then feed, so a flip or push cannot slip
    // between a bootstrap's snapshot swap and its re-apply.
    fn flip_read(&self, id: &NotificationId) -> bool {
        let (changed, unread) = {
            let mut racing = lock(&self.racing);
            let mut feed = lock(&self.feed);
            let changed = feed.mark_read(id);
            if changed && racing.in_flight {
                racing.reads.insert(id.clone());
            }
            (changed, feed.unread_count())
        };
        if changed {
            self.unread_changed(unread);
        }
        changed
    }

    async fn acknowledge_remote(&self, id: &NotificationId) -> Result<(), RealtimeError> {
        if let Err(e) = self.api.mark_read(id).await {
            tracing::warn!(identity = %self.identity, %id, error = %e, "mark-read failed");
            *lock(&self.last_error) = Some(e.clone());
            return Err(e);
        }
        Ok(())
    }

    fn on_push(&self, notification: Notification) -> bool {
        if !notification.is_addressed_to(&self.identity) {
            tracing::debug!(
                identity = %self.identity,
                id = %notification.id,
                "notification for another recipient ignored"
            );
            return false;
        }
        let (inserted, unread) = {
            let mut racing = lock(&self.racing);
            if racing.in_flight {
                racing.pushes.push(notification.clone());
            }
            let mut feed = lock(&self.feed);
            let inserted = feed.push(notification.clone());
            (inserted, feed.unread_count())
        };
        self.surface.notify(&self.identity, &notification);
        if !inserted {
            tracing::debug!(id = %notification.id, "duplicate notification skipped");
            return false;
        }
        self.bus.publish(ViewEvent::NotificationReceived {
            identity: self.identity.clone(),
            notification,
        });
        self.unread_changed(unread);
        true
    }

    fn unread_changed(&self, unread: usize) {
        self.surface.badge(&self.identity, unread);
        self.bus.publish(ViewEvent::UnreadChanged {
            identity: self.identity.clone(),
            unread,
        });
    }
}
