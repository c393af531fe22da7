//! Live booking status updates.
//!
//! A [`BookingWatcher`] keeps the booking list a view already loaded in
//! step with `bookingUpdated` pushes: the matching booking is replaced by
//! id and one toast is raised per (booking, status). It also registers the
//! viewer's identity channel, which is where the backend sends booking
//! pushes.

use std::sync::{Arc, Mutex, Weak};

use crate::delivery::DeliverySurface;
use crate::domain::events::names;
use crate::domain::{
    Booking, BookingId, ClientEvent, EventBus, Identity, IdentityId, ServerEvent, ViewEvent,
};
use crate::membership::{RegistrationGuard, RoomMembership};
use crate::sync::lock;
use crate::transport::{ConnectionLease, ConnectionManager, Subscription};

#[derive(Debug)]
struct WatcherInner {
    manager: ConnectionManager,
    bus: EventBus,
    surface: DeliverySurface,
    bookings: Mutex<Vec<Booking>>,
    _subscription: Subscription,
    registration: RegistrationGuard,
    _lease: ConnectionLease,
}

/// Booking list kept current by live pushes.
#[derive(Debug, Clone)]
pub struct BookingWatcher {
    inner: Arc<WatcherInner>,
}

impl BookingWatcher {
    /// Starts watching `bookings` on behalf of `viewer` and connects.
    pub async fn start(
        manager: &ConnectionManager,
        membership: &RoomMembership,
        bus: EventBus,
        surface: DeliverySurface,
        viewer: Identity,
        bookings: Vec<Booking>,
    ) -> Self {
        let inner = Arc::new_cyclic(|weak: &Weak<WatcherInner>| {
            let lease = manager.acquire();
            let registration = membership.register_identity(viewer);
            let handler = Weak::clone(weak);
            let subscription = manager.subscribe(names::BOOKING_UPDATED, move |_, data| {
                let Some(inner) = handler.upgrade() else {
                    return;
                };
                match ServerEvent::decode(names::BOOKING_UPDATED, data) {
                    Ok(Some(ServerEvent::BookingUpdated(booking))) => {
                        inner.apply(booking);
                    }
                    Ok(_) => {}
                    Err(e) => tracing::debug!(error = %e, "dropping undecodable booking update"),
                }
            });
            WatcherInner {
                manager: manager.clone(),
                bus,
                surface,
                bookings: Mutex::new(bookings),
                _subscription: subscription,
                registration,
                _lease: lease,
            }
        });
        let _ = inner.manager.connect().await;
        Self { inner }
    }

    /// Returns the viewer.
    #[must_use]
    pub fn viewer(&self) -> &Identity {
        self.inner.registration.identity()
    }

    /// Replaces the watched list, as after the view refetched it.
    pub fn replace(&self, bookings: Vec<Booking>) {
        *lock(&self.inner.bookings) = bookings;
    }

    /// Returns a snapshot of the watched list.
    #[must_use]
    pub fn bookings(&self) -> Vec<Booking> {
        lock(&self.inner.bookings).clone()
    }

    /// Applies one update. Returns `false` if the booking is not watched.
    pub fn apply(&self, booking: Booking) -> bool {
        self.inner.apply(booking)
    }

    /// Tells the vendor side that the viewer cancelled a booking. Call
    /// after the cancellation succeeded through the booking collaborator.
    pub fn announce_cancellation(&self, vendor_id: &IdentityId, booking_id: &BookingId) -> bool {
        let sent = self
            .inner
            .manager
            .send_event(&ClientEvent::BookingCancelledByUser {
                user_id: self.viewer().id.clone(),
                vendor_id: vendor_id.clone(),
                booking_id: booking_id.clone(),
            });
        if sent {
            tracing::info!(%booking_id, %vendor_id, "booking cancellation announced");
        }
        sent
    }
}

impl WatcherInner {
    fn apply(&self, booking: Booking) -> bool {
        let replaced = {
            let mut bookings = lock(&self.bookings);
            match bookings.iter_mut().find(|b| b.id == booking.id) {
                Some(slot) => {
                    *slot = booking.clone();
                    true
                }
                None => false,
            }
        };
        if !replaced {
            tracing::debug!(booking_id = %booking.id, "update for unwatched booking ignored");
            return false;
        }
        self.surface.toast(
            &format!("booking:{}:{}", booking.id, booking.status),
            &format!("Booking {} successfully!", booking.status),
            None,
        );
        self.bus.publish(ViewEvent::BookingUpdated { booking });
        true
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use std::time::Duration;

    use serde_json::json;

    use super::*;
    use crate::delivery::{AlertSink, Toast};
    use crate::domain::BookingStatus;
    use crate::transport::{MemoryListener, ReconnectPolicy, memory_transport};

    #[derive(Debug, Default)]
    struct Toasts(Mutex<Vec<String>>);

    impl AlertSink for Toasts {
        fn show_toast(&self, toast: &Toast) {
            lock(&self.0).push(toast.text.clone());
        }

        fn set_badge(&self, _: &Identity, _: usize) {}
    }

    fn booking(id: &str, status: &str) -> Booking {
        let Ok(b) = serde_json::from_value(json!({ "_id": id, "status": status, "price": 900 })) else {
            panic!("fixture must decode");
        };
        b
    }

    async fn watcher(toasts: Arc<Toasts>, viewer: Identity) -> (BookingWatcher, MemoryListener) {
        let (connector, listener) = memory_transport(16);
        let manager = ConnectionManager::new("mem://b", Arc::new(connector), ReconnectPolicy::default());
        let membership = RoomMembership::new(&manager);
        let watcher = BookingWatcher::start(
            &manager,
            &membership,
            EventBus::new(16),
            DeliverySurface::new(toasts, Duration::from_secs(5)),
            viewer,
            vec![booking("b1", "pending"), booking("b2", "pending")],
        )
        .await;
        (watcher, listener)
    }

    #[tokio::test]
    async fn replaces_by_id_and_toasts_once_per_status() {
        let toasts = Arc::new(Toasts::default());
        let (watcher, _listener) = watcher(Arc::clone(&toasts), Identity::vendor("v1")).await;

        assert!(watcher.apply(booking("b1", "confirmed")));
        assert!(watcher.apply(booking("b1", "confirmed")));
        assert!(!watcher.apply(booking("zz", "confirmed")));

        let statuses: Vec<BookingStatus> = watcher.bookings().into_iter().map(|b| b.status).collect();
        assert_eq!(statuses, vec![BookingStatus::Confirmed, BookingStatus::Pending]);
        assert_eq!(
            *lock(&toasts.0),
            vec!["Booking confirmed successfully!".to_string()]
        );
    }

    #[tokio::test]
    async fn pushed_update_reaches_watcher() {
        let toasts = Arc::new(Toasts::default());
        let (watcher, mut listener) = watcher(Arc::clone(&toasts), Identity::vendor("v1")).await;
        let Some(mut peer) = listener.accept().await else {
            panic!("expected a connection");
        };
        let Some(frame) = peer.recv().await else {
            panic!("expected registration");
        };
        assert_eq!(frame.event, "registerVendor");

        assert!(peer.send("bookingUpdated", json!({ "_id": "b2", "status": "cancelled" })).await);
        for _ in 0..100 {
            if watcher.bookings().iter().any(|b| b.status == BookingStatus::Cancelled) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        let Some(b2) = watcher.bookings().into_iter().find(|b| b.id.as_str() == "b2") else {
            panic!("b2 must still be watched");
        };
        assert_eq!(b2.status, BookingStatus::Cancelled);
    }

    #[tokio::test]
    async fn cancellation_is_announced() {
        let (watcher, mut listener) = watcher(Arc::new(Toasts::default()), Identity::user("u1")).await;
        let Some(mut peer) = listener.accept().await else {
            panic!("expected a connection");
        };
        let Some(registration) = peer.recv().await else {
            panic!("expected registration");
        };
        assert_eq!(registration.event, "registerUser");

        assert!(watcher.announce_cancellation(&IdentityId::from("v9"), &BookingId::from("b1")));
        let Some(frame) = peer.recv().await else {
            panic!("expected announcement");
        };
        assert_eq!(frame.event, "bookingCancelledByUser");
        assert_eq!(
            frame.data,
            json!({ "userId": "u1", "vendorId": "v9", "bookingId": "b1" })
        );
    }
}
