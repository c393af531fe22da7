//! Room and identity-channel membership.
//!
//! [`RoomMembership`] keeps the set of rooms and identity channels this
//! process *wants* to be in. The server forgets memberships whenever the
//! link drops, so the desired set is re-issued from a connection hook on
//! every successful (re)connect rather than from scattered call sites.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, Weak};

use crate::domain::{ChatId, ClientEvent, Identity};
use crate::sync::lock;
use crate::transport::{ConnectionManager, HookId};

#[derive(Debug, Default)]
struct Desired {
    rooms: BTreeMap<ChatId, usize>,
    identities: HashMap<Identity, usize>,
}

#[derive(Debug)]
struct Inner {
    manager: ConnectionManager,
    desired: Mutex<Desired>,
    hook: HookId,
}

impl Inner {
    /// Re-issues every desired join and registration.
    fn reissue(&self, manager: &ConnectionManager) {
        let (rooms, identities): (Vec<ChatId>, Vec<Identity>) = {
            let desired = lock(&self.desired);
            (
                desired.rooms.keys().cloned().collect(),
                desired.identities.keys().cloned().collect(),
            )
        };
        for chat_id in rooms {
            if manager.send_event(&ClientEvent::JoinRoom {
                chat_id: chat_id.clone(),
            }) {
                tracing::info!(%chat_id, "room joined");
            }
        }
        for identity in identities {
            if manager.send_event(&register_event(&identity)) {
                tracing::info!(%identity, "identity registered");
            }
        }
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        self.manager.remove_hook(self.hook);
    }
}

fn register_event(identity: &Identity) -> ClientEvent {
    ClientEvent::Register {
        identity_id: identity.id.clone(),
        kind: identity.kind,
    }
}

/// Desired room and identity-channel membership for one connection.
#[derive(Debug, Clone)]
pub struct RoomMembership {
    inner: Arc<Inner>,
}

impl RoomMembership {
    /// Creates the membership tracker and hooks it to `manager`'s
    /// connected transition.
    #[must_use]
    pub fn new(manager: &ConnectionManager) -> Self {
        let inner = Arc::new_cyclic(|weak: &Weak<Inner>| {
            let weak = Weak::clone(weak);
            let hook = manager.on_connected(move |mgr| {
                if let Some(inner) = weak.upgrade() {
                    inner.reissue(mgr);
                }
            });
            Inner {
                manager: manager.clone(),
                desired: Mutex::new(Desired::default()),
                hook,
            }
        });
        Self { inner }
    }

    /// Requests membership in the room of `chat_id`.
    ///
    /// The join is sent now if the link is up and again after every
    /// reconnect, for as long as the returned guard lives.
    #[must_use]
    pub fn join_conversation(&self, chat_id: ChatId) -> RoomGuard {
        let first = {
            let mut desired = lock(&self.inner.desired);
            let count = desired.rooms.entry(chat_id.clone()).or_insert(0);
            *count = count.saturating_add(1);
            *count == 1
        };
        if first && self.inner.manager.is_connected() {
            if self.inner.manager.send_event(&ClientEvent::JoinRoom {
                chat_id: chat_id.clone(),
            }) {
                tracing::info!(%chat_id, "room joined");
            }
        }
        RoomGuard {
            inner: Arc::clone(&self.inner),
            chat_id,
        }
    }

    /// Announces that this runtime should receive notification events for
    /// `identity`.
    ///
    /// Idempotent: registering an identity that is already registered
    /// sends nothing new.
    #[must_use]
    pub fn register_identity(&self, identity: Identity) -> RegistrationGuard {
        let first = {
            let mut desired = lock(&self.inner.desired);
            let count = desired.identities.entry(identity.clone()).or_insert(0);
            *count = count.saturating_add(1);
            *count == 1
        };
        if first && self.inner.manager.is_connected() {
            if self.inner.manager.send_event(&register_event(&identity)) {
                tracing::info!(%identity, "identity registered");
            }
        }
        RegistrationGuard {
            inner: Arc::clone(&self.inner),
            identity,
        }
    }

    /// Returns `true` if some guard currently wants `chat_id`.
    #[must_use]
    pub fn wants_room(&self, chat_id: &ChatId) -> bool {
        lock(&self.inner.desired).rooms.contains_key(chat_id)
    }

    /// Returns `true` if some guard currently registers `identity`.
    #[must_use]
    pub fn wants_identity(&self, identity: &Identity) -> bool {
        lock(&self.inner.desired).identities.contains_key(identity)
    }

    /// Returns the desired rooms in id order.
    #[must_use]
    pub fn rooms(&self) -> Vec<ChatId> {
        lock(&self.inner.desired).rooms.keys().cloned().collect()
    }
}

/// Keeps a room in the desired set until dropped.
#[derive(Debug)]
pub struct RoomGuard {
    inner: Arc<Inner>,
    chat_id: ChatId,
}

impl RoomGuard {
    /// Returns the room this guard holds.
    #[must_use]
    pub fn chat_id(&self) -> &ChatId {
        &self.chat_id
    }
}

impl Drop for RoomGuard {
    fn drop(&mut self) {
        let mut desired = lock(&self.inner.desired);
        if let Some(count) = desired.rooms.get_mut(&self.chat_id) {
            *count = count.saturating_sub(1);
            if *count == 0 {
                desired.rooms.remove(&self.chat_id);
            }
        }
    }
}

/// Keeps an identity registered until dropped.
#[derive(Debug)]
pub struct RegistrationGuard {
    inner: Arc<Inner>,
    identity: Identity,
}

impl RegistrationGuard {
    /// Returns the registered identity.
    #[must_use]
    pub fn identity(&self) -> &Identity {
        &self.identity
    }
}

impl Drop for RegistrationGuard {
    fn drop(&mut self) {
        let mut desired = lock(&self.inner.desired);
        if let Some(count) = desired.identities.get_mut(&self.identity) {
            *count = count.saturating_sub(1);
            if *count == 0 {
                desired.identities.remove(&self.identity);
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::transport::{MemoryListener, MemoryPeer, ReconnectPolicy, memory_transport};

    fn setup() -> (ConnectionManager, RoomMembership, MemoryListener) {
        let (connector, listener) = memory_transport(16);
        let mgr = ConnectionManager::new(
            "mem://rooms",
            Arc::new(connector),
            ReconnectPolicy {
                delay: Duration::from_millis(10),
                max_delay: Duration::from_millis(20),
                max_attempts: 0,
            },
        );
        let membership = RoomMembership::new(&mgr);
        (mgr, membership, listener)
    }

    async fn accept(listener: &mut MemoryListener) -> MemoryPeer {
        let Ok(Some(peer)) = tokio::time::timeout(Duration::from_secs(2), listener.accept()).await
        else {
            panic!("expected a connection");
        };
        peer
    }

    async fn next_event(peer: &mut MemoryPeer) -> String {
        let Ok(Some(frame)) = tokio::time::timeout(Duration::from_secs(2), peer.recv()).await else {
            panic!("expected a frame");
        };
        frame.event
    }

    #[tokio::test]
    async fn join_before_connect_is_issued_on_connect() {
        let (mgr, membership, mut listener) = setup();
        let _room = membership.join_conversation(ChatId::from("c1"));
        assert!(mgr.connect().await.is_ok());

        let mut peer = accept(&mut listener).await;
        assert_eq!(next_event(&mut peer).await, "joinRoom");
    }

    #[tokio::test]
    async fn join_while_connected_is_sent_once() {
        let (mgr, membership, mut listener) = setup();
        assert!(mgr.connect().await.is_ok());
        let mut peer = accept(&mut listener).await;

        let _a = membership.join_conversation(ChatId::from("c1"));
        let _b = membership.join_conversation(ChatId::from("c1"));
        assert_eq!(next_event(&mut peer).await, "joinRoom");
        assert!(peer.try_recv().is_none());
    }

    #[tokio::test]
    async fn rejoins_after_reconnect() {
        let (mgr, membership, mut listener) = setup();
        let _lease = mgr.acquire();
        let _room = membership.join_conversation(ChatId::from("c1"));
        let _reg = membership.register_identity(Identity::vendor("v1"));
        assert!(mgr.connect().await.is_ok());

        let mut first = accept(&mut listener).await;
        assert_eq!(next_event(&mut first).await, "joinRoom");
        assert_eq!(next_event(&mut first).await, "registerVendor");
        drop(first);

        let mut second = accept(&mut listener).await;
        assert_eq!(next_event(&mut second).await, "joinRoom");
        assert_eq!(next_event(&mut second).await, "registerVendor");
    }

    #[tokio::test]
    async fn dropped_guard_is_not_rejoined() {
        let (mgr, membership, mut listener) = setup();
        let room = membership.join_conversation(ChatId::from("c1"));
        assert!(membership.wants_room(&ChatId::from("c1")));
        drop(room);
        assert!(!membership.wants_room(&ChatId::from("c1")));

        assert!(mgr.connect().await.is_ok());
        let mut peer = accept(&mut listener).await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(peer.try_recv().is_none());
    }

    #[tokio::test]
    async fn identity_registration_is_idempotent() {
        let (mgr, membership, mut listener) = setup();
        assert!(mgr.connect().await.is_ok());
        let mut peer = accept(&mut listener).await;

        let first = membership.register_identity(Identity::user("u1"));
        let second = membership.register_identity(Identity::user("u1"));
        assert_eq!(next_event(&mut peer).await, "registerUser");
        assert!(peer.try_recv().is_none());

        drop(first);
        assert!(membership.wants_identity(&Identity::user("u1")));
        drop(second);
        assert!(!membership.wants_identity(&Identity::user("u1")));
    }
}
