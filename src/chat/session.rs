//! One open conversation: the message stream controller.
//!
//! A [`ChatSession`] lives exactly as long as the view showing the
//! conversation. Opening it takes a connection lease, joins the room, and
//! registers the `receiveMessage` and `typing` handlers. Dropping it
//! unregisters every handler, leaves the desired room set, and releases
//! the lease, so a remounted session never sees callbacks from a disposed
//! one.

use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use uuid::Uuid;

use super::stream::{MessageStream, ReceiveOutcome, StreamPhase};
use super::typing::TypingIndicator;
use crate::api::{ChatApi, NewMessage};
use crate::domain::events::names;
use crate::domain::{
    ChatId, ChatMessage, ClientEvent, EventBus, Identity, IdentityId, IdentityType, MessageContent,
    MessageId, ServerEvent, ViewEvent,
};
use crate::error::RealtimeError;
use crate::membership::{RoomGuard, RoomMembership};
use crate::sync::lock;
use crate::transport::{ConnectionLease, ConnectionManager, Subscription};

/// Which conversation to open, and as whom.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatTarget {
    /// Conversation id.
    pub chat_id: ChatId,
    /// The local participant.
    pub viewer: Identity,
    /// The other participant.
    pub peer: IdentityId,
}

impl ChatTarget {
    /// Returns the vendor side of the conversation.
    #[must_use]
    pub fn vendor_id(&self) -> &IdentityId {
        match self.viewer.kind {
            IdentityType::Vendor => &self.viewer.id,
            IdentityType::User => &self.peer,
        }
    }
}

/// Outcome of an accepted send.
///
/// Persistence and broadcast are independent effects; neither rolls the
/// other back. The optimistic entry stays visible either way.
#[derive(Debug, Clone, PartialEq)]
pub struct SendReceipt {
    /// Handle of the optimistic entry.
    pub local_id: Uuid,
    /// Result of the durable write, with the stored id when returned.
    pub persisted: Result<Option<MessageId>, RealtimeError>,
    /// Whether the live broadcast was handed to the transport.
    pub broadcast: bool,
}

impl SendReceipt {
    /// Returns `true` if both effects succeeded.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.persisted.is_ok() && self.broadcast
    }
}

#[derive(Debug)]
struct SessionInner {
    target: ChatTarget,
    manager: ConnectionManager,
    api: Arc<dyn ChatApi>,
    bus: EventBus,
    stream: Mutex<MessageStream>,
    typing: TypingIndicator,
    draft: Mutex<String>,
    last_error: Mutex<Option<RealtimeError>>,
    load_gate: tokio::sync::Mutex<()>,
    // Dropped in declaration order: handlers first, then the room, then
    // the lease.
    _subscriptions: Vec<Subscription>,
    room: RoomGuard,
    lease: ConnectionLease,
}

/// Controller of one open conversation.
#[derive(Debug, Clone)]
pub struct ChatSession {
    inner: Arc<SessionInner>,
}

impl ChatSession {
    /// Opens a conversation: leases the link, joins the room, registers
    /// the inbound handlers, and connects.
    ///
    /// History is not fetched here; call [`ChatSession::load_history`].
    /// A failed connect is logged and retried in the background while the
    /// session lives.
    pub async fn open(
        manager: &ConnectionManager,
        membership: &RoomMembership,
        api: Arc<dyn ChatApi>,
        bus: EventBus,
        typing_quiet: Duration,
        target: ChatTarget,
    ) -> Self {
        let inner = Arc::new_cyclic(|weak: &Weak<SessionInner>| {
            let lease = manager.acquire();
            let room = membership.join_conversation(target.chat_id.clone());

            let typing_bus = bus.clone();
            let typing_chat = target.chat_id.clone();
            let typing = TypingIndicator::new(typing_quiet, move |active| {
                typing_bus.publish(ViewEvent::PeerTyping {
                    chat_id: typing_chat.clone(),
                    active,
                });
            });

            let on_message = Weak::clone(weak);
            let on_typing = Weak::clone(weak);
            let subscriptions = vec![
                manager.subscribe(names::RECEIVE_MESSAGE, move |_, data| {
                    if let Some(inner) = on_message.upgrade() {
                        inner.handle_inbound(names::RECEIVE_MESSAGE, data);
                    }
                }),
                manager.subscribe(names::TYPING, move |_, data| {
                    if let Some(inner) = on_typing.upgrade() {
                        inner.handle_inbound(names::TYPING, data);
                    }
                }),
            ];

            SessionInner {
                stream: Mutex::new(MessageStream::new(
                    target.chat_id.clone(),
                    target.viewer.id.clone(),
                )),
                target,
                manager: manager.clone(),
                api,
                bus,
                typing,
                draft: Mutex::new(String::new()),
                last_error: Mutex::new(None),
                load_gate: tokio::sync::Mutex::new(()),
                _subscriptions: subscriptions,
                room,
                lease,
            }
        });
        tracing::info!(chat_id = %inner.target.chat_id, viewer = %inner.target.viewer, "chat session opened");

        // Failures are logged by the manager and retried under the lease.
        let _ = inner.lease.manager().connect().await;
        Self { inner }
    }

    /// Returns what this session was opened for.
    #[must_use]
    pub fn target(&self) -> &ChatTarget {
        &self.inner.target
    }

    /// Returns the conversation id.
    #[must_use]
    pub fn chat_id(&self) -> &ChatId {
        self.inner.room.chat_id()
    }

    /// Fetches the conversation history and enters `Ready`.
    ///
    /// A no-op once ready. After a failure the session stays in `Failed`
    /// until the caller invokes this again; there is no automatic retry.
    /// Concurrent calls share one fetch.
    ///
    /// # Errors
    ///
    /// Returns the fetch error, which is also kept as
    /// [`ChatSession::last_error`].
    pub async fn load_history(&self) -> Result<(), RealtimeError> {
        let _gate = self.inner.load_gate.lock().await;
        {
            let mut stream = lock(&self.inner.stream);
            if stream.is_ready() {
                return Ok(());
            }
            stream.begin_load();
        }

        let chat_id = &self.inner.target.chat_id;
        match self.inner.api.fetch_messages(chat_id).await {
            Ok(history) => {
                let (count, flushed) = {
                    let mut stream = lock(&self.inner.stream);
                    let flushed = stream.load(history);
                    (stream.messages().len(), flushed)
                };
                *lock(&self.inner.last_error) = None;
                tracing::info!(%chat_id, count, buffered = flushed.len(), "history loaded");
                self.inner.bus.publish(ViewEvent::HistoryLoaded {
                    chat_id: chat_id.clone(),
                    count,
                });
                for message in flushed {
                    self.inner.bus.publish(ViewEvent::MessageAppended {
                        chat_id: chat_id.clone(),
                        message,
                    });
                }
                self.inner.acknowledge_seen();
                Ok(())
            }
            Err(e) => {
                tracing::warn!(%chat_id, error = %e, "history fetch failed");
                lock(&self.inner.stream).fail(e.clone());
                *lock(&self.inner.last_error) = Some(e.clone());
                Err(e)
            }
        }
    }

    /// Sends a message: appends it optimistically, persists it through
    /// the REST collaborator, then broadcasts it to the room.
    ///
    /// # Errors
    ///
    /// Returns [`RealtimeError::EmptyMessage`] for blank text and
    /// [`RealtimeError::NotReady`] before history has loaded. In both cases
    /// nothing is appended and nothing is sent. Persistence and broadcast
    /// failures are reported in the [`SendReceipt`] instead.
    pub async fn send(&self, text: &str) -> Result<SendReceipt, RealtimeError> {
        let content = MessageContent::parse(text)?;
        let target = &self.inner.target;
        let optimistic =
            ChatMessage::optimistic(target.chat_id.clone(), target.viewer.id.clone(), content.clone());
        let local_id = lock(&self.inner.stream).push_local(optimistic.clone())?;
        self.inner.bus.publish(ViewEvent::MessageAppended {
            chat_id: target.chat_id.clone(),
            message: optimistic,
        });

        let body = NewMessage::new(
            target.chat_id.clone(),
            target.viewer.id.clone(),
            &content,
            target.vendor_id().clone(),
        );
        let persisted = match self.inner.api.post_message(&body).await {
            Ok(stored) => {
                lock(&self.inner.stream).confirm_local(local_id, stored.as_ref());
                Ok(stored.and_then(|m| m.id))
            }
            Err(e) => {
                tracing::warn!(chat_id = %target.chat_id, error = %e, "message persistence failed");
                lock(&self.inner.stream).mark_unconfirmed(local_id, &e.to_string());
                *lock(&self.inner.last_error) = Some(e.clone());
                Err(e)
            }
        };
        self.inner.bus.publish(ViewEvent::MessageSettled {
            chat_id: target.chat_id.clone(),
            local_id,
            message_id: persisted.as_ref().ok().cloned().flatten(),
            confirmed: persisted.is_ok(),
        });

        let broadcast = self.inner.manager.send_event(&ClientEvent::SendMessage {
            chat_id: target.chat_id.clone(),
            message: content.into_inner(),
            sender_id: target.viewer.id.clone(),
            vendor_id: target.vendor_id().clone(),
        });

        Ok(SendReceipt {
            local_id,
            persisted,
            broadcast,
        })
    }

    /// Replaces the composer draft and announces typing to the room.
    pub fn compose(&self, text: &str) {
        *lock(&self.inner.draft) = text.to_string();
        self.send_typing();
    }

    /// Returns the composer draft.
    #[must_use]
    pub fn draft(&self) -> String {
        lock(&self.inner.draft).clone()
    }

    /// Sends the composer draft and clears it once the send is accepted.
    ///
    /// # Errors
    ///
    /// See [`ChatSession::send`]; the draft is kept on error.
    pub async fn send_draft(&self) -> Result<SendReceipt, RealtimeError> {
        let text = self.draft();
        let receipt = self.send(&text).await?;
        let mut draft = lock(&self.inner.draft);
        if *draft == text {
            draft.clear();
        }
        Ok(receipt)
    }

    /// Announces one composer keystroke to the room. Not throttled.
    pub fn send_typing(&self) -> bool {
        self.inner.manager.send_event(&ClientEvent::Typing {
            chat_id: self.inner.target.chat_id.clone(),
            sender: self.inner.target.viewer.id.clone(),
        })
    }

    /// Returns a snapshot of the visible messages.
    #[must_use]
    pub fn messages(&self) -> Vec<ChatMessage> {
        lock(&self.inner.stream).messages().to_vec()
    }

    /// Returns the load phase.
    #[must_use]
    pub fn phase(&self) -> StreamPhase {
        lock(&self.inner.stream).phase().clone()
    }

    /// Returns `true` once history has loaded.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        lock(&self.inner.stream).is_ready()
    }

    /// Returns the most recent load or persistence failure, if any.
    #[must_use]
    pub fn last_error(&self) -> Option<RealtimeError> {
        lock(&self.inner.last_error).clone()
    }

    /// Returns `true` while the peer is typing.
    #[must_use]
    pub fn peer_typing(&self) -> bool {
        self.inner.typing.is_active()
    }

    /// Returns a receiver for the peer typing flag.
    #[must_use]
    pub fn watch_typing(&self) -> tokio::sync::watch::Receiver<bool> {
        self.inner.typing.watch()
    }
}

impl SessionInner {
    fn handle_inbound(&self, event: &str, data: &serde_json::Value) {
        match ServerEvent::decode(event, data) {
            Ok(Some(ServerEvent::ReceiveMessage(message))) => self.on_message(message),
            Ok(Some(ServerEvent::Typing(signal))) => {
                let same_room = signal
                    .chat_id
                    .as_ref()
                    .is_none_or(|id| id == &self.target.chat_id);
                if same_room && signal.sender != self.target.viewer.id {
                    self.typing.signal();
                }
            }
            Ok(_) => {}
            Err(e) => tracing::debug!(event, error = %e, "dropping undecodable inbound payload"),
        }
    }

    fn on_message(&self, message: ChatMessage) {
        let chat_id = &self.target.chat_id;
        if message.chat_id.is_none() {
            tracing::debug!(%chat_id, "inbound message without chat id attributed to the open room");
        }
        let outcome = lock(&self.stream).receive(message.clone());
        match outcome {
            ReceiveOutcome::Appended => {
                self.bus.publish(ViewEvent::MessageAppended {
                    chat_id: chat_id.clone(),
                    message,
                });
                self.acknowledge_seen();
            }
            other => tracing::debug!(%chat_id, outcome = ?other, "inbound message not appended"),
        }
    }

    /// Marks the peer's messages read locally and sends the read receipt.
    fn acknowledge_seen(&self) {
        lock(&self.stream).mark_peer_read();
        self.manager.send_event(&ClientEvent::MarkSeen {
            chat_id: self.target.chat_id.clone(),
            user_id: self.target.viewer.id.clone(),
        });
    }
}
