//! Per-conversation message sequence.
//!
//! [`MessageStream`] is the synchronous core of a chat session: it holds
//! the ordered messages of one conversation and decides what happens to
//! each inbound or outbound message. It performs no I/O; the session
//! drives it and performs the side effects.
//!
//! ```text
//!   Loading ──load()──► Ready
//!      │  ▲                │
//!  fail()│  └─begin_load()─┘ (only from Failed)
//!      ▼  │
//!    Failed
//! ```

use std::collections::HashSet;

use uuid::Uuid;

use crate::domain::{ChatId, ChatMessage, DeliveryState, IdentityId, MessageId};
use crate::error::RealtimeError;

/// Load phase of a conversation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamPhase {
    /// History fetch in flight; live messages are buffered.
    Loading,
    /// History loaded; sends and live appends are accepted.
    Ready,
    /// History fetch failed; live messages are discarded until a retry.
    Failed(RealtimeError),
}

/// What [`MessageStream::receive`] did with an inbound message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiveOutcome {
    /// Appended at the end of the sequence.
    Appended,
    /// Held until history finishes loading.
    Buffered,
    /// Matched the viewer's own optimistic entry; nothing appended.
    Reconciled,
    /// Already present by id; nothing appended.
    Duplicate,
    /// Addressed to another conversation.
    Ignored,
    /// History failed to load; the retry fetch will carry it.
    Discarded,
}

/// Ordered messages of one conversation.
#[derive(Debug)]
pub struct MessageStream {
    chat_id: ChatId,
    viewer: IdentityId,
    phase: StreamPhase,
    messages: Vec<ChatMessage>,
    pending_live: Vec<ChatMessage>,
    echoed: HashSet<Uuid>,
}

impl MessageStream {
    /// Creates an empty stream in the `Loading` phase.
    #[must_use]
    pub fn new(chat_id: ChatId, viewer: IdentityId) -> Self {
        Self {
            chat_id,
            viewer,
            phase: StreamPhase::Loading,
            messages: Vec::new(),
            pending_live: Vec::new(),
            echoed: HashSet::new(),
        }
    }

    /// Returns the conversation id.
    #[must_use]
    pub fn chat_id(&self) -> &ChatId {
        &self.chat_id
    }

    /// Returns the local participant.
    #[must_use]
    pub fn viewer(&self) -> &IdentityId {
        &self.viewer
    }

    /// Returns the current phase.
    #[must_use]
    pub fn phase(&self) -> &StreamPhase {
        &self.phase
    }

    /// Returns `true` once history has loaded.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.phase == StreamPhase::Ready
    }

    /// Returns the visible messages in display order.
    #[must_use]
    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    /// Returns the number of live messages held until history loads.
    #[must_use]
    pub fn buffered(&self) -> usize {
        self.pending_live.len()
    }

    /// Re-enters `Loading` after a failure. Returns `false` in any other
    /// phase.
    pub fn begin_load(&mut self) -> bool {
        if matches!(self.phase, StreamPhase::Failed(_)) {
            self.phase = StreamPhase::Loading;
            true
        } else {
            false
        }
    }

    /// Records a failed history fetch and drops the live buffer.
    pub fn fail(&mut self, error: RealtimeError) {
        if !self.is_ready() {
            self.phase = StreamPhase::Failed(error);
            self.pending_live.clear();
        }
    }

    /// Installs the fetched history and enters `Ready`.
    ///
    /// Live messages buffered during the fetch are then appended after
    /// the history, skipping those the history already contains. Returns
    /// the messages appended from the buffer.
    pub fn load(&mut self, history: Vec<ChatMessage>) -> Vec<ChatMessage> {
        if self.is_ready() {
            return Vec::new();
        }
        self.messages = history;
        self.phase = StreamPhase::Ready;

        let buffered = std::mem::take(&mut self.pending_live);
        let mut appended = Vec::new();
        for message in buffered {
            if self.receive(message.clone()) == ReceiveOutcome::Appended {
                appended.push(message);
            }
        }
        appended
    }

    /// Applies one inbound message.
    pub fn receive(&mut self, message: ChatMessage) -> ReceiveOutcome {
        if message.chat_id.as_ref().is_some_and(|id| id != &self.chat_id) {
            return ReceiveOutcome::Ignored;
        }
        if matches!(self.phase, StreamPhase::Failed(_)) {
            return ReceiveOutcome::Discarded;
        }
        if !self.is_ready() {
            if message
                .id
                .as_ref()
                .is_some_and(|id| self.pending_live.iter().any(|m| m.id.as_ref() == Some(id)))
            {
                return ReceiveOutcome::Duplicate;
            }
            self.pending_live.push(message);
            return ReceiveOutcome::Buffered;
        }
        if message.is_from(&self.viewer) && self.reconcile_echo(&message) {
            return ReceiveOutcome::Reconciled;
        }
        if let Some(id) = &message.id
            && self.contains(id)
        {
            return ReceiveOutcome::Duplicate;
        }
        self.messages.push(message);
        ReceiveOutcome::Appended
    }

    /// Appends an optimistic entry authored by the viewer.
    ///
    /// # Errors
    ///
    /// Returns [`RealtimeError::NotReady`] unless history has loaded, and
    /// [`RealtimeError::Internal`] if `message` is not a local entry.
    pub fn push_local(&mut self, message: ChatMessage) -> Result<Uuid, RealtimeError> {
        if !self.is_ready() {
            return Err(RealtimeError::NotReady(format!(
                "history of {} is not loaded",
                self.chat_id
            )));
        }
        let Some(local_id) = message.local_id else {
            return Err(RealtimeError::Internal(
                "optimistic entry without local id".to_string(),
            ));
        };
        self.messages.push(message);
        Ok(local_id)
    }

    /// Settles an optimistic entry as persisted.
    ///
    /// Takes the id and timestamp of the stored document when the remote
    /// store returned one. Returns `false` if no such entry exists.
    pub fn confirm_local(&mut self, local_id: Uuid, stored: Option<&ChatMessage>) -> bool {
        let Some(entry) = self.local_mut(local_id) else {
            return false;
        };
        entry.delivery = DeliveryState::Confirmed;
        if let Some(stored) = stored {
            if stored.id.is_some() {
                entry.id.clone_from(&stored.id);
            }
            entry.created_at = stored.created_at;
        }
        true
    }

    /// Marks an optimistic entry as not durably stored. The entry stays
    /// visible. Returns `false` if no such entry exists.
    pub fn mark_unconfirmed(&mut self, local_id: Uuid, reason: &str) -> bool {
        let Some(entry) = self.local_mut(local_id) else {
            return false;
        };
        entry.delivery = DeliveryState::Unconfirmed {
            reason: reason.to_string(),
        };
        true
    }

    /// Returns the optimistic entry with `local_id`.
    #[must_use]
    pub fn local(&self, local_id: Uuid) -> Option<&ChatMessage> {
        self.messages
            .iter()
            .find(|m| m.local_id == Some(local_id))
    }

    /// Flips `read` on every message authored by the peer. Returns how
    /// many changed.
    pub fn mark_peer_read(&mut self) -> usize {
        let viewer = &self.viewer;
        self.messages
            .iter_mut()
            .filter(|m| !m.is_from(viewer))
            .map(ChatMessage::mark_read)
            .filter(|changed| *changed)
            .count()
    }

    fn contains(&self, id: &MessageId) -> bool {
        self.messages.iter().any(|m| m.id.as_ref() == Some(id))
    }

    fn local_mut(&mut self, local_id: Uuid) -> Option<&mut ChatMessage> {
        self.messages
            .iter_mut()
            .find(|m| m.local_id == Some(local_id))
    }

    /// Absorbs the room broadcast of the viewer's own message into the
    /// optimistic entry it echoes. Each entry absorbs at most one echo.
    fn reconcile_echo(&mut self, echo: &ChatMessage) -> bool {
        let echoed = &self.echoed;
        let viewer = &self.viewer;
        let Some(entry) = self.messages.iter_mut().find(|m| {
            m.is_from(viewer)
                && m.local_id.is_some_and(|l| !echoed.contains(&l))
                && m.content == echo.content
                && match (&m.id, &echo.id) {
                    (Some(mine), Some(theirs)) => mine == theirs,
                    _ => true,
                }
        }) else {
            return false;
        };
        if entry.id.is_none() {
            entry.id.clone_from(&echo.id);
        }
        if let Some(local_id) = entry.local_id {
            self.echoed.insert(local_id);
        }
        true
    }
}
