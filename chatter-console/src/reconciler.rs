//! Optimistic sends.
//!
//! A send shows up in the timeline immediately as a pending entry, then
//! converges on the server's copy whichever arrives first: the create-message
//! response or the push echo.

use std::collections::HashMap;

use shared::models::{ConversationId, CreateMessageRequest, Message, Sender, Timestamp};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    api::{ApiError, ChatApi},
    engine::ConsoleError,
    index::ConversationIndex,
    store::{MessageStore, StoreChange, TempTag},
};

/// A send the server has not acknowledged yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundSend {
    pub tag: TempTag,
    pub conversation_id: ConversationId,
    pub content: String,
}

impl OutboundSend {
    #[must_use]
    pub fn request(&self) -> CreateMessageRequest {
        CreateMessageRequest {
            conversation_id: self.conversation_id,
            sender: Sender::Chatter,
            content: self.content.clone(),
        }
    }

    /// Call create-message for this send.
    ///
    /// # Errors
    /// Propagates the API failure; the caller flags the entry failed.
    pub async fn submit(&self, api: &dyn ChatApi) -> Result<Message, ApiError> {
        api.create_message(&self.request()).await
    }
}

/// Tracks every unacknowledged send by tag.
#[derive(Debug, Clone, Default)]
pub struct SendReconciler {
    outbox: HashMap<TempTag, OutboundSend>,
}

impl SendReconciler {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a send and insert its optimistic entry.
    ///
    /// # Errors
    /// [`ConsoleError::EmptyMessage`] for whitespace-only content.
    pub fn send(
        &mut self,
        store: &mut MessageStore,
        conversation_id: ConversationId,
        content: &str,
    ) -> Result<(OutboundSend, StoreChange), ConsoleError> {
        if content.trim().is_empty() {
            return Err(ConsoleError::EmptyMessage);
        }

        let outbound = OutboundSend {
            tag: Uuid::new_v4(),
            conversation_id,
            content: content.to_string(),
        };
        let change = store.apply_optimistic(
            outbound.tag,
            conversation_id,
            outbound.content.clone(),
            Timestamp::now(),
        );
        self.outbox.insert(outbound.tag, outbound.clone());
        debug!(conversation_id, tag = %outbound.tag, "optimistic send");
        Ok((outbound, change))
    }

    /// The server accepted the send.
    ///
    /// The sidebar preview is updated even when the conversation is no longer
    /// open; the store only sees messages for its own conversation.
    pub fn on_success(
        &mut self,
        store: &mut MessageStore,
        index: &mut ConversationIndex,
        tag: TempTag,
        message: Message,
    ) -> StoreChange {
        self.outbox.remove(&tag);
        index.on_outbound_message(message.conversation_id, &message.content, Some(message.id));
        info!(conversation_id = message.conversation_id, message_id = message.id, "message sent");
        store.reconcile_optimistic(tag, message)
    }

    /// The send failed; the entry stays in the timeline flagged failed.
    pub fn on_failure(&mut self, store: &mut MessageStore, tag: TempTag, error: &ApiError) -> StoreChange {
        warn!(%tag, error = %error, "send failed");
        let change = store.mark_failed(tag, error.to_string());
        if store.pending(tag).is_none() {
            // the timeline was switched away; nothing left to retry
            self.outbox.remove(&tag);
        }
        change
    }

    /// Re-submit a failed send with the same tag.
    ///
    /// # Errors
    /// [`ConsoleError::UnknownTag`] if the tag is not a failed entry of the open timeline.
    pub fn retry(
        &mut self,
        store: &mut MessageStore,
        tag: TempTag,
    ) -> Result<(OutboundSend, StoreChange), ConsoleError> {
        let failed = store.pending(tag).is_some_and(|pending| pending.is_failed());
        let outbound = self
            .outbox
            .get(&tag)
            .filter(|_| failed)
            .cloned()
            .ok_or(ConsoleError::UnknownTag(tag))?;
        let change = store.mark_sending(tag);
        debug!(%tag, "retrying send");
        Ok((outbound, change))
    }

    /// Drop a failed send on request.
    ///
    /// # Errors
    /// [`ConsoleError::UnknownTag`] if no such entry exists.
    pub fn discard(&mut self, store: &mut MessageStore, tag: TempTag) -> Result<StoreChange, ConsoleError> {
        match store.remove_pending(tag) {
            StoreChange::Unchanged => Err(ConsoleError::UnknownTag(tag)),
            change => {
                self.outbox.remove(&tag);
                Ok(change)
            }
        }
    }

    /// Forget failed sends of the timeline about to be cleared; they cannot be retried afterwards.
    pub fn release_failed(&mut self, store: &MessageStore) {
        for pending in store.failed() {
            self.outbox.remove(&pending.tag);
        }
    }

    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.outbox.len()
    }
}
