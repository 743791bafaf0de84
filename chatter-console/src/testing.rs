//! In-memory backend and push relay for unit tests.

use std::{
    collections::{HashMap, HashSet},
    sync::Mutex,
};

use async_trait::async_trait;
use futures_util::StreamExt;
use shared::models::{
    ConversationId, ConversationRecord, CreateMessageRequest, Fan, FanId, Message, MessageId,
    PriorityLevel, PushFrame, Timestamp,
};
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

use crate::{
    api::{ApiError, ChatApi},
    realtime::{PushStream, PushTransport, RealtimeError},
};

#[derive(Debug, Default)]
struct FakeState {
    conversations: Vec<ConversationRecord>,
    fans: HashMap<FanId, Fan>,
    messages: HashMap<ConversationId, Vec<Message>>,
    fetches: Vec<(ConversationId, Option<MessageId>, usize)>,
    marked_read: Vec<ConversationId>,
    fail_sends: bool,
    fail_priority: bool,
}

/// Behaves like a backend that honours `before`/`limit`.
#[derive(Debug, Default)]
pub(crate) struct FakeApi {
    state: Mutex<FakeState>,
}

impl FakeApi {
    pub(crate) fn seed_conversation(&self, id: ConversationId, fan_id: FanId, priority: PriorityLevel) {
        self.state.lock().unwrap().conversations.push(ConversationRecord {
            id,
            fan_id,
            priority_level: Some(priority),
            last_message: None,
            messages: None,
        });
    }

    pub(crate) fn seed_fan(&self, id: FanId, name: &str) {
        let fan: Fan = serde_json::from_value(serde_json::json!({
            "id": id,
            "username": name.to_lowercase(),
            "display_name": name,
            "total_spent": "10.00",
        }))
        .unwrap();
        self.state.lock().unwrap().fans.insert(id, fan);
    }

    pub(crate) fn seed_messages(&self, conversation_id: ConversationId, messages: impl IntoIterator<Item = Message>) {
        self.state
            .lock()
            .unwrap()
            .messages
            .entry(conversation_id)
            .or_default()
            .extend(messages);
    }

    pub(crate) fn fetches(&self) -> Vec<(ConversationId, Option<MessageId>, usize)> {
        self.state.lock().unwrap().fetches.clone()
    }

    pub(crate) fn marked_read(&self) -> Vec<ConversationId> {
        self.state.lock().unwrap().marked_read.clone()
    }

    pub(crate) fn set_fail_sends(&self, fail: bool) {
        self.state.lock().unwrap().fail_sends = fail;
    }

    pub(crate) fn set_fail_priority(&self, fail: bool) {
        self.state.lock().unwrap().fail_priority = fail;
    }
}

#[async_trait]
impl ChatApi for FakeApi {
    async fn list_conversations(&self) -> Result<Vec<ConversationRecord>, ApiError> {
        Ok(self.state.lock().unwrap().conversations.clone())
    }

    async fn fetch_messages(
        &self,
        conversation_id: ConversationId,
        before: Option<MessageId>,
        limit: usize,
    ) -> Result<Vec<Message>, ApiError> {
        let mut state = self.state.lock().unwrap();
        state.fetches.push((conversation_id, before, limit));
        let mut rows: Vec<Message> = state
            .messages
            .get(&conversation_id)
            .into_iter()
            .flatten()
            .filter(|message| before.is_none_or(|before| message.id < before))
            .cloned()
            .collect();
        rows.sort_by_key(|message| message.id);
        let skip = rows.len().saturating_sub(limit);
        Ok(rows.split_off(skip))
    }

    async fn create_message(&self, request: &CreateMessageRequest) -> Result<Message, ApiError> {
        let mut state = self.state.lock().unwrap();
        if state.fail_sends {
            return Err(ApiError::Status {
                status: 500,
                message: "Error creating message: offline".into(),
            });
        }
        let id = state
            .messages
            .values()
            .flatten()
            .map(|message| message.id)
            .max()
            .unwrap_or(0)
            + 1;
        let message = Message {
            id,
            conversation_id: request.conversation_id,
            sender: request.sender,
            content: request.content.clone(),
            created_at: Timestamp::now(),
            is_read: false,
        };
        state
            .messages
            .entry(request.conversation_id)
            .or_default()
            .push(message.clone());
        Ok(message)
    }

    async fn mark_read(&self, conversation_id: ConversationId) -> Result<(), ApiError> {
        let mut state = self.state.lock().unwrap();
        state.marked_read.push(conversation_id);
        for message in state.messages.entry(conversation_id).or_default() {
            message.is_read = true;
        }
        Ok(())
    }

    async fn set_priority(
        &self,
        conversation_id: ConversationId,
        level: PriorityLevel,
    ) -> Result<(), ApiError> {
        let mut state = self.state.lock().unwrap();
        if state.fail_priority {
            return Err(ApiError::Status {
                status: 500,
                message: "Error updating priority level".into(),
            });
        }
        for record in &mut state.conversations {
            if record.id == conversation_id {
                record.priority_level = Some(level);
            }
        }
        Ok(())
    }

    async fn fetch_fan(&self, fan_id: FanId) -> Result<Fan, ApiError> {
        self.state
            .lock()
            .unwrap()
            .fans
            .get(&fan_id)
            .cloned()
            .ok_or(ApiError::Status {
                status: 404,
                message: "No query results for model [App\\Models\\Fan]".into(),
            })
    }
}

type FrameSender = mpsc::UnboundedSender<Result<PushFrame, RealtimeError>>;

/// Push relay keeping one sender per live subscription.
#[derive(Debug, Default)]
pub(crate) struct FakeTransport {
    channels: Mutex<HashMap<ConversationId, Vec<FrameSender>>>,
    refused: Mutex<HashSet<ConversationId>>,
}

impl FakeTransport {
    pub(crate) fn refuse(&self, conversation_id: ConversationId) {
        self.refused.lock().unwrap().insert(conversation_id);
    }

    /// Deliver `message` on the channel of `channel`.
    pub(crate) fn push(&self, channel: ConversationId, message: Message) {
        if let Some(senders) = self.channels.lock().unwrap().get(&channel) {
            for sender in senders {
                let _ = sender.send(Ok(PushFrame::MessageSent(message.clone())));
            }
        }
    }

    pub(crate) fn live_subscribers(&self, channel: ConversationId) -> usize {
        self.channels
            .lock()
            .unwrap()
            .get(&channel)
            .map_or(0, |senders| senders.iter().filter(|sender| !sender.is_closed()).count())
    }
}

#[async_trait]
impl PushTransport for FakeTransport {
    async fn connect(&self, conversation_id: ConversationId) -> Result<PushStream, RealtimeError> {
        if self.refused.lock().unwrap().contains(&conversation_id) {
            return Err(RealtimeError::Status(403));
        }
        let (tx, rx) = mpsc::unbounded_channel();
        self.channels
            .lock()
            .unwrap()
            .entry(conversation_id)
            .or_default()
            .push(tx);
        Ok(UnboundedReceiverStream::new(rx).boxed())
    }
}
