//! Push channel payloads.
//!
//! Each conversation has its own channel named `conversation.{id}`. The only
//! event the console consumes is [`MESSAGE_SENT_EVENT`], whose body wraps the
//! newly created message.

use serde::{Deserialize, Serialize};

use super::{
    errors::ModelError,
    message::{ConversationId, Message},
};

/// Event name carrying a newly created message.
pub const MESSAGE_SENT_EVENT: &str = "MessageSent";

/// Event name the relay emits when a subscription is rejected.
pub const SUBSCRIPTION_ERROR_EVENT: &str = "subscription_error";

/// Channel name for a conversation.
#[must_use]
pub fn channel_name(conversation_id: ConversationId) -> String {
    format!("conversation.{conversation_id}")
}

/// Body of a [`MESSAGE_SENT_EVENT`] event.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MessageSentPayload {
    pub message: Message,
}

/// Decoded push frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushFrame {
    /// A message was created in some conversation.
    MessageSent(Message),
    /// The relay refused or dropped the subscription.
    SubscriptionError(String),
    /// Connection acknowledgements, pings, and unrecognised events.
    Ignored,
}

impl PushFrame {
    /// Decode an event by name and raw `data` body.
    ///
    /// # Errors
    /// Returns [`ModelError::MalformedPayload`] when a `MessageSent` body does
    /// not validate as a message.
    pub fn decode(event: &str, data: &str) -> Result<Self, ModelError> {
        match event {
            MESSAGE_SENT_EVENT => serde_json::from_str::<MessageSentPayload>(data)
                .map(|payload| Self::MessageSent(payload.message))
                .map_err(|err| ModelError::MalformedPayload(err.to_string())),
            SUBSCRIPTION_ERROR_EVENT => Ok(Self::SubscriptionError(data.to_string())),
            _ => Ok(Self::Ignored),
        }
    }
}
