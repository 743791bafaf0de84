use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};

use super::{Timestamp, errors::ModelError};

/// Server-assigned message identifier, monotonic with creation order.
pub type MessageId = i64;

/// Conversation identifier; also names the conversation's push channel.
pub type ConversationId = i64;

/// Who authored a message.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Sender {
    /// Inbound message written by the fan.
    Fan,
    /// Outbound message written by the operator.
    Chatter,
}

impl Sender {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Fan => "fan",
            Self::Chatter => "chatter",
        }
    }

    /// Inbound messages are the only ones that count towards unread totals.
    #[must_use]
    pub const fn is_inbound(self) -> bool {
        matches!(self, Self::Fan)
    }
}

impl Display for Sender {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for Sender {
    type Error = ModelError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value.trim().to_ascii_lowercase().as_str() {
            "fan" => Ok(Self::Fan),
            "chatter" => Ok(Self::Chatter),
            _ => Err(ModelError::InvalidSender(value.to_string())),
        }
    }
}

/// A validated chat message.
///
/// Deserialization goes through [`RawMessage`] so loosely-typed payloads are
/// coerced (or rejected) before they reach the timeline.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(try_from = "RawMessage")]
pub struct Message {
    /// Unique identifier for the message.
    pub id: MessageId,

    /// ID of the conversation this message belongs to.
    pub conversation_id: ConversationId,

    /// Author of the message.
    pub sender: Sender,

    /// The message content.
    pub content: String,

    /// Server creation time.
    pub created_at: Timestamp,

    /// Whether the operator has acknowledged the message.
    pub is_read: bool,
}

impl Message {
    /// Ordering key for timelines: creation time, then id.
    #[must_use]
    pub fn sort_key(&self) -> (Timestamp, MessageId) {
        (self.created_at, self.id)
    }

    #[must_use]
    pub const fn is_inbound(&self) -> bool {
        self.sender.is_inbound()
    }
}

/// Sort messages ascending by `(created_at, id)`.
pub fn sort_messages(messages: &mut [Message]) {
    messages.sort_by_key(Message::sort_key);
}

/// Integer that may arrive as a JSON number or a numeric string.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum LooseInt {
    Int(i64),
    Text(String),
}

impl LooseInt {
    fn into_i64(self, field: &'static str) -> Result<i64, ModelError> {
        match self {
            Self::Int(value) => Ok(value),
            Self::Text(text) => text
                .trim()
                .parse()
                .map_err(|_| ModelError::InvalidInteger { field, value: text }),
        }
    }
}

/// Boolean that may arrive as `true`/`false`, `0`/`1`, or their string forms.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum LooseFlag {
    Bool(bool),
    Int(i64),
    Text(String),
}

impl LooseFlag {
    fn into_bool(self, field: &'static str) -> Result<bool, ModelError> {
        match self {
            Self::Bool(value) => Ok(value),
            Self::Int(0) => Ok(false),
            Self::Int(1) => Ok(true),
            Self::Int(other) => Err(ModelError::InvalidFlag {
                field,
                value: other.to_string(),
            }),
            Self::Text(text) => match text.trim() {
                "0" | "false" => Ok(false),
                "1" | "true" => Ok(true),
                _ => Err(ModelError::InvalidFlag { field, value: text }),
            },
        }
    }
}

/// Message as it appears on the wire, before validation.
#[derive(Debug, Clone, Deserialize)]
pub struct RawMessage {
    pub id: Option<LooseInt>,
    #[serde(alias = "conversationId")]
    pub conversation_id: Option<LooseInt>,
    pub sender: Option<String>,
    pub content: Option<String>,
    #[serde(alias = "createdAt")]
    pub created_at: Option<String>,
    #[serde(default, alias = "isRead")]
    pub is_read: Option<LooseFlag>,
}

impl TryFrom<RawMessage> for Message {
    type Error = ModelError;

    fn try_from(raw: RawMessage) -> Result<Self, Self::Error> {
        let id = raw
            .id
            .ok_or(ModelError::MissingField("id"))?
            .into_i64("id")?;
        let conversation_id = raw
            .conversation_id
            .ok_or(ModelError::MissingField("conversation_id"))?
            .into_i64("conversation_id")?;
        let sender = Sender::try_from(
            raw.sender
                .as_deref()
                .ok_or(ModelError::MissingField("sender"))?,
        )?;
        let content = raw.content.ok_or(ModelError::MissingField("content"))?;
        let created_at = Timestamp::parse(
            raw.created_at
                .as_deref()
                .ok_or(ModelError::MissingField("created_at"))?,
        )?;
        let is_read = raw
            .is_read
            .map_or(Ok(false), |flag| flag.into_bool("is_read"))?;

        Ok(Self {
            id,
            conversation_id,
            sender,
            content,
            created_at,
            is_read,
        })
    }
}

/// Body of `POST /message`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CreateMessageRequest {
    pub conversation_id: ConversationId,
    pub sender: Sender,
    pub content: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn message(id: MessageId, secs: u32) -> Message {
        Message {
            id,
            conversation_id: 5,
            sender: Sender::Fan,
            content: format!("m{id}"),
            created_at: Timestamp(Utc.with_ymd_and_hms(2025, 3, 8, 14, 0, secs).unwrap()),
            is_read: false,
        }
    }

    #[test]
    fn test_message_from_laravel_payload() {
        let json = r#"{
            "id": 42,
            "conversation_id": 5,
            "sender": "fan",
            "content": "hello there",
            "is_read": 0,
            "created_at": "2025-03-08T14:30:00.000000Z",
            "updated_at": "2025-03-08T14:30:00.000000Z"
        }"#;

        let message: Message = serde_json::from_str(json).unwrap();

        assert_eq!(message.id, 42);
        assert_eq!(message.conversation_id, 5);
        assert_eq!(message.sender, Sender::Fan);
        assert_eq!(message.content, "hello there");
        assert!(!message.is_read);
        assert_eq!(
            message.created_at.0,
            Utc.with_ymd_and_hms(2025, 3, 8, 14, 30, 0).unwrap()
        );
    }

    #[test]
    fn test_message_coerces_string_ids_and_bool_flags() {
        let json = r#"{"id":"7","conversationId":"3","sender":"Chatter","content":"ok",
                       "createdAt":"2025-03-08 14:30:00","isRead":true}"#;

        let message: Message = serde_json::from_str(json).unwrap();

        assert_eq!(message.id, 7);
        assert_eq!(message.conversation_id, 3);
        assert_eq!(message.sender, Sender::Chatter);
        assert!(message.is_read);
    }

    #[test]
    fn test_message_missing_is_read_defaults_to_unread() {
        let json = r#"{"id":1,"conversation_id":2,"sender":"fan","content":"x",
                       "created_at":"2025-03-08T14:30:00Z"}"#;
        let message: Message = serde_json::from_str(json).unwrap();
        assert!(!message.is_read);
    }

    #[test]
    fn test_message_rejects_unknown_sender() {
        let json = r#"{"id":1,"conversation_id":2,"sender":"bot","content":"x",
                       "created_at":"2025-03-08T14:30:00Z"}"#;
        let err = serde_json::from_str::<Message>(json).unwrap_err();
        assert!(err.to_string().contains("invalid sender"));
    }

    #[test]
    fn test_message_rejects_missing_id() {
        let json = r#"{"conversation_id":2,"sender":"fan","content":"x",
                       "created_at":"2025-03-08T14:30:00Z"}"#;
        let err = serde_json::from_str::<Message>(json).unwrap_err();
        assert!(err.to_string().contains("missing field `id`"));
    }

    #[test]
    fn test_message_reports_non_numeric_id_as_integer_error() {
        let json = r#"{"id":"abc","conversation_id":2,"sender":"fan","content":"x",
                       "created_at":"2025-03-08T14:30:00Z"}"#;
        let err = serde_json::from_str::<Message>(json).unwrap_err().to_string();
        assert!(err.contains("invalid integer value for `id`: abc"));
        assert!(!err.contains("flag"));
    }

    #[test]
    fn test_message_rejects_out_of_range_flag() {
        let json = r#"{"id":1,"conversation_id":2,"sender":"fan","content":"x",
                       "created_at":"2025-03-08T14:30:00Z","is_read":5}"#;
        assert!(serde_json::from_str::<Message>(json).is_err());
    }

    #[test]
    fn test_sort_messages_uses_id_as_tie_break() {
        let mut messages = vec![message(9, 1), message(3, 1), message(1, 2), message(5, 0)];
        sort_messages(&mut messages);
        let ids: Vec<_> = messages.iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![5, 3, 9, 1]);
    }

    #[test]
    fn test_serialized_message_reads_back() {
        let original = message(11, 4);
        let json = serde_json::to_string(&original).unwrap();
        assert!(json.contains("\"sender\":\"fan\""));
        let parsed: Message = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, original);
    }
}
