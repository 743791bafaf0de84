use serde::{Deserialize, Serialize};
use std::{
    fmt::{Display, Formatter, Result as FmtResult},
    str::FromStr,
};

use super::{
    Fan, FanId, Message,
    errors::ModelError,
    message::{ConversationId, MessageId},
};

/// Operator-assigned triage tier. `None` sorts after every other tier.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(try_from = "i64", into = "u8")]
pub enum PriorityLevel {
    #[default]
    None = 0,
    High = 1,
    Medium = 2,
    Low = 3,
}

impl PriorityLevel {
    /// Rank used for sidebar ordering; lower ranks come first.
    #[must_use]
    pub const fn sort_rank(self) -> u8 {
        match self {
            Self::High => 1,
            Self::Medium => 2,
            Self::Low => 3,
            Self::None => u8::MAX,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
        }
    }
}

impl From<PriorityLevel> for u8 {
    fn from(value: PriorityLevel) -> Self {
        value as u8
    }
}

impl TryFrom<i64> for PriorityLevel {
    type Error = ModelError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::None),
            1 => Ok(Self::High),
            2 => Ok(Self::Medium),
            3 => Ok(Self::Low),
            other => Err(ModelError::InvalidPriority(other)),
        }
    }
}

impl FromStr for PriorityLevel {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if let Ok(number) = trimmed.parse::<i64>() {
            return Self::try_from(number);
        }
        match trimmed.to_ascii_lowercase().as_str() {
            "none" => Ok(Self::None),
            "high" => Ok(Self::High),
            "medium" => Ok(Self::Medium),
            "low" => Ok(Self::Low),
            _ => Err(ModelError::InvalidPriority(-1)),
        }
    }
}

impl Display for PriorityLevel {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.as_str())
    }
}

/// Item of `GET /conversations`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConversationRecord {
    pub id: ConversationId,
    pub fan_id: FanId,
    #[serde(default)]
    pub priority_level: Option<PriorityLevel>,
    #[serde(default)]
    pub last_message: Option<String>,
    /// Present only when the backend embeds the message list.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub messages: Option<Vec<Message>>,
}

/// Body of `GET /conversation/{id}`; only the page of messages is consumed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConversationDetail {
    pub id: ConversationId,
    #[serde(default)]
    pub fan_id: Option<FanId>,
    #[serde(default)]
    pub messages: Vec<Message>,
}

/// Body of `PUT /conversation/{id}/priority`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct PriorityUpdateRequest {
    pub priority_level: PriorityLevel,
}

/// Sidebar row for one conversation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConversationSummary {
    pub id: ConversationId,
    pub fan_id: FanId,
    pub fan_name: String,
    pub last_message: String,
    pub priority_level: PriorityLevel,
    pub unread_count: u32,
    /// Id of the message currently previewed in `last_message`, when known.
    #[serde(default)]
    pub last_message_id: Option<MessageId>,
}

impl ConversationSummary {
    /// Fan name used when the profile lookup fails.
    pub const UNKNOWN_FAN: &'static str = "Unknown Fan";

    /// Build a summary from the list payload and an optional fan profile.
    ///
    /// Unread count and preview come from the embedded messages when present:
    /// unread inbound messages are counted and the newest message is previewed
    /// unless the record already carries a `last_message`.
    #[must_use]
    pub fn from_record(record: &ConversationRecord, fan: Option<&Fan>) -> Self {
        let messages = record.messages.as_deref().unwrap_or_default();
        let unread_count = messages
            .iter()
            .filter(|message| message.is_inbound() && !message.is_read)
            .count();
        let newest = messages.iter().max_by_key(|message| message.sort_key());

        let (last_message, last_message_id) = match (&record.last_message, newest) {
            (Some(text), newest) => (text.clone(), newest.map(|message| message.id)),
            (None, Some(message)) => (message.content.clone(), Some(message.id)),
            (None, None) => (String::new(), None),
        };

        Self {
            id: record.id,
            fan_id: record.fan_id,
            fan_name: fan.map_or_else(|| Self::UNKNOWN_FAN.to_string(), |fan| fan.name().to_string()),
            last_message,
            priority_level: record.priority_level.unwrap_or_default(),
            unread_count: u32::try_from(unread_count).unwrap_or(u32::MAX),
            last_message_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Sender, Timestamp};
    use chrono::{TimeZone, Utc};

    fn message(id: MessageId, sender: Sender, is_read: bool) -> Message {
        Message {
            id,
            conversation_id: 1,
            sender,
            content: format!("message {id}"),
            created_at: Timestamp(Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, u32::try_from(id).unwrap()).unwrap()),
            is_read,
        }
    }

    fn fan() -> Fan {
        serde_json::from_str(r#"{"id":9,"username":"sunny","display_name":"Sunny"}"#).unwrap()
    }

    #[test]
    fn test_priority_round_trips_as_integer() {
        let json = serde_json::to_string(&PriorityUpdateRequest {
            priority_level: PriorityLevel::Medium,
        })
        .unwrap();
        assert_eq!(json, r#"{"priority_level":2}"#);

        let parsed: PriorityUpdateRequest = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.priority_level, PriorityLevel::Medium);
    }

    #[test]
    fn test_priority_rejects_out_of_range() {
        assert!(serde_json::from_str::<PriorityUpdateRequest>(r#"{"priority_level":4}"#).is_err());
        assert_eq!(
            PriorityLevel::try_from(-1),
            Err(ModelError::InvalidPriority(-1))
        );
    }

    #[test]
    fn test_priority_from_str_accepts_numbers_and_names() {
        assert_eq!("1".parse::<PriorityLevel>().unwrap(), PriorityLevel::High);
        assert_eq!("low".parse::<PriorityLevel>().unwrap(), PriorityLevel::Low);
        assert_eq!(" None ".parse::<PriorityLevel>().unwrap(), PriorityLevel::None);
        assert!("urgent".parse::<PriorityLevel>().is_err());
    }

    #[test]
    fn test_none_priority_ranks_last() {
        let mut levels = vec![
            PriorityLevel::None,
            PriorityLevel::Low,
            PriorityLevel::High,
            PriorityLevel::Medium,
        ];
        levels.sort_by_key(|level| level.sort_rank());
        assert_eq!(
            levels,
            vec![
                PriorityLevel::High,
                PriorityLevel::Medium,
                PriorityLevel::Low,
                PriorityLevel::None
            ]
        );
    }

    #[test]
    fn test_record_with_null_priority() {
        let record: ConversationRecord =
            serde_json::from_str(r#"{"id":1,"fan_id":9,"priority_level":null,"created_at":"x"}"#)
                .unwrap();
        assert_eq!(record.priority_level, None);
        assert!(record.messages.is_none());
    }

    #[test]
    fn test_summary_counts_unread_inbound_only() {
        let record = ConversationRecord {
            id: 1,
            fan_id: 9,
            priority_level: Some(PriorityLevel::High),
            last_message: None,
            messages: Some(vec![
                message(1, Sender::Fan, true),
                message(2, Sender::Fan, false),
                message(3, Sender::Chatter, false),
                message(4, Sender::Fan, false),
            ]),
        };

        let summary = ConversationSummary::from_record(&record, Some(&fan()));

        assert_eq!(summary.unread_count, 2);
        assert_eq!(summary.last_message, "message 4");
        assert_eq!(summary.last_message_id, Some(4));
        assert_eq!(summary.fan_name, "Sunny");
        assert_eq!(summary.priority_level, PriorityLevel::High);
    }

    #[test]
    fn test_summary_prefers_record_last_message() {
        let record = ConversationRecord {
            id: 1,
            fan_id: 9,
            priority_level: None,
            last_message: Some("latest from server".into()),
            messages: None,
        };

        let summary = ConversationSummary::from_record(&record, None);

        assert_eq!(summary.last_message, "latest from server");
        assert_eq!(summary.last_message_id, None);
        assert_eq!(summary.unread_count, 0);
        assert_eq!(summary.fan_name, ConversationSummary::UNKNOWN_FAN);
        assert_eq!(summary.priority_level, PriorityLevel::None);
    }
}
