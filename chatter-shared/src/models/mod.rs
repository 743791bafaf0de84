pub mod conversation;
pub mod errors;
pub mod fan;
pub mod message;
pub mod push;
pub mod timestamp;

pub use conversation::{
    ConversationDetail, ConversationRecord, ConversationSummary, PriorityLevel,
    PriorityUpdateRequest,
};
pub use errors::{ErrorResponse, ModelError};
pub use fan::{Fan, FanId};
pub use message::{
    ConversationId, CreateMessageRequest, Message, MessageId, RawMessage, Sender, sort_messages,
};
pub use push::{MESSAGE_SENT_EVENT, MessageSentPayload, PushFrame, channel_name};
pub use timestamp::Timestamp;
