//! Push subscriptions.
//!
//! One subscription per open conversation. Each subscription runs as a task
//! that forwards decoded frames into an mpsc queue as [`RealtimeEvent`]s; the
//! task stops when its [`SubscriptionHandle`] is dropped or unsubscribed.
//! Every subscription carries a generation number so events from a released
//! subscription can be told apart from the live one.

use std::{collections::VecDeque, sync::Arc};

use async_trait::async_trait;
use futures_util::{
    StreamExt,
    stream::{self, BoxStream},
};
use reqwest::{Client, header};
use shared::{
    config::Config,
    models::{ConversationId, Message, ModelError, PushFrame, channel_name},
};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Push transport failures. Never fatal to the console.
#[derive(Debug, Error)]
pub enum RealtimeError {
    #[error("push connection failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("push relay returned {0}")]
    Status(u16),

    #[error("push payload rejected: {0}")]
    Decode(#[from] ModelError),

    #[error("subscription refused: {0}")]
    Refused(String),
}

impl RealtimeError {
    /// Whether the subscription has to be abandoned.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        !matches!(self, Self::Decode(_))
    }
}

/// Stream of decoded frames for one channel.
pub type PushStream = BoxStream<'static, Result<PushFrame, RealtimeError>>;

/// Connects to a conversation's push channel.
#[async_trait]
pub trait PushTransport: Send + Sync {
    async fn connect(&self, conversation_id: ConversationId) -> Result<PushStream, RealtimeError>;
}

/// One parsed Server-Sent Events record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseEvent {
    pub event: String,
    pub data: String,
    pub id: Option<String>,
}

/// Incremental Server-Sent Events parser.
///
/// Bytes may be split anywhere, including inside a line or a UTF-8 sequence.
#[derive(Debug, Default)]
pub struct SseParser {
    buffer: Vec<u8>,
    event_name: Option<String>,
    data: Vec<String>,
    event_id: Option<String>,
}

impl SseParser {
    /// Feed a chunk and collect every event it completes.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        self.buffer.extend_from_slice(chunk);
        let mut events = Vec::new();

        while let Some(end) = self.buffer.iter().position(|byte| *byte == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=end).collect();
            let text = String::from_utf8_lossy(&line[..end]);
            let line = text.trim_end_matches('\r');

            if line.is_empty() {
                if let Some(event) = self.dispatch() {
                    events.push(event);
                }
            } else if line.starts_with(':') {
                // comment / keep-alive
            } else if let Some(value) = line.strip_prefix("event:") {
                self.event_name = Some(value.trim().to_string());
            } else if let Some(value) = line.strip_prefix("data:") {
                self.data
                    .push(value.strip_prefix(' ').unwrap_or(value).to_string());
            } else if let Some(value) = line.strip_prefix("id:") {
                self.event_id = Some(value.trim().to_string());
            }
        }

        events
    }

    fn dispatch(&mut self) -> Option<SseEvent> {
        let event_name = self.event_name.take();
        let id = self.event_id.take();
        if self.data.is_empty() {
            return None;
        }
        let data = self.data.join("\n");
        self.data.clear();
        Some(SseEvent {
            event: event_name.unwrap_or_else(|| "message".to_string()),
            data,
            id,
        })
    }
}

/// [`PushTransport`] over Server-Sent Events:
/// `GET {base}/channels/conversation.{id}`.
#[derive(Clone, Debug)]
pub struct SseTransport {
    base_url: String,
    client: Client,
    token: Option<String>,
}

impl SseTransport {
    #[must_use]
    pub fn new(base_url: &str, token: Option<String>) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: Client::new(),
            token,
        }
    }

    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self::new(&config.push_base_url, config.api_token.clone())
    }

    #[must_use]
    pub fn channel_url(&self, conversation_id: ConversationId) -> String {
        format!("{}/channels/{}", self.base_url, channel_name(conversation_id))
    }
}

#[async_trait]
impl PushTransport for SseTransport {
    async fn connect(&self, conversation_id: ConversationId) -> Result<PushStream, RealtimeError> {
        let mut request = self
            .client
            .get(self.channel_url(conversation_id))
            .header(header::ACCEPT, "text/event-stream");
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(RealtimeError::Status(response.status().as_u16()));
        }

        let bytes = Box::pin(response.bytes_stream());
        let frames = stream::unfold(
            (bytes, SseParser::default(), VecDeque::new()),
            |(mut bytes, mut parser, mut ready)| async move {
                loop {
                    if let Some(event) = ready.pop_front() {
                        let SseEvent { event, data, .. } = event;
                        let frame = PushFrame::decode(&event, &data).map_err(RealtimeError::from);
                        return Some((frame, (bytes, parser, ready)));
                    }
                    match bytes.next().await {
                        Some(Ok(chunk)) => ready.extend(parser.feed(&chunk)),
                        Some(Err(err)) => {
                            return Some((Err(RealtimeError::from(err)), (bytes, parser, ready)));
                        }
                        None => return None,
                    }
                }
            },
        );

        Ok(frames.boxed())
    }
}

/// Lifecycle of the channel's single subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionState {
    Unsubscribed,
    Subscribing,
    Subscribed,
}

/// What a subscription task reports back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RealtimeEvent {
    Subscribed {
        conversation_id: ConversationId,
        generation: u64,
    },
    Message {
        conversation_id: ConversationId,
        generation: u64,
        message: Message,
    },
    /// The subscription failed or the relay closed the stream.
    Ended {
        conversation_id: ConversationId,
        generation: u64,
        reason: String,
    },
}

impl RealtimeEvent {
    #[must_use]
    pub const fn generation(&self) -> u64 {
        match self {
            Self::Subscribed { generation, .. }
            | Self::Message { generation, .. }
            | Self::Ended { generation, .. } => *generation,
        }
    }
}

/// Owns a running subscription task; dropping it cancels the task.
#[derive(Debug)]
pub struct SubscriptionHandle {
    conversation_id: ConversationId,
    generation: u64,
    token: CancellationToken,
}

impl SubscriptionHandle {
    #[must_use]
    pub const fn conversation_id(&self) -> ConversationId {
        self.conversation_id
    }

    #[must_use]
    pub const fn generation(&self) -> u64 {
        self.generation
    }

    /// Stop the subscription task.
    pub fn unsubscribe(self) {
        drop(self);
    }
}

impl Drop for SubscriptionHandle {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

/// Single-subscription push channel.
pub struct RealtimeChannel {
    transport: Arc<dyn PushTransport>,
    events: mpsc::UnboundedSender<RealtimeEvent>,
    state: SubscriptionState,
    active: Option<SubscriptionHandle>,
    generation: u64,
}

impl std::fmt::Debug for RealtimeChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RealtimeChannel")
            .field("state", &self.state)
            .field("active", &self.active)
            .field("generation", &self.generation)
            .finish_non_exhaustive()
    }
}

impl RealtimeChannel {
    #[must_use]
    pub fn new(
        transport: Arc<dyn PushTransport>,
        events: mpsc::UnboundedSender<RealtimeEvent>,
    ) -> Self {
        Self {
            transport,
            events,
            state: SubscriptionState::Unsubscribed,
            active: None,
            generation: 0,
        }
    }

    /// Subscribe to `conversation_id`, releasing the previous subscription first.
    ///
    /// Must be called from within a tokio runtime.
    pub fn subscribe(&mut self, conversation_id: ConversationId) -> u64 {
        self.unsubscribe();
        self.generation += 1;
        let generation = self.generation;
        let token = CancellationToken::new();

        tokio::spawn(run_subscription(
            Arc::clone(&self.transport),
            self.events.clone(),
            conversation_id,
            generation,
            token.clone(),
        ));

        self.active = Some(SubscriptionHandle {
            conversation_id,
            generation,
            token,
        });
        self.state = SubscriptionState::Subscribing;
        debug!(conversation_id, generation, "subscribing");
        generation
    }

    /// Release the current subscription, if any. Safe before it completed.
    pub fn unsubscribe(&mut self) {
        if let Some(handle) = self.active.take() {
            debug!(
                conversation_id = handle.conversation_id(),
                generation = handle.generation(),
                "unsubscribing"
            );
            handle.unsubscribe();
        }
        self.state = SubscriptionState::Unsubscribed;
    }

    /// Update the state machine from a task report.
    ///
    /// Returns `false` for reports of a released subscription; their state
    /// changes are ignored.
    pub fn on_event(&mut self, event: &RealtimeEvent) -> bool {
        if self.active.is_none() || event.generation() != self.generation {
            return false;
        }
        match event {
            RealtimeEvent::Subscribed { .. } => self.state = SubscriptionState::Subscribed,
            RealtimeEvent::Message { .. } => {}
            RealtimeEvent::Ended { .. } => {
                self.active = None;
                self.state = SubscriptionState::Unsubscribed;
            }
        }
        true
    }

    #[must_use]
    pub const fn state(&self) -> SubscriptionState {
        self.state
    }

    #[must_use]
    pub fn conversation_id(&self) -> Option<ConversationId> {
        self.active.as_ref().map(SubscriptionHandle::conversation_id)
    }

    #[must_use]
    pub const fn generation(&self) -> u64 {
        self.generation
    }
}

async fn run_subscription(
    transport: Arc<dyn PushTransport>,
    events: mpsc::UnboundedSender<RealtimeEvent>,
    conversation_id: ConversationId,
    generation: u64,
    token: CancellationToken,
) {
    let connected = tokio::select! {
        () = token.cancelled() => return,
        result = transport.connect(conversation_id) => result,
    };

    let mut frames = match connected {
        Ok(frames) => frames,
        Err(err) => {
            warn!(conversation_id, error = %err, "push subscription failed");
            let _ = events.send(RealtimeEvent::Ended {
                conversation_id,
                generation,
                reason: err.to_string(),
            });
            return;
        }
    };

    info!(conversation_id, channel = %channel_name(conversation_id), "subscribed");
    if events
        .send(RealtimeEvent::Subscribed {
            conversation_id,
            generation,
        })
        .is_err()
    {
        return;
    }

    let reason = loop {
        let frame = tokio::select! {
            () = token.cancelled() => return,
            frame = frames.next() => frame,
        };

        match frame {
            Some(Ok(PushFrame::MessageSent(message))) => {
                let delivered = events.send(RealtimeEvent::Message {
                    conversation_id,
                    generation,
                    message,
                });
                if delivered.is_err() {
                    return;
                }
            }
            Some(Ok(PushFrame::SubscriptionError(reason))) => {
                break RealtimeError::Refused(reason).to_string();
            }
            Some(Ok(PushFrame::Ignored)) => {}
            Some(Err(err)) if !err.is_fatal() => {
                warn!(conversation_id, error = %err, "skipping malformed push payload");
            }
            Some(Err(err)) => break err.to_string(),
            None => break "stream closed".to_string(),
        }
    };

    warn!(conversation_id, %reason, "push subscription ended");
    let _ = events.send(RealtimeEvent::Ended {
        conversation_id,
        generation,
        reason,
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::tests::msg;
    use crate::testing::FakeTransport;
    use shared::models::Sender;
    use std::time::Duration;
    use tokio::time::timeout;

    async fn recv(rx: &mut mpsc::UnboundedReceiver<RealtimeEvent>) -> RealtimeEvent {
        timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("timed out waiting for realtime event")
            .expect("channel closed")
    }

    #[test]
    fn parser_handles_split_chunks_and_multiline_data() {
        let mut parser = SseParser::default();
        assert!(parser.feed(b"event: MessageSent\nda").is_empty());
        assert!(parser.feed(b"ta: {\"a\":\r\n").is_empty());
        let events = parser.feed(b"data: 1}\nid: 7\n\n: ping\n\n");

        assert_eq!(
            events,
            vec![SseEvent {
                event: "MessageSent".into(),
                data: "{\"a\":\n1}".into(),
                id: Some("7".into()),
            }]
        );
    }

    #[test]
    fn parser_defaults_event_name_and_skips_empty_records() {
        let mut parser = SseParser::default();
        let events = parser.feed(b"event: connected\n\ndata: hello\n\n");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event, "message");
        assert_eq!(events[0].data, "hello");
    }

    #[test]
    fn parser_keeps_multibyte_characters_split_across_chunks() {
        let mut parser = SseParser::default();
        let bytes = "data: héllo\n\n".as_bytes();
        let split = bytes.iter().position(|b| *b > 0x7f).unwrap() + 1;
        assert!(parser.feed(&bytes[..split]).is_empty());
        let events = parser.feed(&bytes[split..]);
        assert_eq!(events[0].data, "héllo");
    }

    #[test]
    fn channel_url_names_conversation() {
        let transport = SseTransport::new("http://127.0.0.1:6001/", None);
        assert_eq!(
            transport.channel_url(5),
            "http://127.0.0.1:6001/channels/conversation.5"
        );
    }

    #[tokio::test]
    async fn subscribe_delivers_messages_and_tracks_state() {
        let transport = Arc::new(FakeTransport::default());
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut channel = RealtimeChannel::new(transport.clone(), tx);

        let generation = channel.subscribe(5);
        assert_eq!(channel.state(), SubscriptionState::Subscribing);

        let event = recv(&mut rx).await;
        assert!(channel.on_event(&event));
        assert_eq!(channel.state(), SubscriptionState::Subscribed);

        transport.push(5, msg(5, 1, Sender::Fan));
        let event = recv(&mut rx).await;
        assert_eq!(event.generation(), generation);
        assert!(matches!(&event, RealtimeEvent::Message { message, .. } if message.id == 1));
    }

    #[tokio::test]
    async fn resubscribe_releases_previous_subscription() {
        let transport = Arc::new(FakeTransport::default());
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut channel = RealtimeChannel::new(transport.clone(), tx);

        channel.subscribe(5);
        let first = recv(&mut rx).await;
        channel.subscribe(7);
        let second = recv(&mut rx).await;

        assert!(!channel.on_event(&first));
        assert!(channel.on_event(&second));
        assert_eq!(channel.conversation_id(), Some(7));

        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        assert_eq!(transport.live_subscribers(5), 0);
        assert_eq!(transport.live_subscribers(7), 1);
    }

    #[tokio::test]
    async fn late_subscribed_from_released_subscription_is_ignored() {
        let transport = Arc::new(FakeTransport::default());
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut channel = RealtimeChannel::new(transport, tx);

        let stale = channel.subscribe(5);
        channel.unsubscribe();

        let late = RealtimeEvent::Subscribed {
            conversation_id: 5,
            generation: stale,
        };
        assert!(!channel.on_event(&late));
        assert_eq!(channel.state(), SubscriptionState::Unsubscribed);
    }

    #[tokio::test]
    async fn connection_failure_is_reported_not_thrown() {
        let transport = Arc::new(FakeTransport::default());
        transport.refuse(5);
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut channel = RealtimeChannel::new(transport, tx);

        channel.subscribe(5);
        let event = recv(&mut rx).await;

        assert!(matches!(event, RealtimeEvent::Ended { .. }));
        assert!(channel.on_event(&event));
        assert_eq!(channel.state(), SubscriptionState::Unsubscribed);
    }

    #[test]
    fn dropping_handle_cancels_token() {
        let token = CancellationToken::new();
        let handle = SubscriptionHandle {
            conversation_id: 1,
            generation: 1,
            token: token.clone(),
        };
        assert!(!token.is_cancelled());
        drop(handle);
        assert!(token.is_cancelled());
    }
}
