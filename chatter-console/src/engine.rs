//! The console orchestrator.
//!
//! [`Console`] owns every component and a single event queue. Network work
//! runs in spawned tasks that post a [`ConsoleEvent`] back when done; the
//! caller drives the loop with [`Console::next_event`] and [`Console::apply`],
//! so the store and the index are only ever mutated from that loop.

use std::sync::Arc;

use shared::{
    config::Config,
    models::{ConversationId, ConversationSummary, Message, PriorityLevel},
};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::{
    api::{ApiError, ChatApi},
    index::{ConversationIndex, load_summaries},
    pagination::{Page, PageKind, PageOutcome, PageTicket, PaginationController, load_newest, load_older},
    realtime::{PushTransport, RealtimeChannel, RealtimeEvent, SubscriptionState},
    reconciler::{OutboundSend, SendReconciler},
    scroll::{ScrollAction, ScrollAnchor, Viewport},
    store::{MessageStore, StoreChange, TempTag},
};

/// Errors returned from operator actions.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConsoleError {
    #[error("no conversation is open")]
    NoConversationOpen,

    #[error("message is empty")]
    EmptyMessage,

    #[error("no failed message with tag {0}")]
    UnknownTag(TempTag),

    #[error("unknown conversation {0}")]
    UnknownConversation(ConversationId),
}

/// Completion reports posted by background tasks.
#[derive(Debug)]
pub enum ConsoleEvent {
    ConversationsLoaded(Result<Vec<ConversationSummary>, ApiError>),
    PageLoaded {
        ticket: PageTicket,
        result: Result<Page, ApiError>,
    },
    SendCompleted {
        tag: TempTag,
        conversation_id: ConversationId,
        result: Result<Message, ApiError>,
    },
    MarkReadCompleted {
        conversation_id: ConversationId,
        result: Result<(), ApiError>,
    },
    PriorityCompleted {
        conversation_id: ConversationId,
        level: PriorityLevel,
        previous: PriorityLevel,
        result: Result<(), ApiError>,
    },
    Realtime(RealtimeEvent),
}

/// What an applied event changed, for the view to redraw.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConsoleUpdate {
    pub timeline: Option<StoreChange>,
    pub sidebar: bool,
    pub error: Option<String>,
}

impl ConsoleUpdate {
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.timeline.is_none() && !self.sidebar && self.error.is_none()
    }

    fn timeline(change: StoreChange) -> Self {
        Self {
            timeline: (!change.is_unchanged()).then_some(change),
            ..Self::default()
        }
    }
}

/// Inline indicators.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsoleStatus {
    pub open: Option<ConversationId>,
    pub loading_conversations: bool,
    pub loading: bool,
    pub loading_older: bool,
    pub has_more: bool,
    pub subscription: SubscriptionState,
    /// Sends not yet acknowledged, failed ones included.
    pub unacknowledged_sends: usize,
    pub failed_sends: usize,
    pub last_error: Option<String>,
}

/// Tunables taken from [`Config`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConsoleSettings {
    pub page_size: usize,
    pub near_bottom_threshold_px: f64,
    pub load_older_threshold_px: f64,
}

impl Default for ConsoleSettings {
    fn default() -> Self {
        Self::from(&Config::with_defaults())
    }
}

impl From<&Config> for ConsoleSettings {
    fn from(config: &Config) -> Self {
        Self {
            page_size: config.page_size,
            near_bottom_threshold_px: config.near_bottom_threshold_px,
            load_older_threshold_px: config.load_older_threshold_px,
        }
    }
}

pub struct Console {
    api: Arc<dyn ChatApi>,
    store: MessageStore,
    pagination: PaginationController,
    realtime: RealtimeChannel,
    reconciler: SendReconciler,
    scroll: ScrollAnchor,
    index: ConversationIndex,
    events_tx: mpsc::UnboundedSender<ConsoleEvent>,
    events_rx: mpsc::UnboundedReceiver<ConsoleEvent>,
    realtime_rx: mpsc::UnboundedReceiver<RealtimeEvent>,
    /// Pushes for the open conversation that arrived before its first page.
    early: Vec<Message>,
    loading_conversations: bool,
    last_error: Option<String>,
}

impl std::fmt::Debug for Console {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Console")
            .field("store", &self.store)
            .field("pagination", &self.pagination)
            .field("realtime", &self.realtime)
            .field("index", &self.index)
            .field("last_error", &self.last_error)
            .finish_non_exhaustive()
    }
}

impl Console {
    #[must_use]
    pub fn new(
        api: Arc<dyn ChatApi>,
        transport: Arc<dyn PushTransport>,
        settings: ConsoleSettings,
    ) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (realtime_tx, realtime_rx) = mpsc::unbounded_channel();
        Self {
            api,
            store: MessageStore::new(settings.page_size),
            pagination: PaginationController::new(settings.page_size),
            realtime: RealtimeChannel::new(transport, realtime_tx),
            reconciler: SendReconciler::new(),
            scroll: ScrollAnchor::new(
                settings.near_bottom_threshold_px,
                settings.load_older_threshold_px,
            ),
            index: ConversationIndex::new(),
            events_tx,
            events_rx,
            realtime_rx,
            early: Vec::new(),
            loading_conversations: false,
            last_error: None,
        }
    }

    /// Reload the sidebar from `GET /conversations`.
    pub fn refresh_conversations(&mut self) {
        self.loading_conversations = true;
        let api = Arc::clone(&self.api);
        let events = self.events_tx.clone();
        tokio::spawn(async move {
            let result = load_summaries(api.as_ref()).await;
            let _ = events.send(ConsoleEvent::ConversationsLoaded(result));
        });
    }

    /// Select a conversation: resubscribe, then load its newest page.
    pub fn open(&mut self, conversation_id: ConversationId) {
        info!(conversation_id, "opening conversation");
        self.reconciler.release_failed(&self.store);
        self.store.clear();
        self.early.clear();
        self.last_error = None;
        self.index.on_select(conversation_id);
        self.realtime.subscribe(conversation_id);
        let ticket = self.pagination.begin_newest(conversation_id);
        self.spawn_page(ticket);
    }

    /// Leave the open conversation.
    pub fn close(&mut self) {
        self.realtime.unsubscribe();
        self.reconciler.release_failed(&self.store);
        self.store.clear();
        self.early.clear();
        self.pagination.reset();
        self.index.close();
    }

    /// Fetch the page before the oldest loaded message.
    ///
    /// Returns `false` when nothing was requested: no timeline, exhausted, or
    /// another load still running.
    pub fn load_older(&mut self) -> bool {
        let Some(conversation_id) = self.store.conversation_id() else {
            return false;
        };
        if !self.store.has_more() {
            return false;
        }
        match self
            .pagination
            .begin_older(conversation_id, self.store.oldest_id())
        {
            Some(ticket) => {
                self.spawn_page(ticket);
                true
            }
            None => false,
        }
    }

    /// Record the viewport and load older messages when it nears the top.
    pub fn observe_viewport(&mut self, viewport: Viewport) -> bool {
        self.scroll.observe(viewport);
        self.scroll.should_load_older(viewport) && self.load_older()
    }

    /// Scroll reaction for a timeline change, once the view knows its new height.
    pub fn scroll_after(&mut self, change: StoreChange, new_scroll_height: f64) -> ScrollAction {
        self.scroll.resolve(&change, new_scroll_height)
    }

    /// Send `content` to the open conversation.
    ///
    /// # Errors
    /// [`ConsoleError::NoConversationOpen`] before the timeline has loaded and
    /// [`ConsoleError::EmptyMessage`] for blank content.
    pub fn send(&mut self, content: &str) -> Result<(TempTag, StoreChange), ConsoleError> {
        let conversation_id = self
            .store
            .conversation_id()
            .ok_or(ConsoleError::NoConversationOpen)?;
        self.scroll.before_mutation();
        let (outbound, change) = self.reconciler.send(&mut self.store, conversation_id, content)?;
        let tag = outbound.tag;
        self.spawn_send(outbound);
        Ok((tag, change))
    }

    /// Re-submit one failed send.
    ///
    /// # Errors
    /// [`ConsoleError::UnknownTag`] unless `tag` is a failed entry of the timeline.
    pub fn retry(&mut self, tag: TempTag) -> Result<StoreChange, ConsoleError> {
        let (outbound, change) = self.reconciler.retry(&mut self.store, tag)?;
        self.spawn_send(outbound);
        Ok(change)
    }

    /// Re-submit every failed send of the open timeline; returns how many.
    pub fn retry_failed(&mut self) -> usize {
        let tags: Vec<TempTag> = self.store.failed().map(|pending| pending.tag).collect();
        tags.into_iter()
            .filter(|tag| self.retry(*tag).is_ok())
            .count()
    }

    /// Remove a failed send from the timeline.
    ///
    /// # Errors
    /// [`ConsoleError::UnknownTag`] if no such entry exists.
    pub fn discard(&mut self, tag: TempTag) -> Result<StoreChange, ConsoleError> {
        self.reconciler.discard(&mut self.store, tag)
    }

    /// Acknowledge every message of the open conversation.
    ///
    /// # Errors
    /// [`ConsoleError::NoConversationOpen`] if nothing is selected.
    pub fn mark_read(&mut self) -> Result<StoreChange, ConsoleError> {
        let conversation_id = self.index.open().ok_or(ConsoleError::NoConversationOpen)?;
        self.index.on_mark_read(conversation_id);
        let change = self.store.mark_all_read();

        let api = Arc::clone(&self.api);
        let events = self.events_tx.clone();
        tokio::spawn(async move {
            let result = api.mark_read(conversation_id).await;
            let _ = events.send(ConsoleEvent::MarkReadCompleted {
                conversation_id,
                result,
            });
        });
        Ok(change)
    }

    /// Change a conversation's priority and persist it.
    ///
    /// # Errors
    /// [`ConsoleError::UnknownConversation`] if the sidebar has no such conversation.
    pub fn set_priority(
        &mut self,
        conversation_id: ConversationId,
        level: PriorityLevel,
    ) -> Result<(), ConsoleError> {
        let previous = self
            .index
            .on_priority_change(conversation_id, level)
            .ok_or(ConsoleError::UnknownConversation(conversation_id))?;

        let api = Arc::clone(&self.api);
        let events = self.events_tx.clone();
        tokio::spawn(async move {
            let result = api.set_priority(conversation_id, level).await;
            let _ = events.send(ConsoleEvent::PriorityCompleted {
                conversation_id,
                level,
                previous,
                result,
            });
        });
        Ok(())
    }

    /// Wait for the next task report.
    pub async fn next_event(&mut self) -> Option<ConsoleEvent> {
        tokio::select! {
            Some(event) = self.events_rx.recv() => Some(event),
            Some(event) = self.realtime_rx.recv() => Some(ConsoleEvent::Realtime(event)),
            else => None,
        }
    }

    /// Fold one task report into the console state.
    pub fn apply(&mut self, event: ConsoleEvent) -> ConsoleUpdate {
        match event {
            ConsoleEvent::ConversationsLoaded(result) => self.on_conversations(result),
            ConsoleEvent::PageLoaded { ticket, result } => self.on_page(&ticket, result),
            ConsoleEvent::SendCompleted {
                tag,
                conversation_id,
                result,
            } => {
                self.scroll.before_mutation();
                match result {
                    Ok(message) => {
                        let change =
                            self.reconciler
                                .on_success(&mut self.store, &mut self.index, tag, message);
                        ConsoleUpdate {
                            sidebar: true,
                            ..ConsoleUpdate::timeline(change)
                        }
                    }
                    Err(err) => {
                        debug!(conversation_id, %tag, "send rejected");
                        let change = self.reconciler.on_failure(&mut self.store, tag, &err);
                        ConsoleUpdate {
                            error: Some(format!("message not sent: {err}")),
                            ..ConsoleUpdate::timeline(change)
                        }
                    }
                }
            }
            ConsoleEvent::MarkReadCompleted {
                conversation_id,
                result,
            } => match result {
                Ok(()) => ConsoleUpdate::default(),
                Err(err) => {
                    warn!(conversation_id, error = %err, "mark-read failed");
                    self.fail(format!("could not mark conversation {conversation_id} read: {err}"))
                }
            },
            ConsoleEvent::PriorityCompleted {
                conversation_id,
                level,
                previous,
                result,
            } => match result {
                Ok(()) => ConsoleUpdate::default(),
                Err(err) => {
                    warn!(conversation_id, error = %err, "priority update failed");
                    if self
                        .index
                        .get(conversation_id)
                        .is_some_and(|summary| summary.priority_level == level)
                    {
                        self.index.on_priority_change(conversation_id, previous);
                    }
                    ConsoleUpdate {
                        sidebar: true,
                        ..self.fail(format!("could not update priority: {err}"))
                    }
                }
            },
            ConsoleEvent::Realtime(event) => self.on_realtime(event),
        }
    }

    fn on_conversations(
        &mut self,
        result: Result<Vec<ConversationSummary>, ApiError>,
    ) -> ConsoleUpdate {
        self.loading_conversations = false;
        match result {
            Ok(summaries) => {
                info!(count = summaries.len(), "conversations loaded");
                self.index.load(summaries);
                if let Some(latest) = self.store.messages().last() {
                    self.index.observe_latest(latest);
                }
                ConsoleUpdate {
                    sidebar: true,
                    ..ConsoleUpdate::default()
                }
            }
            Err(err) => {
                warn!(error = %err, "failed to load conversations");
                self.fail(format!("could not load conversations: {err}"))
            }
        }
    }

    fn on_page(&mut self, ticket: &PageTicket, result: Result<Page, ApiError>) -> ConsoleUpdate {
        let page = match self.pagination.complete(ticket, result) {
            PageOutcome::Stale => return ConsoleUpdate::default(),
            PageOutcome::Failed(err) => {
                warn!(conversation_id = ticket.conversation_id, error = %err, "failed to load messages");
                return self.fail(format!("could not load messages: {err}"));
            }
            PageOutcome::Loaded(page) => page,
        };

        self.last_error = None;
        self.scroll.before_mutation();
        match ticket.kind {
            PageKind::Newest => {
                let change = self.store.initialize(ticket.conversation_id, page.messages);
                for message in std::mem::take(&mut self.early) {
                    self.store.apply_realtime(message);
                }
                let sidebar = self
                    .store
                    .messages()
                    .last()
                    .is_some_and(|latest| self.index.observe_latest(latest));
                ConsoleUpdate {
                    sidebar,
                    ..ConsoleUpdate::timeline(change)
                }
            }
            PageKind::Older => ConsoleUpdate::timeline(self.store.prepend_older(page.messages)),
        }
    }

    fn on_realtime(&mut self, event: RealtimeEvent) -> ConsoleUpdate {
        let current = self.realtime.on_event(&event);
        match event {
            RealtimeEvent::Subscribed {
                conversation_id, ..
            } => {
                if current {
                    debug!(conversation_id, "realtime updates live");
                }
                ConsoleUpdate::default()
            }
            RealtimeEvent::Ended {
                conversation_id,
                reason,
                ..
            } => {
                if current {
                    warn!(conversation_id, %reason, "realtime updates paused until the conversation is reopened");
                }
                ConsoleUpdate::default()
            }
            RealtimeEvent::Message { message, .. } => self.on_push_message(message),
        }
    }

    fn on_push_message(&mut self, message: Message) -> ConsoleUpdate {
        let sidebar = self.index.on_inbound_message(&message);
        if self.index.open() != Some(message.conversation_id) {
            return ConsoleUpdate {
                sidebar,
                ..ConsoleUpdate::default()
            };
        }

        if self.store.conversation_id() != Some(message.conversation_id) {
            if self.pagination.is_loading() {
                self.early.push(message);
            }
            return ConsoleUpdate {
                sidebar,
                ..ConsoleUpdate::default()
            };
        }

        self.scroll.before_mutation();
        ConsoleUpdate {
            sidebar,
            ..ConsoleUpdate::timeline(self.store.apply_realtime(message))
        }
    }

    fn fail(&mut self, message: String) -> ConsoleUpdate {
        self.last_error = Some(message.clone());
        ConsoleUpdate {
            error: Some(message),
            ..ConsoleUpdate::default()
        }
    }

    fn spawn_page(&self, ticket: PageTicket) {
        let api = Arc::clone(&self.api);
        let events = self.events_tx.clone();
        let page_size = self.pagination.page_size();
        tokio::spawn(async move {
            let result = match ticket.before_id {
                None => load_newest(api.as_ref(), ticket.conversation_id, page_size).await,
                Some(before_id) => {
                    load_older(api.as_ref(), ticket.conversation_id, before_id, page_size).await
                }
            };
            let _ = events.send(ConsoleEvent::PageLoaded { ticket, result });
        });
    }

    fn spawn_send(&self, outbound: OutboundSend) {
        let api = Arc::clone(&self.api);
        let events = self.events_tx.clone();
        tokio::spawn(async move {
            let result = outbound.submit(api.as_ref()).await;
            let _ = events.send(ConsoleEvent::SendCompleted {
                tag: outbound.tag,
                conversation_id: outbound.conversation_id,
                result,
            });
        });
    }

    #[must_use]
    pub fn status(&self) -> ConsoleStatus {
        ConsoleStatus {
            open: self.index.open(),
            loading_conversations: self.loading_conversations,
            loading: self.pagination.is_loading(),
            loading_older: self.pagination.is_loading_older(),
            has_more: self.store.has_more(),
            subscription: self.realtime.state(),
            unacknowledged_sends: self.reconciler.in_flight(),
            failed_sends: self.store.failed().count(),
            last_error: self.last_error.clone(),
        }
    }

    #[must_use]
    pub const fn store(&self) -> &MessageStore {
        &self.store
    }

    #[must_use]
    pub const fn index(&self) -> &ConversationIndex {
        &self.index
    }

    #[must_use]
    pub const fn scroll(&self) -> &ScrollAnchor {
        &self.scroll
    }

    #[must_use]
    pub const fn open_conversation(&self) -> Option<ConversationId> {
        self.index.open()
    }
}
