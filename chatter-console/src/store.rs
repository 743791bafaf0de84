//! Ordered, deduplicated timeline for the open conversation.
//!
//! The timeline merges three sources: pages from the pull API, push deliveries
//! and optimistic local sends. Confirmed messages are unique by id and ordered
//! by `(created_at, id)`; pending entries sit at their local creation time,
//! after any confirmed message with the same timestamp.

use std::collections::HashSet;

use shared::models::{ConversationId, Message, MessageId, Timestamp};
use tracing::debug;
use uuid::Uuid;

/// Local identity of an optimistic entry until the server assigns an id.
pub type TempTag = Uuid;

/// Delivery state of an optimistic entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PendingStatus {
    Sending,
    Failed(String),
}

/// An outbound message the server has not confirmed yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingMessage {
    pub tag: TempTag,
    pub conversation_id: ConversationId,
    pub content: String,
    pub created_at: Timestamp,
    pub status: PendingStatus,
}

impl PendingMessage {
    #[must_use]
    pub const fn is_failed(&self) -> bool {
        matches!(self.status, PendingStatus::Failed(_))
    }
}

/// One row of the timeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimelineEntry {
    Confirmed(Message),
    Pending(PendingMessage),
}

impl TimelineEntry {
    #[must_use]
    pub const fn created_at(&self) -> Timestamp {
        match self {
            Self::Confirmed(message) => message.created_at,
            Self::Pending(pending) => pending.created_at,
        }
    }

    #[must_use]
    pub fn content(&self) -> &str {
        match self {
            Self::Confirmed(message) => &message.content,
            Self::Pending(pending) => &pending.content,
        }
    }

    #[must_use]
    pub const fn message(&self) -> Option<&Message> {
        match self {
            Self::Confirmed(message) => Some(message),
            Self::Pending(_) => None,
        }
    }

    #[must_use]
    pub const fn pending(&self) -> Option<&PendingMessage> {
        match self {
            Self::Confirmed(_) => None,
            Self::Pending(pending) => Some(pending),
        }
    }

    /// Confirmed entries order by `(created_at, id)`; pending ones trail
    /// confirmed entries sharing their timestamp.
    fn sort_key(&self) -> (Timestamp, u8, MessageId) {
        match self {
            Self::Confirmed(message) => (message.created_at, 0, message.id),
            Self::Pending(pending) => (pending.created_at, 1, 0),
        }
    }
}

/// Where a single inserted entry landed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertPosition {
    /// No confirmed message follows the new entry.
    Tail,
    /// The entry was placed between existing confirmed messages.
    Middle,
}

/// Mutation performed by a store operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreChange {
    /// Nothing changed (duplicate, foreign conversation, unknown tag).
    Unchanged,
    /// The timeline was replaced by a fresh page.
    Reset { count: usize },
    /// Older messages were merged in at the front.
    Prepended { count: usize },
    /// A single entry was inserted.
    Inserted { position: InsertPosition, local: bool },
    /// A pending entry became confirmed in place.
    Replaced,
    /// An entry changed without moving (read flag, send status).
    Updated,
    /// An entry was removed.
    Removed,
}

impl StoreChange {
    #[must_use]
    pub const fn is_unchanged(&self) -> bool {
        matches!(self, Self::Unchanged)
    }
}

/// Authoritative in-memory timeline of one conversation.
#[derive(Debug, Clone)]
pub struct MessageStore {
    conversation_id: Option<ConversationId>,
    entries: Vec<TimelineEntry>,
    ids: HashSet<MessageId>,
    page_size: usize,
    has_more: bool,
}

impl MessageStore {
    #[must_use]
    pub fn new(page_size: usize) -> Self {
        Self {
            conversation_id: None,
            entries: Vec::new(),
            ids: HashSet::new(),
            page_size: page_size.max(1),
            has_more: false,
        }
    }

    /// Replace the timeline with the newest page of `conversation_id`.
    ///
    /// Pending entries are dropped. Exhaustion is set when the page is
    /// shorter than the page size.
    pub fn initialize(&mut self, conversation_id: ConversationId, page: Vec<Message>) -> StoreChange {
        let received = page.len();
        self.clear();
        self.conversation_id = Some(conversation_id);
        self.has_more = received >= self.page_size;

        for message in page {
            if message.conversation_id != conversation_id {
                debug!(
                    message_id = message.id,
                    conversation_id = message.conversation_id,
                    "dropping message from another conversation"
                );
                continue;
            }
            if self.ids.insert(message.id) {
                self.entries.push(TimelineEntry::Confirmed(message));
            }
        }
        self.entries.sort_by_key(TimelineEntry::sort_key);

        debug!(conversation_id, count = self.entries.len(), has_more = self.has_more, "timeline initialized");
        StoreChange::Reset {
            count: self.entries.len(),
        }
    }

    /// Merge an older page at the front of the timeline.
    ///
    /// The whole page is ignored if any of its ids is already loaded.
    pub fn prepend_older(&mut self, page: Vec<Message>) -> StoreChange {
        let Some(conversation_id) = self.conversation_id else {
            return StoreChange::Unchanged;
        };
        if let Some(duplicate) = page.iter().find(|message| self.ids.contains(&message.id)) {
            debug!(message_id = duplicate.id, "older page overlaps the timeline; ignoring it");
            return StoreChange::Unchanged;
        }

        self.has_more = page.len() >= self.page_size;
        let before = self.entries.len();
        for message in page {
            if message.conversation_id == conversation_id && self.ids.insert(message.id) {
                self.entries.push(TimelineEntry::Confirmed(message));
            }
        }
        let count = self.entries.len() - before;
        if count == 0 {
            return StoreChange::Unchanged;
        }
        self.entries.sort_by_key(TimelineEntry::sort_key);

        debug!(conversation_id, count, has_more = self.has_more, "prepended older page");
        StoreChange::Prepended { count }
    }

    /// Insert a pushed message at its timestamp-derived position.
    ///
    /// An outbound message confirms the oldest optimistic entry still sending
    /// the same content, so the operator's own echo never shows twice.
    pub fn apply_realtime(&mut self, message: Message) -> StoreChange {
        if self.conversation_id != Some(message.conversation_id) {
            return StoreChange::Unchanged;
        }
        if self.ids.contains(&message.id) {
            debug!(message_id = message.id, "duplicate delivery absorbed");
            return StoreChange::Unchanged;
        }

        self.ids.insert(message.id);
        if !message.is_inbound()
            && let Some(index) = self.sending_with_content(&message.content)
        {
            debug!(message_id = message.id, "push echo confirmed an optimistic entry");
            self.entries[index] = TimelineEntry::Confirmed(message);
            self.entries.sort_by_key(TimelineEntry::sort_key);
            return StoreChange::Replaced;
        }

        let position = self.insert_sorted(TimelineEntry::Confirmed(message));
        StoreChange::Inserted {
            position,
            local: false,
        }
    }

    /// Insert an optimistic entry for an outbound send.
    ///
    /// A tag can only be inserted once.
    pub fn apply_optimistic(
        &mut self,
        tag: TempTag,
        conversation_id: ConversationId,
        content: String,
        created_at: Timestamp,
    ) -> StoreChange {
        if self.conversation_id != Some(conversation_id) || self.position_of(tag).is_some() {
            return StoreChange::Unchanged;
        }

        let position = self.insert_sorted(TimelineEntry::Pending(PendingMessage {
            tag,
            conversation_id,
            content,
            created_at,
            status: PendingStatus::Sending,
        }));
        StoreChange::Inserted {
            position,
            local: true,
        }
    }

    /// Swap the optimistic entry `tag` for the server's copy.
    ///
    /// A no-op when the push echo already confirmed the entry. When the push
    /// delivery landed while the entry was failed, the entry is dropped. When
    /// the entry is gone for another reason (discarded, cleared by a reload),
    /// the message is inserted like a push delivery.
    pub fn reconcile_optimistic(&mut self, tag: TempTag, message: Message) -> StoreChange {
        if self.conversation_id != Some(message.conversation_id) {
            return StoreChange::Unchanged;
        }

        let index = self.position_of(tag);
        if self.ids.contains(&message.id) {
            return match index {
                Some(index) => {
                    self.entries.remove(index);
                    debug!(message_id = message.id, "push echo arrived first; dropped optimistic entry");
                    StoreChange::Removed
                }
                None => StoreChange::Unchanged,
            };
        }

        match index {
            Some(index) => {
                self.ids.insert(message.id);
                self.entries[index] = TimelineEntry::Confirmed(message);
                self.entries.sort_by_key(TimelineEntry::sort_key);
                StoreChange::Replaced
            }
            None => self.apply_realtime(message),
        }
    }

    /// Flag a pending entry as failed.
    pub fn mark_failed(&mut self, tag: TempTag, reason: impl Into<String>) -> StoreChange {
        self.set_status(tag, PendingStatus::Failed(reason.into()))
    }

    /// Flag a pending entry as being sent again.
    pub fn mark_sending(&mut self, tag: TempTag) -> StoreChange {
        self.set_status(tag, PendingStatus::Sending)
    }

    /// Remove a pending entry.
    pub fn remove_pending(&mut self, tag: TempTag) -> StoreChange {
        match self.position_of(tag) {
            Some(index) => {
                self.entries.remove(index);
                StoreChange::Removed
            }
            None => StoreChange::Unchanged,
        }
    }

    /// Mirror the mark-read action on loaded inbound messages.
    pub fn mark_all_read(&mut self) -> StoreChange {
        let mut changed = false;
        for entry in &mut self.entries {
            if let TimelineEntry::Confirmed(message) = entry
                && message.is_inbound()
                && !message.is_read
            {
                message.is_read = true;
                changed = true;
            }
        }
        if changed {
            StoreChange::Updated
        } else {
            StoreChange::Unchanged
        }
    }

    /// Forget the conversation and every entry.
    pub fn clear(&mut self) {
        self.conversation_id = None;
        self.entries.clear();
        self.ids.clear();
        self.has_more = false;
    }

    #[must_use]
    pub const fn conversation_id(&self) -> Option<ConversationId> {
        self.conversation_id
    }

    #[must_use]
    pub fn entries(&self) -> &[TimelineEntry] {
        &self.entries
    }

    /// Confirmed messages in timeline order.
    pub fn messages(&self) -> impl Iterator<Item = &Message> {
        self.entries.iter().filter_map(TimelineEntry::message)
    }

    #[must_use]
    pub fn pending(&self, tag: TempTag) -> Option<&PendingMessage> {
        self.entries
            .iter()
            .filter_map(TimelineEntry::pending)
            .find(|pending| pending.tag == tag)
    }

    /// Pending entries whose send failed, oldest first.
    pub fn failed(&self) -> impl Iterator<Item = &PendingMessage> {
        self.entries
            .iter()
            .filter_map(TimelineEntry::pending)
            .filter(|pending| pending.is_failed())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Backward pagination cursor.
    #[must_use]
    pub fn oldest_id(&self) -> Option<MessageId> {
        self.ids.iter().min().copied()
    }

    #[must_use]
    pub const fn has_more(&self) -> bool {
        self.has_more
    }

    #[must_use]
    pub const fn page_size(&self) -> usize {
        self.page_size
    }

    fn position_of(&self, tag: TempTag) -> Option<usize> {
        self.entries
            .iter()
            .position(|entry| entry.pending().is_some_and(|pending| pending.tag == tag))
    }

    fn sending_with_content(&self, content: &str) -> Option<usize> {
        self.entries.iter().position(|entry| {
            entry.pending().is_some_and(|pending| {
                pending.status == PendingStatus::Sending && pending.content == content
            })
        })
    }

    fn set_status(&mut self, tag: TempTag, status: PendingStatus) -> StoreChange {
        let Some(index) = self.position_of(tag) else {
            return StoreChange::Unchanged;
        };
        match &mut self.entries[index] {
            TimelineEntry::Pending(pending) if pending.status != status => {
                pending.status = status;
                StoreChange::Updated
            }
            _ => StoreChange::Unchanged,
        }
    }

    fn insert_sorted(&mut self, entry: TimelineEntry) -> InsertPosition {
        let key = entry.sort_key();
        let index = self.entries.partition_point(|existing| existing.sort_key() <= key);
        self.entries.insert(index, entry);

        let confirmed_after = self.entries[index + 1..]
            .iter()
            .any(|existing| existing.message().is_some());
        if confirmed_after {
            InsertPosition::Middle
        } else {
            InsertPosition::Tail
        }
    }
}
