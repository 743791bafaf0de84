//! Sidebar state for every conversation.

use std::collections::{HashMap, HashSet, VecDeque};

use futures_util::future::join_all;
use shared::models::{
    ConversationId, ConversationRecord, ConversationSummary, Message, MessageId, PriorityLevel,
};
use tracing::{debug, warn};

use crate::api::{ApiError, ChatApi};

/// Message ids remembered per conversation to absorb redeliveries.
pub const SEEN_WINDOW: usize = 256;

#[derive(Debug, Clone, Default)]
struct SeenWindow {
    order: VecDeque<MessageId>,
    ids: HashSet<MessageId>,
}

impl SeenWindow {
    /// Returns `false` if `id` was already seen.
    fn insert(&mut self, id: MessageId) -> bool {
        if !self.ids.insert(id) {
            return false;
        }
        self.order.push_back(id);
        if self.order.len() > SEEN_WINDOW
            && let Some(evicted) = self.order.pop_front()
        {
            self.ids.remove(&evicted);
        }
        true
    }
}

/// Summaries in load order plus the currently open conversation.
#[derive(Debug, Clone, Default)]
pub struct ConversationIndex {
    summaries: Vec<ConversationSummary>,
    open: Option<ConversationId>,
    seen: HashMap<ConversationId, SeenWindow>,
}

impl ConversationIndex {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace every summary with a fresh list.
    pub fn load(&mut self, summaries: Vec<ConversationSummary>) {
        self.summaries = summaries;
        self.seen.clear();
        if let Some(open) = self.open
            && let Some(summary) = self.get_mut(open)
        {
            summary.unread_count = 0;
        }
    }

    /// Account for a pushed message. Redeliveries are ignored.
    ///
    /// Fan messages for conversations other than the open one bump the
    /// unread count; every message may refresh the preview.
    pub fn on_inbound_message(&mut self, message: &Message) -> bool {
        if self.get(message.conversation_id).is_none() {
            debug!(
                conversation_id = message.conversation_id,
                "push for a conversation missing from the sidebar"
            );
            return false;
        }
        if !self
            .seen
            .entry(message.conversation_id)
            .or_default()
            .insert(message.id)
        {
            debug!(message_id = message.id, "redelivered message already counted");
            return false;
        }

        let open = self.open;
        let Some(summary) = self.get_mut(message.conversation_id) else {
            return false;
        };
        update_preview(summary, &message.content, Some(message.id));
        if message.is_inbound() && !message.is_read && open != Some(message.conversation_id) {
            summary.unread_count = summary.unread_count.saturating_add(1);
        }
        true
    }

    /// Preview an outbound message. `message_id` is `None` before the server confirmed it.
    pub fn on_outbound_message(
        &mut self,
        conversation_id: ConversationId,
        content: &str,
        message_id: Option<MessageId>,
    ) -> bool {
        if let Some(id) = message_id {
            self.seen.entry(conversation_id).or_default().insert(id);
        }
        match self.get_mut(conversation_id) {
            Some(summary) => update_preview(summary, content, message_id),
            None => false,
        }
    }

    /// Refresh the preview from a loaded timeline without touching unread counts.
    pub fn observe_latest(&mut self, message: &Message) -> bool {
        self.seen
            .entry(message.conversation_id)
            .or_default()
            .insert(message.id);
        match self.get_mut(message.conversation_id) {
            Some(summary) => update_preview(summary, &message.content, Some(message.id)),
            None => false,
        }
    }

    /// Mark `conversation_id` as open and clear its unread count.
    pub fn on_select(&mut self, conversation_id: ConversationId) {
        self.open = Some(conversation_id);
        self.reset_unread(conversation_id);
    }

    pub fn on_mark_read(&mut self, conversation_id: ConversationId) {
        self.reset_unread(conversation_id);
    }

    /// Returns the previous level, or `None` for an unknown conversation.
    pub fn on_priority_change(
        &mut self,
        conversation_id: ConversationId,
        level: PriorityLevel,
    ) -> Option<PriorityLevel> {
        let summary = self.get_mut(conversation_id)?;
        Some(std::mem::replace(&mut summary.priority_level, level))
    }

    pub fn close(&mut self) {
        self.open = None;
    }

    #[must_use]
    pub const fn open(&self) -> Option<ConversationId> {
        self.open
    }

    #[must_use]
    pub fn get(&self, conversation_id: ConversationId) -> Option<&ConversationSummary> {
        self.summaries
            .iter()
            .find(|summary| summary.id == conversation_id)
    }

    /// Sidebar order: by priority with `none` last, load order otherwise.
    #[must_use]
    pub fn sorted(&self) -> Vec<&ConversationSummary> {
        let mut sorted: Vec<_> = self.summaries.iter().collect();
        sorted.sort_by_key(|summary| summary.priority_level.sort_rank());
        sorted
    }

    /// Case-insensitive fan name filter over [`Self::sorted`].
    #[must_use]
    pub fn search(&self, term: &str) -> Vec<&ConversationSummary> {
        let needle = term.trim().to_lowercase();
        self.sorted()
            .into_iter()
            .filter(|summary| needle.is_empty() || summary.fan_name.to_lowercase().contains(&needle))
            .collect()
    }

    #[must_use]
    pub fn total_unread(&self) -> u64 {
        self.summaries
            .iter()
            .map(|summary| u64::from(summary.unread_count))
            .sum()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.summaries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.summaries.is_empty()
    }

    fn get_mut(&mut self, conversation_id: ConversationId) -> Option<&mut ConversationSummary> {
        self.summaries
            .iter_mut()
            .find(|summary| summary.id == conversation_id)
    }

    fn reset_unread(&mut self, conversation_id: ConversationId) {
        if let Some(summary) = self.get_mut(conversation_id) {
            summary.unread_count = 0;
        }
    }
}

/// Replace the preview unless it already shows a newer message.
fn update_preview(summary: &mut ConversationSummary, content: &str, id: Option<MessageId>) -> bool {
    let newer = match (id, summary.last_message_id) {
        (Some(id), Some(current)) => id >= current,
        _ => true,
    };
    if !newer {
        return false;
    }
    summary.last_message = content.to_string();
    if id.is_some() {
        summary.last_message_id = id;
    }
    true
}

/// Fetch the conversation list and each fan profile.
///
/// A failed fan lookup degrades that row to an unknown fan instead of failing the list.
///
/// # Errors
/// Fails only when the conversation list itself cannot be fetched.
pub async fn load_summaries(api: &dyn ChatApi) -> Result<Vec<ConversationSummary>, ApiError> {
    let records: Vec<ConversationRecord> = api.list_conversations().await?;
    let fans = join_all(records.iter().map(|record| api.fetch_fan(record.fan_id))).await;

    Ok(records
        .iter()
        .zip(fans)
        .map(|(record, fan)| {
            let fan = fan
                .inspect_err(|err| {
                    warn!(conversation_id = record.id, fan_id = record.fan_id, error = %err, "fan lookup failed");
                })
                .ok();
            ConversationSummary::from_record(record, fan.as_ref())
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::tests::msg;
    use crate::testing::FakeApi;
    use shared::models::Sender;

    fn summary(id: ConversationId, name: &str, priority: PriorityLevel) -> ConversationSummary {
        ConversationSummary {
            id,
            fan_id: id * 10,
            fan_name: name.to_string(),
            last_message: String::new(),
            priority_level: priority,
            unread_count: 0,
            last_message_id: None,
        }
    }

    fn index() -> ConversationIndex {
        let mut index = ConversationIndex::new();
        index.load(vec![
            summary(5, "Ada", PriorityLevel::None),
            summary(7, "Bea", PriorityLevel::Low),
            summary(9, "Cy", PriorityLevel::High),
            summary(11, "Adam", PriorityLevel::None),
        ]);
        index
    }

    #[test]
    fn inbound_for_closed_conversation_counts_once() {
        let mut index = index();
        index.on_select(5);

        assert!(index.on_inbound_message(&msg(7, 100, Sender::Fan)));
        assert!(!index.on_inbound_message(&msg(7, 100, Sender::Fan)));

        assert_eq!(index.get(7).unwrap().unread_count, 1);
        assert_eq!(index.get(7).unwrap().last_message, "message 100");
        assert_eq!(index.get(5).unwrap().unread_count, 0);
    }

    #[test]
    fn open_conversation_and_outbound_do_not_count() {
        let mut index = index();
        index.on_select(5);

        index.on_inbound_message(&msg(5, 100, Sender::Fan));
        index.on_inbound_message(&msg(7, 101, Sender::Chatter));

        assert_eq!(index.get(5).unwrap().unread_count, 0);
        assert_eq!(index.get(7).unwrap().unread_count, 0);
        assert_eq!(index.get(7).unwrap().last_message, "message 101");
    }

    #[test]
    fn select_and_mark_read_reset_unread() {
        let mut index = index();
        for id in 1..=3 {
            index.on_inbound_message(&msg(7, id, Sender::Fan));
            index.on_inbound_message(&msg(9, id + 10, Sender::Fan));
        }
        assert_eq!(index.total_unread(), 6);

        index.on_select(7);
        assert_eq!(index.get(7).unwrap().unread_count, 0);
        index.on_mark_read(9);
        assert_eq!(index.get(9).unwrap().unread_count, 0);
        assert_eq!(index.total_unread(), 0);
    }

    #[test]
    fn older_delivery_does_not_regress_preview() {
        let mut index = index();
        index.on_inbound_message(&msg(7, 20, Sender::Fan));
        index.on_inbound_message(&msg(7, 19, Sender::Fan));

        let summary = index.get(7).unwrap();
        assert_eq!(summary.last_message, "message 20");
        assert_eq!(summary.unread_count, 2);
    }

    #[test]
    fn outbound_updates_preview_immediately() {
        let mut index = index();
        assert!(index.on_outbound_message(7, "on my way", None));
        assert_eq!(index.get(7).unwrap().last_message, "on my way");
        assert!(index.on_outbound_message(7, "confirmed", Some(30)));
        assert_eq!(index.get(7).unwrap().last_message_id, Some(30));
        assert!(!index.on_outbound_message(99, "nobody", None));
    }

    #[test]
    fn sorted_puts_none_last_and_keeps_load_order() {
        let index = index();
        let order: Vec<_> = index.sorted().iter().map(|s| s.id).collect();
        assert_eq!(order, vec![9, 7, 5, 11]);
    }

    #[test]
    fn priority_change_reorders_and_returns_previous() {
        let mut index = index();
        assert_eq!(
            index.on_priority_change(11, PriorityLevel::High),
            Some(PriorityLevel::None)
        );
        let order: Vec<_> = index.sorted().iter().map(|s| s.id).collect();
        assert_eq!(order, vec![9, 11, 7, 5]);
        assert_eq!(index.on_priority_change(99, PriorityLevel::Low), None);
    }

    #[test]
    fn search_is_case_insensitive() {
        let index = index();
        let hits: Vec<_> = index.search("ADA").iter().map(|s| s.id).collect();
        assert_eq!(hits, vec![5, 11]);
        assert_eq!(index.search("  ").len(), 4);
    }

    #[test]
    fn seen_window_is_bounded() {
        let mut window = SeenWindow::default();
        for id in 0..=i64::try_from(SEEN_WINDOW).unwrap() {
            assert!(window.insert(id));
        }
        assert_eq!(window.ids.len(), SEEN_WINDOW);
        assert!(window.insert(0));
    }

    #[tokio::test]
    async fn load_summaries_degrades_missing_fans() {
        let api = FakeApi::default();
        api.seed_conversation(5, 50, PriorityLevel::High);
        api.seed_conversation(7, 70, PriorityLevel::None);
        api.seed_fan(50, "Sunny");

        let summaries = load_summaries(&api).await.unwrap();

        assert_eq!(summaries.len(), 2);
        assert_eq!(summaries[0].fan_name, "Sunny");
        assert_eq!(summaries[1].fan_name, ConversationSummary::UNKNOWN_FAN);
    }
}
