//! Backward pagination over a conversation's messages.
//!
//! The controller hands out [`PageTicket`]s; the fetch itself runs elsewhere
//! and its result is handed back through [`PaginationController::complete`],
//! which discards anything issued for a conversation that is no longer open.

use shared::models::{ConversationId, Message, MessageId, sort_messages};
use tracing::debug;

use crate::api::{ApiError, ChatApi};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageKind {
    Newest,
    Older,
}

/// Identity of an issued fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageTicket {
    pub conversation_id: ConversationId,
    pub kind: PageKind,
    pub before_id: Option<MessageId>,
    generation: u64,
}

/// Messages in ascending order plus whether older ones may exist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    pub messages: Vec<Message>,
    pub has_more: bool,
}

impl Page {
    /// Normalize a raw API response.
    ///
    /// Rows at or above `before` are dropped, the rest sorted ascending and
    /// trimmed to the newest `limit` rows. A page with fewer than `limit`
    /// rows ends pagination.
    #[must_use]
    pub fn from_rows(mut rows: Vec<Message>, before: Option<MessageId>, limit: usize) -> Self {
        if let Some(before) = before {
            rows.retain(|message| message.id < before);
        }
        sort_messages(&mut rows);
        let has_more = rows.len() >= limit;
        if rows.len() > limit {
            rows.drain(..rows.len() - limit);
        }
        Self {
            messages: rows,
            has_more,
        }
    }
}

/// Result of handing a finished fetch back to the controller.
#[derive(Debug)]
pub enum PageOutcome {
    Loaded(Page),
    Failed(ApiError),
    /// Issued for a conversation (or an earlier opening of it) that is no longer current.
    Stale,
}

/// Load the newest page of a conversation.
///
/// # Errors
/// Propagates the API failure.
pub async fn load_newest(
    api: &dyn ChatApi,
    conversation_id: ConversationId,
    page_size: usize,
) -> Result<Page, ApiError> {
    let rows = api.fetch_messages(conversation_id, None, page_size).await?;
    Ok(Page::from_rows(rows, None, page_size))
}

/// Load the page of messages strictly older than `before_id`.
///
/// # Errors
/// Propagates the API failure.
pub async fn load_older(
    api: &dyn ChatApi,
    conversation_id: ConversationId,
    before_id: MessageId,
    page_size: usize,
) -> Result<Page, ApiError> {
    let rows = api
        .fetch_messages(conversation_id, Some(before_id), page_size)
        .await?;
    Ok(Page::from_rows(rows, Some(before_id), page_size))
}

#[derive(Debug, Clone)]
pub struct PaginationController {
    page_size: usize,
    current: Option<ConversationId>,
    generation: u64,
    loading_newest: bool,
    loading_older: bool,
    exhausted: bool,
}

impl PaginationController {
    #[must_use]
    pub fn new(page_size: usize) -> Self {
        Self {
            page_size: page_size.max(1),
            current: None,
            generation: 0,
            loading_newest: false,
            loading_older: false,
            exhausted: false,
        }
    }

    #[must_use]
    pub const fn page_size(&self) -> usize {
        self.page_size
    }

    /// Start loading `conversation_id` from its newest page. Anything in
    /// flight for the previous selection becomes stale.
    pub fn begin_newest(&mut self, conversation_id: ConversationId) -> PageTicket {
        self.generation += 1;
        self.current = Some(conversation_id);
        self.loading_newest = true;
        self.loading_older = false;
        self.exhausted = false;
        PageTicket {
            conversation_id,
            kind: PageKind::Newest,
            before_id: None,
            generation: self.generation,
        }
    }

    /// Ask for the page before `oldest_id`.
    ///
    /// Returns `None` while another load is running, after exhaustion, or when
    /// nothing is loaded yet.
    pub fn begin_older(
        &mut self,
        conversation_id: ConversationId,
        oldest_id: Option<MessageId>,
    ) -> Option<PageTicket> {
        if self.current != Some(conversation_id) {
            return None;
        }
        if self.loading_newest || self.loading_older {
            debug!(conversation_id, "older page already in flight");
            return None;
        }
        if self.exhausted {
            return None;
        }
        let before_id = oldest_id?;

        self.loading_older = true;
        Some(PageTicket {
            conversation_id,
            kind: PageKind::Older,
            before_id: Some(before_id),
            generation: self.generation,
        })
    }

    /// Accept the result of a fetch issued with `ticket`.
    pub fn complete(&mut self, ticket: &PageTicket, result: Result<Page, ApiError>) -> PageOutcome {
        if self.current != Some(ticket.conversation_id) || self.generation != ticket.generation {
            debug!(
                conversation_id = ticket.conversation_id,
                kind = ?ticket.kind,
                "discarding stale page"
            );
            return PageOutcome::Stale;
        }

        match ticket.kind {
            PageKind::Newest => self.loading_newest = false,
            PageKind::Older => self.loading_older = false,
        }

        match result {
            Ok(page) => {
                self.exhausted = !page.has_more;
                PageOutcome::Loaded(page)
            }
            Err(err) => PageOutcome::Failed(err),
        }
    }

    /// Forget the current conversation; in-flight results become stale.
    pub fn reset(&mut self) {
        self.generation += 1;
        self.current = None;
        self.loading_newest = false;
        self.loading_older = false;
        self.exhausted = false;
    }

    #[must_use]
    pub const fn is_loading(&self) -> bool {
        self.loading_newest
    }

    #[must_use]
    pub const fn is_loading_older(&self) -> bool {
        self.loading_older
    }
}
