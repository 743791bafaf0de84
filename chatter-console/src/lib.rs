//! Sync core of the chatter console.
//!
//! The pieces mirror what the operator sees: a [`store::MessageStore`] for the
//! open timeline, a [`pagination::PaginationController`] walking it backwards,
//! a [`realtime::RealtimeChannel`] delivering pushed messages, a
//! [`reconciler::SendReconciler`] for optimistic sends, a
//! [`scroll::ScrollAnchor`] deciding scroll reactions and a
//! [`index::ConversationIndex`] for the sidebar. [`engine::Console`] wires them
//! to the pull API and the push transport.

pub mod api;
pub mod engine;
pub mod index;
pub mod logging;
pub mod pagination;
pub mod realtime;
pub mod reconciler;
pub mod scroll;
pub mod store;

#[cfg(test)]
mod testing;

pub use api::{ApiError, ChatApi, HttpChatApi};
pub use engine::{Console, ConsoleError, ConsoleEvent, ConsoleSettings, ConsoleStatus, ConsoleUpdate};
pub use realtime::{PushTransport, RealtimeError, SseTransport, SubscriptionState};
pub use scroll::{ScrollAction, Viewport};
pub use store::{StoreChange, TempTag, TimelineEntry};
