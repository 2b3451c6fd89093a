//! Conversation Context
//!
//! The per-session record the flow lock lives in, and the stores that
//! persist it.

mod model;
mod sqlx_store;
mod store;

pub use model::{
    ContextStatus, ConversationContext, DecisionMethod, FlowHistoryEntry, FlowMetrics,
    FlowOutcome, IntentRecord, SessionMetadata,
};
pub use sqlx_store::SqliteContextStore;
pub use store::{ContextStore, MemoryContextStore};
