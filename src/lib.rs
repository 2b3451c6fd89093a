//! flowlock - Conversation Flow-Lock Arbitration
//!
//! Decides which multi-turn conversational flow owns a chat session, when a
//! new intent may preempt it, and when an abandoned flow expires.
//!
//! ## Features
//!
//! - **Flow Lock:** Per-flow timeouts, priority-based preemption, step
//!   progression with a minimum response window, completion and abandonment
//! - **Timeout Polling:** Active / warning / expired classification with
//!   user-facing countdown messages
//! - **Context Store:** Per-session context records with optimistic
//!   versioning, in memory or in SQLite
//! - **Orchestration:** Maps classified intents onto flow transitions and
//!   records intent and flow history
//! - **Rollout Gate:** Percentage rollout by stable session hash, tenant
//!   blacklist
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use flowlock::context::SqliteContextStore;
//! use flowlock::flow::FlowLockManager;
//! use flowlock::session::{ClassifiedIntent, InboundMessage, SessionOrchestrator};
//! use flowlock::context::DecisionMethod;
//!
//! # async fn run() -> flowlock::error::Result<()> {
//! let store = Arc::new(SqliteContextStore::new("flowlock.db").await?);
//! let orchestrator = SessionOrchestrator::new(store, FlowLockManager::default());
//!
//! let message = InboundMessage::new("5511999990000", "tenant-1", "user-1", "quero agendar")
//!     .with_intent(ClassifiedIntent::new("booking", 0.92, DecisionMethod::Dictionary));
//! let result = orchestrator.handle(message).await?;
//! println!("{}", result.response);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod context;
pub mod error;
pub mod flow;
pub mod logging;
pub mod session;
pub mod utils;

// Re-export commonly used types
pub use error::{ErrorCode, FlowError};
pub use flow::{FlowDecision, FlowLock, FlowLockManager, FlowType, TimeoutStatus};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");
