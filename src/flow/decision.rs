//! Arbitration and timeout results returned by the flow manager

use super::types::FlowType;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What the caller should do with the conversation after a decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowAction {
    Continue,
}

/// Why an arbitration decision came out the way it did
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionReason {
    /// No lock, or the lock is inert
    NoActiveFlow,
    /// The current lock ran out
    Expired,
    /// The candidate outranks the current flow
    Interrupts,
    /// The current flow keeps the session
    Blocked,
}

/// Outcome of `can_start_new_flow`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowDecision {
    pub allow_intent: bool,
    pub current_flow: Option<FlowType>,
    pub current_step: Option<String>,
    pub suggested_response: String,
    pub action: FlowAction,
    /// New expiry for an allowed flow, or the untouched expiry of the
    /// current lock when denied
    pub expires_at: DateTime<Utc>,
    pub reason: DecisionReason,
}

impl FlowDecision {
    /// True when an allowed decision preempts a live flow
    pub fn interrupts_current(&self) -> bool {
        self.reason == DecisionReason::Interrupts
    }
}

/// Result of a timeout poll on the session's lock
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TimeoutStatus {
    Active,
    Warning { remaining_ms: i64, message: String },
    Expired { message: String },
}

impl TimeoutStatus {
    pub fn message(&self) -> Option<&str> {
        match self {
            Self::Active => None,
            Self::Warning { message, .. } | Self::Expired { message } => Some(message),
        }
    }

    pub fn is_expired(&self) -> bool {
        matches!(self, Self::Expired { .. })
    }

    pub fn is_warning(&self) -> bool {
        matches!(self, Self::Warning { .. })
    }
}
