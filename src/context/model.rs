//! Conversation Context Record
//!
//! Per-session state persisted alongside the flow lock: intent history,
//! finished-flow history, aggregate flow metrics and session bookkeeping.

use crate::flow::{FlowLock, FlowType};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationContext {
    pub id: Uuid,
    pub session_id: String,
    pub tenant_id: String,
    pub user_id: String,
    #[serde(default)]
    pub flow_lock: Option<FlowLock>,
    #[serde(default)]
    pub intent_history: Vec<IntentRecord>,
    #[serde(default)]
    pub flow_history: Vec<FlowHistoryEntry>,
    #[serde(default)]
    pub flow_metrics: FlowMetrics,
    pub session: SessionMetadata,
    pub status: ContextStatus,
    /// Optimistic concurrency counter; 0 means never stored
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextStatus {
    Active,
    Idle,
    Expired,
    Completed,
}

impl ContextStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Idle => "idle",
            Self::Expired => "expired",
            Self::Completed => "completed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionMetadata {
    pub session_started_at: DateTime<Utc>,
    pub message_count: u32,
    pub duration_minutes: i64,
    pub last_message_at: DateTime<Utc>,
}

/// How the intent of a message was decided
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionMethod {
    Command,
    Dictionary,
    Regex,
    Llm,
    None,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntentRecord {
    pub intent: Option<String>,
    pub confidence: f32,
    pub timestamp: DateTime<Utc>,
    pub decision_method: DecisionMethod,
}

/// How a flow left the session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowOutcome {
    Completed,
    Abandoned,
    Timeout,
    Interrupted,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowHistoryEntry {
    pub flow_type: FlowType,
    pub step: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub outcome: FlowOutcome,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub duration_ms: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FlowMetrics {
    pub flows_started: u32,
    pub flows_completed: u32,
    pub flows_abandoned: u32,
    pub flows_timed_out: u32,
    pub flows_interrupted: u32,
    pub total_flow_duration_ms: i64,
    pub average_duration_ms: i64,
    pub most_recent_flow: Option<FlowType>,
}

impl FlowMetrics {
    pub fn flows_ended(&self) -> u32 {
        self.flows_completed + self.flows_abandoned + self.flows_timed_out + self.flows_interrupted
    }
}

impl ConversationContext {
    pub fn new(
        session_id: impl Into<String>,
        tenant_id: impl Into<String>,
        user_id: impl Into<String>,
        now: DateTime<Utc>,
        ttl: Duration,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            session_id: session_id.into(),
            tenant_id: tenant_id.into(),
            user_id: user_id.into(),
            flow_lock: None,
            intent_history: Vec::new(),
            flow_history: Vec::new(),
            flow_metrics: FlowMetrics::default(),
            session: SessionMetadata {
                session_started_at: now,
                message_count: 0,
                duration_minutes: 0,
                last_message_at: now,
            },
            status: ContextStatus::Active,
            version: 0,
            created_at: now,
            updated_at: now,
            last_activity_at: now,
            expires_at: now + ttl,
        }
    }

    pub fn active_flow(&self) -> Option<FlowType> {
        self.flow_lock.as_ref().and_then(|lock| lock.active_flow)
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    /// Append to the intent history, keeping at most `limit` newest entries
    pub fn record_intent(&mut self, record: IntentRecord, limit: usize) {
        self.intent_history.push(record);
        trim_front(&mut self.intent_history, limit);
    }

    pub fn record_flow_start(&mut self, flow: FlowType) {
        self.flow_metrics.flows_started += 1;
        self.flow_metrics.most_recent_flow = Some(flow);
    }

    /// Close out the flow held by `lock` (the lock as it was before it was
    /// cleared). Does nothing for an inert lock.
    pub fn record_flow_end(
        &mut self,
        lock: &FlowLock,
        outcome: FlowOutcome,
        reason: Option<&str>,
        now: DateTime<Utc>,
        limit: usize,
    ) {
        let Some(flow) = lock.active_flow else {
            return;
        };
        let duration_ms = (now - lock.created_at).num_milliseconds().max(0);

        self.flow_history.push(FlowHistoryEntry {
            flow_type: flow,
            step: lock.step.clone(),
            started_at: lock.created_at,
            ended_at: now,
            outcome,
            reason: reason.map(str::to_string),
            duration_ms,
        });
        trim_front(&mut self.flow_history, limit);

        let metrics = &mut self.flow_metrics;
        match outcome {
            FlowOutcome::Completed => metrics.flows_completed += 1,
            FlowOutcome::Abandoned => metrics.flows_abandoned += 1,
            FlowOutcome::Timeout => metrics.flows_timed_out += 1,
            FlowOutcome::Interrupted => metrics.flows_interrupted += 1,
        }
        metrics.total_flow_duration_ms += duration_ms;
        metrics.average_duration_ms =
            metrics.total_flow_duration_ms / i64::from(metrics.flows_ended().max(1));
    }

    /// Account for one handled message and push the context expiry out
    pub fn touch(&mut self, now: DateTime<Utc>, ttl: Duration) {
        self.session.message_count += 1;
        self.session.last_message_at = now;
        self.session.duration_minutes = (now - self.session.session_started_at).num_minutes();
        self.last_activity_at = now;
        self.updated_at = now;
        self.expires_at = now + ttl;
        self.status = ContextStatus::Active;
    }
}

fn trim_front<T>(items: &mut Vec<T>, limit: usize) {
    if items.len() > limit {
        let excess = items.len() - limit;
        items.drain(..excess);
    }
}
