//! Flow Lock Record
//!
//! The per-session record saying which flow owns the conversation, how far it
//! got, and until when it holds the session.

use super::types::{FlowPriority, FlowType};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Well-known step names
pub mod steps {
    pub const START: &str = "start";
    pub const COMPLETE: &str = "complete";
    pub const ABANDONED: &str = "abandoned";
    pub const COLLECT_SERVICE: &str = "collect_service";
    pub const COLLECT_ID: &str = "collect_id";
    pub const COLLECT_EMAIL: &str = "collect_email";
    pub const CONFIRM: &str = "confirm";
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowLock {
    /// Flow currently owning the session; `None` means the lock is inert
    pub active_flow: Option<FlowType>,
    pub step: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub priority: FlowPriority,
    #[serde(default)]
    pub step_data: StepData,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_flow_hint: Option<FlowType>,
}

impl FlowLock {
    pub fn is_active(&self) -> bool {
        self.active_flow.is_some()
    }

    /// Milliseconds left before expiry; negative once expired
    pub fn remaining_ms(&self, now: DateTime<Utc>) -> i64 {
        (self.expires_at - now).num_milliseconds()
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// Working state of a flow.
///
/// Updates are merged shallowly: anything set in the update wins, anything
/// absent is kept.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct StepData {
    #[serde(default)]
    pub slots: FlowSlots,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outcome: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub abandon_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub extra: Map<String, Value>,
}

impl StepData {
    pub fn with_slots(slots: FlowSlots) -> Self {
        Self {
            slots,
            ..Self::default()
        }
    }

    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    pub fn merge(&mut self, update: StepData) {
        self.slots.merge(update.slots);
        overlay(&mut self.outcome, update.outcome);
        overlay(&mut self.abandon_reason, update.abandon_reason);
        self.extra.extend(update.extra);
    }
}

/// Slots collected by each flow, tagged by flow type
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "flow", rename_all = "snake_case")]
pub enum FlowSlots {
    #[default]
    Empty,
    Onboarding(OnboardingSlots),
    Booking(BookingSlots),
    Reschedule(RescheduleSlots),
    Cancel(CancelSlots),
    Pricing(PricingSlots),
    Institutional(InstitutionalSlots),
    Handoff(HandoffSlots),
    General,
    Greeting,
}

impl FlowSlots {
    /// Empty slots of the variant belonging to `flow`
    pub fn for_flow(flow: FlowType) -> Self {
        match flow {
            FlowType::Onboarding => Self::Onboarding(OnboardingSlots::default()),
            FlowType::Booking => Self::Booking(BookingSlots::default()),
            FlowType::Reschedule => Self::Reschedule(RescheduleSlots::default()),
            FlowType::Cancel => Self::Cancel(CancelSlots::default()),
            FlowType::Pricing => Self::Pricing(PricingSlots::default()),
            FlowType::Institutional => Self::Institutional(InstitutionalSlots::default()),
            FlowType::Handoff => Self::Handoff(HandoffSlots::default()),
            FlowType::General => Self::General,
            FlowType::Greeting => Self::Greeting,
        }
    }

    /// Merge an update into these slots. Same variant: field-wise overlay.
    /// `Empty` update: no-op. Different variant: replaced.
    pub fn merge(&mut self, update: FlowSlots) {
        match (&mut *self, update) {
            (_, FlowSlots::Empty) => {}
            (FlowSlots::Onboarding(base), FlowSlots::Onboarding(upd)) => {
                overlay(&mut base.email, upd.email);
                overlay(&mut base.name, upd.name);
            }
            (FlowSlots::Booking(base), FlowSlots::Booking(upd)) => {
                overlay(&mut base.service, upd.service);
                overlay(&mut base.professional, upd.professional);
                overlay(&mut base.selected_slot, upd.selected_slot);
            }
            (FlowSlots::Reschedule(base), FlowSlots::Reschedule(upd)) => {
                overlay(&mut base.appointment_id, upd.appointment_id);
                overlay(&mut base.new_slot, upd.new_slot);
            }
            (FlowSlots::Cancel(base), FlowSlots::Cancel(upd)) => {
                overlay(&mut base.appointment_id, upd.appointment_id);
                overlay(&mut base.reason, upd.reason);
            }
            (FlowSlots::Pricing(base), FlowSlots::Pricing(upd)) => {
                overlay(&mut base.service, upd.service);
            }
            (FlowSlots::Institutional(base), FlowSlots::Institutional(upd)) => {
                overlay(&mut base.topic, upd.topic);
            }
            (FlowSlots::Handoff(base), FlowSlots::Handoff(upd)) => {
                overlay(&mut base.reason, upd.reason);
            }
            (slots, other) => *slots = other,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct OnboardingSlots {
    pub email: Option<String>,
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct BookingSlots {
    pub service: Option<String>,
    pub professional: Option<String>,
    pub selected_slot: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RescheduleSlots {
    pub appointment_id: Option<String>,
    pub new_slot: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CancelSlots {
    pub appointment_id: Option<String>,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PricingSlots {
    pub service: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct InstitutionalSlots {
    pub topic: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct HandoffSlots {
    pub reason: Option<String>,
}

fn overlay<T>(base: &mut Option<T>, update: Option<T>) {
    if update.is_some() {
        *base = update;
    }
}
