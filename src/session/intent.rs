//! Intent keys produced by the upstream classifier and the flows they map to

use crate::context::DecisionMethod;
use crate::flow::{FlowType, steps};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Classifier output attached to an inbound message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifiedIntent {
    pub key: String,
    pub confidence: f32,
    pub method: DecisionMethod,
}

impl ClassifiedIntent {
    pub fn new(key: impl Into<String>, confidence: f32, method: DecisionMethod) -> Self {
        Self {
            key: key.into(),
            confidence,
            method,
        }
    }

    pub fn intent(&self) -> Intent {
        Intent::parse(&self.key)
    }
}

/// Topics answered directly, without touching the flow lock
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstitutionalTopic {
    Address,
    Hours,
    Policy,
    Payment,
    Contact,
    Other(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Intent {
    Onboarding,
    Booking,
    BookingConfirm,
    SlotSelection,
    Reschedule,
    RescheduleConfirm,
    Cancel,
    CancelConfirm,
    Pricing,
    Services,
    FlowCancel,
    Greeting,
    General,
    Institutional(InstitutionalTopic),
    Unknown(String),
}

impl Intent {
    pub fn parse(key: &str) -> Self {
        let key = key.trim();
        match key {
            "onboarding" => Self::Onboarding,
            "booking" => Self::Booking,
            "booking_confirm" => Self::BookingConfirm,
            "slot_selection" => Self::SlotSelection,
            "reschedule" => Self::Reschedule,
            "reschedule_confirm" => Self::RescheduleConfirm,
            "cancel" => Self::Cancel,
            "cancel_confirm" => Self::CancelConfirm,
            "pricing" => Self::Pricing,
            "services" => Self::Services,
            "flow_cancel" => Self::FlowCancel,
            "greeting" => Self::Greeting,
            "general" => Self::General,
            _ => match key.strip_prefix("institutional_") {
                Some(topic) => Self::Institutional(match topic {
                    "address" => InstitutionalTopic::Address,
                    "hours" => InstitutionalTopic::Hours,
                    "policy" => InstitutionalTopic::Policy,
                    "payment" => InstitutionalTopic::Payment,
                    "contact" => InstitutionalTopic::Contact,
                    other => InstitutionalTopic::Other(other.to_string()),
                }),
                None => Self::Unknown(key.to_string()),
            },
        }
    }

    /// Flow this intent belongs to, if any
    pub fn flow(&self) -> Option<FlowType> {
        match self {
            Self::Onboarding => Some(FlowType::Onboarding),
            Self::Booking | Self::BookingConfirm | Self::SlotSelection => Some(FlowType::Booking),
            Self::Reschedule | Self::RescheduleConfirm => Some(FlowType::Reschedule),
            Self::Cancel | Self::CancelConfirm => Some(FlowType::Cancel),
            Self::Pricing | Self::Services => Some(FlowType::Pricing),
            Self::FlowCancel
            | Self::Greeting
            | Self::General
            | Self::Institutional(_)
            | Self::Unknown(_) => None,
        }
    }

    /// Flow started by this intent together with its first step.
    /// Confirmations and slot selection continue a flow, they never start one.
    pub fn starts_flow(&self) -> Option<(FlowType, &'static str)> {
        match self {
            Self::Onboarding => Some((FlowType::Onboarding, steps::COLLECT_EMAIL)),
            Self::Booking => Some((FlowType::Booking, steps::COLLECT_SERVICE)),
            Self::Reschedule => Some((FlowType::Reschedule, steps::COLLECT_ID)),
            Self::Cancel => Some((FlowType::Cancel, steps::COLLECT_ID)),
            Self::Pricing | Self::Services => Some((FlowType::Pricing, steps::START)),
            _ => None,
        }
    }

    /// Conversation outcome recorded when this intent finishes its flow.
    /// Only confirmations end a conversation.
    pub fn finalizing_outcome(&self) -> Option<&'static str> {
        match self {
            Self::BookingConfirm => Some("appointment_created"),
            Self::CancelConfirm => Some("appointment_cancelled"),
            Self::RescheduleConfirm => Some("appointment_modified"),
            _ => None,
        }
    }

    pub fn is_finalizing(&self) -> bool {
        self.finalizing_outcome().is_some()
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let key = match self {
            Self::Onboarding => "onboarding",
            Self::Booking => "booking",
            Self::BookingConfirm => "booking_confirm",
            Self::SlotSelection => "slot_selection",
            Self::Reschedule => "reschedule",
            Self::RescheduleConfirm => "reschedule_confirm",
            Self::Cancel => "cancel",
            Self::CancelConfirm => "cancel_confirm",
            Self::Pricing => "pricing",
            Self::Services => "services",
            Self::FlowCancel => "flow_cancel",
            Self::Greeting => "greeting",
            Self::General => "general",
            Self::Institutional(topic) => {
                let topic = match topic {
                    InstitutionalTopic::Address => "address",
                    InstitutionalTopic::Hours => "hours",
                    InstitutionalTopic::Policy => "policy",
                    InstitutionalTopic::Payment => "payment",
                    InstitutionalTopic::Contact => "contact",
                    InstitutionalTopic::Other(other) => other.as_str(),
                };
                return write!(f, "institutional_{}", topic);
            }
            Self::Unknown(key) => key.as_str(),
        };
        f.write_str(key)
    }
}
