//! Flow type and priority classification

use serde::{Deserialize, Serialize};
use std::fmt;

/// A named multi-turn conversational task that can own a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowType {
    Onboarding,
    Booking,
    Reschedule,
    Cancel,
    Pricing,
    Institutional,
    Handoff,
    General,
    Greeting,
}

impl FlowType {
    pub const ALL: [FlowType; 9] = [
        FlowType::Onboarding,
        FlowType::Booking,
        FlowType::Reschedule,
        FlowType::Cancel,
        FlowType::Pricing,
        FlowType::Institutional,
        FlowType::Handoff,
        FlowType::General,
        FlowType::Greeting,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Onboarding => "onboarding",
            Self::Booking => "booking",
            Self::Reschedule => "reschedule",
            Self::Cancel => "cancel",
            Self::Pricing => "pricing",
            Self::Institutional => "institutional",
            Self::Handoff => "handoff",
            Self::General => "general",
            Self::Greeting => "greeting",
        }
    }

    /// Strict lookup by name. Returns `None` for unrecognized names.
    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|flow| flow.as_str().eq_ignore_ascii_case(name.trim()))
    }

    /// Permissive lookup: unrecognized names resolve to `General`, so new
    /// flow names coming from the classifier never break arbitration.
    pub fn from_name(name: &str) -> Self {
        Self::parse(name).unwrap_or_else(|| {
            tracing::debug!("Unknown flow type '{}', falling back to general", name);
            Self::General
        })
    }
}

impl fmt::Display for FlowType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Coarse priority label stored on the lock for inspection and logs.
/// Arbitration itself compares the numeric score from the priority table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowPriority {
    High,
    Medium,
    Low,
}

impl FlowPriority {
    pub fn from_score(score: u8) -> Self {
        match score {
            8.. => Self::High,
            4..=7 => Self::Medium,
            _ => Self::Low,
        }
    }
}
