//! Flow Lock
//!
//! Which conversational flow owns a chat session, priority-based preemption
//! between flows, and timeout-based abandonment.

mod clock;
mod decision;
mod lock;
mod manager;
pub mod tables;
mod types;

pub use clock::{Clock, ManualClock, SystemClock};
pub use decision::{DecisionReason, FlowAction, FlowDecision, TimeoutStatus};
pub use lock::{
    BookingSlots, CancelSlots, FlowLock, FlowSlots, HandoffSlots, InstitutionalSlots,
    OnboardingSlots, PricingSlots, RescheduleSlots, StepData, steps,
};
pub use manager::{FlowLockManager, NO_ACTIVE_FLOW};
pub use types::{FlowPriority, FlowType};
