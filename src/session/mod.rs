//! Session handling on top of the flow lock: intent mapping, per-message
//! orchestration, tenant answers and the rollout gate.

mod intent;
mod orchestrator;
mod rollout;
mod tenant;

pub use intent::{ClassifiedIntent, InstitutionalTopic, Intent};
pub use orchestrator::{
    ActionKind, InboundMessage, OrchestrationResult, SessionOrchestrator, Telemetry,
};
pub use rollout::RolloutGate;
pub use tenant::{ServiceOffer, TenantProfile};
