//! Session Orchestrator
//!
//! Drives one inbound message through the flow lock: loads the session
//! context, polls the lock timeout, records the classified intent, applies
//! the intent (arbitrating flow starts), and persists the result with an
//! optimistic version check.

use super::intent::{ClassifiedIntent, Intent};
use super::tenant::TenantProfile;
use crate::config::ContextConfig;
use crate::context::{
    ContextStore, ConversationContext, DecisionMethod, FlowOutcome, IntentRecord,
};
use crate::error::Result;
use crate::flow::{
    BookingSlots, DecisionReason, FlowLockManager, FlowSlots, FlowType, StepData,
    TimeoutStatus, steps,
};
use crate::utils::short_id;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

const FALLBACK_RESPONSE: &str = "Não entendi. Pode reformular?";
const INVALID_STATE_RESPONSE: &str =
    "Desculpe, não consegui continuar essa etapa. Como posso ajudar?";
const GREETING_RESPONSE: &str = "Olá! Como posso ajudá-lo?";
const CANCELLED_RESPONSE: &str = "Cancelado. Como posso ajudar?";

/// A classified message addressed to one session
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub session_id: String,
    pub tenant_id: String,
    pub user_id: String,
    pub text: String,
    pub intent: Option<ClassifiedIntent>,
}

impl InboundMessage {
    pub fn new(
        session_id: impl Into<String>,
        tenant_id: impl Into<String>,
        user_id: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            tenant_id: tenant_id.into(),
            user_id: user_id.into(),
            text: text.into(),
            intent: None,
        }
    }

    pub fn with_intent(mut self, intent: ClassifiedIntent) -> Self {
        self.intent = Some(intent);
        self
    }
}

/// What the orchestrator did with a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    FlowStarted,
    FlowBlocked,
    FlowCompleted,
    FlowCancelled,
    SlotSelected,
    InstitutionalInfo,
    Greeting,
    Fallback,
    TimeoutExpired,
    InvalidState,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Telemetry {
    pub intent: Option<String>,
    pub confidence: f32,
    pub decision_method: DecisionMethod,
    pub flow_lock_active: bool,
    pub processing_time_ms: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct OrchestrationResult {
    pub response: String,
    pub action: ActionKind,
    /// Step-level label such as `booking_started` or `flow_cancelled`
    pub outcome: Option<String>,
    /// Set only when the message finished the conversation
    pub conversation_outcome: Option<String>,
    pub context: ConversationContext,
    pub telemetry: Telemetry,
    pub timeout_warning: Option<String>,
    pub next_flow_hint: Option<FlowType>,
}

struct Step {
    response: String,
    action: ActionKind,
    outcome: Option<String>,
    conversation_outcome: Option<&'static str>,
}

impl Step {
    fn new(response: impl Into<String>, action: ActionKind, outcome: Option<String>) -> Self {
        Self {
            response: response.into(),
            action,
            outcome,
            conversation_outcome: None,
        }
    }

    fn fallback() -> Self {
        Self::new(FALLBACK_RESPONSE, ActionKind::Fallback, None)
    }
}

/// A transition the lock manager refused becomes a polite answer so the
/// turn is still persisted. Storage and serialization errors propagate.
fn answer_rejected_transition(session_id: &str, result: Result<Step>) -> Result<Step> {
    match result {
        Err(e) if e.is_logic_error() => {
            tracing::warn!("Rejected transition for session {}: {}", short_id(session_id), e);
            Ok(Step::new(INVALID_STATE_RESPONSE, ActionKind::InvalidState, None))
        }
        other => other,
    }
}

pub struct SessionOrchestrator {
    store: Arc<dyn ContextStore>,
    manager: FlowLockManager,
    context_ttl: Duration,
    intent_history_limit: usize,
    flow_history_limit: usize,
    tenants: HashMap<String, TenantProfile>,
    default_tenant: TenantProfile,
}

impl SessionOrchestrator {
    pub fn new(store: Arc<dyn ContextStore>, manager: FlowLockManager) -> Self {
        let defaults = ContextConfig::default();
        Self {
            store,
            manager,
            context_ttl: Duration::minutes(defaults.ttl_minutes),
            intent_history_limit: defaults.intent_history_limit,
            flow_history_limit: defaults.flow_history_limit,
            tenants: HashMap::new(),
            default_tenant: TenantProfile::default(),
        }
    }

    pub fn with_context_ttl(mut self, ttl: Duration) -> Self {
        self.context_ttl = ttl;
        self
    }

    pub fn with_history_limits(mut self, intents: usize, flows: usize) -> Self {
        self.intent_history_limit = intents;
        self.flow_history_limit = flows;
        self
    }

    pub fn with_context_config(self, config: &ContextConfig) -> Self {
        self.with_context_ttl(Duration::minutes(config.ttl_minutes))
            .with_history_limits(config.intent_history_limit, config.flow_history_limit)
    }

    pub fn with_tenant_profile(mut self, tenant_id: impl Into<String>, profile: TenantProfile) -> Self {
        self.tenants.insert(tenant_id.into(), profile);
        self
    }

    pub fn manager(&self) -> &FlowLockManager {
        &self.manager
    }

    pub async fn handle(&self, message: InboundMessage) -> Result<OrchestrationResult> {
        let started = Instant::now();
        let now = self.manager.now();
        let mut context = self.load_or_create(&message, now).await?;

        let timeout_warning = match self.manager.check_timeout_status(context.flow_lock.as_ref()) {
            TimeoutStatus::Expired { message: text } => {
                if let Some(lock) = context.flow_lock.clone() {
                    context.record_flow_end(
                        &lock,
                        FlowOutcome::Timeout,
                        Some("inactivity"),
                        now,
                        self.flow_history_limit,
                    );
                    context.flow_lock = self.manager.abandon_flow(Some(&lock), "timeout");
                    tracing::info!(
                        "Flow '{}' timed out for session {}",
                        lock.active_flow.map(|f| f.as_str()).unwrap_or("none"),
                        short_id(&message.session_id)
                    );
                }
                let step = Step::new(text, ActionKind::TimeoutExpired, Some("flow_timeout".into()));
                return self.finish(context, step, None, &message, now, started).await;
            }
            TimeoutStatus::Warning { message: text, .. } => Some(text),
            TimeoutStatus::Active => None,
        };

        let classified = message.intent.as_ref();
        context.record_intent(
            IntentRecord {
                intent: classified.map(|c| c.key.clone()),
                confidence: classified.map(|c| c.confidence).unwrap_or(0.0),
                timestamp: now,
                decision_method: classified.map(|c| c.method).unwrap_or(DecisionMethod::None),
            },
            self.intent_history_limit,
        );

        let step = answer_rejected_transition(
            &message.session_id,
            self.apply_intent(&mut context, &message, now),
        )?;

        self.finish(context, step, timeout_warning, &message, now, started)
            .await
    }

    async fn load_or_create(
        &self,
        message: &InboundMessage,
        now: DateTime<Utc>,
    ) -> Result<ConversationContext> {
        let fresh = || {
            ConversationContext::new(
                message.session_id.as_str(),
                message.tenant_id.as_str(),
                message.user_id.as_str(),
                now,
                self.context_ttl,
            )
        };

        match self.store.get(&message.session_id).await? {
            Some(stored) if stored.is_expired(now) => {
                tracing::info!(
                    "Context for session {} expired at {}, starting over",
                    short_id(&message.session_id),
                    stored.expires_at
                );
                // Replacing the stale record still goes through its version
                let mut context = fresh();
                context.version = stored.version;
                Ok(context)
            }
            Some(stored) => Ok(stored),
            None => {
                tracing::debug!("New context for session {}", short_id(&message.session_id));
                Ok(fresh())
            }
        }
    }

    fn apply_intent(
        &self,
        context: &mut ConversationContext,
        message: &InboundMessage,
        now: DateTime<Utc>,
    ) -> Result<Step> {
        let Some(intent) = message.intent.as_ref().map(ClassifiedIntent::intent) else {
            return Ok(Step::fallback());
        };
        let current = context.active_flow();

        match &intent {
            Intent::FlowCancel => {
                let prior = context.flow_lock.clone();
                if let Some(dropped) = self.manager.abandon_flow(prior.as_ref(), "user_requested") {
                    if let Some(prior) = &prior {
                        context.record_flow_end(
                            prior,
                            FlowOutcome::Abandoned,
                            Some("user_requested"),
                            now,
                            self.flow_history_limit,
                        );
                    }
                    context.flow_lock = Some(dropped);
                }
                Ok(Step::new(
                    CANCELLED_RESPONSE,
                    ActionKind::FlowCancelled,
                    Some("flow_cancelled".into()),
                ))
            }
            Intent::BookingConfirm | Intent::CancelConfirm | Intent::RescheduleConfirm
                if current.is_some() && current == intent.flow() =>
            {
                Ok(self.complete(context, &intent, now))
            }
            Intent::SlotSelection if current == Some(FlowType::Booking) => {
                let slot = message.text.trim();
                let update = StepData::with_slots(FlowSlots::Booking(BookingSlots {
                    selected_slot: Some(slot.to_string()),
                    ..BookingSlots::default()
                }));
                let next = self.manager.advance_step(
                    context.flow_lock.as_ref(),
                    steps::CONFIRM,
                    Some(update),
                )?;
                context.flow_lock = Some(next);
                Ok(Step::new(
                    format!(
                        "Confirma agendamento no horário {}? Digite \"confirmo\" para finalizar.",
                        slot
                    ),
                    ActionKind::SlotSelected,
                    Some("booking_slot_selected".into()),
                ))
            }
            Intent::Institutional(topic) => Ok(Step::new(
                self.tenant(&message.tenant_id).institutional_response(topic),
                ActionKind::InstitutionalInfo,
                Some("institutional_info_provided".into()),
            )),
            Intent::Greeting => Ok(Step::new(GREETING_RESPONSE, ActionKind::Greeting, None)),
            other => match other.starts_flow() {
                Some((flow, first_step)) => {
                    Ok(self.start(context, flow, first_step, &message.tenant_id, now))
                }
                None => Ok(Step::fallback()),
            },
        }
    }

    fn complete(&self, context: &mut ConversationContext, intent: &Intent, now: DateTime<Utc>) -> Step {
        let (label, response) = match intent {
            Intent::CancelConfirm => (
                "appointment_cancelled",
                "✅ Agendamento cancelado. Posso ajudar com mais alguma coisa?",
            ),
            Intent::RescheduleConfirm => (
                "appointment_rescheduled",
                "✅ Agendamento reagendado! Você receberá a confirmação por email.",
            ),
            _ => (
                "appointment_booked",
                "✅ Agendamento confirmado! Você receberá um lembrete por email.",
            ),
        };

        let prior = context.flow_lock.clone();
        if let (Some(prior), Some(done)) = (
            prior.as_ref(),
            self.manager.complete_flow(prior.as_ref(), label),
        ) {
            context.record_flow_end(
                prior,
                FlowOutcome::Completed,
                None,
                now,
                self.flow_history_limit,
            );
            context.flow_lock = Some(done);
        }

        Step {
            response: response.to_string(),
            action: ActionKind::FlowCompleted,
            outcome: Some(label.to_string()),
            conversation_outcome: intent.finalizing_outcome(),
        }
    }

    fn start(
        &self,
        context: &mut ConversationContext,
        flow: FlowType,
        first_step: &str,
        tenant_id: &str,
        now: DateTime<Utc>,
    ) -> Step {
        let decision = self.manager.can_start_new_flow(context.flow_lock.as_ref(), flow);
        if !decision.allow_intent {
            return Step::new(
                decision.suggested_response,
                ActionKind::FlowBlocked,
                Some(format!("{}_blocked_by_flow", flow)),
            );
        }

        if let Some(prior) = context.flow_lock.clone() {
            let ended = match decision.reason {
                DecisionReason::Interrupts => {
                    Some((FlowOutcome::Interrupted, format!("interrupted_by_{}", flow)))
                }
                DecisionReason::Expired => Some((FlowOutcome::Timeout, "expired".to_string())),
                DecisionReason::NoActiveFlow | DecisionReason::Blocked => None,
            };
            if let Some((outcome, reason)) = ended {
                context.record_flow_end(&prior, outcome, Some(&reason), now, self.flow_history_limit);
            }
        }

        let lock = self.manager.start_flow_lock(flow, first_step);
        context.flow_lock = Some(self.manager.apply_next_flow_hint(&lock));
        context.record_flow_start(flow);

        let opening = match flow {
            FlowType::Booking => "Perfeito! Para qual serviço você gostaria de agendar?".to_string(),
            FlowType::Reschedule => "Vamos reagendar! Qual o ID do seu agendamento atual?".to_string(),
            FlowType::Cancel => "Para cancelar, preciso do ID do agendamento. Qual é?".to_string(),
            FlowType::Pricing => format!(
                "{} Gostaria de agendar algum serviço?",
                self.tenant(tenant_id).pricing_response()
            ),
            FlowType::Onboarding => "Olá! Para melhor atendê-lo, qual seu email?".to_string(),
            _ => FALLBACK_RESPONSE.to_string(),
        };
        let response = if decision.suggested_response.is_empty() {
            opening
        } else {
            format!("{} {}", decision.suggested_response, opening)
        };

        Step::new(response, ActionKind::FlowStarted, Some(format!("{}_started", flow)))
    }

    fn tenant(&self, tenant_id: &str) -> &TenantProfile {
        self.tenants.get(tenant_id).unwrap_or(&self.default_tenant)
    }

    async fn finish(
        &self,
        mut context: ConversationContext,
        step: Step,
        timeout_warning: Option<String>,
        message: &InboundMessage,
        now: DateTime<Utc>,
        started: Instant,
    ) -> Result<OrchestrationResult> {
        context.touch(now, self.context_ttl);
        let context = self.store.put(&context).await?;

        let active_lock = context.flow_lock.as_ref().filter(|lock| lock.is_active());
        let next_flow_hint = active_lock.and_then(|lock| lock.next_flow_hint);
        let telemetry = Telemetry {
            intent: message.intent.as_ref().map(|c| c.key.clone()),
            confidence: message.intent.as_ref().map(|c| c.confidence).unwrap_or(0.0),
            decision_method: message
                .intent
                .as_ref()
                .map(|c| c.method)
                .unwrap_or(DecisionMethod::None),
            flow_lock_active: active_lock.is_some(),
            processing_time_ms: started.elapsed().as_millis() as u64,
        };

        tracing::info!(
            "Session {} handled: action={:?}, flow={}, v{}",
            short_id(&context.session_id),
            step.action,
            active_lock
                .and_then(|lock| lock.active_flow)
                .map(|f| f.as_str())
                .unwrap_or("none"),
            context.version
        );

        Ok(OrchestrationResult {
            response: step.response,
            action: step.action,
            outcome: step.outcome,
            conversation_outcome: step.conversation_outcome.map(str::to_string),
            next_flow_hint,
            context,
            telemetry,
            timeout_warning,
        })
    }
}
