//! Flow Lock Manager
//!
//! Arbitration and lifecycle transitions over a session's [`FlowLock`].
//! Every operation is a pure computation over the lock it is given; reading
//! and persisting the lock is the caller's job.

use super::clock::{Clock, SystemClock};
use super::decision::{DecisionReason, FlowAction, FlowDecision, TimeoutStatus};
use super::lock::{FlowLock, FlowSlots, StepData, steps};
use super::tables::{STEP_TIMEOUTS, block_message, flow_timeout_ms, next_flow_after, priority_score};
use super::types::{FlowPriority, FlowType};
use crate::error::{FlowError, Result};
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;

/// Error text for advancing a step while no flow owns the session
pub const NO_ACTIVE_FLOW: &str = "Não há fluxo ativo para avançar step";

const EXPIRED_SESSION_RESPONSE: &str = "Sua sessão anterior expirou. Vamos começar de novo!";
const EXPIRED_TIMEOUT_MESSAGE: &str =
    "⏰ Sua sessão expirou por inatividade. Vamos recomeçar? Como posso ajudar?";

#[derive(Clone)]
pub struct FlowLockManager {
    clock: Arc<dyn Clock>,
}

impl Default for FlowLockManager {
    fn default() -> Self {
        Self::new(Arc::new(SystemClock))
    }
}

impl std::fmt::Debug for FlowLockManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FlowLockManager").finish_non_exhaustive()
    }
}

impl FlowLockManager {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Create a fresh lock for `flow`, positioned at `step`
    pub fn start_flow_lock(&self, flow: FlowType, step: &str) -> FlowLock {
        let now = self.now();
        let lock = FlowLock {
            active_flow: Some(flow),
            step: step.to_string(),
            created_at: now,
            expires_at: now + Duration::milliseconds(flow_timeout_ms(flow)),
            priority: FlowPriority::from_score(priority_score(flow)),
            step_data: StepData::with_slots(FlowSlots::for_flow(flow)),
            next_flow_hint: None,
        };
        tracing::debug!(
            "Flow lock started: flow={}, step={}, expires_at={}",
            flow,
            step,
            lock.expires_at
        );
        lock
    }

    /// Decide whether an intent wanting `candidate` may take the session
    pub fn can_start_new_flow(&self, current: Option<&FlowLock>, candidate: FlowType) -> FlowDecision {
        let now = self.now();
        let candidate_expiry = now + Duration::milliseconds(flow_timeout_ms(candidate));

        let (lock, current_flow) = match current {
            Some(lock) => match lock.active_flow {
                Some(flow) => (lock, flow),
                None => return Self::allow_fresh(candidate_expiry),
            },
            None => return Self::allow_fresh(candidate_expiry),
        };

        if lock.is_expired(now) {
            tracing::debug!(
                "Flow '{}' expired at {}, allowing '{}'",
                current_flow,
                lock.expires_at,
                candidate
            );
            return FlowDecision {
                allow_intent: true,
                current_flow: Some(current_flow),
                current_step: Some(lock.step.clone()),
                suggested_response: EXPIRED_SESSION_RESPONSE.to_string(),
                action: FlowAction::Continue,
                expires_at: candidate_expiry,
                reason: DecisionReason::Expired,
            };
        }

        let candidate_score = priority_score(candidate);
        let current_score = priority_score(current_flow);

        if candidate_score > current_score {
            tracing::debug!(
                "Flow '{}' ({}) interrupts '{}' ({})",
                candidate,
                candidate_score,
                current_flow,
                current_score
            );
            return FlowDecision {
                allow_intent: true,
                current_flow: Some(current_flow),
                current_step: Some(lock.step.clone()),
                suggested_response: format!(
                    "Entendi! Vou interromper {} para cuidar de {}.",
                    current_flow, candidate
                ),
                action: FlowAction::Continue,
                expires_at: candidate_expiry,
                reason: DecisionReason::Interrupts,
            };
        }

        tracing::debug!(
            "Flow '{}' ({}) blocked by '{}' ({}) at step '{}'",
            candidate,
            candidate_score,
            current_flow,
            current_score,
            lock.step
        );
        FlowDecision {
            allow_intent: false,
            current_flow: Some(current_flow),
            current_step: Some(lock.step.clone()),
            suggested_response: block_message(current_flow),
            action: FlowAction::Continue,
            expires_at: lock.expires_at,
            reason: DecisionReason::Blocked,
        }
    }

    fn allow_fresh(expires_at: DateTime<Utc>) -> FlowDecision {
        FlowDecision {
            allow_intent: true,
            current_flow: None,
            current_step: None,
            suggested_response: String::new(),
            action: FlowAction::Continue,
            expires_at,
            reason: DecisionReason::NoActiveFlow,
        }
    }

    /// Move the active flow to `next_step`.
    ///
    /// The new expiry is `now + max(remaining, step response window)`, so a
    /// step never loses time and always gets at least one response window.
    pub fn advance_step(
        &self,
        current: Option<&FlowLock>,
        next_step: &str,
        update: Option<StepData>,
    ) -> Result<FlowLock> {
        let lock = current
            .filter(|lock| lock.is_active())
            .ok_or_else(|| FlowError::InvalidState(NO_ACTIVE_FLOW.to_string()))?;

        let now = self.now();
        let remaining = lock.remaining_ms(now);
        let window = remaining.max(STEP_TIMEOUTS.response_ms);

        let mut next = lock.clone();
        next.step = next_step.to_string();
        next.expires_at = now + Duration::milliseconds(window);
        if let Some(update) = update {
            next.step_data.merge(update);
        }

        tracing::debug!(
            "Flow step advanced: {} -> {} (window {}ms)",
            lock.step,
            next_step,
            window
        );
        Ok(next)
    }

    /// Finish the active flow successfully. `None` when no flow is active.
    pub fn complete_flow(&self, current: Option<&FlowLock>, outcome: &str) -> Option<FlowLock> {
        let lock = current.filter(|lock| lock.is_active())?;
        let mut done = lock.clone();
        done.active_flow = None;
        done.step = steps::COMPLETE.to_string();
        done.step_data.outcome = Some(outcome.to_string());
        tracing::debug!(
            "Flow completed: {:?} outcome={}",
            lock.active_flow,
            outcome
        );
        Some(done)
    }

    /// Drop the active flow. `None` when no flow is active.
    pub fn abandon_flow(&self, current: Option<&FlowLock>, reason: &str) -> Option<FlowLock> {
        let lock = current.filter(|lock| lock.is_active())?;
        let mut dropped = lock.clone();
        dropped.active_flow = None;
        dropped.step = steps::ABANDONED.to_string();
        dropped.step_data.abandon_reason = Some(reason.to_string());
        tracing::debug!("Flow abandoned: {:?} reason={}", lock.active_flow, reason);
        Some(dropped)
    }

    /// Poll the lock against the clock. Inert or missing locks are active.
    pub fn check_timeout_status(&self, current: Option<&FlowLock>) -> TimeoutStatus {
        let Some(lock) = current.filter(|lock| lock.is_active()) else {
            return TimeoutStatus::Active;
        };

        let now = self.now();
        if lock.is_expired(now) {
            return TimeoutStatus::Expired {
                message: EXPIRED_TIMEOUT_MESSAGE.to_string(),
            };
        }

        let remaining = lock.expires_at - now;
        if remaining <= Duration::milliseconds(STEP_TIMEOUTS.warning_ms) {
            // Round up so a live lock never reports 0 ms left
            let mut remaining_ms = remaining.num_milliseconds();
            if remaining > Duration::milliseconds(remaining_ms) {
                remaining_ms += 1;
            }
            let seconds = (remaining_ms + 999) / 1000;
            return TimeoutStatus::Warning {
                remaining_ms,
                message: format!(
                    "⏰ Sua sessão expira em {} segundos. Responda para continuar.",
                    seconds
                ),
            };
        }
        TimeoutStatus::Active
    }

    /// Attach the follow-up flow suggested by the lock's active flow, if any
    pub fn apply_next_flow_hint(&self, lock: &FlowLock) -> FlowLock {
        let mut hinted = lock.clone();
        if let Some(next) = lock.active_flow.and_then(next_flow_after) {
            hinted.next_flow_hint = Some(next);
        }
        hinted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flow::clock::ManualClock;
    use crate::flow::lock::BookingSlots;
    use proptest::prelude::*;

    fn fixed_manager() -> (FlowLockManager, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        (FlowLockManager::new(clock.clone()), clock)
    }

    fn lock_expiring_in(manager: &FlowLockManager, flow: FlowType, ms: i64) -> FlowLock {
        let mut lock = manager.start_flow_lock(flow, steps::START);
        lock.expires_at = manager.now() + Duration::milliseconds(ms);
        lock
    }

    #[test]
    fn test_start_flow_lock_uses_table_timeout() {
        let (manager, _) = fixed_manager();
        let lock = manager.start_flow_lock(FlowType::Booking, steps::COLLECT_SERVICE);
        assert_eq!(lock.active_flow, Some(FlowType::Booking));
        assert_eq!(lock.step, "collect_service");
        assert_eq!((lock.expires_at - lock.created_at).num_milliseconds(), 300_000);
        assert_eq!(lock.priority, FlowPriority::Medium);
        assert_eq!(lock.step_data.slots, FlowSlots::Booking(BookingSlots::default()));
    }

    #[test]
    fn test_start_flow_lock_unknown_name_uses_general_timeout() {
        let (manager, _) = fixed_manager();
        let lock = manager.start_flow_lock(FlowType::from_name("waitlist"), steps::START);
        assert_eq!((lock.expires_at - lock.created_at).num_milliseconds(), 60_000);
        assert_eq!(lock.priority, FlowPriority::Low);
    }

    #[test]
    fn test_no_lock_allows_booking() {
        let (manager, _) = fixed_manager();
        let decision = manager.can_start_new_flow(None, FlowType::Booking);
        assert!(decision.allow_intent);
        assert_eq!(decision.reason, DecisionReason::NoActiveFlow);
        assert_eq!(decision.current_flow, None);
        assert_eq!(decision.action, FlowAction::Continue);
        assert_eq!(
            (decision.expires_at - manager.now()).num_milliseconds(),
            300_000
        );
    }

    #[test]
    fn test_inert_lock_allows() {
        let (manager, _) = fixed_manager();
        let lock = manager.start_flow_lock(FlowType::Cancel, steps::START);
        let done = manager.complete_flow(Some(&lock), "appointment_cancelled").unwrap();
        let decision = manager.can_start_new_flow(Some(&done), FlowType::Greeting);
        assert!(decision.allow_intent);
        assert_eq!(decision.reason, DecisionReason::NoActiveFlow);
    }

    #[test]
    fn test_lower_priority_is_blocked_by_booking() {
        let (manager, _) = fixed_manager();
        let mut lock = lock_expiring_in(&manager, FlowType::Booking, 200_000);
        lock.step = "collect_service".to_string();

        let decision = manager.can_start_new_flow(Some(&lock), FlowType::Pricing);
        assert!(!decision.allow_intent);
        assert_eq!(decision.reason, DecisionReason::Blocked);
        assert_eq!(decision.current_flow, Some(FlowType::Booking));
        assert_eq!(decision.current_step.as_deref(), Some("collect_service"));
        assert_eq!(decision.expires_at, lock.expires_at);
        assert_eq!(decision.suggested_response, block_message(FlowType::Booking));
    }

    #[test]
    fn test_cancel_interrupts_pricing() {
        let (manager, _) = fixed_manager();
        let lock = lock_expiring_in(&manager, FlowType::Pricing, 50_000);
        let decision = manager.can_start_new_flow(Some(&lock), FlowType::Cancel);
        assert!(decision.allow_intent);
        assert!(decision.interrupts_current());
        assert_eq!(decision.current_flow, Some(FlowType::Pricing));
        assert!(decision.suggested_response.contains("interromper pricing"));
        assert_eq!(
            (decision.expires_at - manager.now()).num_milliseconds(),
            60_000
        );
    }

    #[test]
    fn test_expired_lock_allows_greeting() {
        let (manager, _) = fixed_manager();
        let lock = lock_expiring_in(&manager, FlowType::Booking, -1000);
        let decision = manager.can_start_new_flow(Some(&lock), FlowType::Greeting);
        assert!(decision.allow_intent);
        assert_eq!(decision.reason, DecisionReason::Expired);
        assert!(decision.suggested_response.contains("expirou"));
    }

    #[test]
    fn test_lock_expiring_exactly_now_is_expired() {
        let (manager, _) = fixed_manager();
        let lock = lock_expiring_in(&manager, FlowType::Cancel, 0);
        let decision = manager.can_start_new_flow(Some(&lock), FlowType::General);
        assert!(decision.allow_intent);
        assert_eq!(decision.reason, DecisionReason::Expired);
    }

    #[test]
    fn test_equal_priority_is_blocked() {
        let (manager, _) = fixed_manager();
        let lock = lock_expiring_in(&manager, FlowType::Booking, 100_000);
        let decision = manager.can_start_new_flow(Some(&lock), FlowType::Booking);
        assert!(!decision.allow_intent);
    }

    #[test]
    fn test_advance_step_without_flow_fails() {
        let (manager, _) = fixed_manager();
        let err = manager.advance_step(None, "confirm", None).unwrap_err();
        assert!(matches!(err, FlowError::InvalidState(_)));
        assert_eq!(err.to_string(), "Não há fluxo ativo para avançar step");

        let lock = manager.start_flow_lock(FlowType::Booking, steps::START);
        let abandoned = manager.abandon_flow(Some(&lock), "user_requested").unwrap();
        let err = manager.advance_step(Some(&abandoned), "confirm", None).unwrap_err();
        assert_eq!(err.to_string(), NO_ACTIVE_FLOW);
    }

    #[test]
    fn test_advance_step_extends_short_remaining_to_window() {
        let (manager, _) = fixed_manager();
        let lock = lock_expiring_in(&manager, FlowType::Cancel, 5_000);
        let next = manager.advance_step(Some(&lock), "confirm", None).unwrap();
        assert_eq!(next.step, "confirm");
        assert_eq!((next.expires_at - manager.now()).num_milliseconds(), 60_000);
    }

    #[test]
    fn test_advance_step_keeps_long_remaining() {
        let (manager, _) = fixed_manager();
        let lock = lock_expiring_in(&manager, FlowType::Booking, 250_000);
        let next = manager.advance_step(Some(&lock), "confirm", None).unwrap();
        assert_eq!(next.expires_at, lock.expires_at);
    }

    #[test]
    fn test_advance_step_merges_step_data() {
        let (manager, clock) = fixed_manager();
        let lock = manager.start_flow_lock(FlowType::Booking, steps::COLLECT_SERVICE);
        clock.advance(Duration::seconds(5));
        let update = StepData::with_slots(FlowSlots::Booking(BookingSlots {
            selected_slot: Some("amanhã 14h".into()),
            ..BookingSlots::default()
        }));
        let next = manager.advance_step(Some(&lock), steps::CONFIRM, Some(update)).unwrap();
        match next.step_data.slots {
            FlowSlots::Booking(ref slots) => {
                assert_eq!(slots.selected_slot.as_deref(), Some("amanhã 14h"));
            }
            ref other => panic!("unexpected slots: {:?}", other),
        }
        assert_eq!(next.created_at, lock.created_at);
    }

    #[test]
    fn test_complete_flow() {
        let (manager, _) = fixed_manager();
        let lock = manager.start_flow_lock(FlowType::Booking, steps::CONFIRM);
        let done = manager.complete_flow(Some(&lock), "appointment_booked").unwrap();
        assert_eq!(done.active_flow, None);
        assert_eq!(done.step, "complete");
        assert_eq!(done.step_data.outcome.as_deref(), Some("appointment_booked"));
        assert_eq!(done.expires_at, lock.expires_at);

        assert!(manager.complete_flow(Some(&done), "again").is_none());
        assert!(manager.complete_flow(None, "nothing").is_none());
    }

    #[test]
    fn test_abandon_flow() {
        let (manager, _) = fixed_manager();
        let lock = manager.start_flow_lock(FlowType::Reschedule, steps::COLLECT_ID);
        let dropped = manager.abandon_flow(Some(&lock), "user_requested").unwrap();
        assert_eq!(dropped.active_flow, None);
        assert_eq!(dropped.step, "abandoned");
        assert_eq!(dropped.step_data.abandon_reason.as_deref(), Some("user_requested"));

        assert!(manager.abandon_flow(Some(&dropped), "again").is_none());
        assert!(manager.abandon_flow(None, "nothing").is_none());
    }

    #[test]
    fn test_timeout_warning_counts_seconds() {
        let (manager, _) = fixed_manager();
        let lock = lock_expiring_in(&manager, FlowType::Booking, 10_000);
        let status = manager.check_timeout_status(Some(&lock));
        match status {
            TimeoutStatus::Warning { remaining_ms, ref message } => {
                assert_eq!(remaining_ms, 10_000);
                assert!(message.contains("10 segundos"), "got: {}", message);
            }
            other => panic!("expected warning, got {:?}", other),
        }
    }

    #[test]
    fn test_timeout_status_boundaries() {
        let (manager, _) = fixed_manager();
        let at = |ms| manager.check_timeout_status(Some(&lock_expiring_in(&manager, FlowType::Booking, ms)));

        assert_eq!(at(30_001), TimeoutStatus::Active);
        assert!(at(30_000).is_warning());
        assert!(at(1).is_warning());
        assert!(at(0).is_expired());
        assert!(at(-5_000).is_expired());
        assert_eq!(manager.check_timeout_status(None), TimeoutStatus::Active);
    }

    #[test]
    fn test_sub_millisecond_remaining_is_live_everywhere() {
        let (manager, _) = fixed_manager();
        let mut lock = manager.start_flow_lock(FlowType::Booking, steps::START);
        lock.expires_at = manager.now() + Duration::microseconds(500);

        let status = manager.check_timeout_status(Some(&lock));
        match status {
            TimeoutStatus::Warning { remaining_ms, ref message } => {
                assert_eq!(remaining_ms, 1);
                assert!(message.contains("1 segundos"), "got: {}", message);
            }
            other => panic!("expected warning, got {:?}", other),
        }

        let decision = manager.can_start_new_flow(Some(&lock), FlowType::Pricing);
        assert_eq!(decision.reason, DecisionReason::Blocked);
    }

    #[test]
    fn test_warning_threshold_is_exact() {
        let (manager, _) = fixed_manager();
        let mut lock = manager.start_flow_lock(FlowType::Booking, steps::START);
        lock.expires_at = manager.now() + Duration::microseconds(30_000_500);
        assert_eq!(manager.check_timeout_status(Some(&lock)), TimeoutStatus::Active);

        lock.expires_at = manager.now() + Duration::milliseconds(30_000);
        assert!(manager.check_timeout_status(Some(&lock)).is_warning());
    }

    #[test]
    fn test_timeout_of_inert_lock_is_active() {
        let (manager, clock) = fixed_manager();
        let lock = manager.start_flow_lock(FlowType::Cancel, steps::START);
        let done = manager.complete_flow(Some(&lock), "ok").unwrap();
        clock.advance(Duration::minutes(10));
        assert_eq!(manager.check_timeout_status(Some(&done)), TimeoutStatus::Active);
    }

    #[test]
    fn test_apply_next_flow_hint() {
        let (manager, _) = fixed_manager();
        let pricing = manager.start_flow_lock(FlowType::Pricing, steps::START);
        assert_eq!(
            manager.apply_next_flow_hint(&pricing).next_flow_hint,
            Some(FlowType::Booking)
        );

        let cancel = manager.start_flow_lock(FlowType::Cancel, steps::START);
        assert_eq!(manager.apply_next_flow_hint(&cancel), cancel);
    }

    fn any_flow() -> impl Strategy<Value = FlowType> {
        prop::sample::select(FlowType::ALL.to_vec())
    }

    proptest! {
        #[test]
        fn prop_start_lock_span_matches_table(flow in any_flow()) {
            let (manager, _) = fixed_manager();
            let lock = manager.start_flow_lock(flow, steps::START);
            prop_assert_eq!((lock.expires_at - lock.created_at).num_milliseconds(), flow_timeout_ms(flow));
        }

        #[test]
        fn prop_expired_lock_always_allows(current in any_flow(), candidate in any_flow(), ago in 0i64..10_000_000) {
            let (manager, _) = fixed_manager();
            let lock = lock_expiring_in(&manager, current, -ago);
            prop_assert!(manager.can_start_new_flow(Some(&lock), candidate).allow_intent);
        }

        #[test]
        fn prop_no_lock_always_allows(candidate in any_flow()) {
            let (manager, _) = fixed_manager();
            prop_assert!(manager.can_start_new_flow(None, candidate).allow_intent);
        }

        #[test]
        fn prop_lower_or_equal_priority_is_denied(current in any_flow(), candidate in any_flow(), left in 1i64..10_000_000) {
            prop_assume!(priority_score(candidate) <= priority_score(current));
            let (manager, _) = fixed_manager();
            let lock = lock_expiring_in(&manager, current, left);
            let decision = manager.can_start_new_flow(Some(&lock), candidate);
            prop_assert!(!decision.allow_intent);
            prop_assert_eq!(decision.current_flow, Some(current));
            prop_assert_eq!(decision.current_step, Some(lock.step.clone()));
            prop_assert_eq!(decision.expires_at, lock.expires_at);
        }

        #[test]
        fn prop_advance_step_floor(flow in any_flow(), remaining in -600_000i64..600_000) {
            let (manager, _) = fixed_manager();
            let lock = lock_expiring_in(&manager, flow, remaining);
            let next = manager.advance_step(Some(&lock), "next", None).unwrap();
            let floor = manager.now() + Duration::milliseconds(STEP_TIMEOUTS.response_ms);
            prop_assert!(next.expires_at >= floor);
            prop_assert!(next.expires_at >= lock.expires_at);
        }

        #[test]
        fn prop_timeout_status_partition(remaining in -100_000i64..100_000) {
            let (manager, _) = fixed_manager();
            let lock = lock_expiring_in(&manager, FlowType::Booking, remaining);
            let status = manager.check_timeout_status(Some(&lock));
            if remaining <= 0 {
                prop_assert!(status.is_expired());
            } else if remaining <= 30_000 {
                prop_assert!(status.is_warning());
            } else {
                prop_assert_eq!(status, TimeoutStatus::Active);
            }
        }
    }
}
