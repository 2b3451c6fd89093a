//! Static flow tables: session timeouts, step timeouts, priority scores,
//! block messages and next-flow hints.

use super::types::FlowType;

/// Total session timeout for a flow, in milliseconds.
/// Flows without an entry (greeting) use the general timeout.
pub const fn flow_timeout_ms(flow: FlowType) -> i64 {
    match flow {
        FlowType::Onboarding => 120_000,
        FlowType::Booking => 300_000,
        FlowType::Reschedule => 180_000,
        FlowType::Cancel => 60_000,
        FlowType::Pricing => 90_000,
        FlowType::Institutional => 30_000,
        FlowType::Handoff => 300_000,
        FlowType::General | FlowType::Greeting => GENERAL_TIMEOUT_MS,
    }
}

pub const GENERAL_TIMEOUT_MS: i64 = 60_000;

/// Per-step response windows, in milliseconds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepTimeouts {
    /// Minimum time granted after every step transition
    pub response_ms: i64,
    /// Remaining time at or below which the session is in the warning state
    pub warning_ms: i64,
    /// Grace window after the warning
    pub final_ms: i64,
}

pub const STEP_TIMEOUTS: StepTimeouts = StepTimeouts {
    response_ms: 60_000,
    warning_ms: 30_000,
    final_ms: 30_000,
};

/// Arbitration score. A candidate interrupts the current flow only with a
/// strictly greater score.
pub const fn priority_score(flow: FlowType) -> u8 {
    match flow {
        FlowType::Cancel => 10,
        FlowType::Reschedule => 9,
        FlowType::Handoff => 8,
        FlowType::Booking => 5,
        FlowType::Onboarding => 4,
        FlowType::Pricing => 3,
        FlowType::Institutional => 2,
        FlowType::Greeting => 1,
        FlowType::General => 0,
    }
}

/// Message sent when an intent is denied because `flow` still owns the session
pub fn block_message(flow: FlowType) -> String {
    match flow {
        FlowType::Booking => {
            "Vamos finalizar seu agendamento primeiro. Depois posso ajudar com o resto!".to_string()
        }
        FlowType::Reschedule => {
            "Estamos no meio do seu reagendamento. Vamos concluí-lo primeiro?".to_string()
        }
        FlowType::Cancel => {
            "Estamos processando seu cancelamento. Vamos concluí-lo primeiro.".to_string()
        }
        FlowType::Onboarding => {
            "Vamos terminar seu cadastro primeiro. Só faltam alguns dados!".to_string()
        }
        FlowType::Handoff => {
            "Você está sendo atendido por um de nossos atendentes. Aguarde só um instante.".to_string()
        }
        other => format!(
            "Vamos terminar {} primeiro. Como posso continuar ajudando?",
            other
        ),
    }
}

/// The flow a finished flow suggests next. One rule: pricing leads to booking.
pub const fn next_flow_after(flow: FlowType) -> Option<FlowType> {
    match flow {
        FlowType::Pricing => Some(FlowType::Booking),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(FlowType::Onboarding, 120_000)]
    #[case(FlowType::Booking, 300_000)]
    #[case(FlowType::Reschedule, 180_000)]
    #[case(FlowType::Cancel, 60_000)]
    #[case(FlowType::Pricing, 90_000)]
    #[case(FlowType::Institutional, 30_000)]
    #[case(FlowType::Handoff, 300_000)]
    #[case(FlowType::General, 60_000)]
    #[case(FlowType::Greeting, 60_000)]
    fn test_flow_timeouts(#[case] flow: FlowType, #[case] expected: i64) {
        assert_eq!(flow_timeout_ms(flow), expected);
    }

    #[rstest]
    #[case(FlowType::Cancel, 10)]
    #[case(FlowType::Reschedule, 9)]
    #[case(FlowType::Handoff, 8)]
    #[case(FlowType::Booking, 5)]
    #[case(FlowType::Onboarding, 4)]
    #[case(FlowType::Pricing, 3)]
    #[case(FlowType::Institutional, 2)]
    #[case(FlowType::Greeting, 1)]
    #[case(FlowType::General, 0)]
    fn test_priority_scores(#[case] flow: FlowType, #[case] expected: u8) {
        assert_eq!(priority_score(flow), expected);
    }

    #[test]
    fn test_step_timeouts() {
        assert_eq!(STEP_TIMEOUTS.response_ms, 60_000);
        assert_eq!(STEP_TIMEOUTS.warning_ms, 30_000);
        assert_eq!(STEP_TIMEOUTS.final_ms, 30_000);
    }

    #[test]
    fn test_block_message_generic_fallback() {
        assert!(block_message(FlowType::Booking).contains("agendamento"));
        assert_eq!(
            block_message(FlowType::Pricing),
            "Vamos terminar pricing primeiro. Como posso continuar ajudando?"
        );
    }

    #[test]
    fn test_next_flow_after() {
        assert_eq!(next_flow_after(FlowType::Pricing), Some(FlowType::Booking));
        for flow in FlowType::ALL {
            if flow != FlowType::Pricing {
                assert_eq!(next_flow_after(flow), None);
            }
        }
    }
}
