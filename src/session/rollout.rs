//! Rollout gate deciding whether a session is served by the flow-lock path

use crate::config::RolloutConfig;
use crate::utils::{short_id, string_hash};

#[derive(Debug, Clone)]
pub struct RolloutGate {
    config: RolloutConfig,
}

impl RolloutGate {
    pub fn new(config: RolloutConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RolloutConfig {
        &self.config
    }

    /// Rollout bucket of a session, in `0..100`
    pub fn bucket(key: &str) -> u32 {
        string_hash(key) % 100
    }

    pub fn should_use_flow_lock(
        &self,
        session_id: &str,
        tenant_id: Option<&str>,
        user_id: Option<&str>,
        demo_mode: bool,
    ) -> bool {
        if !self.config.enabled {
            tracing::debug!("Flow lock disabled globally");
            return false;
        }

        if self.config.gradual_rollout {
            let key = [Some(session_id), user_id]
                .into_iter()
                .flatten()
                .find(|k| !k.is_empty())
                .unwrap_or("default");
            let bucket = Self::bucket(key);
            if bucket >= u32::from(self.config.rollout_percentage) {
                tracing::debug!(
                    "Session {} outside rollout (bucket {} >= {})",
                    short_id(key),
                    bucket,
                    self.config.rollout_percentage
                );
                return false;
            }
        }

        let tenant_id = tenant_id.filter(|t| !t.is_empty());
        if let Some(tenant) = tenant_id
            && self.config.blacklist.iter().any(|b| b == tenant)
        {
            tracing::debug!("Flow lock disabled for blacklisted tenant {}", tenant);
            return false;
        }

        let has_user = user_id.is_some_and(|u| !u.is_empty());
        if tenant_id.is_none() || (!demo_mode && !has_user) {
            tracing::debug!(
                "Flow lock disabled for session {}: missing {}",
                short_id(session_id),
                if tenant_id.is_none() { "tenant" } else { "user" }
            );
            return false;
        }

        true
    }
}
