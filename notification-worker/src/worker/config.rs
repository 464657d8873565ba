use std::collections::HashMap;
use std::time::Duration;

use notification_types::NotificationType;

use crate::types::Environment;

/// Configuration for the dispatch worker
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// Recipient of admin-strategy notifications
    pub admin_email: String,
    /// Upper bound on a single queue fetch
    pub poll_timeout: Duration,
    /// Pause between polling rounds
    pub idle_sleep: Duration,
    /// Per-kind overrides of the built-in batch coalescing delays
    pub batch_delay_overrides: HashMap<NotificationType, chrono::Duration>,
}

impl DispatchConfig {
    /// Creates a `DispatchConfig` from the given environment
    #[must_use]
    pub fn from_environment(env: &Environment) -> Self {
        // Allow override from environment variable
        let admin_email = std::env::var("ADMIN_EMAIL")
            .unwrap_or_else(|_| env.default_admin_email().to_string());

        Self {
            admin_email,
            poll_timeout: Duration::from_secs(1),
            idle_sleep: Duration::from_millis(100),
            batch_delay_overrides: HashMap::new(),
        }
    }

    /// How long batches of the given kind may coalesce, `None` for kinds
    /// that are not batched
    #[must_use]
    pub fn batch_delay(&self, kind: NotificationType) -> Option<chrono::Duration> {
        self.batch_delay_overrides
            .get(&kind)
            .copied()
            .or_else(|| kind.batch_delay())
    }
}

impl Default for DispatchConfig {
    fn default() -> Self {
        let env = Environment::from_env();
        Self::from_environment(&env)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn overrides_take_precedence_over_builtin_delays() {
        let mut config = DispatchConfig::from_environment(&Environment::Development);
        assert_eq!(
            config.batch_delay(NotificationType::LowBalance),
            Some(chrono::Duration::minutes(60))
        );

        config
            .batch_delay_overrides
            .insert(NotificationType::LowBalance, chrono::Duration::minutes(5));
        assert_eq!(
            config.batch_delay(NotificationType::LowBalance),
            Some(chrono::Duration::minutes(5))
        );
        assert_eq!(config.batch_delay(NotificationType::AgentRun), None);
    }
}
