use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::kind::NotificationType;

/// Per-kind opt-in map for a user
///
/// Kinds without an explicit entry default to opted in.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationPreferences {
    /// Explicit per-kind choices
    #[serde(default)]
    pub preferences: HashMap<NotificationType, bool>,
}

impl NotificationPreferences {
    /// Whether the user wants to receive the given kind
    #[must_use]
    pub fn wants(&self, kind: NotificationType) -> bool {
        self.preferences.get(&kind).copied().unwrap_or(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absent_kinds_default_to_opted_in() {
        let prefs = NotificationPreferences::default();
        assert!(prefs.wants(NotificationType::AgentRun));

        let prefs = NotificationPreferences {
            preferences: HashMap::from([(NotificationType::AgentRun, false)]),
        };
        assert!(!prefs.wants(NotificationType::AgentRun));
        assert!(prefs.wants(NotificationType::LowBalance));
    }
}
