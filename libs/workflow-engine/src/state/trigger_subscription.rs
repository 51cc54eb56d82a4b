//! A live trigger registration (spec §3: `TriggerSubscription`, §4.F).

use loom_domain::{SubscriptionStatus, Value};
use serde::{Deserialize, Serialize};

/// Observable state of one workflow's trigger. The teardown handle
/// itself lives in the trigger manager's registry, not here, since it
/// isn't serializable and this type is what gets reported to callers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerSubscription {
    pub workflow_name: String,
    pub trigger_type: String,
    pub config: Value,
    pub status: SubscriptionStatus,
    pub error: Option<String>,
}

impl TriggerSubscription {
    #[must_use]
    pub fn connecting(workflow_name: impl Into<String>, trigger_type: impl Into<String>, config: Value) -> Self {
        Self {
            workflow_name: workflow_name.into(),
            trigger_type: trigger_type.into(),
            config,
            status: SubscriptionStatus::Connecting,
            error: None,
        }
    }

    pub fn mark_connected(&mut self) {
        self.status = SubscriptionStatus::Connected;
        self.error = None;
    }

    pub fn mark_disconnected(&mut self) {
        self.status = SubscriptionStatus::Disconnected;
    }

    pub fn mark_error(&mut self, error: impl Into<String>) {
        self.status = SubscriptionStatus::Error;
        self.error = Some(error.into());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_connecting_and_can_transition() {
        let mut sub = TriggerSubscription::connecting("wf", "cron.schedule", Value::map());
        assert_eq!(sub.status, SubscriptionStatus::Connecting);
        sub.mark_connected();
        assert_eq!(sub.status, SubscriptionStatus::Connected);
        sub.mark_error("socket closed");
        assert_eq!(sub.status, SubscriptionStatus::Error);
        assert_eq!(sub.error.as_deref(), Some("socket closed"));
    }
}
