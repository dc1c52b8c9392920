use serde::{Deserialize, Serialize};

pub const POLICY_CHOICE: &str = "policy.choice";
pub const POLICY_FALLBACK: &str = "policy.fallback";
pub const COMPLETE_START: &str = "llm.complete.start";
pub const COMPLETE_SUCCESS: &str = "llm.complete.success";
pub const COMPLETE_ERROR: &str = "llm.complete.error";

/// One lifecycle milestone of a routed call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouterEvent {
    pub event: String,
    pub request_id: String,
    #[serde(default)]
    pub data: serde_json::Map<String, serde_json::Value>,
}

impl RouterEvent {
    pub fn new(event: impl Into<String>, request_id: impl Into<String>) -> Self {
        Self {
            event: event.into(),
            request_id: request_id.into(),
            data: serde_json::Map::new(),
        }
    }

    pub fn with(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.data.insert(key.to_string(), value.into());
        self
    }
}

/// Observer for router events.
///
/// Errors (and panics) from `emit` are discarded by the router; a sink can
/// never change the outcome of a call.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: &RouterEvent) -> anyhow::Result<()>;
}

/// Token accounting hook, called once per successful call with
/// (usage, role, provider name).
pub type TokenUsageHook =
    std::sync::Arc<dyn Fn(&crate::response::Usage, &str, &str) -> anyhow::Result<()> + Send + Sync>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_fills_payload() {
        let event = RouterEvent::new(POLICY_FALLBACK, "req-1")
            .with("provider", "mock2")
            .with("attempt", 1);
        assert_eq!(event.data["provider"], "mock2");
        assert_eq!(event.data["attempt"], 1);

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "policy.fallback");
        assert_eq!(json["request_id"], "req-1");
    }
}
