use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::RoleConfig;

/// One chat message in OpenAI format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: String,
    pub content: String,
}

impl Message {
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new("user", content)
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new("system", content)
    }
}

/// Optional request fields layered over role defaults. Used both for a
/// routing policy's request-level overrides and for per-call overrides.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestOverrides {
    pub model: Option<String>,
    pub temperature: Option<f64>,
    pub json_mode: Option<bool>,
    pub max_tokens: Option<u32>,
    pub timeout: Option<Duration>,
    pub schema: Option<serde_json::Value>,
    pub work_package_id: Option<String>,
}

impl RequestOverrides {
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn temperature(mut self, temperature: f64) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn json_mode(mut self, json_mode: bool) -> Self {
        self.json_mode = Some(json_mode);
        self
    }

    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn schema(mut self, schema: serde_json::Value) -> Self {
        self.schema = Some(schema);
        self
    }

    pub fn work_package_id(mut self, id: impl Into<String>) -> Self {
        self.work_package_id = Some(id.into());
        self
    }

    /// Layer `other` on top of `self`; fields set in `other` win.
    pub fn merged_with(mut self, other: &RequestOverrides) -> Self {
        if other.model.is_some() {
            self.model.clone_from(&other.model);
        }
        if other.temperature.is_some() {
            self.temperature = other.temperature;
        }
        if other.json_mode.is_some() {
            self.json_mode = other.json_mode;
        }
        if other.max_tokens.is_some() {
            self.max_tokens = other.max_tokens;
        }
        if other.timeout.is_some() {
            self.timeout = other.timeout;
        }
        if other.schema.is_some() {
            self.schema.clone_from(&other.schema);
        }
        if other.work_package_id.is_some() {
            self.work_package_id.clone_from(&other.work_package_id);
        }
        self
    }
}

/// A single logical completion call. Built once and replayed unchanged
/// against every provider in the fallback chain.
#[derive(Debug, Clone, PartialEq)]
pub struct LlmRequest {
    pub role: String,
    pub messages: Vec<Message>,
    pub model: String,
    pub temperature: f64,
    pub json_mode: bool,
    pub max_tokens: Option<u32>,
    pub timeout: Duration,
    pub schema: Option<serde_json::Value>,
    pub request_id: String,
    pub workspace: Option<String>,
    pub work_package_id: Option<String>,
}

impl LlmRequest {
    /// Request with role defaults and a fresh id; mostly useful for
    /// exercising providers directly.
    pub fn new(role: impl Into<String>, messages: Vec<Message>) -> Self {
        let role = role.into();
        Self::from_role(&RoleConfig::new(role, ""), messages)
    }

    pub fn from_role(role: &RoleConfig, messages: Vec<Message>) -> Self {
        Self {
            role: role.name.clone(),
            messages,
            model: role.model.clone(),
            temperature: role.temperature,
            json_mode: role.json_mode,
            max_tokens: role.max_tokens,
            timeout: role.timeout,
            schema: None,
            request_id: new_request_id(),
            workspace: None,
            work_package_id: None,
        }
    }

    /// Content of the last user message, or an empty string.
    pub fn last_user_prompt(&self) -> &str {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == "user")
            .map(|m| m.content.as_str())
            .unwrap_or("")
    }
}

pub fn new_request_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn later_overrides_win() {
        let policy = RequestOverrides::default().model("policy-model").temperature(0.9);
        let call = RequestOverrides::default().model("call-model");
        let merged = policy.merged_with(&call);
        assert_eq!(merged.model.as_deref(), Some("call-model"));
        assert_eq!(merged.temperature, Some(0.9));
    }

    #[test]
    fn last_user_prompt_skips_assistant_turns() {
        let req = LlmRequest::new(
            "r",
            vec![
                Message::system("be terse"),
                Message::user("first"),
                Message::new("assistant", "ok"),
                Message::user("second"),
                Message::new("assistant", "done"),
            ],
        );
        assert_eq!(req.last_user_prompt(), "second");
    }

    #[test]
    fn request_ids_are_unique() {
        assert_ne!(new_request_id(), new_request_id());
    }
}
