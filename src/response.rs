use serde::{Deserialize, Serialize};

/// Token counts reported by a provider. Zero when the backend reports none.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    #[serde(default)]
    pub prompt_tokens: u64,
    #[serde(default)]
    pub completion_tokens: u64,
    #[serde(default)]
    pub total_tokens: u64,
}

/// Result of one successful completion attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmResponse {
    pub text: String,
    /// Provider payload, untouched.
    pub raw: serde_json::Value,
    pub usage: Usage,
    pub request_id: String,
    pub model: String,
    pub provider: String,
}

impl LlmResponse {
    pub fn new(text: impl Into<String>, request_id: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            raw: serde_json::Value::Object(serde_json::Map::new()),
            usage: Usage::default(),
            request_id: request_id.into(),
            model: String::new(),
            provider: String::new(),
        }
    }
}
