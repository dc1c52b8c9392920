use std::time::Duration;

use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::{Value, json};

use crate::dispatch::{Provider, ProviderFuture, Settings, preview, setting_str};
use crate::error::{FailureKind, RouterError};
use crate::request::LlmRequest;
use crate::response::{LlmResponse, Usage};

pub const MAX_RESPONSE_BYTES: usize = 2 * 1024 * 1024; // 2MB

pub const DEFAULT_BASE_URL: &str = "https://openrouter.ai/api/v1";
pub const DEFAULT_API_KEY_ENV: &str = "OPENROUTER_API_KEY";

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// OpenRouter and other OpenAI-compatible `/chat/completions` APIs.
///
/// Settings: `base_url`, `api_key_env` (name of the env var holding the key,
/// read at call time), optional `headers` table.
#[derive(Debug, Default, Clone, Copy)]
pub struct OpenRouterHttpProvider;

#[derive(Deserialize)]
struct ChatCompletion {
    choices: Vec<Choice>,
    model: Option<String>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

/// Everything needed to send one request, shared by both call paths.
struct RequestParts {
    url: String,
    headers: Vec<(String, String)>,
    payload: Value,
    timeout: Duration,
}

fn build_request_parts(request: &LlmRequest, settings: &Settings) -> RequestParts {
    let base_url = setting_str(settings, "base_url").unwrap_or(DEFAULT_BASE_URL);
    let api_key_env = setting_str(settings, "api_key_env").unwrap_or(DEFAULT_API_KEY_ENV);
    let api_key = std::env::var(api_key_env).unwrap_or_default();

    let mut headers = vec![
        ("Authorization".to_string(), format!("Bearer {api_key}")),
        ("Content-Type".to_string(), "application/json".to_string()),
    ];
    if let Some(extra) = settings.get("headers").and_then(Value::as_object) {
        for (name, value) in extra {
            if let Some(value) = value.as_str() {
                headers.push((name.clone(), value.to_string()));
            }
        }
    }

    let mut payload = json!({
        "model": request.model,
        "messages": request.messages,
        "temperature": request.temperature,
    });
    if let Some(max_tokens) = request.max_tokens {
        payload["max_tokens"] = json!(max_tokens);
    }
    if request.json_mode {
        payload["response_format"] = json!({ "type": "json_object" });
    }

    RequestParts {
        url: format!("{}/chat/completions", base_url.trim_end_matches('/')),
        headers,
        payload,
        timeout: request.timeout,
    }
}

fn transport_error(err: &reqwest::Error, timeout: Duration) -> RouterError {
    if err.is_timeout() {
        RouterError::new(
            FailureKind::Timeout,
            format!("request timed out after {:.1}s", timeout.as_secs_f64()),
        )
    } else {
        RouterError::new(
            FailureKind::ProviderError,
            format!("HTTP request failed: {err}"),
        )
    }
}

fn check_status(status: StatusCode, body: &[u8]) -> Result<(), RouterError> {
    if status == StatusCode::TOO_MANY_REQUESTS {
        return Err(RouterError::new(
            FailureKind::RateLimit,
            "rate limited by provider",
        ));
    }
    if !status.is_success() {
        let text = String::from_utf8_lossy(&body[..body.len().min(MAX_RESPONSE_BYTES)]);
        return Err(RouterError::new(
            FailureKind::ProviderError,
            format!("provider returned HTTP {}: {}", status.as_u16(), preview(&text, 200)),
        ));
    }
    Ok(())
}

/// Parse a `/chat/completions` body. Status must already be checked.
fn parse_response(body: &[u8], request: &LlmRequest) -> Result<LlmResponse, RouterError> {
    if body.len() > MAX_RESPONSE_BYTES {
        return Err(RouterError::new(
            FailureKind::InvalidResponse,
            format!(
                "response too large: {} bytes (max {MAX_RESPONSE_BYTES})",
                body.len()
            ),
        ));
    }

    let raw: Value = serde_json::from_slice(body).map_err(|e| {
        RouterError::new(
            FailureKind::InvalidResponse,
            format!("response is not valid JSON: {e}"),
        )
    })?;
    let completion: ChatCompletion = serde_json::from_value(raw.clone()).map_err(|e| {
        RouterError::new(
            FailureKind::InvalidResponse,
            format!("unexpected response structure: {e}"),
        )
    })?;

    let text = completion
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .ok_or_else(|| {
            RouterError::new(
                FailureKind::InvalidResponse,
                "unexpected response structure: empty choices or null content",
            )
        })?;

    Ok(LlmResponse {
        text,
        raw,
        usage: completion.usage.unwrap_or_default(),
        request_id: request.request_id.clone(),
        model: completion.model.unwrap_or_else(|| request.model.clone()),
        provider: "openrouter_http".to_string(),
    })
}

impl OpenRouterHttpProvider {
    async fn send(&self, request: &LlmRequest, settings: &Settings) -> anyhow::Result<LlmResponse> {
        let parts = build_request_parts(request, settings);
        let client = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(parts.timeout)
            .build()
            .map_err(|e| transport_error(&e, parts.timeout))?;

        let mut builder = client.post(&parts.url).json(&parts.payload);
        for (name, value) in &parts.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let response = builder
            .send()
            .await
            .map_err(|e| transport_error(&e, parts.timeout))?;
        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|e| transport_error(&e, parts.timeout))?;

        check_status(status, &body)?;
        Ok(parse_response(&body, request)?)
    }
}

impl Provider for OpenRouterHttpProvider {
    fn name(&self) -> &str {
        "openrouter_http"
    }

    fn supported_types(&self) -> &[&'static str] {
        &["openrouter_http", "openai_http"]
    }

    fn validate_config(&self, settings: &Settings) -> anyhow::Result<()> {
        for key in ["base_url", "api_key_env"] {
            if !settings.contains_key(key) {
                return Err(RouterError::new(
                    FailureKind::ProviderError,
                    format!("HTTP provider missing required config key: '{key}'"),
                )
                .into());
            }
        }
        Ok(())
    }

    fn complete(&self, request: &LlmRequest, settings: &Settings) -> anyhow::Result<LlmResponse> {
        let parts = build_request_parts(request, settings);
        let client = reqwest::blocking::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(parts.timeout)
            .build()
            .map_err(|e| transport_error(&e, parts.timeout))?;

        let mut builder = client.post(&parts.url).json(&parts.payload);
        for (name, value) in &parts.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let response = builder
            .send()
            .map_err(|e| transport_error(&e, parts.timeout))?;
        let status = response.status();
        let body = response
            .bytes()
            .map_err(|e| transport_error(&e, parts.timeout))?;

        check_status(status, &body)?;
        Ok(parse_response(&body, request)?)
    }

    fn complete_async<'a>(
        &'a self,
        request: &'a LlmRequest,
        settings: &'a Settings,
    ) -> Option<ProviderFuture<'a>> {
        Some(Box::pin(self.send(request, settings)))
    }
}
