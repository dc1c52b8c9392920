use serde_json::json;

use crate::dispatch::{Provider, ProviderFuture, Settings, setting_flag, setting_str};
use crate::error::{FailureKind, RouterError};
use crate::request::LlmRequest;
use crate::response::{LlmResponse, Usage};

/// Deterministic provider with no I/O, for tests and dry runs.
///
/// Settings:
/// - `raise_timeout`, `raise_contract_violation`, `raise_rate_limit`: fail
///   with the matching kind (checked in that order)
/// - `response_text`: text to return
#[derive(Debug, Default, Clone, Copy)]
pub struct MockProvider;

impl MockProvider {
    fn respond(request: &LlmRequest, settings: &Settings) -> anyhow::Result<LlmResponse> {
        if setting_flag(settings, "raise_timeout") {
            return Err(RouterError::new(FailureKind::Timeout, "mock timeout").into());
        }
        if setting_flag(settings, "raise_contract_violation") {
            return Err(
                RouterError::new(FailureKind::ContractViolation, "mock contract violation").into(),
            );
        }
        if setting_flag(settings, "raise_rate_limit") {
            return Err(RouterError::new(FailureKind::RateLimit, "mock rate limit").into());
        }

        let text = setting_str(settings, "response_text")
            .map(str::to_string)
            .unwrap_or_else(|| format!("mock response for role={}", request.role));
        let model = if request.model.is_empty() {
            "mock-model".to_string()
        } else {
            request.model.clone()
        };

        Ok(LlmResponse {
            text,
            raw: json!({ "mock": true, "role": request.role }),
            usage: Usage {
                prompt_tokens: 10,
                completion_tokens: 5,
                total_tokens: 15,
            },
            request_id: request.request_id.clone(),
            model,
            provider: "mock".to_string(),
        })
    }
}

impl Provider for MockProvider {
    fn name(&self) -> &str {
        "mock"
    }

    fn supported_types(&self) -> &[&'static str] {
        &["mock"]
    }

    fn validate_config(&self, _settings: &Settings) -> anyhow::Result<()> {
        Ok(())
    }

    fn complete(&self, request: &LlmRequest, settings: &Settings) -> anyhow::Result<LlmResponse> {
        Self::respond(request, settings)
    }

    fn complete_async<'a>(
        &'a self,
        request: &'a LlmRequest,
        settings: &'a Settings,
    ) -> Option<ProviderFuture<'a>> {
        Some(Box::pin(async move { Self::respond(request, settings) }))
    }
}
