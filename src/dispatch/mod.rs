pub mod cli;
pub mod http;
pub mod mock;
pub mod registry;

use futures_util::future::BoxFuture;

use crate::request::LlmRequest;
use crate::response::LlmResponse;

/// Raw provider settings: a provider's config table merged with any
/// provider-level overrides from the routing policy.
pub type Settings = serde_json::Map<String, serde_json::Value>;

/// Future returned by a provider's native cooperative variant.
pub type ProviderFuture<'a> = BoxFuture<'a, anyhow::Result<LlmResponse>>;

/// A backend adapter able to execute a completion request.
///
/// Failures should be returned as a [`RouterError`](crate::error::RouterError)
/// wrapped in `anyhow::Error`. Any other error is treated as unclassified:
/// the router reports it as `UNKNOWN` and never falls back on it.
pub trait Provider: Send + Sync {
    fn name(&self) -> &str;

    /// Registry type identifiers this adapter serves.
    fn supported_types(&self) -> &[&'static str];

    /// Reject settings that are missing required keys.
    fn validate_config(&self, settings: &Settings) -> anyhow::Result<()>;

    /// Blocking completion. Occupies the calling thread for the whole call.
    fn complete(&self, request: &LlmRequest, settings: &Settings) -> anyhow::Result<LlmResponse>;

    /// Native cooperative completion, if the adapter has one.
    /// `None` makes the router run [`Provider::complete`] on a blocking worker.
    fn complete_async<'a>(
        &'a self,
        _request: &'a LlmRequest,
        _settings: &'a Settings,
    ) -> Option<ProviderFuture<'a>> {
        None
    }
}

pub(crate) fn setting_str<'a>(settings: &'a Settings, key: &str) -> Option<&'a str> {
    settings.get(key).and_then(|v| v.as_str())
}

pub(crate) fn setting_flag(settings: &Settings, key: &str) -> bool {
    settings.get(key).and_then(|v| v.as_bool()).unwrap_or(false)
}

/// First `max` chars of `s`, for error messages built from upstream output.
pub(crate) fn preview(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}
