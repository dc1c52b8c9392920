//! Provider selection.
//!
//! A [`RoutingPolicy`] turns a role name and the config snapshot into a
//! [`ProviderChoice`]. The router logs every choice as a `policy.choice`
//! event. Policies must be pure functions of their inputs: the router may
//! share one policy across concurrent calls.

use crate::config::{LlmConfig, RoleConfig};
use crate::dispatch::Settings;
use crate::error::{FailureKind, RouterError};
use crate::request::RequestOverrides;

/// Role configuration for `role`, or for the default role when `role` is
/// not configured.
pub fn resolve_role<'a>(role: &str, config: &'a LlmConfig) -> Result<&'a RoleConfig, RouterError> {
    config.role(role).ok_or_else(|| {
        RouterError::new(
            FailureKind::ProviderError,
            format!(
                "role '{role}' not found and default_role '{}' also missing",
                config.default_role
            ),
        )
    })
}

/// Which provider to call, and what to layer over its settings and over
/// the request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProviderChoice {
    pub provider_name: String,
    /// Merged over the provider's static settings for every attempt.
    pub provider_overrides: Settings,
    /// Applied over role defaults, below per-call overrides.
    pub request_overrides: RequestOverrides,
}

impl ProviderChoice {
    pub fn new(provider_name: impl Into<String>) -> Self {
        Self {
            provider_name: provider_name.into(),
            ..Default::default()
        }
    }

    /// Set provider-level overrides. Explicit values replace anything
    /// supplied through [`with_legacy_overrides`](Self::with_legacy_overrides).
    pub fn with_provider_overrides(mut self, overrides: Settings) -> Self {
        self.provider_overrides.extend(overrides);
        self
    }

    pub fn with_request_overrides(mut self, overrides: RequestOverrides) -> Self {
        self.request_overrides = overrides;
        self
    }

    /// Accept the deprecated `overrides` map. Its keys are merged into the
    /// provider-level overrides; keys set explicitly keep their values.
    pub fn with_legacy_overrides(mut self, overrides: Settings) -> Self {
        for (key, value) in overrides {
            self.provider_overrides.entry(key).or_insert(value);
        }
        self
    }

    /// Deprecated alias for [`provider_overrides`](Self::provider_overrides).
    pub fn overrides(&self) -> &Settings {
        &self.provider_overrides
    }
}

pub trait RoutingPolicy: Send + Sync {
    /// Short name recorded with every `policy.choice` event.
    fn name(&self) -> &str;

    fn choose(&self, role: &str, config: &LlmConfig) -> Result<ProviderChoice, RouterError>;
}

/// Uses the role's configured provider with no overrides.
#[derive(Debug, Default, Clone, Copy)]
pub struct SimpleRoutingPolicy;

impl RoutingPolicy for SimpleRoutingPolicy {
    fn name(&self) -> &str {
        "SimpleRoutingPolicy"
    }

    fn choose(&self, role: &str, config: &LlmConfig) -> Result<ProviderChoice, RouterError> {
        let role_cfg = config.role(role).ok_or_else(|| {
            RouterError::new(
                FailureKind::ProviderError,
                format!(
                    "SimpleRoutingPolicy: no role config for '{role}' and default_role '{}' also missing",
                    config.default_role
                ),
            )
        })?;
        Ok(ProviderChoice::new(role_cfg.provider.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn config() -> LlmConfig {
        LlmConfig::from_toml_str(
            r#"
[llm]
default_role = "planner"
[llm.providers.a]
type = "mock"
[llm.providers.b]
type = "mock"
[llm.roles.planner]
provider = "a"
[llm.roles.coder]
provider = "b"
"#,
        )
        .unwrap()
    }

    fn settings(pairs: &[(&str, serde_json::Value)]) -> Settings {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn simple_policy_uses_role_provider() {
        let choice = SimpleRoutingPolicy.choose("coder", &config()).unwrap();
        assert_eq!(choice.provider_name, "b");
        assert!(choice.provider_overrides.is_empty());
        assert_eq!(choice.request_overrides, RequestOverrides::default());
    }

    #[test]
    fn simple_policy_falls_back_to_default_role() {
        let choice = SimpleRoutingPolicy.choose("unknown", &config()).unwrap();
        assert_eq!(choice.provider_name, "a");
    }

    #[test]
    fn missing_default_role_is_provider_error() {
        let mut cfg = config();
        cfg.default_role = "ghost".into();
        let err = SimpleRoutingPolicy.choose("unknown", &cfg).unwrap_err();
        assert_eq!(err.kind(), FailureKind::ProviderError);
        assert!(err.to_string().contains("unknown"));
        assert!(err.to_string().contains("ghost"));

        let err = resolve_role("unknown", &cfg).unwrap_err();
        assert_eq!(err.kind(), FailureKind::ProviderError);
    }

    #[test]
    fn legacy_overrides_merge_under_explicit_values() {
        let explicit = settings(&[("model", json!("explicit"))]);
        let legacy = settings(&[("model", json!("legacy")), ("base_url", json!("http://x"))]);

        let a = ProviderChoice::new("p")
            .with_provider_overrides(explicit.clone())
            .with_legacy_overrides(legacy.clone());
        let b = ProviderChoice::new("p")
            .with_legacy_overrides(legacy)
            .with_provider_overrides(explicit);

        for choice in [a, b] {
            assert_eq!(choice.provider_overrides["model"], "explicit");
            assert_eq!(choice.provider_overrides["base_url"], "http://x");
            assert_eq!(choice.overrides(), &choice.provider_overrides);
        }
    }
}
