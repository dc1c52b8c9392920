use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::dispatch::Settings;

pub const DEFAULT_TEMPERATURE: f64 = 0.2;
pub const DEFAULT_TIMEOUT_SECS: f64 = 60.0;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found: {0}")]
    NotFound(PathBuf),

    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("{0}")]
    Invalid(String),
}

/// A configured provider instance: the name roles refer to, the registry
/// type it is built from, and everything else from its table.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderConfig {
    pub name: String,
    pub provider_type: String,
    pub raw: Settings,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RoleConfig {
    pub name: String,
    pub provider: String,
    pub model: String,
    pub temperature: f64,
    pub json_mode: bool,
    pub max_tokens: Option<u32>,
    pub timeout: Duration,
    /// Tried in this order after the primary fails with a retryable error.
    pub fallback_providers: Vec<String>,
}

impl RoleConfig {
    /// Role with every optional field at its default.
    pub fn new(name: impl Into<String>, provider: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            provider: provider.into(),
            model: String::new(),
            temperature: DEFAULT_TEMPERATURE,
            json_mode: false,
            max_tokens: None,
            timeout: Duration::from_secs_f64(DEFAULT_TIMEOUT_SECS),
            fallback_providers: Vec::new(),
        }
    }
}

/// Resolved, validated configuration snapshot. Read-only once loaded.
#[derive(Debug, Clone, PartialEq)]
pub struct LlmConfig {
    pub default_role: String,
    pub providers: HashMap<String, ProviderConfig>,
    pub roles: HashMap<String, RoleConfig>,
}

#[derive(Deserialize)]
struct ConfigFile {
    llm: Option<LlmSection>,
}

#[derive(Deserialize)]
struct LlmSection {
    default_role: Option<String>,
    #[serde(default)]
    providers: HashMap<String, toml::Table>,
    #[serde(default)]
    roles: HashMap<String, RoleSection>,
}

#[derive(Deserialize)]
struct RoleSection {
    provider: Option<String>,
    #[serde(default)]
    model: String,
    #[serde(default = "default_temperature")]
    temperature: f64,
    #[serde(default)]
    json_mode: bool,
    max_tokens: Option<u32>,
    #[serde(default = "default_timeout")]
    timeout: f64,
    #[serde(default)]
    fallback_providers: Vec<String>,
}

fn default_temperature() -> f64 {
    DEFAULT_TEMPERATURE
}

fn default_timeout() -> f64 {
    DEFAULT_TIMEOUT_SECS
}

impl LlmConfig {
    /// Load and validate a TOML config file.
    ///
    /// ```toml
    /// [llm]
    /// default_role = "planner"
    ///
    /// [llm.providers.openrouter]
    /// type = "openrouter_http"
    /// base_url = "https://openrouter.ai/api/v1"
    /// api_key_env = "OPENROUTER_API_KEY"
    ///
    /// [llm.roles.planner]
    /// provider = "openrouter"
    /// model = "gpt-4o"
    /// fallback_providers = ["local"]
    /// ```
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ConfigError::NotFound(path.to_path_buf())
            } else {
                ConfigError::Io {
                    path: path.to_path_buf(),
                    source: e,
                }
            }
        })?;
        let config = Self::from_toml_str(&text)?;
        tracing::debug!(
            path = %path.display(),
            providers = config.providers.len(),
            roles = config.roles.len(),
            "config loaded"
        );
        Ok(config)
    }

    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let file: ConfigFile = toml::from_str(text)?;
        let llm = file
            .llm
            .ok_or_else(|| ConfigError::Invalid("config must have a top-level [llm] table".into()))?;

        let default_role = llm.default_role.ok_or_else(|| {
            ConfigError::Invalid("config missing required field: llm.default_role".into())
        })?;
        if llm.providers.is_empty() {
            return Err(ConfigError::Invalid(
                "config missing required field: llm.providers".into(),
            ));
        }
        if llm.roles.is_empty() {
            return Err(ConfigError::Invalid(
                "config missing required field: llm.roles".into(),
            ));
        }

        let mut providers = HashMap::with_capacity(llm.providers.len());
        for (name, mut table) in llm.providers {
            let provider_type = match table.remove("type") {
                Some(toml::Value::String(t)) => t,
                _ => {
                    return Err(ConfigError::Invalid(format!(
                        "provider '{name}' missing required field: 'type'"
                    )));
                }
            };
            let raw = match serde_json::to_value(&table) {
                Ok(serde_json::Value::Object(map)) => map,
                Ok(_) => Settings::new(),
                Err(e) => {
                    return Err(ConfigError::Invalid(format!(
                        "provider '{name}' has settings that cannot be represented: {e}"
                    )));
                }
            };
            providers.insert(
                name.clone(),
                ProviderConfig {
                    name,
                    provider_type,
                    raw,
                },
            );
        }

        let mut roles = HashMap::with_capacity(llm.roles.len());
        for (name, section) in llm.roles {
            let provider = section.provider.ok_or_else(|| {
                ConfigError::Invalid(format!("role '{name}' missing required field: 'provider'"))
            })?;
            if !providers.contains_key(&provider) {
                return Err(ConfigError::Invalid(format!(
                    "role '{name}' references unknown provider: '{provider}'"
                )));
            }
            if !section.timeout.is_finite() || section.timeout <= 0.0 {
                return Err(ConfigError::Invalid(format!(
                    "role '{name}' has a non-positive timeout: {}",
                    section.timeout
                )));
            }
            let timeout = Duration::try_from_secs_f64(section.timeout).map_err(|e| {
                ConfigError::Invalid(format!("role '{name}' has an invalid timeout: {e}"))
            })?;
            roles.insert(
                name.clone(),
                RoleConfig {
                    name,
                    provider,
                    model: section.model,
                    temperature: section.temperature,
                    json_mode: section.json_mode,
                    max_tokens: section.max_tokens,
                    timeout,
                    fallback_providers: section.fallback_providers,
                },
            );
        }

        Ok(Self {
            default_role,
            providers,
            roles,
        })
    }

    /// Role by name, falling back to the default role.
    pub fn role(&self, name: &str) -> Option<&RoleConfig> {
        self.roles
            .get(name)
            .or_else(|| self.roles.get(&self.default_role))
    }
}
