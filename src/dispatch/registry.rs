//! Provider type registry.
//!
//! A [`ProviderRegistry`] maps a provider type identifier (the `type` key of a
//! provider's config table) to a factory for the adapter serving it.
//!
//! The process-wide registry is created lazily with the built-in adapters on
//! first access. After that it only changes through [`register`] and
//! [`alias`]; routers take a [`snapshot`] at construction and never observe
//! later registrations.

use std::collections::HashMap;
use std::sync::{Arc, LazyLock, RwLock};

use crate::dispatch::Provider;
use crate::dispatch::cli::CodexCliProvider;
use crate::dispatch::http::OpenRouterHttpProvider;
use crate::dispatch::mock::MockProvider;
use crate::error::{FailureKind, RouterError};

/// Builds a provider instance for one attempt.
pub type ProviderFactory = Arc<dyn Fn() -> Arc<dyn Provider> + Send + Sync>;

#[derive(Clone, Default)]
pub struct ProviderRegistry {
    factories: HashMap<String, ProviderFactory>,
    /// alias → canonical type id
    aliases: HashMap<String, String>,
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("types", &self.available())
            .field("aliases", &self.aliases)
            .finish()
    }
}

impl ProviderRegistry {
    /// Empty registry with no adapters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the built-in adapters: `mock`, `openrouter_http`
    /// (also reachable as `openai_http`) and `codex_cli`.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register("mock", || Arc::new(MockProvider) as Arc<dyn Provider>);
        registry.register("openrouter_http", || {
            Arc::new(OpenRouterHttpProvider) as Arc<dyn Provider>
        });
        registry.register("codex_cli", || Arc::new(CodexCliProvider) as Arc<dyn Provider>);
        registry.alias("openai_http", "openrouter_http");
        registry
    }

    /// Register (or replace) the factory for `type_id`.
    pub fn register<F>(&mut self, type_id: impl Into<String>, factory: F)
    where
        F: Fn() -> Arc<dyn Provider> + Send + Sync + 'static,
    {
        let type_id = type_id.into();
        self.aliases.remove(&type_id);
        self.factories.insert(type_id, Arc::new(factory));
    }

    /// Make `alias` resolve to whatever `target` resolves to.
    pub fn alias(&mut self, alias: impl Into<String>, target: impl Into<String>) {
        self.aliases.insert(alias.into(), target.into());
    }

    fn resolve<'a>(&'a self, type_id: &'a str) -> &'a str {
        self.aliases.get(type_id).map(String::as_str).unwrap_or(type_id)
    }

    pub fn contains(&self, type_id: &str) -> bool {
        self.factories.contains_key(self.resolve(type_id))
    }

    /// Construct the adapter registered for `type_id`.
    pub fn get(&self, type_id: &str) -> Result<Arc<dyn Provider>, RouterError> {
        let factory = self.factories.get(self.resolve(type_id)).ok_or_else(|| {
            RouterError::new(
                FailureKind::ProviderError,
                format!(
                    "provider type '{type_id}' not registered. Available: {}",
                    self.available().join(", ")
                ),
            )
        })?;
        Ok(factory())
    }

    /// Registered type ids and aliases, sorted.
    pub fn available(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .factories
            .keys()
            .chain(self.aliases.keys())
            .cloned()
            .collect();
        names.sort();
        names.dedup();
        names
    }

    /// Type ids similar to `query` (substring match), capped at 5.
    pub fn suggest(&self, query: &str) -> Vec<String> {
        let q = query.trim().to_lowercase();
        if q.is_empty() {
            return vec![];
        }
        let mut suggestions: Vec<String> = self
            .available()
            .into_iter()
            .filter(|k| {
                let k_lower = k.to_lowercase();
                k_lower.contains(&q) || q.contains(&k_lower)
            })
            .collect();
        suggestions.truncate(5);
        suggestions
    }
}

static GLOBAL: LazyLock<RwLock<ProviderRegistry>> =
    LazyLock::new(|| RwLock::new(ProviderRegistry::with_builtins()));

/// Register an adapter in the process-wide registry.
pub fn register<F>(type_id: impl Into<String>, factory: F)
where
    F: Fn() -> Arc<dyn Provider> + Send + Sync + 'static,
{
    let type_id = type_id.into();
    match GLOBAL.write() {
        Ok(mut registry) => registry.register(type_id.clone(), factory),
        Err(poisoned) => poisoned.into_inner().register(type_id.clone(), factory),
    }
    tracing::debug!(type_id = %type_id, "provider registered");
}

/// Add an alias to the process-wide registry.
pub fn alias(alias: impl Into<String>, target: impl Into<String>) {
    match GLOBAL.write() {
        Ok(mut registry) => registry.alias(alias, target),
        Err(poisoned) => poisoned.into_inner().alias(alias, target),
    }
}

/// Copy of the process-wide registry as it is now.
pub fn snapshot() -> ProviderRegistry {
    match GLOBAL.read() {
        Ok(registry) => registry.clone(),
        Err(poisoned) => poisoned.into_inner().clone(),
    }
}

/// Type ids known to the process-wide registry.
pub fn available() -> Vec<String> {
    snapshot().available()
}
