//! Completion routing engine.
//!
//! Flow for every call: resolve role → `policy.choose` → build the request →
//! try `[primary] + fallback_providers` in order, tracing each attempt →
//! return the first response or a single classified error.
//!
//! Both entry points drive the same [`FallbackRun`]; they differ only in how
//! a provider is invoked. [`Router::complete`] calls it on the current
//! thread; [`Router::complete_async`] awaits the provider's native future or,
//! for blocking-only providers, runs it on a `spawn_blocking` worker.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use futures_util::FutureExt;

use crate::compression::compress;
use crate::config::{LlmConfig, RoleConfig};
use crate::dispatch::registry::{self, ProviderRegistry};
use crate::dispatch::{Provider, Settings};
use crate::error::{FailureKind, RouterError};
use crate::events::{
    COMPLETE_ERROR, COMPLETE_START, COMPLETE_SUCCESS, EventSink, POLICY_CHOICE, POLICY_FALLBACK,
    RouterEvent, TokenUsageHook,
};
use crate::policy::{ProviderChoice, RoutingPolicy, SimpleRoutingPolicy, resolve_role};
use crate::request::{LlmRequest, Message, RequestOverrides, new_request_id};
use crate::response::{LlmResponse, Usage};
use crate::trace::{LocalFileTraceStore, TraceRecord, TraceStore};

/// Routes role requests to providers. Cheap to share behind an `Arc`; every
/// call is routed independently.
pub struct Router {
    config: Arc<LlmConfig>,
    workspace: Option<String>,
    policy: Arc<dyn RoutingPolicy>,
    trace_store: Arc<dyn TraceStore>,
    custom_trace_store: bool,
    event_sink: Option<Arc<dyn EventSink>>,
    token_hook: Option<TokenUsageHook>,
    registry: Arc<ProviderRegistry>,
}

impl std::fmt::Debug for Router {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Router")
            .field("default_role", &self.config.default_role)
            .field("workspace", &self.workspace)
            .field("policy", &self.policy.name())
            .field("event_sink", &self.event_sink.is_some())
            .field("token_hook", &self.token_hook.is_some())
            .field("registry", &self.registry)
            .finish()
    }
}

impl Router {
    /// Router with the simple policy, the default file trace store and a
    /// snapshot of the process-wide provider registry.
    pub fn new(config: LlmConfig) -> Self {
        Self {
            config: Arc::new(config),
            workspace: None,
            policy: Arc::new(SimpleRoutingPolicy),
            trace_store: Arc::new(LocalFileTraceStore::new()),
            custom_trace_store: false,
            event_sink: None,
            token_hook: None,
            registry: Arc::new(registry::snapshot()),
        }
    }

    pub fn with_workspace(mut self, workspace: impl Into<String>) -> Self {
        self.workspace = Some(workspace.into());
        self
    }

    /// Shorthand for a [`LocalFileTraceStore`] rooted at `dir`. Ignored when
    /// a trace store was set with [`with_trace_store`](Self::with_trace_store).
    pub fn with_trace_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        if !self.custom_trace_store {
            self.trace_store = Arc::new(LocalFileTraceStore::with_dir(dir));
        }
        self
    }

    pub fn with_trace_store(mut self, store: Arc<dyn TraceStore>) -> Self {
        self.trace_store = store;
        self.custom_trace_store = true;
        self
    }

    pub fn with_policy(mut self, policy: Arc<dyn RoutingPolicy>) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.event_sink = Some(sink);
        self
    }

    pub fn with_token_hook(mut self, hook: TokenUsageHook) -> Self {
        self.token_hook = Some(hook);
        self
    }

    pub fn with_registry(mut self, registry: ProviderRegistry) -> Self {
        self.registry = Arc::new(registry);
        self
    }

    pub fn config(&self) -> &LlmConfig {
        &self.config
    }

    /// Blocking completion with fallback chain.
    ///
    /// Occupies the calling thread for the whole provider call. Do not call
    /// from inside an async runtime; use [`complete_async`](Self::complete_async).
    pub fn complete(
        &self,
        role: &str,
        messages: Vec<Message>,
        overrides: RequestOverrides,
    ) -> Result<LlmResponse, RouterError> {
        let mut run = self.begin(role, messages, &overrides)?;
        while let Some(attempt) = run.next_attempt()? {
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
                attempt.provider.complete(&run.request, &attempt.settings)
            }))
            .unwrap_or_else(|payload| Err(panic_error(payload)));
            if let Some(result) = run.settle(attempt, outcome) {
                return result;
            }
        }
        Err(run.exhausted())
    }

    /// Cooperative completion with fallback chain.
    ///
    /// Providers with a native async variant are awaited directly; others
    /// run on a blocking worker so the scheduler thread is never blocked.
    pub async fn complete_async(
        &self,
        role: &str,
        messages: Vec<Message>,
        overrides: RequestOverrides,
    ) -> Result<LlmResponse, RouterError> {
        let mut run = self.begin(role, messages, &overrides)?;
        while let Some(attempt) = run.next_attempt()? {
            let outcome = invoke_async(&attempt.provider, &run.request, &attempt.settings).await;
            if let Some(result) = run.settle(attempt, outcome) {
                return result;
            }
        }
        Err(run.exhausted())
    }

    fn begin(
        &self,
        role: &str,
        messages: Vec<Message>,
        overrides: &RequestOverrides,
    ) -> Result<FallbackRun<'_>, RouterError> {
        let role_cfg = resolve_role(role, &self.config)?;
        let choice = self.policy.choose(role, &self.config)?;
        let request = self.build_request(role, messages, role_cfg, &choice, overrides);

        tracing::info!(
            event = POLICY_CHOICE,
            request_id = %request.request_id,
            role,
            provider = %choice.provider_name,
            policy = self.policy.name(),
            "policy.choice"
        );
        self.emit(
            RouterEvent::new(POLICY_CHOICE, &request.request_id)
                .with("role", role)
                .with("provider", choice.provider_name.as_str())
                .with("policy", self.policy.name()),
        );

        let candidates = std::iter::once(choice.provider_name.clone())
            .chain(role_cfg.fallback_providers.iter().cloned())
            .collect();

        Ok(FallbackRun {
            router: self,
            role: role.to_string(),
            choice,
            request: Arc::new(request),
            candidates,
            next_index: 0,
            last_error: None,
        })
    }

    /// Role defaults, then policy request overrides, then per-call overrides.
    fn build_request(
        &self,
        role: &str,
        messages: Vec<Message>,
        role_cfg: &RoleConfig,
        choice: &ProviderChoice,
        overrides: &RequestOverrides,
    ) -> LlmRequest {
        let merged = choice.request_overrides.clone().merged_with(overrides);
        LlmRequest {
            role: role.to_string(),
            messages: compress(messages),
            model: merged.model.unwrap_or_else(|| role_cfg.model.clone()),
            temperature: merged.temperature.unwrap_or(role_cfg.temperature),
            json_mode: merged.json_mode.unwrap_or(role_cfg.json_mode),
            max_tokens: merged.max_tokens.or(role_cfg.max_tokens),
            timeout: merged.timeout.unwrap_or(role_cfg.timeout),
            schema: merged.schema,
            request_id: new_request_id(),
            workspace: self.workspace.clone(),
            work_package_id: merged.work_package_id,
        }
    }

    fn emit(&self, event: RouterEvent) {
        let Some(sink) = &self.event_sink else {
            return;
        };
        match panic::catch_unwind(AssertUnwindSafe(|| sink.emit(&event))) {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                tracing::debug!(event = %event.event, "event sink error ignored: {e:#}");
            }
            Err(_) => tracing::debug!(event = %event.event, "event sink panicked; ignored"),
        }
    }

    fn persist(&self, trace: &TraceRecord) {
        if let Err(e) = self.trace_store.write(trace) {
            tracing::warn!(
                request_id = %trace.request_id,
                attempt = trace.attempt,
                "trace store write failed: {e:#}"
            );
        }
    }

    fn call_token_hook(&self, usage: &Usage, role: &str, provider: &str) {
        let Some(hook) = &self.token_hook else {
            return;
        };
        match panic::catch_unwind(AssertUnwindSafe(|| hook(usage, role, provider))) {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::debug!(role, provider, "token usage hook error ignored: {e:#}"),
            Err(_) => tracing::debug!(role, provider, "token usage hook panicked; ignored"),
        }
    }
}

async fn invoke_async(
    provider: &Arc<dyn Provider>,
    request: &Arc<LlmRequest>,
    settings: &Settings,
) -> anyhow::Result<LlmResponse> {
    if let Some(native) = provider.complete_async(request, settings) {
        return AssertUnwindSafe(native)
            .catch_unwind()
            .await
            .unwrap_or_else(|payload| Err(panic_error(payload)));
    }
    let provider = Arc::clone(provider);
    let request = Arc::clone(request);
    let settings = settings.clone();
    match tokio::task::spawn_blocking(move || provider.complete(&request, &settings)).await {
        Ok(outcome) => outcome,
        Err(e) if e.is_panic() => Err(panic_error(e.into_panic())),
        Err(e) => Err(anyhow::anyhow!("provider worker failed: {e}")),
    }
}

/// Unclassified error for a provider that panicked, so the attempt is
/// traced and surfaced as `UNKNOWN` in both modes.
fn panic_error(payload: Box<dyn Any + Send>) -> anyhow::Error {
    let detail = payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_string());
    anyhow::anyhow!("provider panicked: {detail}")
}

/// A provider resolved and traced, ready to be invoked once.
struct Attempt {
    index: usize,
    provider_name: String,
    provider: Arc<dyn Provider>,
    settings: Settings,
    trace: TraceRecord,
    started: Instant,
}

/// Position of one call in its candidate list.
struct FallbackRun<'r> {
    router: &'r Router,
    role: String,
    choice: ProviderChoice,
    /// Shared, never rebuilt: every candidate sees the same request.
    request: Arc<LlmRequest>,
    candidates: Vec<String>,
    next_index: usize,
    last_error: Option<RouterError>,
}

impl FallbackRun<'_> {
    /// Open the next configured candidate, skipping names with no provider
    /// config. `Ok(None)` once the list is exhausted.
    fn next_attempt(&mut self) -> Result<Option<Attempt>, RouterError> {
        let router = self.router;
        while self.next_index < self.candidates.len() {
            let index = self.next_index;
            self.next_index += 1;
            let name = self.candidates[index].clone();

            let Some(provider_cfg) = router.config.providers.get(&name) else {
                tracing::debug!(
                    request_id = %self.request.request_id,
                    provider = %name,
                    "skipping unconfigured provider"
                );
                continue;
            };

            if index > 0 {
                tracing::info!(
                    event = POLICY_FALLBACK,
                    request_id = %self.request.request_id,
                    role = %self.role,
                    provider = %name,
                    attempt = index,
                    "policy.fallback"
                );
                router.emit(
                    RouterEvent::new(POLICY_FALLBACK, &self.request.request_id)
                        .with("role", self.role.as_str())
                        .with("provider", name.as_str())
                        .with("attempt", index),
                );
            }

            let provider = router.registry.get(&provider_cfg.provider_type)?;
            let mut settings = provider_cfg.raw.clone();
            settings.extend(self.choice.provider_overrides.clone());

            let trace = TraceRecord::start(&self.request, &name, index);
            router.emit(
                RouterEvent::new(COMPLETE_START, &self.request.request_id)
                    .with("provider", name.as_str())
                    .with("attempt", index)
                    .with("model", self.request.model.as_str()),
            );

            return Ok(Some(Attempt {
                index,
                provider_name: name,
                provider,
                settings,
                trace,
                started: Instant::now(),
            }));
        }
        Ok(None)
    }

    /// Close an attempt. `Some` ends the call with that result; `None`
    /// means move on to the next candidate.
    fn settle(
        &mut self,
        attempt: Attempt,
        outcome: anyhow::Result<LlmResponse>,
    ) -> Option<Result<LlmResponse, RouterError>> {
        let router = self.router;
        let elapsed_ms = attempt.started.elapsed().as_secs_f64() * 1000.0;
        let Attempt {
            index,
            provider_name,
            mut trace,
            ..
        } = attempt;

        match outcome {
            Ok(response) => {
                trace.record_success(&response, elapsed_ms);
                router.persist(&trace);
                router.emit(
                    RouterEvent::new(COMPLETE_SUCCESS, &self.request.request_id)
                        .with("provider", provider_name.as_str())
                        .with("attempt", index)
                        .with("elapsed_ms", elapsed_ms),
                );
                router.call_token_hook(&response.usage, &self.role, &provider_name);
                Some(Ok(response))
            }
            Err(err) => {
                let (error, classified) = RouterError::classify(err);
                trace.record_error(&error, elapsed_ms);
                router.persist(&trace);
                router.emit(
                    RouterEvent::new(COMPLETE_ERROR, &self.request.request_id)
                        .with("provider", provider_name.as_str())
                        .with("attempt", index)
                        .with("failure_type", error.kind().as_str())
                        .with("error", error.to_string()),
                );

                // Unclassified failures surface as-is rather than being
                // masked by a fallback.
                let is_last = index + 1 == self.candidates.len();
                if !classified || !error.is_retryable() || is_last {
                    return Some(Err(error));
                }
                self.last_error = Some(error);
                None
            }
        }
    }

    fn exhausted(&mut self) -> RouterError {
        self.last_error.take().unwrap_or_else(|| {
            RouterError::new(FailureKind::ProviderError, "no providers available")
        })
    }
}
