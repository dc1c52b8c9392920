use std::sync::{Arc, Mutex};
use std::thread::ThreadId;

use llm_router::dispatch::ProviderFuture;
use llm_router::dispatch::mock::MockProvider;
use llm_router::{
    FailureKind, LlmConfig, LlmRequest, LlmResponse, Message, Provider, ProviderRegistry,
    RequestOverrides, Router, Settings, TraceRecord, TraceStore,
};

const CONFIG: &str = r#"
[llm]
default_role = "planner"

[llm.providers.mock]
type = "mock"

[llm.providers.limited]
type = "mock"
raise_rate_limit = true

[llm.providers.strict]
type = "mock"
raise_contract_violation = true

[llm.providers.mock2]
type = "mock"
response_text = "fallback ok"

[llm.providers.sync_only]
type = "sync_only"

[llm.providers.boom_blocking]
type = "panicking"

[llm.providers.boom_native]
type = "panicking_native"

[llm.roles.planner]
provider = "mock"
model = "planner-model"

[llm.roles.rate_limited]
provider = "limited"
model = "m"
fallback_providers = ["mock2"]

[llm.roles.contract]
provider = "strict"
model = "m"
fallback_providers = ["mock2"]

[llm.roles.blocking]
provider = "sync_only"
model = "m"

[llm.roles.panicky_blocking]
provider = "boom_blocking"
model = "m"
fallback_providers = ["mock2"]

[llm.roles.panicky_native]
provider = "boom_native"
model = "m"
fallback_providers = ["mock2"]
"#;

/// Blocking-only provider that records which thread ran it.
struct SyncOnlyProvider(Arc<Mutex<Option<ThreadId>>>);

impl Provider for SyncOnlyProvider {
    fn name(&self) -> &str {
        "sync_only"
    }

    fn supported_types(&self) -> &[&'static str] {
        &["sync_only"]
    }

    fn validate_config(&self, _settings: &Settings) -> anyhow::Result<()> {
        Ok(())
    }

    fn complete(&self, request: &LlmRequest, _settings: &Settings) -> anyhow::Result<LlmResponse> {
        *self.0.lock().unwrap() = Some(std::thread::current().id());
        Ok(LlmResponse::new("from worker", &request.request_id))
    }
}

fn explode() -> anyhow::Result<LlmResponse> {
    panic!("adapter bug")
}

/// Panics from `complete`; with `native` set, from its async variant too.
struct PanickingProvider {
    native: bool,
}

impl Provider for PanickingProvider {
    fn name(&self) -> &str {
        "panicking"
    }

    fn supported_types(&self) -> &[&'static str] {
        &["panicking", "panicking_native"]
    }

    fn validate_config(&self, _settings: &Settings) -> anyhow::Result<()> {
        Ok(())
    }

    fn complete(&self, _request: &LlmRequest, _settings: &Settings) -> anyhow::Result<LlmResponse> {
        explode()
    }

    fn complete_async<'a>(
        &'a self,
        _request: &'a LlmRequest,
        _settings: &'a Settings,
    ) -> Option<ProviderFuture<'a>> {
        if self.native {
            Some(Box::pin(async { explode() }))
        } else {
            None
        }
    }
}

#[derive(Default)]
struct MemoryStore(Mutex<Vec<TraceRecord>>);

impl TraceStore for MemoryStore {
    fn write(&self, trace: &TraceRecord) -> anyhow::Result<()> {
        self.0.lock().unwrap().push(trace.clone());
        Ok(())
    }
}

fn router(store: Arc<MemoryStore>, ran_on: Arc<Mutex<Option<ThreadId>>>) -> Router {
    let mut registry = ProviderRegistry::new();
    registry.register("mock", || Arc::new(MockProvider) as Arc<dyn Provider>);
    registry.register("sync_only", move || {
        Arc::new(SyncOnlyProvider(Arc::clone(&ran_on))) as Arc<dyn Provider>
    });
    registry.register("panicking", || {
        Arc::new(PanickingProvider { native: false }) as Arc<dyn Provider>
    });
    registry.register("panicking_native", || {
        Arc::new(PanickingProvider { native: true }) as Arc<dyn Provider>
    });
    Router::new(LlmConfig::from_toml_str(CONFIG).unwrap())
        .with_registry(registry)
        .with_trace_store(store)
}

#[tokio::test]
async fn async_success_matches_blocking_semantics() {
    let store = Arc::new(MemoryStore::default());
    let r = router(store.clone(), Arc::default());

    let resp = r
        .complete_async("planner", vec![Message::user("hi")], RequestOverrides::default())
        .await
        .unwrap();
    assert_eq!(resp.text, "mock response for role=planner");

    let traces = store.0.lock().unwrap();
    assert_eq!(traces.len(), 1);
    assert!(traces[0].succeeded());
    assert_eq!(traces[0].usage.map(|u| u.total_tokens), Some(15));
}

#[tokio::test]
async fn async_rate_limit_falls_back() {
    let store = Arc::new(MemoryStore::default());
    let r = router(store.clone(), Arc::default());

    let resp = r
        .complete_async(
            "rate_limited",
            vec![Message::user("hi")],
            RequestOverrides::default(),
        )
        .await
        .unwrap();
    assert_eq!(resp.text, "fallback ok");

    let traces = store.0.lock().unwrap();
    assert_eq!(traces.len(), 2);
    assert_eq!(traces[0].failure_type, Some(FailureKind::RateLimit));
    assert_eq!(traces[0].provider, "limited");
    assert!(traces[1].succeeded());
    assert_eq!(traces[1].attempt, 1);
}

#[tokio::test]
async fn async_contract_violation_is_terminal() {
    let store = Arc::new(MemoryStore::default());
    let r = router(store.clone(), Arc::default());

    let err = r
        .complete_async("contract", vec![Message::user("hi")], RequestOverrides::default())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), FailureKind::ContractViolation);
    assert_eq!(store.0.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn blocking_provider_runs_off_the_scheduler_thread() {
    let store = Arc::new(MemoryStore::default());
    let ran_on: Arc<Mutex<Option<ThreadId>>> = Arc::default();
    let r = router(store, Arc::clone(&ran_on));

    let resp = r
        .complete_async("blocking", vec![Message::user("hi")], RequestOverrides::default())
        .await
        .unwrap();
    assert_eq!(resp.text, "from worker");

    let worker = ran_on.lock().unwrap().expect("provider was called");
    assert_ne!(worker, std::thread::current().id());
}

#[tokio::test]
async fn concurrent_calls_get_distinct_request_ids() {
    let store = Arc::new(MemoryStore::default());
    let r = Arc::new(router(store.clone(), Arc::default()));

    let calls = (0..4).map(|_| {
        let r = Arc::clone(&r);
        tokio::spawn(async move {
            r.complete_async("planner", vec![Message::user("hi")], RequestOverrides::default())
                .await
        })
    });
    let mut ids = Vec::new();
    for call in calls.collect::<Vec<_>>() {
        ids.push(call.await.unwrap().unwrap().request_id);
    }
    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), 4);
    assert_eq!(store.0.lock().unwrap().len(), 4);
}

#[tokio::test]
async fn panicking_providers_surface_as_unknown_in_both_async_paths() {
    for role in ["panicky_blocking", "panicky_native"] {
        let store = Arc::new(MemoryStore::default());
        let r = router(store.clone(), Arc::default());

        let err = r
            .complete_async(role, vec![Message::user("hi")], RequestOverrides::default())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), FailureKind::Unknown, "{role}");
        assert!(err.to_string().contains("adapter bug"), "{role}: {err}");

        let traces = store.0.lock().unwrap();
        assert_eq!(traces.len(), 1, "{role}");
        assert_eq!(traces[0].failure_type, Some(FailureKind::Unknown));
    }
}
