use std::io::Write;
use std::sync::Arc;

use llm_router::dispatch::mock::MockProvider;
use llm_router::{LlmRequest, LlmResponse, Provider, ProviderRegistry, Settings};
use llm_router::doctor::{check_config, recent_trace_files, summarize, template};
use llm_router::{LlmConfig, Message, RequestOverrides, Router, TraceRecord};

fn write_config(body: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(body.as_bytes()).unwrap();
    file
}

#[test]
fn mock_only_config_is_healthy() {
    let file = write_config(
        r#"
[llm]
default_role = "planner"
[llm.providers.mock]
type = "mock"
[llm.roles.planner]
provider = "mock"
"#,
    );
    let report = check_config(file.path(), None, &ProviderRegistry::with_builtins());
    assert!(report.is_healthy(), "{report:?}");
    assert!(report.warnings.is_empty());
}

#[test]
fn unset_api_key_env_is_an_error() {
    let file = write_config(
        r#"
[llm]
default_role = "planner"
[llm.providers.remote]
type = "openrouter_http"
api_key_env = "LLM_ROUTER_DOCTOR_TEST_KEY_THAT_IS_NEVER_SET"
[llm.roles.planner]
provider = "remote"
"#,
    );
    let report = check_config(file.path(), None, &ProviderRegistry::with_builtins());
    assert!(!report.is_healthy());
    assert!(
        report
            .errors
            .iter()
            .any(|e| e.contains("LLM_ROUTER_DOCTOR_TEST_KEY_THAT_IS_NEVER_SET"))
    );
    assert_eq!(report.errors.len(), 1, "{report:?}");
    assert!(report.warnings.iter().any(|w| w.contains("base_url")));
}

#[test]
fn missing_cli_binary_is_an_error() {
    let file = write_config(
        r#"
[llm]
default_role = "coder"
[llm.providers.codex]
type = "codex_cli"
command = "definitely-not-a-real-binary-xyz"
[llm.roles.coder]
provider = "codex"
"#,
    );
    let report = check_config(file.path(), None, &ProviderRegistry::with_builtins());
    assert!(
        report
            .errors
            .iter()
            .any(|e| e.contains("definitely-not-a-real-binary-xyz"))
    );
}

#[test]
fn unknown_provider_type_is_a_warning() {
    let file = write_config(
        r#"
[llm]
default_role = "planner"
[llm.providers.odd]
type = "carrier_pigeon"
[llm.roles.planner]
provider = "odd"
"#,
    );
    let report = check_config(file.path(), None, &ProviderRegistry::with_builtins());
    assert!(report.is_healthy(), "{report:?}");
    assert!(report.warnings.iter().any(|w| w.contains("carrier_pigeon")));
}

/// Host adapter that insists on an `endpoint` setting.
struct StrictProvider;

impl Provider for StrictProvider {
    fn name(&self) -> &str {
        "strict"
    }

    fn supported_types(&self) -> &[&'static str] {
        &["strict"]
    }

    fn validate_config(&self, settings: &Settings) -> anyhow::Result<()> {
        anyhow::ensure!(settings.contains_key("endpoint"), "missing 'endpoint'");
        Ok(())
    }

    fn complete(&self, request: &LlmRequest, _settings: &Settings) -> anyhow::Result<LlmResponse> {
        Ok(LlmResponse::new("ok", &request.request_id))
    }
}

#[test]
fn registered_adapter_validates_its_settings() {
    let file = write_config(
        r#"
[llm]
default_role = "planner"
[llm.providers.custom]
type = "strict"
[llm.providers.mock]
type = "mock"
[llm.roles.planner]
provider = "custom"
"#,
    );
    let mut registry = ProviderRegistry::new();
    registry.register("strict", || Arc::new(StrictProvider) as Arc<dyn Provider>);
    registry.register("mock", || Arc::new(MockProvider) as Arc<dyn Provider>);

    let report = check_config(file.path(), None, &registry);
    assert_eq!(report.errors, vec!["provider 'custom': missing 'endpoint'"]);
    assert!(report.warnings.is_empty());
}

#[test]
fn dry_run_failure_is_reported_with_its_kind() {
    let file = write_config(
        r#"
[llm]
default_role = "absent"
[llm.providers.mock]
type = "mock"
[llm.roles.planner]
provider = "mock"
"#,
    );
    let report = check_config(file.path(), Some("ghost"), &ProviderRegistry::with_builtins());
    assert_eq!(report.errors.len(), 1, "{report:?}");
    assert!(report.errors[0].starts_with("dry-run failed for role 'ghost': [PROVIDER_ERROR]"));
}

#[test]
fn missing_config_file_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let report = check_config(
        &dir.path().join("nope.toml"),
        None,
        &ProviderRegistry::with_builtins(),
    );
    assert_eq!(report.errors.len(), 1);
    assert!(report.errors[0].starts_with("config invalid"));
}

#[test]
fn template_is_a_loadable_config() {
    let config = LlmConfig::from_toml_str(template()).unwrap();
    assert_eq!(config.providers["openrouter"].provider_type, "openrouter_http");
    assert_eq!(config.roles["planner"].fallback_providers, vec!["codex"]);
}

#[test]
fn recent_traces_lists_newest_first_with_limit() {
    let traces = tempfile::tempdir().unwrap();
    let router = Router::new(
        LlmConfig::from_toml_str(
            r#"
[llm]
default_role = "planner"
[llm.providers.mock]
type = "mock"
[llm.roles.planner]
provider = "mock"
model = "m"
"#,
        )
        .unwrap(),
    )
    .with_trace_dir(traces.path());

    for _ in 0..3 {
        router
            .complete("planner", vec![Message::user("hi")], RequestOverrides::default())
            .unwrap();
    }

    let files = recent_trace_files(traces.path(), 2).unwrap();
    assert_eq!(files.len(), 2);
    for path in files {
        let record: TraceRecord =
            serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();
        let line = summarize(&record);
        assert!(line.contains("planner"));
        assert!(line.contains("OK"));
    }
}
