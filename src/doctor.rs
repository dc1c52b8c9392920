//! Config and environment diagnostics behind the `llm-router` binary.

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use crate::config::LlmConfig;
use crate::dispatch::Provider;
use crate::dispatch::mock::MockProvider;
use crate::dispatch::registry::ProviderRegistry;
use crate::dispatch::setting_str;
use crate::error::RouterError;
use crate::policy::resolve_role;
use crate::request::{LlmRequest, Message};
use crate::trace::{TRACE_SUBDIR, TraceRecord};

const TEMPLATE: &str = include_str!("../templates/llm.example.toml");

/// Blocking errors and informational warnings found by [`check_config`].
#[derive(Debug, Default, Clone, PartialEq)]
pub struct DoctorReport {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl DoctorReport {
    pub fn is_healthy(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Validate a config file and the environment its providers need, then dry
/// run `role` (or the default role) against the mock provider.
pub fn check_config(path: &Path, role: Option<&str>, registry: &ProviderRegistry) -> DoctorReport {
    let mut report = DoctorReport::default();

    let config = match LlmConfig::load(path) {
        Ok(config) => config,
        Err(e) => {
            report.errors.push(format!("config invalid: {e}"));
            return report;
        }
    };

    let mut names: Vec<&String> = config.providers.keys().collect();
    names.sort();
    for name in names {
        let provider = &config.providers[name];
        match provider.provider_type.as_str() {
            "openrouter_http" | "openai_http" => {
                if let Some(var) = setting_str(&provider.raw, "api_key_env")
                    && std::env::var(var).map(|v| v.is_empty()).unwrap_or(true)
                {
                    report
                        .errors
                        .push(format!("provider '{name}': env var '{var}' is not set"));
                }
                if setting_str(&provider.raw, "base_url").is_none() {
                    report
                        .warnings
                        .push(format!("provider '{name}': 'base_url' not set, will use default"));
                }
            }
            "codex_cli" => {
                let command = setting_str(&provider.raw, "command").unwrap_or("codex");
                if !which_exists(command) {
                    report.errors.push(format!(
                        "provider '{name}': binary '{command}' not found in PATH"
                    ));
                }
            }
            "mock" => {}
            other if !registry.contains(other) => {
                let suggestions = registry.suggest(other);
                let hint = if suggestions.is_empty() {
                    String::new()
                } else {
                    format!(" (did you mean: {}?)", suggestions.join(", "))
                };
                report.warnings.push(format!(
                    "provider '{name}': unknown type '{other}', cannot validate{hint}"
                ));
            }
            // Adapters registered by the host validate their own settings.
            other => {
                if let Err(e) = registry
                    .get(other)
                    .map_err(anyhow::Error::from)
                    .and_then(|adapter| adapter.validate_config(&provider.raw))
                {
                    report.errors.push(format!("provider '{name}': {e}"));
                }
            }
        }
    }

    let target = role.unwrap_or(&config.default_role);
    let dry_run = resolve_role(target, &config).map_err(anyhow::Error::from).and_then(|role_cfg| {
        let mut request = LlmRequest::from_role(role_cfg, vec![Message::user("doctor dry-run")]);
        request.role = target.to_string();
        MockProvider.complete(&request, &Default::default())
    });
    if let Err(e) = dry_run {
        let (error, _) = RouterError::classify(e);
        report.errors.push(format!(
            "dry-run failed for role '{target}': {}",
            error.user_message()
        ));
    }

    report
}

/// Bundled example configuration.
pub fn template() -> &'static str {
    TEMPLATE
}

/// Default trace directory used when none is given.
pub fn default_trace_dir() -> PathBuf {
    PathBuf::from(TRACE_SUBDIR)
}

/// Up to `limit` trace files under `dir`, newest first by mtime.
pub fn recent_trace_files(dir: &Path, limit: usize) -> std::io::Result<Vec<PathBuf>> {
    let mut files: Vec<(SystemTime, PathBuf)> = Vec::new();
    collect_json(dir, &mut files)?;
    files.sort_by(|a, b| b.0.cmp(&a.0));
    Ok(files.into_iter().take(limit).map(|(_, p)| p).collect())
}

fn collect_json(dir: &Path, out: &mut Vec<(SystemTime, PathBuf)>) -> std::io::Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        let meta = entry.metadata()?;
        if meta.is_dir() {
            collect_json(&path, out)?;
        } else if path.extension().is_some_and(|e| e == "json") {
            out.push((meta.modified().unwrap_or(SystemTime::UNIX_EPOCH), path));
        }
    }
    Ok(())
}

/// One-line summary of a trace record.
pub fn summarize(trace: &TraceRecord) -> String {
    let id: String = trace.request_id.chars().take(8).collect();
    let started: String = trace.started_at.chars().take(19).collect();
    let status = if trace.succeeded() { "OK" } else { "ERROR" };
    let elapsed = format!("{:.0}ms", trace.elapsed_ms.unwrap_or(0.0));
    let attempt = format!("a{}", trace.attempt);
    format!(
        "{id}  {started}  {:<12}  {:<20}  {attempt:<6}  {:<20}  {status:<6}  {elapsed}",
        trace.role, trace.provider, trace.model
    )
}

/// Check if an executable exists in PATH.
fn which_exists(name: &str) -> bool {
    std::process::Command::new("which")
        .arg(name)
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .status()
        .is_ok_and(|s| s.success())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FailureKind;
    use crate::response::LlmResponse;

    #[test]
    fn template_parses_as_config() {
        let config = LlmConfig::from_toml_str(template()).unwrap();
        assert_eq!(config.default_role, "planner");
        assert!(config.roles.contains_key("coder"));
    }

    #[test]
    fn summary_line_marks_errors() {
        let req = LlmRequest::new("planner", vec![Message::user("x")]);
        let mut ok = TraceRecord::start(&req, "mock", 0);
        ok.record_success(&LlmResponse::new("y", &req.request_id), 41.6);
        assert!(summarize(&ok).contains("OK"));
        assert!(summarize(&ok).contains("42ms"));

        let mut failed = TraceRecord::start(&req, "mock", 1);
        failed.record_error(&RouterError::new(FailureKind::Timeout, "late"), 5.0);
        let line = summarize(&failed);
        assert!(line.contains("ERROR"));
        assert!(line.contains("a1"));
    }
}
