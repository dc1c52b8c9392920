//! Per-attempt trace records and their persistence.
//!
//! [`TraceRecord::start`] opens a record when an attempt begins;
//! [`TraceRecord::record_success`] or [`TraceRecord::record_error`] fills it
//! in once the attempt ends. Neither touches the filesystem: writing is the
//! job of the [`TraceStore`] the router was given.

use std::path::{Path, PathBuf};

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{FailureKind, RouterError};
use crate::request::LlmRequest;
use crate::response::{LlmResponse, Usage};

/// Default trace directory, relative to the workspace or the current dir.
pub const TRACE_SUBDIR: &str = ".llm-router/traces";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceRecord {
    pub request_id: String,
    pub role: String,
    pub provider: String,
    pub model: String,
    /// RFC 3339, UTC.
    pub started_at: String,
    /// Index in the candidate list; 0 is the primary provider.
    pub attempt: usize,
    pub work_package_id: Option<String>,
    pub workspace: Option<String>,
    pub elapsed_ms: Option<f64>,
    pub failure_type: Option<FailureKind>,
    pub error: Option<String>,
    pub usage: Option<Usage>,
}

impl TraceRecord {
    /// Open the record for one attempt and log `llm.complete.start`.
    pub fn start(request: &LlmRequest, provider: &str, attempt: usize) -> Self {
        let trace = Self {
            request_id: request.request_id.clone(),
            role: request.role.clone(),
            provider: provider.to_string(),
            model: request.model.clone(),
            started_at: Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true),
            attempt,
            work_package_id: request.work_package_id.clone(),
            workspace: request.workspace.clone(),
            elapsed_ms: None,
            failure_type: None,
            error: None,
            usage: None,
        };
        tracing::info!(
            event = "llm.complete.start",
            request_id = %trace.request_id,
            role = %trace.role,
            provider = %trace.provider,
            attempt = trace.attempt,
            model = %trace.model,
            work_package_id = trace.work_package_id.as_deref(),
            "llm.complete.start"
        );
        trace
    }

    pub fn record_success(&mut self, response: &LlmResponse, elapsed_ms: f64) {
        self.elapsed_ms = Some(elapsed_ms);
        self.usage = Some(response.usage);
        tracing::info!(
            event = "llm.complete.success",
            request_id = %self.request_id,
            role = %self.role,
            provider = %self.provider,
            attempt = self.attempt,
            model = %self.model,
            elapsed_ms,
            prompt_tokens = response.usage.prompt_tokens,
            completion_tokens = response.usage.completion_tokens,
            total_tokens = response.usage.total_tokens,
            "llm.complete.success"
        );
    }

    pub fn record_error(&mut self, error: &RouterError, elapsed_ms: f64) {
        self.elapsed_ms = Some(elapsed_ms);
        self.failure_type = Some(error.kind());
        self.error = Some(error.to_string());
        tracing::error!(
            event = "llm.complete.error",
            request_id = %self.request_id,
            role = %self.role,
            provider = %self.provider,
            attempt = self.attempt,
            model = %self.model,
            elapsed_ms,
            failure_type = %error.kind(),
            error = %error,
            "llm.complete.error"
        );
    }

    pub fn succeeded(&self) -> bool {
        self.error.is_none() && self.failure_type.is_none()
    }
}

/// Persists finished trace records, one per attempt.
///
/// Implementations must tolerate concurrent calls when the host runs
/// several completions in parallel, and writing the same
/// (request id, attempt) twice must leave a single record.
pub trait TraceStore: Send + Sync {
    fn write(&self, trace: &TraceRecord) -> anyhow::Result<()>;
}

/// Writes each record as pretty JSON to
/// `<dir>/YYYYMMDD/<request_id>-<attempt>-<provider>.json`.
#[derive(Debug, Clone, Default)]
pub struct LocalFileTraceStore {
    trace_dir: Option<PathBuf>,
}

impl LocalFileTraceStore {
    /// Store rooted at the workspace (or current dir) default location.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            trace_dir: Some(dir.into()),
        }
    }

    /// Directory records for `workspace` land in.
    pub fn resolve_dir(&self, workspace: Option<&str>) -> PathBuf {
        match (&self.trace_dir, workspace) {
            (Some(dir), _) => dir.clone(),
            (None, Some(ws)) if !ws.is_empty() => Path::new(ws).join(TRACE_SUBDIR),
            _ => PathBuf::from(TRACE_SUBDIR),
        }
    }

    /// Write `trace` and return the file it was written to.
    pub fn write_file(&self, trace: &TraceRecord) -> anyhow::Result<PathBuf> {
        let out_dir = self
            .resolve_dir(trace.workspace.as_deref())
            .join(Utc::now().format("%Y%m%d").to_string());
        std::fs::create_dir_all(&out_dir)?;

        let path = out_dir.join(trace_file_name(trace));
        let content = serde_json::to_string_pretty(trace)?;
        atomic_write(&path, &content)?;
        Ok(path)
    }
}

impl TraceStore for LocalFileTraceStore {
    fn write(&self, trace: &TraceRecord) -> anyhow::Result<()> {
        self.write_file(trace).map(|_| ())
    }
}

pub fn trace_file_name(trace: &TraceRecord) -> String {
    let provider_slug = if trace.provider.is_empty() {
        "provider".to_string()
    } else {
        trace.provider.replace('/', "_")
    };
    format!("{}-{}-{provider_slug}.json", trace.request_id, trace.attempt)
}

/// Atomic write: write to temp file, then rename.
/// Temp filename includes PID to avoid cross-process collisions.
fn atomic_write(path: &Path, content: &str) -> std::io::Result<()> {
    let tmp_path = path.with_extension(format!("tmp.{}", std::process::id()));
    std::fs::write(&tmp_path, content.as_bytes())?;
    if let Err(e) = std::fs::rename(&tmp_path, path) {
        let _ = std::fs::remove_file(&tmp_path);
        return Err(e);
    }
    Ok(())
}
