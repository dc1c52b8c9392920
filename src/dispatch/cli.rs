use std::time::Duration;

use serde_json::json;
use tokio::io::AsyncReadExt;
use tokio::process::Command;

use crate::dispatch::{Provider, ProviderFuture, Settings, preview, setting_str};
use crate::error::{FailureKind, RouterError};
use crate::request::LlmRequest;
use crate::response::{LlmResponse, Usage};

pub const MAX_OUTPUT_BYTES: usize = 2 * 1024 * 1024; // 2MB

pub const DEFAULT_COMMAND: &str = "codex";
pub const DEFAULT_MODEL_FLAG: &str = "--model";
pub const DEFAULT_OUTPUT_FLAG: &str = "--output-last-message";

/// Runs the Codex CLI as a subprocess and returns its stdout.
///
/// Settings: `command`, `model_flag`, `output_flag` (empty string disables it).
/// The prompt is the last user message.
#[derive(Debug, Default, Clone, Copy)]
pub struct CodexCliProvider;

struct CliOutput {
    stdout: String,
    stderr: String,
    code: i32,
}

/// Build argv (without the executable). No shell is involved.
pub fn build_args(request: &LlmRequest, settings: &Settings) -> Vec<String> {
    let model_flag = setting_str(settings, "model_flag").unwrap_or(DEFAULT_MODEL_FLAG);
    let output_flag = setting_str(settings, "output_flag").unwrap_or(DEFAULT_OUTPUT_FLAG);

    let mut args = Vec::new();
    if !request.model.is_empty() {
        args.push(model_flag.to_string());
        args.push(request.model.clone());
    }
    if !output_flag.is_empty() {
        args.push(output_flag.to_string());
    }
    args.push(request.last_user_prompt().to_string());
    args
}

/// Kill the whole process group, not just the leader: grandchildren
/// holding the pipes open would otherwise block the readers.
fn kill_group(pid: Option<u32>) {
    if let Some(pid) = pid {
        unsafe {
            libc::kill(-(pid as i32), libc::SIGKILL);
        }
    }
}

async fn run_command(
    executable: &str,
    args: &[String],
    timeout: Duration,
) -> Result<CliOutput, RouterError> {
    let mut cmd = Command::new(executable);
    cmd.args(args)
        .stdin(std::process::Stdio::null())
        .stdout(std::process::Stdio::piped())
        .stderr(std::process::Stdio::piped())
        .process_group(0)
        .kill_on_drop(true);

    let mut child = cmd.spawn().map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            RouterError::new(
                FailureKind::ProviderError,
                format!("Codex CLI binary not found: '{executable}'"),
            )
        } else {
            RouterError::new(
                FailureKind::ProviderError,
                format!("failed to spawn {executable}: {e}"),
            )
        }
    })?;

    let child_pid = child.id();
    let (Some(stdout_pipe), Some(stderr_pipe)) = (child.stdout.take(), child.stderr.take()) else {
        kill_group(child_pid);
        return Err(RouterError::new(
            FailureKind::ProviderError,
            format!("failed to capture output of {executable}"),
        ));
    };

    let read_future = async {
        let stdout_handle = tokio::spawn(async move {
            let mut buf = Vec::with_capacity(64 * 1024);
            let mut capped = stdout_pipe.take(MAX_OUTPUT_BYTES as u64);
            if let Err(e) = capped.read_to_end(&mut buf).await {
                tracing::warn!("stdout pipe read error: {e}");
            }
            buf
        });
        let stderr_handle = tokio::spawn(async move {
            let mut buf = Vec::with_capacity(8 * 1024);
            let mut capped = stderr_pipe.take(MAX_OUTPUT_BYTES as u64);
            if let Err(e) = capped.read_to_end(&mut buf).await {
                tracing::warn!("stderr pipe read error: {e}");
            }
            buf
        });

        let mut stdout_handle = stdout_handle;
        let mut stderr_handle = stderr_handle;

        // If either stream hits the cap the child may block on a full pipe;
        // kill it so the other reader sees EOF.
        let (stdout_buf, stderr_buf) = tokio::select! {
            result = &mut stdout_handle => {
                let buf = result.unwrap_or_default();
                if buf.len() >= MAX_OUTPUT_BYTES {
                    kill_group(child_pid);
                }
                (buf, stderr_handle.await.unwrap_or_default())
            }
            result = &mut stderr_handle => {
                let buf = result.unwrap_or_default();
                if buf.len() >= MAX_OUTPUT_BYTES {
                    kill_group(child_pid);
                }
                (stdout_handle.await.unwrap_or_default(), buf)
            }
        };
        let status = child.wait().await?;
        Ok::<_, std::io::Error>((stdout_buf, stderr_buf, status))
    };

    let (stdout, stderr, status) = match tokio::time::timeout(timeout, read_future).await {
        Ok(result) => result.map_err(|e| {
            RouterError::new(
                FailureKind::ProviderError,
                format!("failed to read from {executable}: {e}"),
            )
        })?,
        Err(_) => {
            kill_group(child_pid);
            return Err(RouterError::new(
                FailureKind::Timeout,
                format!("Codex CLI timed out after {:.1}s", timeout.as_secs_f64()),
            ));
        }
    };

    Ok(CliOutput {
        stdout: String::from_utf8_lossy(&stdout).into_owned(),
        stderr: String::from_utf8_lossy(&stderr).into_owned(),
        code: status.code().unwrap_or(-1),
    })
}

impl CodexCliProvider {
    async fn run(&self, request: &LlmRequest, settings: &Settings) -> anyhow::Result<LlmResponse> {
        let executable = setting_str(settings, "command").unwrap_or(DEFAULT_COMMAND);
        let args = build_args(request, settings);

        let output = run_command(executable, &args, request.timeout).await?;

        if output.code != 0 {
            tracing::warn!(executable, code = output.code, "CLI process failed");
            return Err(RouterError::new(
                FailureKind::ProviderError,
                format!(
                    "Codex CLI exited {}: {}",
                    output.code,
                    preview(&output.stderr, 200)
                ),
            )
            .into());
        }
        if !output.stderr.is_empty() {
            tracing::debug!(executable, stderr = %output.stderr, "CLI stderr output");
        }

        let text = output.stdout.trim();
        if text.is_empty() {
            return Err(RouterError::new(
                FailureKind::InvalidResponse,
                "Codex CLI returned empty output",
            )
            .into());
        }

        Ok(LlmResponse {
            text: text.to_string(),
            raw: json!({
                "stdout": output.stdout,
                "stderr": output.stderr,
                "returncode": output.code,
            }),
            usage: Usage::default(),
            request_id: request.request_id.clone(),
            model: request.model.clone(),
            provider: "codex_cli".to_string(),
        })
    }
}

impl Provider for CodexCliProvider {
    fn name(&self) -> &str {
        "codex_cli"
    }

    fn supported_types(&self) -> &[&'static str] {
        &["codex_cli"]
    }

    fn validate_config(&self, settings: &Settings) -> anyhow::Result<()> {
        if !settings.contains_key("command") {
            return Err(RouterError::new(
                FailureKind::ProviderError,
                "codex_cli provider missing required config key: 'command'",
            )
            .into());
        }
        Ok(())
    }

    /// Drives the async runner on a private current-thread runtime.
    fn complete(&self, request: &LlmRequest, settings: &Settings) -> anyhow::Result<LlmResponse> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| {
                RouterError::new(
                    FailureKind::ProviderError,
                    format!("failed to start subprocess runtime: {e}"),
                )
            })?;
        runtime.block_on(self.run(request, settings))
    }

    fn complete_async<'a>(
        &'a self,
        request: &'a LlmRequest,
        settings: &'a Settings,
    ) -> Option<ProviderFuture<'a>> {
        Some(Box::pin(self.run(request, settings)))
    }
}
