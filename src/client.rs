use std::path::PathBuf;

use crate::config::LlmConfig;
use crate::error::RouterError;
use crate::request::{Message, RequestOverrides};
use crate::response::LlmResponse;
use crate::router::Router;

/// Thin wrapper keeping the older `LlmClient` call signature.
#[derive(Debug)]
pub struct LlmClient {
    router: Router,
}

impl LlmClient {
    pub fn new(config: LlmConfig, workspace: Option<String>, trace_dir: Option<PathBuf>) -> Self {
        let mut router = Router::new(config);
        if let Some(workspace) = workspace {
            router = router.with_workspace(workspace);
        }
        if let Some(dir) = trace_dir {
            router = router.with_trace_dir(dir);
        }
        Self { router }
    }

    pub fn complete(
        &self,
        role: &str,
        messages: Vec<Message>,
        overrides: RequestOverrides,
    ) -> Result<LlmResponse, RouterError> {
        self.router.complete(role, messages, overrides)
    }

    pub fn router(&self) -> &Router {
        &self.router
    }
}
