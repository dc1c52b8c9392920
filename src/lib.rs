//! Routes logical role requests to interchangeable completion backends
//! with a pluggable selection policy, a bounded fallback chain and
//! per-attempt tracing.

pub mod client;
pub mod compression;
pub mod config;
pub mod dispatch;
pub mod doctor;
pub mod error;
pub mod events;
pub mod policy;
pub mod request;
pub mod response;
pub mod router;
pub mod trace;

pub use client::LlmClient;
pub use config::{ConfigError, LlmConfig, ProviderConfig, RoleConfig};
pub use dispatch::registry::ProviderRegistry;
pub use dispatch::{Provider, Settings};
pub use error::{FailureKind, RouterError};
pub use events::{EventSink, RouterEvent, TokenUsageHook};
pub use policy::{ProviderChoice, RoutingPolicy, SimpleRoutingPolicy};
pub use request::{LlmRequest, Message, RequestOverrides};
pub use response::{LlmResponse, Usage};
pub use router::Router;
pub use trace::{LocalFileTraceStore, TraceRecord, TraceStore};
