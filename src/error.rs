use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Classification attached to every error the router surfaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FailureKind {
    Timeout,
    RateLimit,
    ProviderError,
    InvalidResponse,
    /// Schema or parse mismatch. Never retried, never falls back.
    ContractViolation,
    Cancelled,
    Unknown,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Timeout => "TIMEOUT",
            Self::RateLimit => "RATE_LIMIT",
            Self::ProviderError => "PROVIDER_ERROR",
            Self::InvalidResponse => "INVALID_RESPONSE",
            Self::ContractViolation => "CONTRACT_VIOLATION",
            Self::Cancelled => "CANCELLED",
            Self::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum RouterError {
    #[error("{0}")]
    Timeout(String),

    #[error("{0}")]
    RateLimited(String),

    #[error("{0}")]
    Provider(String),

    #[error("{0}")]
    InvalidResponse(String),

    #[error("{0}")]
    ContractViolation(String),

    #[error("{0}")]
    Cancelled(String),

    /// A failure the provider did not classify itself.
    #[error("{message}")]
    Unknown {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
    },
}

impl RouterError {
    /// Build an error of the given kind carrying `message`.
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        let message = message.into();
        match kind {
            FailureKind::Timeout => Self::Timeout(message),
            FailureKind::RateLimit => Self::RateLimited(message),
            FailureKind::ProviderError => Self::Provider(message),
            FailureKind::InvalidResponse => Self::InvalidResponse(message),
            FailureKind::ContractViolation => Self::ContractViolation(message),
            FailureKind::Cancelled => Self::Cancelled(message),
            FailureKind::Unknown => Self::Unknown {
                message,
                source: None,
            },
        }
    }

    /// Wrap an error that reached the router without a classification.
    pub fn unclassified(err: anyhow::Error) -> Self {
        Self::Unknown {
            message: format!("{err:#}"),
            source: Some(err.into()),
        }
    }

    /// Split a provider failure into a classified router error.
    /// Errors that are not already a `RouterError` become `Unknown`;
    /// the flag reports whether the provider classified the failure.
    pub fn classify(err: anyhow::Error) -> (Self, bool) {
        match err.downcast::<RouterError>() {
            Ok(classified) => (classified, true),
            Err(other) => (Self::unclassified(other), false),
        }
    }

    pub fn kind(&self) -> FailureKind {
        match self {
            Self::Timeout(_) => FailureKind::Timeout,
            Self::RateLimited(_) => FailureKind::RateLimit,
            Self::Provider(_) => FailureKind::ProviderError,
            Self::InvalidResponse(_) => FailureKind::InvalidResponse,
            Self::ContractViolation(_) => FailureKind::ContractViolation,
            Self::Cancelled(_) => FailureKind::Cancelled,
            Self::Unknown { .. } => FailureKind::Unknown,
        }
    }

    /// False only for contract violations, which end the fallback chain.
    pub fn is_retryable(&self) -> bool {
        self.kind() != FailureKind::ContractViolation
    }

    /// Message safe to show to end users, prefixed with the failure kind.
    /// Long upstream bodies are cut to keep the message readable.
    pub fn user_message(&self) -> String {
        let text = self.to_string();
        let preview: String = text.chars().take(200).collect();
        let suffix = if preview.len() < text.len() { "..." } else { "" };
        format!("[{}] {preview}{suffix}", self.kind())
    }
}
