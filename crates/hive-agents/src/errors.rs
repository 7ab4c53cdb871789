//! Error taxonomy for the orchestration layer.
//!
//! Provider and worker errors never escape a batch: the worker converts
//! them into an `ERROR` [`WorkResult`](coordination::types::WorkResult)
//! using [`WorkerError::kind`]. Only [`ConfigError`] stops a run before
//! it starts.
//!
//! | Error                          | Work kind            |
//! |--------------------------------|----------------------|
//! | `WorkerError::Timeout`         | `timeout`            |
//! | `ProviderError::Transport`     | `transport`          |
//! | `ProviderError::Status`        | `transport`          |
//! | `ProviderError::Configuration` | `transport`          |
//! | `ProviderError::Malformed`     | `malformed_response` |
//! | `WorkerError::LimiterClosed`   | `internal`           |

use std::time::Duration;

use coordination::types::WorkErrorKind;
use thiserror::Error;

/// Failure of a single generation or embedding call.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Network failure, connection reset, client-side timeout.
    #[error("transport failure: {0}")]
    Transport(String),

    /// Provider answered with a non-success HTTP status (quota, auth, 5xx).
    #[error("provider returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// Provider answered but the payload was unusable.
    #[error("malformed provider response: {0}")]
    Malformed(String),

    /// The client could not be built from the given settings.
    #[error("provider client misconfigured: {0}")]
    Configuration(String),
}

impl ProviderError {
    pub fn status(status: u16, body: impl Into<String>) -> Self {
        Self::Status {
            status,
            body: body.into(),
        }
    }

    pub fn kind(&self) -> WorkErrorKind {
        match self {
            Self::Malformed(_) => WorkErrorKind::MalformedResponse,
            Self::Transport(_) | Self::Status { .. } | Self::Configuration(_) => {
                WorkErrorKind::Transport
            }
        }
    }

    /// HTTP 429, the usual quota signal.
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::Status { status: 429, .. })
    }
}

/// Why a worker produced an `ERROR` record.
#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("generation timed out after {}s", .0.as_secs_f64())]
    Timeout(Duration),

    #[error("generation failed: {0}")]
    Generation(#[source] ProviderError),

    #[error("embedding failed: {0}")]
    Embedding(#[source] ProviderError),

    #[error("concurrency limiter closed before a slot was granted")]
    LimiterClosed,
}

impl WorkerError {
    pub fn kind(&self) -> WorkErrorKind {
        match self {
            Self::Timeout(_) => WorkErrorKind::Timeout,
            Self::Generation(e) | Self::Embedding(e) => e.kind(),
            Self::LimiterClosed => WorkErrorKind::Internal,
        }
    }
}

/// Configuration rejected by [`HiveConfig::validate`](crate::config::HiveConfig::validate).
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigError {
    #[error("invalid `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },

    #[error("live mode requires an API key (set HIVE_API_KEY or OPENAI_API_KEY)")]
    MissingApiKey,
}

impl ConfigError {
    pub fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field,
            reason: reason.into(),
        }
    }
}
