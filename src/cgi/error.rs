//! Per-request failure taxonomy.
//!
//! Every variant is terminal for its request and never retried. Each maps to
//! exactly one HTTP status; none of them is fatal to the gateway process.

use std::io;
use std::time::Duration;

use axum::http::StatusCode;
use thiserror::Error;

use crate::cgi::decoder::DecodeError;

/// Errors that end a single gateway request.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// The request body ended before the declared length was delivered.
    #[error("request body ended after {received} of {expected} bytes")]
    TruncatedBody { expected: u64, received: u64 },

    /// The handler process could not be started.
    #[error("failed to spawn handler '{program}': {source}")]
    SpawnFailure { program: String, source: io::Error },

    /// The handler did not exit before its deadline and was killed.
    #[error("handler exceeded its {0:?} deadline")]
    Timeout(Duration),

    /// The handler's output could not be decoded.
    #[error("malformed handler output: {0}")]
    MalformedOutput(#[from] DecodeError),

    /// The declared or observed body length exceeds the configured maximum.
    #[error("request body of {size} bytes exceeds the {limit} byte limit")]
    OversizeBody { size: u64, limit: u64 },

    /// A pipe to the handler failed mid-exchange.
    #[error("handler pipe error: {0}")]
    Io(#[from] io::Error),
}

impl GatewayError {
    /// HTTP status reported to the client for this failure.
    pub fn status(&self) -> StatusCode {
        match self {
            GatewayError::TruncatedBody { .. } => StatusCode::BAD_REQUEST,
            GatewayError::SpawnFailure { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            GatewayError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            GatewayError::MalformedOutput(_) => StatusCode::BAD_GATEWAY,
            GatewayError::OversizeBody { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            GatewayError::Io(_) => StatusCode::BAD_GATEWAY,
        }
    }

    /// Short label for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            GatewayError::TruncatedBody { .. } => "truncated_body",
            GatewayError::SpawnFailure { .. } => "spawn_failure",
            GatewayError::Timeout(_) => "timeout",
            GatewayError::MalformedOutput(_) => "malformed_output",
            GatewayError::OversizeBody { .. } => "oversize_body",
            GatewayError::Io(_) => "io",
        }
    }
}
