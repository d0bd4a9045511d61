//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts in 1..=3600, addresses parse)
//! - Reject interpreter paths that depend on the working directory
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: GatewayConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;
use std::path::Path;

use axum::http::Method;
use thiserror::Error;

use crate::config::schema::GatewayConfig;

/// Longest handler budget accepted, in seconds.
pub const MAX_TIMEOUT_SECS: u64 = 3600;

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Check the configuration, collecting every error found.
pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_addresses.is_empty() {
        errors.push(ValidationError::new(
            "listener.bind_addresses",
            "at least one bind address is required",
        ));
    }
    for addr in &config.listener.bind_addresses {
        if addr.parse::<SocketAddr>().is_err() {
            errors.push(ValidationError::new(
                "listener.bind_addresses",
                format!("'{}' is not a socket address", addr),
            ));
        }
    }

    if config.cgi.timeout_secs == 0 {
        errors.push(ValidationError::new("cgi.timeout_secs", "must be greater than 0"));
    } else if config.cgi.timeout_secs > MAX_TIMEOUT_SECS {
        errors.push(ValidationError::new(
            "cgi.timeout_secs",
            format!("must be at most {}", MAX_TIMEOUT_SECS),
        ));
    }
    if config.cgi.document_root.is_empty() {
        errors.push(ValidationError::new("cgi.document_root", "must not be empty"));
    }
    for (ext, interpreter) in &config.cgi.interpreters {
        if !Path::new(interpreter).is_absolute() {
            errors.push(ValidationError::new(
                format!("cgi.interpreters.{}", ext),
                format!("interpreter '{}' must be an absolute path", interpreter),
            ));
        }
    }

    for method in &config.limits.allowed_methods {
        if Method::from_bytes(method.as_bytes()).is_err() {
            errors.push(ValidationError::new(
                "limits.allowed_methods",
                format!("'{}' is not a valid method token", method),
            ));
        }
    }

    if config.upload.enabled {
        if !config.upload.path.starts_with('/') {
            errors.push(ValidationError::new("upload.path", "must start with '/'"));
        }
        if config.upload.max_attempts == 0 {
            errors.push(ValidationError::new("upload.max_attempts", "must be greater than 0"));
        }
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            "is not a socket address",
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
