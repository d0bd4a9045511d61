//! Request admission limits.
//!
//! # Responsibilities
//! - Reject methods outside the allowed set (405 + `Allow`)
//! - Reject bodies over the configured maximum before any handler is spawned
//! - Spool bodies of unknown length, bounded by the same maximum
//!
//! # Design Decisions
//! - A declared `Content-Length` is checked before a single body byte is read
//! - Rejected bodies are drained (bounded in bytes and time) so the client
//!   finishes sending and actually sees the 413

use std::io;
use std::time::Duration;

use axum::body::Bytes;
use axum::http::{HeaderValue, Method};
use futures_util::{Stream, StreamExt};

use crate::cgi::error::GatewayError;
use crate::config::LimitsConfig;

/// Most bytes read from a rejected body before giving up on it.
const DRAIN_BUDGET: u64 = 8 * 1024 * 1024;
const DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Admission checks applied to every request.
#[derive(Debug, Clone)]
pub struct RequestLimits {
    max_body_size: u64,
    allowed_methods: Vec<Method>,
}

impl RequestLimits {
    pub fn new(max_body_size: u64, allowed_methods: Vec<Method>) -> Self {
        Self {
            max_body_size,
            allowed_methods,
        }
    }

    /// Build from configuration. Method tokens were validated at load time;
    /// any that still fail to parse are skipped.
    pub fn from_config(config: &LimitsConfig) -> Self {
        let allowed_methods = config
            .allowed_methods
            .iter()
            .filter_map(|m| Method::from_bytes(m.to_ascii_uppercase().as_bytes()).ok())
            .collect();
        Self::new(config.max_body_size, allowed_methods)
    }

    pub fn is_allowed(&self, method: &Method) -> bool {
        self.allowed_methods.contains(method)
    }

    /// Value for the `Allow` header of a 405 response.
    pub fn allow_header(&self) -> HeaderValue {
        let joined = self
            .allowed_methods
            .iter()
            .map(Method::as_str)
            .collect::<Vec<_>>()
            .join(", ");
        HeaderValue::from_str(&joined).unwrap_or_else(|_| HeaderValue::from_static(""))
    }

    /// Check a declared body length against the maximum.
    pub fn check_declared(&self, declared_length: Option<u64>) -> Result<(), GatewayError> {
        match declared_length {
            Some(size) if size > self.max_body_size => Err(GatewayError::OversizeBody {
                size,
                limit: self.max_body_size,
            }),
            _ => Ok(()),
        }
    }

    /// Read a body of unknown length into memory, failing as soon as it grows
    /// past the maximum.
    pub async fn spool<S>(&self, mut source: S) -> Result<Bytes, GatewayError>
    where
        S: Stream<Item = io::Result<Bytes>> + Unpin,
    {
        let mut buf = Vec::new();
        while let Some(chunk) = source.next().await {
            let chunk = chunk.map_err(|e| {
                tracing::debug!(error = %e, received = buf.len(), "Body of unknown length failed");
                GatewayError::TruncatedBody {
                    expected: buf.len() as u64,
                    received: buf.len() as u64,
                }
            })?;

            let size = (buf.len() + chunk.len()) as u64;
            if size > self.max_body_size {
                return Err(GatewayError::OversizeBody {
                    size,
                    limit: self.max_body_size,
                });
            }
            buf.extend_from_slice(&chunk);
        }
        Ok(Bytes::from(buf))
    }
}

/// Discard what is left of a rejected body. Returns the bytes read.
pub async fn drain<S>(mut source: S) -> u64
where
    S: Stream<Item = io::Result<Bytes>> + Unpin,
{
    let mut read: u64 = 0;
    let consume = async {
        while let Some(Ok(chunk)) = source.next().await {
            read += chunk.len() as u64;
            if read >= DRAIN_BUDGET {
                break;
            }
        }
    };
    if tokio::time::timeout(DRAIN_TIMEOUT, consume).await.is_err() {
        tracing::debug!("Gave up draining rejected body");
    }
    read
}
