//! The gateway's view of one inbound request.

use std::net::SocketAddr;

use axum::http::{header, HeaderMap, Method};

/// Request metadata handed to the gateway. The body travels separately as a stream.
#[derive(Debug, Clone)]
pub struct CgiRequest {
    pub method: Method,
    /// Path component of the target, e.g. `/cgi/info.py`.
    pub path: String,
    /// Raw query string without the leading `?`; empty when absent.
    pub query: String,
    /// Case-insensitive, multi-valued header map.
    pub headers: HeaderMap,
    /// Body length if known. `None` means no body.
    pub declared_length: Option<u64>,
    pub remote_addr: Option<SocketAddr>,
}

impl CgiRequest {
    /// Build a request with no headers and no body.
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: String::new(),
            headers: HeaderMap::new(),
            declared_length: None,
            remote_addr: None,
        }
    }

    /// Target as it appeared on the request line.
    pub fn request_uri(&self) -> String {
        if self.query.is_empty() {
            self.path.clone()
        } else {
            format!("{}?{}", self.path, self.query)
        }
    }
}

/// `Content-Length` of a header map, if present and numeric.
pub fn declared_length(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse().ok())
}
