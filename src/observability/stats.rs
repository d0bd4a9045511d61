//! Process-wide request counters.
//!
//! Created once at startup and handed to the server state; request code only
//! touches them through [`GatewayStats::record`].

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use axum::http::StatusCode;

#[derive(Debug, Default)]
struct Counters {
    requests: AtomicU64,
    success: AtomicU64,
    client_errors: AtomicU64,
    server_errors: AtomicU64,
    rejected_oversize: AtomicU64,
    timeouts: AtomicU64,
    uploads: AtomicU64,
}

/// Shared handle to the counters. Cloning shares them.
#[derive(Debug, Clone, Default)]
pub struct GatewayStats {
    inner: Arc<Counters>,
}

/// Point-in-time copy of the counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub requests: u64,
    pub success: u64,
    pub client_errors: u64,
    pub server_errors: u64,
    pub rejected_oversize: u64,
    pub timeouts: u64,
    pub uploads: u64,
}

impl GatewayStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one finished request by its response status.
    pub fn record(&self, status: StatusCode) {
        let c = &self.inner;
        c.requests.fetch_add(1, Ordering::Relaxed);
        if status.is_success() || status.is_redirection() {
            c.success.fetch_add(1, Ordering::Relaxed);
        } else if status.is_client_error() {
            c.client_errors.fetch_add(1, Ordering::Relaxed);
        } else if status.is_server_error() {
            c.server_errors.fetch_add(1, Ordering::Relaxed);
        }

        if status == StatusCode::PAYLOAD_TOO_LARGE {
            c.rejected_oversize.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Count a handler killed at its deadline. A handler that merely
    /// reports `Status: 504` is not a timeout.
    pub fn record_timeout(&self) {
        self.inner.timeouts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_upload(&self) {
        self.inner.uploads.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let c = &self.inner;
        StatsSnapshot {
            requests: c.requests.load(Ordering::Relaxed),
            success: c.success.load(Ordering::Relaxed),
            client_errors: c.client_errors.load(Ordering::Relaxed),
            server_errors: c.server_errors.load(Ordering::Relaxed),
            rejected_oversize: c.rejected_oversize.load(Ordering::Relaxed),
            timeouts: c.timeouts.load(Ordering::Relaxed),
            uploads: c.uploads.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts_by_class() {
        let stats = GatewayStats::new();
        let shared = stats.clone();

        stats.record(StatusCode::OK);
        shared.record(StatusCode::FOUND);
        stats.record(StatusCode::NOT_FOUND);
        stats.record(StatusCode::PAYLOAD_TOO_LARGE);
        shared.record(StatusCode::GATEWAY_TIMEOUT);
        stats.record(StatusCode::BAD_GATEWAY);
        stats.record_upload();
        stats.record_timeout();

        let snap = stats.snapshot();
        assert_eq!(snap.requests, 6);
        assert_eq!(snap.success, 2);
        assert_eq!(snap.client_errors, 2);
        assert_eq!(snap.server_errors, 2);
        assert_eq!(snap.rejected_oversize, 1);
        assert_eq!(snap.timeouts, 1);
        assert_eq!(snap.uploads, 1);
    }

    #[tokio::test]
    async fn test_concurrent_increments() {
        let stats = GatewayStats::new();
        let mut tasks = Vec::new();
        for _ in 0..8 {
            let stats = stats.clone();
            tasks.push(tokio::spawn(async move {
                for _ in 0..100 {
                    stats.record(StatusCode::OK);
                }
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }
        assert_eq!(stats.snapshot().requests, 800);
    }
}
