//! Registry of live handler processes.
//!
//! Each spawned handler is registered under its request ID and removed by a
//! guard when the supervisor is done with it, on every path. The registry is
//! the only state shared between concurrent dispatches; it is lock-sharded
//! (DashMap) so unrelated requests never wait on one another.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use dashmap::DashMap;

use crate::observability::metrics;

/// What is known about one running handler.
#[derive(Debug, Clone)]
pub struct LiveHandler {
    pub pid: Option<u32>,
    pub program: PathBuf,
    pub started: Instant,
}

/// Shared handle over all live handlers. Cloning shares the same registry.
#[derive(Debug, Clone, Default)]
pub struct HandlerRegistry {
    live: Arc<DashMap<String, LiveHandler>>,
    spawned: Arc<AtomicU64>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a freshly spawned handler. Dropping the guard unregisters it.
    pub fn register(&self, request_id: &str, handler: LiveHandler) -> RegistrationGuard {
        self.spawned.fetch_add(1, Ordering::Relaxed);
        self.live.insert(request_id.to_string(), handler);
        metrics::set_active_handlers(self.live.len());
        RegistrationGuard {
            live: Arc::clone(&self.live),
            request_id: request_id.to_string(),
        }
    }

    /// Number of handlers currently alive.
    pub fn active(&self) -> usize {
        self.live.len()
    }

    /// Number of handlers spawned since startup.
    pub fn spawned_total(&self) -> u64 {
        self.spawned.load(Ordering::Relaxed)
    }
}

/// Removes a handler from the registry when dropped.
#[derive(Debug)]
pub struct RegistrationGuard {
    live: Arc<DashMap<String, LiveHandler>>,
    request_id: String,
}

impl Drop for RegistrationGuard {
    fn drop(&mut self) {
        if let Some((_, handler)) = self.live.remove(&self.request_id) {
            tracing::trace!(
                request_id = %self.request_id,
                pid = ?handler.pid,
                program = %handler.program.display(),
                elapsed_ms = handler.started.elapsed().as_millis() as u64,
                "Handler unregistered"
            );
        }
        metrics::set_active_handlers(self.live.len());
    }
}
