//! Gateway Coordinator.
//!
//! # State Machine
//! ```text
//! Received → EnvironmentBuilt → Dispatched ─┬→ Decoded   ─┐
//!                     │                     ├→ TimedOut  ─┼→ Completed
//!                     │                     └→ Malformed ─┘
//!                     └──── (spawn failure, truncated body) ──→ Completed
//! ```
//!
//! # Design Decisions
//! - Every path ends in `Completed` with exactly one response; nothing here
//!   returns an error to the HTTP layer
//! - A handler that exited non-zero or was killed still gets its output
//!   decoded; only undecodable output turns into a 502
//! - Process handle and pipes are owned by the supervisor call and are
//!   released before the response is built

use std::io;
use std::time::{Duration, Instant};

use axum::body::Bytes;
use axum::http::{header, HeaderName, HeaderValue, StatusCode};
use futures_util::Stream;

use crate::cgi::decoder::{self, DecodedResponse};
use crate::cgi::env::{GatewayEnvironment, ServerMeta};
use crate::cgi::error::GatewayError;
use crate::cgi::request::CgiRequest;
use crate::cgi::supervisor::{ProcessSupervisor, Termination};
use crate::routing::Handler;

/// Deadline used when the configured budget cannot be added to the clock.
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365);

/// Where a request is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Received,
    EnvironmentBuilt,
    Dispatched,
    Decoded,
    TimedOut,
    Malformed,
    Completed,
}

impl Stage {
    /// Whether `next` directly follows `self`.
    pub fn can_advance_to(self, next: Stage) -> bool {
        use Stage::*;
        matches!(
            (self, next),
            (Received, EnvironmentBuilt)
                | (EnvironmentBuilt, Dispatched)
                | (EnvironmentBuilt, Completed)
                | (Dispatched, Decoded)
                | (Dispatched, TimedOut)
                | (Dispatched, Malformed)
                | (Decoded, Completed)
                | (TimedOut, Completed)
                | (Malformed, Completed)
        )
    }
}

struct Lifecycle<'a> {
    request_id: &'a str,
    stage: Stage,
}

impl<'a> Lifecycle<'a> {
    fn new(request_id: &'a str) -> Self {
        Self {
            request_id,
            stage: Stage::Received,
        }
    }

    fn advance(&mut self, next: Stage) {
        debug_assert!(
            self.stage.can_advance_to(next),
            "invalid transition {:?} -> {:?}",
            self.stage,
            next
        );
        tracing::trace!(request_id = %self.request_id, from = ?self.stage, to = ?next, "Stage");
        self.stage = next;
    }
}

/// The response the coordinator hands back to the HTTP layer.
#[derive(Debug, Clone)]
pub struct GatewayResponse {
    pub status: StatusCode,
    pub headers: Vec<(HeaderName, HeaderValue)>,
    pub body: Bytes,
    /// How the handler ended, when one ran to a classification.
    pub termination: Option<Termination>,
}

impl GatewayResponse {
    /// Short `text/plain` response for a status.
    pub fn plain(status: StatusCode) -> Self {
        let reason = status.canonical_reason().unwrap_or("Error");
        Self {
            status,
            headers: vec![(header::CONTENT_TYPE, HeaderValue::from_static("text/plain; charset=utf-8"))],
            body: Bytes::from(format!("{} {}\n", status.as_u16(), reason)),
            termination: None,
        }
    }

    pub fn from_error(error: &GatewayError) -> Self {
        Self::plain(error.status())
    }

    fn from_decoded(decoded: DecodedResponse, termination: Termination) -> Self {
        let headers = decoded
            .headers
            .into_iter()
            .filter(|(name, _)| !is_framing_header(name))
            .collect();

        Self {
            status: decoded.status,
            headers,
            body: Bytes::from(decoded.body),
            termination: Some(termination),
        }
    }

    /// First value of a header, if it is valid UTF-8.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.as_str().eq_ignore_ascii_case(name))
            .and_then(|(_, v)| v.to_str().ok())
    }
}

/// Headers the HTTP layer sets from the real body; handler values are dropped.
fn is_framing_header(name: &HeaderName) -> bool {
    *name == header::CONTENT_LENGTH || *name == header::TRANSFER_ENCODING || *name == header::CONNECTION
}

/// Runs one request through environment, dispatch and decode.
#[derive(Debug, Clone)]
pub struct GatewayCoordinator {
    supervisor: ProcessSupervisor,
    timeout: Duration,
}

impl GatewayCoordinator {
    pub fn new(supervisor: ProcessSupervisor, timeout: Duration) -> Self {
        Self { supervisor, timeout }
    }

    pub fn supervisor(&self) -> &ProcessSupervisor {
        &self.supervisor
    }

    /// Handle one request. `source` must carry the request body; exactly
    /// `request.declared_length` bytes are taken from it.
    pub async fn handle<S>(
        &self,
        request_id: &str,
        request: &CgiRequest,
        handler: &Handler,
        meta: &ServerMeta,
        source: S,
    ) -> GatewayResponse
    where
        S: Stream<Item = io::Result<Bytes>> + Unpin,
    {
        let started = Instant::now();
        let mut lifecycle = Lifecycle::new(request_id);

        let env = GatewayEnvironment::build(request, handler, meta);
        lifecycle.advance(Stage::EnvironmentBuilt);

        let now = tokio::time::Instant::now();
        let deadline = now
            .checked_add(self.timeout)
            .unwrap_or_else(|| now + FAR_FUTURE);
        let command = handler.command();
        let run = match self
            .supervisor
            .dispatch(request_id, &command, &env, deadline, source)
            .await
        {
            Ok(run) => run,
            Err(e) => {
                lifecycle.advance(Stage::Completed);
                match &e {
                    GatewayError::SpawnFailure { .. } => tracing::error!(
                        request_id = %request_id,
                        script = %handler.script_name,
                        error = %e,
                        "Handler could not be started"
                    ),
                    _ => tracing::warn!(
                        request_id = %request_id,
                        script = %handler.script_name,
                        kind = e.kind(),
                        error = %e,
                        "Dispatch failed"
                    ),
                }
                return GatewayResponse::from_error(&e);
            }
        };
        lifecycle.advance(Stage::Dispatched);

        let response = if run.termination == Termination::Timeout {
            lifecycle.advance(Stage::TimedOut);
            let mut response = GatewayResponse::from_error(&GatewayError::Timeout(self.timeout));
            response.termination = Some(Termination::Timeout);
            response
        } else {
            match decoder::decode(&run.output) {
                Ok(decoded) => {
                    lifecycle.advance(Stage::Decoded);
                    GatewayResponse::from_decoded(decoded, run.termination)
                }
                Err(e) => {
                    lifecycle.advance(Stage::Malformed);
                    tracing::warn!(
                        request_id = %request_id,
                        script = %handler.script_name,
                        outcome = run.termination.label(),
                        error = %e,
                        "Undecodable handler output"
                    );
                    let mut response = GatewayResponse::from_error(&GatewayError::MalformedOutput(e));
                    response.termination = Some(run.termination);
                    response
                }
            }
        };
        lifecycle.advance(Stage::Completed);

        tracing::info!(
            request_id = %request_id,
            script = %handler.script_name,
            pid = ?run.pid,
            status = response.status.as_u16(),
            outcome = run.termination.label(),
            body_in = run.body_written,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "CGI request completed"
        );

        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cgi::body::{empty_body, full_body};
    use crate::cgi::registry::HandlerRegistry;
    use axum::http::Method;
    use std::path::{Path, PathBuf};

    #[test]
    fn test_stage_transitions() {
        use Stage::*;
        assert!(Received.can_advance_to(EnvironmentBuilt));
        assert!(Dispatched.can_advance_to(TimedOut));
        assert!(Malformed.can_advance_to(Completed));
        assert!(EnvironmentBuilt.can_advance_to(Completed));

        assert!(!Received.can_advance_to(Dispatched));
        assert!(!Decoded.can_advance_to(Malformed));
        assert!(!Completed.can_advance_to(Received));
        assert!(!TimedOut.can_advance_to(Decoded));
    }

    #[test]
    fn test_plain_error_response() {
        let response = GatewayResponse::from_error(&GatewayError::Timeout(Duration::from_secs(1)));
        assert_eq!(response.status, StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(response.header("content-type"), Some("text/plain; charset=utf-8"));
        assert_eq!(&response.body[..], b"504 Gateway Timeout\n");
    }

    struct Fixture {
        dir: tempfile::TempDir,
        coordinator: GatewayCoordinator,
        meta: ServerMeta,
    }

    impl Fixture {
        fn new(timeout: Duration) -> Self {
            let supervisor = ProcessSupervisor::new(&["PATH".to_string()], HandlerRegistry::new());
            Self {
                dir: tempfile::tempdir().unwrap(),
                coordinator: GatewayCoordinator::new(supervisor, timeout),
                meta: ServerMeta {
                    name: "localhost".into(),
                    port: 1024,
                    software: "test".into(),
                    protocol: "HTTP/1.1".into(),
                },
            }
        }

        fn script(&self, name: &str, body: &str, interpreter: &Path) -> Handler {
            let path = self.dir.path().join(name);
            std::fs::write(&path, body).unwrap();
            Handler {
                script_name: format!("/{name}"),
                script_path: path,
                interpreter: Some(interpreter.to_path_buf()),
                document_root: self.dir.path().to_path_buf(),
            }
        }

        async fn get(&self, handler: &Handler) -> GatewayResponse {
            let request = CgiRequest::new(Method::GET, handler.script_name.clone());
            self.coordinator
                .handle("req-test", &request, handler, &self.meta, empty_body())
                .await
        }
    }

    fn sh() -> PathBuf {
        PathBuf::from("/bin/sh")
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_status_header_honored() {
        let fx = Fixture::new(Duration::from_secs(5));
        let handler = fx.script("created.sh", "printf 'Status: 201 Created\\n\\nmade'", &sh());

        let response = fx.get(&handler).await;
        assert_eq!(response.status, StatusCode::CREATED);
        assert_eq!(&response.body[..], b"made");
        assert_eq!(response.termination, Some(Termination::Success));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_nonzero_exit_keeps_partial_output() {
        let fx = Fixture::new(Duration::from_secs(5));
        let handler = fx.script(
            "partial.sh",
            "printf 'Content-Type: text/plain\\n\\npartial'; exit 1",
            &sh(),
        );

        let response = fx.get(&handler).await;
        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(&response.body[..], b"partial");
        assert_eq!(response.termination, Some(Termination::NonZeroExit(1)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_handler_content_length_dropped() {
        let fx = Fixture::new(Duration::from_secs(5));
        let handler = fx.script(
            "len.sh",
            "printf 'Content-Length: 999\\nX-Kept: yes\\n\\nabc'",
            &sh(),
        );

        let response = fx.get(&handler).await;
        assert_eq!(response.header("content-length"), None);
        assert_eq!(response.header("x-kept"), Some("yes"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_failures_map_to_statuses() {
        let fx = Fixture::new(Duration::from_millis(500));

        let silent = fx.script("silent.sh", "kill -KILL $$", &sh());
        assert_eq!(fx.get(&silent).await.status, StatusCode::BAD_GATEWAY);

        let garbled = fx.script("garbled.sh", "printf 'just some text'", &sh());
        assert_eq!(fx.get(&garbled).await.status, StatusCode::BAD_GATEWAY);

        let hang = fx.script("hang.sh", "exec sleep 30", &sh());
        let started = Instant::now();
        let response = fx.get(&hang).await;
        assert_eq!(response.status, StatusCode::GATEWAY_TIMEOUT);
        assert!(started.elapsed() < Duration::from_secs(5));

        let missing = fx.script("missing.sh", "true", Path::new("/nonexistent/interpreter"));
        assert_eq!(fx.get(&missing).await.status, StatusCode::INTERNAL_SERVER_ERROR);

        assert_eq!(fx.coordinator.supervisor().registry().active(), 0);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_unbounded_budget_still_answers() {
        let fx = Fixture::new(Duration::from_secs(u64::MAX));
        let handler = fx.script("ok.sh", "printf 'Content-Type: text/plain\\n\\nok'", &sh());

        let response = fx.get(&handler).await;
        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(&response.body[..], b"ok");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_body_echoed() {
        let fx = Fixture::new(Duration::from_secs(5));
        let handler = fx.script(
            "echo.sh",
            "printf 'Content-Type: application/octet-stream\\n\\n'; cat",
            &sh(),
        );

        let mut request = CgiRequest::new(Method::POST, "/echo.sh");
        request.declared_length = Some(5);
        let response = fx
            .coordinator
            .handle("req-echo", &request, &handler, &fx.meta, full_body(Bytes::from_static(b"hello")))
            .await;

        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(&response.body[..], b"hello");
    }
}
