//! Process Supervisor.
//!
//! # Responsibilities
//! - Spawn exactly one handler process per dispatch
//! - Give it exactly the gateway environment plus a fixed set of inherited
//!   variables (PATH, locale) captured once at startup
//! - Service the three pipes concurrently: body in, output out, stderr to logs
//! - Enforce the deadline and classify how the handler ended
//!
//! # Outcome Priority
//! ```text
//! Timeout > SignaledOrCrashed > NonZeroExit(code) > Success
//! ```
//!
//! # Design Decisions
//! - Input and output are serviced in one `try_join!`, so a handler that
//!   writes before it has read its whole body cannot deadlock the gateway
//! - On deadline expiry the child is killed and reaped before returning;
//!   nothing is retried
//! - `kill_on_drop` covers cancellation of the request future itself
//! - Working directory side effects are left in place

use std::ffi::OsString;
use std::io;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use futures_util::Stream;
use tokio::process::{Child, Command};
use tokio::time::Instant;

use crate::cgi::body;
use crate::cgi::env::GatewayEnvironment;
use crate::cgi::error::GatewayError;
use crate::cgi::registry::{HandlerRegistry, LiveHandler};
use crate::observability::metrics;

/// Program, arguments and working directory of one handler invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerCommand {
    pub program: PathBuf,
    pub args: Vec<OsString>,
    pub working_dir: PathBuf,
}

/// How a handler process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// Exited with status 0.
    Success,
    /// Exited normally with a non-zero status.
    NonZeroExit(i32),
    /// Ended without an exit code (killed by a signal, crashed).
    SignaledOrCrashed { signal: Option<i32> },
    /// Still running at the deadline; it was killed.
    Timeout,
}

impl Termination {
    fn from_status(status: ExitStatus) -> Self {
        if status.success() {
            return Termination::Success;
        }
        match status.code() {
            Some(code) => Termination::NonZeroExit(code),
            None => Termination::SignaledOrCrashed {
                signal: signal_of(status),
            },
        }
    }

    /// Label used for logs and metrics.
    pub fn label(&self) -> &'static str {
        match self {
            Termination::Success => "success",
            Termination::NonZeroExit(_) => "non_zero_exit",
            Termination::SignaledOrCrashed { .. } => "signaled",
            Termination::Timeout => "timeout",
        }
    }
}

#[cfg(unix)]
fn signal_of(status: ExitStatus) -> Option<i32> {
    use std::os::unix::process::ExitStatusExt;
    status.signal()
}

#[cfg(not(unix))]
fn signal_of(_status: ExitStatus) -> Option<i32> {
    None
}

/// Everything a finished dispatch produced.
#[derive(Debug, Clone)]
pub struct HandlerRun {
    pub termination: Termination,
    /// Raw output stream; empty after a timeout.
    pub output: Vec<u8>,
    /// Body bytes the handler accepted on its input.
    pub body_written: u64,
    pub pid: Option<u32>,
    pub elapsed: Duration,
}

/// Spawns and supervises handler processes.
#[derive(Debug, Clone)]
pub struct ProcessSupervisor {
    inherited: Arc<Vec<(String, OsString)>>,
    registry: HandlerRegistry,
}

impl ProcessSupervisor {
    /// Capture the inherited variables from the gateway's own environment.
    /// Called once at startup; later changes to the gateway's environment
    /// are not seen by handlers.
    pub fn new(inherit_env: &[String], registry: HandlerRegistry) -> Self {
        let inherited = inherit_env
            .iter()
            .filter_map(|name| std::env::var_os(name).map(|value| (name.clone(), value)))
            .collect();

        Self {
            inherited: Arc::new(inherited),
            registry,
        }
    }

    /// The registry this supervisor reports live handlers to.
    pub fn registry(&self) -> &HandlerRegistry {
        &self.registry
    }

    /// Run one handler to completion or until `deadline`.
    ///
    /// `source` must yield at least `env.content_length` bytes; fewer is a
    /// `TruncatedBody` error and the handler is killed.
    pub async fn dispatch<S>(
        &self,
        request_id: &str,
        command: &HandlerCommand,
        env: &GatewayEnvironment,
        deadline: Instant,
        source: S,
    ) -> Result<HandlerRun, GatewayError>
    where
        S: Stream<Item = io::Result<Bytes>> + Unpin,
    {
        let started = Instant::now();

        let mut cmd = Command::new(&command.program);
        cmd.args(&command.args)
            .current_dir(&command.working_dir)
            .env_clear()
            .envs(self.inherited.iter().map(|(k, v)| (k, v)))
            .envs(env.vars())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|source| GatewayError::SpawnFailure {
            program: command.program.display().to_string(),
            source,
        })?;

        let pid = child.id();
        metrics::record_handler_spawn();
        let _registration = self.registry.register(
            request_id,
            LiveHandler {
                pid,
                program: command.program.clone(),
                started: started.into_std(),
            },
        );

        tracing::debug!(
            request_id = %request_id,
            pid = ?pid,
            program = %command.program.display(),
            "Handler spawned"
        );

        let (stdin, stdout, stderr) = match (child.stdin.take(), child.stdout.take(), child.stderr.take()) {
            (Some(stdin), Some(stdout), Some(stderr)) => (stdin, stdout, stderr),
            _ => {
                terminate(&mut child, request_id).await;
                return Err(GatewayError::Io(io::Error::other("handler pipes unavailable")));
            }
        };

        let exchange = async {
            let feed = body::stream_body(env.content_length, source, stdin);
            let collect = async {
                let (output, stderr_lines) = tokio::join!(
                    body::read_output(stdout),
                    body::drain_diagnostics(stderr, request_id)
                );
                output.map(|output| (output, stderr_lines)).map_err(GatewayError::Io)
            };
            tokio::try_join!(feed, collect)
        };

        let (body_written, output, stderr_lines) = match tokio::time::timeout_at(deadline, exchange).await {
            Ok(Ok((written, (output, lines)))) => (written, output, lines),
            Ok(Err(e)) => {
                terminate(&mut child, request_id).await;
                return Err(e);
            }
            Err(_) => {
                terminate(&mut child, request_id).await;
                return Ok(self.finish(request_id, pid, Termination::Timeout, Vec::new(), 0, started));
            }
        };

        // Output is closed; the handler may still linger before exiting.
        let termination = match tokio::time::timeout_at(deadline, child.wait()).await {
            Ok(Ok(status)) => Termination::from_status(status),
            Ok(Err(e)) => {
                terminate(&mut child, request_id).await;
                return Err(GatewayError::Io(e));
            }
            Err(_) => {
                terminate(&mut child, request_id).await;
                Termination::Timeout
            }
        };

        if stderr_lines > 0 {
            tracing::debug!(request_id = %request_id, stderr_lines, "Handler wrote diagnostics");
        }

        let output = if termination == Termination::Timeout {
            Vec::new()
        } else {
            output
        };
        Ok(self.finish(request_id, pid, termination, output, body_written, started))
    }

    fn finish(
        &self,
        request_id: &str,
        pid: Option<u32>,
        termination: Termination,
        output: Vec<u8>,
        body_written: u64,
        started: Instant,
    ) -> HandlerRun {
        let elapsed = started.elapsed();
        metrics::record_handler_outcome(termination.label());

        match termination {
            Termination::Success => tracing::debug!(
                request_id = %request_id,
                pid = ?pid,
                output_bytes = output.len(),
                elapsed_ms = elapsed.as_millis() as u64,
                "Handler exited"
            ),
            _ => tracing::warn!(
                request_id = %request_id,
                pid = ?pid,
                outcome = ?termination,
                output_bytes = output.len(),
                elapsed_ms = elapsed.as_millis() as u64,
                "Handler ended abnormally"
            ),
        }

        HandlerRun {
            termination,
            output,
            body_written,
            pid,
            elapsed,
        }
    }
}

/// Kill the child and reap it so no zombie or orphan outlives the request.
async fn terminate(child: &mut Child, request_id: &str) {
    if let Err(e) = child.start_kill() {
        tracing::debug!(request_id = %request_id, error = %e, "Handler already gone");
    }
    if let Err(e) = child.wait().await {
        tracing::error!(request_id = %request_id, error = %e, "Failed to reap handler");
    }
}
