//! Body Streamer.
//!
//! # Responsibilities
//! - Copy exactly `declared_length` request-body bytes into the handler's input
//! - Close the handler's input as soon as the body is delivered (or at once when
//!   there is no body)
//! - Collect the handler's output until it closes the stream
//! - Forward the handler's diagnostic stream to the log
//!
//! # Design Decisions
//! - The body is moved chunk by chunk; memory per request stays bounded by the
//!   size of one chunk regardless of body size
//! - A handler that stops reading its input early is not an error; the
//!   remaining declared bytes are read from the client and dropped
//! - There is no length prefix on the output side: end-of-stream is the only
//!   terminator

use std::io;

use axum::body::Bytes;
use futures_util::stream::{self, BoxStream};
use futures_util::{Stream, StreamExt};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};

use crate::cgi::error::GatewayError;

/// Request body as a stream of chunks.
pub type BodySource = BoxStream<'static, io::Result<Bytes>>;

const READ_CHUNK: usize = 16 * 1024;

/// A body source that yields nothing.
pub fn empty_body() -> BodySource {
    stream::empty().boxed()
}

/// A body source over bytes already held in memory.
pub fn full_body(bytes: Bytes) -> BodySource {
    stream::once(async move { Ok(bytes) }).boxed()
}

/// Write exactly `declared_length` bytes from `source` into `sink`, then close it.
///
/// Returns the number of bytes the handler accepted. Bytes the source yields
/// past the declared length are never written.
pub async fn stream_body<S, W>(
    declared_length: Option<u64>,
    mut source: S,
    mut sink: W,
) -> Result<u64, GatewayError>
where
    S: Stream<Item = io::Result<Bytes>> + Unpin,
    W: AsyncWrite + Unpin,
{
    let expected = match declared_length {
        Some(len) if len > 0 => len,
        _ => {
            close(&mut sink).await;
            return Ok(0);
        }
    };

    let mut written: u64 = 0;
    while written < expected {
        let chunk = match source.next().await {
            Some(Ok(chunk)) => chunk,
            Some(Err(e)) => {
                tracing::debug!(error = %e, written, expected, "Request body source failed");
                close(&mut sink).await;
                return Err(GatewayError::TruncatedBody {
                    expected,
                    received: written,
                });
            }
            None => {
                close(&mut sink).await;
                return Err(GatewayError::TruncatedBody {
                    expected,
                    received: written,
                });
            }
        };

        let remaining = expected - written;
        let take = chunk.len().min(usize::try_from(remaining).unwrap_or(usize::MAX));
        match sink.write_all(&chunk[..take]).await {
            Ok(()) => written += take as u64,
            Err(e) if e.kind() == io::ErrorKind::BrokenPipe => {
                tracing::debug!(written, expected, "Handler closed its input early");
                discard(&mut source, expected - written - take as u64).await;
                return Ok(written);
            }
            Err(e) => return Err(GatewayError::Io(e)),
        }
    }

    close(&mut sink).await;
    Ok(written)
}

/// Consume up to `remaining` more bytes so the client can finish sending.
async fn discard<S>(source: &mut S, mut remaining: u64)
where
    S: Stream<Item = io::Result<Bytes>> + Unpin,
{
    while remaining > 0 {
        match source.next().await {
            Some(Ok(chunk)) => remaining = remaining.saturating_sub(chunk.len() as u64),
            _ => return,
        }
    }
}

async fn close<W: AsyncWrite + Unpin>(sink: &mut W) {
    if let Err(e) = sink.shutdown().await {
        if e.kind() != io::ErrorKind::BrokenPipe {
            tracing::debug!(error = %e, "Closing handler input failed");
        }
    }
}

/// Read the handler's output stream until it is closed.
pub async fn read_output<R>(mut reader: R) -> io::Result<Vec<u8>>
where
    R: AsyncRead + Unpin,
{
    let mut output = Vec::new();
    let mut chunk = vec![0u8; READ_CHUNK];
    loop {
        let n = reader.read(&mut chunk).await?;
        if n == 0 {
            return Ok(output);
        }
        output.extend_from_slice(&chunk[..n]);
    }
}

/// Log each line of the handler's diagnostic stream. Returns the line count.
pub async fn drain_diagnostics<R>(reader: R, request_id: &str) -> usize
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    let mut count = 0;
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                count += 1;
                tracing::warn!(request_id = %request_id, line = %line, "Handler stderr");
            }
            Ok(None) => return count,
            Err(e) => {
                // Non-UTF-8 output ends line logging; keep draining so the
                // handler never blocks on a full pipe.
                tracing::debug!(request_id = %request_id, error = %e, "Unreadable handler stderr");
                let mut rest = lines.into_inner();
                let mut sink = tokio::io::sink();
                if let Err(e) = tokio::io::copy(&mut rest, &mut sink).await {
                    tracing::debug!(request_id = %request_id, error = %e, "Handler stderr drain failed");
                }
                return count;
            }
        }
    }
}
