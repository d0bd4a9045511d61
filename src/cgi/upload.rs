//! Native upload store.
//!
//! Stores a request body as a file under the upload directory. Free names are
//! claimed with an exclusive create, so two concurrent uploads of the same
//! name can never overwrite one another:
//!
//! ```text
//! report.txt → exists → report_1.txt → exists → report_2.txt → created
//! ```

use std::io;
use std::path::PathBuf;

use axum::body::Bytes;
use axum::http::StatusCode;
use futures_util::Stream;
use thiserror::Error;
use tokio::fs::{File, OpenOptions};

use crate::cgi::body;
use crate::cgi::error::GatewayError;
use crate::config::UploadConfig;

const DEFAULT_NAME: &str = "uploaded_file";

/// A file written by the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredUpload {
    pub filename: String,
    pub size: u64,
}

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("no free file name for '{name}' after {attempts} attempts")]
    NoFreeName { name: String, attempts: u32 },

    #[error(transparent)]
    Body(#[from] GatewayError),

    #[error("upload storage error: {0}")]
    Io(#[from] io::Error),
}

impl UploadError {
    pub fn status(&self) -> StatusCode {
        match self {
            UploadError::NoFreeName { .. } => StatusCode::CONFLICT,
            UploadError::Body(e) => e.status(),
            UploadError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Writes uploads into one directory.
#[derive(Debug, Clone)]
pub struct UploadStore {
    directory: PathBuf,
    max_attempts: u32,
}

impl UploadStore {
    pub fn new(directory: impl Into<PathBuf>, max_attempts: u32) -> Self {
        Self {
            directory: directory.into(),
            max_attempts,
        }
    }

    pub fn from_config(config: &UploadConfig) -> Self {
        Self::new(&config.directory, config.max_attempts)
    }

    /// Store `declared_length` bytes from `source` under a name derived from
    /// `requested`. A partially written file is removed on failure.
    pub async fn store<S>(
        &self,
        requested: Option<&str>,
        declared_length: Option<u64>,
        source: S,
    ) -> Result<StoredUpload, UploadError>
    where
        S: Stream<Item = io::Result<Bytes>> + Unpin,
    {
        tokio::fs::create_dir_all(&self.directory).await?;

        let name = safe_filename(requested);
        let (file, filename) = self.create_exclusive(&name).await?;
        let path = self.directory.join(&filename);

        match body::stream_body(declared_length, source, file).await {
            Ok(size) => {
                tracing::info!(filename = %filename, size, "Upload stored");
                Ok(StoredUpload { filename, size })
            }
            Err(e) => {
                if let Err(remove) = tokio::fs::remove_file(&path).await {
                    tracing::warn!(path = %path.display(), error = %remove, "Failed to remove partial upload");
                }
                Err(UploadError::Body(e))
            }
        }
    }

    async fn create_exclusive(&self, name: &str) -> Result<(File, String), UploadError> {
        for attempt in 0..self.max_attempts {
            let candidate = candidate_name(name, attempt);
            let result = OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(self.directory.join(&candidate))
                .await;

            match result {
                Ok(file) => return Ok((file, candidate)),
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                    tracing::trace!(candidate = %candidate, "Upload name taken");
                }
                Err(e) => return Err(UploadError::Io(e)),
            }
        }

        Err(UploadError::NoFreeName {
            name: name.to_string(),
            attempts: self.max_attempts,
        })
    }
}

/// Basename of the requested name with unsafe characters replaced.
pub fn safe_filename(requested: Option<&str>) -> String {
    let base = requested
        .and_then(|name| name.rsplit(['/', '\\']).next())
        .unwrap_or_default();

    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();

    if cleaned.is_empty() || cleaned.chars().all(|c| c == '.') {
        DEFAULT_NAME.to_string()
    } else {
        cleaned
    }
}

/// `name` for attempt 0, then `stem_<n>.ext`.
fn candidate_name(name: &str, attempt: u32) -> String {
    if attempt == 0 {
        return name.to_string();
    }
    match name.rfind('.') {
        Some(dot) if dot > 0 => format!("{}_{}{}", &name[..dot], attempt, &name[dot..]),
        _ => format!("{name}_{attempt}"),
    }
}
