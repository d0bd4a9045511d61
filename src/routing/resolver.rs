//! Request path to handler resolution.

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};

use axum::http::StatusCode;
use thiserror::Error;

use crate::cgi::supervisor::HandlerCommand;
use crate::config::CgiConfig;

/// A script resolved for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Handler {
    /// URL path of the script, e.g. `/cgi/info.py`.
    pub script_name: String,
    /// Canonical filesystem path of the script.
    pub script_path: PathBuf,
    /// Interpreter the script is run with; `None` runs the script directly.
    pub interpreter: Option<PathBuf>,
    pub document_root: PathBuf,
}

impl Handler {
    /// Command line for this handler. Runs in the script's directory.
    pub fn command(&self) -> HandlerCommand {
        let working_dir = self
            .script_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.document_root.clone());

        match &self.interpreter {
            Some(interpreter) => HandlerCommand {
                program: interpreter.clone(),
                args: vec![self.script_path.clone().into_os_string()],
                working_dir,
            },
            None => HandlerCommand {
                program: self.script_path.clone(),
                args: Vec::new(),
                working_dir,
            },
        }
    }
}

/// Why a path has no handler.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    #[error("no handler at {0}")]
    NotFound(String),

    #[error("path {0} leaves the document root")]
    Forbidden(String),
}

impl ResolveError {
    pub fn status(&self) -> StatusCode {
        match self {
            ResolveError::NotFound(_) => StatusCode::NOT_FOUND,
            ResolveError::Forbidden(_) => StatusCode::FORBIDDEN,
        }
    }
}

/// Maps request paths onto scripts under the document root.
#[derive(Debug, Clone)]
pub struct ScriptResolver {
    root: PathBuf,
    index: String,
    interpreters: HashMap<String, PathBuf>,
}

impl ScriptResolver {
    /// Build from configuration. Fails if the document root does not exist.
    pub fn new(config: &CgiConfig) -> io::Result<Self> {
        let root = std::fs::canonicalize(&config.document_root)?;
        let interpreters = config
            .interpreters
            .iter()
            .map(|(ext, path)| (ext.trim_start_matches('.').to_string(), PathBuf::from(path)))
            .collect();

        tracing::info!(
            document_root = %root.display(),
            interpreters = config.interpreters.len(),
            "Script resolver ready"
        );

        Ok(Self {
            root,
            index: config.index.clone(),
            interpreters,
        })
    }

    /// Canonical document root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a request path (without query) to a handler.
    pub async fn resolve(&self, path: &str) -> Result<Handler, ResolveError> {
        let mut segments = Vec::new();
        for segment in path.split('/') {
            match segment {
                "" | "." => continue,
                ".." => return Err(ResolveError::NotFound(path.to_string())),
                other => segments.push(other),
            }
        }
        if segments.is_empty() {
            segments.push(self.index.as_str());
        }

        let candidate = segments.iter().fold(self.root.clone(), |acc, s| acc.join(s));
        let script_path = tokio::fs::canonicalize(&candidate)
            .await
            .map_err(|_| ResolveError::NotFound(path.to_string()))?;

        if !script_path.starts_with(&self.root) {
            tracing::warn!(path = %path, target = %script_path.display(), "Script escapes document root");
            return Err(ResolveError::Forbidden(path.to_string()));
        }

        let is_file = tokio::fs::metadata(&script_path)
            .await
            .map(|m| m.is_file())
            .unwrap_or(false);
        if !is_file {
            return Err(ResolveError::NotFound(path.to_string()));
        }

        let interpreter = script_path
            .extension()
            .and_then(|ext| ext.to_str())
            .and_then(|ext| self.interpreters.get(ext))
            .cloned();

        Ok(Handler {
            script_name: format!("/{}", segments.join("/")),
            script_path,
            interpreter,
            document_root: self.root.clone(),
        })
    }
}
