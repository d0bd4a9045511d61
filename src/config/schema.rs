//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gateway.
//! All types derive Serde traits for deserialization from config files.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Root configuration for the CGI gateway.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GatewayConfig {
    /// Static server identity exported to handlers.
    pub server: ServerConfig,

    /// Listener configuration (bind addresses).
    pub listener: ListenerConfig,

    /// Handler resolution and execution settings.
    pub cgi: CgiConfig,

    /// Admission limits enforced before any handler is spawned.
    pub limits: LimitsConfig,

    /// Native upload endpoint.
    pub upload: UploadConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Server identity, exported as `SERVER_*` variables.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Value of `SERVER_NAME`.
    pub name: String,

    /// Value of `SERVER_SOFTWARE`.
    pub software: String,

    /// Value of `SERVER_PROTOCOL`.
    pub protocol: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            name: "localhost".to_string(),
            software: concat!("cgi-gateway/", env!("CARGO_PKG_VERSION")).to_string(),
            protocol: "HTTP/1.1".to_string(),
        }
    }
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind addresses (e.g., "127.0.0.1:1024"). Every address serves the same handlers.
    pub bind_addresses: Vec<String>,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_addresses: vec!["127.0.0.1:1024".to_string(), "127.0.0.1:1025".to_string()],
        }
    }
}

/// Handler resolution and execution.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CgiConfig {
    /// Directory that request paths are resolved against.
    pub document_root: String,

    /// Script served for `/`.
    pub index: String,

    /// File extension (without the dot) to interpreter path.
    /// Extensions without an entry are executed directly.
    pub interpreters: BTreeMap<String, String>,

    /// Wall-clock budget for one handler process, in seconds.
    pub timeout_secs: u64,

    /// Variables copied from the gateway's own environment into every handler.
    pub inherit_env: Vec<String>,
}

impl Default for CgiConfig {
    fn default() -> Self {
        let mut interpreters = BTreeMap::new();
        interpreters.insert("py".to_string(), "/usr/bin/python3".to_string());
        interpreters.insert("php".to_string(), "/usr/bin/php-cgi".to_string());
        interpreters.insert("sh".to_string(), "/bin/sh".to_string());

        Self {
            document_root: "./www".to_string(),
            index: "index.py".to_string(),
            interpreters,
            timeout_secs: 5,
            inherit_env: ["PATH", "LANG", "LC_ALL", "HOME"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

/// Admission limits.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Maximum request body size in bytes.
    pub max_body_size: u64,

    /// Methods the gateway accepts; anything else is answered with 405.
    pub allowed_methods: Vec<String>,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_body_size: 1024 * 1024, // 1MB
            allowed_methods: ["GET", "POST", "DELETE", "HEAD"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

/// Native upload endpoint configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct UploadConfig {
    /// Enable the upload endpoint.
    pub enabled: bool,

    /// Request path that accepts uploads.
    pub path: String,

    /// Directory uploaded files are written to.
    pub directory: String,

    /// Attempts at finding a free file name before giving up.
    pub max_attempts: u32,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: "/upload".to_string(),
            directory: "./www/uploads".to_string(),
            max_attempts: 16,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}
