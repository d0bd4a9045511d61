//! Shared utilities for integration and load testing.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use cgi_gateway::cgi::HandlerRegistry;
use cgi_gateway::config::GatewayConfig;
use cgi_gateway::http::HttpServer;
use cgi_gateway::lifecycle::{startup, Shutdown};
use cgi_gateway::observability::GatewayStats;
use tempfile::TempDir;
use tokio::task::JoinHandle;

/// Index handler every gateway gets.
pub const INDEX_SH: &str = "printf 'Content-Type: text/html\\n\\n<html><body>index</body></html>'\n";

/// A gateway serving a temporary document root on two ephemeral ports.
pub struct TestGateway {
    pub dir: TempDir,
    pub addrs: Vec<SocketAddr>,
    pub stats: GatewayStats,
    pub registry: HandlerRegistry,
    shutdown: Shutdown,
    handle: JoinHandle<std::io::Result<()>>,
}

#[allow(dead_code)]
impl TestGateway {
    /// Start with `scripts` (name, `/bin/sh` source) in the document root.
    pub async fn start(scripts: &[(&str, &str)]) -> Self {
        Self::start_with(scripts, |_| {}).await
    }

    /// Like [`TestGateway::start`], with a chance to adjust the config.
    pub async fn start_with<F>(scripts: &[(&str, &str)], tweak: F) -> Self
    where
        F: FnOnce(&mut GatewayConfig),
    {
        let dir = tempfile::tempdir().unwrap();
        let www = dir.path().join("www");
        std::fs::create_dir_all(&www).unwrap();
        write_script(&www, "index.sh", INDEX_SH);
        for (name, source) in scripts {
            write_script(&www, name, source);
        }

        let mut config = GatewayConfig::default();
        config.listener.bind_addresses = vec!["127.0.0.1:0".into(), "127.0.0.1:0".into()];
        config.cgi.document_root = www.to_string_lossy().into_owned();
        config.cgi.index = "index.sh".into();
        config.cgi.timeout_secs = 2;
        config.cgi.inherit_env = vec!["PATH".into()];
        config.upload.directory = dir.path().join("uploads").to_string_lossy().into_owned();
        tweak(&mut config);

        startup::prepare_directories(&config).await.unwrap();
        let server = HttpServer::new(config.clone()).unwrap();
        let stats = server.stats();
        let registry = server.registry();

        let listeners = startup::bind_listeners(&config).await.unwrap();
        let addrs = listeners.iter().map(|l| l.local_addr().unwrap()).collect();

        let shutdown = Shutdown::new();
        let server_shutdown = shutdown.subscribe();
        let handle = tokio::spawn(server.run(listeners, server_shutdown));

        Self {
            dir,
            addrs,
            stats,
            registry,
            shutdown,
            handle,
        }
    }

    /// URL on the first listener.
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addrs[0], path)
    }

    /// URL on the second listener.
    pub fn url2(&self, path: &str) -> String {
        format!("http://{}{}", self.addrs[1], path)
    }

    pub fn www(&self) -> PathBuf {
        self.dir.path().join("www")
    }

    pub fn uploads(&self) -> PathBuf {
        self.dir.path().join("uploads")
    }

    /// Trigger shutdown and wait for every listener to drain.
    pub async fn stop(self) {
        self.shutdown.trigger();
        let _ = tokio::time::timeout(Duration::from_secs(10), self.handle).await;
    }
}

pub fn write_script(dir: &Path, name: &str, source: &str) {
    let path = dir.join(name);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(path, source).unwrap();
}

/// Client that never follows redirects or uses a proxy.
pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .pool_max_idle_per_host(0)
        .no_proxy()
        .timeout(Duration::from_secs(20))
        .build()
        .unwrap()
}

/// Whether a process with this PID still exists.
#[cfg(target_os = "linux")]
#[allow(dead_code)]
pub fn process_exists(pid: u32) -> bool {
    Path::new(&format!("/proc/{pid}")).exists()
}
