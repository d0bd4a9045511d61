//! Startup orchestration.
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Listeners bind last, after everything they depend on exists

use std::io;

use tokio::net::TcpListener;

use crate::config::GatewayConfig;

/// Create the directories the gateway writes into.
pub async fn prepare_directories(config: &GatewayConfig) -> io::Result<()> {
    if config.upload.enabled {
        tokio::fs::create_dir_all(&config.upload.directory).await?;
    }
    Ok(())
}

/// Bind every configured address, in order.
pub async fn bind_listeners(config: &GatewayConfig) -> io::Result<Vec<TcpListener>> {
    let mut listeners = Vec::with_capacity(config.listener.bind_addresses.len());
    for addr in &config.listener.bind_addresses {
        let listener = TcpListener::bind(addr).await.map_err(|e| {
            io::Error::new(e.kind(), format!("failed to bind {addr}: {e}"))
        })?;
        tracing::info!(address = %listener.local_addr()?, "Listening for connections");
        listeners.push(listener);
    }
    Ok(listeners)
}
