//! TCP acceptor and per-connection driving loop.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use thermomatic_core::Error;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::ServerConfig;
use crate::registry::DeviceRegistry;
use crate::session::Session;

/// The telemetry ingest listener.
pub struct Server {
    listener: TcpListener,
    registry: Arc<DeviceRegistry>,
    config: ServerConfig,
}

impl Server {
    /// Binds the ingest listener. The registry is shared with the query
    /// surface.
    pub async fn bind(config: ServerConfig, registry: Arc<DeviceRegistry>) -> Result<Self> {
        let addr = SocketAddr::from(([0, 0, 0, 0], config.tcp_port));
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("failed to bind ingest listener on {addr}"))?;
        info!("listening for device connections on {}", listener.local_addr()?);

        Ok(Self {
            listener,
            registry,
            config,
        })
    }

    /// Actual bound address; the configured port may be 0 in tests.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept loop. Spawns one session task per connection and runs until
    /// `shutdown` fires, then closes the listener and drains every live
    /// session before returning.
    pub async fn run(self, shutdown: CancellationToken) {
        let mut sessions = JoinSet::new();

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                accepted = self.listener.accept() => {
                    match accepted {
                        Ok((stream, peer)) => {
                            debug!("connection from {peer}");
                            let registry = Arc::clone(&self.registry);
                            let config = self.config.clone();
                            let cancel = shutdown.child_token();
                            sessions.spawn(async move {
                                handle_connection(stream, peer, registry, config, cancel).await;
                            });
                        }
                        Err(e) => {
                            warn!("accept failed: {e}");
                            continue;
                        }
                    }
                }
            }
        }

        drop(self.listener);
        info!("draining {} live sessions", sessions.len());
        while sessions.join_next().await.is_some() {}
        info!("ingest server exited");
    }
}

/// Drives one connection from identity ingest to its terminal transition.
/// Dropping the stream on the way out closes the socket; the server never
/// writes to it.
async fn handle_connection(
    stream: TcpStream,
    peer: SocketAddr,
    registry: Arc<DeviceRegistry>,
    config: ServerConfig,
    cancel: CancellationToken,
) {
    let mut session = match Session::new(stream, cancel, config).await {
        Ok(session) => session,
        Err(err) => {
            warn!("rejected connection from {peer}: {err}");
            return;
        }
    };

    let imei = session.imei();
    if !registry.insert_if_absent(session.handle()).await {
        warn!("{}", Error::DuplicateImei(imei));
        return;
    }

    let result = match session.process_login().await {
        Ok(()) => session.process_readings().await,
        Err(err) => Err(err),
    };
    registry.remove(imei).await;

    match result {
        Ok(()) => info!("[imei {imei}] session closed"),
        Err(err) => info!("[imei {imei}] session closed: {err}"),
    }
}
