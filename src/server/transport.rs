//! Relay server: configuration and listener

use crate::server::registry::ConnectionRegistry;
use crate::server::router::MessageRouter;
use crate::server::websocket::{create_router, WsState};
use crate::storage::{DiskFileSink, FileSink};

use anyhow::{Context, Result};
use std::future::Future;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

/// Default listening port
pub const DEFAULT_PORT: u16 = 2024;

/// Default per-connection outbound queue depth
pub const DEFAULT_OUTBOUND_BUFFER: usize = 100;

/// Relay server configuration
#[derive(Debug, Clone)]
pub struct RelayServerConfig {
    /// Address to bind to
    pub bind_addr: SocketAddr,
    /// Directory uploaded files are written to
    pub upload_dir: PathBuf,
    /// Messages buffered per connection before sends to it start failing
    pub outbound_buffer: usize,
}

impl Default for RelayServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT)),
            upload_dir: PathBuf::from("uploads"),
            outbound_buffer: DEFAULT_OUTBOUND_BUFFER,
        }
    }
}

/// The relay server
pub struct RelayServer {
    config: RelayServerConfig,
    router: MessageRouter,
}

impl RelayServer {
    /// Create a server that stores uploads under `config.upload_dir`
    pub fn new(config: RelayServerConfig) -> Self {
        let sink = Arc::new(DiskFileSink::new(config.upload_dir.clone()));
        Self::with_sink(config, sink)
    }

    /// Create a server with a custom file sink
    pub fn with_sink(config: RelayServerConfig, sink: Arc<dyn FileSink>) -> Self {
        let registry = Arc::new(ConnectionRegistry::new());
        let router = MessageRouter::new(registry, sink);

        Self { config, router }
    }

    pub fn config(&self) -> &RelayServerConfig {
        &self.config
    }

    /// Get a handle to the message router
    pub fn router(&self) -> MessageRouter {
        self.router.clone()
    }

    /// Number of signed-in identities
    pub fn online_count(&self) -> usize {
        self.router.online_count()
    }

    /// Bind the configured address and serve forever
    pub async fn run(&self) -> Result<()> {
        self.run_until(std::future::pending()).await
    }

    /// Bind the configured address and serve until `shutdown` resolves
    pub async fn run_until<F>(&self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let listener = TcpListener::bind(self.config.bind_addr)
            .await
            .with_context(|| format!("Failed to bind {}", self.config.bind_addr))?;

        self.serve(listener, shutdown).await
    }

    /// Serve on an already-bound listener until `shutdown` resolves
    pub async fn serve<F>(&self, listener: TcpListener, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = listener.local_addr()?;
        let app = create_router(WsState {
            router: self.router.clone(),
            outbound_buffer: self.config.outbound_buffer,
        });

        info!(
            addr = %addr,
            upload_dir = %self.config.upload_dir.display(),
            "Relay server listening"
        );

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await
            .context("Server error")?;

        Ok(())
    }
}
