//! Startup orchestration.
//!
//! # Responsibilities
//! - Collect listener configurations, one per port
//! - Validate everything and build every TLS context before binding
//! - Bind every listener before any of them serves traffic
//! - Hand back a handle that waits for shutdown and drains connections
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal and nothing serves
//! - Listeners start last (traffic only when ready)
//! - Waiting blocks on the shutdown channel, never on a busy loop

use std::net::SocketAddr;
use std::time::Duration;

use thiserror::Error;
use tokio::task::JoinHandle;

use crate::config::validation::validate_config;
use crate::config::{ConfigError, ServerConfig, SwiftConfig};
use crate::lifecycle::shutdown::Shutdown;
use crate::net::{ConnectionTracker, Listener, ListenerError, TlsError};
use crate::server::{Pipeline, Server};

/// How long `join` waits for in-flight connections after shutdown.
pub const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Errors that prevent the registry from starting.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("port {0} already has a server")]
    DuplicatePort(u16),

    #[error("no servers configured")]
    NoServers,

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("port {port}: {source}")]
    Tls {
        port: u16,
        #[source]
        source: TlsError,
    },

    #[error(transparent)]
    Listener(#[from] ListenerError),
}

/// Registry of configured listeners.
#[derive(Debug, Default)]
pub struct Swift {
    servers: Vec<ServerConfig>,
}

impl Swift {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding every server of `config`.
    pub fn from_config(config: &SwiftConfig) -> Result<Self, StartupError> {
        let mut swift = Self::new();
        for server in &config.servers {
            swift.add_server(server.clone())?;
        }
        Ok(swift)
    }

    /// Register a listener. A second server on the same non-zero port is
    /// rejected.
    pub fn add_server(&mut self, config: ServerConfig) -> Result<&mut Self, StartupError> {
        if config.port != 0 && self.servers.iter().any(|s| s.port == config.port) {
            return Err(StartupError::DuplicatePort(config.port));
        }
        self.servers.push(config);
        Ok(self)
    }

    pub fn servers(&self) -> &[ServerConfig] {
        &self.servers
    }

    /// Validate, provision TLS, bind, then start every accept loop.
    pub async fn start(self) -> Result<RunningSwift, StartupError> {
        if self.servers.is_empty() {
            return Err(StartupError::NoServers);
        }

        let config = SwiftConfig {
            servers: self.servers,
            ..SwiftConfig::default()
        };
        validate_config(&config).map_err(|errors| StartupError::Config(ConfigError::Validation(errors)))?;

        let mut pipelines = Vec::with_capacity(config.servers.len());
        for server in &config.servers {
            let pipeline = Pipeline::from_config(server).map_err(|source| StartupError::Tls {
                port: server.port,
                source,
            })?;
            pipelines.push(pipeline);
        }

        let mut listeners = Vec::with_capacity(config.servers.len());
        for server in &config.servers {
            listeners.push(Listener::bind(server).await?);
        }

        let shutdown = Shutdown::new();
        let tracker = ConnectionTracker::new();
        let mut local_addrs = Vec::with_capacity(listeners.len());
        let mut servers = Vec::with_capacity(listeners.len());
        for (listener, pipeline) in listeners.into_iter().zip(pipelines) {
            let server = Server::new(listener, pipeline, tracker.clone());
            let address = server.local_addr().map_err(|source| {
                StartupError::Listener(ListenerError::Accept(source))
            })?;
            local_addrs.push(address);
            servers.push(server);
        }

        let tasks = servers
            .into_iter()
            .map(|server| tokio::spawn(server.run(shutdown.subscribe())))
            .collect();

        tracing::info!(listeners = local_addrs.len(), "Swift started");

        Ok(RunningSwift {
            local_addrs,
            tasks,
            shutdown_rx: shutdown.subscribe(),
            shutdown,
            tracker,
        })
    }
}

/// Handle to a started registry.
#[derive(Debug)]
pub struct RunningSwift {
    local_addrs: Vec<SocketAddr>,
    tasks: Vec<JoinHandle<()>>,
    shutdown: Shutdown,
    shutdown_rx: tokio::sync::broadcast::Receiver<()>,
    tracker: ConnectionTracker,
}

impl RunningSwift {
    /// Bound addresses, in registration order.
    pub fn local_addrs(&self) -> &[SocketAddr] {
        &self.local_addrs
    }

    /// Handle that stops every listener when triggered.
    pub fn shutdown_handle(&self) -> Shutdown {
        self.shutdown.clone()
    }

    /// Stop accepting on every listener.
    pub fn shutdown(&self) {
        self.shutdown.trigger();
    }

    pub fn active_connections(&self) -> u64 {
        self.tracker.active_count()
    }

    /// Wait for shutdown, then for the accept loops to exit and open
    /// connections to drain (bounded by [`DRAIN_TIMEOUT`]).
    pub async fn join(mut self) {
        let _ = self.shutdown_rx.recv().await;

        for task in self.tasks {
            if let Err(err) = task.await {
                tracing::error!(error = %err, "Accept loop panicked");
            }
        }

        if self.tracker.wait_for_drain(DRAIN_TIMEOUT).await {
            tracing::info!("All connections drained");
        } else {
            tracing::warn!(
                active = self.tracker.active_count(),
                "Drain timeout reached, abandoning open connections"
            );
        }
    }
}
