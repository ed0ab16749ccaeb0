//! Per-listener runtime.
//!
//! # Responsibilities
//! - Build the handler set (pipeline) for one configured listener
//! - Run the accept loop until shutdown
//! - Give every connection its own task, span and tracker guard
//!
//! # Design Decisions
//! - The pipeline is built once and shared read-only by every connection
//! - Connection failures end that connection only; the loop keeps accepting

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpStream;
use tokio::sync::broadcast;
use tracing::Instrument;

use crate::config::{ServerConfig, ServerMode};
use crate::http::serve_negotiated;
use crate::net::{build_tls_context, negotiate, ConnectionTracker, Listener, ListenerError, TlsContext, TlsError};
use crate::observability::metrics;
use crate::proxy::ProxyRelay;
use crate::static_files::StaticFileHandler;

/// Pause after a failed accept so descriptor exhaustion does not spin.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(50);

/// Handlers wired up for one listener.
#[derive(Debug, Clone)]
pub enum Pipeline {
    StaticFiles {
        handler: Arc<StaticFileHandler>,
        tls: Option<TlsContext>,
    },
    ReverseProxy(Arc<ProxyRelay>),
}

impl Pipeline {
    /// Build the pipeline, including the TLS context when enabled.
    pub fn from_config(config: &ServerConfig) -> Result<Self, TlsError> {
        match &config.mode {
            ServerMode::StaticFiles { document_root } => Ok(Pipeline::StaticFiles {
                handler: Arc::new(StaticFileHandler::new(
                    document_root.clone(),
                    config.expected_host(),
                )),
                tls: build_tls_context(&config.tls)?,
            }),
            ServerMode::ReverseProxy(target) => {
                Ok(Pipeline::ReverseProxy(Arc::new(ProxyRelay::new(target.clone()))))
            }
        }
    }

    /// Metric label of this pipeline.
    pub fn mode(&self) -> &'static str {
        match self {
            Pipeline::StaticFiles { tls: None, .. } => "static_files",
            Pipeline::StaticFiles { tls: Some(_), .. } => "static_files_tls",
            Pipeline::ReverseProxy(_) => "reverse_proxy",
        }
    }

    pub fn tls(&self) -> Option<&TlsContext> {
        match self {
            Pipeline::StaticFiles { tls, .. } => tls.as_ref(),
            Pipeline::ReverseProxy(_) => None,
        }
    }
}

/// Drive one accepted connection to completion.
pub async fn handle_connection(stream: TcpStream, peer: SocketAddr, pipeline: &Pipeline) {
    let _ = stream.set_nodelay(true);

    match pipeline {
        Pipeline::StaticFiles { handler, tls } => {
            let negotiated = match negotiate(stream, tls.as_ref()).await {
                Ok(negotiated) => negotiated,
                Err(err) => {
                    metrics::record_tls_handshake_failure();
                    tracing::debug!(error = %err, "TLS handshake failed");
                    return;
                }
            };
            let protocol = negotiated.protocol();
            if let Err(err) = serve_negotiated(negotiated, Arc::clone(handler)).await {
                tracing::debug!(protocol = protocol.as_str(), error = %err, "Connection ended with error");
            }
        }
        Pipeline::ReverseProxy(relay) => {
            // Connect failures are logged by the relay.
            let _ = relay.attach(stream, peer).await;
        }
    }
}

/// Accept loop of one listener.
#[derive(Debug)]
pub struct Server {
    listener: Listener,
    pipeline: Arc<Pipeline>,
    tracker: ConnectionTracker,
}

impl Server {
    pub fn new(listener: Listener, pipeline: Pipeline, tracker: ConnectionTracker) -> Self {
        Self {
            listener,
            pipeline: Arc::new(pipeline),
            tracker,
        }
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept until `shutdown` fires. In-flight connections keep running.
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        let mode = self.pipeline.mode();
        tracing::info!(address = ?self.listener.local_addr().ok(), mode, "Server accepting");

        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    tracing::info!(mode, "Server stopped accepting");
                    break;
                }
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer, permit)) => {
                        metrics::record_connection(mode);
                        let guard = self.tracker.track();
                        let pipeline = Arc::clone(&self.pipeline);
                        let span = tracing::info_span!(
                            "connection",
                            connection_id = %guard.id(),
                            peer_addr = %peer,
                        );

                        tokio::spawn(
                            async move {
                                handle_connection(stream, peer, &pipeline).await;
                                drop(permit);
                                drop(guard);
                            }
                            .instrument(span),
                        );
                    }
                    Err(ListenerError::Closed) => break,
                    Err(err) => {
                        tracing::warn!(error = %err, "Accept failed");
                        tokio::time::sleep(ACCEPT_BACKOFF).await;
                    }
                },
            }
        }
    }
}
