//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for a swift
//! instance. All types derive Serde traits for deserialization from config
//! files. Values are compared structurally; listeners are keyed by port.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Root configuration: every listener plus process-wide observability.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct SwiftConfig {
    /// One entry per listening port.
    pub servers: Vec<ServerConfig>,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// A single listener and the mode it serves.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct ServerConfig {
    /// Listen port. Port 0 asks the OS for an ephemeral port.
    pub port: u16,

    /// Interface to bind (e.g., "0.0.0.0").
    #[serde(default = "default_bind_host")]
    pub bind_host: String,

    /// Expected host-name prefix. Requests whose Host header does not start
    /// with it are rejected. `None` accepts every host.
    #[serde(default)]
    pub server_name: Option<String>,

    /// Maximum concurrent connections (backpressure on accept).
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,

    /// TLS settings. Disabled by default.
    #[serde(default)]
    pub tls: TlsConfig,

    /// What this listener does with accepted connections.
    pub mode: ServerMode,
}

fn default_bind_host() -> String {
    "0.0.0.0".to_string()
}

fn default_max_connections() -> usize {
    10_000
}

impl ServerConfig {
    /// A plaintext static-file listener.
    pub fn static_files(port: u16, document_root: impl Into<PathBuf>) -> Self {
        Self::with_mode(
            port,
            ServerMode::StaticFiles {
                document_root: document_root.into(),
            },
        )
    }

    /// A reverse-proxy listener relaying to `backend_host:backend_port`.
    pub fn reverse_proxy(port: u16, backend_host: impl Into<String>, backend_port: u16) -> Self {
        Self::with_mode(
            port,
            ServerMode::ReverseProxy(ProxyTarget {
                backend_host: backend_host.into(),
                backend_port,
                headers: Vec::new(),
            }),
        )
    }

    fn with_mode(port: u16, mode: ServerMode) -> Self {
        Self {
            port,
            bind_host: default_bind_host(),
            server_name: None,
            max_connections: default_max_connections(),
            tls: TlsConfig::default(),
            mode,
        }
    }

    /// Set the expected host name. Stored lower-cased.
    pub fn with_server_name(mut self, name: impl Into<String>) -> Self {
        self.server_name = Some(name.into().to_lowercase());
        self
    }

    /// Set the bind interface.
    pub fn with_bind_host(mut self, host: impl Into<String>) -> Self {
        self.bind_host = host.into();
        self
    }

    /// Enable TLS with a generated self-signed certificate.
    pub fn with_self_signed_tls(mut self, protocol_negotiation: bool) -> Self {
        self.tls = TlsConfig {
            enabled: true,
            self_signed: true,
            protocol_negotiation,
            cert_path: None,
            key_path: None,
        };
        self
    }

    /// Add a header injected into the first request relayed to the backend.
    /// No-op for static-file listeners.
    pub fn with_proxy_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        if let ServerMode::ReverseProxy(target) = &mut self.mode {
            target.headers.push(ProxyHeader {
                name: name.into(),
                value: value.into(),
            });
        }
        self
    }

    /// `host:port` string used for binding.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.bind_host, self.port)
    }

    /// Lower-cased expected host name, if any.
    pub fn expected_host(&self) -> Option<String> {
        self.server_name.as_ref().map(|name| name.to_lowercase())
    }
}

/// Listener mode. Selects which handler the runtime wires up.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMode {
    /// Serve files below `document_root`.
    StaticFiles { document_root: PathBuf },

    /// Relay raw TCP to a fixed backend.
    ReverseProxy(ProxyTarget),
}

impl ServerMode {
    /// Short label for logs and metrics.
    pub fn label(&self) -> &'static str {
        match self {
            ServerMode::StaticFiles { .. } => "static_files",
            ServerMode::ReverseProxy(_) => "reverse_proxy",
        }
    }
}

/// Fixed backend of a reverse-proxy listener.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct ProxyTarget {
    /// Backend host name or address.
    pub backend_host: String,

    /// Backend port.
    pub backend_port: u16,

    /// Headers injected into the first request head relayed upstream.
    #[serde(default)]
    pub headers: Vec<ProxyHeader>,
}

/// Injected header. `value` may contain `$remote_addr`, `$remote_port`
/// and `$host` placeholders.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct ProxyHeader {
    pub name: String,
    pub value: String,
}

/// TLS configuration for a listener.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct TlsConfig {
    /// Terminate TLS on this listener.
    pub enabled: bool,

    /// Generate an ephemeral self-signed certificate at startup.
    pub self_signed: bool,

    /// Advertise `h2` ahead of `http/1.1` during ALPN.
    pub protocol_negotiation: bool,

    /// Path to certificate chain (PEM). Used when `self_signed` is false.
    pub cert_path: Option<PathBuf>,

    /// Path to private key (PEM). Used when `self_signed` is false.
    pub key_path: Option<PathBuf>,
}

impl Default for TlsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            self_signed: true,
            protocol_negotiation: false,
            cert_path: None,
            key_path: None,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
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
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
