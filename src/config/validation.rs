//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Reject listener combinations the runtime cannot serve
//! - Check the document root before a static-file listener starts
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is a pure function over the config plus read-only filesystem checks
//! - Runs before any listener is bound

use std::collections::HashSet;
use std::path::PathBuf;

use hyper::header::HeaderName;
use thiserror::Error;

use crate::config::schema::{ServerConfig, ServerMode, SwiftConfig};

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("port {0} is configured more than once")]
    DuplicatePort(u16),

    #[error("port {0}: protocol negotiation requires TLS to be enabled")]
    NegotiationWithoutTls(u16),

    #[error("port {0}: TLS requires a self-signed certificate or both cert_path and key_path")]
    MissingCertificate(u16),

    #[error("port {port}: document root {path:?} is not a readable directory")]
    DocumentRoot { port: u16, path: PathBuf },

    #[error("port {0}: backend host must not be empty")]
    EmptyBackendHost(u16),

    #[error("port {0}: backend port must not be zero")]
    ZeroBackendPort(u16),

    #[error("port {0}: TLS is not supported on a reverse proxy listener")]
    TlsOnProxy(u16),

    #[error("port {port}: invalid proxy header name {name:?}")]
    InvalidHeaderName { port: u16, name: String },

    #[error("port {0}: max_connections must be greater than zero")]
    ZeroMaxConnections(u16),
}

/// Validate every server and cross-server constraints.
pub fn validate_config(config: &SwiftConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();
    let mut seen = HashSet::new();

    for server in &config.servers {
        // Port 0 is ephemeral and never collides.
        if server.port != 0 && !seen.insert(server.port) {
            errors.push(ValidationError::DuplicatePort(server.port));
        }
        if let Err(mut server_errors) = validate_server(server) {
            errors.append(&mut server_errors);
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Validate a single listener.
pub fn validate_server(server: &ServerConfig) -> Result<(), Vec<ValidationError>> {
    let port = server.port;
    let mut errors = Vec::new();

    if server.max_connections == 0 {
        errors.push(ValidationError::ZeroMaxConnections(port));
    }

    let tls = &server.tls;
    if tls.protocol_negotiation && !tls.enabled {
        errors.push(ValidationError::NegotiationWithoutTls(port));
    }
    if tls.enabled && !tls.self_signed && (tls.cert_path.is_none() || tls.key_path.is_none()) {
        errors.push(ValidationError::MissingCertificate(port));
    }

    match &server.mode {
        ServerMode::StaticFiles { document_root } => {
            let readable = document_root.is_dir() && std::fs::read_dir(document_root).is_ok();
            if !readable {
                errors.push(ValidationError::DocumentRoot {
                    port,
                    path: document_root.clone(),
                });
            }
        }
        ServerMode::ReverseProxy(target) => {
            if target.backend_host.trim().is_empty() {
                errors.push(ValidationError::EmptyBackendHost(port));
            }
            if target.backend_port == 0 {
                errors.push(ValidationError::ZeroBackendPort(port));
            }
            if tls.enabled {
                errors.push(ValidationError::TlsOnProxy(port));
            }
            for header in &target.headers {
                if HeaderName::from_bytes(header.name.as_bytes()).is_err() {
                    errors.push(ValidationError::InvalidHeaderName {
                        port,
                        name: header.name.clone(),
                    });
                }
            }
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
