//! TLS context construction.
//!
//! # Responsibilities
//! - Build one immutable server context per listener at startup
//! - Generate an ephemeral self-signed certificate when asked to
//! - Load PEM certificate material otherwise
//! - Advertise application protocols in priority order
//!
//! # Design Decisions
//! - Any failure here is a configuration error: the listener must not start
//! - The ring provider is selected explicitly so the process default does not matter
//! - Without negotiation only `http/1.1` is advertised, for both certificate sources

use std::fmt;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer};
use thiserror::Error;
use tokio_rustls::TlsAcceptor;

use crate::config::TlsConfig;

/// ALPN identifier of HTTP/2.
pub const ALPN_H2: &[u8] = b"h2";

/// ALPN identifier of HTTP/1.1.
pub const ALPN_HTTP_11: &[u8] = b"http/1.1";

/// Subject name of generated certificates.
pub const SELF_SIGNED_NAME: &str = "localhost";

/// Errors raised while provisioning TLS.
#[derive(Debug, Error)]
pub enum TlsError {
    #[error("failed to generate self-signed certificate: {0}")]
    SelfSigned(#[from] rcgen::Error),

    #[error("failed to read {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("no certificates found in {0:?}")]
    NoCertificates(PathBuf),

    #[error("no private key found in {0:?}")]
    NoPrivateKey(PathBuf),

    #[error("TLS is enabled but no certificate source is configured")]
    MissingCertificateSource,

    #[error("invalid TLS configuration: {0}")]
    Rustls(#[from] rustls::Error),
}

/// Server-side TLS context shared read-only by every connection of a listener.
#[derive(Clone)]
pub struct TlsContext {
    acceptor: TlsAcceptor,
    certificate: CertificateDer<'static>,
    protocols: Vec<Vec<u8>>,
}

impl TlsContext {
    /// Acceptor performing the server handshake.
    pub fn acceptor(&self) -> &TlsAcceptor {
        &self.acceptor
    }

    /// Leaf certificate presented to clients.
    pub fn certificate(&self) -> &CertificateDer<'static> {
        &self.certificate
    }

    /// ALPN protocols in priority order.
    pub fn advertised_protocols(&self) -> &[Vec<u8>] {
        &self.protocols
    }
}

impl fmt::Debug for TlsContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let protocols: Vec<_> = self
            .protocols
            .iter()
            .map(|p| String::from_utf8_lossy(p).into_owned())
            .collect();
        f.debug_struct("TlsContext")
            .field("protocols", &protocols)
            .finish_non_exhaustive()
    }
}

/// Build the TLS context for a listener, or `None` for plaintext.
pub fn build_tls_context(config: &TlsConfig) -> Result<Option<TlsContext>, TlsError> {
    if !config.enabled {
        return Ok(None);
    }

    let (chain, key) = if config.self_signed {
        generate_self_signed()?
    } else {
        match (&config.cert_path, &config.key_path) {
            (Some(cert_path), Some(key_path)) => load_pem(cert_path, key_path)?,
            _ => return Err(TlsError::MissingCertificateSource),
        }
    };

    let certificate = chain[0].clone();
    let protocols = advertised_protocols(config.protocol_negotiation);

    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let mut server_config = rustls::ServerConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()?
        .with_no_client_auth()
        .with_single_cert(chain, key)?;
    server_config.alpn_protocols = protocols.clone();

    tracing::info!(
        self_signed = config.self_signed,
        protocols = ?protocols.iter().map(|p| String::from_utf8_lossy(p).into_owned()).collect::<Vec<_>>(),
        "TLS context ready"
    );

    Ok(Some(TlsContext {
        acceptor: TlsAcceptor::from(Arc::new(server_config)),
        certificate,
        protocols,
    }))
}

fn advertised_protocols(negotiation: bool) -> Vec<Vec<u8>> {
    if negotiation {
        vec![ALPN_H2.to_vec(), ALPN_HTTP_11.to_vec()]
    } else {
        vec![ALPN_HTTP_11.to_vec()]
    }
}

type CertifiedChain = (Vec<CertificateDer<'static>>, PrivateKeyDer<'static>);

/// Ephemeral certificate valid for this process only; never persisted.
fn generate_self_signed() -> Result<CertifiedChain, TlsError> {
    let rcgen::CertifiedKey { cert, key_pair } =
        rcgen::generate_simple_self_signed(vec![SELF_SIGNED_NAME.to_string()])?;
    let key = PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(key_pair.serialize_der()));
    Ok((vec![cert.der().clone()], key))
}

fn load_pem(cert_path: &Path, key_path: &Path) -> Result<CertifiedChain, TlsError> {
    let chain = rustls_pemfile::certs(&mut open(cert_path)?)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|source| TlsError::Io {
            path: cert_path.to_path_buf(),
            source,
        })?;
    if chain.is_empty() {
        return Err(TlsError::NoCertificates(cert_path.to_path_buf()));
    }

    let key = rustls_pemfile::private_key(&mut open(key_path)?)
        .map_err(|source| TlsError::Io {
            path: key_path.to_path_buf(),
            source,
        })?
        .ok_or_else(|| TlsError::NoPrivateKey(key_path.to_path_buf()))?;

    Ok((chain, key))
}

fn open(path: &Path) -> Result<BufReader<File>, TlsError> {
    File::open(path)
        .map(BufReader::new)
        .map_err(|source| TlsError::Io {
            path: path.to_path_buf(),
            source,
        })
}
