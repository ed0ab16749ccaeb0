//! Per-connection protocol selection.
//!
//! ```text
//! accepted TcpStream
//!     → await handshake      (skipped in plaintext mode)
//!     → inspect ALPN result
//!     → Negotiated::{Plain, Tls { protocol }}
//! ```
//!
//! A failed handshake ends the connection with no response.

use tokio::net::TcpStream;
use tokio_rustls::server::TlsStream;

use crate::net::tls::{TlsContext, ALPN_H2};

/// Application protocol agreed for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplicationProtocol {
    /// Multiplexed binary framing (`h2`).
    Http2,
    /// Plain HTTP/1.1 framing.
    Http11,
}

impl ApplicationProtocol {
    /// Map the ALPN result. No negotiation falls back to HTTP/1.1.
    pub fn from_alpn(negotiated: Option<&[u8]>) -> Self {
        match negotiated {
            Some(ALPN_H2) => ApplicationProtocol::Http2,
            _ => ApplicationProtocol::Http11,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ApplicationProtocol::Http2 => "h2",
            ApplicationProtocol::Http11 => "http/1.1",
        }
    }
}

/// Connection after the selection step, ready for a pipeline.
#[derive(Debug)]
pub enum Negotiated {
    Plain(TcpStream),
    Tls {
        stream: Box<TlsStream<TcpStream>>,
        protocol: ApplicationProtocol,
    },
}

impl Negotiated {
    pub fn protocol(&self) -> ApplicationProtocol {
        match self {
            Negotiated::Plain(_) => ApplicationProtocol::Http11,
            Negotiated::Tls { protocol, .. } => *protocol,
        }
    }

    pub fn is_encrypted(&self) -> bool {
        matches!(self, Negotiated::Tls { .. })
    }
}

/// Run the handshake (when `tls` is set) and report the selected protocol.
pub async fn negotiate(
    stream: TcpStream,
    tls: Option<&TlsContext>,
) -> std::io::Result<Negotiated> {
    let Some(tls) = tls else {
        return Ok(Negotiated::Plain(stream));
    };

    let stream = tls.acceptor().accept(stream).await?;
    let protocol = ApplicationProtocol::from_alpn(stream.get_ref().1.alpn_protocol());
    tracing::debug!(protocol = protocol.as_str(), "TLS handshake complete");

    Ok(Negotiated::Tls {
        stream: Box::new(stream),
        protocol,
    })
}
