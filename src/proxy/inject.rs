//! Fixed header injection into the first proxied request head.
//!
//! Values may contain the placeholders `$remote_addr`, `$remote_port` and
//! `$host` (the client's Host header, or the backend host when absent).
//! Injection happens once per connection, on the first request head. The
//! relay keeps feeding client bytes until the head is complete; bytes that
//! are clearly not HTTP are relayed untouched, and a head that outgrows
//! [`MAX_HEAD_SIZE`] ends the connection instead of reaching the backend
//! without its headers.

use std::net::SocketAddr;

use crate::config::ProxyHeader;
use crate::http::codec::{MAX_HEADERS, MAX_HEAD_SIZE};

/// Configured headers for one proxy listener.
#[derive(Debug, Clone, Default)]
pub struct HeaderInjector {
    headers: Vec<ProxyHeader>,
}

impl HeaderInjector {
    pub fn new(headers: Vec<ProxyHeader>) -> Self {
        Self { headers }
    }

    pub fn is_empty(&self) -> bool {
        self.headers.is_empty()
    }

    /// Bind the injector to one connection.
    pub fn first_hop<'a>(&'a self, remote: SocketAddr, backend_host: &'a str) -> FirstHop<'a> {
        FirstHop {
            injector: self,
            remote,
            backend_host,
        }
    }
}

/// What to do with the client bytes buffered so far.
#[derive(Debug, PartialEq, Eq)]
pub enum Rewrite {
    /// The head was complete; send these bytes instead.
    Ready(Vec<u8>),
    /// The head is still incomplete; read more.
    Partial,
    /// Nothing to inject into; send the buffered bytes as they are.
    Passthrough,
    /// The head exceeds the size or header-count limit.
    Oversized,
}

/// Header injection bound to one client connection.
#[derive(Debug, Clone, Copy)]
pub struct FirstHop<'a> {
    injector: &'a HeaderInjector,
    remote: SocketAddr,
    backend_host: &'a str,
}

impl FirstHop<'_> {
    /// Rewrite the bytes buffered from the client with the configured
    /// headers. Headers of the same name already present are replaced.
    pub fn rewrite(&self, buffered: &[u8]) -> Rewrite {
        if self.injector.is_empty() {
            return Rewrite::Passthrough;
        }

        let mut storage = [httparse::EMPTY_HEADER; MAX_HEADERS];
        let mut request = httparse::Request::new(&mut storage);
        let head_len = match request.parse(buffered) {
            Ok(httparse::Status::Complete(len)) => len,
            Ok(httparse::Status::Partial) if buffered.len() >= MAX_HEAD_SIZE => {
                return Rewrite::Oversized
            }
            Ok(httparse::Status::Partial) => return Rewrite::Partial,
            Err(httparse::Error::TooManyHeaders) => return Rewrite::Oversized,
            Err(_) => return Rewrite::Passthrough,
        };
        if head_len > MAX_HEAD_SIZE {
            return Rewrite::Oversized;
        }
        let (Some(method), Some(path), Some(version)) =
            (request.method, request.path, request.version)
        else {
            return Rewrite::Passthrough;
        };

        let client_host = request
            .headers
            .iter()
            .find(|h| h.name.eq_ignore_ascii_case("host"))
            .and_then(|h| std::str::from_utf8(h.value).ok())
            .unwrap_or(self.backend_host);

        let mut out = Vec::with_capacity(buffered.len() + 64 * self.injector.headers.len());
        out.extend_from_slice(method.as_bytes());
        out.push(b' ');
        out.extend_from_slice(path.as_bytes());
        out.extend_from_slice(format!(" HTTP/1.{version}\r\n").as_bytes());

        for header in request.headers.iter() {
            let replaced = self
                .injector
                .headers
                .iter()
                .any(|h| h.name.eq_ignore_ascii_case(header.name));
            if replaced {
                continue;
            }
            out.extend_from_slice(header.name.as_bytes());
            out.extend_from_slice(b": ");
            out.extend_from_slice(header.value);
            out.extend_from_slice(b"\r\n");
        }

        for header in &self.injector.headers {
            out.extend_from_slice(header.name.as_bytes());
            out.extend_from_slice(b": ");
            out.extend_from_slice(self.expand(&header.value, client_host).as_bytes());
            out.extend_from_slice(b"\r\n");
        }
        out.extend_from_slice(b"\r\n");
        out.extend_from_slice(&buffered[head_len..]);
        Rewrite::Ready(out)
    }

    fn expand(&self, template: &str, client_host: &str) -> String {
        template
            .replace("$remote_addr", &self.remote.ip().to_string())
            .replace("$remote_port", &self.remote.port().to_string())
            .replace("$host", client_host)
    }
}
