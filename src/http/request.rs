//! Decoded request model shared by every framing.
//!
//! # Responsibilities
//! - Hold method, target and headers of one exchange
//! - Answer keep-alive and host questions uniformly for HTTP/1.1 and h2
//!
//! # Design Decisions
//! - A request lives for exactly one request/response exchange
//! - Bodies are never read: only `GET` is served

use hyper::header::{HeaderMap, HeaderValue, HOST};
use hyper::{Method, Uri};
use thiserror::Error;

/// Why a request could not be decoded.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("malformed request head: {0}")]
    Malformed(#[from] httparse::Error),

    #[error("request head exceeds {0} bytes")]
    TooLarge(usize),

    #[error("invalid request method")]
    Method,

    #[error("unsupported HTTP version 1.{0}")]
    Version(u8),
}

/// A parsed request, scoped to one exchange.
#[derive(Debug, Clone)]
pub struct PendingRequest {
    method: Method,
    target: String,
    headers: HeaderMap,
    keep_alive: bool,
}

impl PendingRequest {
    pub fn new(method: Method, target: impl Into<String>, headers: HeaderMap, keep_alive: bool) -> Self {
        Self {
            method,
            target: target.into(),
            headers,
            keep_alive,
        }
    }

    /// Build from an h2 request. The `:authority` pseudo-header stands in
    /// for a missing Host header; streams are always kept alive.
    pub fn from_h2(method: &Method, uri: &Uri, headers: &HeaderMap) -> Self {
        let mut headers = headers.clone();
        if !headers.contains_key(HOST) {
            if let Some(authority) = uri.authority() {
                if let Ok(value) = HeaderValue::from_str(authority.as_str()) {
                    headers.insert(HOST, value);
                }
            }
        }
        let target = uri
            .path_and_query()
            .map(|pq| pq.as_str().to_string())
            .unwrap_or_else(|| "/".to_string());

        Self::new(method.clone(), target, headers, true)
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Raw request target as sent by the client.
    pub fn target(&self) -> &str {
        &self.target
    }

    /// Target without query string or fragment.
    pub fn path(&self) -> &str {
        self.target
            .split(['?', '#'])
            .next()
            .unwrap_or_default()
    }

    /// Query string including the leading `?`, if any.
    pub fn query(&self) -> Option<&str> {
        let path = self.path();
        let rest = &self.target[path.len()..];
        rest.split('#')
            .next()
            .filter(|query| query.starts_with('?'))
    }

    pub fn header(&self, name: impl hyper::header::AsHeaderName) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn host(&self) -> Option<&str> {
        self.header(HOST)
    }

    /// Whether the client asked to reuse the connection.
    pub fn keep_alive(&self) -> bool {
        self.keep_alive
    }
}
