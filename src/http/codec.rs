//! HTTP/1.1 request-head decoder and response-head encoder.
//!
//! Request heads are parsed with `httparse` from a connection-owned buffer so
//! pipelined bytes survive between exchanges.

use bytes::{Buf, BytesMut};
use hyper::header::{HeaderMap, HeaderName, HeaderValue, CONNECTION, CONTENT_LENGTH, TRANSFER_ENCODING};
use hyper::{Method, StatusCode};
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::http::request::{DecodeError, PendingRequest};

/// Largest accepted request head.
pub const MAX_HEAD_SIZE: usize = 16 * 1024;

/// Most headers accepted in one request.
pub const MAX_HEADERS: usize = 64;

/// Outcome of reading one request head.
#[derive(Debug)]
pub enum Decoded {
    /// A complete head. `has_body` is set when a body follows that will not
    /// be read; the connection must close after the response.
    Request {
        request: PendingRequest,
        has_body: bool,
    },
    /// Bytes arrived that are not a valid head.
    Invalid(DecodeError),
    /// The peer closed cleanly between requests.
    Closed,
}

/// Read the next request head from `reader`, buffering into `buf`.
pub async fn read_request<R>(reader: &mut R, buf: &mut BytesMut) -> std::io::Result<Decoded>
where
    R: AsyncRead + Unpin,
{
    loop {
        if !buf.is_empty() {
            match parse_head(buf) {
                Ok(Some((decoded, consumed))) => {
                    buf.advance(consumed);
                    return Ok(decoded);
                }
                Ok(None) if buf.len() >= MAX_HEAD_SIZE => {
                    return Ok(Decoded::Invalid(DecodeError::TooLarge(MAX_HEAD_SIZE)));
                }
                Ok(None) => {}
                Err(err) => return Ok(Decoded::Invalid(err)),
            }
        }

        if reader.read_buf(buf).await? == 0 {
            return if buf.is_empty() {
                Ok(Decoded::Closed)
            } else {
                Err(std::io::ErrorKind::UnexpectedEof.into())
            };
        }
    }
}

fn parse_head(buf: &[u8]) -> Result<Option<(Decoded, usize)>, DecodeError> {
    let mut storage = [httparse::EMPTY_HEADER; MAX_HEADERS];
    let mut parsed = httparse::Request::new(&mut storage);
    let consumed = match parsed.parse(buf)? {
        httparse::Status::Complete(len) => len,
        httparse::Status::Partial => return Ok(None),
    };

    let method = parsed
        .method
        .and_then(|m| Method::from_bytes(m.as_bytes()).ok())
        .ok_or(DecodeError::Method)?;
    let target = parsed.path.unwrap_or("/").to_string();
    let minor = parsed.version.unwrap_or(1);
    if minor > 1 {
        return Err(DecodeError::Version(minor));
    }

    let mut headers = HeaderMap::with_capacity(parsed.headers.len());
    for header in parsed.headers.iter() {
        let name = HeaderName::from_bytes(header.name.as_bytes())
            .map_err(|_| DecodeError::Malformed(httparse::Error::HeaderName))?;
        let value = HeaderValue::from_bytes(header.value)
            .map_err(|_| DecodeError::Malformed(httparse::Error::HeaderValue))?;
        headers.append(name, value);
    }

    let keep_alive = is_keep_alive(minor, &headers);
    let has_body = headers.contains_key(TRANSFER_ENCODING)
        || headers
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .map_or(false, |v| v.trim() != "0");

    let request = PendingRequest::new(method, target, headers, keep_alive);
    Ok(Some((Decoded::Request { request, has_body }, consumed)))
}

/// HTTP/1.1 defaults to keep-alive; HTTP/1.0 needs an explicit token.
fn is_keep_alive(minor: u8, headers: &HeaderMap) -> bool {
    let tokens = headers
        .get_all(CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .map(|t| t.trim().to_ascii_lowercase())
        .collect::<Vec<_>>();

    if tokens.iter().any(|t| t == "close") {
        return false;
    }
    minor == 1 || tokens.iter().any(|t| t == "keep-alive")
}

/// Encode a response head. When `close` is set any `Connection` header is
/// replaced by `connection: close`.
pub fn encode_head(status: StatusCode, headers: &HeaderMap, close: bool) -> Vec<u8> {
    let mut head = Vec::with_capacity(256);
    head.extend_from_slice(b"HTTP/1.1 ");
    head.extend_from_slice(status.as_str().as_bytes());
    head.push(b' ');
    head.extend_from_slice(status.canonical_reason().unwrap_or("").as_bytes());
    head.extend_from_slice(b"\r\n");

    for (name, value) in headers {
        if close && name == CONNECTION {
            continue;
        }
        head.extend_from_slice(name.as_str().as_bytes());
        head.extend_from_slice(b": ");
        head.extend_from_slice(value.as_bytes());
        head.extend_from_slice(b"\r\n");
    }
    if close {
        head.extend_from_slice(b"connection: close\r\n");
    }
    head.extend_from_slice(b"\r\n");
    head
}
