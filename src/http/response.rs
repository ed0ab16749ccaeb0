//! Framing-independent responses.
//!
//! # Responsibilities
//! - Describe status, headers and body of one response
//! - Build the fixed failure, redirect, not-modified and listing replies
//! - Own the file handle being streamed until transfer ends
//!
//! # Design Decisions
//! - Every failure reply closes the connection after it is written
//! - `Connection` headers are added by the HTTP/1.1 encoder, never for h2

use std::time::SystemTime;

use bytes::Bytes;
use hyper::header::{HeaderMap, HeaderValue, CONTENT_LENGTH, CONTENT_TYPE, DATE, LOCATION};
use hyper::StatusCode;
use tokio::fs::File;
use tokio::io::AsyncReadExt;

use crate::http::date::format_http_date;

/// Fixed chunk size for user-space file transfer.
pub const CHUNK_SIZE: usize = 8 * 1024;

/// An open file and the byte range `[0, length)` to transmit.
///
/// Dropping it closes the handle, so it is released exactly once whether the
/// transfer completes or the connection goes away.
#[derive(Debug)]
pub struct StreamedFile {
    file: File,
    length: u64,
    sent: u64,
}

impl StreamedFile {
    pub fn new(file: File, length: u64) -> Self {
        Self {
            file,
            length,
            sent: 0,
        }
    }

    pub fn length(&self) -> u64 {
        self.length
    }

    pub fn remaining(&self) -> u64 {
        self.length - self.sent
    }

    pub fn file(&self) -> &File {
        &self.file
    }

    /// Record bytes moved by a transfer that bypassed `read_chunk`.
    pub fn advance(&mut self, bytes: u64) {
        self.sent = (self.sent + bytes).min(self.length);
    }

    /// Read the next chunk of at most [`CHUNK_SIZE`] bytes.
    /// Returns `None` once `length` bytes have been produced.
    pub async fn read_chunk(&mut self) -> std::io::Result<Option<Bytes>> {
        let remaining = self.remaining();
        if remaining == 0 {
            return Ok(None);
        }

        let want = remaining.min(CHUNK_SIZE as u64) as usize;
        let mut buf = vec![0u8; want];
        let read = self.file.read(&mut buf).await?;
        if read == 0 {
            return Err(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "file shrank during transfer",
            ));
        }
        buf.truncate(read);
        self.sent += read as u64;
        Ok(Some(Bytes::from(buf)))
    }
}

/// Response body.
#[derive(Debug)]
pub enum ReplyBody {
    Empty,
    Full(Bytes),
    File(StreamedFile),
}

/// One response, independent of wire framing.
#[derive(Debug)]
pub struct Reply {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: ReplyBody,
    /// Close the connection once the response is written.
    pub close: bool,
}

impl Reply {
    /// `text/plain` failure reply; always closes.
    pub fn error(status: StatusCode) -> Self {
        let body = Bytes::from(format!("Failure: {}\r\n", status));
        let mut headers = HeaderMap::new();
        headers.insert(
            CONTENT_TYPE,
            HeaderValue::from_static("text/plain; charset=UTF-8"),
        );
        headers.insert(CONTENT_LENGTH, HeaderValue::from(body.len()));
        Self {
            status,
            headers,
            body: ReplyBody::Full(body),
            close: true,
        }
    }

    /// `302 Found` to `location`; always closes.
    pub fn redirect(location: &str) -> Self {
        let mut headers = HeaderMap::new();
        match HeaderValue::from_str(location) {
            Ok(value) => {
                headers.insert(LOCATION, value);
            }
            Err(_) => return Self::error(StatusCode::BAD_REQUEST),
        }
        headers.insert(CONTENT_LENGTH, HeaderValue::from(0u64));
        Self {
            status: StatusCode::FOUND,
            headers,
            body: ReplyBody::Empty,
            close: true,
        }
    }

    /// `304 Not Modified` with a fresh `Date`; no body, always closes.
    pub fn not_modified() -> Self {
        let mut headers = HeaderMap::new();
        insert_date(&mut headers, DATE, SystemTime::now());
        Self {
            status: StatusCode::NOT_MODIFIED,
            headers,
            body: ReplyBody::Empty,
            close: true,
        }
    }

    /// `200 OK` HTML page; always closes.
    pub fn html(page: String) -> Self {
        let body = Bytes::from(page);
        let mut headers = HeaderMap::new();
        headers.insert(
            CONTENT_TYPE,
            HeaderValue::from_static("text/html; charset=UTF-8"),
        );
        headers.insert(CONTENT_LENGTH, HeaderValue::from(body.len()));
        Self {
            status: StatusCode::OK,
            headers,
            body: ReplyBody::Full(body),
            close: true,
        }
    }

    /// `200 OK` streaming `file`. `headers` must already carry the entity
    /// headers.
    pub fn file(file: StreamedFile, headers: HeaderMap, keep_alive: bool) -> Self {
        Self {
            status: StatusCode::OK,
            headers,
            body: ReplyBody::File(file),
            close: !keep_alive,
        }
    }
}

/// Insert an HTTP date header.
pub fn insert_date(headers: &mut HeaderMap, name: hyper::header::HeaderName, time: SystemTime) {
    if let Ok(value) = HeaderValue::from_str(&format_http_date(time)) {
        headers.insert(name, value);
    }
}
