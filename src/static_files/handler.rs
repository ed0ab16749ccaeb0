//! Per-request decision procedure of the file server.
//!
//! Steps run in a fixed order and the first failing step decides the reply:
//!
//! ```text
//! decode → host prefix → method → sanitize → resolve → directory?
//!        → regular file? → If-Modified-Since → open → 200 + stream
//! ```
//!
//! The handler never writes to the wire; it only produces a [`Reply`].

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use hyper::header::{
    HeaderMap, HeaderValue, CACHE_CONTROL, CONNECTION, CONTENT_LENGTH, CONTENT_TYPE, DATE,
    EXPIRES, IF_MODIFIED_SINCE, LAST_MODIFIED,
};
use hyper::{Method, StatusCode};

use crate::http::date::{parse_http_date, whole_seconds};
use crate::http::request::{DecodeError, PendingRequest};
use crate::http::response::{insert_date, Reply, StreamedFile};
use crate::static_files::listing::render_listing;
use crate::static_files::sanitize::sanitize_path;

/// Client-side cache window for file responses.
pub const CACHE_WINDOW: Duration = Duration::from_secs(3600);

const CACHE_CONTROL_VALUE: &str = "private, max-age=3600";

/// Serves files below one document root.
#[derive(Debug, Clone)]
pub struct StaticFileHandler {
    root: PathBuf,
    server_name: Option<String>,
}

impl StaticFileHandler {
    /// `server_name`, when set, must prefix the request's Host header
    /// (compared case-insensitively).
    pub fn new(root: impl Into<PathBuf>, server_name: Option<String>) -> Self {
        Self {
            root: root.into(),
            server_name: server_name.map(|name| name.to_ascii_lowercase()),
        }
    }

    /// Produce the reply for one decoded (or undecodable) request.
    pub async fn respond(&self, decoded: Result<PendingRequest, DecodeError>) -> Reply {
        let request = match decoded {
            Ok(request) => request,
            Err(err) => {
                tracing::debug!(error = %err, "Undecodable request");
                return Reply::error(StatusCode::BAD_REQUEST);
            }
        };

        if !self.host_matches(&request) {
            tracing::debug!(host = ?request.host(), "Host does not match server name");
            return Reply::error(StatusCode::BAD_REQUEST);
        }

        if request.method() != Method::GET {
            return Reply::error(StatusCode::METHOD_NOT_ALLOWED);
        }

        let Some(relative) = sanitize_path(request.target()) else {
            tracing::debug!(target = request.target(), "Rejected request path");
            return Reply::error(StatusCode::FORBIDDEN);
        };

        let full = self.root.join(&relative);
        let metadata = match tokio::fs::metadata(&full).await {
            Ok(metadata) => metadata,
            Err(_) => return Reply::error(StatusCode::NOT_FOUND),
        };

        if metadata.is_dir() {
            return self.directory(&request, &full).await;
        }

        if !metadata.is_file() {
            return Reply::error(StatusCode::FORBIDDEN);
        }

        let modified = metadata.modified().ok();
        if let (Some(since), Some(modified)) = (if_modified_since(&request), modified) {
            if whole_seconds(since) == whole_seconds(modified) {
                return Reply::not_modified();
            }
        }

        let file = match tokio::fs::File::open(&full).await {
            Ok(file) => file,
            Err(err) => {
                tracing::debug!(path = %full.display(), error = %err, "Open failed");
                return Reply::error(StatusCode::NOT_FOUND);
            }
        };

        let length = metadata.len();
        let headers = file_headers(&full, length, modified, request.keep_alive());
        Reply::file(StreamedFile::new(file, length), headers, request.keep_alive())
    }

    fn host_matches(&self, request: &PendingRequest) -> bool {
        let Some(expected) = &self.server_name else {
            return true;
        };
        request
            .host()
            .map(|host| host.to_ascii_lowercase().starts_with(expected.as_str()))
            .unwrap_or(false)
    }

    async fn directory(&self, request: &PendingRequest, full: &Path) -> Reply {
        let path = request.path();
        if !path.ends_with('/') {
            let location = format!("{}/{}", path, request.query().unwrap_or_default());
            return Reply::redirect(&location);
        }

        let listed = match tokio::fs::canonicalize(full).await {
            Ok(canonical) => render_listing(&canonical).await,
            Err(err) => Err(err),
        };
        match listed {
            Ok(page) => Reply::html(page),
            Err(err) => {
                tracing::debug!(path = %full.display(), error = %err, "Listing failed");
                Reply::error(StatusCode::FORBIDDEN)
            }
        }
    }
}

/// A header that fails to parse is ignored.
fn if_modified_since(request: &PendingRequest) -> Option<SystemTime> {
    request.header(IF_MODIFIED_SINCE).and_then(parse_http_date)
}

fn file_headers(
    path: &Path,
    length: u64,
    modified: Option<SystemTime>,
    keep_alive: bool,
) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_LENGTH, HeaderValue::from(length));

    let mime = mime_guess::from_path(path).first_or_octet_stream();
    if let Ok(value) = HeaderValue::from_str(mime.essence_str()) {
        headers.insert(CONTENT_TYPE, value);
    }

    let now = SystemTime::now();
    insert_date(&mut headers, DATE, now);
    insert_date(&mut headers, EXPIRES, now + CACHE_WINDOW);
    headers.insert(CACHE_CONTROL, HeaderValue::from_static(CACHE_CONTROL_VALUE));
    if let Some(modified) = modified {
        insert_date(&mut headers, LAST_MODIFIED, modified);
    }
    if keep_alive {
        headers.insert(CONNECTION, HeaderValue::from_static("keep-alive"));
    }
    headers
}
