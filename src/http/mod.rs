//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! Negotiated connection
//!     → server.rs (HTTP/1.1 loop or hyper h2 driver)
//!     → codec.rs (request heads in, response heads out; HTTP/1.1 only)
//!     → request.rs (framing-independent request)
//!     → [static file handler produces a Reply]
//!     → response.rs (status, headers, body)
//!     → transfer.rs (sendfile or chunked body)
//! ```

pub mod codec;
pub mod date;
pub mod request;
pub mod response;
pub mod server;
pub mod transfer;

pub use request::{DecodeError, PendingRequest};
pub use response::{Reply, ReplyBody, StreamedFile, CHUNK_SIZE};
pub use server::{serve_h2, serve_http1, serve_negotiated};
pub use transfer::Transport;
