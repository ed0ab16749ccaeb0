//! Static file serving.
//!
//! # Data Flow
//! ```text
//! PendingRequest
//!     → sanitize.rs (decode, reject traversal and injection)
//!     → handler.rs (host, method, resolve, conditional GET)
//!     → listing.rs (directories requested with a trailing slash)
//!     → Reply
//! ```

pub mod handler;
pub mod listing;
pub mod sanitize;

pub use handler::{StaticFileHandler, CACHE_WINDOW};
pub use listing::render_listing;
pub use sanitize::sanitize_path;
