//! Embeddable TCP/HTTP front-end.
//!
//! Each configured listener is either a static-file server (HTTP/1.1, with
//! optional TLS and `h2` negotiation) or a transparent TCP reverse proxy to
//! one fixed backend.

// Core subsystems
pub mod config;
pub mod http;
pub mod net;
pub mod proxy;
pub mod server;
pub mod static_files;

// Cross-cutting concerns
pub mod lifecycle;
pub mod observability;

pub use config::{ServerConfig, ServerMode, SwiftConfig};
pub use lifecycle::{RunningSwift, Shutdown, StartupError, Swift};
pub use net::build_tls_context;
pub use proxy::attach_proxy_pair;
pub use server::{handle_connection, Pipeline};
