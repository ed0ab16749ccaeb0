//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming TCP connection
//!     → listener.rs (accept loop, connection limits)
//!     → connection.rs (ID, lifecycle tracking)
//!     → negotiate.rs (optional TLS handshake via tls.rs, ALPN inspection)
//!     → Hand off to the HTTP pipeline or the proxy relay
//! ```
//!
//! # Design Decisions
//! - Bounded accept prevents resource exhaustion
//! - Each connection tracked for graceful shutdown
//! - TLS context built once per listener and shared read-only

pub mod connection;
pub mod listener;
pub mod negotiate;
pub mod tls;

pub use connection::{ConnectionGuard, ConnectionId, ConnectionTracker};
pub use listener::{Listener, ListenerError};
pub use negotiate::{negotiate, ApplicationProtocol, Negotiated};
pub use tls::{build_tls_context, TlsContext, TlsError};
