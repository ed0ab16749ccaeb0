//! Transparent TCP reverse proxy.
//!
//! # Data Flow
//! ```text
//! accepted client connection
//!     → relay.rs (connect backend, then relay both ways)
//!     → inject.rs (first request head only, when headers are configured)
//!     → backend
//! ```

pub mod inject;
pub mod relay;

pub use inject::{FirstHop, HeaderInjector, Rewrite};
pub use relay::{attach_proxy_pair, relay, Leg, ProxyRelay, RelayOutcome, RELAY_BUFFER};
