//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → SwiftConfig (validated, immutable)
//!     → one ServerConfig handed to each listener at startup
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; there is no reload
//! - Listener mode is a tagged enum, not a type hierarchy
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, parse_config, ConfigError};
pub use schema::{
    ObservabilityConfig, ProxyHeader, ProxyTarget, ServerConfig, ServerMode, SwiftConfig, TlsConfig,
};
pub use validation::ValidationError;
