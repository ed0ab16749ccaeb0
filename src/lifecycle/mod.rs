//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Register servers → Validate → Build TLS → Bind all → Start accept loops
//!
//! Shutdown (shutdown.rs):
//!     Trigger → Stop accepting → Drain connections (bounded) → Exit
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger graceful shutdown
//! ```
//!
//! # Design Decisions
//! - Ordered startup: every listener is ready before any serves
//! - Ordered shutdown: stop accept, drain, close
//! - Shutdown has timeout: open connections are abandoned after the deadline

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::Shutdown;
pub use signals::{shutdown_on_signal, wait_for_shutdown_signal};
pub use startup::{RunningSwift, StartupError, Swift, DRAIN_TIMEOUT};
