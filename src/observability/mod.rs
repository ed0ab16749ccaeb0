//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured log events via `tracing`)
//!     → metrics.rs (counters and gauges via the `metrics` facade)
//!
//! Consumers:
//!     → stdout subscriber installed by the binary
//!     → optional Prometheus scrape endpoint
//! ```
//!
//! # Design Decisions
//! - Connection ID flows through every event as a span field
//! - Metrics are cheap (atomic increments); no exporter means no-ops

pub mod logging;
pub mod metrics;
