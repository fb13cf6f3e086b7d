//! Prometheus metrics and structured logging for the Bitvavo streaming client.
//!
//! - Structured logging with tracing (JSON in production, pretty otherwise)
//! - Prometheus counters for dispatch outcomes (delivered, dropped, routing misses)
//! - Connection, authentication and rate limit gauges

pub mod error;
pub mod logging;
pub mod metrics;

pub use error::{TelemetryError, TelemetryResult};
pub use logging::{init_logging, LogFormat};
pub use metrics::Metrics;
