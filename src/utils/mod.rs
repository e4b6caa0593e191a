//! # Utility Modules
//!
//! Supporting utilities for logging and observability.
//!
//! ## Components
//! - **Logging**: `tracing-subscriber` setup and the operator-facing [`logging::LogLevel`]
//! - **Metrics**: Thread-safe per-server counters

pub mod logging;
pub mod metrics;

pub use logging::LogLevel;
pub use metrics::{Metrics, MetricsSnapshot};
