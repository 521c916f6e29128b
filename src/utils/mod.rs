//! # Utility Modules
//!
//! Supporting utilities for logging, timing and observability.
//!
//! ## Components
//! - **Logging**: `tracing-subscriber` setup from configuration
//! - **Timeout**: Async timeout wrappers and default bounds
//! - **Metrics**: Per-peer atomic counters

pub mod logging;
pub mod metrics;
pub mod timeout;

pub use metrics::{MetricsSnapshot, PeerMetrics};
