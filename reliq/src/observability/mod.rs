//! Observability module
//!
//! Provides Prometheus metrics and, with the `metrics-http` feature, an HTTP
//! endpoint to scrape them.

mod metrics;
#[cfg(feature = "metrics-http")]
mod http_server;

pub use metrics::QueueMetrics;
#[cfg(feature = "metrics-http")]
pub use http_server::MetricsServer;
