//! HTTP metrics server
//!
//! Provides an HTTP endpoint for Prometheus metrics scraping.

use super::QueueMetrics;
use std::net::SocketAddr;
use std::sync::Arc;
use warp::Filter;

/// HTTP metrics server
///
/// Serves Prometheus metrics on `/metrics` endpoint.
pub struct MetricsServer {
    metrics: Arc<QueueMetrics>,
    bind_address: SocketAddr,
}

impl MetricsServer {
    /// Create a new metrics server
    pub fn new(metrics: Arc<QueueMetrics>, bind_address: SocketAddr) -> Self {
        Self {
            metrics,
            bind_address,
        }
    }

    /// Create a new metrics server binding to 0.0.0.0:9090
    pub fn new_default(metrics: Arc<QueueMetrics>) -> Self {
        Self::new(metrics, SocketAddr::from(([0, 0, 0, 0], 9090)))
    }

    /// Bind address
    pub fn bind_address(&self) -> SocketAddr {
        self.bind_address
    }

    /// Start the HTTP server
    pub async fn run(self) -> crate::Result<()> {
        let metrics = self.metrics.clone();

        let route = warp::path!("metrics").and(warp::get()).map(move || {
            warp::reply::with_header(
                metrics.gather(),
                "content-type",
                "text/plain; version=0.0.4",
            )
        });

        let addr = self.bind_address;
        tracing::info!("Metrics available at http://{}/metrics", addr);

        warp::serve(route).run(addr).await;
        Ok(())
    }

    /// Start the HTTP server in the background
    pub fn spawn(self) -> tokio::task::JoinHandle<crate::Result<()>> {
        tokio::spawn(async move { self.run().await })
    }
}
