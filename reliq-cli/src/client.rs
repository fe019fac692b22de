//! Queue factory for CLI commands
//!
//! Provides centralized queue creation and initialization.

use color_eyre::Result;
use reliq::{observability::QueueMetrics, Queue};
use std::sync::Arc;

/// Connect to a queue
///
/// # Arguments
/// * `redis_url` - Redis connection URL (e.g., "redis://localhost:6379")
/// * `queue_name` - Queue name shared with producers and workers
/// * `metrics` - Optional collector recording every transition
pub async fn create_queue(
    redis_url: &str,
    queue_name: &str,
    metrics: Option<Arc<QueueMetrics>>,
) -> Result<Queue> {
    let mut builder = Queue::builder()
        .redis_url(redis_url)
        .pool_size(2)
        .queue(queue_name);
    if let Some(metrics) = metrics {
        builder = builder.metrics(metrics);
    }
    builder.build().await.map_err(|e| color_eyre::eyre::eyre!(e))
}
