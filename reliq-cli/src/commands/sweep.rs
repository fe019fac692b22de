//! Sweep command handlers
//!
//! Runs a single sweep pass or a long-lived sweeper process.

use color_eyre::Result;
use reliq::{observability::QueueMetrics, Queue, Sweeper, SweeperConfig};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

/// Run one sweep pass
pub async fn once(queue: &Queue) -> Result<()> {
    let outcome = queue.sweep_detailed().await?;
    println!("Sweep of queue '{}'", queue.name());
    println!("  Reclaimed: {}", outcome.reclaimed);
    println!("  Promoted: {}", outcome.promoted);
    Ok(())
}

/// Run the sweeper until Ctrl+C
pub async fn run(
    queue: Queue,
    metrics: Option<Arc<QueueMetrics>>,
    interval: Duration,
    metrics_addr: Option<SocketAddr>,
) -> Result<()> {
    let server = match (metrics, metrics_addr) {
        (Some(metrics), Some(addr)) => {
            Some(reliq::observability::MetricsServer::new(metrics, addr).spawn())
        }
        _ => None,
    };

    let queue = Arc::new(queue);
    let sweeper = Sweeper::new(queue.clone(), SweeperConfig::new().interval(interval))?;
    sweeper.start();
    tracing::info!("Sweeping queue '{}' every {:?}, press Ctrl+C to stop", queue.name(), interval);

    let mut health = tokio::time::interval(interval);
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            _ = health.tick() => {
                if !sweeper.is_running() {
                    sweeper.stop();
                    if let Some(server) = server {
                        server.abort();
                    }
                    return Err(color_eyre::eyre::eyre!("sweeper stopped after a fatal error"));
                }
                // Keeps the queue gauges fresh for scrapers
                if let Err(e) = queue.get_queue_stats().await {
                    tracing::warn!("Failed to refresh queue stats: {}", e);
                }
            }
        }
    }

    sweeper.stop();
    if let Some(server) = server {
        server.abort();
    }
    Ok(())
}
