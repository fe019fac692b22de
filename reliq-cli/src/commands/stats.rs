//! Statistics command handlers
//!
//! Provides commands for displaying queue statistics.

use color_eyre::Result;
use reliq::{Queue, QueueStats};

/// Show statistics for a queue
pub async fn show(queue: &Queue) -> Result<()> {
    let stats = queue.get_queue_stats().await?;
    println!("{}", render(queue.name(), &stats));
    Ok(())
}

fn render(name: &str, stats: &QueueStats) -> String {
    format!(
        "Statistics\n  Queue: {}\n  Pending: {}\n  Working: {}\n  Delayed: {}\n  Tasks: {}",
        name, stats.pending, stats.working, stats.delayed, stats.tasks
    )
}
