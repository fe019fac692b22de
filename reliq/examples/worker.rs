//! Producer and worker on one queue
//!
//! Run with a local Redis:
//!
//! ```sh
//! cargo run -p reliq --example worker
//! ```

use reliq::{
    EnqueueOptions, Queue, ReleaseOptions, RequeueOptions, Sweeper, SweeperConfig, TaskStatus,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Serialize, Deserialize)]
struct Resize {
    image: String,
    width: u32,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .init();

    let redis_url = std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".to_string());
    let queue = Queue::builder()
        .redis_url(redis_url)
        .queue("images")
        .task_timeout(Duration::from_secs(10))
        .build()
        .await?;

    let sweeper = Sweeper::new(
        Arc::new(queue.clone()),
        SweeperConfig::new().interval(Duration::from_secs(5)),
    )?;
    sweeper.start();

    for width in [320, 640, 1280] {
        let id = queue
            .enqueue_with(
                &Resize {
                    image: "cat.png".into(),
                    width,
                },
                EnqueueOptions::default(),
            )
            .await?;
        tracing::info!("Enqueued {} ({}px)", id, width);
    }

    let mut watch = None;
    while let Ok((id, job)) = queue.dequeue::<Resize>(Some(Duration::from_secs(2))).await {
        let state = queue.get_task_state(&id).await?;

        // Fail the widest resize once to show a retry
        if job.width > 1000 && state.requeue_count == 0 {
            tracing::warn!("Resize of {} to {}px failed, retrying", job.image, job.width);
            queue
                .requeue(&id, RequeueOptions::default().delay(Duration::from_secs(1)))
                .await?;
            watch = Some(queue.watch(&id, Some(Duration::from_secs(30))).await?);
            continue;
        }

        let output = format!("{}-{}.png", job.image.trim_end_matches(".png"), job.width);
        queue
            .release_with(&id, Some(&output), ReleaseOptions::default().status(TaskStatus::Completed))
            .await?;
        tracing::info!("Task {} done: {}", id, output);
    }

    // The delayed retry only becomes pending after a sweep
    if let Some(mut watch) = watch {
        let worker = queue.clone();
        tokio::spawn(async move {
            if let Ok((id, job)) = worker.dequeue::<Resize>(Some(Duration::from_secs(20))).await {
                let _ = worker
                    .release_with(&id, Some(&job.width), ReleaseOptions::default())
                    .await;
            }
        });
        while let Some(state) = watch.next().await {
            let state = state?;
            tracing::info!("Task {} is {} (requeues: {})", watch.task_id(), state.status, state.requeue_count);
        }
    }

    sweeper.stop();
    tracing::info!("Final stats: {:?}", queue.get_queue_stats().await?);
    Ok(())
}
