//! Sweep tests
//!
//! Timeout reclamation, delay promotion and the background sweeper.

mod common;

use common::{cleanup, queue, stats, Snapshot};
use reliq::{EnqueueOptions, Sweeper, SweeperConfig, TaskStatus};
use std::sync::Arc;
use std::time::Duration;

const WAIT: Option<Duration> = Some(Duration::from_secs(2));

#[tokio::test]
#[ignore = "Requires Redis server"]
async fn test_timeout_reclamation() {
    let queue = queue("reclaim").await;

    let id = queue
        .enqueue_with(&"slow", EnqueueOptions::default().task_timeout(Duration::from_secs(1)))
        .await
        .unwrap();
    let _: (String, String) = queue.dequeue(WAIT).await.unwrap();

    // Deadline not reached yet
    assert_eq!(queue.sweep().await.unwrap(), 0);
    assert_eq!(queue.get_queue_stats().await.unwrap(), stats(0, 1, 0, 1));

    tokio::time::sleep(Duration::from_millis(1200)).await;
    assert_eq!(queue.sweep().await.unwrap(), 1);

    let snapshot = Snapshot::read(&queue).await;
    assert_eq!(snapshot.location(&id), vec![TaskStatus::Pending]);
    let state = queue.get_task_state(&id).await.unwrap();
    assert_eq!(state.status, TaskStatus::Pending);
    assert_eq!(state.requeue_count, 1);
    assert_eq!(state.dequeue_count, 1);
    assert!(state.last_requeue_time.is_some());

    // A second pass has nothing left to reclaim
    assert_eq!(queue.sweep().await.unwrap(), 0);

    cleanup(&queue).await;
}

#[tokio::test]
#[ignore = "Requires Redis server"]
async fn test_delay_promotion() {
    let queue = queue("promote").await;

    let id = queue
        .enqueue_with(&"later", EnqueueOptions::default().delay(Duration::from_secs(1)))
        .await
        .unwrap();
    assert_eq!(queue.get_queue_stats().await.unwrap(), stats(0, 0, 1, 1));
    assert_eq!(queue.get_task_state(&id).await.unwrap().status, TaskStatus::Delayed);

    let outcome = queue.sweep_detailed().await.unwrap();
    assert_eq!(outcome.promoted, 0);
    assert!(Snapshot::read(&queue).await.pending.is_empty());

    tokio::time::sleep(Duration::from_millis(1200)).await;
    let outcome = queue.sweep_detailed().await.unwrap();
    assert_eq!(outcome.promoted, 1);
    assert_eq!(outcome.reclaimed, 0);

    assert_eq!(Snapshot::read(&queue).await.location(&id), vec![TaskStatus::Pending]);
    let state = queue.get_task_state(&id).await.unwrap();
    assert_eq!(state.status, TaskStatus::Pending);
    // Promotion is not a requeue
    assert_eq!(state.requeue_count, 0);

    let (dequeued, _): (String, String) = queue.dequeue(WAIT).await.unwrap();
    assert_eq!(dequeued, id);

    cleanup(&queue).await;
}

#[tokio::test]
#[ignore = "Requires Redis server"]
async fn test_sweeper_reclaims_in_background() {
    let queue = Arc::new(queue("sweeper").await);

    let id = queue
        .enqueue_with(&"crash", EnqueueOptions::default().task_timeout(Duration::from_secs(1)))
        .await
        .unwrap();
    let _: (String, String) = queue.dequeue(WAIT).await.unwrap();

    let sweeper = Sweeper::new(
        queue.clone(),
        SweeperConfig::new().interval(Duration::from_millis(200)),
    )
    .unwrap();
    sweeper.start();

    tokio::time::sleep(Duration::from_millis(1600)).await;
    assert!(sweeper.is_running());
    sweeper.stop();

    let state = queue.get_task_state(&id).await.unwrap();
    assert_eq!(state.status, TaskStatus::Pending);
    assert_eq!(state.requeue_count, 1);

    cleanup(&queue).await;
}
