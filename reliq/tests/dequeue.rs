//! Dequeue tests
//!
//! Blocking budget, orphaned ids and concurrent consumers.

mod common;

use common::{cleanup, queue, stats};
use fred::interfaces::ListInterface;
use reliq::Error;
use std::collections::HashSet;
use std::time::{Duration, Instant};

#[tokio::test]
#[ignore = "Requires Redis server"]
async fn test_dequeue_total_timeout() {
    let queue = queue("dequeue-timeout").await;

    let started = Instant::now();
    let result = queue.dequeue::<String>(Some(Duration::from_secs(1))).await;
    let elapsed = started.elapsed();

    assert!(matches!(result, Err(Error::Timeout(_))));
    assert!(elapsed >= Duration::from_secs(1));
    assert!(elapsed < Duration::from_millis(2500), "took {:?}", elapsed);

    cleanup(&queue).await;
}

#[tokio::test]
#[ignore = "Requires Redis server"]
async fn test_dequeue_budget_holds_behind_blocked_consumer() {
    let queue = common::builder("dequeue-shared-conn").pool_size(1).build().await.unwrap();

    // Occupies the only blocking connection until a task arrives
    let waiter = queue.clone();
    let forever = tokio::spawn(async move { waiter.dequeue::<String>(None).await });
    tokio::time::sleep(Duration::from_millis(200)).await;

    let started = Instant::now();
    let result = queue.dequeue::<String>(Some(Duration::from_secs(1))).await;
    let elapsed = started.elapsed();
    assert!(matches!(result, Err(Error::Timeout(_))));
    assert!(elapsed < Duration::from_millis(2500), "took {:?}", elapsed);

    let id = queue.enqueue(&"wake").await.unwrap();
    let (dequeued, data) = tokio::time::timeout(Duration::from_secs(5), forever)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(dequeued, id);
    assert_eq!(data, "wake");

    cleanup(&queue).await;
}

#[tokio::test]
#[ignore = "Requires Redis server"]
async fn test_dequeue_waits_for_enqueue() {
    let queue = queue("dequeue-wait").await;

    let producer = queue.clone();
    let handle = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(300)).await;
        producer.enqueue(&"late").await.unwrap()
    });

    let (id, data): (String, String) = queue.dequeue(Some(Duration::from_secs(3))).await.unwrap();
    assert_eq!(id, handle.await.unwrap());
    assert_eq!(data, "late");

    cleanup(&queue).await;
}

#[tokio::test]
#[ignore = "Requires Redis server"]
async fn test_orphan_id_is_dropped() {
    let queue = queue("orphan").await;

    let id = queue.enqueue(&"real").await.unwrap();
    // An id with neither data nor state, older than the real task
    let _: i64 = queue
        .redis()
        .pool()
        .next()
        .rpush(queue.keys().pending(), "f".repeat(32))
        .await
        .unwrap();

    let (dequeued, _): (String, String) = queue.dequeue(Some(Duration::from_secs(2))).await.unwrap();
    assert_eq!(dequeued, id);
    assert_eq!(queue.get_queue_stats().await.unwrap(), stats(0, 1, 0, 1));

    cleanup(&queue).await;
}

#[tokio::test]
#[ignore = "Requires Redis server"]
async fn test_concurrent_consumers_never_share_a_task() {
    let queue = queue("concurrent").await;

    let total = 50;
    let items: Vec<u32> = (0..total).collect();
    queue.enqueue_batch(&items, Default::default()).await.unwrap();

    let mut consumers = Vec::new();
    for _ in 0..5 {
        let consumer = queue.clone();
        consumers.push(tokio::spawn(async move {
            let mut seen = Vec::new();
            while let Ok((id, _)) = consumer.dequeue::<u32>(Some(Duration::from_secs(1))).await {
                seen.push(id);
            }
            seen
        }));
    }

    let mut all = Vec::new();
    for consumer in consumers {
        all.extend(consumer.await.unwrap());
    }
    let unique: HashSet<_> = all.iter().cloned().collect();
    assert_eq!(all.len(), total as usize);
    assert_eq!(unique.len(), total as usize);
    assert_eq!(queue.get_queue_stats().await.unwrap(), stats(0, total as u64, 0, total as u64));

    cleanup(&queue).await;
}
