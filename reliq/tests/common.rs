//! Common test utilities
//!
//! Shared helper functions and fixtures for integration tests.

#![allow(dead_code)]

use fred::{interfaces::*, prelude::*};
use reliq::{Queue, QueueBuilder, QueueStats, TaskStatus};
use std::collections::HashSet;

/// Redis URL from the environment
pub fn redis_url() -> String {
    std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".to_string())
}

/// Builder for a queue with a name unique to this test run
pub fn builder(test_name: &str) -> QueueBuilder {
    Queue::builder()
        .redis_url(redis_url())
        .pool_size(4)
        .queue(format!("test-{}-{}", test_name, uuid::Uuid::new_v4().simple()))
}

/// Queue with a name unique to this test run
pub async fn queue(test_name: &str) -> Queue {
    builder(test_name).build().await.expect("Failed to create queue")
}

/// Shorthand for building expected stats
pub fn stats(pending: u64, working: u64, delayed: u64, tasks: u64) -> QueueStats {
    QueueStats {
        pending,
        working,
        delayed,
        tasks,
    }
}

/// Enable keyspace notifications required by keyspace watches
pub async fn enable_keyspace_events(queue: &Queue) {
    let _: () = queue
        .redis()
        .pool()
        .next()
        .config_set("notify-keyspace-events", "KA")
        .await
        .expect("Failed to enable keyspace events");
}

/// Raw view of the queue structures
#[derive(Debug, Default)]
pub struct Snapshot {
    pub pending: Vec<String>,
    pub working: Vec<String>,
    pub delayed: Vec<String>,
    pub tasks: HashSet<String>,
}

impl Snapshot {
    /// Read the queue structures directly from Redis
    pub async fn read(queue: &Queue) -> Self {
        let client = queue.redis().pool().next();
        let keys = queue.keys();
        let pending: Vec<String> = client.lrange(keys.pending(), 0, -1).await.unwrap();
        let working: Vec<String> = client.zrange(keys.working(), 0, -1, None, false, None, false).await.unwrap();
        let delayed: Vec<String> = client.zrange(keys.delayed(), 0, -1, None, false, None, false).await.unwrap();
        let tasks: Vec<String> = client.hkeys(keys.tasks()).await.unwrap();
        Self {
            pending,
            working,
            delayed,
            tasks: tasks.into_iter().collect(),
        }
    }

    /// Where a task currently is, if anywhere
    pub fn location(&self, task_id: &str) -> Vec<TaskStatus> {
        let mut found = Vec::new();
        if self.pending.iter().any(|id| id == task_id) {
            found.push(TaskStatus::Pending);
        }
        if self.working.iter().any(|id| id == task_id) {
            found.push(TaskStatus::Working);
        }
        if self.delayed.iter().any(|id| id == task_id) {
            found.push(TaskStatus::Delayed);
        }
        found
    }
}

/// Remove every key of the queue
pub async fn cleanup(queue: &Queue) {
    let snapshot = Snapshot::read(queue).await;
    let keys = queue.keys();
    let mut doomed: Vec<String> = vec![
        keys.pending().to_string(),
        keys.working().to_string(),
        keys.delayed().to_string(),
        keys.tasks().to_string(),
    ];
    doomed.extend(snapshot.tasks.iter().map(|id| keys.state(id)));
    let _: Result<i64, _> = queue.redis().pool().next().del(doomed).await;
}
