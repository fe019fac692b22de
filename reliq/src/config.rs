//! Queue configuration module
//!
//! Provides per-queue settings: naming, default task timeout, result
//! retention and the watch strategy.

use std::time::Duration;

/// Default queue name
pub const DEFAULT_QUEUE: &str = "default";

/// Default time a dequeued task may stay in the working set (5 minutes)
pub const DEFAULT_TASK_TIMEOUT: Duration = Duration::from_secs(300);

/// Default retention of a released task's state record (1 hour)
pub const DEFAULT_RESULT_TTL: Duration = Duration::from_secs(3600);

/// How `watch` learns about task state changes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchMode {
    /// Subscribe to Redis keyspace notifications on the task state key.
    ///
    /// Requires `notify-keyspace-events` to include `KA` or `Kgh`.
    Keyspace,
    /// Re-read the task state at a fixed interval.
    Poll(Duration),
}

impl Default for WatchMode {
    fn default() -> Self {
        Self::Keyspace
    }
}

/// Queue configuration
///
/// Producers and consumers sharing a queue must use the same `name`.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Queue name, used as the prefix of every key
    pub name: String,

    /// Timeout applied to tasks enqueued without an explicit one
    pub task_timeout: Duration,

    /// Retention of a released task's state when a result is stored
    pub result_ttl: Duration,

    /// Watch strategy
    pub watch_mode: WatchMode,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            name: DEFAULT_QUEUE.to_string(),
            task_timeout: DEFAULT_TASK_TIMEOUT,
            result_ttl: DEFAULT_RESULT_TTL,
            watch_mode: WatchMode::default(),
        }
    }
}

impl QueueConfig {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the queue name
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Set the default task timeout
    #[must_use]
    pub fn with_task_timeout(mut self, timeout: Duration) -> Self {
        self.task_timeout = timeout;
        self
    }

    /// Set the default result retention
    #[must_use]
    pub fn with_result_ttl(mut self, ttl: Duration) -> Self {
        self.result_ttl = ttl;
        self
    }

    /// Set the watch strategy
    #[must_use]
    pub fn with_watch_mode(mut self, mode: WatchMode) -> Self {
        self.watch_mode = mode;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.name.is_empty() {
            return Err("queue name cannot be empty".to_string());
        }
        if self.task_timeout.is_zero() {
            return Err("default task timeout must be greater than 0".to_string());
        }
        if let WatchMode::Poll(interval) = self.watch_mode {
            if interval.is_zero() {
                return Err("watch poll interval must be greater than 0".to_string());
            }
        }
        Ok(())
    }
}
