//! Queue client
//!
//! Provides the public queue operations. Every transition runs as one atomic
//! script, the client only encodes arguments, decodes replies and reports.

pub mod builder;
pub mod watch;

use crate::{
    codec::{Codec, JsonCodec},
    config::QueueConfig,
    observability::QueueMetrics,
    storage::{scripts, QueueKeys, RedisClient},
    task::{new_task_id, TaskState, TaskStatus},
    Error, Result,
};
use fred::prelude::RedisValue;
use serde::{de::DeserializeOwned, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;
use tokio::time::Instant;

pub use builder::QueueBuilder;
pub use watch::{TaskWatch, WatchPhase};

/// Callback invoked for every inconsistent requeue or release
pub type InconsistencyHook = Arc<dyn Fn(&Inconsistency) + Send + Sync>;

/// Options for `enqueue_with` and `enqueue_batch`
#[derive(Debug, Clone, Copy, Default)]
pub struct EnqueueOptions {
    /// Working deadline once dequeued, defaults to the queue's task timeout
    pub task_timeout: Option<Duration>,
    /// Time before the task becomes visible to consumers
    pub delay: Duration,
}

impl EnqueueOptions {
    /// Set the task timeout
    #[must_use]
    pub fn task_timeout(mut self, timeout: Duration) -> Self {
        self.task_timeout = Some(timeout);
        self
    }

    /// Set the delay
    #[must_use]
    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

/// Options for `requeue`
#[derive(Debug, Clone, Copy, Default)]
pub struct RequeueOptions {
    /// Time before the task becomes visible again
    pub delay: Duration,
    /// Replacement task timeout
    pub task_timeout: Option<Duration>,
}

impl RequeueOptions {
    /// Set the delay
    #[must_use]
    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Override the task timeout
    #[must_use]
    pub fn task_timeout(mut self, timeout: Duration) -> Self {
        self.task_timeout = Some(timeout);
        self
    }
}

/// Options for `release_with`
#[derive(Debug, Clone, Copy)]
pub struct ReleaseOptions {
    /// Retention of the state record when a result is stored, defaults to
    /// the queue's result TTL. Zero deletes the record immediately.
    pub result_ttl: Option<Duration>,
    /// Terminal status to record
    pub status: TaskStatus,
}

impl Default for ReleaseOptions {
    fn default() -> Self {
        Self {
            result_ttl: None,
            status: TaskStatus::Completed,
        }
    }
}

impl ReleaseOptions {
    /// Set the result retention
    #[must_use]
    pub fn result_ttl(mut self, ttl: Duration) -> Self {
        self.result_ttl = Some(ttl);
        self
    }

    /// Set the terminal status
    #[must_use]
    pub fn status(mut self, status: TaskStatus) -> Self {
        self.status = status;
        self
    }
}

/// Queue counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct QueueStats {
    /// Tasks waiting in the pending list
    pub pending: u64,
    /// Tasks checked out by consumers
    pub working: u64,
    /// Tasks scheduled for later
    pub delayed: u64,
    /// Tasks not yet released
    pub tasks: u64,
}

/// Outcome of one sweep pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepOutcome {
    /// Timed-out working tasks returned to pending
    pub reclaimed: u64,
    /// Due delayed tasks made pending
    pub promoted: u64,
}

/// Transition that reports inconsistencies
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    /// `requeue`
    Requeue,
    /// `release`
    Release,
}

impl Operation {
    /// Operation name
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Requeue => "requeue",
            Operation::Release => "release",
        }
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Counters returned by the requeue and release scripts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionReport {
    /// Operation
    pub operation: Operation,
    /// Task id
    pub task_id: String,
    /// Entries removed from the working set (0 or 1)
    pub working_removed: u64,
    /// 1 when the transition was applied
    pub applied: u64,
    /// Requeue count after an applied requeue
    pub requeue_count: Option<u64>,
}

impl TransitionReport {
    /// Whether the transition changed the queue
    pub fn is_applied(&self) -> bool {
        self.applied > 0
    }
}

/// A requeue or release on a task that was not in the working set
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Inconsistency {
    /// Queue name
    pub queue: String,
    /// Operation
    pub operation: Operation,
    /// Task id
    pub task_id: String,
    /// Entries removed from the working set
    pub working_removed: u64,
    /// 1 when the transition was applied
    pub applied: u64,
}

/// Reply of the dequeue script
enum Claim {
    Claimed(Vec<u8>),
    Lost,
    Orphan,
}

/// Queue client
///
/// Cheap to clone; clones share the connection pool and the cached keyspace
/// configuration check.
pub struct Queue<C: Codec = JsonCodec> {
    redis: RedisClient,
    keys: QueueKeys,
    config: QueueConfig,
    codec: Arc<C>,
    keyspace_check: Arc<OnceCell<std::result::Result<(), String>>>,
    metrics: Option<Arc<QueueMetrics>>,
    on_inconsistency: Option<InconsistencyHook>,
}

impl<C: Codec> Clone for Queue<C> {
    fn clone(&self) -> Self {
        Self {
            redis: self.redis.clone(),
            keys: self.keys.clone(),
            config: self.config.clone(),
            codec: self.codec.clone(),
            keyspace_check: self.keyspace_check.clone(),
            metrics: self.metrics.clone(),
            on_inconsistency: self.on_inconsistency.clone(),
        }
    }
}

impl Queue<JsonCodec> {
    /// Create a new Queue builder
    pub fn builder() -> QueueBuilder<JsonCodec> {
        QueueBuilder::default()
    }
}

impl<C: Codec> Queue<C> {
    /// Create a queue on an existing connection
    pub fn new(redis: RedisClient, config: QueueConfig, codec: C) -> Result<Self> {
        config.validate().map_err(Error::InvalidArgument)?;
        Ok(Self {
            keys: QueueKeys::new(&config.name),
            redis,
            config,
            codec: Arc::new(codec),
            keyspace_check: Arc::new(OnceCell::new()),
            metrics: None,
            on_inconsistency: None,
        })
    }

    pub(crate) fn with_metrics(mut self, metrics: Option<Arc<QueueMetrics>>) -> Self {
        self.metrics = metrics;
        self
    }

    pub(crate) fn with_inconsistency_hook(mut self, hook: Option<InconsistencyHook>) -> Self {
        self.on_inconsistency = hook;
        self
    }

    /// Queue name
    pub fn name(&self) -> &str {
        self.keys.name()
    }

    /// Redis keys of this queue
    pub fn keys(&self) -> &QueueKeys {
        &self.keys
    }

    /// Queue configuration
    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    /// Underlying Redis client
    pub fn redis(&self) -> &RedisClient {
        &self.redis
    }

    /// Payload codec
    pub fn codec(&self) -> &C {
        &self.codec
    }

    /// Ping Redis
    pub async fn ping(&self) -> Result<String> {
        self.redis.ping().await
    }

    /// Enqueue a task with the queue defaults
    pub async fn enqueue<T: Serialize + ?Sized>(&self, data: &T) -> Result<String> {
        self.enqueue_with(data, EnqueueOptions::default()).await
    }

    /// Enqueue a task
    pub async fn enqueue_with<T: Serialize + ?Sized>(
        &self,
        data: &T,
        options: EnqueueOptions,
    ) -> Result<String> {
        let encoded = self.codec.encode(data)?;
        let mut ids = self.enqueue_encoded(vec![encoded], options).await?;
        ids.pop()
            .ok_or_else(|| Error::Serialization("enqueue returned no task id".into()))
    }

    /// Enqueue several tasks atomically with shared options
    pub async fn enqueue_batch<T: Serialize>(
        &self,
        items: &[T],
        options: EnqueueOptions,
    ) -> Result<Vec<String>> {
        let encoded = items
            .iter()
            .map(|item| self.codec.encode(item))
            .collect::<Result<Vec<_>>>()?;
        self.enqueue_encoded(encoded, options).await
    }

    async fn enqueue_encoded(&self, payloads: Vec<Vec<u8>>, options: EnqueueOptions) -> Result<Vec<String>> {
        let task_timeout = options.task_timeout.unwrap_or(self.config.task_timeout);
        if task_timeout.is_zero() {
            return Err(Error::InvalidArgument("task timeout must be greater than 0".into()));
        }
        if payloads.is_empty() {
            return Ok(Vec::new());
        }

        let mut ids = Vec::with_capacity(payloads.len());
        let mut args = Vec::with_capacity(2 + payloads.len() * 2);
        args.push(seconds(task_timeout));
        args.push(seconds(options.delay));
        for payload in payloads {
            let task_id = new_task_id();
            args.push(RedisValue::from(task_id.as_str()));
            args.push(RedisValue::Bytes(payload.into()));
            ids.push(task_id);
        }

        let keys = vec![
            self.keys.pending().to_string(),
            self.keys.delayed().to_string(),
            self.keys.tasks().to_string(),
            self.keys.state_prefix().to_string(),
        ];
        let reply = self.redis.run_script(&scripts::ENQUEUE, keys, args).await?;
        let count = reply
            .as_u64()
            .ok_or_else(|| unexpected_reply(&scripts::ENQUEUE, &reply))?;

        tracing::debug!(
            queue = %self.name(),
            count,
            delay_secs = options.delay.as_secs_f64(),
            "Tasks enqueued"
        );
        if let Some(metrics) = &self.metrics {
            metrics.record_enqueued(self.name(), count);
        }

        Ok(ids)
    }

    /// Dequeue the oldest pending task
    ///
    /// `timeout` is the total time budget across all blocking attempts;
    /// `None` or zero waits indefinitely.
    pub async fn dequeue<T: DeserializeOwned>(&self, timeout: Option<Duration>) -> Result<(String, T)> {
        let deadline = timeout.filter(|t| !t.is_zero()).map(|t| Instant::now() + t);
        let pending = self.keys.pending();

        loop {
            // A pop can queue behind another consumer's blocking pop on the
            // same connection, so the deadline also bounds the await itself
            let popped = match deadline {
                None => self.redis.brpoplpush(pending, pending, 0).await?,
                Some(deadline) => {
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    if remaining.is_zero() {
                        return Err(dequeue_timeout());
                    }
                    let attempt = self
                        .redis
                        .brpoplpush(pending, pending, attempt_timeout_secs(remaining));
                    tokio::time::timeout_at(deadline, attempt)
                        .await
                        .map_err(|_| dequeue_timeout())??
                }
            };
            let Some(task_id) = popped else {
                continue;
            };

            match self.claim(&task_id).await? {
                Claim::Claimed(data) => {
                    tracing::debug!(queue = %self.name(), task_id = %task_id, "Task dequeued");
                    if let Some(metrics) = &self.metrics {
                        metrics.record_dequeued(self.name());
                    }
                    let data = self.codec.decode(&data)?;
                    return Ok((task_id, data));
                }
                Claim::Lost => {
                    tracing::trace!(queue = %self.name(), task_id = %task_id, "Task claimed by another consumer");
                }
                Claim::Orphan => {
                    tracing::warn!(
                        queue = %self.name(),
                        task_id = %task_id,
                        "Dropped pending task without data or state"
                    );
                }
            }
        }
    }

    async fn claim(&self, task_id: &str) -> Result<Claim> {
        let keys = vec![
            self.keys.pending().to_string(),
            self.keys.working().to_string(),
            self.keys.tasks().to_string(),
            self.keys.state_prefix().to_string(),
        ];
        let reply = self
            .redis
            .run_script(&scripts::DEQUEUE, keys, vec![RedisValue::from(task_id)])
            .await?;
        let items = script_array(&scripts::DEQUEUE, reply)?;

        match int_at(&scripts::DEQUEUE, &items, 0)? {
            1 => {
                let data = items
                    .get(2)
                    .and_then(|v| v.as_bytes())
                    .ok_or_else(|| Error::Serialization("dequeue reply without task data".into()))?;
                Ok(Claim::Claimed(data.to_vec()))
            }
            0 => Ok(Claim::Lost),
            _ => Ok(Claim::Orphan),
        }
    }

    /// Return a dequeued task to the queue
    ///
    /// A task that is not in the working set is left untouched and reported
    /// as an inconsistency instead of failing.
    pub async fn requeue(&self, task_id: &str, options: RequeueOptions) -> Result<TransitionReport> {
        if options.task_timeout.is_some_and(|t| t.is_zero()) {
            return Err(Error::InvalidArgument("task timeout must be greater than 0".into()));
        }

        let keys = vec![
            self.keys.pending().to_string(),
            self.keys.working().to_string(),
            self.keys.delayed().to_string(),
            self.keys.state_prefix().to_string(),
        ];
        let args = vec![
            RedisValue::from(task_id),
            seconds(options.delay),
            options.task_timeout.map(seconds).unwrap_or_else(|| RedisValue::from("")),
        ];
        let reply = self.redis.run_script(&scripts::REQUEUE, keys, args).await?;
        let items = script_array(&scripts::REQUEUE, reply)?;

        let report = TransitionReport {
            operation: Operation::Requeue,
            task_id: task_id.to_string(),
            working_removed: int_at(&scripts::REQUEUE, &items, 0)? as u64,
            applied: int_at(&scripts::REQUEUE, &items, 1)? as u64,
            requeue_count: None,
        };

        if !report.is_applied() {
            self.report_inconsistency(&report);
            return Ok(report);
        }

        let requeue_count = int_at(&scripts::REQUEUE, &items, 2)? as u64;
        tracing::debug!(
            queue = %self.name(),
            task_id = %task_id,
            requeue_count,
            delay_secs = options.delay.as_secs_f64(),
            "Task requeued"
        );
        if let Some(metrics) = &self.metrics {
            metrics.record_requeued(self.name());
        }

        Ok(TransitionReport {
            requeue_count: Some(requeue_count),
            ..report
        })
    }

    /// Release a task as completed without a result
    pub async fn release(&self, task_id: &str) -> Result<TransitionReport> {
        self.release_with::<()>(task_id, None, ReleaseOptions::default()).await
    }

    /// Release a task with an optional result
    ///
    /// Fails with `TaskNotFound` when the task was never enqueued or is
    /// already released.
    pub async fn release_with<R: Serialize + ?Sized>(
        &self,
        task_id: &str,
        result: Option<&R>,
        options: ReleaseOptions,
    ) -> Result<TransitionReport> {
        if !options.status.is_terminal() {
            return Err(Error::InvalidArgument(format!(
                "release status must be COMPLETED or REJECTED, got {}",
                options.status
            )));
        }

        let result_ttl = options.result_ttl.unwrap_or(self.config.result_ttl);
        let encoded = result.map(|r| self.codec.encode(r)).transpose()?;

        let keys = vec![
            self.keys.working().to_string(),
            self.keys.tasks().to_string(),
            self.keys.state_prefix().to_string(),
        ];
        let args = vec![
            RedisValue::from(task_id),
            RedisValue::from(options.status.as_str()),
            RedisValue::Integer(result_ttl.as_millis().min(i64::MAX as u128) as i64),
            RedisValue::from(if encoded.is_some() { "1" } else { "0" }),
            encoded
                .map(|bytes| RedisValue::Bytes(bytes.into()))
                .unwrap_or_else(|| RedisValue::from("")),
        ];
        let reply = self.redis.run_script(&scripts::RELEASE, keys, args).await?;
        let items = script_array(&scripts::RELEASE, reply)?;

        let code = int_at(&scripts::RELEASE, &items, 0)?;
        if code < 0 {
            return Err(Error::TaskNotFound(task_id.to_string()));
        }

        let report = TransitionReport {
            operation: Operation::Release,
            task_id: task_id.to_string(),
            working_removed: code as u64,
            applied: int_at(&scripts::RELEASE, &items, 1)? as u64,
            requeue_count: None,
        };

        if report.is_applied() {
            tracing::debug!(queue = %self.name(), task_id = %task_id, status = %options.status, "Task released");
            if let Some(metrics) = &self.metrics {
                metrics.record_released(self.name(), options.status.as_str());
            }
        } else {
            self.report_inconsistency(&report);
        }

        Ok(report)
    }

    /// Get the state record of a task
    pub async fn get_task_state(&self, task_id: &str) -> Result<TaskState> {
        let fields = self.redis.hgetall(&self.keys.state(task_id)).await?;
        TaskState::from_hash(&fields)?.ok_or_else(|| Error::TaskNotFound(task_id.to_string()))
    }

    /// Get queue statistics
    pub async fn get_queue_stats(&self) -> Result<QueueStats> {
        let keys = vec![
            self.keys.pending().to_string(),
            self.keys.working().to_string(),
            self.keys.delayed().to_string(),
            self.keys.tasks().to_string(),
        ];
        let reply = self.redis.run_script(&scripts::STATS, keys, Vec::new()).await?;
        let items = script_array(&scripts::STATS, reply)?;

        let stats = QueueStats {
            pending: int_at(&scripts::STATS, &items, 0)? as u64,
            working: int_at(&scripts::STATS, &items, 1)? as u64,
            delayed: int_at(&scripts::STATS, &items, 2)? as u64,
            tasks: int_at(&scripts::STATS, &items, 3)? as u64,
        };
        if let Some(metrics) = &self.metrics {
            metrics.update_queue_metrics(self.name(), &stats);
        }
        Ok(stats)
    }

    /// Promote due delayed tasks and reclaim timed-out working tasks,
    /// returning the number reclaimed
    pub async fn sweep(&self) -> Result<u64> {
        Ok(self.sweep_detailed().await?.reclaimed)
    }

    /// Like `sweep`, also reporting promotions
    pub async fn sweep_detailed(&self) -> Result<SweepOutcome> {
        let keys = vec![
            self.keys.pending().to_string(),
            self.keys.working().to_string(),
            self.keys.delayed().to_string(),
            self.keys.state_prefix().to_string(),
        ];
        let reply = self.redis.run_script(&scripts::SWEEP, keys, Vec::new()).await?;
        let items = script_array(&scripts::SWEEP, reply)?;

        let outcome = SweepOutcome {
            reclaimed: int_at(&scripts::SWEEP, &items, 0)? as u64,
            promoted: int_at(&scripts::SWEEP, &items, 1)? as u64,
        };
        if outcome.promoted > 0 {
            tracing::debug!(queue = %self.name(), promoted = outcome.promoted, "Promoted delayed tasks");
        }
        if let Some(metrics) = &self.metrics {
            metrics.record_sweep(self.name(), outcome.reclaimed, outcome.promoted);
        }
        Ok(outcome)
    }

    fn report_inconsistency(&self, report: &TransitionReport) {
        tracing::warn!(
            queue = %self.name(),
            operation = %report.operation,
            task_id = %report.task_id,
            working_removed = report.working_removed,
            applied = report.applied,
            "Inconsistent {}: task is not in the working set",
            report.operation
        );
        if let Some(metrics) = &self.metrics {
            metrics.record_inconsistency(self.name(), report.operation.as_str());
        }
        if let Some(hook) = &self.on_inconsistency {
            hook(&Inconsistency {
                queue: self.name().to_string(),
                operation: report.operation,
                task_id: report.task_id.clone(),
                working_removed: report.working_removed,
                applied: report.applied,
            });
        }
    }
}

/// Seconds to block in one pop attempt for the remaining budget
///
/// Blocking pops take whole seconds and treat 0 as forever, so every attempt
/// waits at least one second.
pub(crate) fn attempt_timeout_secs(remaining: Duration) -> u64 {
    remaining.as_secs_f64().ceil().max(1.0) as u64
}

fn dequeue_timeout() -> Error {
    Error::Timeout("total dequeue attempts timed out".into())
}

fn seconds(duration: Duration) -> RedisValue {
    RedisValue::Double(duration.as_secs_f64())
}

fn script_array(script: &scripts::LuaScript, reply: RedisValue) -> Result<Vec<RedisValue>> {
    match reply {
        RedisValue::Array(items) => Ok(items),
        other => Err(unexpected_reply(script, &other)),
    }
}

fn int_at(script: &scripts::LuaScript, items: &[RedisValue], index: usize) -> Result<i64> {
    items
        .get(index)
        .and_then(|v| v.as_i64())
        .ok_or_else(|| Error::Serialization(format!("{} reply has no integer at {}", script.name(), index)))
}

fn unexpected_reply(script: &scripts::LuaScript, reply: &RedisValue) -> Error {
    Error::Serialization(format!("unexpected {} reply: {:?}", script.name(), reply))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attempt_timeout() {
        assert_eq!(attempt_timeout_secs(Duration::from_millis(1)), 1);
        assert_eq!(attempt_timeout_secs(Duration::from_millis(999)), 1);
        assert_eq!(attempt_timeout_secs(Duration::from_secs(1)), 1);
        assert_eq!(attempt_timeout_secs(Duration::from_millis(2500)), 3);
        assert_eq!(attempt_timeout_secs(Duration::ZERO), 1);
    }

    #[test]
    fn test_option_defaults() {
        let enqueue = EnqueueOptions::default();
        assert_eq!(enqueue.task_timeout, None);
        assert_eq!(enqueue.delay, Duration::ZERO);

        let release = ReleaseOptions::default();
        assert_eq!(release.status, TaskStatus::Completed);
        assert_eq!(release.result_ttl, None);

        let requeue = RequeueOptions::default()
            .delay(Duration::from_secs(10))
            .task_timeout(Duration::from_secs(30));
        assert_eq!(requeue.delay, Duration::from_secs(10));
        assert_eq!(requeue.task_timeout, Some(Duration::from_secs(30)));
    }

    #[test]
    fn test_script_reply_helpers() {
        let items = vec![RedisValue::Integer(1), RedisValue::from("3")];
        assert_eq!(int_at(&scripts::REQUEUE, &items, 0).unwrap(), 1);
        assert_eq!(int_at(&scripts::REQUEUE, &items, 1).unwrap(), 3);
        assert!(int_at(&scripts::REQUEUE, &items, 2).is_err());

        assert!(script_array(&scripts::STATS, RedisValue::Integer(1)).is_err());
        assert_eq!(
            script_array(&scripts::STATS, RedisValue::Array(items.clone())).unwrap(),
            items
        );
    }

    #[test]
    fn test_seconds_argument() {
        assert_eq!(seconds(Duration::from_millis(1500)), RedisValue::Double(1.5));
        assert_eq!(seconds(Duration::ZERO), RedisValue::Double(0.0));
    }

    #[test]
    fn test_transition_report() {
        let report = TransitionReport {
            operation: Operation::Release,
            task_id: "abc".into(),
            working_removed: 0,
            applied: 0,
            requeue_count: None,
        };
        assert!(!report.is_applied());
        assert_eq!(report.operation.to_string(), "release");
    }
}
