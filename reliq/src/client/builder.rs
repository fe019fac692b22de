//! Queue builder

use super::{Inconsistency, InconsistencyHook, Queue};
use crate::{
    codec::{Codec, JsonCodec},
    config::{QueueConfig, WatchMode},
    observability::QueueMetrics,
    storage::{RedisClient, RedisConfig},
    Error, Result,
};
use std::sync::Arc;
use std::time::Duration;

/// Queue builder
///
/// # Example
///
/// ```rust,no_run
/// use reliq::Queue;
/// use std::time::Duration;
///
/// # async fn example() -> reliq::Result<()> {
/// let queue = Queue::builder()
///     .redis_url("redis://localhost:6379")
///     .queue("emails")
///     .task_timeout(Duration::from_secs(60))
///     .build()
///     .await?;
/// # Ok(())
/// # }
/// ```
pub struct QueueBuilder<C: Codec = JsonCodec> {
    redis: RedisConfig,
    client: Option<RedisClient>,
    config: QueueConfig,
    codec: C,
    metrics: Option<Arc<QueueMetrics>>,
    on_inconsistency: Option<InconsistencyHook>,
}

impl Default for QueueBuilder<JsonCodec> {
    fn default() -> Self {
        Self {
            redis: RedisConfig::default(),
            client: None,
            config: QueueConfig::default(),
            codec: JsonCodec,
            metrics: None,
            on_inconsistency: None,
        }
    }
}

impl<C: Codec> QueueBuilder<C> {
    /// Set Redis URL
    #[must_use]
    pub fn redis_url(mut self, url: impl Into<String>) -> Self {
        self.redis.url = url.into();
        self
    }

    /// Set connection pool size
    #[must_use]
    pub fn pool_size(mut self, size: usize) -> Self {
        self.redis.pool_size = size;
        self
    }

    /// Reuse an existing connection instead of opening a new one
    #[must_use]
    pub fn client(mut self, client: RedisClient) -> Self {
        self.client = Some(client);
        self
    }

    /// Set queue name
    #[must_use]
    pub fn queue(mut self, name: impl Into<String>) -> Self {
        self.config.name = name.into();
        self
    }

    /// Set the default task timeout
    #[must_use]
    pub fn task_timeout(mut self, timeout: Duration) -> Self {
        self.config.task_timeout = timeout;
        self
    }

    /// Set the default result retention
    #[must_use]
    pub fn result_ttl(mut self, ttl: Duration) -> Self {
        self.config.result_ttl = ttl;
        self
    }

    /// Set the watch strategy
    #[must_use]
    pub fn watch_mode(mut self, mode: WatchMode) -> Self {
        self.config.watch_mode = mode;
        self
    }

    /// Replace the whole queue configuration
    #[must_use]
    pub fn config(mut self, config: QueueConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the payload codec
    #[must_use]
    pub fn codec<D: Codec>(self, codec: D) -> QueueBuilder<D> {
        QueueBuilder {
            redis: self.redis,
            client: self.client,
            config: self.config,
            codec,
            metrics: self.metrics,
            on_inconsistency: self.on_inconsistency,
        }
    }

    /// Record transitions in a metrics collector
    #[must_use]
    pub fn metrics(mut self, metrics: Arc<QueueMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Call `hook` for every requeue or release of a task that was not in
    /// the working set
    #[must_use]
    pub fn on_inconsistency<F>(mut self, hook: F) -> Self
    where
        F: Fn(&Inconsistency) + Send + Sync + 'static,
    {
        self.on_inconsistency = Some(Arc::new(hook));
        self
    }

    /// Build Queue
    pub async fn build(self) -> Result<Queue<C>> {
        self.config.validate().map_err(Error::InvalidArgument)?;

        let redis = match self.client {
            Some(client) => client,
            None => RedisClient::new(self.redis).await?,
        };

        Ok(Queue::new(redis, self.config, self.codec)?
            .with_metrics(self.metrics)
            .with_inconsistency_hook(self.on_inconsistency))
    }
}
