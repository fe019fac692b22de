//! Redis client wrapper
//!
//! Provides the store binding used by the queue: script execution with a
//! cached digest, blocking list rotation, state reads and keyspace
//! subscriptions.

use super::scripts::{self, LuaScript};
use crate::{Error, Result};
use fred::{
    clients::RedisClient as FredClient,
    interfaces::*,
    prelude::*,
    types::{Message, RedisConfig as FredRedisConfig, ReconnectPolicy},
};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::RecvError};

/// Redis connection configuration
#[derive(Debug, Clone)]
pub struct RedisConfig {
    /// Redis connection URL, the database index is taken from its path
    pub url: String,
    /// Connection pool size
    pub pool_size: usize,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: "redis://localhost:6379".to_string(),
            pool_size: 10,
        }
    }
}

/// Redis client
///
/// Blocking pops run on their own pool so they never hold up script calls
/// multiplexed on the shared connections.
#[derive(Clone)]
pub struct RedisClient {
    pool: Arc<RedisPool>,
    blocking: Arc<RedisPool>,
    config: FredRedisConfig,
    db: u8,
}

impl RedisClient {
    /// Create a new Redis client
    pub async fn new(config: RedisConfig) -> Result<Self> {
        if config.pool_size == 0 {
            return Err(Error::InvalidArgument("pool size must be greater than 0".into()));
        }

        let redis_config = FredRedisConfig::from_url(&config.url)?;
        let db = redis_config.database.unwrap_or(0);

        let pool = RedisPool::new(
            redis_config.clone(),
            None,
            None,
            Some(ReconnectPolicy::default()),
            config.pool_size,
        )?;
        let blocking = RedisPool::new(
            redis_config.clone(),
            None,
            None,
            Some(ReconnectPolicy::default()),
            config.pool_size,
        )?;

        pool.init().await?;
        blocking.init().await?;

        tracing::debug!("Connected to Redis db {} with pool size {}", db, config.pool_size);

        Ok(Self {
            pool: Arc::new(pool),
            blocking: Arc::new(blocking),
            config: redis_config,
            db,
        })
    }

    /// Create client from connection URL
    pub async fn from_url(url: impl Into<String>) -> Result<Self> {
        Self::new(RedisConfig {
            url: url.into(),
            ..Default::default()
        })
        .await
    }

    /// Get the underlying Redis connection pool
    pub fn pool(&self) -> &Arc<RedisPool> {
        &self.pool
    }

    /// Database index selected by the connection URL
    pub fn db(&self) -> u8 {
        self.db
    }

    /// Ping Redis
    pub async fn ping(&self) -> Result<String> {
        let result: String = self.pool.next().ping().await?;
        Ok(result)
    }

    /// Run a transition script by digest, reloading the body when the
    /// server script cache does not know it
    pub async fn run_script(
        &self,
        script: &LuaScript,
        keys: Vec<String>,
        args: Vec<RedisValue>,
    ) -> Result<RedisValue> {
        let client = self.pool.next();
        let value: RedisValue = script.script().evalsha_with_reload(client, keys, args).await?;
        Ok(value)
    }

    /// Load every transition script into the server script cache
    pub async fn load_scripts(&self) -> Result<()> {
        let client = self.pool.next();
        for script in scripts::all() {
            let sha1: String = client.script_load(script.body()).await?;
            if sha1 != script.sha1() {
                return Err(Error::Config(format!(
                    "script {} loaded with digest {}, expected {}",
                    script.name(),
                    sha1,
                    script.sha1()
                )));
            }
        }
        tracing::debug!("Loaded {} scripts", scripts::all().len());
        Ok(())
    }

    /// List operation: pop from the tail of `source` and push to the head of
    /// `destination` (blocking, 0 waits forever)
    pub async fn brpoplpush(&self, source: &str, destination: &str, timeout_secs: u64) -> Result<Option<String>> {
        let result: Option<String> = self
            .blocking
            .next()
            .brpoplpush(source, destination, timeout_secs as f64)
            .await?;
        Ok(result)
    }

    /// Hash operation: get all fields
    pub async fn hgetall(&self, key: &str) -> Result<HashMap<String, RedisValue>> {
        let result: HashMap<String, RedisValue> = self.pool.next().hgetall(key).await?;
        Ok(result)
    }

    /// Read one server configuration parameter
    pub async fn config_get(&self, parameter: &str) -> Result<Option<String>> {
        let result: HashMap<String, String> = self.pool.next().config_get(parameter).await?;
        Ok(result.get(parameter).cloned())
    }

    /// Subscribe to one keyspace notification channel on a dedicated
    /// connection
    pub async fn subscribe(&self, channel: String) -> Result<KeyspaceSubscription> {
        let client = FredClient::new(self.config.clone(), None, None, None);
        let _ = client.init().await?;

        // Take the receiver before subscribing so no event is missed
        let rx = client.message_rx();
        if let Err(e) = client.subscribe(channel.as_str()).await {
            let _ = client.quit().await;
            return Err(e.into());
        }

        tracing::trace!("Subscribed to {}", channel);
        Ok(KeyspaceSubscription {
            client: Some(client),
            channel,
            rx,
        })
    }
}

/// Live subscription to a keyspace channel
///
/// Dropping it unsubscribes and closes the connection in the background.
pub struct KeyspaceSubscription {
    client: Option<FredClient>,
    channel: String,
    rx: broadcast::Receiver<Message>,
}

impl KeyspaceSubscription {
    /// Channel name
    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Wait for the next event on the channel and return the event name
    /// (for example `hset` or `del`)
    ///
    /// Lagged receivers report a synthetic `lagged` event so callers re-read
    /// state instead of missing a change.
    pub async fn recv(&mut self) -> Result<String> {
        loop {
            match self.rx.recv().await {
                Ok(message) => {
                    if &*message.channel != self.channel.as_str() {
                        continue;
                    }
                    return Ok(message.value.as_string().unwrap_or_default());
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::debug!("Subscription on {} lagged by {} events", self.channel, skipped);
                    return Ok("lagged".to_string());
                }
                Err(RecvError::Closed) => {
                    return Err(Error::Connection(format!(
                        "subscription to {} closed",
                        self.channel
                    )));
                }
            }
        }
    }
}

impl Drop for KeyspaceSubscription {
    fn drop(&mut self) {
        let Some(client) = self.client.take() else {
            return;
        };
        let channel = std::mem::take(&mut self.channel);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    let _: std::result::Result<(), _> = client.unsubscribe(channel.as_str()).await;
                    let _: std::result::Result<(), _> = client.quit().await;
                });
            }
            Err(_) => tracing::debug!("No runtime to close subscription on {}", channel),
        }
    }
}
