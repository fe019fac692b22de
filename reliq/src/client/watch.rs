//! Task watcher
//!
//! Follows the state record of one task and yields a snapshot for every
//! observed change until the task reaches a terminal status.

use super::Queue;
use crate::{
    codec::Codec,
    config::WatchMode,
    storage::{KeyspaceSubscription, RedisClient},
    task::TaskState,
    Error, Result,
};
use futures::Stream;
use std::time::Duration;
use tokio::time::{Instant, Interval, MissedTickBehavior};

/// Server setting that controls keyspace notifications
const NOTIFY_KEYSPACE_EVENTS: &str = "notify-keyspace-events";

/// Watcher lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchPhase {
    /// Nothing emitted yet
    AwaitingFirst,
    /// At least one snapshot emitted
    Streaming,
    /// Terminal status emitted or the task vanished
    Done,
    /// No change arrived within the timeout
    TimedOut,
}

enum ChangeSource {
    Keyspace(KeyspaceSubscription),
    Poll(Interval),
    Closed,
}

impl ChangeSource {
    async fn changed(&mut self) -> Result<()> {
        match self {
            ChangeSource::Keyspace(subscription) => {
                let event = subscription.recv().await?;
                tracing::trace!(channel = %subscription.channel(), event = %event, "Keyspace event");
                Ok(())
            }
            ChangeSource::Poll(interval) => {
                interval.tick().await;
                Ok(())
            }
            ChangeSource::Closed => Err(Error::Connection("watch source is closed".into())),
        }
    }
}

/// Live view of one task's state changes
///
/// Pull snapshots with [`TaskWatch::next`] or adapt it with
/// [`TaskWatch::into_stream`]. Dropping the watch releases its subscription.
pub struct TaskWatch {
    redis: RedisClient,
    task_id: String,
    state_key: String,
    timeout: Option<Duration>,
    deadline: Option<Instant>,
    phase: WatchPhase,
    initial: Option<TaskState>,
    last: Option<TaskState>,
    resync: bool,
    source: ChangeSource,
}

impl TaskWatch {
    /// Watched task id
    pub fn task_id(&self) -> &str {
        &self.task_id
    }

    /// Current phase
    pub fn phase(&self) -> WatchPhase {
        self.phase
    }

    /// Wait for the next state change
    ///
    /// Returns `None` once the terminal snapshot has been emitted, the task
    /// record is gone, or after a timeout error.
    pub async fn next(&mut self) -> Option<Result<TaskState>> {
        if matches!(self.phase, WatchPhase::Done | WatchPhase::TimedOut) {
            return None;
        }

        if let Some(state) = self.initial.take() {
            return Some(Ok(self.emit(state)));
        }

        loop {
            if !self.resync {
                if let Err(e) = self.wait_for_change().await {
                    let phase = match e {
                        Error::Timeout(_) => WatchPhase::TimedOut,
                        _ => WatchPhase::Done,
                    };
                    self.close(phase);
                    return Some(Err(e));
                }
            }
            self.resync = false;

            match read_state(&self.redis, &self.state_key).await {
                Ok(Some(state)) => {
                    if is_change(self.last.as_ref(), &state) {
                        return Some(Ok(self.emit(state)));
                    }
                }
                Ok(None) => {
                    tracing::debug!(task_id = %self.task_id, "Watched task state is gone");
                    self.close(WatchPhase::Done);
                    return None;
                }
                Err(e) => {
                    self.close(WatchPhase::Done);
                    return Some(Err(e));
                }
            }
        }
    }

    /// Convert into a stream of snapshots
    pub fn into_stream(self) -> impl Stream<Item = Result<TaskState>> + Send {
        futures::stream::unfold(self, |mut watch| async move {
            watch.next().await.map(|item| (item, watch))
        })
    }

    async fn wait_for_change(&mut self) -> Result<()> {
        match self.deadline {
            Some(deadline) => tokio::time::timeout_at(deadline, self.source.changed())
                .await
                .map_err(|_| {
                    Error::Timeout(format!("no state change for task {} within the watch timeout", self.task_id))
                })?,
            None => self.source.changed().await,
        }
    }

    fn emit(&mut self, state: TaskState) -> TaskState {
        self.phase = WatchPhase::Streaming;
        self.deadline = self.timeout.map(|t| Instant::now() + t);
        if state.status.is_terminal() {
            self.close(WatchPhase::Done);
        }
        self.last = Some(state.clone());
        state
    }

    fn close(&mut self, phase: WatchPhase) {
        self.phase = phase;
        self.source = ChangeSource::Closed;
    }
}

impl<C: Codec> Queue<C> {
    /// Watch a task's state
    ///
    /// The first snapshot is the current state. `timeout` bounds the wait
    /// between two emissions.
    pub async fn watch(&self, task_id: &str, timeout: Option<Duration>) -> Result<TaskWatch> {
        if self.config.watch_mode == WatchMode::Keyspace {
            self.ensure_keyspace_events().await?;
        }

        let state_key = self.keys.state(task_id);
        let initial = read_state(&self.redis, &state_key)
            .await?
            .ok_or_else(|| Error::TaskNotFound(task_id.to_string()))?;

        let terminal = initial.status.is_terminal();
        let source = if terminal {
            ChangeSource::Closed
        } else {
            match self.config.watch_mode {
                WatchMode::Keyspace => {
                    let channel = self.keys.state_channel(self.redis.db(), task_id);
                    ChangeSource::Keyspace(self.redis.subscribe(channel).await?)
                }
                WatchMode::Poll(period) => {
                    let mut interval = tokio::time::interval_at(Instant::now() + period, period);
                    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
                    ChangeSource::Poll(interval)
                }
            }
        };

        tracing::debug!(queue = %self.name(), task_id = %task_id, status = %initial.status, "Watching task");

        Ok(TaskWatch {
            redis: self.redis.clone(),
            task_id: task_id.to_string(),
            state_key,
            timeout: timeout.filter(|t| !t.is_zero()),
            deadline: None,
            phase: WatchPhase::AwaitingFirst,
            initial: Some(initial),
            last: None,
            // Catch up on changes made before the subscription was active
            resync: !terminal,
            source,
        })
    }

    /// Verify once per queue that Redis publishes the keyspace events the
    /// watcher relies on
    async fn ensure_keyspace_events(&self) -> Result<()> {
        let redis = self.redis.clone();
        let outcome = self
            .keyspace_check
            .get_or_try_init(|| async move {
                let flags = redis.config_get(NOTIFY_KEYSPACE_EVENTS).await?.unwrap_or_default();
                let outcome = if keyspace_events_supported(&flags) {
                    Ok(())
                } else {
                    Err(format!(
                        "{} is '{}', watch requires 'KA' or 'Kgh'",
                        NOTIFY_KEYSPACE_EVENTS, flags
                    ))
                };
                Ok::<_, Error>(outcome)
            })
            .await?;
        outcome.clone().map_err(Error::Config)
    }
}

async fn read_state(redis: &RedisClient, state_key: &str) -> Result<Option<TaskState>> {
    let fields = redis.hgetall(state_key).await?;
    TaskState::from_hash(&fields)
}

/// Keyspace events (`K`) for generic and hash commands, or all commands
pub(crate) fn keyspace_events_supported(flags: &str) -> bool {
    flags.contains('K') && (flags.contains('A') || (flags.contains('g') && flags.contains('h')))
}

fn is_change(last: Option<&TaskState>, next: &TaskState) -> bool {
    last != Some(next)
}
