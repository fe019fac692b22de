//! Task type definitions
//!
//! Provides the task status state machine and the per-task state record as
//! stored in the `<queue>:task:<id>` hash.

use crate::codec::Codec;
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use fred::prelude::RedisValue;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;
use uuid::Uuid;

/// Length of a generated task id
pub const TASK_ID_LEN: usize = 32;

/// Generate a new task id (32 lowercase hex characters)
pub fn new_task_id() -> String {
    Uuid::new_v4().simple().to_string()
}

/// Task status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    /// Waiting in the pending list
    Pending,
    /// Scheduled in the delayed set
    Delayed,
    /// Checked out by a consumer, tracked in the working set
    Working,
    /// Released after successful completion
    Completed,
    /// Released after (repeated) failure
    Rejected,
}

impl TaskStatus {
    /// Wire name stored in the state hash
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "PENDING",
            TaskStatus::Delayed => "DELAYED",
            TaskStatus::Working => "WORKING",
            TaskStatus::Completed => "COMPLETED",
            TaskStatus::Rejected => "REJECTED",
        }
    }

    /// No further transitions occur from a terminal status
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Rejected)
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "PENDING" => Ok(TaskStatus::Pending),
            "DELAYED" => Ok(TaskStatus::Delayed),
            "WORKING" => Ok(TaskStatus::Working),
            "COMPLETED" => Ok(TaskStatus::Completed),
            "REJECTED" => Ok(TaskStatus::Rejected),
            other => Err(Error::Serialization(format!("unknown task status: {}", other))),
        }
    }
}

/// Task state record
///
/// Timestamps are seconds since the Unix epoch taken from the Redis server
/// clock. Absent optional fields are `None`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskState {
    /// Current status
    pub status: TaskStatus,
    /// Maximum time the task may remain in the working set
    pub timeout: Duration,
    /// Enqueue time
    pub enqueue_time: f64,
    /// Time of the most recent dequeue
    pub last_dequeue_time: Option<f64>,
    /// Number of dequeues
    pub dequeue_count: u64,
    /// Time of the most recent requeue (explicit or by sweep)
    pub last_requeue_time: Option<f64>,
    /// Number of requeues
    pub requeue_count: u64,
    /// Release time
    pub release_time: Option<f64>,
    /// Encoded result, set on release
    pub result: Option<Vec<u8>>,
}

impl TaskState {
    /// Parse the state record from the fields returned by `HGETALL`
    ///
    /// Returns `Ok(None)` for an empty hash (the key does not exist).
    pub fn from_hash(fields: &HashMap<String, RedisValue>) -> Result<Option<Self>> {
        if fields.is_empty() {
            return Ok(None);
        }

        let status = required(fields, "status")?.parse::<TaskStatus>()?;
        let timeout_secs: f64 = parse(fields, "timeout")?
            .ok_or_else(|| missing("timeout"))?;
        let timeout = Duration::try_from_secs_f64(timeout_secs)
            .map_err(|e| Error::Serialization(format!("invalid timeout {}: {}", timeout_secs, e)))?;

        Ok(Some(Self {
            status,
            timeout,
            enqueue_time: parse(fields, "enqueue_time")?.ok_or_else(|| missing("enqueue_time"))?,
            last_dequeue_time: parse(fields, "last_dequeue_time")?,
            dequeue_count: parse(fields, "dequeue_count")?.unwrap_or(0),
            last_requeue_time: parse(fields, "last_requeue_time")?,
            requeue_count: parse(fields, "requeue_count")?.unwrap_or(0),
            release_time: parse(fields, "release_time")?,
            result: fields
                .get("result")
                .and_then(|v| v.as_bytes())
                .map(|b| b.to_vec()),
        }))
    }

    /// Decode the stored result with the given codec
    pub fn decode_result<T: DeserializeOwned, C: Codec>(&self, codec: &C) -> Result<Option<T>> {
        self.result
            .as_deref()
            .map(|bytes| codec.decode(bytes))
            .transpose()
    }

    /// Enqueue time as a UTC datetime
    pub fn enqueued_at(&self) -> Option<DateTime<Utc>> {
        to_datetime(self.enqueue_time)
    }

    /// Release time as a UTC datetime
    pub fn released_at(&self) -> Option<DateTime<Utc>> {
        self.release_time.and_then(to_datetime)
    }
}

/// Convert a fractional Unix timestamp into a UTC datetime
pub fn to_datetime(timestamp: f64) -> Option<DateTime<Utc>> {
    let secs = timestamp.trunc() as i64;
    let nanos = (timestamp.fract() * 1e9).round() as u32;
    DateTime::from_timestamp(secs, nanos.min(999_999_999))
}

fn missing(field: &str) -> Error {
    Error::Serialization(format!("task state is missing field '{}'", field))
}

fn required(fields: &HashMap<String, RedisValue>, name: &str) -> Result<String> {
    fields
        .get(name)
        .and_then(|v| v.as_string())
        .ok_or_else(|| missing(name))
}

fn parse<T: FromStr>(fields: &HashMap<String, RedisValue>, name: &str) -> Result<Option<T>> {
    match fields.get(name).and_then(|v| v.as_string()) {
        None => Ok(None),
        Some(raw) => raw
            .parse::<T>()
            .map(Some)
            .map_err(|_| Error::Serialization(format!("invalid value for '{}': {}", name, raw))),
    }
}
