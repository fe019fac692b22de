//! Redis Key manager
//!
//! Provides the key naming convention of a queue. Every key derives from the
//! queue name only, so independent processes agree on the same layout.

/// Redis keys of a single queue
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueKeys {
    name: String,
    pending: String,
    working: String,
    delayed: String,
    tasks: String,
    state_prefix: String,
}

impl QueueKeys {
    /// Derive the keys for a queue name
    pub fn new(queue_name: &str) -> Self {
        Self {
            name: queue_name.to_string(),
            pending: format!("{}:pending", queue_name),
            working: format!("{}:working", queue_name),
            delayed: format!("{}:delayed", queue_name),
            tasks: format!("{}:tasks", queue_name),
            state_prefix: format!("{}:task", queue_name),
        }
    }

    /// Queue name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Pending task ids (List)
    /// Example: default:pending
    pub fn pending(&self) -> &str {
        &self.pending
    }

    /// In-flight task ids scored by deadline (ZSet)
    /// Example: default:working
    pub fn working(&self) -> &str {
        &self.working
    }

    /// Delayed task ids scored by release time (ZSet)
    /// Example: default:delayed
    pub fn delayed(&self) -> &str {
        &self.delayed
    }

    /// Task id to encoded data (Hash)
    /// Example: default:tasks
    pub fn tasks(&self) -> &str {
        &self.tasks
    }

    /// Prefix of the per-task state hashes, joined with `:` to a task id
    /// inside the scripts
    pub fn state_prefix(&self) -> &str {
        &self.state_prefix
    }

    /// Task state Key (Hash)
    /// Example: default:task:a1b2c3d4...
    pub fn state(&self, task_id: &str) -> String {
        format!("{}:{}", self.state_prefix, task_id)
    }

    /// Keyspace notification channel of a task state key
    /// Example: __keyspace@0__:default:task:a1b2c3d4...
    pub fn state_channel(&self, db: u8, task_id: &str) -> String {
        format!("__keyspace@{}__:{}", db, self.state(task_id))
    }
}
