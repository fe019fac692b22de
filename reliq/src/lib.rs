//! # Reliq
//!
//! Reliq is a reliable, at-least-once task queue based on Rust and Redis.
//!
//! ## Features
//!
//! - Atomic task transitions through Lua scripts
//! - Delayed tasks and explicit requeue
//! - Crash recovery by sweeping timed-out tasks back to pending
//! - Task state watching through keyspace notifications
//! - Prometheus monitoring
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use reliq::{Queue, ReleaseOptions};
//! use serde_json::json;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let queue = Queue::builder()
//!         .redis_url("redis://localhost:6379")
//!         .queue("emails")
//!         .build()
//!         .await?;
//!
//!     // Producer
//!     let task_id = queue.enqueue(&json!({"to": "user@example.com"})).await?;
//!
//!     // Consumer
//!     let (id, email): (String, serde_json::Value) =
//!         queue.dequeue(Some(Duration::from_secs(5))).await?;
//!     println!("sending {}", email);
//!     queue.release_with(&id, Some(&true), ReleaseOptions::default()).await?;
//!
//!     assert_eq!(id, task_id);
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

// Public module exports
pub mod codec;
pub mod config;
pub mod error;
pub mod task;

// Queue client
pub mod client;

// Background services
pub mod server;

// Storage layer
pub mod storage;

// Observability
pub mod observability;

// Re-export common types
pub use client::{
    EnqueueOptions, Inconsistency, Operation, Queue, QueueBuilder, QueueStats, ReleaseOptions,
    RequeueOptions, SweepOutcome, TaskWatch, TransitionReport, WatchPhase,
};
pub use codec::{Codec, JsonCodec, MsgPackCodec};
pub use config::{QueueConfig, WatchMode};
pub use error::{Error, Result};
pub use server::{Sweep, Sweeper, SweeperConfig};
pub use task::{TaskState, TaskStatus};
