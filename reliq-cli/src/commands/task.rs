//! Task command handlers
//!
//! Provides commands for enqueueing, inspecting, watching, requeueing and
//! releasing tasks.

use chrono::SecondsFormat;
use clap::Subcommand;
use color_eyre::{eyre::eyre, Result};
use reliq::{
    task::to_datetime, EnqueueOptions, Queue, ReleaseOptions, RequeueOptions, TaskState,
    TaskStatus, TransitionReport,
};
use serde_json::Value;
use std::time::Duration;

/// Task actions
#[derive(Subcommand)]
pub enum TaskAction {
    /// Show task state
    Inspect {
        /// Task ID
        id: String,
    },
    /// Follow task state changes until it finishes
    Watch {
        /// Task ID
        id: String,
        /// Give up after this many seconds without a change
        #[arg(long)]
        timeout: Option<f64>,
    },
    /// Return a dequeued task to the queue
    Requeue {
        /// Task ID
        id: String,
        /// Seconds before the task becomes visible again
        #[arg(long, default_value = "0")]
        delay: f64,
        /// New task timeout in seconds
        #[arg(long)]
        timeout: Option<f64>,
    },
    /// Release a dequeued task
    Release {
        /// Task ID
        id: String,
        /// Result as JSON
        #[arg(long)]
        result: Option<String>,
        /// Seconds to keep the state record when a result is given
        #[arg(long)]
        result_ttl: Option<f64>,
        /// Mark as rejected instead of completed
        #[arg(long, default_value_t = false)]
        rejected: bool,
    },
}

/// Handle task command
pub async fn handle(queue: &Queue, action: TaskAction) -> Result<()> {
    match action {
        TaskAction::Inspect { id } => inspect_task(queue, id).await?,
        TaskAction::Watch { id, timeout } => watch_task(queue, id, timeout).await?,
        TaskAction::Requeue { id, delay, timeout } => requeue_task(queue, id, delay, timeout).await?,
        TaskAction::Release {
            id,
            result,
            result_ttl,
            rejected,
        } => release_task(queue, id, result, result_ttl, rejected).await?,
    }
    Ok(())
}

/// Enqueue a JSON payload
pub async fn enqueue(queue: &Queue, data: String, timeout: Option<f64>, delay: f64) -> Result<()> {
    let payload: Value = serde_json::from_str(&data)?;

    let mut options = EnqueueOptions::default().delay(seconds(delay)?);
    if let Some(timeout) = timeout {
        options = options.task_timeout(seconds(timeout)?);
    }

    let id = queue.enqueue_with(&payload, options).await?;
    println!("{}", id);
    Ok(())
}

async fn inspect_task(queue: &Queue, id: String) -> Result<()> {
    let state = queue.get_task_state(&id).await?;

    println!("Task Details: {}", id);
    println!("  Status: {}", state.status);
    println!("  Timeout: {:?}", state.timeout);
    println!("  Enqueued at: {}", timestamp(Some(state.enqueue_time)));
    println!("  Last dequeue: {}", timestamp(state.last_dequeue_time));
    println!("  Dequeue count: {}", state.dequeue_count);
    println!("  Last requeue: {}", timestamp(state.last_requeue_time));
    println!("  Requeue count: {}", state.requeue_count);
    println!("  Released at: {}", timestamp(state.release_time));
    if let Some(result) = state.decode_result::<Value, _>(queue.codec())? {
        println!("  Result: {}", result);
    }
    Ok(())
}

async fn watch_task(queue: &Queue, id: String, timeout: Option<f64>) -> Result<()> {
    let timeout = timeout.map(seconds).transpose()?;
    let mut watch = queue.watch(&id, timeout).await?;

    while let Some(state) = watch.next().await {
        println!("{}", summary(&state?));
    }
    Ok(())
}

async fn requeue_task(queue: &Queue, id: String, delay: f64, timeout: Option<f64>) -> Result<()> {
    let mut options = RequeueOptions::default().delay(seconds(delay)?);
    if let Some(timeout) = timeout {
        options = options.task_timeout(seconds(timeout)?);
    }

    let report = queue.requeue(&id, options).await?;
    print_report(&report);
    Ok(())
}

async fn release_task(
    queue: &Queue,
    id: String,
    result: Option<String>,
    result_ttl: Option<f64>,
    rejected: bool,
) -> Result<()> {
    let result: Option<Value> = result.map(|raw| serde_json::from_str(&raw)).transpose()?;

    let status = if rejected {
        TaskStatus::Rejected
    } else {
        TaskStatus::Completed
    };
    let mut options = ReleaseOptions::default().status(status);
    if let Some(ttl) = result_ttl {
        options = options.result_ttl(seconds(ttl)?);
    }

    let report = queue.release_with(&id, result.as_ref(), options).await?;
    print_report(&report);
    Ok(())
}

fn print_report(report: &TransitionReport) {
    if report.is_applied() {
        match report.requeue_count {
            Some(count) => println!("Task {} {}d (requeue count: {})", report.task_id, report.operation, count),
            None => println!("Task {} {}d", report.task_id, report.operation),
        }
    } else {
        println!("  ! Task {} is not in the working set, nothing changed", report.task_id);
    }
}

fn summary(state: &TaskState) -> String {
    format!(
        "{} status={} dequeues={} requeues={}",
        timestamp(Some(state.last_requeue_time.or(state.last_dequeue_time).unwrap_or(state.enqueue_time))),
        state.status,
        state.dequeue_count,
        state.requeue_count
    )
}

fn timestamp(value: Option<f64>) -> String {
    value
        .and_then(to_datetime)
        .map(|dt| dt.to_rfc3339_opts(SecondsFormat::Millis, true))
        .unwrap_or_else(|| "-".to_string())
}

/// Parse a non-negative number of seconds
pub fn seconds(value: f64) -> Result<Duration> {
    Duration::try_from_secs_f64(value).map_err(|_| eyre!("invalid number of seconds: {}", value))
}
