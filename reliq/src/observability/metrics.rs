//! Prometheus metrics collector for Reliq
//!
//! Counts queue transitions and mirrors the queue counters as gauges.

use crate::client::QueueStats;
use prometheus::{IntCounterVec, IntGaugeVec, Opts, Registry, TextEncoder};
use std::sync::Arc;

/// Reliq metrics collector
///
/// Every series is labelled by queue name, so one collector can be shared by
/// several queues.
#[derive(Clone)]
pub struct QueueMetrics {
    registry: Arc<Registry>,

    // Transition counters
    tasks_enqueued_total: IntCounterVec,
    tasks_dequeued_total: IntCounterVec,
    tasks_requeued_total: IntCounterVec,
    tasks_released_total: IntCounterVec,
    tasks_reclaimed_total: IntCounterVec,
    tasks_promoted_total: IntCounterVec,
    inconsistent_transitions_total: IntCounterVec,

    // Queue gauges
    queue_pending_tasks: IntGaugeVec,
    queue_working_tasks: IntGaugeVec,
    queue_delayed_tasks: IntGaugeVec,
    queue_tasks: IntGaugeVec,
}

impl QueueMetrics {
    /// Create a new metrics collector
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let tasks_enqueued_total = IntCounterVec::new(
            Opts::new("reliq_tasks_enqueued_total", "Total number of tasks enqueued"),
            &["queue"],
        )?;

        let tasks_dequeued_total = IntCounterVec::new(
            Opts::new("reliq_tasks_dequeued_total", "Total number of tasks dequeued"),
            &["queue"],
        )?;

        let tasks_requeued_total = IntCounterVec::new(
            Opts::new("reliq_tasks_requeued_total", "Total number of explicit requeues"),
            &["queue"],
        )?;

        let tasks_released_total = IntCounterVec::new(
            Opts::new("reliq_tasks_released_total", "Total number of tasks released"),
            &["queue", "status"],
        )?;

        let tasks_reclaimed_total = IntCounterVec::new(
            Opts::new("reliq_tasks_reclaimed_total", "Timed-out tasks returned to pending by sweep"),
            &["queue"],
        )?;

        let tasks_promoted_total = IntCounterVec::new(
            Opts::new("reliq_tasks_promoted_total", "Delayed tasks made pending by sweep"),
            &["queue"],
        )?;

        let inconsistent_transitions_total = IntCounterVec::new(
            Opts::new(
                "reliq_inconsistent_transitions_total",
                "Requeue or release calls on tasks missing from the working set",
            ),
            &["queue", "operation"],
        )?;

        let queue_pending_tasks = IntGaugeVec::new(
            Opts::new("reliq_queue_pending_tasks", "Number of pending tasks in queue"),
            &["queue"],
        )?;

        let queue_working_tasks = IntGaugeVec::new(
            Opts::new("reliq_queue_working_tasks", "Number of in-flight tasks in queue"),
            &["queue"],
        )?;

        let queue_delayed_tasks = IntGaugeVec::new(
            Opts::new("reliq_queue_delayed_tasks", "Number of delayed tasks in queue"),
            &["queue"],
        )?;

        let queue_tasks = IntGaugeVec::new(
            Opts::new("reliq_queue_tasks", "Number of unreleased tasks in queue"),
            &["queue"],
        )?;

        registry.register(Box::new(tasks_enqueued_total.clone()))?;
        registry.register(Box::new(tasks_dequeued_total.clone()))?;
        registry.register(Box::new(tasks_requeued_total.clone()))?;
        registry.register(Box::new(tasks_released_total.clone()))?;
        registry.register(Box::new(tasks_reclaimed_total.clone()))?;
        registry.register(Box::new(tasks_promoted_total.clone()))?;
        registry.register(Box::new(inconsistent_transitions_total.clone()))?;
        registry.register(Box::new(queue_pending_tasks.clone()))?;
        registry.register(Box::new(queue_working_tasks.clone()))?;
        registry.register(Box::new(queue_delayed_tasks.clone()))?;
        registry.register(Box::new(queue_tasks.clone()))?;

        Ok(Self {
            registry: Arc::new(registry),
            tasks_enqueued_total,
            tasks_dequeued_total,
            tasks_requeued_total,
            tasks_released_total,
            tasks_reclaimed_total,
            tasks_promoted_total,
            inconsistent_transitions_total,
            queue_pending_tasks,
            queue_working_tasks,
            queue_delayed_tasks,
            queue_tasks,
        })
    }

    /// Record enqueued tasks
    pub fn record_enqueued(&self, queue: &str, count: u64) {
        self.tasks_enqueued_total.with_label_values(&[queue]).inc_by(count);
    }

    /// Record a dequeued task
    pub fn record_dequeued(&self, queue: &str) {
        self.tasks_dequeued_total.with_label_values(&[queue]).inc();
    }

    /// Record an explicit requeue
    pub fn record_requeued(&self, queue: &str) {
        self.tasks_requeued_total.with_label_values(&[queue]).inc();
    }

    /// Record a released task
    pub fn record_released(&self, queue: &str, status: &str) {
        self.tasks_released_total
            .with_label_values(&[queue, status])
            .inc();
    }

    /// Record the outcome of one sweep pass
    pub fn record_sweep(&self, queue: &str, reclaimed: u64, promoted: u64) {
        self.tasks_reclaimed_total.with_label_values(&[queue]).inc_by(reclaimed);
        self.tasks_promoted_total.with_label_values(&[queue]).inc_by(promoted);
    }

    /// Record an inconsistent requeue or release
    pub fn record_inconsistency(&self, queue: &str, operation: &str) {
        self.inconsistent_transitions_total
            .with_label_values(&[queue, operation])
            .inc();
    }

    /// Update queue gauges
    pub fn update_queue_metrics(&self, queue: &str, stats: &QueueStats) {
        self.queue_pending_tasks
            .with_label_values(&[queue])
            .set(stats.pending as i64);
        self.queue_working_tasks
            .with_label_values(&[queue])
            .set(stats.working as i64);
        self.queue_delayed_tasks
            .with_label_values(&[queue])
            .set(stats.delayed as i64);
        self.queue_tasks
            .with_label_values(&[queue])
            .set(stats.tasks as i64);
    }

    /// Get the registry for custom metrics
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Gather metrics in Prometheus text format
    pub fn gather(&self) -> String {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        encoder.encode_to_string(&metric_families).unwrap_or_default()
    }
}
