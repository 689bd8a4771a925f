//! Threshold monitoring for the blog scheduler.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use super::alerts::{summarize, Alert, AlertLevel, AlertLog, HealthSummary, HEALTH_WINDOW_MINUTES};
use super::process::MemoryUsage;
use crate::metrics::AppMetrics;
use crate::scheduler::BlogPostScheduler;

const BYTES_PER_MB: u64 = 1024 * 1024;

#[derive(Debug, Clone, PartialEq)]
pub struct BlogAlertThresholds {
    pub max_queue_size: usize,
    pub max_memory_bytes: u64,
    pub max_failed_posts: usize,
    pub max_processing_duration: Duration,
    pub max_time_since_last_run: Duration,
}

impl Default for BlogAlertThresholds {
    fn default() -> Self {
        Self {
            max_queue_size: 50,
            max_memory_bytes: 500 * BYTES_PER_MB,
            max_failed_posts: 5,
            max_processing_duration: Duration::minutes(5),
            max_time_since_last_run: Duration::minutes(20),
        }
    }
}

/// Point-in-time view of the scheduler and the process hosting it.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BlogSchedulerMetrics {
    pub timestamp: DateTime<Utc>,
    pub total_scheduled: u64,
    pub ready_to_process: u64,
    pub queue_size: usize,
    pub processing: bool,
    /// How long the run in flight has been going.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processing_duration_seconds: Option<i64>,
    pub failed_posts: usize,
    pub errors: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_run: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_run: Option<DateTime<Utc>>,
    pub runs: u64,
    pub memory: MemoryUsage,
    pub uptime_seconds: u64,
}

/// JSON and Prometheus renderings of one snapshot.
#[derive(Debug, Clone)]
pub struct MetricsExport {
    pub json: serde_json::Value,
    pub prometheus: String,
}

pub struct BlogSchedulerMonitoring {
    scheduler: Arc<BlogPostScheduler>,
    thresholds: BlogAlertThresholds,
    alerts: Mutex<AlertLog>,
    started: Instant,
    started_at: DateTime<Utc>,
}

impl BlogSchedulerMonitoring {
    pub fn new(scheduler: Arc<BlogPostScheduler>) -> Self {
        Self {
            scheduler,
            thresholds: BlogAlertThresholds::default(),
            alerts: Mutex::new(AlertLog::default()),
            started: Instant::now(),
            started_at: Utc::now(),
        }
    }

    pub fn with_thresholds(mut self, thresholds: BlogAlertThresholds) -> Self {
        self.thresholds = thresholds;
        self
    }

    fn alerts(&self) -> MutexGuard<'_, AlertLog> {
        self.alerts.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub async fn collect_metrics(&self) -> BlogSchedulerMetrics {
        let stats = self.scheduler.get_blog_scheduling_stats().await;
        let runtime = self.scheduler.runtime_snapshot();
        let now = Utc::now();

        BlogSchedulerMetrics {
            timestamp: now,
            total_scheduled: stats.total_scheduled,
            ready_to_process: stats.ready_to_process,
            queue_size: runtime.queue_size,
            processing: runtime.processing,
            processing_duration_seconds: runtime
                .run_started_at
                .map(|started| (now - started).num_seconds()),
            failed_posts: stats.failed,
            errors: stats.errors,
            last_run: runtime.last_run,
            next_run: runtime.next_run,
            runs: runtime.runs,
            memory: MemoryUsage::current(),
            uptime_seconds: self.started.elapsed().as_secs(),
        }
    }

    /// Evaluate the thresholds against `snapshot` and return every breach.
    /// A breach is only recorded when no alert for the same metric is
    /// already inside the health window, so repeated checks of a standing
    /// condition cost the health score once.
    pub fn check_alerts(&self, snapshot: &BlogSchedulerMetrics) -> Vec<Alert> {
        let t = &self.thresholds;
        let mut raised = Vec::new();

        if snapshot.queue_size > t.max_queue_size {
            raised.push(Alert::new(
                AlertLevel::Warning,
                "queue_size",
                format!("Queue size is high: {} items", snapshot.queue_size),
                snapshot.queue_size as f64,
                t.max_queue_size as f64,
            ));
        }

        if snapshot.memory.resident_bytes > t.max_memory_bytes {
            raised.push(Alert::new(
                AlertLevel::Warning,
                "memory_usage",
                format!("Memory usage is high: {:.0}MB", snapshot.memory.resident_mb()),
                snapshot.memory.resident_bytes as f64,
                t.max_memory_bytes as f64,
            ));
        }

        if snapshot.failed_posts > t.max_failed_posts {
            raised.push(Alert::new(
                AlertLevel::Error,
                "failed_posts",
                format!("Too many failed posts: {}", snapshot.failed_posts),
                snapshot.failed_posts as f64,
                t.max_failed_posts as f64,
            ));
        }

        if !snapshot.errors.is_empty() {
            raised.push(Alert::new(
                AlertLevel::Warning,
                "errors",
                format!("Scheduler reported {} error(s)", snapshot.errors.len()),
                snapshot.errors.len() as f64,
                0.0,
            ));
        }

        if let Some(seconds) = snapshot.processing_duration_seconds {
            let limit = t.max_processing_duration.num_seconds();
            if seconds > limit {
                raised.push(Alert::new(
                    AlertLevel::Critical,
                    "processing_duration",
                    format!("Processing has been running for {}s", seconds),
                    seconds as f64,
                    limit as f64,
                ));
            }
        }

        if snapshot.ready_to_process > 0 {
            let reference = snapshot.last_run.unwrap_or(self.started_at);
            let idle = (snapshot.timestamp - reference).num_seconds();
            let limit = t.max_time_since_last_run.num_seconds();
            if idle > limit {
                raised.push(Alert::new(
                    AlertLevel::Error,
                    "time_since_last_run",
                    format!(
                        "{} post(s) waiting and the scheduler has not run for {} minutes",
                        snapshot.ready_to_process,
                        idle / 60
                    ),
                    idle as f64,
                    limit as f64,
                ));
            }
        }

        for alert in &raised {
            match alert.level {
                AlertLevel::Critical | AlertLevel::Error => {
                    tracing::error!(metric = %alert.metric, "{}", alert.message)
                }
                AlertLevel::Warning => tracing::warn!(metric = %alert.metric, "{}", alert.message),
            }
        }

        let window_start = Utc::now() - Duration::minutes(HEALTH_WINDOW_MINUTES);
        let mut log = self.alerts();
        let active = log.since(window_start);
        for alert in &raised {
            if !active.iter().any(|a| a.metric == alert.metric) {
                log.push(alert.clone());
            }
        }
        raised
    }

    pub fn record_alert(&self, alert: Alert) {
        self.alerts().push(alert);
    }

    /// Newest first.
    pub fn recent_alerts(&self, limit: usize) -> Vec<Alert> {
        self.alerts().latest(limit)
    }

    fn window_alerts(&self) -> Vec<Alert> {
        self.alerts()
            .since(Utc::now() - Duration::minutes(HEALTH_WINDOW_MINUTES))
    }

    pub fn get_health_summary(&self) -> HealthSummary {
        summarize(&self.window_alerts(), recommendation)
    }

    /// Render `snapshot` as JSON and Prometheus text. The gauges in
    /// `metrics` are refreshed from the snapshot first.
    pub fn export_metrics(
        &self,
        snapshot: &BlogSchedulerMetrics,
        metrics: &AppMetrics,
    ) -> Result<MetricsExport, prometheus::Error> {
        metrics.observe_snapshot(snapshot, self.window_alerts().len());
        Ok(MetricsExport {
            json: serde_json::to_value(snapshot).unwrap_or_default(),
            prometheus: metrics.render()?,
        })
    }
}

fn recommendation(metric: &str) -> Option<&'static str> {
    match metric {
        "queue_size" => Some("Increase the polling frequency or investigate slow publishes"),
        "memory_usage" => Some("Check for memory leaks and restart the service if usage keeps growing"),
        "failed_posts" => Some("Check content store credentials and connectivity"),
        "errors" => Some("Review recent scheduler errors in the logs"),
        "processing_duration" => Some("A run appears stuck; check the content store and restart if needed"),
        "time_since_last_run" => Some("Verify the cron job or polling loop is running"),
        _ => None,
    }
}
