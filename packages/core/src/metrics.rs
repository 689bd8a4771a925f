//! Prometheus metrics registry for the back-office service.
//!
//! [`AppMetrics`] owns all registered metrics and the [`Registry`] they
//! belong to. Construct it once at startup, wrap in `Arc`, and pass it to
//! the scheduler loop, the monitoring layer and the HTTP middleware.
//!
//! Exposed at `GET /metrics` and, refreshed from a monitoring snapshot, at
//! `GET /api/admin/blog/monitoring?format=prometheus`.

use prometheus::{
    Counter, CounterVec, Gauge, Histogram, HistogramOpts, Opts, Registry,
};

use crate::monitoring::BlogSchedulerMetrics;
use crate::scheduler::ProcessingResult;

/// All application-level Prometheus metrics.
pub struct AppMetrics {
    /// Processing runs that actually executed.
    pub scheduler_runs_total: Counter,
    /// Runs refused because another one was in flight.
    pub scheduler_rejected_runs_total: Counter,
    pub posts_published_total: Counter,
    pub posts_failed_total: Counter,
    pub automation_failures_total: Counter,
    pub scheduled_posts: Gauge,
    pub ready_posts: Gauge,
    pub queue_size: Gauge,
    pub failed_posts: Gauge,
    pub scheduler_errors: Gauge,
    pub memory_resident_bytes: Gauge,
    pub uptime_seconds: Gauge,
    pub recent_alerts: Gauge,
    /// Newsletter subscribe outcomes, labelled by outcome.
    pub newsletter_subscriptions_total: CounterVec,
    /// HTTP request count, labelled by method, path, and status code.
    pub http_requests_total: CounterVec,
    /// HTTP request latency histogram in seconds.
    pub http_request_duration: Histogram,
    /// The registry that owns all of the above metrics.
    pub registry: Registry,
}

fn counter(name: &str, help: &str) -> Result<Counter, prometheus::Error> {
    Counter::with_opts(Opts::new(name, help))
}

fn gauge(name: &str, help: &str) -> Result<Gauge, prometheus::Error> {
    Gauge::with_opts(Opts::new(name, help))
}

impl AppMetrics {
    /// Create and register all metrics. Returns an error if any metric
    /// name is invalid or duplicated.
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let scheduler_runs_total =
            counter("blog_scheduler_runs_total", "Scheduled blog processing runs")?;
        let scheduler_rejected_runs_total = counter(
            "blog_scheduler_rejected_runs_total",
            "Processing runs refused because one was already in progress",
        )?;
        let posts_published_total =
            counter("blog_scheduler_posts_published_total", "Blog posts published")?;
        let posts_failed_total = counter(
            "blog_scheduler_posts_failed_total",
            "Blog posts that failed to publish after retries",
        )?;
        let automation_failures_total = counter(
            "blog_scheduler_automation_failures_total",
            "Published posts whose automation reported errors",
        )?;

        let scheduled_posts =
            gauge("blog_scheduler_scheduled_posts", "Posts carrying a schedule")?;
        let ready_posts = gauge("blog_scheduler_ready_posts", "Scheduled posts that are due")?;
        let queue_size = gauge("blog_scheduler_queue_size", "Posts queued in the current run")?;
        let failed_posts =
            gauge("blog_scheduler_failed_posts", "Failed publishes in the last run")?;
        let scheduler_errors =
            gauge("blog_scheduler_errors", "Recent scheduler error messages")?;
        let memory_resident_bytes = gauge(
            "blog_scheduler_memory_resident_bytes",
            "Resident memory of the process in bytes",
        )?;
        let uptime_seconds = gauge("blog_scheduler_uptime_seconds", "Process uptime in seconds")?;
        let recent_alerts =
            gauge("blog_scheduler_recent_alerts", "Alerts raised in the last 5 minutes")?;

        let newsletter_subscriptions_total = CounterVec::new(
            Opts::new(
                "newsletter_subscriptions_total",
                "Newsletter subscribe requests by outcome",
            ),
            &["outcome"],
        )?;

        let http_requests_total = CounterVec::new(
            Opts::new(
                "backoffice_http_requests_total",
                "HTTP requests by method, path, and status",
            ),
            &["method", "path", "status"],
        )?;

        let http_request_duration = Histogram::with_opts(
            HistogramOpts::new(
                "backoffice_http_request_duration_seconds",
                "HTTP request latency in seconds",
            )
            .buckets(vec![0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0]),
        )?;

        registry.register(Box::new(scheduler_runs_total.clone()))?;
        registry.register(Box::new(scheduler_rejected_runs_total.clone()))?;
        registry.register(Box::new(posts_published_total.clone()))?;
        registry.register(Box::new(posts_failed_total.clone()))?;
        registry.register(Box::new(automation_failures_total.clone()))?;
        registry.register(Box::new(scheduled_posts.clone()))?;
        registry.register(Box::new(ready_posts.clone()))?;
        registry.register(Box::new(queue_size.clone()))?;
        registry.register(Box::new(failed_posts.clone()))?;
        registry.register(Box::new(scheduler_errors.clone()))?;
        registry.register(Box::new(memory_resident_bytes.clone()))?;
        registry.register(Box::new(uptime_seconds.clone()))?;
        registry.register(Box::new(recent_alerts.clone()))?;
        registry.register(Box::new(newsletter_subscriptions_total.clone()))?;
        registry.register(Box::new(http_requests_total.clone()))?;
        registry.register(Box::new(http_request_duration.clone()))?;

        Ok(Self {
            scheduler_runs_total,
            scheduler_rejected_runs_total,
            posts_published_total,
            posts_failed_total,
            automation_failures_total,
            scheduled_posts,
            ready_posts,
            queue_size,
            failed_posts,
            scheduler_errors,
            memory_resident_bytes,
            uptime_seconds,
            recent_alerts,
            newsletter_subscriptions_total,
            http_requests_total,
            http_request_duration,
            registry,
        })
    }

    /// Count the outcome of one processing run.
    pub fn record_run(&self, result: &ProcessingResult) {
        if result.was_rejected() {
            self.scheduler_rejected_runs_total.inc();
            return;
        }
        self.scheduler_runs_total.inc();
        self.posts_published_total.inc_by(result.successful as f64);
        self.posts_failed_total.inc_by(result.failed as f64);
        self.automation_failures_total
            .inc_by(result.automation_failures as f64);
    }

    /// Mirror a monitoring snapshot into the gauges.
    pub fn observe_snapshot(&self, snapshot: &BlogSchedulerMetrics, recent_alerts: usize) {
        self.scheduled_posts.set(snapshot.total_scheduled as f64);
        self.ready_posts.set(snapshot.ready_to_process as f64);
        self.queue_size.set(snapshot.queue_size as f64);
        self.failed_posts.set(snapshot.failed_posts as f64);
        self.scheduler_errors.set(snapshot.errors.len() as f64);
        self.memory_resident_bytes
            .set(snapshot.memory.resident_bytes as f64);
        self.uptime_seconds.set(snapshot.uptime_seconds as f64);
        self.recent_alerts.set(recent_alerts as f64);
    }

    pub fn record_subscription(&self, outcome: &str) {
        self.newsletter_subscriptions_total
            .with_label_values(&[outcome])
            .inc();
    }

    /// Render all metrics as Prometheus text format.
    pub fn render(&self) -> Result<String, prometheus::Error> {
        use prometheus::Encoder;
        let encoder = prometheus::TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buf = Vec::new();
        encoder.encode(&metric_families, &mut buf)?;
        Ok(String::from_utf8(buf).unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_metrics_register_without_error() {
        let metrics = AppMetrics::new();
        assert!(metrics.is_ok(), "AppMetrics::new() failed: {:?}", metrics.err());
    }

    #[test]
    fn record_run_counts_published_and_failed_posts() {
        let metrics = AppMetrics::new().unwrap();
        metrics.record_run(&ProcessingResult {
            processed: 3,
            successful: 2,
            failed: 1,
            published_posts: vec!["a".into(), "b".into()],
            errors: vec!["Failed to process blog post c: boom".into()],
            automation_failures: 1,
        });

        assert!((metrics.scheduler_runs_total.get() - 1.0).abs() < f64::EPSILON);
        assert!((metrics.posts_published_total.get() - 2.0).abs() < f64::EPSILON);
        assert!((metrics.posts_failed_total.get() - 1.0).abs() < f64::EPSILON);
        assert!((metrics.automation_failures_total.get() - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn rejected_runs_are_counted_separately() {
        let metrics = AppMetrics::new().unwrap();
        metrics.record_run(&ProcessingResult::already_in_progress());

        assert!((metrics.scheduler_runs_total.get()).abs() < f64::EPSILON);
        assert!((metrics.scheduler_rejected_runs_total.get() - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn render_contains_incremented_counter() {
        let metrics = AppMetrics::new().unwrap();
        metrics.posts_published_total.inc_by(5.0);
        metrics.record_subscription("created");

        let output = metrics.render().unwrap();
        assert!(output.contains("blog_scheduler_posts_published_total 5"));
        assert!(output.contains("newsletter_subscriptions_total{outcome=\"created\"} 1"));
    }

    #[test]
    fn http_requests_counter_vec_labels_work() {
        let metrics = AppMetrics::new().unwrap();
        metrics
            .http_requests_total
            .with_label_values(&["POST", "/api/newsletter/subscribe", "201"])
            .inc();
        let val = metrics
            .http_requests_total
            .with_label_values(&["POST", "/api/newsletter/subscribe", "201"])
            .get();
        assert!((val - 1.0).abs() < f64::EPSILON);
    }
}
