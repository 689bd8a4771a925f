//! In-process polling loop.
//!
//! An alternative to the external cron driver: each tick runs one
//! processing pass, records it in the metrics registry, and evaluates the
//! monitoring thresholds against a fresh snapshot.

use std::sync::Arc;
use std::time::Duration;

use tokio::signal;
use tokio::time::{self, MissedTickBehavior};

use super::{BlogPostScheduler, ProcessingResult};
use crate::metrics::AppMetrics;
use crate::monitoring::BlogSchedulerMonitoring;

/// Run the blog polling loop until Ctrl+C.
///
/// A failing pass is logged and the loop carries on. Ticks missed while a
/// slow pass was running are skipped rather than fired back to back.
pub async fn run_blog_polling(
    scheduler: Arc<BlogPostScheduler>,
    monitoring: Arc<BlogSchedulerMonitoring>,
    metrics: Arc<AppMetrics>,
    poll_interval_seconds: u64,
) {
    let mut interval = time::interval(Duration::from_secs(poll_interval_seconds.max(1)));
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    tracing::info!("Blog polling started (interval: {}s)", poll_interval_seconds);

    loop {
        tokio::select! {
            _ = interval.tick() => {
                poll_once(&scheduler, &monitoring, &metrics).await;
            }

            _ = signal::ctrl_c() => {
                tracing::info!("Shutdown signal received. Stopping blog polling.");
                break;
            }
        }
    }

    tracing::info!("Blog polling stopped cleanly");
}

/// One polling cycle.
pub(crate) async fn poll_once(
    scheduler: &BlogPostScheduler,
    monitoring: &BlogSchedulerMonitoring,
    metrics: &AppMetrics,
) -> ProcessingResult {
    let result = scheduler.process_scheduled_blog_posts().await;
    metrics.record_run(&result);

    if result.was_rejected() {
        tracing::debug!("Previous processing run still in flight; skipping tick");
    } else if result.processed > 0 || !result.errors.is_empty() {
        tracing::info!(
            processed = result.processed,
            successful = result.successful,
            failed = result.failed,
            "Blog polling tick finished"
        );
    }

    let snapshot = monitoring.collect_metrics().await;
    let raised = monitoring.check_alerts(&snapshot);
    if let Err(err) = monitoring.export_metrics(&snapshot, metrics) {
        tracing::warn!("Failed to refresh scheduler gauges: {}", err);
    }
    if !raised.is_empty() {
        tracing::debug!(count = raised.len(), "Monitoring raised alerts this tick");
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;

    use crate::scheduler::RetryPolicy;
    use crate::services::mock::MockContentStore;
    use crate::store::StoreError;

    fn wire(store: MockContentStore) -> (Arc<BlogPostScheduler>, BlogSchedulerMonitoring, AppMetrics) {
        let scheduler = Arc::new(
            BlogPostScheduler::new(Arc::new(store)).with_retry_policy(RetryPolicy::immediate(2)),
        );
        let monitoring = BlogSchedulerMonitoring::new(scheduler.clone());
        (scheduler, monitoring, AppMetrics::new().unwrap())
    }

    #[tokio::test]
    async fn poll_once_publishes_and_records_metrics() {
        let (scheduler, monitoring, metrics) = wire(MockContentStore::new().with_posts(vec![
            MockContentStore::scheduled_post("A", ChronoDuration::minutes(-10)),
            MockContentStore::scheduled_post("B", ChronoDuration::minutes(10)),
        ]));

        let result = poll_once(&scheduler, &monitoring, &metrics).await;

        assert_eq!(result.published_posts, vec!["A".to_string()]);
        assert!((metrics.posts_published_total.get() - 1.0).abs() < f64::EPSILON);
        assert!((metrics.scheduled_posts.get() - 1.0).abs() < f64::EPSILON);
        assert!(monitoring.recent_alerts(10).is_empty());
    }

    #[tokio::test]
    async fn poll_once_survives_store_outage_and_raises_alert() {
        let (scheduler, monitoring, metrics) = wire(
            MockContentStore::new()
                .with_fetch_error(StoreError::network("connection refused"))
                .with_count_error(StoreError::network("connection refused")),
        );

        let result = poll_once(&scheduler, &monitoring, &metrics).await;

        assert_eq!(result.processed, 0);
        assert!(!result.errors.is_empty());
        assert!(monitoring
            .recent_alerts(10)
            .iter()
            .any(|alert| alert.metric == "errors"));
        assert!(!scheduler.is_processing());
    }

    #[tokio::test]
    async fn consecutive_ticks_do_not_republish() {
        let store = Arc::new(MockContentStore::new().with_posts(vec![
            MockContentStore::scheduled_post("A", ChronoDuration::minutes(-1)),
        ]));
        let scheduler = Arc::new(BlogPostScheduler::new(store.clone()));
        let monitoring = BlogSchedulerMonitoring::new(scheduler.clone());
        let metrics = AppMetrics::new().unwrap();

        poll_once(&scheduler, &monitoring, &metrics).await;
        let second = poll_once(&scheduler, &monitoring, &metrics).await;

        assert_eq!(second.processed, 0);
        assert_eq!(store.publish_calls(), 1);
        assert!((metrics.scheduler_runs_total.get() - 2.0).abs() < f64::EPSILON);
    }
}
