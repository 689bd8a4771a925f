use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use super::alerts::{summarize, Alert, AlertLevel, AlertLog, HealthSummary, HEALTH_WINDOW_MINUTES};
use crate::newsletter::{SubscriberCounts, SubscriberRepository};

#[derive(Debug, Clone, PartialEq)]
pub struct NewsletterAlertThresholds {
    /// Fraction of failed subscribe attempts (0.0 – 1.0).
    pub max_failure_rate: f64,
    /// Failure rate is only judged once this many attempts were seen.
    pub min_attempts_for_rate: u64,
    pub max_rate_limited: u64,
}

impl Default for NewsletterAlertThresholds {
    fn default() -> Self {
        Self {
            max_failure_rate: 0.1,
            min_attempts_for_rate: 10,
            max_rate_limited: 50,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewsletterMetrics {
    pub timestamp: DateTime<Utc>,
    pub subscribers: SubscriberCounts,
    pub new_last_24h: i64,
    pub subscribe_attempts: u64,
    pub subscribe_failures: u64,
    pub rate_limited_requests: u64,
    pub failure_rate: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database_error: Option<String>,
}

/// Subscription counters since process start plus database totals.
pub struct NewsletterMonitoring {
    repository: SubscriberRepository,
    thresholds: NewsletterAlertThresholds,
    attempts: AtomicU64,
    failures: AtomicU64,
    rate_limited: AtomicU64,
    alerts: Mutex<AlertLog>,
}

impl NewsletterMonitoring {
    pub fn new(repository: SubscriberRepository) -> Self {
        Self {
            repository,
            thresholds: NewsletterAlertThresholds::default(),
            attempts: AtomicU64::new(0),
            failures: AtomicU64::new(0),
            rate_limited: AtomicU64::new(0),
            alerts: Mutex::new(AlertLog::default()),
        }
    }

    pub fn with_thresholds(mut self, thresholds: NewsletterAlertThresholds) -> Self {
        self.thresholds = thresholds;
        self
    }

    fn alerts(&self) -> MutexGuard<'_, AlertLog> {
        self.alerts.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn record_attempt(&self) {
        self.attempts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failure(&self) {
        self.failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rate_limited(&self) {
        self.rate_limited.fetch_add(1, Ordering::Relaxed);
    }

    pub async fn collect_metrics(&self) -> NewsletterMetrics {
        let attempts = self.attempts.load(Ordering::Relaxed);
        let failures = self.failures.load(Ordering::Relaxed);
        let failure_rate = if attempts == 0 {
            0.0
        } else {
            failures as f64 / attempts as f64
        };

        let mut metrics = NewsletterMetrics {
            timestamp: Utc::now(),
            subscribe_attempts: attempts,
            subscribe_failures: failures,
            rate_limited_requests: self.rate_limited.load(Ordering::Relaxed),
            failure_rate,
            ..NewsletterMetrics::default()
        };

        let since = metrics.timestamp - Duration::hours(24);
        let (counts, recent) = tokio::join!(
            self.repository.counts(),
            self.repository.count_subscribed_since(since)
        );
        match counts.and_then(|counts| Ok((counts, recent?))) {
            Ok((counts, recent)) => {
                metrics.subscribers = counts;
                metrics.new_last_24h = recent;
            }
            Err(err) => {
                tracing::error!("Failed to read newsletter totals: {}", err);
                metrics.database_error = Some(err.to_string());
            }
        }
        metrics
    }

    pub fn check_alerts(&self, metrics: &NewsletterMetrics) -> Vec<Alert> {
        let t = &self.thresholds;
        let mut raised = Vec::new();

        if let Some(err) = &metrics.database_error {
            raised.push(Alert::new(
                AlertLevel::Critical,
                "database",
                format!("Newsletter database unreachable: {}", err),
                1.0,
                0.0,
            ));
        }

        if metrics.subscribe_attempts >= t.min_attempts_for_rate
            && metrics.failure_rate > t.max_failure_rate
        {
            raised.push(Alert::new(
                AlertLevel::Error,
                "failure_rate",
                format!(
                    "Subscription failure rate is {:.1}%",
                    metrics.failure_rate * 100.0
                ),
                metrics.failure_rate,
                t.max_failure_rate,
            ));
        }

        if metrics.rate_limited_requests > t.max_rate_limited {
            raised.push(Alert::new(
                AlertLevel::Warning,
                "rate_limited",
                format!(
                    "{} subscribe requests were rate limited",
                    metrics.rate_limited_requests
                ),
                metrics.rate_limited_requests as f64,
                t.max_rate_limited as f64,
            ));
        }

        for alert in &raised {
            tracing::warn!(metric = %alert.metric, level = ?alert.level, "{}", alert.message);
        }

        let mut log = self.alerts();
        for alert in &raised {
            log.push(alert.clone());
        }
        raised
    }

    pub fn recent_alerts(&self, limit: usize) -> Vec<Alert> {
        self.alerts().latest(limit)
    }

    pub fn get_health_summary(&self) -> HealthSummary {
        let window = self
            .alerts()
            .since(Utc::now() - Duration::minutes(HEALTH_WINDOW_MINUTES));
        summarize(&window, recommendation)
    }
}

fn recommendation(metric: &str) -> Option<&'static str> {
    match metric {
        "database" => Some("Restore database connectivity"),
        "failure_rate" => Some("Check database and email provider connectivity"),
        "rate_limited" => Some("Review traffic for abuse and consider a CAPTCHA on the signup form"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::create_pool;
    use crate::monitoring::alerts::HealthStatus;

    async fn monitoring() -> NewsletterMonitoring {
        let pool = create_pool("sqlite::memory:").await.unwrap();
        NewsletterMonitoring::new(SubscriberRepository::new(pool))
    }

    #[tokio::test]
    async fn fresh_monitor_is_healthy() {
        let monitor = monitoring().await;
        let metrics = monitor.collect_metrics().await;

        assert!(metrics.database_error.is_none());
        assert_eq!(metrics.subscribers.total, 0);
        assert!(monitor.check_alerts(&metrics).is_empty());
        assert_eq!(monitor.get_health_summary().status, HealthStatus::Healthy);
    }

    #[tokio::test]
    async fn failure_rate_needs_enough_attempts() {
        let monitor = monitoring().await;
        for _ in 0..5 {
            monitor.record_attempt();
            monitor.record_failure();
        }
        let few = monitor.collect_metrics().await;
        assert!((few.failure_rate - 1.0).abs() < f64::EPSILON);
        assert!(monitor.check_alerts(&few).is_empty());

        for _ in 0..5 {
            monitor.record_attempt();
        }
        let enough = monitor.collect_metrics().await;
        let raised = monitor.check_alerts(&enough);
        assert_eq!(raised.len(), 1);
        assert_eq!(raised[0].level, AlertLevel::Error);
        assert_eq!(raised[0].metric, "failure_rate");
    }

    #[tokio::test]
    async fn heavy_rate_limiting_is_a_warning() {
        let monitor = monitoring().await;
        for _ in 0..51 {
            monitor.record_rate_limited();
        }
        let metrics = monitor.collect_metrics().await;
        let raised = monitor.check_alerts(&metrics);
        assert_eq!(raised.len(), 1);
        assert_eq!(raised[0].level, AlertLevel::Warning);
    }

    #[tokio::test]
    async fn unreachable_database_is_critical() {
        let pool = create_pool("sqlite::memory:").await.unwrap();
        pool.close().await;
        let monitor = NewsletterMonitoring::new(SubscriberRepository::new(pool));

        let metrics = monitor.collect_metrics().await;
        assert!(metrics.database_error.is_some());

        let raised = monitor.check_alerts(&metrics);
        assert_eq!(raised[0].level, AlertLevel::Critical);
        let summary = monitor.get_health_summary();
        assert_eq!(summary.score, 70);
        assert_eq!(summary.recommendations, vec!["Restore database connectivity"]);
    }
}
