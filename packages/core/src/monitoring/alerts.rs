//! Alerts and health scoring shared by the monitors.
//!
//! [`AlertLog`] holds a bounded window of raised alerts. When full, the
//! oldest entry is evicted before the new one is inserted (ring-buffer
//! semantics backed by `VecDeque`). Nothing is persisted; alerts are lost on
//! restart.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Maximum number of alerts retained in memory.
pub const ALERT_CAPACITY: usize = 100;

/// Window of alerts that count toward the health score.
pub const HEALTH_WINDOW_MINUTES: i64 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertLevel {
    Warning,
    Error,
    Critical,
}

impl AlertLevel {
    /// Points subtracted from the health score per alert.
    pub fn penalty(&self) -> i32 {
        match self {
            AlertLevel::Warning => 5,
            AlertLevel::Error => 15,
            AlertLevel::Critical => 30,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Alert {
    pub level: AlertLevel,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    pub metric: String,
    pub value: f64,
    pub threshold: f64,
}

impl Alert {
    pub fn new(
        level: AlertLevel,
        metric: &str,
        message: impl Into<String>,
        value: f64,
        threshold: f64,
    ) -> Self {
        Self {
            level,
            message: message.into(),
            timestamp: Utc::now(),
            metric: metric.to_string(),
            value,
            threshold,
        }
    }

    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }
}

/// Capacity-bounded in-memory alert history.
#[derive(Debug)]
pub struct AlertLog {
    alerts: VecDeque<Alert>,
    capacity: usize,
}

impl Default for AlertLog {
    fn default() -> Self {
        Self::new(ALERT_CAPACITY)
    }
}

impl AlertLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            alerts: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append an alert, evicting the oldest if the log is full.
    pub fn push(&mut self, alert: Alert) {
        if self.capacity == 0 {
            return;
        }
        if self.alerts.len() >= self.capacity {
            self.alerts.pop_front();
        }
        self.alerts.push_back(alert);
    }

    /// Alerts raised at or after `since`, oldest first.
    pub fn since(&self, since: DateTime<Utc>) -> Vec<Alert> {
        self.alerts
            .iter()
            .filter(|a| a.timestamp >= since)
            .cloned()
            .collect()
    }

    /// The `n` most recent alerts, newest first.
    pub fn latest(&self, n: usize) -> Vec<Alert> {
        self.alerts.iter().rev().take(n).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.alerts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.alerts.is_empty()
    }

    pub fn clear(&mut self) {
        self.alerts.clear();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AlertCounts {
    pub warning: usize,
    pub error: usize,
    pub critical: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthSummary {
    pub status: HealthStatus,
    /// 0 – 100.
    pub score: i32,
    pub issues: Vec<String>,
    pub recommendations: Vec<String>,
    pub alert_counts: AlertCounts,
}

/// Score a set of alerts: 100 minus each alert's penalty, floored at 0.
///
/// `recommend` maps an alert's metric name to advice; each distinct piece
/// of advice is listed once.
pub fn summarize<F>(alerts: &[Alert], recommend: F) -> HealthSummary
where
    F: Fn(&str) -> Option<&'static str>,
{
    let mut counts = AlertCounts::default();
    let mut issues: Vec<String> = Vec::new();
    let mut recommendations: Vec<String> = Vec::new();
    let mut penalty = 0;

    for alert in alerts {
        penalty += alert.level.penalty();
        match alert.level {
            AlertLevel::Warning => counts.warning += 1,
            AlertLevel::Error => counts.error += 1,
            AlertLevel::Critical => counts.critical += 1,
        }
        if !issues.contains(&alert.message) {
            issues.push(alert.message.clone());
        }
        if let Some(advice) = recommend(&alert.metric) {
            if !recommendations.iter().any(|r| r == advice) {
                recommendations.push(advice.to_string());
            }
        }
    }

    let score = (100 - penalty).max(0);
    let status = if score >= 80 {
        HealthStatus::Healthy
    } else if score >= 50 {
        HealthStatus::Degraded
    } else {
        HealthStatus::Unhealthy
    };

    HealthSummary {
        status,
        score,
        issues,
        recommendations,
        alert_counts: counts,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use proptest::prelude::*;

    fn alert(level: AlertLevel, metric: &str) -> Alert {
        Alert::new(level, metric, format!("{} breached", metric), 1.0, 0.0)
    }

    fn no_advice(_: &str) -> Option<&'static str> {
        None
    }

    #[test]
    fn no_alerts_is_fully_healthy() {
        let summary = summarize(&[], no_advice);
        assert_eq!(summary.score, 100);
        assert_eq!(summary.status, HealthStatus::Healthy);
        assert!(summary.issues.is_empty());
    }

    #[test]
    fn four_critical_alerts_are_unhealthy() {
        let alerts: Vec<_> = (0..4).map(|_| alert(AlertLevel::Critical, "x")).collect();
        let summary = summarize(&alerts, no_advice);
        assert!(summary.score <= 0);
        assert_eq!(summary.status, HealthStatus::Unhealthy);
        assert_eq!(summary.alert_counts.critical, 4);
    }

    #[test]
    fn penalties_map_to_status_bands() {
        let degraded = summarize(
            &[alert(AlertLevel::Error, "a"), alert(AlertLevel::Warning, "b")],
            no_advice,
        );
        assert_eq!(degraded.score, 80);
        assert_eq!(degraded.status, HealthStatus::Healthy);

        let worse = summarize(
            &[alert(AlertLevel::Critical, "a"), alert(AlertLevel::Warning, "b")],
            no_advice,
        );
        assert_eq!(worse.score, 65);
        assert_eq!(worse.status, HealthStatus::Degraded);
    }

    #[test]
    fn recommendations_are_deduplicated() {
        let alerts = vec![
            alert(AlertLevel::Warning, "queue_size"),
            alert(AlertLevel::Warning, "queue_size"),
        ];
        let summary = summarize(&alerts, |metric| {
            (metric == "queue_size").then_some("Run the scheduler more often")
        });
        assert_eq!(summary.recommendations, vec!["Run the scheduler more often"]);
        assert_eq!(summary.issues.len(), 1);
    }

    #[test]
    fn push_evicts_oldest_when_at_capacity() {
        let mut log = AlertLog::new(3);
        for metric in ["a", "b", "c", "d"] {
            log.push(alert(AlertLevel::Warning, metric));
        }
        assert_eq!(log.len(), 3);
        let latest = log.latest(10);
        assert_eq!(latest[0].metric, "d");
        assert_eq!(latest[2].metric, "b");
    }

    #[test]
    fn since_filters_by_timestamp() {
        let mut log = AlertLog::default();
        let now = Utc::now();
        log.push(alert(AlertLevel::Warning, "old").at(now - Duration::minutes(30)));
        log.push(alert(AlertLevel::Warning, "new").at(now - Duration::minutes(1)));

        let recent = log.since(now - Duration::minutes(HEALTH_WINDOW_MINUTES));
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].metric, "new");
    }

    proptest! {
        #[test]
        fn log_never_exceeds_capacity(pushes in 0usize..400) {
            let mut log = AlertLog::default();
            for i in 0..pushes {
                log.push(alert(AlertLevel::Warning, &i.to_string()));
            }
            prop_assert_eq!(log.len(), pushes.min(ALERT_CAPACITY));
            if pushes > 0 {
                let newest = log.latest(1);
                prop_assert_eq!(&newest[0].metric, &(pushes - 1).to_string());
            }
        }
    }
}
