//! Threshold-based monitoring for the scheduler and the newsletter.
//!
//! Both monitors take snapshots on demand, raise [`Alert`]s for threshold
//! breaches into a bounded in-memory [`AlertLog`], and score their recent
//! alerts into a [`HealthSummary`].

pub mod alerts;
pub mod blog;
pub mod newsletter;
pub mod process;

pub use alerts::{Alert, AlertLevel, AlertLog, HealthStatus, HealthSummary, ALERT_CAPACITY};
pub use blog::{BlogAlertThresholds, BlogSchedulerMetrics, BlogSchedulerMonitoring, MetricsExport};
pub use newsletter::{NewsletterAlertThresholds, NewsletterMetrics, NewsletterMonitoring};
pub use process::MemoryUsage;
