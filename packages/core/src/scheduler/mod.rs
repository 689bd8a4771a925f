//! Scheduled blog post publishing.
//!
//! [`BlogPostScheduler`] finds posts whose `scheduledAt` has passed and
//! publishes them one at a time, oldest first, retrying each publish under a
//! bounded [`RetryPolicy`]. Successful publishes are handed to the
//! [`AutomationEngine`].
//!
//! None of the public operations return `Err` or panic on store failures:
//! every failure ends up as a string in an `errors` list or as a `false`.
//! Only one processing run may be in flight per scheduler instance; a
//! second caller gets an "already in progress" result immediately.

pub mod polling;
pub mod retry;

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::automation::{AutomationEngine, AutomationResult};
use crate::store::{ContentStore, PostStatus, ScheduledPost, StoreError};

pub use polling::run_blog_polling;
pub use retry::RetryPolicy;

pub const ALREADY_IN_PROGRESS: &str = "Processing already in progress";

/// Recent error strings kept across runs for stats and monitoring.
pub const RECENT_ERRORS_CAPACITY: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueItemType {
    Blog,
}

/// A post waiting to be published in the current run.
#[derive(Debug, Clone, Serialize)]
pub struct QueueItem {
    #[serde(rename = "type")]
    pub item_type: QueueItemType,
    pub post: ScheduledPost,
}

impl QueueItem {
    pub fn blog(post: ScheduledPost) -> Self {
        Self {
            item_type: QueueItemType::Blog,
            post,
        }
    }
}

/// Posts due for publishing, or the reason they could not be listed.
#[derive(Debug, Clone, Default)]
pub struct ScheduledPostsResult {
    pub posts: Vec<ScheduledPost>,
    pub error: Option<String>,
}

/// Outcome of one processing run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessingResult {
    pub processed: usize,
    pub successful: usize,
    pub failed: usize,
    pub published_posts: Vec<String>,
    pub errors: Vec<String>,
    /// Posts whose publish succeeded but whose automation reported errors.
    #[serde(default, skip_serializing_if = "is_zero")]
    pub automation_failures: usize,
}

fn is_zero(value: &usize) -> bool {
    *value == 0
}

impl ProcessingResult {
    pub fn already_in_progress() -> Self {
        Self {
            errors: vec![ALREADY_IN_PROGRESS.to_string()],
            ..Self::default()
        }
    }

    pub fn was_rejected(&self) -> bool {
        self.processed == 0 && self.errors.iter().any(|e| e == ALREADY_IN_PROGRESS)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BlogSchedulingStats {
    pub total_scheduled: u64,
    pub ready_to_process: u64,
    /// Items still queued in the run currently in flight.
    pub processing: usize,
    /// Failed publishes in the most recent run.
    pub failed: usize,
    pub errors: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_run: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_run: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SchedulerServices {
    pub external_store: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SchedulerHealth {
    pub healthy: bool,
    pub services: SchedulerServices,
    pub errors: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ManualPublishResult {
    pub success: bool,
    pub post_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub automation: Option<AutomationResult>,
    pub errors: Vec<String>,
}

/// In-memory scheduler state as seen by the monitoring layer.
#[derive(Debug, Clone, Default)]
pub struct RuntimeSnapshot {
    pub processing: bool,
    pub queue_size: usize,
    pub run_started_at: Option<DateTime<Utc>>,
    pub last_run: Option<DateTime<Utc>>,
    pub next_run: Option<DateTime<Utc>>,
    pub last_result: Option<ProcessingResult>,
    pub recent_errors: Vec<String>,
    pub runs: u64,
}

#[derive(Debug, Default)]
struct SchedulerState {
    queue: VecDeque<QueueItem>,
    recent_errors: VecDeque<String>,
    run_started_at: Option<DateTime<Utc>>,
    last_run: Option<DateTime<Utc>>,
    last_result: Option<ProcessingResult>,
    runs: u64,
}

impl SchedulerState {
    fn record_error(&mut self, error: String) {
        if self.recent_errors.len() >= RECENT_ERRORS_CAPACITY {
            self.recent_errors.pop_front();
        }
        self.recent_errors.push_back(error);
    }
}

/// Clears the in-progress flag when dropped, including on panic or when
/// the run's future is cancelled.
struct ProcessingGuard<'a>(&'a AtomicBool);

impl<'a> ProcessingGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for ProcessingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct BlogPostScheduler {
    store: Arc<dyn ContentStore>,
    automation: Option<Arc<AutomationEngine>>,
    retry: RetryPolicy,
    poll_interval: Option<chrono::Duration>,
    processing: AtomicBool,
    state: Mutex<SchedulerState>,
}

impl BlogPostScheduler {
    pub fn new(store: Arc<dyn ContentStore>) -> Self {
        Self {
            store,
            automation: None,
            retry: RetryPolicy::default(),
            poll_interval: None,
            processing: AtomicBool::new(false),
            state: Mutex::new(SchedulerState::default()),
        }
    }

    pub fn with_automation(mut self, automation: Arc<AutomationEngine>) -> Self {
        self.automation = Some(automation);
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Interval of whatever drives the scheduler, used to report `nextRun`.
    pub fn with_poll_interval(mut self, seconds: u64) -> Self {
        self.poll_interval = i64::try_from(seconds).ok().map(chrono::Duration::seconds);
        self
    }

    pub fn store_name(&self) -> &str {
        self.store.store_name()
    }

    pub fn is_processing(&self) -> bool {
        self.processing.load(Ordering::Acquire)
    }

    fn state(&self) -> MutexGuard<'_, SchedulerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Posts whose schedule has passed, oldest due first.
    pub async fn get_scheduled_blog_posts(&self) -> ScheduledPostsResult {
        let now = Utc::now();
        match self.store.fetch_ready_posts(now).await {
            Ok(mut posts) => {
                posts.retain(|post| post.is_ready(now));
                posts.sort_by_key(|post| post.scheduled_at);
                ScheduledPostsResult { posts, error: None }
            }
            Err(err) => {
                tracing::error!("Failed to fetch scheduled blog posts: {}", err);
                ScheduledPostsResult {
                    posts: Vec::new(),
                    error: Some(format!("Failed to fetch scheduled blog posts: {}", err)),
                }
            }
        }
    }

    /// Single publish attempt, no retries.
    pub async fn publish_blog_post(&self, post: &ScheduledPost) -> bool {
        match self.store.publish(post, Utc::now()).await {
            Ok(()) => {
                tracing::info!(post_id = %post.id, title = %post.title, "Published blog post");
                true
            }
            Err(err) => {
                tracing::error!(post_id = %post.id, "Failed to publish blog post: {}", err);
                false
            }
        }
    }

    async fn publish_with_retry(
        &self,
        post: &ScheduledPost,
    ) -> Result<DateTime<Utc>, StoreError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let published_at = Utc::now();
            match self.store.publish(post, published_at).await {
                Ok(()) => {
                    tracing::info!(post_id = %post.id, attempt, "Published blog post");
                    return Ok(published_at);
                }
                Err(err) if err.is_retryable() && self.retry.should_retry(attempt) => {
                    let delay = self.retry.delay_for(attempt);
                    tracing::warn!(
                        post_id = %post.id,
                        attempt,
                        max_attempts = self.retry.max_attempts,
                        "Publish failed, retrying in {:?}: {}",
                        delay,
                        err
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(err) => {
                    tracing::error!(post_id = %post.id, attempt, "Giving up on blog post: {}", err);
                    return Err(err);
                }
            }
        }
    }

    /// Publish every due post once, in ascending `scheduledAt` order.
    pub async fn process_scheduled_blog_posts(&self) -> ProcessingResult {
        // Set before the first await so concurrent callers see it.
        let Some(_guard) = ProcessingGuard::acquire(&self.processing) else {
            tracing::warn!("Scheduled blog processing requested while a run is in progress");
            return ProcessingResult::already_in_progress();
        };

        let started_at = Utc::now();
        {
            let mut state = self.state();
            state.run_started_at = Some(started_at);
            state.queue.clear();
        }

        let mut result = ProcessingResult::default();
        let fetched = self.get_scheduled_blog_posts().await;
        if let Some(error) = fetched.error {
            result.errors.push(error);
        }

        {
            let mut state = self.state();
            state
                .queue
                .extend(fetched.posts.into_iter().map(QueueItem::blog));
            if !state.queue.is_empty() {
                tracing::info!(count = state.queue.len(), "Processing scheduled blog posts");
            }
        }

        while let Some(item) = self.next_queued() {
            let post = item.post;
            result.processed += 1;

            match self.publish_with_retry(&post).await {
                Ok(published_at) => {
                    result.successful += 1;
                    result.published_posts.push(post.id.clone());

                    if let Some(automation) = &self.automation {
                        let published = ScheduledPost {
                            status: PostStatus::Published,
                            published_at: Some(published_at),
                            scheduled_at: None,
                            ..post
                        };
                        let outcome = automation
                            .process_blog_published_with_automation(&published)
                            .await;
                        if !outcome.success {
                            result.automation_failures += 1;
                            result.errors.extend(outcome.errors.into_iter().map(|err| {
                                format!("Automation for blog post {}: {}", published.id, err)
                            }));
                        }
                    }
                }
                Err(err) => {
                    result.failed += 1;
                    result
                        .errors
                        .push(format!("Failed to process blog post {}: {}", post.id, err));
                }
            }
        }

        let finished_at = Utc::now();
        {
            let mut state = self.state();
            state.queue.clear();
            state.run_started_at = None;
            state.last_run = Some(finished_at);
            state.runs += 1;
            for error in &result.errors {
                state.record_error(error.clone());
            }
            state.last_result = Some(result.clone());
        }

        tracing::info!(
            processed = result.processed,
            successful = result.successful,
            failed = result.failed,
            duration_ms = (finished_at - started_at).num_milliseconds(),
            "Scheduled blog processing finished"
        );
        result
    }

    fn next_queued(&self) -> Option<QueueItem> {
        self.state().queue.pop_front()
    }

    pub async fn schedule_blog_post(&self, id: &str, when: DateTime<Utc>) -> bool {
        match self.store.schedule(id, when).await {
            Ok(()) => {
                tracing::info!(post_id = id, scheduled_at = %when, "Scheduled blog post");
                true
            }
            Err(err) => {
                tracing::error!(post_id = id, "Failed to schedule blog post: {}", err);
                self.state()
                    .record_error(format!("Failed to schedule blog post {}: {}", id, err));
                false
            }
        }
    }

    pub async fn unschedule_blog_post(&self, id: &str) -> bool {
        match self.store.unschedule(id).await {
            Ok(()) => {
                tracing::info!(post_id = id, "Unscheduled blog post");
                true
            }
            Err(err) => {
                tracing::error!(post_id = id, "Failed to unschedule blog post: {}", err);
                self.state()
                    .record_error(format!("Failed to unschedule blog post {}: {}", id, err));
                false
            }
        }
    }

    /// Publish a post immediately regardless of its schedule, then run
    /// automation for it.
    pub async fn publish_now(&self, id: &str) -> ManualPublishResult {
        let mut result = ManualPublishResult {
            post_id: id.to_string(),
            ..ManualPublishResult::default()
        };

        let post = match self.store.fetch_post(id).await {
            Ok(post) => post,
            Err(err) => {
                tracing::error!(post_id = id, "Manual publish failed to load post: {}", err);
                result.errors.push(format!("Failed to load blog post {}: {}", id, err));
                return result;
            }
        };

        let published_at = match self.publish_with_retry(&post).await {
            Ok(at) => at,
            Err(err) => {
                result
                    .errors
                    .push(format!("Failed to process blog post {}: {}", id, err));
                return result;
            }
        };
        result.success = true;

        if let Some(automation) = &self.automation {
            let published = ScheduledPost {
                status: PostStatus::Published,
                published_at: Some(published_at),
                scheduled_at: None,
                ..post
            };
            let outcome = automation
                .process_blog_published_with_automation(&published)
                .await;
            result.errors.extend(outcome.errors.iter().cloned());
            result.automation = Some(outcome);
        }

        result
    }

    pub async fn get_blog_scheduling_stats(&self) -> BlogSchedulingStats {
        let now = Utc::now();
        let (scheduled, ready) =
            tokio::join!(self.store.count_scheduled(), self.store.count_ready(now));

        let mut stats = BlogSchedulingStats::default();
        match scheduled {
            Ok(count) => stats.total_scheduled = count,
            Err(err) => {
                tracing::error!("Failed to count scheduled blog posts: {}", err);
                stats
                    .errors
                    .push(format!("Failed to count scheduled blog posts: {}", err));
            }
        }
        match ready {
            Ok(count) => stats.ready_to_process = count,
            Err(err) => {
                tracing::error!("Failed to count ready blog posts: {}", err);
                stats
                    .errors
                    .push(format!("Failed to count ready blog posts: {}", err));
            }
        }

        let state = self.state();
        stats.processing = state.queue.len();
        stats.failed = state.last_result.as_ref().map_or(0, |r| r.failed);
        if let Some(last) = &state.last_result {
            stats.errors.extend(last.errors.iter().cloned());
        }
        stats.last_run = state.last_run;
        stats.next_run = self.next_run(state.last_run);
        stats
    }

    fn next_run(&self, last_run: Option<DateTime<Utc>>) -> Option<DateTime<Utc>> {
        Some(last_run? + self.poll_interval?)
    }

    pub async fn health_check(&self) -> SchedulerHealth {
        match self.store.ping().await {
            Ok(()) => SchedulerHealth {
                healthy: true,
                services: SchedulerServices {
                    external_store: true,
                },
                errors: Vec::new(),
            },
            Err(err) => {
                tracing::warn!(store = self.store.store_name(), "Content store health check failed: {}", err);
                SchedulerHealth {
                    healthy: false,
                    services: SchedulerServices {
                        external_store: false,
                    },
                    errors: vec![format!("Content store unreachable: {}", err)],
                }
            }
        }
    }

    pub fn runtime_snapshot(&self) -> RuntimeSnapshot {
        let state = self.state();
        RuntimeSnapshot {
            processing: self.is_processing(),
            queue_size: state.queue.len(),
            run_started_at: state.run_started_at,
            last_run: state.last_run,
            next_run: self.next_run(state.last_run),
            last_result: state.last_result.clone(),
            recent_errors: state.recent_errors.iter().cloned().collect(),
            runs: state.runs,
        }
    }
}
