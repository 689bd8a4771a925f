//! In-memory implementations of the external collaborators.
//!
//! Used by unit and integration tests in place of Sanity, Ayrshare, the
//! analytics table and Brevo. Each fake records its calls and can be told
//! to fail.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tokio::sync::Notify;

use crate::automation::{
    AnalyticsEvent, AnalyticsTracker, IntegrationError, PlatformFailure, SocialBatch,
    SocialContentGenerator, SocialContentRequest, SocialPlatform, SocialPolicy, SocialPost,
};
use crate::newsletter::{EmailProvider, NewsletterContact};
use crate::store::{ContentStore, PostStatus, ScheduledPost, StoreError, StoreResult};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// How a post's publish calls should fail.
#[derive(Debug, Clone)]
enum PublishFailure {
    /// Fail the next `n` calls, then succeed.
    Times(usize, StoreError),
    Always(StoreError),
}

/// In-memory content store.
#[derive(Default)]
pub struct MockContentStore {
    posts: Mutex<Vec<ScheduledPost>>,
    fetch_error: Mutex<Option<StoreError>>,
    count_error: Mutex<Option<StoreError>>,
    publish_failures: Mutex<HashMap<String, PublishFailure>>,
    fetch_gate: Mutex<Option<Arc<Notify>>>,
    fetch_calls: AtomicUsize,
    publish_calls: AtomicUsize,
}

impl MockContentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_posts(self, posts: Vec<ScheduledPost>) -> Self {
        *lock(&self.posts) = posts;
        self
    }

    pub fn with_fetch_error(self, error: StoreError) -> Self {
        *lock(&self.fetch_error) = Some(error);
        self
    }

    pub fn with_count_error(self, error: StoreError) -> Self {
        *lock(&self.count_error) = Some(error);
        self
    }

    /// Make the next `times` publish calls for `id` fail.
    pub fn failing_publish(self, id: &str, times: usize, error: StoreError) -> Self {
        lock(&self.publish_failures)
            .insert(id.to_string(), PublishFailure::Times(times, error));
        self
    }

    pub fn always_failing_publish(self, id: &str, error: StoreError) -> Self {
        lock(&self.publish_failures).insert(id.to_string(), PublishFailure::Always(error));
        self
    }

    /// Hold every `fetch_ready_posts` call until `gate` is notified.
    pub fn with_fetch_gate(self, gate: Arc<Notify>) -> Self {
        *lock(&self.fetch_gate) = Some(gate);
        self
    }

    pub fn fetch_calls(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }

    pub fn publish_calls(&self) -> usize {
        self.publish_calls.load(Ordering::SeqCst)
    }

    pub fn post(&self, id: &str) -> Option<ScheduledPost> {
        lock(&self.posts).iter().find(|p| p.id == id).cloned()
    }

    /// A post scheduled `offset` from now, e.g. `Duration::hours(-1)` for
    /// one that became due an hour ago.
    pub fn scheduled_post(id: &str, offset: Duration) -> ScheduledPost {
        ScheduledPost {
            id: id.to_string(),
            revision: Some(format!("{}-rev1", id)),
            title: format!("Post {}", id),
            slug: Some(id.to_lowercase()),
            scheduled_at: Some(Utc::now() + offset),
            published_at: None,
            status: PostStatus::Scheduled,
            excerpt: Some(format!("Excerpt for {}", id)),
            categories: vec!["News".to_string()],
            body: Some(serde_json::json!([
                { "_type": "block", "children": [{ "_type": "span", "text": format!("Body of {}", id) }] }
            ])),
        }
    }

    fn check_publish_failure(&self, id: &str) -> StoreResult<()> {
        let mut failures = lock(&self.publish_failures);
        match failures.get_mut(id) {
            Some(PublishFailure::Always(err)) => Err(err.clone()),
            Some(PublishFailure::Times(remaining, err)) if *remaining > 0 => {
                *remaining -= 1;
                Err(err.clone())
            }
            _ => Ok(()),
        }
    }

    fn update<F: FnOnce(&mut ScheduledPost)>(&self, id: &str, apply: F) -> StoreResult<()> {
        let mut posts = lock(&self.posts);
        let post = posts
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or_else(|| StoreError::NotFound { id: id.to_string() })?;
        apply(post);
        Ok(())
    }
}

#[async_trait]
impl ContentStore for MockContentStore {
    async fn fetch_ready_posts(&self, now: DateTime<Utc>) -> StoreResult<Vec<ScheduledPost>> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);

        let gate = lock(&self.fetch_gate).clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }

        if let Some(err) = lock(&self.fetch_error).clone() {
            return Err(err);
        }

        let mut ready: Vec<ScheduledPost> = lock(&self.posts)
            .iter()
            .filter(|p| p.is_ready(now))
            .cloned()
            .collect();
        ready.sort_by_key(|p| p.scheduled_at);
        Ok(ready)
    }

    async fn fetch_post(&self, id: &str) -> StoreResult<ScheduledPost> {
        self.post(id)
            .ok_or_else(|| StoreError::NotFound { id: id.to_string() })
    }

    async fn count_scheduled(&self) -> StoreResult<u64> {
        if let Some(err) = lock(&self.count_error).clone() {
            return Err(err);
        }
        Ok(lock(&self.posts)
            .iter()
            .filter(|p| p.scheduled_at.is_some() && p.status != PostStatus::Published)
            .count() as u64)
    }

    async fn count_ready(&self, now: DateTime<Utc>) -> StoreResult<u64> {
        if let Some(err) = lock(&self.count_error).clone() {
            return Err(err);
        }
        Ok(lock(&self.posts).iter().filter(|p| p.is_ready(now)).count() as u64)
    }

    async fn publish(&self, post: &ScheduledPost, published_at: DateTime<Utc>) -> StoreResult<()> {
        self.publish_calls.fetch_add(1, Ordering::SeqCst);
        self.check_publish_failure(&post.id)?;
        self.update(&post.id, |stored| {
            stored.status = PostStatus::Published;
            stored.published_at = Some(published_at);
            stored.scheduled_at = None;
        })
    }

    async fn schedule(&self, id: &str, when: DateTime<Utc>) -> StoreResult<()> {
        self.update(id, |stored| {
            stored.scheduled_at = Some(when);
            stored.status = PostStatus::Scheduled;
        })
    }

    async fn unschedule(&self, id: &str) -> StoreResult<()> {
        self.update(id, |stored| {
            stored.scheduled_at = None;
            stored.status = PostStatus::Draft;
        })
    }

    async fn ping(&self) -> StoreResult<()> {
        match lock(&self.fetch_error).clone() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn store_name(&self) -> &str {
        "mock"
    }
}

/// Social generator that returns one post per requested platform.
#[derive(Default)]
pub struct MockSocialGenerator {
    error: Option<String>,
    platform_errors: Vec<(SocialPlatform, String)>,
    requests: Mutex<Vec<SocialContentRequest>>,
}

impl MockSocialGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_error(mut self, message: &str) -> Self {
        self.error = Some(message.to_string());
        self
    }

    /// Fail only `platform`; the other platforms are still scheduled.
    pub fn with_platform_error(mut self, platform: SocialPlatform, message: &str) -> Self {
        self.platform_errors.push((platform, message.to_string()));
        self
    }

    pub fn requests(&self) -> Vec<SocialContentRequest> {
        lock(&self.requests).clone()
    }
}

#[async_trait]
impl SocialContentGenerator for MockSocialGenerator {
    async fn generate_and_schedule(
        &self,
        request: &SocialContentRequest,
        policy: &SocialPolicy,
    ) -> Result<SocialBatch, IntegrationError> {
        lock(&self.requests).push(request.clone());
        if let Some(message) = &self.error {
            return Err(IntegrationError::rejected(message.clone()));
        }

        let scheduled_for = policy
            .auto_schedule
            .then(|| request.published_at + Duration::minutes(policy.schedule_delay_minutes));
        let mut batch = SocialBatch::default();
        for platform in &policy.platforms {
            match self.platform_errors.iter().find(|(p, _)| p == platform) {
                Some((_, message)) => batch.failures.push(PlatformFailure {
                    platform: *platform,
                    error: IntegrationError::rejected(message.clone()),
                }),
                None => batch.posts.push(SocialPost {
                    platform: *platform,
                    content: format!("{} ({})", request.title, platform.as_str()),
                    scheduled_for,
                    external_id: None,
                }),
            }
        }
        Ok(batch)
    }
}

#[derive(Default)]
pub struct MockAnalyticsTracker {
    error: Option<String>,
    events: Mutex<Vec<AnalyticsEvent>>,
}

impl MockAnalyticsTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_error(mut self, message: &str) -> Self {
        self.error = Some(message.to_string());
        self
    }

    pub fn events(&self) -> Vec<AnalyticsEvent> {
        lock(&self.events).clone()
    }
}

#[async_trait]
impl AnalyticsTracker for MockAnalyticsTracker {
    async fn track(&self, event: &AnalyticsEvent) -> Result<(), IntegrationError> {
        if let Some(message) = &self.error {
            return Err(IntegrationError::rejected(message.clone()));
        }
        lock(&self.events).push(event.clone());
        Ok(())
    }
}

#[derive(Default)]
pub struct MockEmailProvider {
    error: Option<String>,
    contacts: Mutex<Vec<NewsletterContact>>,
}

impl MockEmailProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_error(mut self, message: &str) -> Self {
        self.error = Some(message.to_string());
        self
    }

    pub fn contacts(&self) -> Vec<NewsletterContact> {
        lock(&self.contacts).clone()
    }
}

#[async_trait]
impl EmailProvider for MockEmailProvider {
    async fn upsert_contact(&self, contact: &NewsletterContact) -> Result<(), IntegrationError> {
        if let Some(message) = &self.error {
            return Err(IntegrationError::rejected(message.clone()));
        }
        lock(&self.contacts).push(contact.clone());
        Ok(())
    }
}
