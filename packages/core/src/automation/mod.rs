//! Blog-published automation.
//!
//! When a post goes live (from the scheduler or a manual publish) the
//! [`AutomationEngine`] fans out to social-post generation and analytics
//! tracking. Both steps are best-effort and independent: one failing does
//! not stop or roll back the other, and every failure is reported in the
//! returned [`AutomationResult`] instead of being raised.

pub mod text;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::store::ScheduledPost;

pub use text::extract_plain_text;

/// Errors from downstream integrations (social, analytics, email).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IntegrationError {
    #[error("Network error: {message}")]
    Network { message: String },

    #[error("{provider} returned HTTP {status}: {body}")]
    Http {
        provider: String,
        status: u16,
        body: String,
    },

    #[error("Storage error: {message}")]
    Storage { message: String },

    #[error("{message}")]
    Rejected { message: String },
}

impl IntegrationError {
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
        }
    }

    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }

    pub fn rejected(message: impl Into<String>) -> Self {
        Self::Rejected {
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SocialPlatform {
    Linkedin,
    Twitter,
}

impl SocialPlatform {
    pub fn as_str(&self) -> &'static str {
        match self {
            SocialPlatform::Linkedin => "linkedin",
            SocialPlatform::Twitter => "twitter",
        }
    }
}

/// Post content handed to the social generator.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SocialContentRequest {
    pub post_id: String,
    pub title: String,
    pub slug: Option<String>,
    pub content: String,
    pub excerpt: Option<String>,
    pub categories: Vec<String>,
    pub published_at: DateTime<Utc>,
}

/// How generated posts are scheduled.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SocialPolicy {
    pub platforms: Vec<SocialPlatform>,
    pub auto_schedule: bool,
    pub schedule_delay_minutes: i64,
}

impl Default for SocialPolicy {
    fn default() -> Self {
        Self {
            platforms: vec![SocialPlatform::Linkedin, SocialPlatform::Twitter],
            auto_schedule: true,
            schedule_delay_minutes: 30,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SocialPost {
    pub platform: SocialPlatform,
    pub content: String,
    pub scheduled_for: Option<DateTime<Utc>>,
    pub external_id: Option<String>,
}

/// Engagement counters recorded for a post.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsEvent {
    pub post_id: String,
    pub views: i64,
    pub likes: i64,
    pub shares: i64,
    pub comments: i64,
}

impl AnalyticsEvent {
    /// Baseline counts recorded when a post is first published.
    pub fn published(post_id: &str) -> Self {
        Self {
            post_id: post_id.to_string(),
            views: 1,
            likes: 0,
            shares: 0,
            comments: 0,
        }
    }
}

/// A platform that could not be scheduled while others were.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatformFailure {
    pub platform: SocialPlatform,
    pub error: IntegrationError,
}

/// Posts that were scheduled, alongside the platforms that failed. Posts
/// already accepted by the provider are live and are never dropped.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SocialBatch {
    pub posts: Vec<SocialPost>,
    pub failures: Vec<PlatformFailure>,
}

#[async_trait]
pub trait SocialContentGenerator: Send + Sync {
    /// Generate per-platform copy for the post and schedule it. `Err` means
    /// nothing was scheduled.
    async fn generate_and_schedule(
        &self,
        request: &SocialContentRequest,
        policy: &SocialPolicy,
    ) -> Result<SocialBatch, IntegrationError>;
}

#[async_trait]
pub trait AnalyticsTracker: Send + Sync {
    async fn track(&self, event: &AnalyticsEvent) -> Result<(), IntegrationError>;
}

/// Outcome of one blog-published reaction.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AutomationResult {
    pub success: bool,
    pub social_posts: Vec<SocialPost>,
    pub analytics_tracked: bool,
    pub errors: Vec<String>,
}

/// Fans a published post out to the configured collaborators.
pub struct AutomationEngine {
    social: Option<Arc<dyn SocialContentGenerator>>,
    analytics: Arc<dyn AnalyticsTracker>,
    policy: SocialPolicy,
}

impl AutomationEngine {
    /// `social` is `None` when no social provider is configured; the social
    /// step is then skipped rather than reported as a failure.
    pub fn new(
        social: Option<Arc<dyn SocialContentGenerator>>,
        analytics: Arc<dyn AnalyticsTracker>,
    ) -> Self {
        Self {
            social,
            analytics,
            policy: SocialPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: SocialPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn policy(&self) -> &SocialPolicy {
        &self.policy
    }

    pub async fn process_blog_published_with_automation(
        &self,
        post: &ScheduledPost,
    ) -> AutomationResult {
        let request = SocialContentRequest {
            post_id: post.id.clone(),
            title: post.title.clone(),
            slug: post.slug.clone(),
            content: extract_plain_text(post.body.as_ref()),
            excerpt: post.excerpt.clone(),
            categories: post.categories.clone(),
            published_at: post.published_at.unwrap_or_else(Utc::now),
        };
        let event = AnalyticsEvent::published(&post.id);

        let (social, analytics) =
            tokio::join!(self.run_social(&request), self.analytics.track(&event));

        let mut result = AutomationResult::default();

        match social {
            Ok(batch) => {
                for failure in &batch.failures {
                    tracing::warn!(
                        post_id = %post.id,
                        platform = failure.platform.as_str(),
                        "Social media generation failed: {}",
                        failure.error
                    );
                    result.errors.push(format!(
                        "Social media generation failed for {}: {}",
                        failure.platform.as_str(),
                        failure.error
                    ));
                }
                result.social_posts = batch.posts;
            }
            Err(err) => {
                tracing::warn!(post_id = %post.id, "Social media generation failed: {}", err);
                result
                    .errors
                    .push(format!("Social media generation failed: {}", err));
            }
        }

        match analytics {
            Ok(()) => result.analytics_tracked = true,
            Err(err) => {
                tracing::warn!(post_id = %post.id, "Analytics tracking failed: {}", err);
                result
                    .errors
                    .push(format!("Analytics tracking failed: {}", err));
            }
        }

        result.success = result.errors.is_empty();
        tracing::info!(
            post_id = %post.id,
            social_posts = result.social_posts.len(),
            analytics_tracked = result.analytics_tracked,
            success = result.success,
            "Blog published automation finished"
        );
        result
    }

    async fn run_social(
        &self,
        request: &SocialContentRequest,
    ) -> Result<SocialBatch, IntegrationError> {
        match &self.social {
            Some(generator) => generator.generate_and_schedule(request, &self.policy).await,
            None => {
                tracing::debug!(post_id = %request.post_id, "No social generator configured; skipping");
                Ok(SocialBatch::default())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::mock::{MockAnalyticsTracker, MockSocialGenerator};
    use crate::store::PostStatus;
    use serde_json::json;

    fn published_post() -> ScheduledPost {
        ScheduledPost {
            id: "post-1".into(),
            revision: None,
            title: "Shipping faster".into(),
            slug: Some("shipping-faster".into()),
            scheduled_at: None,
            published_at: Some(Utc::now()),
            status: PostStatus::Published,
            excerpt: Some("How we cut lead time".into()),
            categories: vec!["Engineering".into()],
            body: Some(json!([
                { "_type": "block", "children": [{ "text": "First." }] },
                { "_type": "block", "children": [{ "text": "Second." }] }
            ])),
        }
    }

    #[tokio::test]
    async fn both_steps_succeed() {
        let social = Arc::new(MockSocialGenerator::new());
        let analytics = Arc::new(MockAnalyticsTracker::new());
        let engine = AutomationEngine::new(Some(social.clone()), analytics.clone());

        let result = engine
            .process_blog_published_with_automation(&published_post())
            .await;

        assert!(result.success);
        assert!(result.analytics_tracked);
        assert_eq!(result.social_posts.len(), 2);
        assert!(result.errors.is_empty());

        let requests = social.requests();
        assert_eq!(requests[0].content, "First.\n\nSecond.");
        assert_eq!(requests[0].categories, vec!["Engineering".to_string()]);
        assert_eq!(analytics.events(), vec![AnalyticsEvent::published("post-1")]);
    }

    #[tokio::test]
    async fn social_failure_does_not_block_analytics() {
        let social = Arc::new(MockSocialGenerator::new().with_error("quota exceeded"));
        let analytics = Arc::new(MockAnalyticsTracker::new());
        let engine = AutomationEngine::new(Some(social), analytics);

        let result = engine
            .process_blog_published_with_automation(&published_post())
            .await;

        assert_eq!(
            result,
            AutomationResult {
                success: false,
                social_posts: Vec::new(),
                analytics_tracked: true,
                errors: vec!["Social media generation failed: quota exceeded".to_string()],
            }
        );
    }

    #[tokio::test]
    async fn analytics_failure_keeps_social_posts() {
        let social = Arc::new(MockSocialGenerator::new());
        let analytics = Arc::new(MockAnalyticsTracker::new().with_error("db locked"));
        let engine = AutomationEngine::new(Some(social), analytics);

        let result = engine
            .process_blog_published_with_automation(&published_post())
            .await;

        assert!(!result.success);
        assert!(!result.analytics_tracked);
        assert_eq!(result.social_posts.len(), 2);
        assert_eq!(
            result.errors,
            vec!["Analytics tracking failed: db locked".to_string()]
        );
    }

    #[tokio::test]
    async fn partial_social_failure_keeps_scheduled_posts() {
        let social = Arc::new(
            MockSocialGenerator::new().with_platform_error(SocialPlatform::Twitter, "rate limited"),
        );
        let analytics = Arc::new(MockAnalyticsTracker::new());
        let engine = AutomationEngine::new(Some(social), analytics);

        let result = engine
            .process_blog_published_with_automation(&published_post())
            .await;

        assert!(!result.success);
        assert!(result.analytics_tracked);
        assert_eq!(result.social_posts.len(), 1);
        assert_eq!(result.social_posts[0].platform, SocialPlatform::Linkedin);
        assert_eq!(
            result.errors,
            vec!["Social media generation failed for twitter: rate limited".to_string()]
        );
    }

    #[tokio::test]
    async fn unconfigured_social_step_is_skipped() {
        let analytics = Arc::new(MockAnalyticsTracker::new());
        let engine = AutomationEngine::new(None, analytics);

        let result = engine
            .process_blog_published_with_automation(&published_post())
            .await;

        assert!(result.success);
        assert!(result.social_posts.is_empty());
    }

    #[test]
    fn default_policy_targets_linkedin_and_twitter_with_delay() {
        let policy = SocialPolicy::default();
        assert_eq!(
            policy.platforms,
            vec![SocialPlatform::Linkedin, SocialPlatform::Twitter]
        );
        assert!(policy.auto_schedule);
        assert_eq!(policy.schedule_delay_minutes, 30);
    }
}
