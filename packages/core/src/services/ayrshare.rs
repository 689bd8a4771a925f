//! Social post generation and scheduling through Ayrshare.
//!
//! Copy is built from the post itself (title, excerpt or body text, link
//! and category hashtags), one post per platform, and handed to Ayrshare's
//! `POST /api/post` with a `scheduleDate` when auto-scheduling is on.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;

use crate::automation::text::truncate_words;
use crate::automation::{
    IntegrationError, PlatformFailure, SocialBatch, SocialContentGenerator, SocialContentRequest,
    SocialPlatform, SocialPolicy, SocialPost,
};

pub const AYRSHARE_API_URL: &str = "https://app.ayrshare.com";

const TWITTER_MAX_CHARS: usize = 280;
const SUMMARY_MAX_CHARS: usize = 200;
const MAX_HASHTAGS: usize = 3;

#[derive(Clone)]
pub struct AyrshareClient {
    base_url: String,
    api_key: String,
    site_url: String,
    http: Client,
}

#[derive(Debug, Deserialize)]
struct PostResponse {
    #[serde(default)]
    id: Option<String>,
}

impl AyrshareClient {
    /// `site_url` is the public site base used to link back to the post.
    pub fn new(base_url: &str, api_key: &str, site_url: &str) -> Result<Self, IntegrationError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .map_err(|err| IntegrationError::network(err.to_string()))?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            site_url: site_url.trim_end_matches('/').to_string(),
            http,
        })
    }

    fn post_url(&self, request: &SocialContentRequest) -> Option<String> {
        request
            .slug
            .as_ref()
            .map(|slug| format!("{}/blog/{}", self.site_url, slug))
    }

    fn copy_for(&self, platform: SocialPlatform, request: &SocialContentRequest) -> String {
        let url = self.post_url(request);
        match platform {
            SocialPlatform::Linkedin => linkedin_copy(request, url.as_deref()),
            SocialPlatform::Twitter => twitter_copy(request, url.as_deref()),
        }
    }

    async fn submit(
        &self,
        platform: SocialPlatform,
        content: &str,
        schedule_date: Option<DateTime<Utc>>,
    ) -> Result<Option<String>, IntegrationError> {
        let mut body = json!({
            "post": content,
            "platforms": [platform.as_str()],
        });
        if let Some(when) = schedule_date {
            body["scheduleDate"] = json!(when.to_rfc3339_opts(SecondsFormat::Secs, true));
        }

        let response = self
            .http
            .post(format!("{}/api/post", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|err| IntegrationError::network(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(IntegrationError::Http {
                provider: "Ayrshare".to_string(),
                status: status.as_u16(),
                body,
            });
        }

        let parsed = response
            .json::<PostResponse>()
            .await
            .map_err(|err| IntegrationError::rejected(format!("Unexpected Ayrshare response: {}", err)))?;
        Ok(parsed.id)
    }
}

fn summary(request: &SocialContentRequest) -> String {
    match request.excerpt.as_deref().map(str::trim) {
        Some(excerpt) if !excerpt.is_empty() => excerpt.to_string(),
        _ => truncate_words(request.content.trim(), SUMMARY_MAX_CHARS),
    }
}

fn hashtags(categories: &[String]) -> String {
    categories
        .iter()
        .map(|category| {
            category
                .chars()
                .filter(|c| c.is_alphanumeric())
                .collect::<String>()
        })
        .filter(|tag| !tag.is_empty())
        .take(MAX_HASHTAGS)
        .map(|tag| format!("#{}", tag))
        .collect::<Vec<_>>()
        .join(" ")
}

fn linkedin_copy(request: &SocialContentRequest, url: Option<&str>) -> String {
    let mut sections = vec![request.title.clone()];
    let summary = summary(request);
    if !summary.is_empty() {
        sections.push(summary);
    }
    if let Some(url) = url {
        sections.push(format!("Read more: {}", url));
    }
    let tags = hashtags(&request.categories);
    if !tags.is_empty() {
        sections.push(tags);
    }
    sections.join("\n\n")
}

/// Title and summary, shortened so the link and hashtags fit in a single
/// tweet. Hashtags are dropped first, then the link, when there is no room
/// left for any text.
fn twitter_copy(request: &SocialContentRequest, url: Option<&str>) -> String {
    let summary = summary(request);
    let head = if summary.is_empty() {
        request.title.clone()
    } else {
        format!("{}: {}", request.title, summary)
    };

    let tags = hashtags(&request.categories);
    let url = url.unwrap_or_default();
    let tails = [
        [url, tags.as_str()]
            .iter()
            .filter(|part| !part.is_empty())
            .copied()
            .collect::<Vec<_>>()
            .join(" "),
        url.to_string(),
    ];

    for tail in tails.iter().filter(|tail| !tail.is_empty()) {
        let reserved = tail.chars().count() + 1;
        if reserved < TWITTER_MAX_CHARS {
            let text = truncate_words(&head, TWITTER_MAX_CHARS - reserved);
            return if text.is_empty() {
                tail.clone()
            } else {
                format!("{} {}", text, tail)
            };
        }
    }
    truncate_words(&head, TWITTER_MAX_CHARS)
}

#[async_trait]
impl SocialContentGenerator for AyrshareClient {
    async fn generate_and_schedule(
        &self,
        request: &SocialContentRequest,
        policy: &SocialPolicy,
    ) -> Result<SocialBatch, IntegrationError> {
        let scheduled_for = policy
            .auto_schedule
            .then(|| request.published_at + chrono::Duration::minutes(policy.schedule_delay_minutes));

        let mut batch = SocialBatch::default();
        for platform in &policy.platforms {
            let content = self.copy_for(*platform, request);
            match self.submit(*platform, &content, scheduled_for).await {
                Ok(external_id) => {
                    tracing::info!(
                        post_id = %request.post_id,
                        platform = platform.as_str(),
                        "Scheduled social post"
                    );
                    batch.posts.push(SocialPost {
                        platform: *platform,
                        content,
                        scheduled_for,
                        external_id,
                    });
                }
                Err(error) => batch.failures.push(PlatformFailure {
                    platform: *platform,
                    error,
                }),
            }
        }

        // Nothing went out: report it as a single failure.
        if batch.posts.is_empty() {
            if let Some(first) = std::mem::take(&mut batch.failures).into_iter().next() {
                return Err(first.error);
            }
        }
        Ok(batch)
    }
}
