//! Blog post documents as stored in the CMS

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Publication state recorded on the document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PostStatus {
    #[default]
    Draft,
    Scheduled,
    Published,
}

/// A blog post as projected by the scheduler's queries.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduledPost {
    #[serde(rename = "_id")]
    pub id: String,
    /// Document revision, used to guard the publish patch.
    #[serde(rename = "_rev", default, skip_serializing_if = "Option::is_none")]
    pub revision: Option<String>,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(default)]
    pub scheduled_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub published_at: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "status_or_default")]
    pub status: PostStatus,
    #[serde(default)]
    pub excerpt: Option<String>,
    #[serde(default, deserialize_with = "categories_or_empty")]
    pub categories: Vec<String>,
    /// Portable-text body, kept as raw JSON.
    #[serde(default)]
    pub body: Option<Value>,
}

impl ScheduledPost {
    /// Due for publishing: has a schedule at or before `now` and is not
    /// already published.
    pub fn is_ready(&self, now: DateTime<Utc>) -> bool {
        self.status != PostStatus::Published
            && self.scheduled_at.is_some_and(|at| at <= now)
    }
}

// GROQ projections return `null` for missing fields, which serde's
// `default` does not cover.
fn status_or_default<'de, D>(deserializer: D) -> Result<PostStatus, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<PostStatus>::deserialize(deserializer)?.unwrap_or_default())
}

fn categories_or_empty<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = Option::<Vec<Option<String>>>::deserialize(deserializer)?;
    Ok(raw.unwrap_or_default().into_iter().flatten().collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use serde_json::json;

    fn post(status: PostStatus, scheduled_at: Option<DateTime<Utc>>) -> ScheduledPost {
        ScheduledPost {
            id: "post-1".into(),
            revision: None,
            title: "Hello".into(),
            slug: None,
            scheduled_at,
            published_at: None,
            status,
            excerpt: None,
            categories: Vec::new(),
            body: None,
        }
    }

    #[test]
    fn past_schedule_is_ready() {
        let now = Utc::now();
        assert!(post(PostStatus::Scheduled, Some(now - Duration::hours(1))).is_ready(now));
        assert!(post(PostStatus::Scheduled, Some(now)).is_ready(now));
    }

    #[test]
    fn future_missing_or_published_is_not_ready() {
        let now = Utc::now();
        assert!(!post(PostStatus::Scheduled, Some(now + Duration::hours(1))).is_ready(now));
        assert!(!post(PostStatus::Draft, None).is_ready(now));
        assert!(!post(PostStatus::Published, Some(now - Duration::hours(1))).is_ready(now));
    }

    #[test]
    fn deserializes_groq_projection_with_nulls() {
        let doc = json!({
            "_id": "abc",
            "_rev": "rev1",
            "title": "Launch notes",
            "slug": "launch-notes",
            "scheduledAt": "2024-05-01T09:00:00Z",
            "publishedAt": null,
            "status": null,
            "excerpt": null,
            "categories": ["Product", null],
            "body": [{ "_type": "block", "children": [{ "text": "Hi" }] }]
        });
        let post: ScheduledPost = serde_json::from_value(doc).unwrap();
        assert_eq!(post.id, "abc");
        assert_eq!(post.revision.as_deref(), Some("rev1"));
        assert_eq!(post.status, PostStatus::Draft);
        assert_eq!(post.categories, vec!["Product".to_string()]);
        assert!(post.scheduled_at.is_some());
    }
}
