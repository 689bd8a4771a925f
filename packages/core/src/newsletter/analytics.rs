use async_trait::async_trait;
use chrono::Utc;
use sqlx::{Row, SqlitePool};

use crate::automation::{AnalyticsEvent, AnalyticsTracker, IntegrationError};

/// Records post engagement in the `blog_analytics` table. Counts are added
/// to whatever is already stored for the post.
pub struct SqlAnalyticsTracker {
    pool: SqlitePool,
}

impl SqlAnalyticsTracker {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn totals(&self, post_id: &str) -> Result<Option<AnalyticsEvent>, sqlx::Error> {
        let row = sqlx::query(
            "SELECT post_id, views, likes, shares, comments FROM blog_analytics WHERE post_id = ?",
        )
        .bind(post_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| -> Result<AnalyticsEvent, sqlx::Error> {
            Ok(AnalyticsEvent {
                post_id: row.try_get("post_id")?,
                views: row.try_get("views")?,
                likes: row.try_get("likes")?,
                shares: row.try_get("shares")?,
                comments: row.try_get("comments")?,
            })
        })
        .transpose()
    }
}

#[async_trait]
impl AnalyticsTracker for SqlAnalyticsTracker {
    async fn track(&self, event: &AnalyticsEvent) -> Result<(), IntegrationError> {
        sqlx::query(
            "INSERT INTO blog_analytics (post_id, views, likes, shares, comments, updated_at)
             VALUES (?, ?, ?, ?, ?, ?)
             ON CONFLICT(post_id) DO UPDATE SET
                views = views + excluded.views,
                likes = likes + excluded.likes,
                shares = shares + excluded.shares,
                comments = comments + excluded.comments,
                updated_at = excluded.updated_at",
        )
        .bind(&event.post_id)
        .bind(event.views)
        .bind(event.likes)
        .bind(event.shares)
        .bind(event.comments)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|err| IntegrationError::storage(err.to_string()))?;

        Ok(())
    }
}
