//! SQLite persistence for newsletter subscribers.
//!
//! Timestamps are stored as RFC 3339 strings. Emails are expected to be
//! normalised (trimmed, lower-cased) before they reach this layer.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriberStatus {
    Active,
    Unsubscribed,
}

impl SubscriberStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriberStatus::Active => "active",
            SubscriberStatus::Unsubscribed => "unsubscribed",
        }
    }

    fn parse(raw: &str) -> Self {
        match raw {
            "unsubscribed" => SubscriberStatus::Unsubscribed,
            _ => SubscriberStatus::Active,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Subscriber {
    pub id: i64,
    pub email: String,
    pub first_name: Option<String>,
    pub source: Option<String>,
    pub status: SubscriberStatus,
    pub subscribed_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriberCounts {
    pub total: i64,
    pub active: i64,
    pub unsubscribed: i64,
}

const COLUMNS: &str = "id, email, first_name, source, status, subscribed_at, updated_at";

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|ts| ts.with_timezone(&Utc))
}

fn subscriber_from_row(row: &SqliteRow) -> Result<Subscriber, sqlx::Error> {
    let status: String = row.try_get("status")?;
    let subscribed_at: String = row.try_get("subscribed_at")?;
    let updated_at: String = row.try_get("updated_at")?;

    let decode = |column: &str, raw: &str| {
        parse_timestamp(raw).ok_or_else(|| sqlx::Error::ColumnDecode {
            index: column.to_string(),
            source: format!("invalid timestamp: {}", raw).into(),
        })
    };

    Ok(Subscriber {
        id: row.try_get("id")?,
        email: row.try_get("email")?,
        first_name: row.try_get("first_name")?,
        source: row.try_get("source")?,
        status: SubscriberStatus::parse(&status),
        subscribed_at: decode("subscribed_at", &subscribed_at)?,
        updated_at: decode("updated_at", &updated_at)?,
    })
}

#[derive(Clone)]
pub struct SubscriberRepository {
    pool: SqlitePool,
}

impl SubscriberRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn find_by_email(&self, email: &str) -> Result<Option<Subscriber>, sqlx::Error> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM newsletter_subscribers WHERE email = ?",
            COLUMNS
        ))
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(subscriber_from_row).transpose()
    }

    /// Insert an active subscriber. Fails with a unique violation if the
    /// email already exists.
    pub async fn insert(
        &self,
        email: &str,
        first_name: Option<&str>,
        source: Option<&str>,
    ) -> Result<Subscriber, sqlx::Error> {
        let now = Utc::now().to_rfc3339();

        let row = sqlx::query(&format!(
            "INSERT INTO newsletter_subscribers
             (email, first_name, source, status, subscribed_at, updated_at)
             VALUES (?, ?, ?, 'active', ?, ?)
             RETURNING {}",
            COLUMNS
        ))
        .bind(email)
        .bind(first_name)
        .bind(source)
        .bind(&now)
        .bind(&now)
        .fetch_one(&self.pool)
        .await?;

        subscriber_from_row(&row)
    }

    /// Flip an unsubscribed row back to active. A new first name replaces
    /// the stored one; `None` keeps it.
    pub async fn reactivate(
        &self,
        id: i64,
        first_name: Option<&str>,
    ) -> Result<Subscriber, sqlx::Error> {
        let now = Utc::now().to_rfc3339();

        let row = sqlx::query(&format!(
            "UPDATE newsletter_subscribers
             SET status = 'active',
                 first_name = COALESCE(?, first_name),
                 subscribed_at = ?,
                 updated_at = ?,
                 unsubscribed_at = NULL
             WHERE id = ?
             RETURNING {}",
            COLUMNS
        ))
        .bind(first_name)
        .bind(&now)
        .bind(&now)
        .bind(id)
        .fetch_one(&self.pool)
        .await?;

        subscriber_from_row(&row)
    }

    /// Returns `true` if an active subscriber was unsubscribed.
    pub async fn unsubscribe(&self, email: &str) -> Result<bool, sqlx::Error> {
        let now = Utc::now().to_rfc3339();

        let result = sqlx::query(
            "UPDATE newsletter_subscribers
             SET status = 'unsubscribed', updated_at = ?, unsubscribed_at = ?
             WHERE email = ? AND status = 'active'",
        )
        .bind(&now)
        .bind(&now)
        .bind(email)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn counts(&self) -> Result<SubscriberCounts, sqlx::Error> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS total,
                    COALESCE(SUM(CASE WHEN status = 'active' THEN 1 ELSE 0 END), 0) AS active,
                    COALESCE(SUM(CASE WHEN status = 'unsubscribed' THEN 1 ELSE 0 END), 0) AS unsubscribed
             FROM newsletter_subscribers",
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(SubscriberCounts {
            total: row.try_get("total")?,
            active: row.try_get("active")?,
            unsubscribed: row.try_get("unsubscribed")?,
        })
    }

    /// Subscriptions (new or reactivated) since `since`.
    pub async fn count_subscribed_since(&self, since: DateTime<Utc>) -> Result<i64, sqlx::Error> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS cnt FROM newsletter_subscribers
             WHERE status = 'active' AND subscribed_at >= ?",
        )
        .bind(since.to_rfc3339())
        .fetch_one(&self.pool)
        .await?;

        row.try_get("cnt")
    }
}
