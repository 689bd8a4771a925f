use std::str::FromStr;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS newsletter_subscribers (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        email TEXT NOT NULL UNIQUE,
        first_name TEXT,
        source TEXT,
        status TEXT NOT NULL DEFAULT 'active',
        subscribed_at TEXT NOT NULL,
        updated_at TEXT NOT NULL,
        unsubscribed_at TEXT
    )",
    "CREATE INDEX IF NOT EXISTS idx_newsletter_subscribers_status
        ON newsletter_subscribers (status)",
    "CREATE TABLE IF NOT EXISTS blog_analytics (
        post_id TEXT PRIMARY KEY,
        views INTEGER NOT NULL DEFAULT 0,
        likes INTEGER NOT NULL DEFAULT 0,
        shares INTEGER NOT NULL DEFAULT 0,
        comments INTEGER NOT NULL DEFAULT 0,
        updated_at TEXT NOT NULL
    )",
];

/// Open a pool and make sure the schema exists.
///
/// In-memory databases are private to a connection, so `sqlite::memory:`
/// pools are limited to one connection.
pub async fn create_pool(database_url: &str) -> Result<SqlitePool, sqlx::Error> {
    let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
    let max_connections = if database_url.contains(":memory:") { 1 } else { 5 };

    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections)
        .connect_with(options)
        .await?;

    for statement in SCHEMA {
        sqlx::query(statement).execute(&pool).await?;
    }

    Ok(pool)
}

/// Cheap round-trip used by health checks.
pub async fn ping(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    sqlx::query("SELECT 1").execute(pool).await?;
    Ok(())
}
