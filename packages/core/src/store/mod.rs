//! Content store abstraction.
//!
//! Blog posts live in a hosted document store (Sanity). The scheduler only
//! ever talks to it through [`ContentStore`], so tests can swap in
//! `services::mock::MockContentStore` and production uses
//! [`crate::services::sanity::SanityClient`].

pub mod error;
pub mod types;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

pub use error::StoreError;
pub use types::{PostStatus, ScheduledPost};

/// Result type for content store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Operations the scheduler needs from the external document store.
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Posts whose `scheduledAt` is set and `<= now`, not yet published.
    async fn fetch_ready_posts(&self, now: DateTime<Utc>) -> StoreResult<Vec<ScheduledPost>>;

    /// A single post by document id.
    async fn fetch_post(&self, id: &str) -> StoreResult<ScheduledPost>;

    /// Number of posts carrying a `scheduledAt` value.
    async fn count_scheduled(&self) -> StoreResult<u64>;

    /// Number of scheduled posts that are due at `now`.
    async fn count_ready(&self, now: DateTime<Utc>) -> StoreResult<u64>;

    /// Mark the post as published and clear its schedule in one update.
    async fn publish(&self, post: &ScheduledPost, published_at: DateTime<Utc>) -> StoreResult<()>;

    async fn schedule(&self, id: &str, when: DateTime<Utc>) -> StoreResult<()>;

    async fn unschedule(&self, id: &str) -> StoreResult<()>;

    /// Cheap read used by health checks.
    async fn ping(&self) -> StoreResult<()>;

    /// Name of the backing service for logging.
    fn store_name(&self) -> &str;
}
