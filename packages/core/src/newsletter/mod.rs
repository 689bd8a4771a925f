//! Newsletter subscriptions.
//!
//! Subscribers live in SQLite. New and reactivated subscribers are pushed
//! to the email provider afterwards; that sync is best-effort and never
//! fails the request.

pub mod analytics;
pub mod repository;
pub mod validation;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::automation::IntegrationError;
use crate::error::AppError;

pub use analytics::SqlAnalyticsTracker;
pub use repository::{Subscriber, SubscriberCounts, SubscriberRepository, SubscriberStatus};

/// Contact record sent to the email provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewsletterContact {
    pub email: String,
    pub first_name: Option<String>,
    pub list_id: Option<i64>,
}

#[async_trait]
pub trait EmailProvider: Send + Sync {
    /// Create the contact or update it if it already exists.
    async fn upsert_contact(&self, contact: &NewsletterContact) -> Result<(), IntegrationError>;
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscribeRequest {
    #[serde(default)]
    pub email: String,
    pub first_name: Option<String>,
    pub source: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UnsubscribeRequest {
    #[serde(default)]
    pub email: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SubscribeOutcome {
    Created(Subscriber),
    AlreadySubscribed(Subscriber),
    Reactivated(Subscriber),
}

impl SubscribeOutcome {
    pub fn subscriber(&self) -> &Subscriber {
        match self {
            SubscribeOutcome::Created(s)
            | SubscribeOutcome::AlreadySubscribed(s)
            | SubscribeOutcome::Reactivated(s) => s,
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            SubscribeOutcome::Created(_) => "Successfully subscribed!",
            SubscribeOutcome::AlreadySubscribed(_) => "You are already subscribed",
            SubscribeOutcome::Reactivated(_) => {
                "Welcome back! Your subscription has been reactivated."
            }
        }
    }

    /// Metric label.
    pub fn label(&self) -> &'static str {
        match self {
            SubscribeOutcome::Created(_) => "created",
            SubscribeOutcome::AlreadySubscribed(_) => "already_subscribed",
            SubscribeOutcome::Reactivated(_) => "reactivated",
        }
    }

    pub fn is_created(&self) -> bool {
        matches!(self, SubscribeOutcome::Created(_))
    }
}

pub struct NewsletterService {
    repository: SubscriberRepository,
    email_provider: Option<Arc<dyn EmailProvider>>,
    list_id: Option<i64>,
}

impl NewsletterService {
    pub fn new(repository: SubscriberRepository) -> Self {
        Self {
            repository,
            email_provider: None,
            list_id: None,
        }
    }

    pub fn with_email_provider(
        mut self,
        provider: Arc<dyn EmailProvider>,
        list_id: Option<i64>,
    ) -> Self {
        self.email_provider = Some(provider);
        self.list_id = list_id;
        self
    }

    pub fn repository(&self) -> &SubscriberRepository {
        &self.repository
    }

    /// Create a subscription, or reactivate a lapsed one. Subscribing an
    /// active address is not an error.
    pub async fn subscribe(&self, request: SubscribeRequest) -> Result<SubscribeOutcome, AppError> {
        let email = validation::normalize_email(&request.email);
        let first_name = request
            .first_name
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty());
        let source = request
            .source
            .as_deref()
            .map(str::trim)
            .filter(|source| !source.is_empty());

        let mut errors = Vec::new();
        if let Err(err) = validation::validate_email(&email) {
            errors.push(err);
        }
        if let Some(Err(err)) = first_name.map(validation::validate_first_name) {
            errors.push(err);
        }
        if let Some(Err(err)) = source.map(validation::validate_source) {
            errors.push(err);
        }
        validation::into_result(errors)?;

        let outcome = match self.repository.find_by_email(&email).await? {
            Some(existing) if existing.status == SubscriberStatus::Active => {
                SubscribeOutcome::AlreadySubscribed(existing)
            }
            Some(lapsed) => {
                SubscribeOutcome::Reactivated(self.repository.reactivate(lapsed.id, first_name).await?)
            }
            None => match self.repository.insert(&email, first_name, source).await {
                Ok(created) => SubscribeOutcome::Created(created),
                // Lost a race with a concurrent request for the same address.
                Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                    let existing = self
                        .repository
                        .find_by_email(&email)
                        .await?
                        .ok_or_else(|| AppError::Internal("Subscriber vanished".to_string()))?;
                    SubscribeOutcome::AlreadySubscribed(existing)
                }
                Err(err) => return Err(err.into()),
            },
        };

        tracing::info!(email = %email, outcome = outcome.label(), "Newsletter subscription");

        if !matches!(outcome, SubscribeOutcome::AlreadySubscribed(_)) {
            self.sync_contact(outcome.subscriber()).await;
        }
        Ok(outcome)
    }

    pub async fn unsubscribe(&self, email: &str) -> Result<(), AppError> {
        let email = validation::normalize_email(email);
        if let Err(err) = validation::validate_email(&email) {
            return validation::into_result(vec![err]);
        }

        if self.repository.unsubscribe(&email).await? {
            tracing::info!(email = %email, "Newsletter unsubscribe");
            Ok(())
        } else {
            Err(AppError::NotFound(
                "No active subscription found for this email".to_string(),
            ))
        }
    }

    async fn sync_contact(&self, subscriber: &Subscriber) {
        let Some(provider) = &self.email_provider else {
            return;
        };
        let contact = NewsletterContact {
            email: subscriber.email.clone(),
            first_name: subscriber.first_name.clone(),
            list_id: self.list_id,
        };
        if let Err(err) = provider.upsert_contact(&contact).await {
            tracing::warn!(email = %subscriber.email, "Failed to sync subscriber to email provider: {}", err);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::create_pool;
    use crate::services::mock::MockEmailProvider;

    async fn service(provider: Arc<MockEmailProvider>) -> NewsletterService {
        let pool = create_pool("sqlite::memory:").await.unwrap();
        NewsletterService::new(SubscriberRepository::new(pool)).with_email_provider(provider, Some(7))
    }

    fn request(email: &str) -> SubscribeRequest {
        SubscribeRequest {
            email: email.to_string(),
            first_name: Some("Ada".to_string()),
            source: None,
        }
    }

    #[tokio::test]
    async fn subscribing_twice_does_not_duplicate() {
        let provider = Arc::new(MockEmailProvider::new());
        let service = service(provider.clone()).await;

        let first = service.subscribe(request("test@example.com")).await.unwrap();
        assert!(first.is_created());
        assert_eq!(first.message(), "Successfully subscribed!");

        let second = service.subscribe(request("TEST@example.com ")).await.unwrap();
        assert!(matches!(second, SubscribeOutcome::AlreadySubscribed(_)));
        assert_eq!(second.message(), "You are already subscribed");
        assert_eq!(second.subscriber().id, first.subscriber().id);

        let counts = service.repository().counts().await.unwrap();
        assert_eq!(counts.total, 1);
        assert_eq!(provider.contacts().len(), 1);
        assert_eq!(provider.contacts()[0].list_id, Some(7));
    }

    #[tokio::test]
    async fn lapsed_subscriber_is_reactivated() {
        let service = service(Arc::new(MockEmailProvider::new())).await;
        service.subscribe(request("test@example.com")).await.unwrap();
        service.unsubscribe("test@example.com").await.unwrap();

        let again = service.subscribe(request("test@example.com")).await.unwrap();
        assert!(matches!(again, SubscribeOutcome::Reactivated(_)));
        assert_eq!(again.subscriber().status, SubscriberStatus::Active);
    }

    #[tokio::test]
    async fn invalid_input_is_a_validation_error() {
        let service = service(Arc::new(MockEmailProvider::new())).await;
        let err = service
            .subscribe(SubscribeRequest {
                email: "not-an-email".into(),
                first_name: Some("x".repeat(101)),
                source: None,
            })
            .await
            .unwrap_err();

        match err {
            AppError::Validation { details, .. } => {
                let details = details.unwrap();
                assert_eq!(details.as_array().unwrap().len(), 2);
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn provider_failure_does_not_fail_the_subscription() {
        let service = service(Arc::new(MockEmailProvider::new().with_error("brevo down"))).await;
        let outcome = service.subscribe(request("test@example.com")).await.unwrap();
        assert!(outcome.is_created());
    }

    #[tokio::test]
    async fn unsubscribing_an_unknown_address_is_not_found() {
        let service = service(Arc::new(MockEmailProvider::new())).await;
        let err = service.unsubscribe("ghost@example.com").await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }
}
