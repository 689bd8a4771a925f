use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

use crate::automation::IntegrationError;
use crate::newsletter::{EmailProvider, NewsletterContact};

pub const BREVO_API_URL: &str = "https://api.brevo.com";

/// Brevo contacts API client.
#[derive(Clone)]
pub struct BrevoClient {
    base_url: String,
    api_key: String,
    http: Client,
}

impl BrevoClient {
    pub fn new(base_url: &str, api_key: &str) -> Result<Self, IntegrationError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|err| IntegrationError::network(err.to_string()))?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            http,
        })
    }
}

fn contact_body(contact: &NewsletterContact) -> Value {
    let mut body = json!({
        "email": contact.email,
        "updateEnabled": true,
    });
    if let Some(first_name) = &contact.first_name {
        body["attributes"] = json!({ "FIRSTNAME": first_name });
    }
    if let Some(list_id) = contact.list_id {
        body["listIds"] = json!([list_id]);
    }
    body
}

#[async_trait]
impl EmailProvider for BrevoClient {
    async fn upsert_contact(&self, contact: &NewsletterContact) -> Result<(), IntegrationError> {
        let url = format!("{}/v3/contacts", self.base_url);

        let response = self
            .http
            .post(&url)
            .header("api-key", &self.api_key)
            .header("accept", "application/json")
            .json(&contact_body(contact))
            .send()
            .await
            .map_err(|err| IntegrationError::network(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(IntegrationError::Http {
                provider: "Brevo".to_string(),
                status: status.as_u16(),
                body,
            });
        }

        tracing::debug!(email = %contact.email, "Synced contact to Brevo");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::{
        matchers::{body_json, header, method, path},
        Mock, MockServer, ResponseTemplate,
    };

    fn contact() -> NewsletterContact {
        NewsletterContact {
            email: "test@example.com".into(),
            first_name: Some("Ada".into()),
            list_id: Some(3),
        }
    }

    #[tokio::test]
    async fn posts_contact_with_api_key() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v3/contacts"))
            .and(header("api-key", "brevo-key"))
            .and(body_json(json!({
                "email": "test@example.com",
                "updateEnabled": true,
                "attributes": { "FIRSTNAME": "Ada" },
                "listIds": [3]
            })))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "id": 42 })))
            .expect(1)
            .mount(&server)
            .await;

        let client = BrevoClient::new(&server.uri(), "brevo-key").unwrap();
        client.upsert_contact(&contact()).await.unwrap();
    }

    #[tokio::test]
    async fn non_success_status_is_an_http_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v3/contacts"))
            .respond_with(ResponseTemplate::new(401).set_body_string("unauthorized"))
            .mount(&server)
            .await;

        let client = BrevoClient::new(&server.uri(), "wrong").unwrap();
        let err = client.upsert_contact(&contact()).await.unwrap_err();
        assert_eq!(
            err,
            IntegrationError::Http {
                provider: "Brevo".into(),
                status: 401,
                body: "unauthorized".into(),
            }
        );
    }

    #[test]
    fn optional_fields_are_omitted() {
        let body = contact_body(&NewsletterContact {
            email: "a@b.co".into(),
            first_name: None,
            list_id: None,
        });
        assert!(body.get("attributes").is_none());
        assert!(body.get("listIds").is_none());
    }
}
