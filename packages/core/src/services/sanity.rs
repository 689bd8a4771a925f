use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::config::ContentStoreConfig;
use crate::store::{ContentStore, ScheduledPost, StoreError, StoreResult};

const POST_PROJECTION: &str = r#"{
  _id, _rev, title, "slug": slug.current, scheduledAt, publishedAt, status,
  excerpt, "categories": categories[]->title, body
}"#;

/// Sanity HTTP API client for blog post documents.
#[derive(Clone)]
pub struct SanityClient {
    api_url: String,
    dataset: String,
    token: Option<String>,
    http: Client,
}

#[derive(Debug, Deserialize)]
struct QueryResponse<T> {
    result: T,
}

impl SanityClient {
    pub fn new(config: &ContentStoreConfig) -> Result<Self, StoreError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|err| StoreError::network(err.to_string()))?;

        Ok(Self {
            api_url: config.api_url.trim_end_matches('/').to_string(),
            dataset: config.dataset.clone(),
            token: config.token.clone(),
            http,
        })
    }

    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    /// Run a GROQ query. Parameters are passed as `$name` query-string
    /// entries holding JSON-encoded values.
    async fn query<T: DeserializeOwned>(
        &self,
        groq: &str,
        params: &[(&str, Value)],
    ) -> StoreResult<T> {
        let url = format!("{}/data/query/{}", self.api_url, self.dataset);

        let mut pairs: Vec<(String, String)> = vec![("query".to_string(), groq.to_string())];
        for (name, value) in params {
            pairs.push((format!("${}", name), value.to_string()));
        }

        let response = self
            .authorize(self.http.get(&url).query(&pairs))
            .send()
            .await
            .map_err(|err| StoreError::network(err.to_string()))?;

        let response = check_status(response, None).await?;

        let body = response
            .json::<QueryResponse<T>>()
            .await
            .map_err(|err| StoreError::format(err.to_string()))?;

        Ok(body.result)
    }

    /// Submit a single patch mutation for `id`.
    async fn mutate(&self, id: &str, patch: Value) -> StoreResult<()> {
        if self.token.is_none() {
            return Err(StoreError::NotConfigured {
                message: "SANITY_API_TOKEN is required for mutations".to_string(),
            });
        }

        let url = format!("{}/data/mutate/{}", self.api_url, self.dataset);
        let body = json!({ "mutations": [{ "patch": patch }] });

        let response = self
            .authorize(self.http.post(&url).json(&body))
            .send()
            .await
            .map_err(|err| StoreError::network(err.to_string()))?;

        check_status(response, Some(id)).await?;
        Ok(())
    }
}

async fn check_status(response: Response, id: Option<&str>) -> StoreResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(match (status, id) {
        (StatusCode::CONFLICT, Some(id)) => StoreError::Conflict { id: id.to_string() },
        (StatusCode::NOT_FOUND, Some(id)) => StoreError::NotFound { id: id.to_string() },
        _ => StoreError::Http {
            status: status.as_u16(),
            body,
        },
    })
}

fn timestamp(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[async_trait]
impl ContentStore for SanityClient {
    async fn fetch_ready_posts(&self, now: DateTime<Utc>) -> StoreResult<Vec<ScheduledPost>> {
        let groq = format!(
            r#"*[_type == "post" && defined(scheduledAt) && scheduledAt <= $now && status != "published"] | order(scheduledAt asc) {}"#,
            POST_PROJECTION
        );
        self.query(&groq, &[("now", json!(timestamp(now)))]).await
    }

    async fn fetch_post(&self, id: &str) -> StoreResult<ScheduledPost> {
        let groq = format!(r#"*[_type == "post" && _id == $id][0] {}"#, POST_PROJECTION);
        let post: Option<ScheduledPost> = self.query(&groq, &[("id", json!(id))]).await?;
        post.ok_or_else(|| StoreError::NotFound { id: id.to_string() })
    }

    async fn count_scheduled(&self) -> StoreResult<u64> {
        self.query(
            r#"count(*[_type == "post" && defined(scheduledAt) && status != "published"])"#,
            &[],
        )
        .await
    }

    async fn count_ready(&self, now: DateTime<Utc>) -> StoreResult<u64> {
        self.query(
            r#"count(*[_type == "post" && defined(scheduledAt) && scheduledAt <= $now && status != "published"])"#,
            &[("now", json!(timestamp(now)))],
        )
        .await
    }

    async fn publish(&self, post: &ScheduledPost, published_at: DateTime<Utc>) -> StoreResult<()> {
        let mut patch = json!({
            "id": post.id,
            "set": { "status": "published", "publishedAt": timestamp(published_at) },
            "unset": ["scheduledAt"],
        });
        if let Some(revision) = &post.revision {
            patch["ifRevisionID"] = json!(revision);
        }
        self.mutate(&post.id, patch).await
    }

    async fn schedule(&self, id: &str, when: DateTime<Utc>) -> StoreResult<()> {
        let patch = json!({
            "id": id,
            "set": { "scheduledAt": timestamp(when), "status": "scheduled" },
        });
        self.mutate(id, patch).await
    }

    async fn unschedule(&self, id: &str) -> StoreResult<()> {
        let patch = json!({
            "id": id,
            "set": { "status": "draft" },
            "unset": ["scheduledAt"],
        });
        self.mutate(id, patch).await
    }

    async fn ping(&self) -> StoreResult<()> {
        let _: Option<String> = self.query(r#"*[_type == "post"][0]._id"#, &[]).await?;
        Ok(())
    }

    fn store_name(&self) -> &str {
        "sanity"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::{
        matchers::{body_partial_json, header, method, path, query_param},
        Mock, MockServer, ResponseTemplate,
    };

    fn client_for(server: &MockServer, token: Option<&str>) -> SanityClient {
        SanityClient::new(&ContentStoreConfig {
            api_url: format!("{}/v2023-05-03", server.uri()),
            dataset: "production".to_string(),
            token: token.map(str::to_string),
        })
        .unwrap()
    }

    fn sample_post() -> ScheduledPost {
        ScheduledPost {
            id: "post-a".into(),
            revision: Some("rev-7".into()),
            title: "A".into(),
            slug: Some("a".into()),
            scheduled_at: Some(Utc::now()),
            published_at: None,
            status: Default::default(),
            excerpt: None,
            categories: Vec::new(),
            body: None,
        }
    }

    #[tokio::test]
    async fn fetch_ready_posts_parses_query_result() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v2023-05-03/data/query/production"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "ms": 3,
                "result": [
                    { "_id": "a", "_rev": "r1", "title": "A", "scheduledAt": "2024-01-01T00:00:00Z" },
                    { "_id": "b", "_rev": "r2", "title": "B", "scheduledAt": "2024-01-02T00:00:00Z" }
                ]
            })))
            .mount(&server)
            .await;

        let posts = client_for(&server, None)
            .fetch_ready_posts(Utc::now())
            .await
            .unwrap();
        assert_eq!(posts.len(), 2);
        assert_eq!(posts[0].id, "a");
    }

    #[tokio::test]
    async fn count_passes_now_as_json_parameter() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v2023-05-03/data/query/production"))
            .and(query_param("$now", "\"2024-03-01T12:00:00.000Z\""))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "result": 4 })))
            .mount(&server)
            .await;

        let now = DateTime::parse_from_rfc3339("2024-03-01T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let count = client_for(&server, None).count_ready(now).await.unwrap();
        assert_eq!(count, 4);
    }

    #[tokio::test]
    async fn publish_sends_guarded_patch_with_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v2023-05-03/data/mutate/production"))
            .and(header("authorization", "Bearer secret"))
            .and(body_partial_json(json!({
                "mutations": [{ "patch": {
                    "id": "post-a",
                    "ifRevisionID": "rev-7",
                    "set": { "status": "published" },
                    "unset": ["scheduledAt"]
                }}]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "results": [] })))
            .expect(1)
            .mount(&server)
            .await;

        client_for(&server, Some("secret"))
            .publish(&sample_post(), Utc::now())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn revision_mismatch_maps_to_conflict() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(409).set_body_string("revision mismatch"))
            .mount(&server)
            .await;

        let err = client_for(&server, Some("secret"))
            .publish(&sample_post(), Utc::now())
            .await
            .unwrap_err();
        assert_eq!(err, StoreError::Conflict { id: "post-a".into() });
    }

    #[tokio::test]
    async fn mutations_without_token_fail_fast() {
        let server = MockServer::start().await;
        let err = client_for(&server, None)
            .unschedule("post-a")
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotConfigured { .. }));
    }

    #[tokio::test]
    async fn server_error_is_reported_with_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503).set_body_string("down"))
            .mount(&server)
            .await;

        let err = client_for(&server, None).ping().await.unwrap_err();
        assert_eq!(
            err,
            StoreError::Http {
                status: 503,
                body: "down".into()
            }
        );
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn missing_post_maps_to_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "result": null })))
            .mount(&server)
            .await;

        let err = client_for(&server, None).fetch_post("nope").await.unwrap_err();
        assert_eq!(err, StoreError::NotFound { id: "nope".into() });
    }
}
