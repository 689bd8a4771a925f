//! Out-of-process driver for the scheduler.
//!
//! Meant to be run from cron: checks the service health, reads the
//! scheduling stats, then triggers one processing run over HTTP. The whole
//! sequence is retried with a fixed delay; only the processing call can
//! fail an attempt. Every execution appends one JSON line to a local log.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use reqwest::{Client, RequestBuilder};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;

use crate::api::headers::API_KEY_HEADER;
use crate::error::AppError;
use crate::scheduler::ProcessingResult;

#[derive(Debug, Clone)]
pub struct CronConfig {
    /// Base URL of the back-office server (`NEXTAUTH_URL`).
    pub base_url: String,
    /// Per-request timeout (`BLOG_SCHEDULER_TIMEOUT`, milliseconds).
    pub timeout: Duration,
    pub max_retries: u32,
    pub retry_delay: Duration,
    pub log_file: PathBuf,
    pub api_key: Option<String>,
}

impl Default for CronConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3000".to_string(),
            timeout: Duration::from_millis(30_000),
            max_retries: 3,
            retry_delay: Duration::from_secs(5),
            log_file: PathBuf::from("logs/blog-scheduler.log"),
            api_key: None,
        }
    }
}

impl CronConfig {
    pub fn from_env() -> Result<Self, String> {
        let mut config = Self::default();
        let read = |name: &str| {
            std::env::var(name)
                .ok()
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        if let Some(url) = read("NEXTAUTH_URL") {
            config.base_url = url;
        }
        if let Some(raw) = read("BLOG_SCHEDULER_TIMEOUT") {
            let ms = raw
                .parse::<u64>()
                .map_err(|_| "BLOG_SCHEDULER_TIMEOUT must be a number of milliseconds".to_string())?;
            config.timeout = Duration::from_millis(ms);
        }
        config.api_key = read("ADMIN_API_KEY");
        Ok(config)
    }
}

/// One line of the execution log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionRecord {
    pub timestamp: DateTime<Utc>,
    pub success: bool,
    pub attempts: u32,
    pub duration_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub health: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stats: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<ProcessingResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

struct AttemptOutcome {
    health: Option<Value>,
    stats: Option<Value>,
    result: ProcessingResult,
}

#[derive(Debug, Deserialize)]
struct ProcessResponse {
    success: bool,
    data: Option<ProcessingResult>,
    error: Option<String>,
}

pub struct CronDriver {
    config: CronConfig,
    http: Client,
}

impl CronDriver {
    pub fn new(config: CronConfig) -> Result<Self, AppError> {
        let http = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|err| AppError::Network(err.to_string()))?;
        Ok(Self { config, http })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.config.api_key {
            Some(key) => request.header(API_KEY_HEADER, key),
            None => request,
        }
    }

    /// Run the sequence with retries and log the outcome. Never fails;
    /// check `success` on the returned record.
    pub async fn run(&self) -> ExecutionRecord {
        let started = Instant::now();
        let max_attempts = self.config.max_retries.max(1);
        let mut record = ExecutionRecord {
            timestamp: Utc::now(),
            success: false,
            attempts: 0,
            duration_ms: 0,
            health: None,
            stats: None,
            result: None,
            error: None,
        };

        for attempt in 1..=max_attempts {
            record.attempts = attempt;
            match self.attempt().await {
                Ok(outcome) => {
                    tracing::info!(
                        attempt,
                        processed = outcome.result.processed,
                        successful = outcome.result.successful,
                        failed = outcome.result.failed,
                        "Scheduled blog processing completed"
                    );
                    record.success = true;
                    record.health = outcome.health;
                    record.stats = outcome.stats;
                    record.result = Some(outcome.result);
                    record.error = None;
                    break;
                }
                Err(err) => {
                    tracing::warn!(attempt, max_attempts, "Scheduler run failed: {}", err);
                    record.error = Some(err.to_string());
                    if attempt < max_attempts {
                        tokio::time::sleep(self.config.retry_delay).await;
                    }
                }
            }
        }

        record.duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        if !record.success {
            tracing::error!(attempts = record.attempts, "Scheduler run failed after all retries");
        }
        if let Err(err) = self.append_log(&record).await {
            tracing::warn!(path = %self.config.log_file.display(), "Failed to write execution log: {}", err);
        }
        record
    }

    async fn attempt(&self) -> Result<AttemptOutcome, AppError> {
        let health = match self.get_json("/api/health", false).await {
            Ok(body) => Some(body),
            Err(err) => {
                tracing::warn!("Health check failed, continuing: {}", err);
                None
            }
        };

        let stats = match self.get_json("/api/admin/blog/process-scheduled", true).await {
            Ok(body) => {
                tracing::debug!(stats = %body, "Scheduling stats");
                Some(body)
            }
            Err(err) => {
                tracing::warn!("Stats request failed, continuing: {}", err);
                None
            }
        };

        let result = self.process().await?;
        Ok(AttemptOutcome {
            health,
            stats,
            result,
        })
    }

    async fn get_json(&self, path: &str, admin: bool) -> Result<Value, AppError> {
        let mut request = self.http.get(self.url(path));
        if admin {
            request = self.authorize(request);
        }
        let response = request
            .send()
            .await
            .map_err(|err| AppError::Network(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AppError::Network(format!("{} returned HTTP {}", path, status.as_u16())));
        }
        response
            .json::<Value>()
            .await
            .map_err(|err| AppError::Parse(err.to_string()))
    }

    async fn process(&self) -> Result<ProcessingResult, AppError> {
        let path = "/api/admin/blog/process-scheduled";
        let response = self
            .authorize(self.http.post(self.url(path)))
            .send()
            .await
            .map_err(|err| AppError::Network(err.to_string()))?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(AppError::Network(format!(
                "{} returned HTTP {}: {}",
                path,
                status.as_u16(),
                body
            )));
        }

        let parsed: ProcessResponse =
            serde_json::from_str(&body).map_err(|err| AppError::Parse(err.to_string()))?;
        if !parsed.success {
            return Err(AppError::Network(
                parsed
                    .error
                    .unwrap_or_else(|| "Processing reported failure".to_string()),
            ));
        }
        Ok(parsed.data.unwrap_or_default())
    }

    async fn append_log(&self, record: &ExecutionRecord) -> std::io::Result<()> {
        if let Some(dir) = self.config.log_file.parent() {
            if !dir.as_os_str().is_empty() {
                fs::create_dir_all(dir).await?;
            }
        }
        let mut line = serde_json::to_string(record)?;
        line.push('\n');

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.config.log_file)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await
    }
}
