use std::env;
use std::time::Duration;

use crate::scheduler::RetryPolicy;

#[derive(Debug, Clone)]
pub struct Config {
    pub environment: Environment,
    pub port: u16,
    pub database_url: String,
    /// Public base URL of the site (`NEXTAUTH_URL`), used to build post links.
    pub site_url: String,
    pub content_store: ContentStoreConfig,
    /// When set, the server runs its own polling loop at this interval.
    pub poll_interval_seconds: Option<u64>,
    pub publish_retry: RetryPolicy,
    pub admin_api_key: Option<String>,
    pub log_level: String,
    pub providers: ProviderKeys,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
    Test,
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Development => "development",
            Environment::Production => "production",
            Environment::Test => "test",
        }
    }

    /// Production hides server-side error details from clients.
    pub fn sanitizes_errors(&self) -> bool {
        matches!(self, Environment::Production)
    }
}

#[derive(Debug, Clone)]
pub struct ContentStoreConfig {
    /// API base including the version segment, e.g.
    /// `https://abc123.api.sanity.io/v2023-05-03`.
    pub api_url: String,
    pub dataset: String,
    pub token: Option<String>,
}

/// Credentials for third-party providers. Only presence is checked by the
/// health report.
#[derive(Debug, Clone, Default)]
pub struct ProviderKeys {
    pub openai_api_key: Option<String>,
    pub brevo_api_key: Option<String>,
    pub brevo_list_id: Option<i64>,
    pub ayrshare_api_key: Option<String>,
    pub linkedin_client_id: Option<String>,
    pub linkedin_client_secret: Option<String>,
    pub twitter_api_key: Option<String>,
    pub twitter_api_secret: Option<String>,
}

impl ProviderKeys {
    pub fn openai_configured(&self) -> bool {
        self.openai_api_key.is_some()
    }

    pub fn brevo_configured(&self) -> bool {
        self.brevo_api_key.is_some()
    }

    pub fn linkedin_configured(&self) -> bool {
        self.linkedin_client_id.is_some() && self.linkedin_client_secret.is_some()
    }

    pub fn twitter_configured(&self) -> bool {
        self.twitter_api_key.is_some() && self.twitter_api_secret.is_some()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            environment: Environment::Development,
            port: 3000,
            database_url: "sqlite://backoffice.db?mode=rwc".to_string(),
            site_url: "http://localhost:3000".to_string(),
            content_store: ContentStoreConfig {
                api_url: "http://localhost:3333/v2023-05-03".to_string(),
                dataset: "production".to_string(),
                token: None,
            },
            poll_interval_seconds: None,
            publish_retry: RetryPolicy::default(),
            admin_api_key: None,
            log_level: "info".to_string(),
            providers: ProviderKeys::default(),
        }
    }
}

/// Reads a variable, treating unset and blank values the same.
fn optional(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn parse_optional<T: std::str::FromStr>(name: &str) -> Result<Option<T>, String> {
    match optional(name) {
        Some(raw) => raw
            .parse::<T>()
            .map(Some)
            .map_err(|_| format!("{} must be a valid number", name)),
        None => Ok(None),
    }
}

impl Config {
    pub fn from_env() -> Result<Self, String> {
        let defaults = Self::default();

        let environment = match optional("APP_ENV").as_deref() {
            None | Some("development") => Environment::Development,
            Some("production") => Environment::Production,
            Some("test") => Environment::Test,
            Some(other) => return Err(format!("Invalid APP_ENV: {}", other)),
        };

        let port = parse_optional::<u16>("PORT")?.unwrap_or(defaults.port);

        let api_url = match (optional("SANITY_API_URL"), optional("SANITY_PROJECT_ID")) {
            (Some(url), _) => url.trim_end_matches('/').to_string(),
            (None, Some(project_id)) => {
                let version =
                    optional("SANITY_API_VERSION").unwrap_or_else(|| "2023-05-03".to_string());
                format!("https://{}.api.sanity.io/v{}", project_id, version)
            }
            (None, None) => {
                return Err("SANITY_API_URL or SANITY_PROJECT_ID is required".to_string())
            }
        };

        let content_store = ContentStoreConfig {
            api_url,
            dataset: optional("SANITY_DATASET").unwrap_or(defaults.content_store.dataset),
            token: optional("SANITY_API_TOKEN"),
        };

        let poll_interval_seconds = parse_optional::<u64>("BLOG_POLL_INTERVAL_SECONDS")?
            .filter(|secs| *secs > 0);

        let mut publish_retry = defaults.publish_retry;
        if let Some(attempts) = parse_optional::<u32>("BLOG_PUBLISH_MAX_ATTEMPTS")? {
            if attempts == 0 {
                return Err("BLOG_PUBLISH_MAX_ATTEMPTS must be at least 1".to_string());
            }
            publish_retry.max_attempts = attempts;
        }
        if let Some(delay_ms) = parse_optional::<u64>("BLOG_PUBLISH_RETRY_DELAY_MS")? {
            publish_retry.base_delay = Duration::from_millis(delay_ms);
        }

        let providers = ProviderKeys {
            openai_api_key: optional("OPENAI_API_KEY"),
            brevo_api_key: optional("BREVO_API_KEY"),
            brevo_list_id: parse_optional::<i64>("BREVO_LIST_ID")?,
            ayrshare_api_key: optional("AYRSHARE_API_KEY"),
            linkedin_client_id: optional("LINKEDIN_CLIENT_ID"),
            linkedin_client_secret: optional("LINKEDIN_CLIENT_SECRET"),
            twitter_api_key: optional("TWITTER_API_KEY"),
            twitter_api_secret: optional("TWITTER_API_SECRET"),
        };

        Ok(Self {
            environment,
            port,
            database_url: optional("DATABASE_URL").unwrap_or(defaults.database_url),
            site_url: optional("NEXTAUTH_URL").unwrap_or(defaults.site_url),
            content_store,
            poll_interval_seconds,
            publish_retry,
            admin_api_key: optional("ADMIN_API_KEY"),
            log_level: optional("BLOG_SCHEDULER_LOG_LEVEL").unwrap_or(defaults.log_level),
            providers,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_flags_need_both_halves_of_a_credential_pair() {
        let keys = ProviderKeys {
            linkedin_client_id: Some("id".into()),
            twitter_api_key: Some("key".into()),
            twitter_api_secret: Some("secret".into()),
            ..ProviderKeys::default()
        };
        assert!(!keys.linkedin_configured());
        assert!(keys.twitter_configured());
        assert!(!keys.brevo_configured());
    }

    #[test]
    fn defaults_point_at_local_development() {
        let config = Config::default();
        assert_eq!(config.environment, Environment::Development);
        assert_eq!(config.publish_retry.max_attempts, 3);
        assert!(config.poll_interval_seconds.is_none());
    }
}
