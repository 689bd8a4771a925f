use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use dotenvy::dotenv;
use tokio::net::TcpListener;

use marketing_backoffice::api::{self, AppState};
use marketing_backoffice::automation::{AutomationEngine, SocialContentGenerator};
use marketing_backoffice::cache::StatsCache;
use marketing_backoffice::cli::Cli;
use marketing_backoffice::config::Config;
use marketing_backoffice::db;
use marketing_backoffice::error::AppError;
use marketing_backoffice::logging::init_logging;
use marketing_backoffice::metrics::AppMetrics;
use marketing_backoffice::monitoring::{BlogSchedulerMonitoring, NewsletterMonitoring};
use marketing_backoffice::newsletter::{NewsletterService, SqlAnalyticsTracker, SubscriberRepository};
use marketing_backoffice::rate_limit::RateLimiter;
use marketing_backoffice::scheduler::{run_blog_polling, BlogPostScheduler};
use marketing_backoffice::services::ayrshare::AYRSHARE_API_URL;
use marketing_backoffice::services::brevo::BREVO_API_URL;
use marketing_backoffice::services::{AyrshareClient, BrevoClient, SanityClient};

const STATS_CACHE_TTL: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() {
    dotenv().ok();
    let cli = Cli::parse();

    let mut config = Config::from_env()
        .map_err(AppError::Config)
        .unwrap_or_else(|err| {
            eprintln!("{}", err);
            std::process::exit(1);
        });
    cli.apply(&mut config);
    init_logging(&config.log_level);

    if let Err(err) = run(config).await {
        tracing::error!("{}", err);
        std::process::exit(1);
    }
}

async fn run(config: Config) -> Result<(), AppError> {
    tracing::info!(
        environment = config.environment.as_str(),
        port = config.port,
        "Starting marketing back-office"
    );

    let pool = db::create_pool(&config.database_url).await?;
    tracing::info!("Database ready");

    let store = SanityClient::new(&config.content_store)
        .map_err(|err| AppError::Config(err.to_string()))?;

    let social: Option<Arc<dyn SocialContentGenerator>> =
        match config.providers.ayrshare_api_key.as_deref() {
            Some(key) => Some(Arc::new(
                AyrshareClient::new(AYRSHARE_API_URL, key, &config.site_url)
                    .map_err(|err| AppError::Config(err.to_string()))?,
            )),
            None => {
                tracing::info!("AYRSHARE_API_KEY not set; social posting disabled");
                None
            }
        };
    let automation = AutomationEngine::new(social, Arc::new(SqlAnalyticsTracker::new(pool.clone())));

    let mut scheduler = BlogPostScheduler::new(Arc::new(store))
        .with_automation(Arc::new(automation))
        .with_retry_policy(config.publish_retry.clone());
    if let Some(interval) = config.poll_interval_seconds {
        scheduler = scheduler.with_poll_interval(interval);
    }
    let scheduler = Arc::new(scheduler);

    let repository = SubscriberRepository::new(pool.clone());
    let mut newsletter = NewsletterService::new(repository.clone());
    if let Some(key) = config.providers.brevo_api_key.as_deref() {
        let brevo = BrevoClient::new(BREVO_API_URL, key)
            .map_err(|err| AppError::Config(err.to_string()))?;
        newsletter = newsletter.with_email_provider(Arc::new(brevo), config.providers.brevo_list_id);
    }

    let metrics = Arc::new(
        AppMetrics::new().map_err(|err| AppError::Internal(format!("metrics registry: {}", err)))?,
    );
    let blog_monitoring = Arc::new(BlogSchedulerMonitoring::new(scheduler.clone()));

    if let Some(interval) = config.poll_interval_seconds {
        tokio::spawn(run_blog_polling(
            scheduler.clone(),
            blog_monitoring.clone(),
            metrics.clone(),
            interval,
        ));
    } else {
        tracing::info!("BLOG_POLL_INTERVAL_SECONDS not set; relying on external cron");
    }

    let port = config.port;
    let state = AppState {
        config: Arc::new(config),
        pool,
        scheduler,
        blog_monitoring,
        newsletter: Arc::new(newsletter),
        newsletter_monitoring: Arc::new(NewsletterMonitoring::new(repository)),
        rate_limiter: Arc::new(RateLimiter::newsletter()),
        stats_cache: Arc::new(StatsCache::new(STATS_CACHE_TTL)),
        metrics,
    };
    let app = api::create_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|err| AppError::Network(format!("Failed to bind {}: {}", addr, err)))?;
    tracing::info!("Listening on {}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async {
        tokio::signal::ctrl_c().await.ok();
        tracing::info!("Shutdown signal received");
    })
    .await
    .map_err(|err| AppError::Network(err.to_string()))
}
