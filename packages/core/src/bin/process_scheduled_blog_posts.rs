//! Cron entry point: trigger one scheduled-post processing run on a running
//! back-office server and exit non-zero if it could not be completed.

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use dotenvy::dotenv;

use marketing_backoffice::cron::{CronConfig, CronDriver};
use marketing_backoffice::logging::init_logging;

/// Process scheduled blog posts via the admin API
#[derive(Debug, Parser)]
#[command(name = "process-scheduled-blog-posts", version)]
struct Args {
    /// Server base URL (overrides NEXTAUTH_URL)
    #[arg(long)]
    base_url: Option<String>,

    /// Per-request timeout in milliseconds (overrides BLOG_SCHEDULER_TIMEOUT)
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// Attempts before giving up
    #[arg(long)]
    max_retries: Option<u32>,

    /// Seconds to wait between attempts
    #[arg(long)]
    retry_delay_secs: Option<u64>,

    /// Execution log file (one JSON line per run)
    #[arg(long)]
    log_file: Option<PathBuf>,

    #[arg(long, env = "BLOG_SCHEDULER_LOG_LEVEL", default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenv().ok();
    let args = Args::parse();
    init_logging(&args.log_level);

    let mut config = match CronConfig::from_env() {
        Ok(config) => config,
        Err(err) => {
            tracing::error!("Config error: {}", err);
            return ExitCode::FAILURE;
        }
    };
    if let Some(url) = args.base_url {
        config.base_url = url;
    }
    if let Some(ms) = args.timeout_ms {
        config.timeout = Duration::from_millis(ms);
    }
    if let Some(retries) = args.max_retries {
        config.max_retries = retries;
    }
    if let Some(secs) = args.retry_delay_secs {
        config.retry_delay = Duration::from_secs(secs);
    }
    if let Some(path) = args.log_file {
        config.log_file = path;
    }

    tracing::info!(base_url = %config.base_url, "Starting scheduled blog post processing");
    let driver = match CronDriver::new(config) {
        Ok(driver) => driver,
        Err(err) => {
            tracing::error!("{}", err);
            return ExitCode::FAILURE;
        }
    };

    let record = driver.run().await;
    if record.success {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
