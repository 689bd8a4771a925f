use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

/// Initialize structured logging for the process.
///
/// `RUST_LOG` takes precedence; otherwise `default_level` (normally
/// `BLOG_SCHEDULER_LOG_LEVEL`) is used. Must be called once at startup.
pub fn init_logging(default_level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();

    info!(level = default_level, "Logging initialized");
}
