use clap::Parser;

/// Marketing back-office server arguments
#[derive(Debug, Parser)]
#[command(
    name = "marketing-backoffice",
    version,
    about = "Blog scheduling, automation, monitoring and newsletter API"
)]
pub struct Cli {
    /// Port to listen on
    #[arg(long)]
    pub port: Option<u16>,

    /// Run the in-process scheduler loop at this interval (seconds)
    #[arg(long)]
    pub poll_interval: Option<u64>,

    /// Database URL (overrides DATABASE_URL)
    #[arg(long)]
    pub database_url: Option<String>,

    /// Log level used when RUST_LOG is unset
    #[arg(long)]
    pub log_level: Option<String>,
}

impl Cli {
    /// Apply command-line overrides on top of the environment config.
    pub fn apply(self, config: &mut crate::config::Config) {
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(interval) = self.poll_interval.filter(|secs| *secs > 0) {
            config.poll_interval_seconds = Some(interval);
        }
        if let Some(url) = self.database_url {
            config.database_url = url;
        }
        if let Some(level) = self.log_level {
            config.log_level = level;
        }
    }
}
