// Library root. Exposes internal modules for integration tests in `tests/`
// and for the cron binary. The server entry point remains `src/main.rs`.

pub mod api;
pub mod automation;
pub mod cache;
pub mod cron;
pub mod db;
pub mod error;
pub mod metrics;
pub mod monitoring;
pub mod newsletter;
pub mod rate_limit;
pub mod scheduler;
pub mod services;
pub mod store;

// Startup plumbing shared by both binaries.
pub mod cli;
pub mod config;
pub mod logging;
