use anyhow::{Context, Result};

/// Application configuration loaded from environment variables.
/// Fails at startup if required variables are missing.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub redis_url: String,
    pub port: u16,
    pub rust_log: String,
    /// Fast-tier entry lifetime in seconds; long enough to cover the polling
    /// window of a slow operation.
    pub progress_ttl_secs: u64,
    /// Admission bound: how many execution units may run at once. Launches
    /// beyond the bound queue rather than spawning unbounded work.
    pub max_concurrent_tasks: usize,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        Ok(Config {
            database_url: require_env("DATABASE_URL")?,
            redis_url: require_env("REDIS_URL")?,
            port: std::env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse::<u16>()
                .context("PORT must be a valid port number")?,
            rust_log: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
            progress_ttl_secs: std::env::var("PROGRESS_TTL_SECS")
                .unwrap_or_else(|_| "1800".to_string())
                .parse::<u64>()
                .context("PROGRESS_TTL_SECS must be a number of seconds")?,
            max_concurrent_tasks: std::env::var("MAX_CONCURRENT_TASKS")
                .unwrap_or_else(|_| "32".to_string())
                .parse::<usize>()
                .context("MAX_CONCURRENT_TASKS must be a positive integer")?,
        })
    }
}

fn require_env(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("Required environment variable '{key}' is not set"))
}
