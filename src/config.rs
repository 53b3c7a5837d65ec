use clap::Parser;
use std::time::Duration;

use crate::analysis::RetryPolicy;
use crate::budget::DEFAULT_DAILY_LIMIT;

/// Scoring, streak and health service for AI football prediction models
#[derive(Parser, Debug, Clone)]
#[command(name = "kicktipp-arena", version, about)]
pub struct Config {
    /// Dashboard / JSON API listen address
    #[arg(long, env = "DASHBOARD_ADDR", default_value = "0.0.0.0:8080")]
    pub dashboard_addr: String,

    /// SQLite database path
    #[arg(long, env = "DATABASE_PATH", default_value = "arena.db")]
    pub database_path: String,

    /// Redis URL for the budget counter and leaderboard cache.
    /// Without it an in-process store is used (single instance only).
    #[arg(long, env = "REDIS_URL")]
    pub redis_url: Option<String>,

    /// Timeout for a single Redis command, in milliseconds
    #[arg(long, env = "REDIS_TIMEOUT_MS", default_value = "500")]
    pub redis_timeout_ms: u64,

    /// Daily request budget for the football data provider
    #[arg(long, env = "DAILY_API_BUDGET", default_value_t = DEFAULT_DAILY_LIMIT)]
    pub daily_api_budget: u64,

    /// API-Football key; match analysis is disabled without it
    #[arg(long, env = "API_FOOTBALL_KEY")]
    pub api_football_key: Option<String>,

    /// API-Football base URL
    #[arg(
        long,
        env = "API_FOOTBALL_URL",
        default_value = "https://v3.football.api-sports.io"
    )]
    pub api_football_url: String,

    /// Interval of the quota-lock and scoring sweep, in seconds
    #[arg(long, env = "SCORING_INTERVAL_SECS", default_value = "60")]
    pub scoring_interval_secs: u64,

    /// Lock quotas this many minutes before kickoff
    #[arg(long, env = "QUOTA_LOCK_LEAD_MINS", default_value = "15")]
    pub quota_lock_lead_mins: i64,

    /// Timeout for one provider request attempt, in seconds
    #[arg(long, env = "SOURCE_TIMEOUT_SECS", default_value = "10")]
    pub source_timeout_secs: u64,

    /// Attempts per provider request (including the first)
    #[arg(long, env = "SOURCE_MAX_ATTEMPTS", default_value = "3")]
    pub source_max_attempts: u32,
}

impl Config {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.daily_api_budget == 0 {
            anyhow::bail!("daily_api_budget must be positive");
        }
        if self.scoring_interval_secs == 0 {
            anyhow::bail!("scoring_interval_secs must be positive");
        }
        if !(1..=24 * 60).contains(&self.quota_lock_lead_mins) {
            anyhow::bail!("quota_lock_lead_mins must be between 1 and 1440");
        }
        if self.source_timeout_secs == 0 || self.source_timeout_secs > 120 {
            anyhow::bail!("source_timeout_secs must be between 1 and 120");
        }
        if !(1..=10).contains(&self.source_max_attempts) {
            anyhow::bail!("source_max_attempts must be between 1 and 10");
        }
        if self.redis_timeout_ms == 0 {
            anyhow::bail!("redis_timeout_ms must be positive");
        }
        if matches!(self.api_football_key.as_deref(), Some(k) if k.trim().is_empty()) {
            anyhow::bail!("API_FOOTBALL_KEY is set but empty");
        }
        Ok(())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.source_max_attempts,
            attempt_timeout: Duration::from_secs(self.source_timeout_secs),
            ..RetryPolicy::default()
        }
    }

    pub fn quota_lock_lead(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.quota_lock_lead_mins)
    }
}
