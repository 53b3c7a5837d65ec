use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::analysis::{ApiFootballClient, MatchAnalyzer};
use crate::budget::BudgetGuard;
use crate::cache::{CounterStore, MemoryCounterStore, RedisCounterStore};
use crate::config::Config;
use crate::db::Database;
use crate::health::ModelHealthMonitor;
use crate::leaderboard::LeaderboardAggregator;
use crate::scoring::{LinearRarity, ScoringEngine};

/// Every shared service, built once at startup and cloned into tasks and
/// request handlers.
#[derive(Clone)]
pub struct AppContext {
    pub db: Database,
    pub store: Arc<dyn CounterStore>,
    pub budget: BudgetGuard,
    pub health: ModelHealthMonitor,
    pub leaderboard: LeaderboardAggregator,
    pub scoring: ScoringEngine,
    /// `None` when no provider key is configured
    pub analyzer: Option<MatchAnalyzer>,
}

impl AppContext {
    pub async fn build(config: &Config) -> Result<Self> {
        let db = Database::open(&config.database_path)
            .with_context(|| format!("Failed to open database {}", config.database_path))?;
        info!("Database opened: {}", config.database_path);

        let store = connect_store(config).await;
        let mut ctx = Self::assemble(db, store, config.daily_api_budget);

        if let Some(key) = &config.api_football_key {
            let client = ApiFootballClient::new(key, Some(&config.api_football_url))?;
            ctx.analyzer = Some(MatchAnalyzer::new(
                Arc::new(client),
                ctx.budget.clone(),
                config.retry_policy(),
            ));
            info!("Match analysis enabled ({})", config.api_football_url);
        } else {
            info!("API_FOOTBALL_KEY not set, match analysis disabled");
        }
        Ok(ctx)
    }

    /// Wire the services around an open database and counter store.
    pub fn assemble(db: Database, store: Arc<dyn CounterStore>, daily_budget: u64) -> Self {
        let leaderboard = LeaderboardAggregator::new(db.clone(), store.clone());
        AppContext {
            budget: BudgetGuard::new(store.clone(), daily_budget),
            health: ModelHealthMonitor::new(db.clone()),
            scoring: ScoringEngine::new(db.clone(), Arc::new(LinearRarity), leaderboard.clone()),
            leaderboard,
            store,
            db,
            analyzer: None,
        }
    }
}

async fn connect_store(config: &Config) -> Arc<dyn CounterStore> {
    let url = match &config.redis_url {
        Some(u) => u,
        None => {
            warn!("REDIS_URL not set, using in-process counter store (budget is per instance)");
            return Arc::new(MemoryCounterStore::new());
        }
    };
    let timeout = Duration::from_millis(config.redis_timeout_ms);
    match RedisCounterStore::connect(url, timeout).await {
        Ok(store) => Arc::new(store),
        Err(e) => {
            warn!("Redis unavailable ({}), falling back to in-process counter store", e);
            Arc::new(MemoryCounterStore::new())
        }
    }
}
