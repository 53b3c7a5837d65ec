use anyhow::Result;
use clap::Parser;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{error, info};

mod analysis;
mod budget;
mod cache;
mod config;
mod context;
mod dashboard;
mod db;
mod error;
mod health;
mod leaderboard;
mod scoring;

use config::Config;
use context::AppContext;
use scoring::ScoringEngine;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialise tracing / logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = Config::parse();
    config.validate()?;

    let ctx = AppContext::build(&config).await?;
    info!(
        "Daily API budget: {} requests ({} store)",
        ctx.budget.limit(),
        ctx.store.name()
    );

    // Quota-lock + scoring sweep in its own task
    let sweep_engine = ctx.scoring.clone();
    let lead = config.quota_lock_lead();
    let interval = Duration::from_secs(config.scoring_interval_secs);
    tokio::spawn(async move {
        run_sweeps(sweep_engine, lead, interval).await;
    });

    // Start the dashboard HTTP server
    let app = dashboard::router(ctx);
    let addr: SocketAddr = config.dashboard_addr.parse()?;
    info!("Dashboard listening on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    // Run dashboard server (blocks until shutdown)
    axum::serve(listener, app).await?;

    Ok(())
}

/// Lock quotas for matches about to kick off, then score whatever has
/// finished. A slow tick is skipped rather than queued.
async fn run_sweeps(engine: ScoringEngine, lead: chrono::Duration, period: Duration) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    loop {
        ticker.tick().await;
        match engine.lock_due_quotas(lead) {
            Ok(0) => {}
            Ok(n) => info!("Locked quotas for {} match(es)", n),
            Err(e) => error!("Quota lock sweep failed: {}", e),
        }
        match engine.score_finished_matches().await {
            Ok(reports) if !reports.is_empty() => {
                let scored: usize = reports.iter().map(|r| r.scored).sum();
                info!("Scoring sweep: {} prediction(s) across {} match(es)", scored, reports.len());
            }
            Ok(_) => {}
            Err(e) => error!("Scoring sweep failed: {}", e),
        }
    }
}
