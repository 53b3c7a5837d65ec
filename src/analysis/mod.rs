//! Pre-match context from an external football data provider.
//!
//! Each section (odds, injuries, lineups, standings) is fetched on its own:
//! budget check, per-attempt timeout, bounded retry. A failing section is
//! left out and reported in `degraded`; only a provider rate limit aborts
//! the whole analysis.

pub mod api_football;
pub mod records;
pub mod retry;

pub use api_football::ApiFootballClient;
pub use records::{Injury, OddsSnapshot, StandingRow, TeamLineup};
pub use retry::RetryPolicy;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use tracing::{info, warn};

use crate::budget::BudgetGuard;
use crate::error::{ExternalSourceError, RateLimitError};

/// Trait every football data provider must implement.
#[async_trait]
pub trait FootballDataSource: Send + Sync {
    /// 1X2 odds, `None` if no bookmaker has priced the fixture yet.
    async fn fetch_odds(&self, fixture_id: i64) -> Result<Option<OddsSnapshot>, ExternalSourceError>;

    async fn fetch_injuries(&self, fixture_id: i64) -> Result<Vec<Injury>, ExternalSourceError>;

    async fn fetch_lineups(&self, fixture_id: i64) -> Result<Vec<TeamLineup>, ExternalSourceError>;

    async fn fetch_standings(
        &self,
        league_id: i64,
        season: i32,
    ) -> Result<Vec<StandingRow>, ExternalSourceError>;

    /// Human-readable name for logging.
    fn name(&self) -> &str;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Section {
    Odds,
    Injuries,
    Lineups,
    Standings,
}

impl Section {
    pub fn name(self) -> &'static str {
        match self {
            Section::Odds => "odds",
            Section::Injuries => "injuries",
            Section::Lineups => "lineups",
            Section::Standings => "standings",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisRequest {
    pub fixture_id: i64,
    /// Standings are only fetched when both league and season are known
    pub league_id: Option<i64>,
    pub season: Option<i32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DegradedSection {
    pub section: Section,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchAnalysis {
    pub fixture_id: i64,
    pub odds: Option<OddsSnapshot>,
    pub injuries: Option<Vec<Injury>>,
    pub lineups: Option<Vec<TeamLineup>>,
    pub standings: Option<Vec<StandingRow>>,
    pub degraded: Vec<DegradedSection>,
    pub fetched_at: DateTime<Utc>,
}

impl MatchAnalysis {
    pub fn is_complete(&self) -> bool {
        self.degraded.is_empty()
    }
}

#[derive(Clone)]
pub struct MatchAnalyzer {
    source: Arc<dyn FootballDataSource>,
    budget: BudgetGuard,
    policy: RetryPolicy,
}

impl MatchAnalyzer {
    pub fn new(source: Arc<dyn FootballDataSource>, budget: BudgetGuard, policy: RetryPolicy) -> Self {
        MatchAnalyzer {
            source,
            budget,
            policy,
        }
    }

    /// Fetch every section concurrently and assemble what succeeded.
    pub async fn analyze(&self, req: &AnalysisRequest) -> Result<MatchAnalysis, RateLimitError> {
        let id = req.fixture_id;
        let standings = async {
            match (req.league_id, req.season) {
                (Some(league), Some(season)) => Some(
                    self.section(Section::Standings, || {
                        self.source.fetch_standings(league, season)
                    })
                    .await,
                ),
                _ => None,
            }
        };
        let (odds, injuries, lineups, standings) = tokio::join!(
            self.section(Section::Odds, || self.source.fetch_odds(id)),
            self.section(Section::Injuries, || self.source.fetch_injuries(id)),
            self.section(Section::Lineups, || self.source.fetch_lineups(id)),
            standings,
        );

        let mut degraded = Vec::new();
        let mut rate_limit = None;
        let odds = settle(Section::Odds, odds, &mut degraded, &mut rate_limit).flatten();
        let injuries = settle(Section::Injuries, injuries, &mut degraded, &mut rate_limit);
        let lineups = settle(Section::Lineups, lineups, &mut degraded, &mut rate_limit);
        let standings =
            standings.and_then(|r| settle(Section::Standings, r, &mut degraded, &mut rate_limit));

        if let Some(e) = rate_limit {
            warn!("Analysis of fixture {} aborted: {}", id, e);
            return Err(e);
        }
        if degraded.is_empty() {
            info!("Analysis of fixture {} complete", id);
        } else {
            warn!(
                "Analysis of fixture {} degraded: {}",
                id,
                degraded
                    .iter()
                    .map(|d| d.section.name())
                    .collect::<Vec<_>>()
                    .join(", ")
            );
        }
        Ok(MatchAnalysis {
            fixture_id: id,
            odds,
            injuries,
            lineups,
            standings,
            degraded,
            fetched_at: Utc::now(),
        })
    }

    /// One section: budget, then a timed attempt, retried per policy.
    async fn section<T, F, Fut>(&self, section: Section, fetch: F) -> Result<T, ExternalSourceError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, ExternalSourceError>>,
    {
        let label = format!("{} {}", self.source.name(), section.name());
        let timeout = self.policy.attempt_timeout;
        retry::with_backoff(&self.policy, &label, || {
            let budget = &self.budget;
            let source_name = self.source.name();
            let attempt = fetch();
            async move {
                budget.check_and_increment().await?;
                match tokio::time::timeout(timeout, attempt).await {
                    Ok(result) => result,
                    Err(_) => Err(ExternalSourceError::Timeout {
                        source_name: source_name.to_string(),
                        after: timeout,
                    }),
                }
            }
        })
        .await
    }
}

fn settle<T>(
    section: Section,
    result: Result<T, ExternalSourceError>,
    degraded: &mut Vec<DegradedSection>,
    rate_limit: &mut Option<RateLimitError>,
) -> Option<T> {
    match result {
        Ok(v) => Some(v),
        Err(ExternalSourceError::RateLimited(e)) => {
            rate_limit.get_or_insert(e);
            None
        }
        Err(e) => {
            degraded.push(DegradedSection {
                section,
                reason: e.to_string(),
            });
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCounterStore;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    #[derive(Clone, Copy)]
    enum Behaviour {
        Healthy,
        FailTimes(u32),
        NotFound,
        Hang,
        RateLimited,
    }

    /// Scripted data source counting calls per section.
    struct FakeSource {
        behaviour: HashMap<&'static str, Behaviour>,
        calls: Mutex<HashMap<&'static str, u32>>,
        total: AtomicU32,
    }

    impl FakeSource {
        fn new(overrides: &[(&'static str, Behaviour)]) -> Self {
            FakeSource {
                behaviour: overrides.iter().copied().collect(),
                calls: Mutex::new(HashMap::new()),
                total: AtomicU32::new(0),
            }
        }

        fn calls(&self, section: &'static str) -> u32 {
            self.calls.lock().unwrap().get(section).copied().unwrap_or(0)
        }

        async fn run<T>(&self, section: &'static str, value: T) -> Result<T, ExternalSourceError> {
            self.total.fetch_add(1, Ordering::SeqCst);
            let n = {
                let mut calls = self.calls.lock().unwrap();
                let n = calls.entry(section).or_insert(0);
                *n += 1;
                *n
            };
            match self.behaviour.get(section).copied().unwrap_or(Behaviour::Healthy) {
                Behaviour::Healthy => Ok(value),
                Behaviour::FailTimes(k) if n <= k => Err(ExternalSourceError::Transport {
                    source_name: "fake".into(),
                    reason: "connection reset".into(),
                }),
                Behaviour::FailTimes(_) => Ok(value),
                Behaviour::NotFound => Err(ExternalSourceError::Http {
                    source_name: "fake".into(),
                    status: 404,
                }),
                Behaviour::Hang => {
                    tokio::time::sleep(Duration::from_secs(60)).await;
                    Ok(value)
                }
                Behaviour::RateLimited => Err(RateLimitError {
                    source_name: "fake".into(),
                    retry_after: Duration::from_secs(30),
                }
                .into()),
            }
        }
    }

    #[async_trait]
    impl FootballDataSource for FakeSource {
        async fn fetch_odds(&self, _fixture_id: i64) -> Result<Option<OddsSnapshot>, ExternalSourceError> {
            let odds = OddsSnapshot::new("fake", 2.0, 3.5, 4.0)?;
            self.run("odds", Some(odds)).await
        }
        async fn fetch_injuries(&self, _fixture_id: i64) -> Result<Vec<Injury>, ExternalSourceError> {
            self.run("injuries", vec![]).await
        }
        async fn fetch_lineups(&self, _fixture_id: i64) -> Result<Vec<TeamLineup>, ExternalSourceError> {
            self.run("lineups", vec![]).await
        }
        async fn fetch_standings(
            &self,
            _league_id: i64,
            _season: i32,
        ) -> Result<Vec<StandingRow>, ExternalSourceError> {
            self.run("standings", vec![]).await
        }
        fn name(&self) -> &str {
            "fake"
        }
    }

    fn policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
            attempt_timeout: Duration::from_millis(50),
        }
    }

    fn analyzer(source: Arc<FakeSource>, limit: u64) -> MatchAnalyzer {
        let budget = BudgetGuard::new(Arc::new(MemoryCounterStore::new()), limit);
        MatchAnalyzer::new(source, budget, policy())
    }

    fn full_request() -> AnalysisRequest {
        AnalysisRequest {
            fixture_id: 1035,
            league_id: Some(78),
            season: Some(2025),
        }
    }

    #[tokio::test]
    async fn all_sections_present_when_provider_is_healthy() {
        let source = Arc::new(FakeSource::new(&[]));
        let analysis = analyzer(source.clone(), 100).analyze(&full_request()).await.unwrap();
        assert!(analysis.is_complete());
        assert!(analysis.odds.is_some());
        assert!(analysis.injuries.is_some());
        assert!(analysis.lineups.is_some());
        assert!(analysis.standings.is_some());
        assert_eq!(source.total.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn standings_skipped_without_league() {
        let source = Arc::new(FakeSource::new(&[]));
        let req = AnalysisRequest {
            fixture_id: 1,
            league_id: None,
            season: None,
        };
        let analysis = analyzer(source.clone(), 100).analyze(&req).await.unwrap();
        assert!(analysis.standings.is_none());
        assert!(analysis.is_complete());
        assert_eq!(source.calls("standings"), 0);
    }

    #[tokio::test]
    async fn failing_section_is_degraded_not_fatal() {
        let source = Arc::new(FakeSource::new(&[
            ("injuries", Behaviour::NotFound),
            ("lineups", Behaviour::Hang),
        ]));
        let analysis = analyzer(source.clone(), 100).analyze(&full_request()).await.unwrap();
        assert!(analysis.odds.is_some());
        assert!(analysis.injuries.is_none());
        assert!(analysis.lineups.is_none());
        let sections: Vec<Section> = analysis.degraded.iter().map(|d| d.section).collect();
        assert_eq!(sections, vec![Section::Injuries, Section::Lineups]);
        // 404 is not retried, the timeout is
        assert_eq!(source.calls("injuries"), 1);
        assert_eq!(source.calls("lineups"), 3);
    }

    #[tokio::test]
    async fn transient_failures_are_retried() {
        let source = Arc::new(FakeSource::new(&[("odds", Behaviour::FailTimes(2))]));
        let analysis = analyzer(source.clone(), 100).analyze(&full_request()).await.unwrap();
        assert!(analysis.odds.is_some());
        assert!(analysis.is_complete());
        assert_eq!(source.calls("odds"), 3);
    }

    #[tokio::test]
    async fn rate_limit_is_propagated() {
        let source = Arc::new(FakeSource::new(&[("standings", Behaviour::RateLimited)]));
        let err = analyzer(source.clone(), 100)
            .analyze(&full_request())
            .await
            .unwrap_err();
        assert_eq!(err.retry_after, Duration::from_secs(30));
        assert_eq!(source.calls("standings"), 1);
    }

    #[tokio::test]
    async fn exhausted_budget_skips_provider_calls() {
        let source = Arc::new(FakeSource::new(&[]));
        let analysis = analyzer(source.clone(), 2).analyze(&full_request()).await.unwrap();
        assert_eq!(source.total.load(Ordering::SeqCst), 2);
        assert_eq!(analysis.degraded.len(), 2);
        assert!(analysis
            .degraded
            .iter()
            .all(|d| d.reason.contains("budget exhausted")));
    }
}
