//! Ranked per-model statistics over scored predictions.
//!
//! Results are cached in the counter store under a generation-stamped key.
//! Scoring bumps the generation, which orphans every cached variant at once;
//! orphans age out through their TTL. Any cache failure just means a direct
//! query.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::cache::{get_counter, CounterStore};
use crate::db::Database;
use crate::error::{Result, StoreError};

const GENERATION_KEY: &str = "leaderboard:generation";
const CACHE_TTL: Duration = Duration::from_secs(300);

/// Which predictions and models to include.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LeaderboardFilter {
    /// Match kickoff lower bound (inclusive)
    pub since: Option<DateTime<Utc>>,
    /// Match kickoff upper bound (exclusive)
    pub until: Option<DateTime<Utc>>,
    pub competition: Option<String>,
    #[serde(default)]
    pub active_only: bool,
    /// Minimum number of scored predictions to be listed
    pub min_predictions: Option<i64>,
}

/// Raw counters per model, as aggregated by the database.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelCounts {
    pub model_id: String,
    pub display_name: String,
    pub active: bool,
    pub total_predictions: i64,
    pub scored_predictions: i64,
    pub correct_tendencies: i64,
    pub exact_scores: i64,
    pub total_points: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    pub rank: usize,
    pub model_id: String,
    pub display_name: String,
    pub active: bool,
    pub total_predictions: i64,
    pub scored_predictions: i64,
    pub correct_tendencies: i64,
    pub exact_scores: i64,
    pub total_points: i64,
    pub avg_points: f64,
    /// Percent of scored predictions with the right tendency
    pub accuracy: f64,
    /// Percent of scored predictions with the exact score
    pub exact_accuracy: f64,
}

/// `round(100·num/den, 1)`, or 0 when there is nothing to divide by.
pub fn percentage(numerator: i64, denominator: i64) -> f64 {
    if denominator <= 0 {
        return 0.0;
    }
    (1000.0 * numerator as f64 / denominator as f64).round() / 10.0
}

fn average_points(total: i64, scored: i64) -> f64 {
    if scored <= 0 {
        return 0.0;
    }
    (100.0 * total as f64 / scored as f64).round() / 100.0
}

impl LeaderboardEntry {
    pub fn from_counts(c: ModelCounts) -> Self {
        LeaderboardEntry {
            rank: 0,
            avg_points: average_points(c.total_points, c.scored_predictions),
            accuracy: percentage(c.correct_tendencies, c.scored_predictions),
            exact_accuracy: percentage(c.exact_scores, c.scored_predictions),
            model_id: c.model_id,
            display_name: c.display_name,
            active: c.active,
            total_predictions: c.total_predictions,
            scored_predictions: c.scored_predictions,
            correct_tendencies: c.correct_tendencies,
            exact_scores: c.exact_scores,
            total_points: c.total_points,
        }
    }
}

/// Apply the minimum-predictions filter, sort and assign ranks.
///
/// Order: avg points desc, total points desc, total predictions desc, and
/// model id as a final stable tie-break.
pub fn rank_entries(counts: Vec<ModelCounts>, min_predictions: Option<i64>) -> Vec<LeaderboardEntry> {
    let min = min_predictions.unwrap_or(0);
    let mut entries: Vec<LeaderboardEntry> = counts
        .into_iter()
        .filter(|c| c.scored_predictions >= min)
        .map(LeaderboardEntry::from_counts)
        .collect();
    entries.sort_by(|a, b| {
        b.avg_points
            .total_cmp(&a.avg_points)
            .then_with(|| b.total_points.cmp(&a.total_points))
            .then_with(|| b.total_predictions.cmp(&a.total_predictions))
            .then_with(|| a.model_id.cmp(&b.model_id))
    });
    for (i, e) in entries.iter_mut().enumerate() {
        e.rank = i + 1;
    }
    entries
}

#[derive(Clone)]
pub struct LeaderboardAggregator {
    db: Database,
    cache: Arc<dyn CounterStore>,
}

impl LeaderboardAggregator {
    pub fn new(db: Database, cache: Arc<dyn CounterStore>) -> Self {
        LeaderboardAggregator { db, cache }
    }

    /// Ranked leaderboard, served from cache when possible.
    pub async fn leaderboard(&self, filter: &LeaderboardFilter) -> Result<Vec<LeaderboardEntry>> {
        let key = match self.cache_key(filter).await {
            Ok(k) => Some(k),
            Err(e) => {
                warn!("Leaderboard cache unavailable, querying directly: {}", e);
                None
            }
        };

        if let Some(key) = &key {
            match self.cache.get(key).await {
                Ok(Some(raw)) => match serde_json::from_str(&raw) {
                    Ok(entries) => {
                        debug!("Leaderboard cache hit: {}", key);
                        return Ok(entries);
                    }
                    Err(e) => warn!("Discarding unreadable leaderboard cache entry: {}", e),
                },
                Ok(None) => {}
                Err(e) => warn!("Leaderboard cache read failed: {}", e),
            }
        }

        let entries = self.compute(filter)?;
        if let Some(key) = &key {
            let raw = serde_json::to_string(&entries)?;
            if let Err(e) = self.cache.set_ex(key, &raw, CACHE_TTL).await {
                warn!("Leaderboard cache write failed: {}", e);
            }
        }
        Ok(entries)
    }

    /// Uncached aggregation straight from the database.
    pub fn compute(&self, filter: &LeaderboardFilter) -> Result<Vec<LeaderboardEntry>> {
        let counts = self.db.leaderboard_counts(filter)?;
        Ok(rank_entries(counts, filter.min_predictions))
    }

    /// Orphan all cached leaderboards. Best-effort: callers log the error
    /// and carry on.
    pub async fn invalidate(&self) -> std::result::Result<i64, StoreError> {
        let generation = self.cache.incr(GENERATION_KEY).await?;
        debug!("Leaderboard cache generation -> {}", generation);
        Ok(generation)
    }

    async fn cache_key(&self, filter: &LeaderboardFilter) -> std::result::Result<String, StoreError> {
        let generation = get_counter(self.cache.as_ref(), GENERATION_KEY)
            .await?
            .unwrap_or(0);
        let filter_json = serde_json::to_string(filter).map_err(|e| StoreError::Malformed {
            key: GENERATION_KEY.to_string(),
            reason: e.to_string(),
        })?;
        Ok(format!("leaderboard:{}:{}", generation, filter_json))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCounterStore;
    use crate::db::models::{MatchInput, NewPrediction};
    use crate::scoring::{LinearRarity, ScoringEngine};
    use approx::assert_relative_eq;
    use chrono::Duration as ChronoDuration;

    fn counts(id: &str, total: i64, scored: i64, correct: i64, exact: i64, points: i64) -> ModelCounts {
        ModelCounts {
            model_id: id.into(),
            display_name: id.into(),
            active: true,
            total_predictions: total,
            scored_predictions: scored,
            correct_tendencies: correct,
            exact_scores: exact,
            total_points: points,
        }
    }

    #[test]
    fn percentage_is_division_safe() {
        assert_relative_eq!(percentage(5, 0), 0.0);
        assert_relative_eq!(percentage(1, 3), 33.3);
        assert_relative_eq!(percentage(2, 3), 66.7);
        assert_relative_eq!(percentage(3, 3), 100.0);
    }

    #[test]
    fn entry_without_scored_predictions_has_zero_ratios() {
        let e = LeaderboardEntry::from_counts(counts("a", 4, 0, 0, 0, 0));
        assert_relative_eq!(e.accuracy, 0.0);
        assert_relative_eq!(e.exact_accuracy, 0.0);
        assert_relative_eq!(e.avg_points, 0.0);
    }

    #[test]
    fn ranking_uses_tie_break_chain() {
        let ranked = rank_entries(
            vec![
                counts("low", 10, 10, 3, 0, 10),
                counts("fewer", 5, 4, 4, 1, 20),
                counts("more", 12, 8, 6, 2, 40),
                counts("same_avg_more_total", 10, 10, 8, 3, 50),
                counts("tied", 14, 10, 8, 3, 50),
            ],
            None,
        );
        let order: Vec<&str> = ranked.iter().map(|e| e.model_id.as_str()).collect();
        // avg 5.0 for fewer/more/same_avg/tied, 1.0 for low
        assert_eq!(order, vec!["tied", "same_avg_more_total", "more", "fewer", "low"]);
        assert_eq!(ranked[0].rank, 1);
        assert_eq!(ranked[4].rank, 5);
    }

    #[test]
    fn min_predictions_filters_on_scored_count() {
        let ranked = rank_entries(
            vec![counts("a", 10, 2, 1, 0, 3), counts("b", 10, 6, 3, 1, 9)],
            Some(5),
        );
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].model_id, "b");
    }

    struct Fixture {
        db: Database,
        engine: ScoringEngine,
        board: LeaderboardAggregator,
    }

    fn fixture() -> Fixture {
        let db = Database::open_in_memory().unwrap();
        let board = LeaderboardAggregator::new(db.clone(), Arc::new(MemoryCounterStore::new()));
        let engine = ScoringEngine::new(db.clone(), Arc::new(LinearRarity), board.clone());
        for id in ["alpha", "beta"] {
            db.upsert_model(id, id).unwrap();
        }
        Fixture { db, engine, board }
    }

    async fn play(f: &Fixture, id: &str, competition: &str, picks: &[(&str, i32, i32)], result: (i32, i32)) {
        f.db.upsert_match(&MatchInput {
            id: id.into(),
            competition: competition.into(),
            home_team: "H".into(),
            away_team: "A".into(),
            kickoff: Utc::now() + ChronoDuration::hours(2),
        })
        .unwrap();
        for (model, h, a) in picks {
            f.db.upsert_prediction(
                &NewPrediction {
                    match_id: id.into(),
                    model_id: model.to_string(),
                    predicted_home: *h,
                    predicted_away: *a,
                },
                Utc::now(),
            )
            .unwrap();
        }
        f.engine.lock_quotas(id).unwrap();
        f.db.record_match_result(id, result.0, result.1).unwrap();
        f.engine.score_match(id).await.unwrap();
    }

    #[tokio::test]
    async fn aggregates_scored_predictions_per_model() {
        let f = fixture();
        // quotas: H=4 (1 of 2), A=4 (1 of 2), D=6
        play(&f, "m1", "bl1", &[("alpha", 2, 1), ("beta", 0, 1)], (2, 1)).await;
        play(&f, "m2", "bl1", &[("alpha", 1, 1), ("beta", 1, 1)], (0, 2)).await;

        let board = f.board.leaderboard(&LeaderboardFilter::default()).await.unwrap();
        assert_eq!(board.len(), 2);
        let alpha = &board[0];
        assert_eq!(alpha.model_id, "alpha");
        assert_eq!(alpha.total_predictions, 2);
        assert_eq!(alpha.scored_predictions, 2);
        assert_eq!(alpha.correct_tendencies, 1);
        assert_eq!(alpha.exact_scores, 1);
        assert_eq!(alpha.total_points, 8);
        assert_relative_eq!(alpha.avg_points, 4.0);
        assert_relative_eq!(alpha.accuracy, 50.0);
        assert_relative_eq!(alpha.exact_accuracy, 50.0);

        let beta = &board[1];
        assert_eq!(beta.total_points, 0);
        assert_relative_eq!(beta.accuracy, 0.0);
    }

    #[tokio::test]
    async fn scoring_invalidates_cached_board() {
        let f = fixture();
        play(&f, "m1", "bl1", &[("alpha", 1, 0)], (1, 0)).await;
        let before = f.board.leaderboard(&LeaderboardFilter::default()).await.unwrap();
        assert_eq!(before[0].scored_predictions, 1);

        play(&f, "m2", "bl1", &[("alpha", 1, 0)], (1, 0)).await;
        let after = f.board.leaderboard(&LeaderboardFilter::default()).await.unwrap();
        assert_eq!(after[0].scored_predictions, 2);
    }

    #[tokio::test]
    async fn filters_by_competition_and_activity() {
        let f = fixture();
        play(&f, "m1", "bl1", &[("alpha", 1, 0), ("beta", 1, 0)], (1, 0)).await;
        play(&f, "m2", "pl", &[("alpha", 0, 0)], (1, 0)).await;

        let pl = f
            .board
            .leaderboard(&LeaderboardFilter {
                competition: Some("pl".into()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(pl.len(), 1);
        assert_eq!(pl[0].model_id, "alpha");
        assert_eq!(pl[0].total_points, 0);

        f.db.set_model_active("beta", false).unwrap();
        let active = f
            .board
            .compute(&LeaderboardFilter {
                active_only: true,
                ..Default::default()
            })
            .unwrap();
        assert!(active.iter().all(|e| e.model_id != "beta"));

        let future_only = f
            .board
            .compute(&LeaderboardFilter {
                since: Some(Utc::now() + ChronoDuration::days(3)),
                ..Default::default()
            })
            .unwrap();
        assert!(future_only.is_empty());
    }

    #[tokio::test]
    async fn pending_guesses_stay_off_the_board() {
        let f = fixture();
        play(&f, "m1", "bl1", &[("alpha", 1, 0)], (1, 0)).await;
        f.db.upsert_match(&MatchInput {
            id: "m2".into(),
            competition: "bl1".into(),
            home_team: "H".into(),
            away_team: "A".into(),
            kickoff: Utc::now() + ChronoDuration::hours(2),
        })
        .unwrap();
        for model in ["alpha", "beta"] {
            f.db.upsert_prediction(
                &NewPrediction {
                    match_id: "m2".into(),
                    model_id: model.into(),
                    predicted_home: 0,
                    predicted_away: 0,
                },
                Utc::now(),
            )
            .unwrap();
        }

        let board = f.board.compute(&LeaderboardFilter::default()).unwrap();
        assert_eq!(board.len(), 1);
        assert_eq!(board[0].model_id, "alpha");
        assert_eq!(board[0].total_predictions, 1);
        assert_eq!(board[0].scored_predictions, 1);
    }

    #[tokio::test]
    async fn rescoring_does_not_double_count() {
        let f = fixture();
        play(&f, "m1", "bl1", &[("alpha", 1, 0)], (1, 0)).await;
        f.engine.score_match("m1").await.unwrap();
        let board = f.board.compute(&LeaderboardFilter::default()).unwrap();
        assert_eq!(board[0].scored_predictions, 1);
    }
}
