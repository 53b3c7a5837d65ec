use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::db::models::{Match, MatchStatus, Outcome, Prediction, Quotas};
use crate::db::Database;
use crate::error::{CoreError, Result, ValidationError};
use crate::leaderboard::LeaderboardAggregator;

use super::quota::QuotaStrategy;

pub const EXACT_SCORE_BONUS: i32 = 3;
pub const GOAL_DIFF_BONUS: i32 = 1;

/// Points awarded to one prediction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PointsBreakdown {
    pub tendency_points: i32,
    pub goal_diff_bonus: i32,
    pub exact_score_bonus: i32,
    pub total_points: i32,
}

impl PointsBreakdown {
    pub fn zero() -> Self {
        PointsBreakdown {
            tendency_points: 0,
            goal_diff_bonus: 0,
            exact_score_bonus: 0,
            total_points: 0,
        }
    }
}

/// Score a single guess against the final result and the locked quotas.
///
/// Tendency pays the quota of the actual outcome; a matching goal difference
/// adds 1 and an exact score adds 3 on top (an exact hit always carries the
/// goal-difference bonus too, so the maximum is quota + 4).
pub fn score_prediction(
    predicted_home: i32,
    predicted_away: i32,
    predicted_result: Outcome,
    actual_home: i32,
    actual_away: i32,
    quotas: &Quotas,
) -> PointsBreakdown {
    let actual = Outcome::from_score(actual_home, actual_away);
    let tendency_points = if predicted_result == actual {
        quotas.for_outcome(actual)
    } else {
        0
    };
    let exact_score_bonus = if predicted_home == actual_home && predicted_away == actual_away {
        EXACT_SCORE_BONUS
    } else {
        0
    };
    let goal_diff_bonus = if predicted_home - predicted_away == actual_home - actual_away {
        GOAL_DIFF_BONUS
    } else {
        0
    };
    PointsBreakdown {
        tendency_points,
        goal_diff_bonus,
        exact_score_bonus,
        total_points: tendency_points + goal_diff_bonus + exact_score_bonus,
    }
}

/// Outcome of scoring one match.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoringReport {
    pub match_id: String,
    pub scored: usize,
    /// Predictions another job settled first (CAS lost)
    pub already_scored: usize,
    pub failed: usize,
}

/// Locks quotas before kickoff and settles predictions once a match is final.
#[derive(Clone)]
pub struct ScoringEngine {
    db: Database,
    strategy: Arc<dyn QuotaStrategy>,
    leaderboard: LeaderboardAggregator,
}

impl ScoringEngine {
    pub fn new(
        db: Database,
        strategy: Arc<dyn QuotaStrategy>,
        leaderboard: LeaderboardAggregator,
    ) -> Self {
        ScoringEngine {
            db,
            strategy,
            leaderboard,
        }
    }

    // ── Quotas ────────────────────────────────────────────────────────────────

    pub fn lock_quotas(&self, match_id: &str) -> Result<Quotas> {
        self.db
            .lock_match_quotas(match_id, self.strategy.as_ref(), Utc::now())
    }

    /// Lock quotas for every match kicking off within `lead`, and for any
    /// match whose kickoff passed before a sweep reached it.
    /// Returns how many matches were locked.
    pub fn lock_due_quotas(&self, lead: Duration) -> Result<usize> {
        let due = self.db.list_matches_awaiting_quotas(Utc::now() + lead)?;
        let mut locked = 0;
        for match_id in due {
            match self.lock_quotas(&match_id) {
                Ok(q) => {
                    locked += 1;
                    info!(
                        "Quotas locked for {}: H={} D={} A={}",
                        match_id, q.home, q.draw, q.away
                    );
                }
                Err(e) => warn!("Failed to lock quotas for {}: {}", match_id, e),
            }
        }
        Ok(locked)
    }

    // ── Scoring ───────────────────────────────────────────────────────────────

    /// Score every pending prediction of a finished match. Quotas a sweep
    /// never reached are locked first.
    ///
    /// Each prediction is settled in its own transaction; one failing does not
    /// stop the others. Re-running on a scored match is a no-op.
    pub async fn score_match(&self, match_id: &str) -> Result<ScoringReport> {
        let m = self
            .db
            .get_match(match_id)?
            .ok_or_else(|| CoreError::NotFound {
                entity: "match",
                id: match_id.to_string(),
            })?;
        let (home, away) = scorable_parts(&m)?;
        let quotas = match m.quotas {
            Some(q) => q,
            None => {
                warn!("Match {} finished without locked quotas, locking now", match_id);
                self.lock_quotas(match_id)?
            }
        };

        let mut report = ScoringReport {
            match_id: match_id.to_string(),
            ..Default::default()
        };
        for p in self.db.list_pending_predictions(match_id)? {
            let points = points_for(&p, home, away, &quotas);
            match self
                .db
                .apply_prediction_score(p.id, &p.model_id, &points, Utc::now())
            {
                Ok(true) => {
                    report.scored += 1;
                    debug!(
                        "Scored prediction {} ({}): {} pts",
                        p.id, p.model_id, points.total_points
                    );
                }
                Ok(false) => report.already_scored += 1,
                Err(e) => {
                    report.failed += 1;
                    error!(
                        "Failed to score prediction {} of {} on {}: {}",
                        p.id, p.model_id, match_id, e
                    );
                }
            }
        }

        if report.scored > 0 {
            self.invalidate_leaderboard().await;
        }
        info!(
            "Match {} {}-{} scored: {} new, {} already settled, {} failed",
            match_id, home, away, report.scored, report.already_scored, report.failed
        );
        Ok(report)
    }

    /// Score all finished matches that still have pending predictions.
    pub async fn score_finished_matches(&self) -> Result<Vec<ScoringReport>> {
        let ids = self.db.list_scorable_matches()?;
        let mut reports = Vec::with_capacity(ids.len());
        for match_id in ids {
            match self.score_match(&match_id).await {
                Ok(r) => reports.push(r),
                Err(e) => error!("Scoring match {} failed: {}", match_id, e),
            }
        }
        Ok(reports)
    }

    /// Void the pending predictions of a postponed or cancelled match.
    pub async fn void_match(&self, match_id: &str) -> Result<usize> {
        let m = self
            .db
            .get_match(match_id)?
            .ok_or_else(|| CoreError::NotFound {
                entity: "match",
                id: match_id.to_string(),
            })?;
        if !m.status.is_abandoned() {
            return Err(ValidationError::UnexpectedMatchStatus {
                match_id: match_id.to_string(),
                status: m.status.code().to_string(),
                expected: "postponed or cancelled",
            }
            .into());
        }
        let voided = self.db.void_pending_predictions(match_id, Utc::now())?;
        if voided > 0 {
            info!("Voided {} predictions for {} ({})", voided, match_id, m.status.code());
            self.invalidate_leaderboard().await;
        }
        Ok(voided)
    }

    async fn invalidate_leaderboard(&self) {
        if let Err(e) = self.leaderboard.invalidate().await {
            warn!("Leaderboard cache invalidation failed (ignored): {}", e);
        }
    }
}

fn points_for(p: &Prediction, home: i32, away: i32, quotas: &Quotas) -> PointsBreakdown {
    score_prediction(
        p.predicted_home,
        p.predicted_away,
        p.predicted_result,
        home,
        away,
        quotas,
    )
}

fn scorable_parts(m: &Match) -> Result<(i32, i32)> {
    let not_scorable = |reason: &str| {
        CoreError::from(ValidationError::MatchNotScorable {
            match_id: m.id.clone(),
            reason: reason.to_string(),
        })
    };
    if m.status != MatchStatus::Finished {
        return Err(not_scorable("match is not finished"));
    }
    m.final_score()
        .ok_or_else(|| not_scorable("final score missing"))
}
