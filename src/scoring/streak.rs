//! Per-model streak state machine.
//!
//! A positive `current` counts consecutive correct tendencies, a negative one
//! consecutive misses. The transition itself is pure; the database applies
//! it inside the same IMMEDIATE transaction that flips the prediction to
//! `scored`, so concurrent scoring of two matches for one model cannot lose
//! an update.

use serde::{Deserialize, Serialize};

use crate::db::models::{Model, StreakType};
use super::engine::PointsBreakdown;

/// Quality class of one scored prediction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScoreClass {
    Exact,
    Tendency,
    Wrong,
}

impl ScoreClass {
    pub fn from_breakdown(points: &PointsBreakdown) -> Self {
        if points.tendency_points == 0 {
            ScoreClass::Wrong
        } else if points.exact_score_bonus > 0 {
            ScoreClass::Exact
        } else {
            ScoreClass::Tendency
        }
    }
}

/// Streak columns of a model row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StreakState {
    pub current: i64,
    pub current_type: StreakType,
    /// Consecutive exact hits ending at the latest event
    pub exact_run: i64,
    pub best: i64,
    pub worst: i64,
    pub best_exact: i64,
    pub best_tendency: i64,
}

impl StreakState {
    pub fn of_model(model: &Model) -> Self {
        StreakState {
            current: model.current_streak,
            current_type: model.current_streak_type,
            exact_run: model.current_exact_streak,
            best: model.best_streak,
            worst: model.worst_streak,
            best_exact: model.best_exact_streak,
            best_tendency: model.best_tendency_streak,
        }
    }

    /// Fold one scoring event into the state.
    pub fn apply(self, class: ScoreClass) -> StreakState {
        let mut next = self;
        match class {
            ScoreClass::Wrong => {
                next.current = if self.current < 0 { self.current - 1 } else { -1 };
                next.current_type = StreakType::None;
                next.exact_run = 0;
                next.worst = self.worst.min(next.current);
            }
            ScoreClass::Exact | ScoreClass::Tendency => {
                let continuing = self.current > 0;
                next.current = if continuing { self.current + 1 } else { 1 };
                // quality of a running streak only ever improves
                next.current_type = match class {
                    ScoreClass::Exact => StreakType::Exact,
                    _ if continuing && self.current_type == StreakType::Exact => StreakType::Exact,
                    _ => StreakType::Tendency,
                };
                next.best = self.best.max(next.current);
                next.best_tendency = self.best_tendency.max(next.current);
                if class == ScoreClass::Exact {
                    next.exact_run = self.exact_run + 1;
                    next.best_exact = self.best_exact.max(next.exact_run);
                } else {
                    next.exact_run = 0;
                }
            }
        }
        next
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(events: &[ScoreClass]) -> StreakState {
        events
            .iter()
            .fold(StreakState::default(), |s, e| s.apply(*e))
    }

    #[test]
    fn wrong_starts_and_extends_losing_run() {
        let s = run(&[ScoreClass::Wrong]);
        assert_eq!(s.current, -1);
        assert_eq!(s.worst, -1);
        let s = s.apply(ScoreClass::Wrong).apply(ScoreClass::Wrong);
        assert_eq!(s.current, -3);
        assert_eq!(s.worst, -3);
        assert_eq!(s.current_type, StreakType::None);
    }

    #[test]
    fn correct_after_losses_restarts_at_one() {
        let s = run(&[ScoreClass::Wrong, ScoreClass::Wrong, ScoreClass::Tendency]);
        assert_eq!(s.current, 1);
        assert_eq!(s.current_type, StreakType::Tendency);
        assert_eq!(s.worst, -2);
        assert_eq!(s.best, 1);
    }

    #[test]
    fn streak_type_never_downgrades_while_positive() {
        let s = run(&[ScoreClass::Exact, ScoreClass::Tendency, ScoreClass::Tendency]);
        assert_eq!(s.current, 3);
        assert_eq!(s.current_type, StreakType::Exact);
        assert_eq!(s.exact_run, 0);
        assert_eq!(s.best_exact, 1);
    }

    #[test]
    fn tendency_run_upgrades_on_exact() {
        let s = run(&[ScoreClass::Tendency, ScoreClass::Exact]);
        assert_eq!(s.current_type, StreakType::Exact);
        assert_eq!(s.current, 2);
    }

    #[test]
    fn exact_type_resets_after_a_miss() {
        let s = run(&[ScoreClass::Exact, ScoreClass::Wrong, ScoreClass::Tendency]);
        assert_eq!(s.current, 1);
        assert_eq!(s.current_type, StreakType::Tendency);
    }

    #[test]
    fn consecutive_exact_hits_tracked_separately() {
        let s = run(&[
            ScoreClass::Exact,
            ScoreClass::Exact,
            ScoreClass::Tendency,
            ScoreClass::Exact,
        ]);
        assert_eq!(s.current, 4);
        assert_eq!(s.exact_run, 1);
        assert_eq!(s.best_exact, 2);
        assert_eq!(s.best, 4);
        assert_eq!(s.best_tendency, 4);
    }

    #[test]
    fn best_and_worst_are_retained_across_runs() {
        let s = run(&[
            ScoreClass::Tendency,
            ScoreClass::Tendency,
            ScoreClass::Tendency,
            ScoreClass::Wrong,
            ScoreClass::Tendency,
        ]);
        assert_eq!(s.current, 1);
        assert_eq!(s.best, 3);
        assert_eq!(s.worst, -1);
    }

    #[test]
    fn magnitude_matches_trailing_same_class_run() {
        let events = [
            ScoreClass::Tendency,
            ScoreClass::Wrong,
            ScoreClass::Exact,
            ScoreClass::Tendency,
            ScoreClass::Wrong,
            ScoreClass::Wrong,
            ScoreClass::Exact,
            ScoreClass::Tendency,
            ScoreClass::Exact,
        ];
        for end in 1..=events.len() {
            let prefix = &events[..end];
            let s = run(prefix);
            let last_correct = prefix[end - 1] != ScoreClass::Wrong;
            let trailing = prefix
                .iter()
                .rev()
                .take_while(|e| (**e != ScoreClass::Wrong) == last_correct)
                .count() as i64;
            let expected = if last_correct { trailing } else { -trailing };
            assert_eq!(s.current, expected, "after {:?}", prefix);
        }
    }

    #[test]
    fn classification_from_breakdown() {
        let exact = PointsBreakdown {
            tendency_points: 4,
            goal_diff_bonus: 1,
            exact_score_bonus: 3,
            total_points: 8,
        };
        assert_eq!(ScoreClass::from_breakdown(&exact), ScoreClass::Exact);
        let wrong = PointsBreakdown::zero();
        assert_eq!(ScoreClass::from_breakdown(&wrong), ScoreClass::Wrong);
    }
}
