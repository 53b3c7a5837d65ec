pub mod engine;
pub mod quota;
pub mod streak;

pub use engine::{PointsBreakdown, ScoringEngine, ScoringReport};
pub use quota::{quotas_in_range, LinearRarity, OutcomeDistribution, QuotaStrategy};
pub use streak::{ScoreClass, StreakState};
