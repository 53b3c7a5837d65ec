use chrono::{DateTime, Utc};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Match outcome / tendency: home win, draw, away win.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Outcome {
    #[serde(rename = "H")]
    Home,
    #[serde(rename = "D")]
    Draw,
    #[serde(rename = "A")]
    Away,
}

impl Outcome {
    /// Derive the tendency from a scoreline.
    pub fn from_score(home: i32, away: i32) -> Self {
        match home.cmp(&away) {
            std::cmp::Ordering::Greater => Outcome::Home,
            std::cmp::Ordering::Less => Outcome::Away,
            std::cmp::Ordering::Equal => Outcome::Draw,
        }
    }

    pub fn code(self) -> &'static str {
        match self {
            Outcome::Home => "H",
            Outcome::Draw => "D",
            Outcome::Away => "A",
        }
    }

    pub fn parse(s: &str) -> Result<Self, ValidationError> {
        match s {
            "H" => Ok(Outcome::Home),
            "D" => Ok(Outcome::Draw),
            "A" => Ok(Outcome::Away),
            other => Err(ValidationError::UnknownCode {
                field: "outcome",
                value: other.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStatus {
    Scheduled,
    Live,
    Finished,
    Postponed,
    Cancelled,
}

impl MatchStatus {
    pub fn code(self) -> &'static str {
        match self {
            MatchStatus::Scheduled => "scheduled",
            MatchStatus::Live => "live",
            MatchStatus::Finished => "finished",
            MatchStatus::Postponed => "postponed",
            MatchStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Result<Self, ValidationError> {
        match s {
            "scheduled" => Ok(MatchStatus::Scheduled),
            "live" => Ok(MatchStatus::Live),
            "finished" => Ok(MatchStatus::Finished),
            "postponed" => Ok(MatchStatus::Postponed),
            "cancelled" => Ok(MatchStatus::Cancelled),
            other => Err(ValidationError::UnknownCode {
                field: "match status",
                value: other.to_string(),
            }),
        }
    }

    /// Postponed and cancelled matches will never be scored.
    pub fn is_abandoned(self) -> bool {
        matches!(self, MatchStatus::Postponed | MatchStatus::Cancelled)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PredictionStatus {
    Pending,
    Scored,
    Void,
}

impl PredictionStatus {
    pub fn code(self) -> &'static str {
        match self {
            PredictionStatus::Pending => "pending",
            PredictionStatus::Scored => "scored",
            PredictionStatus::Void => "void",
        }
    }

    pub fn parse(s: &str) -> Result<Self, ValidationError> {
        match s {
            "pending" => Ok(PredictionStatus::Pending),
            "scored" => Ok(PredictionStatus::Scored),
            "void" => Ok(PredictionStatus::Void),
            other => Err(ValidationError::UnknownCode {
                field: "prediction status",
                value: other.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreakType {
    #[default]
    None,
    Tendency,
    Exact,
}

impl StreakType {
    pub fn code(self) -> &'static str {
        match self {
            StreakType::None => "none",
            StreakType::Tendency => "tendency",
            StreakType::Exact => "exact",
        }
    }

    pub fn parse(s: &str) -> Result<Self, ValidationError> {
        match s {
            "none" => Ok(StreakType::None),
            "tendency" => Ok(StreakType::Tendency),
            "exact" => Ok(StreakType::Exact),
            other => Err(ValidationError::UnknownCode {
                field: "streak type",
                value: other.to_string(),
            }),
        }
    }
}

macro_rules! sql_code_enum {
    ($ty:ty) => {
        impl ToSql for $ty {
            fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
                Ok(ToSqlOutput::from(self.code()))
            }
        }

        impl FromSql for $ty {
            fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
                let s = value.as_str()?;
                <$ty>::parse(s).map_err(|e| FromSqlError::Other(Box::new(e)))
            }
        }
    };
}

sql_code_enum!(Outcome);
sql_code_enum!(MatchStatus);
sql_code_enum!(PredictionStatus);
sql_code_enum!(StreakType);

/// Per-outcome point values, fixed once per match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quotas {
    pub home: i32,
    pub draw: i32,
    pub away: i32,
}

impl Quotas {
    pub fn for_outcome(&self, outcome: Outcome) -> i32 {
        match outcome {
            Outcome::Home => self.home,
            Outcome::Draw => self.draw,
            Outcome::Away => self.away,
        }
    }
}

/// A football match as ingested from the fixture feed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Match {
    pub id: String,
    pub competition: String,
    pub home_team: String,
    pub away_team: String,
    pub kickoff: DateTime<Utc>,
    pub home_score: Option<i32>,
    pub away_score: Option<i32>,
    pub status: MatchStatus,
    /// `None` until locked before kickoff
    pub quotas: Option<Quotas>,
    pub quotas_locked_at: Option<DateTime<Utc>>,
}

impl Match {
    pub fn final_score(&self) -> Option<(i32, i32)> {
        Some((self.home_score?, self.away_score?))
    }
}

/// One model's guess for one match.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Prediction {
    pub id: i64,
    pub match_id: String,
    pub model_id: String,
    pub predicted_home: i32,
    pub predicted_away: i32,
    pub predicted_result: Outcome,
    pub tendency_points: Option<i32>,
    pub goal_diff_bonus: Option<i32>,
    pub exact_score_bonus: Option<i32>,
    pub total_points: Option<i32>,
    pub status: PredictionStatus,
    pub created_at: DateTime<Utc>,
    pub scored_at: Option<DateTime<Utc>>,
}

/// Input for recording a prediction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewPrediction {
    pub match_id: String,
    pub model_id: String,
    pub predicted_home: i32,
    pub predicted_away: i32,
}

/// A competing prediction model with its health and streak columns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Model {
    pub id: String,
    pub display_name: String,
    pub active: bool,
    pub auto_disabled: bool,
    pub consecutive_failures: i64,
    pub last_failure_at: Option<DateTime<Utc>>,
    pub last_success_at: Option<DateTime<Utc>>,
    pub failure_reason: Option<String>,
    pub current_streak: i64,
    pub current_streak_type: StreakType,
    pub current_exact_streak: i64,
    pub best_streak: i64,
    pub worst_streak: i64,
    pub best_exact_streak: i64,
    pub best_tendency_streak: i64,
}

/// Fixture data accepted at ingestion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchInput {
    pub id: String,
    pub competition: String,
    pub home_team: String,
    pub away_team: String,
    pub kickoff: DateTime<Utc>,
}

impl MatchInput {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.id.trim().is_empty() {
            return Err(ValidationError::Empty { field: "match id" });
        }
        if self.competition.trim().is_empty() {
            return Err(ValidationError::Empty { field: "competition" });
        }
        let year = chrono::Datelike::year(&self.kickoff);
        if !(2000..=2100).contains(&year) {
            return Err(ValidationError::KickoffOutOfRange {
                kickoff: self.kickoff,
            });
        }
        Ok(())
    }
}

/// Highest goal count accepted for a predicted or final score.
pub const MAX_GOALS: i32 = 30;

pub fn validate_score(home: i32, away: i32) -> Result<(), ValidationError> {
    if !(0..=MAX_GOALS).contains(&home) || !(0..=MAX_GOALS).contains(&away) {
        return Err(ValidationError::ScoreOutOfRange {
            home,
            away,
            max: MAX_GOALS,
        });
    }
    Ok(())
}
