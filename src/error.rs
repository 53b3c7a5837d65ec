use chrono::{DateTime, Utc};
use std::time::Duration;
use thiserror::Error;

use crate::db::models::Quotas;

/// Inputs rejected before anything is persisted.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("score {home}-{away} out of range (0..={max})")]
    ScoreOutOfRange { home: i32, away: i32, max: i32 },

    #[error("kickoff {kickoff} outside accepted range")]
    KickoffOutOfRange { kickoff: DateTime<Utc> },

    #[error("prediction for match {match_id} submitted after kickoff ({kickoff})")]
    PredictionAfterKickoff {
        match_id: String,
        kickoff: DateTime<Utc>,
    },

    #[error("match {match_id} already has locked quotas, predictions are closed")]
    PredictionAfterQuotaLock { match_id: String },

    #[error("quota strategy {strategy} produced {quotas:?}, outside 2..=6")]
    QuotaOutOfRange { strategy: String, quotas: Quotas },

    #[error("match {match_id} is not scorable: {reason}")]
    MatchNotScorable { match_id: String, reason: String },

    #[error("match {match_id} is {status}, expected {expected}")]
    UnexpectedMatchStatus {
        match_id: String,
        status: String,
        expected: &'static str,
    },

    #[error("odds {value} for {outcome} out of range (must be > 1.0)")]
    OddsOutOfRange { outcome: &'static str, value: f64 },

    #[error("unknown {field} code '{value}'")]
    UnknownCode { field: &'static str, value: String },

    #[error("prediction of {model_id} for match {match_id} is already settled")]
    PredictionSettled { match_id: String, model_id: String },

    #[error("{field} must not be empty")]
    Empty { field: &'static str },
}

/// The daily provider budget is used up. Non-fatal: defer the call.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("daily API budget exhausted ({used}/{limit}), resets at {reset_time}")]
pub struct BudgetExceededError {
    pub used: u64,
    pub limit: u64,
    pub reset_time: DateTime<Utc>,
}

/// Provider asked us to back off. Re-thrown to the caller's backoff layer.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{source_name} rate limited, retry after {retry_after:?}")]
pub struct RateLimitError {
    pub source_name: String,
    pub retry_after: Duration,
}

/// Failure of a single external data fetch.
#[derive(Error, Debug)]
pub enum ExternalSourceError {
    #[error(transparent)]
    RateLimited(#[from] RateLimitError),

    #[error(transparent)]
    Budget(#[from] BudgetExceededError),

    #[error("{source_name} timed out after {after:?}")]
    Timeout { source_name: String, after: Duration },

    #[error("{source_name} returned HTTP {status}")]
    Http { source_name: String, status: u16 },

    #[error("{source_name} request failed: {reason}")]
    Transport { source_name: String, reason: String },

    #[error("{source_name} payload could not be parsed: {reason}")]
    Parse { source_name: String, reason: String },

    #[error(transparent)]
    Invalid(#[from] ValidationError),
}

impl ExternalSourceError {
    /// Whether another attempt may succeed without outside intervention.
    pub fn is_retriable(&self) -> bool {
        match self {
            ExternalSourceError::Timeout { .. } | ExternalSourceError::Transport { .. } => true,
            ExternalSourceError::Http { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

/// Counter/cache store failures. Callers decide whether to fail open.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("counter store unavailable: {0}")]
    Unavailable(String),

    #[error("counter store timed out after {0:?}")]
    Timeout(Duration),

    #[error("counter store returned malformed value for {key}: {reason}")]
    Malformed { key: String, reason: String },
}

impl From<redis::RedisError> for StoreError {
    fn from(e: redis::RedisError) -> Self {
        StoreError::Unavailable(e.to_string())
    }
}

/// Top-level error for persistence-backed operations.
#[derive(Error, Debug)]
pub enum CoreError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("{entity} '{id}' not found")]
    NotFound { entity: &'static str, id: String },

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("database stayed busy after {attempts} attempts")]
    Contention { attempts: u32 },

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T, E = CoreError> = std::result::Result<T, E>;
