use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Transaction, TransactionBehavior};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::runtime::{Handle, RuntimeFlavor};
use tracing::{debug, warn};

use crate::error::{CoreError, Result, ValidationError};
use crate::leaderboard::{LeaderboardFilter, ModelCounts};
use crate::scoring::{
    quotas_in_range, OutcomeDistribution, PointsBreakdown, QuotaStrategy, ScoreClass, StreakState,
};

pub mod models;
use models::*;

/// Attempts for an IMMEDIATE transaction that keeps hitting SQLITE_BUSY.
const MAX_TX_ATTEMPTS: u32 = 5;

/// Thread-safe SQLite handle (single connection with mutex)
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open (or create) the SQLite database at the given path
    pub fn open(path: &str) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
        Self::init(conn)
    }

    /// Private in-memory database, used by tests and dry runs.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.busy_timeout(Duration::from_secs(5))?;
        let db = Database {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.run_migrations()?;
        Ok(db)
    }

    /// Run schema migrations (idempotent)
    fn run_migrations(&self) -> Result<()> {
        self.conn().execute_batch(SCHEMA_SQL)?;
        Ok(())
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        // a panic while holding the lock leaves the connection itself usable
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Run `f` inside an IMMEDIATE transaction, which takes the write lock
    /// up front and is serializable in SQLite. Busy/locked errors from
    /// other writers on the same file are retried with backoff.
    fn serializable<T>(&self, mut f: impl FnMut(&Transaction<'_>) -> Result<T>) -> Result<T> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let result = {
                let mut conn = self.conn();
                conn.transaction_with_behavior(TransactionBehavior::Immediate)
                    .map_err(CoreError::from)
                    .and_then(|tx| {
                        let out = f(&tx)?;
                        tx.commit()?;
                        Ok(out)
                    })
            };
            match result {
                Err(e) if is_busy(&e) => {
                    if attempt >= MAX_TX_ATTEMPTS {
                        return Err(CoreError::Contention { attempts: attempt });
                    }
                    let backoff_ms = 20_u64 * 2_u64.pow(attempt - 1);
                    warn!(
                        "Transaction conflict (attempt {}/{}), retrying in {}ms",
                        attempt, MAX_TX_ATTEMPTS, backoff_ms
                    );
                    pause(Duration::from_millis(backoff_ms));
                }
                other => return other,
            }
        }
    }

    // ── Matches ───────────────────────────────────────────────────────────────

    /// Insert or refresh fixture data. Scores, status and quotas are left alone,
    /// and a match that is locked or no longer scheduled keeps its fixture data.
    /// Returns `false` when an existing match was left unchanged.
    pub fn upsert_match(&self, input: &MatchInput) -> Result<bool> {
        input.validate()?;
        let changed = self.conn().execute(
            "INSERT INTO matches (id, competition, home_team, away_team, kickoff, status, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, 'scheduled', ?6)
             ON CONFLICT(id) DO UPDATE SET
                competition=excluded.competition,
                home_team=excluded.home_team,
                away_team=excluded.away_team,
                kickoff=excluded.kickoff
             WHERE matches.status='scheduled' AND matches.quota_home IS NULL",
            params![
                input.id,
                input.competition,
                input.home_team,
                input.away_team,
                input.kickoff,
                Utc::now(),
            ],
        )?;
        if changed == 0 {
            debug!("Match {} is locked or underway, fixture data kept", input.id);
        }
        Ok(changed > 0)
    }

    pub fn get_match(&self, id: &str) -> Result<Option<Match>> {
        let conn = self.conn();
        let m = conn
            .query_row(
                &format!("SELECT {MATCH_COLUMNS} FROM matches WHERE id=?1"),
                params![id],
                map_match,
            )
            .optional()?;
        Ok(m)
    }

    /// Set the match status. A finished match cannot be moved back.
    pub fn set_match_status(&self, id: &str, status: MatchStatus) -> Result<()> {
        let changed = self.conn().execute(
            "UPDATE matches SET status=?2 WHERE id=?1 AND status != 'finished'",
            params![id, status],
        )?;
        if changed == 0 {
            return match self.get_match(id)? {
                None => Err(not_found("match", id)),
                Some(m) => Err(ValidationError::UnexpectedMatchStatus {
                    match_id: id.to_string(),
                    status: m.status.code().to_string(),
                    expected: "not finished",
                }
                .into()),
            };
        }
        Ok(())
    }

    /// Record the final score once. Returns `false` if a result was already stored.
    pub fn record_match_result(&self, id: &str, home: i32, away: i32) -> Result<bool> {
        validate_score(home, away)?;
        let changed = self.conn().execute(
            "UPDATE matches SET home_score=?2, away_score=?3, status='finished'
             WHERE id=?1 AND home_score IS NULL AND status NOT IN ('postponed','cancelled')",
            params![id, home, away],
        )?;
        if changed == 0 {
            let m = self.get_match(id)?.ok_or_else(|| not_found("match", id))?;
            if m.status.is_abandoned() {
                return Err(ValidationError::UnexpectedMatchStatus {
                    match_id: id.to_string(),
                    status: m.status.code().to_string(),
                    expected: "scheduled or live",
                }
                .into());
            }
            return Ok(false);
        }
        Ok(true)
    }

    /// Freeze quotas for a match from its current prediction distribution.
    /// Returns the stored quotas unchanged if they were already locked.
    ///
    /// A lock after kickoff is allowed: predictions close at kickoff, so the
    /// distribution a late lock sees is the one an on-time lock would have.
    pub fn lock_match_quotas(
        &self,
        match_id: &str,
        strategy: &dyn QuotaStrategy,
        now: DateTime<Utc>,
    ) -> Result<Quotas> {
        self.serializable(|tx| {
            let m = tx
                .query_row(
                    &format!("SELECT {MATCH_COLUMNS} FROM matches WHERE id=?1"),
                    params![match_id],
                    map_match,
                )
                .optional()?
                .ok_or_else(|| not_found("match", match_id))?;
            if let Some(q) = m.quotas {
                return Ok(q);
            }
            if m.status.is_abandoned() {
                return Err(ValidationError::UnexpectedMatchStatus {
                    match_id: match_id.to_string(),
                    status: m.status.code().to_string(),
                    expected: "scheduled, live or finished",
                }
                .into());
            }

            let mut stmt = tx.prepare(
                "SELECT predicted_result FROM predictions WHERE match_id=?1 AND status != 'void'",
            )?;
            let dist: OutcomeDistribution = stmt
                .query_map(params![match_id], |row| row.get::<_, Outcome>(0))?
                .collect::<rusqlite::Result<Vec<_>>>()?
                .into_iter()
                .collect();

            let quotas = strategy.quotas(&dist);
            if !quotas_in_range(&quotas) {
                return Err(ValidationError::QuotaOutOfRange {
                    strategy: strategy.name().to_string(),
                    quotas,
                }
                .into());
            }
            tx.execute(
                "UPDATE matches SET quota_home=?2, quota_draw=?3, quota_away=?4, quotas_locked_at=?5
                 WHERE id=?1 AND quota_home IS NULL",
                params![match_id, quotas.home, quotas.draw, quotas.away, now],
            )?;
            debug!(
                "Locked quotas for {} ({} picks, {}): H={} D={} A={}",
                match_id,
                dist.total(),
                strategy.name(),
                quotas.home,
                quotas.draw,
                quotas.away
            );
            Ok(quotas)
        })
    }

    /// Matches without quotas kicking off before `until`, including ones
    /// whose kickoff already passed unlocked.
    pub fn list_matches_awaiting_quotas(&self, until: DateTime<Utc>) -> Result<Vec<String>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT id FROM matches
             WHERE status IN ('scheduled','live','finished') AND quota_home IS NULL AND kickoff <= ?1
             ORDER BY kickoff",
        )?;
        let ids = stmt
            .query_map(params![until], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(ids)
    }

    /// Finished matches that still have pending predictions. Quotas may be
    /// missing; scoring locks them first.
    pub fn list_scorable_matches(&self) -> Result<Vec<String>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT m.id FROM matches m
             WHERE m.status='finished'
               AND m.home_score IS NOT NULL AND m.away_score IS NOT NULL
               AND EXISTS (SELECT 1 FROM predictions p WHERE p.match_id=m.id AND p.status='pending')
             ORDER BY m.kickoff",
        )?;
        let ids = stmt
            .query_map([], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(ids)
    }

    // ── Predictions ───────────────────────────────────────────────────────────

    /// Record (or replace, while still pending) a model's guess before kickoff.
    /// Once quotas are locked the match takes no new or replaced guesses.
    pub fn upsert_prediction(&self, p: &NewPrediction, now: DateTime<Utc>) -> Result<i64> {
        validate_score(p.predicted_home, p.predicted_away)?;
        let result = Outcome::from_score(p.predicted_home, p.predicted_away);
        self.serializable(|tx| {
            let (kickoff, status, quota_home): (DateTime<Utc>, MatchStatus, Option<i32>) = tx
                .query_row(
                    "SELECT kickoff, status, quota_home FROM matches WHERE id=?1",
                    params![p.match_id],
                    |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
                )
                .optional()?
                .ok_or_else(|| not_found("match", &p.match_id))?;
            if status != MatchStatus::Scheduled || now >= kickoff {
                return Err(ValidationError::PredictionAfterKickoff {
                    match_id: p.match_id.clone(),
                    kickoff,
                }
                .into());
            }
            if quota_home.is_some() {
                return Err(ValidationError::PredictionAfterQuotaLock {
                    match_id: p.match_id.clone(),
                }
                .into());
            }
            let model_exists: Option<i64> = tx
                .query_row("SELECT 1 FROM models WHERE id=?1", params![p.model_id], |r| r.get(0))
                .optional()?;
            if model_exists.is_none() {
                return Err(not_found("model", &p.model_id));
            }

            let id: Option<i64> = tx
                .query_row(
                    "INSERT INTO predictions (match_id, model_id, predicted_home, predicted_away,
                                              predicted_result, status, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, 'pending', ?6)
                     ON CONFLICT(match_id, model_id) DO UPDATE SET
                        predicted_home=excluded.predicted_home,
                        predicted_away=excluded.predicted_away,
                        predicted_result=excluded.predicted_result,
                        created_at=excluded.created_at
                     WHERE predictions.status='pending'
                     RETURNING id",
                    params![
                        p.match_id,
                        p.model_id,
                        p.predicted_home,
                        p.predicted_away,
                        result,
                        now
                    ],
                    |row| row.get(0),
                )
                .optional()?;
            id.ok_or_else(|| {
                ValidationError::PredictionSettled {
                    match_id: p.match_id.clone(),
                    model_id: p.model_id.clone(),
                }
                .into()
            })
        })
    }

    pub fn get_prediction(&self, id: i64) -> Result<Option<Prediction>> {
        let conn = self.conn();
        let p = conn
            .query_row(
                &format!("SELECT {PREDICTION_COLUMNS} FROM predictions WHERE id=?1"),
                params![id],
                map_prediction,
            )
            .optional()?;
        Ok(p)
    }

    pub fn list_predictions_for_match(&self, match_id: &str) -> Result<Vec<Prediction>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {PREDICTION_COLUMNS} FROM predictions WHERE match_id=?1 ORDER BY id"
        ))?;
        let rows = stmt
            .query_map(params![match_id], map_prediction)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    pub fn list_pending_predictions(&self, match_id: &str) -> Result<Vec<Prediction>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {PREDICTION_COLUMNS} FROM predictions
             WHERE match_id=?1 AND status='pending' ORDER BY id"
        ))?;
        let rows = stmt
            .query_map(params![match_id], map_prediction)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Settle one prediction and fold the result into its model's streak.
    ///
    /// The pending→scored flip is a compare-and-swap on `status`; the streak
    /// is only touched when the swap actually happened, so a replayed scoring
    /// job returns `false` and changes nothing.
    pub fn apply_prediction_score(
        &self,
        prediction_id: i64,
        model_id: &str,
        points: &PointsBreakdown,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let class = ScoreClass::from_breakdown(points);
        self.serializable(|tx| {
            let swapped = tx.execute(
                "UPDATE predictions SET
                    tendency_points=?2, goal_diff_bonus=?3, exact_score_bonus=?4,
                    total_points=?5, status='scored', scored_at=?6
                 WHERE id=?1 AND status='pending'",
                params![
                    prediction_id,
                    points.tendency_points,
                    points.goal_diff_bonus,
                    points.exact_score_bonus,
                    points.total_points,
                    now,
                ],
            )?;
            if swapped == 0 {
                return Ok(false);
            }

            let model = tx
                .query_row(
                    &format!("SELECT {MODEL_COLUMNS} FROM models WHERE id=?1"),
                    params![model_id],
                    map_model,
                )
                .optional()?
                .ok_or_else(|| not_found("model", model_id))?;
            let next = StreakState::of_model(&model).apply(class);
            tx.execute(
                "UPDATE models SET
                    current_streak=?2, current_streak_type=?3, current_exact_streak=?4,
                    best_streak=?5, worst_streak=?6, best_exact_streak=?7, best_tendency_streak=?8
                 WHERE id=?1",
                params![
                    model_id,
                    next.current,
                    next.current_type,
                    next.exact_run,
                    next.best,
                    next.worst,
                    next.best_exact,
                    next.best_tendency,
                ],
            )?;
            Ok(true)
        })
    }

    /// Void every pending prediction of a match. Returns how many were voided.
    pub fn void_pending_predictions(&self, match_id: &str, now: DateTime<Utc>) -> Result<usize> {
        let changed = self.conn().execute(
            "UPDATE predictions SET status='void', scored_at=?2
             WHERE match_id=?1 AND status='pending'",
            params![match_id, now],
        )?;
        Ok(changed)
    }

    // ── Models ────────────────────────────────────────────────────────────────

    /// Register a model; an existing row only gets its display name refreshed.
    pub fn upsert_model(&self, id: &str, display_name: &str) -> Result<()> {
        if id.trim().is_empty() {
            return Err(ValidationError::Empty { field: "model id" }.into());
        }
        self.conn().execute(
            "INSERT INTO models (id, display_name, created_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(id) DO UPDATE SET display_name=excluded.display_name",
            params![id, display_name, Utc::now()],
        )?;
        Ok(())
    }

    pub fn get_model(&self, id: &str) -> Result<Option<Model>> {
        let conn = self.conn();
        let m = conn
            .query_row(
                &format!("SELECT {MODEL_COLUMNS} FROM models WHERE id=?1"),
                params![id],
                map_model,
            )
            .optional()?;
        Ok(m)
    }

    pub fn list_models(&self) -> Result<Vec<Model>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!("SELECT {MODEL_COLUMNS} FROM models ORDER BY id"))?;
        let rows = stmt
            .query_map([], map_model)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    pub fn set_model_active(&self, id: &str, active: bool) -> Result<()> {
        let changed = self
            .conn()
            .execute("UPDATE models SET active=?2 WHERE id=?1", params![id, active])?;
        ensure_found(changed, "model", id)
    }

    pub fn mark_model_success(&self, id: &str, now: DateTime<Utc>) -> Result<()> {
        let changed = self.conn().execute(
            "UPDATE models SET consecutive_failures=0, auto_disabled=0,
                               failure_reason=NULL, last_success_at=?2
             WHERE id=?1",
            params![id, now],
        )?;
        ensure_found(changed, "model", id)
    }

    /// Bump the failure counter and decide auto-disable in one statement.
    /// Returns the post-update `(consecutive_failures, auto_disabled)`.
    pub fn mark_model_failure(
        &self,
        id: &str,
        reason: &str,
        threshold: i64,
        now: DateTime<Utc>,
    ) -> Result<(i64, bool)> {
        let row = self
            .conn()
            .query_row(
                "UPDATE models SET
                    consecutive_failures = consecutive_failures + 1,
                    auto_disabled = CASE WHEN consecutive_failures + 1 >= ?4 THEN 1 ELSE auto_disabled END,
                    last_failure_at = ?2,
                    failure_reason = ?3
                 WHERE id=?1
                 RETURNING consecutive_failures, auto_disabled",
                params![id, now, reason, threshold],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        row.ok_or_else(|| not_found("model", id))
    }

    pub fn clear_model_disable(&self, id: &str) -> Result<()> {
        let changed = self.conn().execute(
            "UPDATE models SET auto_disabled=0, consecutive_failures=0, failure_reason=NULL
             WHERE id=?1",
            params![id],
        )?;
        ensure_found(changed, "model", id)
    }

    // ── Leaderboard ───────────────────────────────────────────────────────────

    /// Raw per-model counters over scored predictions, filtered by match
    /// window, competition and model activity.
    pub fn leaderboard_counts(&self, filter: &LeaderboardFilter) -> Result<Vec<ModelCounts>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT m.id, m.display_name, m.active,
                    COUNT(p.id),
                    COUNT(p.id),
                    COALESCE(SUM(CASE WHEN p.tendency_points > 0 THEN 1 ELSE 0 END), 0),
                    COALESCE(SUM(CASE WHEN p.exact_score_bonus = 3 THEN 1 ELSE 0 END), 0),
                    COALESCE(SUM(p.total_points), 0)
             FROM models m
             JOIN predictions p ON p.model_id = m.id AND p.status = 'scored'
             JOIN matches mt ON mt.id = p.match_id
             WHERE (?1 IS NULL OR mt.kickoff >= ?1)
               AND (?2 IS NULL OR mt.kickoff < ?2)
               AND (?3 IS NULL OR mt.competition = ?3)
               AND (?4 = 0 OR m.active = 1)
             GROUP BY m.id, m.display_name, m.active",
        )?;
        let rows = stmt
            .query_map(
                params![
                    filter.since,
                    filter.until,
                    filter.competition,
                    filter.active_only
                ],
                |row| {
                    Ok(ModelCounts {
                        model_id: row.get(0)?,
                        display_name: row.get(1)?,
                        active: row.get(2)?,
                        total_predictions: row.get(3)?,
                        scored_predictions: row.get(4)?,
                        correct_tendencies: row.get(5)?,
                        exact_scores: row.get(6)?,
                        total_points: row.get(7)?,
                    })
                },
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }
}

// ── SQL helpers ────────────────────────────────────────────────────────────────

/// Blocking sleep between transaction attempts. On a multi-threaded tokio
/// runtime the worker hands its other tasks off first.
fn pause(d: Duration) {
    match Handle::try_current() {
        Ok(h) if h.runtime_flavor() == RuntimeFlavor::MultiThread => {
            tokio::task::block_in_place(|| std::thread::sleep(d))
        }
        _ => std::thread::sleep(d),
    }
}

fn is_busy(e: &CoreError) -> bool {
    match e {
        CoreError::Database(rusqlite::Error::SqliteFailure(err, _)) => matches!(
            err.code,
            ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked
        ),
        _ => false,
    }
}

fn not_found(entity: &'static str, id: &str) -> CoreError {
    CoreError::NotFound {
        entity,
        id: id.to_string(),
    }
}

fn ensure_found(changed: usize, entity: &'static str, id: &str) -> Result<()> {
    if changed == 0 {
        return Err(not_found(entity, id));
    }
    Ok(())
}

const MATCH_COLUMNS: &str = "id, competition, home_team, away_team, kickoff, home_score, away_score,
     status, quota_home, quota_draw, quota_away, quotas_locked_at";

const PREDICTION_COLUMNS: &str = "id, match_id, model_id, predicted_home, predicted_away,
     predicted_result, tendency_points, goal_diff_bonus, exact_score_bonus, total_points,
     status, created_at, scored_at";

const MODEL_COLUMNS: &str = "id, display_name, active, auto_disabled, consecutive_failures,
     last_failure_at, last_success_at, failure_reason, current_streak, current_streak_type,
     current_exact_streak, best_streak, worst_streak, best_exact_streak, best_tendency_streak";

fn map_match(row: &rusqlite::Row) -> rusqlite::Result<Match> {
    let quota_home: Option<i32> = row.get(8)?;
    let quota_draw: Option<i32> = row.get(9)?;
    let quota_away: Option<i32> = row.get(10)?;
    let quotas = match (quota_home, quota_draw, quota_away) {
        (Some(home), Some(draw), Some(away)) => Some(Quotas { home, draw, away }),
        _ => None,
    };
    Ok(Match {
        id: row.get(0)?,
        competition: row.get(1)?,
        home_team: row.get(2)?,
        away_team: row.get(3)?,
        kickoff: row.get(4)?,
        home_score: row.get(5)?,
        away_score: row.get(6)?,
        status: row.get(7)?,
        quotas,
        quotas_locked_at: row.get(11)?,
    })
}

fn map_prediction(row: &rusqlite::Row) -> rusqlite::Result<Prediction> {
    Ok(Prediction {
        id: row.get(0)?,
        match_id: row.get(1)?,
        model_id: row.get(2)?,
        predicted_home: row.get(3)?,
        predicted_away: row.get(4)?,
        predicted_result: row.get(5)?,
        tendency_points: row.get(6)?,
        goal_diff_bonus: row.get(7)?,
        exact_score_bonus: row.get(8)?,
        total_points: row.get(9)?,
        status: row.get(10)?,
        created_at: row.get(11)?,
        scored_at: row.get(12)?,
    })
}

fn map_model(row: &rusqlite::Row) -> rusqlite::Result<Model> {
    Ok(Model {
        id: row.get(0)?,
        display_name: row.get(1)?,
        active: row.get(2)?,
        auto_disabled: row.get(3)?,
        consecutive_failures: row.get(4)?,
        last_failure_at: row.get(5)?,
        last_success_at: row.get(6)?,
        failure_reason: row.get(7)?,
        current_streak: row.get(8)?,
        current_streak_type: row.get(9)?,
        current_exact_streak: row.get(10)?,
        best_streak: row.get(11)?,
        worst_streak: row.get(12)?,
        best_exact_streak: row.get(13)?,
        best_tendency_streak: row.get(14)?,
    })
}

/// SQLite schema (idempotent CREATE IF NOT EXISTS)
pub const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS models (
    id                   TEXT    PRIMARY KEY,
    display_name         TEXT    NOT NULL,
    active               INTEGER NOT NULL DEFAULT 1,
    auto_disabled        INTEGER NOT NULL DEFAULT 0,
    consecutive_failures INTEGER NOT NULL DEFAULT 0,
    last_failure_at      TEXT,
    last_success_at      TEXT,
    failure_reason       TEXT,
    current_streak       INTEGER NOT NULL DEFAULT 0,
    current_streak_type  TEXT    NOT NULL DEFAULT 'none',
    current_exact_streak INTEGER NOT NULL DEFAULT 0,
    best_streak          INTEGER NOT NULL DEFAULT 0,
    worst_streak         INTEGER NOT NULL DEFAULT 0,
    best_exact_streak    INTEGER NOT NULL DEFAULT 0,
    best_tendency_streak INTEGER NOT NULL DEFAULT 0,
    created_at           TEXT    NOT NULL,
    CHECK (auto_disabled = 0 OR consecutive_failures >= 3)
);

CREATE TABLE IF NOT EXISTS matches (
    id               TEXT    PRIMARY KEY,
    competition      TEXT    NOT NULL,
    home_team        TEXT    NOT NULL,
    away_team        TEXT    NOT NULL,
    kickoff          TEXT    NOT NULL,
    home_score       INTEGER,
    away_score       INTEGER,
    status           TEXT    NOT NULL DEFAULT 'scheduled',
    quota_home       INTEGER CHECK (quota_home BETWEEN 2 AND 6),
    quota_draw       INTEGER CHECK (quota_draw BETWEEN 2 AND 6),
    quota_away       INTEGER CHECK (quota_away BETWEEN 2 AND 6),
    quotas_locked_at TEXT,
    created_at       TEXT    NOT NULL
);

CREATE TABLE IF NOT EXISTS predictions (
    id                INTEGER PRIMARY KEY AUTOINCREMENT,
    match_id          TEXT    NOT NULL,
    model_id          TEXT    NOT NULL,
    predicted_home    INTEGER NOT NULL,
    predicted_away    INTEGER NOT NULL,
    predicted_result  TEXT    NOT NULL,
    tendency_points   INTEGER,
    goal_diff_bonus   INTEGER CHECK (goal_diff_bonus IN (0, 1)),
    exact_score_bonus INTEGER CHECK (exact_score_bonus IN (0, 3)),
    total_points      INTEGER,
    status            TEXT    NOT NULL DEFAULT 'pending',
    created_at        TEXT    NOT NULL,
    scored_at         TEXT,
    UNIQUE (match_id, model_id),
    FOREIGN KEY (match_id) REFERENCES matches(id),
    FOREIGN KEY (model_id) REFERENCES models(id)
);

CREATE INDEX IF NOT EXISTS idx_predictions_match ON predictions(match_id, status);
CREATE INDEX IF NOT EXISTS idx_predictions_model ON predictions(model_id, status);
CREATE INDEX IF NOT EXISTS idx_matches_status ON matches(status, kickoff);
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[test]
    fn pause_outside_a_runtime() {
        let start = Instant::now();
        pause(Duration::from_millis(5));
        assert!(start.elapsed() >= Duration::from_millis(5));
    }

    #[tokio::test]
    async fn pause_on_current_thread_runtime() {
        pause(Duration::from_millis(5));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn pause_yields_worker_on_multi_thread_runtime() {
        let ticker = tokio::spawn(async {
            tokio::time::sleep(Duration::from_millis(1)).await;
            Instant::now()
        });
        let start = Instant::now();
        pause(Duration::from_millis(50));
        let ticked_at = ticker.await.unwrap();
        assert!(ticked_at < start + Duration::from_millis(50));
    }
}
