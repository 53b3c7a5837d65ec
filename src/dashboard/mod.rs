use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Html,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};

use crate::analysis::{AnalysisRequest, MatchAnalysis};
use crate::budget::BudgetStatus;
use crate::context::AppContext;
use crate::db::models::{Match, MatchInput, MatchStatus, Model, NewPrediction, Prediction};
use crate::error::{CoreError, ValidationError};
use crate::health::FailureOutcome;
use crate::leaderboard::{LeaderboardEntry, LeaderboardFilter};
use crate::scoring::ScoringReport;

type ApiError = (StatusCode, String);
type ApiResult<T> = Result<Json<T>, ApiError>;

/// Build the Axum router for the dashboard and JSON API.
pub fn router(ctx: AppContext) -> Router {
    Router::new()
        .route("/", get(index_handler))
        .route("/api/leaderboard", get(leaderboard_handler))
        .route("/api/budget", get(budget_handler))
        .route("/api/models", get(list_models_handler).post(register_model_handler))
        .route("/api/models/available", get(available_models_handler))
        .route("/api/models/:id/active", post(set_active_handler))
        .route("/api/models/:id/success", post(model_success_handler))
        .route("/api/models/:id/failure", post(model_failure_handler))
        .route("/api/models/:id/re-enable", post(re_enable_handler))
        .route("/api/matches", post(upsert_match_handler))
        .route("/api/matches/:id", get(get_match_handler))
        .route("/api/matches/:id/predictions", get(match_predictions_handler))
        .route("/api/matches/:id/result", post(match_result_handler))
        .route("/api/matches/:id/status", post(match_status_handler))
        .route("/api/predictions", post(prediction_handler))
        .route("/api/analysis/:fixture_id", get(analysis_handler))
        .layer(CorsLayer::permissive())
        .with_state(Arc::new(ctx))
}

fn api_error(e: CoreError) -> ApiError {
    let status = match &e {
        CoreError::Validation(_) => StatusCode::BAD_REQUEST,
        CoreError::NotFound { .. } => StatusCode::NOT_FOUND,
        CoreError::Contention { .. } => StatusCode::SERVICE_UNAVAILABLE,
        CoreError::Database(_) | CoreError::Json(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status.is_server_error() {
        warn!("API request failed: {}", e);
    }
    (status, e.to_string())
}

fn bad_request(e: ValidationError) -> ApiError {
    (StatusCode::BAD_REQUEST, e.to_string())
}

/// Serve the leaderboard page.
async fn index_handler() -> Html<&'static str> {
    Html(DASHBOARD_HTML)
}

/// GET /api/leaderboard?since=&until=&competition=&active_only=&min_predictions=
async fn leaderboard_handler(
    State(ctx): State<Arc<AppContext>>,
    Query(filter): Query<LeaderboardFilter>,
) -> ApiResult<Vec<LeaderboardEntry>> {
    ctx.leaderboard
        .leaderboard(&filter)
        .await
        .map(Json)
        .map_err(api_error)
}

/// GET /api/budget
async fn budget_handler(State(ctx): State<Arc<AppContext>>) -> ApiResult<BudgetStatus> {
    ctx.budget.status().await.map(Json).ok_or((
        StatusCode::SERVICE_UNAVAILABLE,
        "counter store unavailable".to_string(),
    ))
}

/// GET /api/models
async fn list_models_handler(State(ctx): State<Arc<AppContext>>) -> ApiResult<Vec<Model>> {
    ctx.health.list_models().map(Json).map_err(api_error)
}

/// GET /api/models/available
async fn available_models_handler(State(ctx): State<Arc<AppContext>>) -> ApiResult<Vec<Model>> {
    ctx.health.available_models().map(Json).map_err(api_error)
}

#[derive(Debug, Deserialize)]
struct RegisterModel {
    id: String,
    display_name: String,
}

/// POST /api/models
async fn register_model_handler(
    State(ctx): State<Arc<AppContext>>,
    Json(body): Json<RegisterModel>,
) -> ApiResult<Model> {
    if body.id.trim().is_empty() {
        return Err(bad_request(ValidationError::Empty { field: "id" }));
    }
    if body.display_name.trim().is_empty() {
        return Err(bad_request(ValidationError::Empty { field: "display_name" }));
    }
    ctx.health
        .register_model(&body.id, &body.display_name)
        .map_err(api_error)?;
    info!("Model registered: {}", body.id);
    model_by_id(&ctx, &body.id)
}

#[derive(Debug, Deserialize)]
struct SetActive {
    active: bool,
}

/// POST /api/models/:id/active
async fn set_active_handler(
    State(ctx): State<Arc<AppContext>>,
    Path(id): Path<String>,
    Json(body): Json<SetActive>,
) -> ApiResult<Model> {
    ctx.health.set_active(&id, body.active).map_err(api_error)?;
    model_by_id(&ctx, &id)
}

/// POST /api/models/:id/success
async fn model_success_handler(
    State(ctx): State<Arc<AppContext>>,
    Path(id): Path<String>,
) -> ApiResult<Model> {
    ctx.health.record_success(&id).map_err(api_error)?;
    model_by_id(&ctx, &id)
}

#[derive(Debug, Deserialize)]
struct FailureReport {
    reason: String,
}

/// POST /api/models/:id/failure
async fn model_failure_handler(
    State(ctx): State<Arc<AppContext>>,
    Path(id): Path<String>,
    Json(body): Json<FailureReport>,
) -> ApiResult<FailureOutcome> {
    ctx.health
        .record_failure(&id, &body.reason)
        .map(Json)
        .map_err(api_error)
}

/// POST /api/models/:id/re-enable
async fn re_enable_handler(
    State(ctx): State<Arc<AppContext>>,
    Path(id): Path<String>,
) -> ApiResult<Model> {
    ctx.health.re_enable(&id).map_err(api_error)?;
    model_by_id(&ctx, &id)
}

fn model_by_id(ctx: &AppContext, id: &str) -> ApiResult<Model> {
    ctx.db
        .get_model(id)
        .map_err(api_error)?
        .map(Json)
        .ok_or((StatusCode::NOT_FOUND, format!("model '{}' not found", id)))
}

/// POST /api/matches
async fn upsert_match_handler(
    State(ctx): State<Arc<AppContext>>,
    Json(input): Json<MatchInput>,
) -> ApiResult<Match> {
    ctx.db.upsert_match(&input).map_err(api_error)?;
    match_by_id(&ctx, &input.id)
}

/// GET /api/matches/:id
async fn get_match_handler(
    State(ctx): State<Arc<AppContext>>,
    Path(id): Path<String>,
) -> ApiResult<Match> {
    match_by_id(&ctx, &id)
}

fn match_by_id(ctx: &AppContext, id: &str) -> ApiResult<Match> {
    ctx.db
        .get_match(id)
        .map_err(api_error)?
        .map(Json)
        .ok_or((StatusCode::NOT_FOUND, format!("match '{}' not found", id)))
}

/// GET /api/matches/:id/predictions
async fn match_predictions_handler(
    State(ctx): State<Arc<AppContext>>,
    Path(id): Path<String>,
) -> ApiResult<Vec<Prediction>> {
    match_by_id(&ctx, &id)?;
    ctx.db
        .list_predictions_for_match(&id)
        .map(Json)
        .map_err(api_error)
}

#[derive(Debug, Deserialize)]
struct MatchResult {
    home_score: i32,
    away_score: i32,
}

#[derive(Debug, Serialize)]
struct MatchResultResponse {
    /// False when a result had already been stored
    recorded: bool,
    /// `None` when the match could not be scored
    scoring: Option<ScoringReport>,
}

/// POST /api/matches/:id/result
async fn match_result_handler(
    State(ctx): State<Arc<AppContext>>,
    Path(id): Path<String>,
    Json(body): Json<MatchResult>,
) -> ApiResult<MatchResultResponse> {
    let recorded = ctx
        .db
        .record_match_result(&id, body.home_score, body.away_score)
        .map_err(api_error)?;
    if recorded {
        info!("Result recorded for {}: {}-{}", id, body.home_score, body.away_score);
    }
    let scoring = match ctx.scoring.score_match(&id).await {
        Ok(report) => Some(report),
        Err(e) => {
            warn!("Match {} not scored on result: {}", id, e);
            None
        }
    };
    Ok(Json(MatchResultResponse { recorded, scoring }))
}

#[derive(Debug, Deserialize)]
struct StatusChange {
    status: MatchStatus,
}

#[derive(Debug, Serialize)]
struct StatusChangeResponse {
    status: MatchStatus,
    voided: usize,
}

/// POST /api/matches/:id/status
async fn match_status_handler(
    State(ctx): State<Arc<AppContext>>,
    Path(id): Path<String>,
    Json(body): Json<StatusChange>,
) -> ApiResult<StatusChangeResponse> {
    if body.status == MatchStatus::Finished {
        return Err(bad_request(ValidationError::UnexpectedMatchStatus {
            match_id: id,
            status: body.status.code().to_string(),
            expected: "scheduled, live, postponed or cancelled (finish via /result)",
        }));
    }
    ctx.db.set_match_status(&id, body.status).map_err(api_error)?;
    let voided = if body.status.is_abandoned() {
        ctx.scoring.void_match(&id).await.map_err(api_error)?
    } else {
        0
    };
    Ok(Json(StatusChangeResponse {
        status: body.status,
        voided,
    }))
}

#[derive(Debug, Serialize)]
struct PredictionAccepted {
    id: i64,
}

/// POST /api/predictions
async fn prediction_handler(
    State(ctx): State<Arc<AppContext>>,
    Json(p): Json<NewPrediction>,
) -> ApiResult<PredictionAccepted> {
    ctx.db
        .upsert_prediction(&p, Utc::now())
        .map(|id| Json(PredictionAccepted { id }))
        .map_err(api_error)
}

#[derive(Debug, Deserialize)]
struct AnalysisQuery {
    league: Option<i64>,
    season: Option<i32>,
}

/// GET /api/analysis/:fixture_id?league=&season=
async fn analysis_handler(
    State(ctx): State<Arc<AppContext>>,
    Path(fixture_id): Path<i64>,
    Query(q): Query<AnalysisQuery>,
) -> ApiResult<MatchAnalysis> {
    let analyzer = ctx.analyzer.as_ref().ok_or((
        StatusCode::NOT_FOUND,
        "match analysis is disabled (no API_FOOTBALL_KEY)".to_string(),
    ))?;
    let req = AnalysisRequest {
        fixture_id,
        league_id: q.league,
        season: q.season,
    };
    analyzer
        .analyze(&req)
        .await
        .map(Json)
        .map_err(|e| (StatusCode::TOO_MANY_REQUESTS, e.to_string()))
}

/// Embedded single-file leaderboard page (HTML + CSS + JS)
const DASHBOARD_HTML: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="UTF-8">
<meta name="viewport" content="width=device-width, initial-scale=1.0">
<title>Kicktipp Arena</title>
<style>
  :root { --bg: #0f1117; --card: #1a1d27; --border: #2a2d3a; --accent: #6c63ff; --green: #00c896; --red: #ff4f6a; --text: #e0e0e0; --muted: #8888aa; }
  * { box-sizing: border-box; margin: 0; padding: 0; }
  body { background: var(--bg); color: var(--text); font-family: 'Segoe UI', system-ui, sans-serif; }
  header { display: flex; align-items: center; gap: 1rem; padding: 1rem 2rem; border-bottom: 1px solid var(--border); }
  header h1 { font-size: 1.4rem; font-weight: 700; }
  main { padding: 1.5rem 2rem; display: grid; gap: 1.5rem; }
  .stats-grid { display: grid; grid-template-columns: repeat(auto-fill, minmax(180px, 1fr)); gap: 1rem; }
  .stat-card { background: var(--card); border: 1px solid var(--border); border-radius: 10px; padding: 1.2rem; }
  .stat-card .label { color: var(--muted); font-size: .8rem; text-transform: uppercase; margin-bottom: .4rem; }
  .stat-card .value { font-size: 1.7rem; font-weight: 700; }
  .panel { background: var(--card); border: 1px solid var(--border); border-radius: 10px; overflow: hidden; }
  .panel-header { padding: .9rem 1.2rem; border-bottom: 1px solid var(--border); font-weight: 600; }
  table { width: 100%; border-collapse: collapse; }
  th { padding: .7rem 1rem; text-align: left; font-size: .75rem; text-transform: uppercase; color: var(--muted); border-bottom: 1px solid var(--border); }
  td { padding: .65rem 1rem; font-size: .88rem; border-bottom: 1px solid #1e2130; }
  .pill { display: inline-block; padding: .15rem .55rem; border-radius: 20px; font-size: .75rem; font-weight: 600; }
  .pill.ok { background: rgba(0,200,150,.15); color: var(--green); }
  .pill.off { background: rgba(255,79,106,.15); color: var(--red); }
  .pos { color: var(--green); } .neg { color: var(--red); }
  .empty { color: var(--muted); text-align: center; padding: 2rem; font-size: .9rem; }
</style>
</head>
<body>
<header>
  <h1>⚽ Kicktipp Arena</h1>
  <span style="margin-left:auto;color:var(--muted);font-size:.8rem;" id="last-updated"></span>
</header>
<main>
  <div class="stats-grid">
    <div class="stat-card"><div class="label">API Budget Used</div><div class="value" id="s-budget">–</div></div>
    <div class="stat-card"><div class="label">Budget Resets</div><div class="value" id="s-reset">–</div></div>
    <div class="stat-card"><div class="label">Models</div><div class="value" id="s-models">–</div></div>
    <div class="stat-card"><div class="label">Auto-disabled</div><div class="value" id="s-disabled">–</div></div>
  </div>
  <div class="panel">
    <div class="panel-header">Leaderboard</div>
    <table>
      <thead><tr><th>#</th><th>Model</th><th>Points</th><th>Avg</th><th>Scored</th><th>Tendency</th><th>Exact</th></tr></thead>
      <tbody id="board-tbody"><tr><td colspan="7" class="empty">Loading…</td></tr></tbody>
    </table>
  </div>
  <div class="panel">
    <div class="panel-header">Model Health</div>
    <table>
      <thead><tr><th>Model</th><th>Status</th><th>Failures</th><th>Streak</th><th>Best</th><th>Last error</th></tr></thead>
      <tbody id="models-tbody"><tr><td colspan="6" class="empty">Loading…</td></tr></tbody>
    </table>
  </div>
</main>
<script>
const esc = v => String(v).replace(/[&<>"']/g, c =>
  ({'&': '&amp;', '<': '&lt;', '>': '&gt;', '"': '&quot;', "'": '&#39;'})[c]);

async function loadBudget() {
  const r = await fetch('/api/budget');
  if (!r.ok) { document.getElementById('s-budget').textContent = 'n/a'; return; }
  const b = await r.json();
  document.getElementById('s-budget').textContent = b.used + ' / ' + b.limit;
  document.getElementById('s-reset').textContent = new Date(b.reset_time).toLocaleTimeString();
}

async function loadBoard() {
  const r = await fetch('/api/leaderboard');
  if (!r.ok) return;
  const rows = await r.json();
  const tbody = document.getElementById('board-tbody');
  if (!rows.length) { tbody.innerHTML = '<tr><td colspan="7" class="empty">No scored predictions yet</td></tr>'; return; }
  tbody.innerHTML = rows.map(e => `<tr>
    <td>${e.rank}</td><td>${esc(e.display_name)}</td><td>${e.total_points}</td><td>${e.avg_points.toFixed(2)}</td>
    <td>${e.scored_predictions}</td><td>${e.accuracy.toFixed(1)}%</td><td>${e.exact_accuracy.toFixed(1)}%</td>
  </tr>`).join('');
}

async function loadModels() {
  const r = await fetch('/api/models');
  if (!r.ok) return;
  const models = await r.json();
  document.getElementById('s-models').textContent = models.length;
  document.getElementById('s-disabled').textContent = models.filter(m => m.auto_disabled).length;
  const tbody = document.getElementById('models-tbody');
  if (!models.length) { tbody.innerHTML = '<tr><td colspan="6" class="empty">No models registered</td></tr>'; return; }
  tbody.innerHTML = models.map(m => `<tr>
    <td>${esc(m.display_name)}</td>
    <td><span class="pill ${m.auto_disabled || !m.active ? 'off' : 'ok'}">${m.auto_disabled ? 'Disabled' : (m.active ? 'Active' : 'Inactive')}</span></td>
    <td>${m.consecutive_failures}</td>
    <td class="${m.current_streak >= 0 ? 'pos' : 'neg'}">${m.current_streak > 0 ? '+' : ''}${m.current_streak}</td>
    <td>${m.best_streak}</td>
    <td>${m.failure_reason ? esc(m.failure_reason) : '–'}</td>
  </tr>`).join('');
}

async function loadAll() {
  await Promise.all([loadBudget(), loadBoard(), loadModels()]);
  document.getElementById('last-updated').textContent = 'Updated ' + new Date().toLocaleTimeString();
}

loadAll();
setInterval(loadAll, 30000);
</script>
</body>
</html>"#;
