use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

use super::records::{
    parse_injuries, parse_lineups, parse_odds, parse_standings, Injury, OddsSnapshot,
    StandingRow, TeamLineup,
};
use super::FootballDataSource;
use crate::error::{ExternalSourceError, RateLimitError};

pub const DEFAULT_BASE_URL: &str = "https://v3.football.api-sports.io";
const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(60);
/// API-Football bet id of the 1X2 market
const MATCH_WINNER_BET: &str = "1";

/// Provider backed by the API-Football v3 REST API.
/// Docs: <https://www.api-football.com/documentation-v3>
#[derive(Clone)]
pub struct ApiFootballClient {
    http: Client,
    base_url: String,
    api_key: String,
}

impl ApiFootballClient {
    pub fn new(api_key: &str, base_url: Option<&str>) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(ApiFootballClient {
            http,
            base_url: base_url
                .unwrap_or(DEFAULT_BASE_URL)
                .trim_end_matches('/')
                .to_string(),
            api_key: api_key.to_string(),
        })
    }

    async fn get(&self, path: &str, query: &[(&str, String)]) -> Result<Value, ExternalSourceError> {
        let url = format!("{}/{}", self.base_url, path);
        debug!("Fetching {} {:?}", url, query);

        let resp = self
            .http
            .get(&url)
            .header("x-apisports-key", &self.api_key)
            .query(query)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = resp.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = resp
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.trim().parse::<u64>().ok())
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_RETRY_AFTER);
            return Err(self.rate_limited(retry_after));
        }
        if !status.is_success() {
            return Err(ExternalSourceError::Http {
                source_name: self.name().to_string(),
                status: status.as_u16(),
            });
        }

        let raw: Value = resp.json().await.map_err(|e| ExternalSourceError::Parse {
            source_name: self.name().to_string(),
            reason: e.to_string(),
        })?;
        self.check_api_errors(&raw)?;
        Ok(raw)
    }

    /// API-Football reports quota and auth problems with HTTP 200 and a
    /// non-empty `errors` object.
    fn check_api_errors(&self, raw: &Value) -> Result<(), ExternalSourceError> {
        let errors = match raw["errors"].as_object() {
            Some(e) if !e.is_empty() => e,
            _ => return Ok(()),
        };
        if errors.contains_key("rateLimit") || errors.contains_key("requests") {
            return Err(self.rate_limited(DEFAULT_RETRY_AFTER));
        }
        Err(ExternalSourceError::Parse {
            source_name: self.name().to_string(),
            reason: Value::Object(errors.clone()).to_string(),
        })
    }

    fn rate_limited(&self, retry_after: Duration) -> ExternalSourceError {
        RateLimitError {
            source_name: self.name().to_string(),
            retry_after,
        }
        .into()
    }

    fn transport_error(&self, e: reqwest::Error) -> ExternalSourceError {
        if e.is_timeout() {
            ExternalSourceError::Timeout {
                source_name: self.name().to_string(),
                after: Duration::from_secs(10),
            }
        } else {
            ExternalSourceError::Transport {
                source_name: self.name().to_string(),
                reason: e.to_string(),
            }
        }
    }
}

#[async_trait]
impl FootballDataSource for ApiFootballClient {
    fn name(&self) -> &str {
        "API-Football"
    }

    async fn fetch_odds(&self, fixture_id: i64) -> Result<Option<OddsSnapshot>, ExternalSourceError> {
        let raw = self
            .get(
                "odds",
                &[
                    ("fixture", fixture_id.to_string()),
                    ("bet", MATCH_WINNER_BET.to_string()),
                ],
            )
            .await?;
        parse_odds(self.name(), &raw)
    }

    async fn fetch_injuries(&self, fixture_id: i64) -> Result<Vec<Injury>, ExternalSourceError> {
        let raw = self
            .get("injuries", &[("fixture", fixture_id.to_string())])
            .await?;
        parse_injuries(self.name(), &raw)
    }

    async fn fetch_lineups(&self, fixture_id: i64) -> Result<Vec<TeamLineup>, ExternalSourceError> {
        let raw = self
            .get("fixtures/lineups", &[("fixture", fixture_id.to_string())])
            .await?;
        parse_lineups(self.name(), &raw)
    }

    async fn fetch_standings(
        &self,
        league_id: i64,
        season: i32,
    ) -> Result<Vec<StandingRow>, ExternalSourceError> {
        let raw = self
            .get(
                "standings",
                &[("league", league_id.to_string()), ("season", season.to_string())],
            )
            .await?;
        parse_standings(self.name(), &raw)
    }
}
