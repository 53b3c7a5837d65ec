use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ExternalSourceError, ValidationError};

/// 1X2 decimal odds from one bookmaker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OddsSnapshot {
    pub bookmaker: String,
    pub home: f64,
    pub draw: f64,
    pub away: f64,
}

impl OddsSnapshot {
    pub fn new(bookmaker: &str, home: f64, draw: f64, away: f64) -> Result<Self, ValidationError> {
        for (outcome, value) in [("home", home), ("draw", draw), ("away", away)] {
            if !value.is_finite() || value <= 1.0 {
                return Err(ValidationError::OddsOutOfRange { outcome, value });
            }
        }
        Ok(OddsSnapshot {
            bookmaker: bookmaker.to_string(),
            home,
            draw,
            away,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InjuryKind {
    Missing,
    Questionable,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Injury {
    pub team_id: i64,
    pub team_name: String,
    pub player_name: String,
    pub kind: InjuryKind,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineupPlayer {
    pub name: String,
    pub number: Option<i32>,
    pub position: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeamLineup {
    pub team_id: i64,
    pub team_name: String,
    pub formation: Option<String>,
    pub coach: Option<String>,
    pub starting_xi: Vec<LineupPlayer>,
    pub substitutes: Vec<LineupPlayer>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandingRow {
    pub rank: i32,
    pub team_id: i64,
    pub team_name: String,
    pub points: i32,
    pub goal_diff: i32,
    pub played: i32,
    pub won: i32,
    pub drawn: i32,
    pub lost: i32,
    /// Recent results, most recent last (e.g. "WWDLW")
    pub form: Option<String>,
}

// ── API-Football v3 payloads ─────────────────────────────────────────────────

fn response_array<'a>(source: &str, raw: &'a Value) -> Result<&'a Vec<Value>, ExternalSourceError> {
    raw["response"]
        .as_array()
        .ok_or_else(|| ExternalSourceError::Parse {
            source_name: source.to_string(),
            reason: "missing 'response' array".into(),
        })
}

fn as_i32(v: &Value) -> Option<i32> {
    v.as_i64().map(|n| n as i32)
}

/// Odds come as strings ("1.85") in practice but numbers are accepted too.
fn as_odd(v: &Value) -> Option<f64> {
    v.as_str()
        .and_then(|s| s.trim().parse().ok())
        .or_else(|| v.as_f64())
}

/// First bookmaker offering a complete "Match Winner" market.
/// `Ok(None)` when no bookmaker has priced the fixture yet.
pub fn parse_odds(source: &str, raw: &Value) -> Result<Option<OddsSnapshot>, ExternalSourceError> {
    let fixtures = response_array(source, raw)?;
    for fixture in fixtures {
        let bookmakers = match fixture["bookmakers"].as_array() {
            Some(b) => b,
            None => continue,
        };
        for bookmaker in bookmakers {
            let name = bookmaker["name"].as_str().unwrap_or("unknown");
            let bets = match bookmaker["bets"].as_array() {
                Some(b) => b,
                None => continue,
            };
            let winner = bets
                .iter()
                .find(|b| b["name"].as_str() == Some("Match Winner"));
            let values = match winner.and_then(|b| b["values"].as_array()) {
                Some(v) => v,
                None => continue,
            };
            let price = |label: &str| {
                values
                    .iter()
                    .find(|v| v["value"].as_str() == Some(label))
                    .and_then(|v| as_odd(&v["odd"]))
            };
            if let (Some(h), Some(d), Some(a)) = (price("Home"), price("Draw"), price("Away")) {
                return Ok(Some(OddsSnapshot::new(name, h, d, a)?));
            }
        }
    }
    Ok(None)
}

pub fn parse_injuries(source: &str, raw: &Value) -> Result<Vec<Injury>, ExternalSourceError> {
    let items = response_array(source, raw)?;
    Ok(items
        .iter()
        .filter_map(|item| {
            let player = &item["player"];
            let kind = match player["type"].as_str()? {
                t if t.eq_ignore_ascii_case("questionable") => InjuryKind::Questionable,
                _ => InjuryKind::Missing,
            };
            Some(Injury {
                team_id: item["team"]["id"].as_i64()?,
                team_name: item["team"]["name"].as_str().unwrap_or_default().to_string(),
                player_name: player["name"].as_str()?.to_string(),
                kind,
                reason: player["reason"].as_str().map(String::from),
            })
        })
        .collect())
}

fn parse_players(list: &Value) -> Vec<LineupPlayer> {
    list.as_array()
        .map(|players| {
            players
                .iter()
                .filter_map(|p| {
                    let p = &p["player"];
                    Some(LineupPlayer {
                        name: p["name"].as_str()?.to_string(),
                        number: as_i32(&p["number"]),
                        position: p["pos"].as_str().map(String::from),
                    })
                })
                .collect()
        })
        .unwrap_or_default()
}

pub fn parse_lineups(source: &str, raw: &Value) -> Result<Vec<TeamLineup>, ExternalSourceError> {
    let items = response_array(source, raw)?;
    Ok(items
        .iter()
        .filter_map(|item| {
            Some(TeamLineup {
                team_id: item["team"]["id"].as_i64()?,
                team_name: item["team"]["name"].as_str().unwrap_or_default().to_string(),
                formation: item["formation"].as_str().map(String::from),
                coach: item["coach"]["name"].as_str().map(String::from),
                starting_xi: parse_players(&item["startXI"]),
                substitutes: parse_players(&item["substitutes"]),
            })
        })
        .collect())
}

/// Flattens every group of the first league in the payload.
pub fn parse_standings(source: &str, raw: &Value) -> Result<Vec<StandingRow>, ExternalSourceError> {
    let leagues = response_array(source, raw)?;
    let groups = match leagues.first().and_then(|l| l["league"]["standings"].as_array()) {
        Some(g) => g,
        None => return Ok(vec![]),
    };
    let mut rows: Vec<StandingRow> = groups
        .iter()
        .filter_map(|g| g.as_array())
        .flatten()
        .filter_map(|row| {
            let all = &row["all"];
            Some(StandingRow {
                rank: as_i32(&row["rank"])?,
                team_id: row["team"]["id"].as_i64()?,
                team_name: row["team"]["name"].as_str().unwrap_or_default().to_string(),
                points: as_i32(&row["points"]).unwrap_or(0),
                goal_diff: as_i32(&row["goalsDiff"]).unwrap_or(0),
                played: as_i32(&all["played"]).unwrap_or(0),
                won: as_i32(&all["win"]).unwrap_or(0),
                drawn: as_i32(&all["draw"]).unwrap_or(0),
                lost: as_i32(&all["lose"]).unwrap_or(0),
                form: row["form"].as_str().map(String::from),
            })
        })
        .collect();
    rows.sort_by_key(|r| r.rank);
    Ok(rows)
}
