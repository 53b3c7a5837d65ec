/// Dynamic quota calculation.
///
/// Before kickoff the distribution of model picks is frozen into a point
/// value per outcome: the fewer models backed an outcome, the more it pays.
///
/// Default rule (`LinearRarity`):
///   quota_o = round(6 − 4·f_o), clamped to [2, 6]
/// where f_o is the share of non-void predictions picking outcome o.
/// With no predictions every outcome gets the neutral midpoint 4.
use serde::{Deserialize, Serialize};

use crate::db::models::{Outcome, Quotas};

pub const MIN_QUOTA: i32 = 2;
pub const MAX_QUOTA: i32 = 6;
pub const NEUTRAL_QUOTA: i32 = 4;

/// Count of predicted outcomes for one match at lock time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct OutcomeDistribution {
    pub home: u32,
    pub draw: u32,
    pub away: u32,
}

impl OutcomeDistribution {
    pub fn total(&self) -> u32 {
        self.home + self.draw + self.away
    }

    pub fn count(&self, outcome: Outcome) -> u32 {
        match outcome {
            Outcome::Home => self.home,
            Outcome::Draw => self.draw,
            Outcome::Away => self.away,
        }
    }

    pub fn record(&mut self, outcome: Outcome) {
        match outcome {
            Outcome::Home => self.home += 1,
            Outcome::Draw => self.draw += 1,
            Outcome::Away => self.away += 1,
        }
    }

    /// Share of picks for `outcome`; `None` when nobody predicted.
    pub fn fraction(&self, outcome: Outcome) -> Option<f64> {
        let n = self.total();
        if n == 0 {
            return None;
        }
        Some(self.count(outcome) as f64 / n as f64)
    }
}

impl FromIterator<Outcome> for OutcomeDistribution {
    fn from_iter<I: IntoIterator<Item = Outcome>>(iter: I) -> Self {
        let mut dist = OutcomeDistribution::default();
        for outcome in iter {
            dist.record(outcome);
        }
        dist
    }
}

/// Maps a pick distribution to quotas. Implementations must be pure and
/// always return values in [MIN_QUOTA, MAX_QUOTA].
pub trait QuotaStrategy: Send + Sync {
    fn quotas(&self, dist: &OutcomeDistribution) -> Quotas;

    fn name(&self) -> &str;
}

/// `round(6 − 4·f)` clamped to [2, 6].
#[derive(Debug, Clone, Copy, Default)]
pub struct LinearRarity;

impl LinearRarity {
    fn quota_for(fraction: Option<f64>) -> i32 {
        match fraction {
            None => NEUTRAL_QUOTA,
            Some(f) => {
                let raw = (MAX_QUOTA as f64 - 4.0 * f).round() as i32;
                raw.clamp(MIN_QUOTA, MAX_QUOTA)
            }
        }
    }
}

impl QuotaStrategy for LinearRarity {
    fn quotas(&self, dist: &OutcomeDistribution) -> Quotas {
        Quotas {
            home: Self::quota_for(dist.fraction(Outcome::Home)),
            draw: Self::quota_for(dist.fraction(Outcome::Draw)),
            away: Self::quota_for(dist.fraction(Outcome::Away)),
        }
    }

    fn name(&self) -> &str {
        "linear-rarity"
    }
}

/// Whether every quota sits in the permitted band.
pub fn quotas_in_range(q: &Quotas) -> bool {
    [q.home, q.draw, q.away]
        .iter()
        .all(|v| (MIN_QUOTA..=MAX_QUOTA).contains(v))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dist(home: u32, draw: u32, away: u32) -> OutcomeDistribution {
        OutcomeDistribution { home, draw, away }
    }

    #[test]
    fn no_predictions_gives_neutral_quotas() {
        let q = LinearRarity.quotas(&dist(0, 0, 0));
        assert_eq!(q, Quotas { home: 4, draw: 4, away: 4 });
    }

    #[test]
    fn rarer_outcomes_pay_more() {
        // 2x H, 1x D, 0x A
        let q = LinearRarity.quotas(&dist(2, 1, 0));
        assert_eq!(q.home, 3);
        assert_eq!(q.draw, 5);
        assert_eq!(q.away, 6);
        assert!(q.draw > q.home);
        assert!(q.away > q.home);
    }

    #[test]
    fn unanimous_pick_hits_floor() {
        let q = LinearRarity.quotas(&dist(7, 0, 0));
        assert_eq!(q, Quotas { home: 2, draw: 6, away: 6 });
    }

    #[test]
    fn even_split_is_midpoint() {
        let q = LinearRarity.quotas(&dist(1, 0, 1));
        assert_eq!(q.home, 4);
        assert_eq!(q.away, 4);
        assert_eq!(q.draw, 6);
    }

    #[test]
    fn quotas_always_in_range() {
        for h in 0..6 {
            for d in 0..6 {
                for a in 0..6 {
                    let q = LinearRarity.quotas(&dist(h, d, a));
                    assert!(quotas_in_range(&q), "{:?} -> {:?}", (h, d, a), q);
                }
            }
        }
    }

    #[test]
    fn distribution_collects_from_outcomes() {
        let d: OutcomeDistribution = [Outcome::Home, Outcome::Draw, Outcome::Home]
            .into_iter()
            .collect();
        assert_eq!(d, dist(2, 1, 0));
        assert_eq!(d.fraction(Outcome::Away), Some(0.0));
    }
}
