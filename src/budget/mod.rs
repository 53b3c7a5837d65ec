//! Daily request budget for the external football data provider.
//!
//! Every provider call must first pass `check_and_increment`. The counter
//! lives in the counter store under a per-UTC-day key and expires at the
//! next UTC midnight, so no clock job is needed to reset it.
//!
//! The guard fails OPEN: when the store is unreachable the call is allowed
//! and the check is reported as degraded.

use chrono::{DateTime, Duration, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::cache::{get_counter, CounterStore};
use crate::error::BudgetExceededError;

pub const DEFAULT_DAILY_LIMIT: u64 = 100;
const KEY_PREFIX: &str = "api_budget";

/// Read-only snapshot of today's budget.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BudgetStatus {
    pub used: u64,
    pub limit: u64,
    pub remaining: u64,
    pub reset_time: DateTime<Utc>,
}

/// Start of the next UTC day.
pub fn next_utc_midnight(now: DateTime<Utc>) -> DateTime<Utc> {
    let tomorrow = now.date_naive() + Duration::days(1);
    tomorrow.and_time(NaiveTime::MIN).and_utc()
}

/// Whole seconds until the next UTC midnight (at least 1).
pub fn seconds_until_reset(now: DateTime<Utc>) -> u64 {
    (next_utc_midnight(now) - now).num_seconds().max(1) as u64
}

pub fn budget_key(now: DateTime<Utc>) -> String {
    format!("{}:{}", KEY_PREFIX, now.format("%Y-%m-%d"))
}

#[derive(Clone)]
pub struct BudgetGuard {
    store: Arc<dyn CounterStore>,
    limit: u64,
}

impl BudgetGuard {
    pub fn new(store: Arc<dyn CounterStore>, limit: u64) -> Self {
        BudgetGuard { store, limit }
    }

    pub fn limit(&self) -> u64 {
        self.limit
    }

    /// Reserve one provider call. Returns today's count, or 0 when the
    /// store could not be reached and the call is let through unchecked.
    pub async fn check_and_increment(&self) -> Result<u64, BudgetExceededError> {
        self.check_and_increment_at(Utc::now()).await
    }

    pub async fn check_and_increment_at(
        &self,
        now: DateTime<Utc>,
    ) -> Result<u64, BudgetExceededError> {
        let key = budget_key(now);
        let count = match self.store.incr(&key).await {
            Ok(n) => n.max(0) as u64,
            Err(e) => {
                warn!(
                    "Budget check degraded, allowing call ({} store: {})",
                    self.store.name(),
                    e
                );
                return Ok(0);
            }
        };

        if count == 1 {
            let ttl = std::time::Duration::from_secs(seconds_until_reset(now));
            if let Err(e) = self.store.expire(&key, ttl).await {
                // the key is date-scoped, a missing TTL only delays cleanup
                warn!("Failed to set expiry on {}: {}", key, e);
            }
        }

        if count > self.limit {
            let err = BudgetExceededError {
                used: count,
                limit: self.limit,
                reset_time: next_utc_midnight(now),
            };
            warn!("{}", err);
            return Err(err);
        }
        debug!("API budget {}/{} used", count, self.limit);
        Ok(count)
    }

    /// Current usage without consuming budget. `None` if the store is down.
    pub async fn status(&self) -> Option<BudgetStatus> {
        self.status_at(Utc::now()).await
    }

    pub async fn status_at(&self, now: DateTime<Utc>) -> Option<BudgetStatus> {
        let raw = match get_counter(self.store.as_ref(), &budget_key(now)).await {
            Ok(v) => v.unwrap_or(0),
            Err(e) => {
                warn!("Budget status unavailable: {}", e);
                return None;
            }
        };
        let used = (raw.max(0) as u64).min(self.limit);
        Some(BudgetStatus {
            used,
            limit: self.limit,
            remaining: self.limit - used,
            reset_time: next_utc_midnight(now),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCounterStore;
    use crate::error::StoreError;
    use async_trait::async_trait;
    use chrono::TimeZone;

    /// Store whose backend is permanently unreachable.
    struct DownStore;

    #[async_trait]
    impl CounterStore for DownStore {
        async fn incr(&self, _key: &str) -> Result<i64, StoreError> {
            Err(StoreError::Unavailable("connection refused".into()))
        }
        async fn expire(&self, _key: &str, _ttl: std::time::Duration) -> Result<(), StoreError> {
            Err(StoreError::Unavailable("connection refused".into()))
        }
        async fn get(&self, _key: &str) -> Result<Option<String>, StoreError> {
            Err(StoreError::Unavailable("connection refused".into()))
        }
        async fn set_ex(
            &self,
            _key: &str,
            _value: &str,
            _ttl: std::time::Duration,
        ) -> Result<(), StoreError> {
            Err(StoreError::Unavailable("connection refused".into()))
        }
        async fn delete(&self, _key: &str) -> Result<(), StoreError> {
            Err(StoreError::Unavailable("connection refused".into()))
        }
        fn name(&self) -> &str {
            "down"
        }
    }

    fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 6, 11, h, m, s).unwrap()
    }

    #[test]
    fn reset_is_next_utc_midnight() {
        let now = at(22, 30, 0);
        assert_eq!(
            next_utc_midnight(now),
            Utc.with_ymd_and_hms(2026, 6, 12, 0, 0, 0).unwrap()
        );
        assert_eq!(seconds_until_reset(now), 90 * 60);
        assert_eq!(seconds_until_reset(at(0, 0, 0)), 86_400);
    }

    #[tokio::test]
    async fn hundred_and_first_call_is_rejected() {
        let guard = BudgetGuard::new(Arc::new(MemoryCounterStore::new()), 100);
        let now = at(9, 0, 0);
        for i in 1..=100 {
            assert_eq!(guard.check_and_increment_at(now).await.unwrap(), i);
        }
        let err = guard.check_and_increment_at(now).await.unwrap_err();
        assert_eq!(err.limit, 100);
        assert_eq!(err.reset_time, Utc.with_ymd_and_hms(2026, 6, 12, 0, 0, 0).unwrap());
    }

    #[tokio::test]
    async fn new_utc_day_starts_from_one() {
        let guard = BudgetGuard::new(Arc::new(MemoryCounterStore::new()), 2);
        let today = at(23, 59, 0);
        guard.check_and_increment_at(today).await.unwrap();
        guard.check_and_increment_at(today).await.unwrap();
        assert!(guard.check_and_increment_at(today).await.is_err());

        let tomorrow = today + Duration::minutes(2);
        assert_eq!(guard.check_and_increment_at(tomorrow).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn unreachable_store_fails_open() {
        let guard = BudgetGuard::new(Arc::new(DownStore), 1);
        for _ in 0..5 {
            assert_eq!(guard.check_and_increment().await.unwrap(), 0);
        }
        assert!(guard.status().await.is_none());
    }

    #[tokio::test]
    async fn status_does_not_consume_budget() {
        let guard = BudgetGuard::new(Arc::new(MemoryCounterStore::new()), 100);
        let now = at(12, 0, 0);
        for _ in 0..3 {
            guard.check_and_increment_at(now).await.unwrap();
        }
        let s1 = guard.status_at(now).await.unwrap();
        let s2 = guard.status_at(now).await.unwrap();
        assert_eq!(s1, s2);
        assert_eq!(s1.used, 3);
        assert_eq!(s1.remaining, 97);
        assert_eq!(s1.reset_time, next_utc_midnight(now));
    }

    #[tokio::test]
    async fn concurrent_callers_never_exceed_limit() {
        let guard = BudgetGuard::new(Arc::new(MemoryCounterStore::new()), 10);
        let now = at(8, 0, 0);
        let handles: Vec<_> = (0..25)
            .map(|_| {
                let g = guard.clone();
                tokio::spawn(async move { g.check_and_increment_at(now).await.is_ok() })
            })
            .collect();
        let admitted = futures_util::future::join_all(handles)
            .await
            .into_iter()
            .filter(|r| *r.as_ref().unwrap())
            .count();
        assert_eq!(admitted, 10);
    }
}
