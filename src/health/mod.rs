use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::db::models::Model;
use crate::db::Database;
use crate::error::Result;

/// Consecutive failures after which a model is taken out of rotation.
pub const AUTO_DISABLE_THRESHOLD: i64 = 3;
/// Stored failure reasons are cut to this many characters.
pub const MAX_REASON_CHARS: usize = 500;

/// Result of recording one failed model invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureOutcome {
    pub consecutive_failures: i64,
    pub auto_disabled: bool,
    /// True only for the failure that crossed the threshold
    pub newly_disabled: bool,
}

/// Tracks model invocation health and auto-disables flaky models.
///
/// Every write is a single UPDATE evaluated by SQLite, so two concurrent
/// failures can never both observe a count below the threshold.
#[derive(Clone)]
pub struct ModelHealthMonitor {
    db: Database,
}

impl ModelHealthMonitor {
    pub fn new(db: Database) -> Self {
        ModelHealthMonitor { db }
    }

    pub fn register_model(&self, id: &str, display_name: &str) -> Result<()> {
        self.db.upsert_model(id, display_name)
    }

    pub fn list_models(&self) -> Result<Vec<Model>> {
        self.db.list_models()
    }

    /// Models the orchestrator should invoke: active and not auto-disabled.
    pub fn available_models(&self) -> Result<Vec<Model>> {
        Ok(self
            .db
            .list_models()?
            .into_iter()
            .filter(|m| m.active && !should_skip_model(m))
            .collect())
    }

    pub fn set_active(&self, id: &str, active: bool) -> Result<()> {
        self.db.set_model_active(id, active)?;
        info!("Model {} {}", id, if active { "activated" } else { "deactivated" });
        Ok(())
    }

    pub fn record_success(&self, model_id: &str) -> Result<()> {
        self.db.mark_model_success(model_id, Utc::now())
    }

    pub fn record_failure(&self, model_id: &str, reason: &str) -> Result<FailureOutcome> {
        let reason = truncate_reason(reason);
        let (consecutive_failures, auto_disabled) = self.db.mark_model_failure(
            model_id,
            &reason,
            AUTO_DISABLE_THRESHOLD,
            Utc::now(),
        )?;
        // resets always zero the counter, so only one call can land exactly on it
        let newly_disabled = auto_disabled && consecutive_failures == AUTO_DISABLE_THRESHOLD;
        if newly_disabled {
            warn!(
                "⛔ Model {} auto-disabled after {} consecutive failures: {}",
                model_id, consecutive_failures, reason
            );
        } else {
            warn!(
                "Model {} failed ({} in a row): {}",
                model_id, consecutive_failures, reason
            );
        }
        Ok(FailureOutcome {
            consecutive_failures,
            auto_disabled,
            newly_disabled,
        })
    }

    /// Manual override after an operator fixed the underlying problem.
    pub fn re_enable(&self, model_id: &str) -> Result<()> {
        self.db.clear_model_disable(model_id)?;
        info!("Model {} re-enabled", model_id);
        Ok(())
    }
}

/// Whether the scheduler should skip invoking this model.
pub fn should_skip_model(model: &Model) -> bool {
    model.auto_disabled
}

fn truncate_reason(reason: &str) -> String {
    reason.chars().take(MAX_REASON_CHARS).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CoreError;

    fn monitor() -> ModelHealthMonitor {
        let db = Database::open_in_memory().unwrap();
        let m = ModelHealthMonitor::new(db);
        m.register_model("gpt", "GPT").unwrap();
        m
    }

    fn model(m: &ModelHealthMonitor) -> Model {
        m.db.get_model("gpt").unwrap().unwrap()
    }

    #[test]
    fn third_failure_disables() {
        let m = monitor();
        let first = m.record_failure("gpt", "timeout").unwrap();
        assert!(!first.auto_disabled);
        let second = m.record_failure("gpt", "timeout").unwrap();
        assert!(!second.auto_disabled);
        let third = m.record_failure("gpt", "bad json").unwrap();
        assert!(third.auto_disabled);
        assert!(third.newly_disabled);
        assert_eq!(third.consecutive_failures, 3);

        let fourth = m.record_failure("gpt", "still broken").unwrap();
        assert!(fourth.auto_disabled);
        assert!(!fourth.newly_disabled);

        let row = model(&m);
        assert!(should_skip_model(&row));
        assert_eq!(row.failure_reason.as_deref(), Some("still broken"));
        assert!(row.last_failure_at.is_some());
    }

    #[test]
    fn success_resets_health() {
        let m = monitor();
        for _ in 0..3 {
            m.record_failure("gpt", "timeout").unwrap();
        }
        m.record_success("gpt").unwrap();
        let row = model(&m);
        assert_eq!(row.consecutive_failures, 0);
        assert!(!row.auto_disabled);
        assert!(row.failure_reason.is_none());
        assert!(row.last_success_at.is_some());
        assert!(!should_skip_model(&row));
    }

    #[test]
    fn disabled_and_inactive_models_are_not_available() {
        let m = monitor();
        m.register_model("claude", "Claude").unwrap();
        m.register_model("llama", "Llama").unwrap();
        for _ in 0..3 {
            m.record_failure("gpt", "timeout").unwrap();
        }
        m.set_active("llama", false).unwrap();
        let ids: Vec<String> = m.available_models().unwrap().into_iter().map(|x| x.id).collect();
        assert_eq!(ids, vec!["claude".to_string()]);
    }

    #[test]
    fn intervening_success_prevents_disable() {
        let m = monitor();
        m.record_failure("gpt", "a").unwrap();
        m.record_failure("gpt", "b").unwrap();
        m.record_success("gpt").unwrap();
        let out = m.record_failure("gpt", "c").unwrap();
        assert_eq!(out.consecutive_failures, 1);
        assert!(!out.auto_disabled);
    }

    #[test]
    fn re_enable_clears_state() {
        let m = monitor();
        for _ in 0..4 {
            m.record_failure("gpt", "timeout").unwrap();
        }
        m.re_enable("gpt").unwrap();
        let row = model(&m);
        assert!(!row.auto_disabled);
        assert_eq!(row.consecutive_failures, 0);
        assert!(row.failure_reason.is_none());
        assert!(row.last_success_at.is_none());
    }

    #[test]
    fn long_reason_is_truncated_on_char_boundary() {
        let m = monitor();
        let reason = "é".repeat(800);
        m.record_failure("gpt", &reason).unwrap();
        let stored = model(&m).failure_reason.unwrap();
        assert_eq!(stored.chars().count(), MAX_REASON_CHARS);
    }

    #[test]
    fn unknown_model_is_not_found() {
        let m = monitor();
        assert!(matches!(
            m.record_failure("nope", "x"),
            Err(CoreError::NotFound { .. })
        ));
        assert!(matches!(
            m.record_success("nope"),
            Err(CoreError::NotFound { .. })
        ));
    }

    #[test]
    fn concurrent_failures_disable_exactly_once() {
        let m = monitor();
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let m = m.clone();
                std::thread::spawn(move || m.record_failure("gpt", &format!("err {}", i)).unwrap())
            })
            .collect();
        let outcomes: Vec<FailureOutcome> =
            handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(outcomes.iter().filter(|o| o.newly_disabled).count(), 1);
        assert_eq!(model(&m).consecutive_failures, 8);
        assert!(model(&m).auto_disabled);
    }
}
