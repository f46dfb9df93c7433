// Reaction Guard: progressive penalty escalation
// Violations accumulate in a capped 7-day history; the count inside the
// trailing 24 hours decides the penalty level. Levels only ever escalate
// while a penalty is active, never downgrade.

use anyhow::{Context, Result};
use chrono::{Duration, Utc};
use log::warn;
use serde_json::json;

use crate::config::PenaltyConfig;
use crate::models::{
    RateLimitAction, UserPenalty, ViolationHistory, ViolationRecord, ViolationType,
};
use crate::store::{get_json, StoreHandle};

fn user_violations_key(user_id: &str) -> String {
    format!("violations:user:{}", user_id)
}

fn ip_violations_key(ip: &str) -> String {
    format!("violations:ip:{}", ip)
}

fn penalty_key(user_id: &str) -> String {
    format!("penalty:user:{}", user_id)
}

pub struct PenaltyEscalator {
    store: StoreHandle,
    config: PenaltyConfig,
}

impl PenaltyEscalator {
    pub fn new(store: StoreHandle, config: PenaltyConfig) -> Self {
        Self { store, config }
    }

    /// Record a user violation and escalate if the trailing-24h count reaches
    /// a new level. Returns the newly applied penalty, if any.
    pub async fn record_violation(
        &self,
        user_id: &str,
        action: RateLimitAction,
        violation_type: ViolationType,
    ) -> Option<UserPenalty> {
        let history = match self
            .append_violation(&user_violations_key(user_id), action, violation_type)
            .await
        {
            Ok(history) => history,
            Err(e) => {
                warn!("violation append failed for {}: {}", user_id, e);
                return None;
            }
        };

        let count = self.count_in_window(&history);
        let level = self.level_for_count(count);
        if level == 0 {
            return None;
        }

        // Never replace an active penalty with an equal or lower one
        if let Some(existing) = self.check_active_penalty(user_id).await {
            if existing.level >= level {
                return None;
            }
        }

        let rung = self.config.levels[(level - 1) as usize];
        let now = Utc::now();
        let penalty = UserPenalty {
            user_id: user_id.to_string(),
            level,
            reason: format!(
                "{} violations in 24h (latest: {:?} on {})",
                count, violation_type, action
            ),
            applied_at: now,
            expires_at: now + Duration::seconds(rung.lockout_secs),
            multiplier: rung.multiplier,
        };

        let write = crate::store::set_json(
            self.store.as_ref(),
            &penalty_key(user_id),
            &penalty,
            rung.lockout_secs as u64,
        )
        .await;
        if let Err(e) = write {
            warn!("penalty write failed for {}: {}", user_id, e);
            return None;
        }
        warn!(
            "penalty level {} applied to {} until {}",
            level, user_id, penalty.expires_at
        );
        Some(penalty)
    }

    /// An unexpired penalty short-circuits every rate-limit check for the
    /// user. Store errors fail open to "no penalty".
    pub async fn check_active_penalty(&self, user_id: &str) -> Option<UserPenalty> {
        match get_json::<UserPenalty>(self.store.as_ref(), &penalty_key(user_id)).await {
            Ok(Some(penalty)) if penalty.is_active(Utc::now()) => Some(penalty),
            Ok(_) => None,
            Err(e) => {
                warn!("penalty lookup failed for {}: {}", user_id, e);
                None
            }
        }
    }

    /// Current level derived from the trailing-24h violation count. Zero
    /// means no limit tightening.
    pub async fn current_level(&self, user_id: &str) -> u8 {
        let history = self.violation_history(&user_violations_key(user_id)).await;
        self.level_for_count(self.count_in_window(&history))
    }

    /// Multiplier the current level divides limits by; 1.0 at level zero.
    pub fn multiplier_for_level(&self, level: u8) -> f64 {
        if level == 0 {
            1.0
        } else {
            self.config.levels[(level.min(5) - 1) as usize].multiplier
        }
    }

    /// Administrative unlock: drops the active penalty but keeps the
    /// violation history.
    pub async fn clear_penalty(&self, user_id: &str) -> Result<bool> {
        self.store
            .delete(&penalty_key(user_id))
            .await
            .context("failed to clear penalty")
    }

    pub async fn user_violations(&self, user_id: &str) -> Vec<ViolationRecord> {
        self.violation_history(&user_violations_key(user_id))
            .await
            .entries
    }

    /// IP violations are tracked independently and never feed the user's
    /// penalty level; they only gate CAPTCHA requirements.
    pub async fn record_ip_violation(
        &self,
        ip: &str,
        action: RateLimitAction,
        violation_type: ViolationType,
    ) {
        if let Err(e) = self
            .append_violation(&ip_violations_key(ip), action, violation_type)
            .await
        {
            warn!("ip violation append failed for {}: {}", ip, e);
        }
    }

    pub async fn ip_violations_last_hour(&self, ip: &str) -> u32 {
        let cutoff = Utc::now() - Duration::hours(1);
        self.violation_history(&ip_violations_key(ip))
            .await
            .entries
            .iter()
            .filter(|v| v.timestamp > cutoff)
            .count() as u32
    }

    fn count_in_window(&self, history: &ViolationHistory) -> u32 {
        let cutoff = Utc::now() - Duration::seconds(self.config.violation_window_secs);
        history
            .entries
            .iter()
            .filter(|v| v.timestamp > cutoff)
            .count() as u32
    }

    fn level_for_count(&self, count: u32) -> u8 {
        let mut level = 0u8;
        for (i, rung) in self.config.levels.iter().enumerate() {
            if count >= rung.violations {
                level = (i + 1) as u8;
            }
        }
        level
    }

    async fn violation_history(&self, key: &str) -> ViolationHistory {
        match get_json::<ViolationHistory>(self.store.as_ref(), key).await {
            Ok(Some(history)) => history,
            Ok(None) => ViolationHistory::default(),
            Err(e) => {
                warn!("violation read failed for {}: {}", key, e);
                ViolationHistory::default()
            }
        }
    }

    async fn append_violation(
        &self,
        key: &str,
        action: RateLimitAction,
        violation_type: ViolationType,
    ) -> Result<ViolationHistory, crate::error::StoreError> {
        let record = ViolationRecord {
            action,
            timestamp: Utc::now(),
            violation_type,
        };
        let cap = self.config.history_cap;
        let updated = self
            .store
            .atomic_update(key, self.config.violation_ttl_secs, &move |current| {
                let mut history: ViolationHistory = current
                    .and_then(|v| serde_json::from_value(v).ok())
                    .unwrap_or_default();
                history.entries.push(record.clone());
                if history.entries.len() > cap {
                    let excess = history.entries.len() - cap;
                    history.entries.drain(..excess);
                }
                serde_json::to_value(&history).unwrap_or_else(|_| json!({ "entries": [] }))
            })
            .await?;
        Ok(serde_json::from_value(updated)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use std::sync::Arc;

    fn escalator() -> PenaltyEscalator {
        PenaltyEscalator::new(Arc::new(MemoryStore::new()), PenaltyConfig::default())
    }

    #[tokio::test]
    async fn test_first_violation_applies_level_one() {
        let e = escalator();
        let penalty = e
            .record_violation(
                "user1",
                RateLimitAction::ScoreSubmission,
                ViolationType::RateLimitExceeded,
            )
            .await
            .expect("level 1 penalty");
        assert_eq!(penalty.level, 1);
        assert!((penalty.multiplier - 1.5).abs() < 1e-9);
        assert!(e.check_active_penalty("user1").await.is_some());
    }

    #[tokio::test]
    async fn test_five_violations_escalate_to_level_five() {
        let e = escalator();
        let mut last = None;
        for _ in 0..5 {
            if let Some(p) = e
                .record_violation(
                    "user1",
                    RateLimitAction::ScoreSubmission,
                    ViolationType::RateLimitExceeded,
                )
                .await
            {
                last = Some(p);
            }
        }
        let penalty = last.expect("penalty applied");
        assert_eq!(penalty.level, 5);
        assert!((penalty.multiplier - 10.0).abs() < 1e-9);

        // Hard lockout: the active penalty is returned until it expires
        let active = e.check_active_penalty("user1").await.unwrap();
        assert_eq!(active.level, 5);
        assert!(active.expires_at > Utc::now() + Duration::hours(23));
        assert_eq!(e.current_level("user1").await, 5);
    }

    #[tokio::test]
    async fn test_level_never_downgrades_while_active() {
        let e = escalator();
        for _ in 0..3 {
            let _ = e
                .record_violation(
                    "user1",
                    RateLimitAction::GameStart,
                    ViolationType::RateLimitExceeded,
                )
                .await;
        }
        let before = e.check_active_penalty("user1").await.unwrap();
        assert_eq!(before.level, 3);

        // A fourth violation escalates; a repeat at the same level does not
        // reset the clock
        let next = e
            .record_violation(
                "user1",
                RateLimitAction::GameStart,
                ViolationType::RateLimitExceeded,
            )
            .await
            .unwrap();
        assert_eq!(next.level, 4);
    }

    #[tokio::test]
    async fn test_clear_penalty_unlocks_but_keeps_history() {
        let e = escalator();
        let _ = e
            .record_violation(
                "user1",
                RateLimitAction::ScoreSubmission,
                ViolationType::RateLimitExceeded,
            )
            .await;
        assert!(e.check_active_penalty("user1").await.is_some());

        assert!(e.clear_penalty("user1").await.unwrap());
        assert!(e.check_active_penalty("user1").await.is_none());
        assert_eq!(e.user_violations("user1").await.len(), 1);
    }

    #[tokio::test]
    async fn test_ip_violations_are_independent() {
        let e = escalator();
        for _ in 0..3 {
            e.record_ip_violation(
                "10.0.0.9",
                RateLimitAction::ScoreSubmission,
                ViolationType::RateLimitExceeded,
            )
            .await;
        }
        assert_eq!(e.ip_violations_last_hour("10.0.0.9").await, 3);
        // No user penalty comes out of IP violations
        assert!(e.check_active_penalty("10.0.0.9").await.is_none());
        assert_eq!(e.current_level("10.0.0.9").await, 0);
    }

    #[tokio::test]
    async fn test_store_failure_fails_open_to_no_penalty() {
        let e = PenaltyEscalator::new(
            Arc::new(crate::store::testing::FailingStore),
            PenaltyConfig::default(),
        );

        let applied = e
            .record_violation(
                "user1",
                RateLimitAction::ScoreSubmission,
                ViolationType::RateLimitExceeded,
            )
            .await;
        assert!(applied.is_none());
        assert!(e.check_active_penalty("user1").await.is_none());
        assert_eq!(e.current_level("user1").await, 0);
        assert_eq!(e.ip_violations_last_hour("10.0.0.1").await, 0);
    }

    #[test]
    fn test_level_for_count() {
        let e = escalator();
        assert_eq!(e.level_for_count(0), 0);
        assert_eq!(e.level_for_count(1), 1);
        assert_eq!(e.level_for_count(3), 3);
        assert_eq!(e.level_for_count(5), 5);
        assert_eq!(e.level_for_count(40), 5);
    }
}
