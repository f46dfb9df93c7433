// Reaction Guard: multi-period sliding-window rate limiting
// Three independent windows (minute/hour/day) per (identity, action), kept
// as pruned timestamp lists in the external store. Whitelist multipliers
// raise the base limits, the active penalty level divides them, in that
// order. A user deny records a violation; IP checks run a simpler
// single-tier pass against looser limits.

use chrono::{DateTime, Utc};
use log::warn;
use serde_json::json;
use std::sync::Arc;

use crate::config::RateLimitConfig;
use crate::models::{
    ActionLimits, ActionStatus, RateLimitAction, RateLimitData, RateLimitResult, RateLimitStatus,
    SecurityEvent, SecurityEventType, ViolationType, WhitelistLevel, WindowPeriod, WindowUsage,
};
use crate::monitoring::SecurityMonitor;
use crate::store::{get_json, StoreHandle};
use crate::utils::timestamp_to_datetime;

use super::penalty::PenaltyEscalator;
use super::whitelist::WhitelistService;

// Records self-expire if the identity goes quiet for a full day window
const WINDOW_TTL_SECS: u64 = 86_400;

fn user_window_key(user_id: &str, action: RateLimitAction) -> String {
    format!("ratelimit:user:{}:{}", user_id, action.as_str())
}

fn ip_window_key(ip: &str, action: RateLimitAction) -> String {
    format!("ratelimit:ip:{}:{}", ip, action.as_str())
}

/// Drop timestamps that have aged out of each period's window.
pub(crate) fn prune_windows(data: &mut RateLimitData, now_ms: i64) {
    for period in WindowPeriod::all() {
        let cutoff = now_ms - period.seconds() * 1000;
        data.window_mut(period).retain(|ts| *ts > cutoff);
    }
}

/// Whitelist multiplies first, then the penalty level divides; rounded down
/// with a floor of one so nobody is limited to zero.
pub(crate) fn adjusted_limit(base: u32, whitelist_multiplier: u32, penalty_multiplier: f64) -> u32 {
    let raised = (base * whitelist_multiplier) as f64;
    ((raised / penalty_multiplier).floor() as u32).max(1)
}

struct WindowViolation {
    period: WindowPeriod,
    limit: u32,
    reset_time: DateTime<Utc>,
}

/// Evaluate pruned windows against adjusted limits. On violation, the reset
/// time is when the oldest timestamp of the soonest-to-expire violated
/// window ages out.
fn evaluate_windows(
    data: &RateLimitData,
    limits: &ActionLimits,
    whitelist_multiplier: u32,
    penalty_multiplier: f64,
) -> (u32, Option<WindowViolation>) {
    let mut remaining = u32::MAX;
    let mut violation: Option<WindowViolation> = None;

    for period in WindowPeriod::all() {
        let limit = adjusted_limit(limits.limit(period), whitelist_multiplier, penalty_multiplier);
        let count = data.window(period).len() as u32;
        remaining = remaining.min(limit.saturating_sub(count));

        if count >= limit {
            if let Some(oldest) = data.window(period).iter().min() {
                let reset_time = timestamp_to_datetime(oldest + period.seconds() * 1000);
                let sooner = violation
                    .as_ref()
                    .map(|v| reset_time < v.reset_time)
                    .unwrap_or(true);
                if sooner {
                    violation = Some(WindowViolation { period, limit, reset_time });
                }
            }
        }
    }

    (remaining, violation)
}

pub struct RateLimiter {
    store: StoreHandle,
    config: RateLimitConfig,
    penalties: Arc<PenaltyEscalator>,
    whitelist: Arc<WhitelistService>,
    monitor: Arc<SecurityMonitor>,
}

impl RateLimiter {
    pub fn new(
        store: StoreHandle,
        config: RateLimitConfig,
        penalties: Arc<PenaltyEscalator>,
        whitelist: Arc<WhitelistService>,
        monitor: Arc<SecurityMonitor>,
    ) -> Self {
        Self {
            store,
            config,
            penalties,
            whitelist,
            monitor,
        }
    }

    /// Check whether the user (and optionally their IP) may perform the
    /// action. Never errors: store failures come back as an `Inconclusive`
    /// allow.
    pub async fn check_rate_limit(
        &self,
        user_id: &str,
        action: RateLimitAction,
        ip_address: Option<&str>,
        whitelist_level: Option<WhitelistLevel>,
    ) -> RateLimitResult {
        // 1. An unexpired penalty denies unconditionally, quota or not
        if let Some(penalty) = self.penalties.check_active_penalty(user_id).await {
            return RateLimitResult::denied(
                penalty.expires_at,
                format!(
                    "temporary lockout (penalty level {}) until {}",
                    penalty.level, penalty.expires_at
                ),
            );
        }

        // 2–3. Resolve multipliers: whitelist raises, penalty level divides
        let whitelist_multiplier = match whitelist_level {
            Some(level) => level.multiplier(),
            None => self
                .whitelist
                .get_level(user_id)
                .await
                .map(|l| l.multiplier())
                .unwrap_or(1),
        };
        let penalty_multiplier = self
            .penalties
            .multiplier_for_level(self.penalties.current_level(user_id).await);

        // 4. Evaluate usage against the three user windows
        let data = match get_json::<RateLimitData>(
            self.store.as_ref(),
            &user_window_key(user_id, action),
        )
        .await
        {
            Ok(data) => {
                let mut data = data.unwrap_or_default();
                prune_windows(&mut data, Utc::now().timestamp_millis());
                data
            }
            Err(e) => {
                warn!("rate limit read failed for {}: {}", user_id, e);
                return RateLimitResult::inconclusive();
            }
        };

        let limits = self.config.user_limits_for(action);
        let (remaining, violation) =
            evaluate_windows(&data, &limits, whitelist_multiplier, penalty_multiplier);

        if let Some(v) = violation {
            // 5. Record the violation before returning; this may escalate
            let applied = self
                .penalties
                .record_violation(user_id, action, ViolationType::RateLimitExceeded)
                .await;
            self.monitor
                .log_event(SecurityEvent {
                    event_type: SecurityEventType::RateLimitViolation,
                    user_id: Some(user_id.to_string()),
                    reporter_id: None,
                    data: Some(json!({
                        "action": action.as_str(),
                        "window": v.period.label(),
                        "limit": v.limit,
                    })),
                })
                .await;
            if let Some(penalty) = applied {
                self.monitor
                    .log_event(SecurityEvent {
                        event_type: SecurityEventType::PenaltyApplied,
                        user_id: Some(user_id.to_string()),
                        reporter_id: None,
                        data: Some(json!({
                            "level": penalty.level,
                            "expires_at": penalty.expires_at,
                        })),
                    })
                    .await;
            }
            return RateLimitResult::denied(
                v.reset_time,
                format!(
                    "{} limit ({}) reached for {}",
                    v.period.label(),
                    v.limit,
                    action
                ),
            );
        }

        // 6. IP tier: single pass against looser limits, no multipliers
        if let Some(ip) = ip_address {
            if let Some(result) = self.check_ip(ip, action).await {
                return result;
            }
        }

        RateLimitResult::allowed(remaining)
    }

    async fn check_ip(&self, ip: &str, action: RateLimitAction) -> Option<RateLimitResult> {
        let data = match get_json::<RateLimitData>(self.store.as_ref(), &ip_window_key(ip, action))
            .await
        {
            Ok(data) => {
                let mut data = data.unwrap_or_default();
                prune_windows(&mut data, Utc::now().timestamp_millis());
                data
            }
            Err(e) => {
                warn!("ip rate limit read failed for {}: {}", ip, e);
                return None;
            }
        };

        let limits = self.config.ip_limits_for(action);
        let (_, violation) = evaluate_windows(&data, &limits, 1, 1.0);
        let v = violation?;

        self.penalties
            .record_ip_violation(ip, action, ViolationType::RateLimitExceeded)
            .await;
        self.monitor
            .log_event(SecurityEvent {
                event_type: SecurityEventType::RateLimitViolation,
                user_id: None,
                reporter_id: None,
                data: Some(json!({
                    "ip": ip,
                    "action": action.as_str(),
                    "window": v.period.label(),
                    "limit": v.limit,
                })),
            })
            .await;
        Some(RateLimitResult::denied(
            v.reset_time,
            format!(
                "ip {} limit ({}) reached for {}",
                v.period.label(),
                v.limit,
                action
            ),
        ))
    }

    /// Record a successful action in all three windows, for the user and the
    /// IP namespace. Atomic per key: concurrent recordings never lose writes.
    pub async fn record_action(&self, user_id: &str, action: RateLimitAction, ip_address: Option<&str>) {
        self.append_timestamp(&user_window_key(user_id, action)).await;
        if let Some(ip) = ip_address {
            self.append_timestamp(&ip_window_key(ip, action)).await;
        }
    }

    async fn append_timestamp(&self, key: &str) {
        let now_ms = Utc::now().timestamp_millis();
        let result = self
            .store
            .atomic_update(key, WINDOW_TTL_SECS, &move |current| {
                let mut data: RateLimitData = current
                    .and_then(|v| serde_json::from_value(v).ok())
                    .unwrap_or_default();
                prune_windows(&mut data, now_ms);
                data.minute.push(now_ms);
                data.hour.push(now_ms);
                data.day.push(now_ms);
                serde_json::to_value(&data).unwrap_or_else(|_| json!({
                    "minute": [], "hour": [], "day": []
                }))
            })
            .await;
        if let Err(e) = result {
            warn!("rate limit append failed for {}: {}", key, e);
        }
    }

    /// Read-only usage breakdown across every action. Calling this twice
    /// without an intervening `record_action` yields identical counts.
    pub async fn get_rate_limit_status(&self, user_id: &str) -> RateLimitStatus {
        let whitelist_multiplier = self
            .whitelist
            .get_level(user_id)
            .await
            .map(|l| l.multiplier())
            .unwrap_or(1);
        let penalty_multiplier = self
            .penalties
            .multiplier_for_level(self.penalties.current_level(user_id).await);
        let now_ms = Utc::now().timestamp_millis();

        let mut actions = Vec::new();
        for action in RateLimitAction::all() {
            let mut data = match get_json::<RateLimitData>(
                self.store.as_ref(),
                &user_window_key(user_id, action),
            )
            .await
            {
                Ok(data) => data.unwrap_or_default(),
                Err(e) => {
                    warn!("rate limit status read failed for {}: {}", user_id, e);
                    RateLimitData::default()
                }
            };
            prune_windows(&mut data, now_ms);

            let limits = self.config.user_limits_for(action);
            let usage = |period: WindowPeriod| {
                let limit =
                    adjusted_limit(limits.limit(period), whitelist_multiplier, penalty_multiplier);
                let used = data.window(period).len() as u32;
                WindowUsage {
                    used,
                    limit,
                    remaining: limit.saturating_sub(used),
                    resets_at: data
                        .window(period)
                        .iter()
                        .min()
                        .map(|oldest| timestamp_to_datetime(oldest + period.seconds() * 1000)),
                }
            };
            actions.push(ActionStatus {
                action,
                minute: usage(WindowPeriod::Minute),
                hour: usage(WindowPeriod::Hour),
                day: usage(WindowPeriod::Day),
            });
        }

        RateLimitStatus {
            user_id: user_id.to_string(),
            generated_at: Utc::now(),
            actions,
        }
    }

    /// CAPTCHA gate driven purely by IP violations, independent of any
    /// user's penalty state.
    pub async fn requires_captcha(&self, ip: &str) -> bool {
        self.penalties.ip_violations_last_hour(ip).await >= self.config.captcha_ip_violations
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{PenaltyConfig, SecurityConfig};
    use crate::store::MemoryStore;

    fn limiter() -> RateLimiter {
        let store: StoreHandle = Arc::new(MemoryStore::new());
        let config = SecurityConfig::default();
        let penalties = Arc::new(PenaltyEscalator::new(store.clone(), PenaltyConfig::default()));
        let whitelist = Arc::new(WhitelistService::new(store.clone()));
        let monitor = Arc::new(SecurityMonitor::new(store.clone(), config.alerts.clone()));
        RateLimiter::new(store, config.rate_limits, penalties, whitelist, monitor)
    }

    #[tokio::test]
    async fn test_minute_limit_denies_the_eleventh_submission() {
        let rl = limiter();
        for _ in 0..10 {
            let result = rl
                .check_rate_limit("user1", RateLimitAction::ScoreSubmission, None, None)
                .await;
            assert!(result.allowed);
            rl.record_action("user1", RateLimitAction::ScoreSubmission, None)
                .await;
        }

        let result = rl
            .check_rate_limit("user1", RateLimitAction::ScoreSubmission, None, None)
            .await;
        assert!(!result.allowed);
        assert!(result.reason.as_ref().unwrap().contains("minute limit (10)"));
        assert!(result.reset_time.is_some());
    }

    #[tokio::test]
    async fn test_denial_applies_penalty_which_then_hard_denies() {
        let rl = limiter();
        for _ in 0..10 {
            rl.record_action("user1", RateLimitAction::ScoreSubmission, None)
                .await;
        }

        // The failed check records a violation, which applies a level-1
        // penalty; from then on the lockout denies before any window math.
        let denied = rl
            .check_rate_limit("user1", RateLimitAction::ScoreSubmission, None, None)
            .await;
        assert!(!denied.allowed);

        let locked = rl
            .check_rate_limit("user1", RateLimitAction::ChallengeCreate, None, None)
            .await;
        assert!(!locked.allowed);
        assert!(locked.reason.as_ref().unwrap().contains("lockout"));
    }

    #[tokio::test]
    async fn test_whitelist_raises_limits() {
        let rl = limiter();
        for _ in 0..10 {
            rl.record_action("mod1", RateLimitAction::ScoreSubmission, None)
                .await;
        }

        // 10 actions exhaust the base minute limit but not the 5x one
        let result = rl
            .check_rate_limit(
                "mod1",
                RateLimitAction::ScoreSubmission,
                None,
                Some(WhitelistLevel::Moderator),
            )
            .await;
        assert!(result.allowed);
    }

    #[tokio::test]
    async fn test_status_is_idempotent() {
        let rl = limiter();
        for _ in 0..4 {
            rl.record_action("user1", RateLimitAction::ScoreSubmission, None)
                .await;
        }

        let first = rl.get_rate_limit_status("user1").await;
        let second = rl.get_rate_limit_status("user1").await;
        let used = |s: &RateLimitStatus| {
            s.actions
                .iter()
                .map(|a| (a.action, a.minute.used, a.hour.used, a.day.used))
                .collect::<Vec<_>>()
        };
        assert_eq!(used(&first), used(&second));

        let score = first
            .actions
            .iter()
            .find(|a| a.action == RateLimitAction::ScoreSubmission)
            .unwrap();
        assert_eq!(score.minute.used, 4);
        assert_eq!(score.minute.remaining, 6);
        assert_eq!(score.day.used, 4);
    }

    #[tokio::test]
    async fn test_ip_tier_blocks_independently() {
        let rl = limiter();
        // Drive the shared IP over its minute limit with distinct users
        for i in 0..30 {
            rl.record_action(
                &format!("user{}", i),
                RateLimitAction::ScoreSubmission,
                Some("10.0.0.5"),
            )
            .await;
        }

        let result = rl
            .check_rate_limit(
                "fresh_user",
                RateLimitAction::ScoreSubmission,
                Some("10.0.0.5"),
                None,
            )
            .await;
        assert!(!result.allowed);
        assert!(result.reason.as_ref().unwrap().contains("ip"));

        // The fresh user carries no penalty from the IP denial
        let elsewhere = rl
            .check_rate_limit("fresh_user", RateLimitAction::ScoreSubmission, None, None)
            .await;
        assert!(elsewhere.allowed);
    }

    #[tokio::test]
    async fn test_captcha_after_repeated_ip_violations() {
        let rl = limiter();
        for i in 0..30 {
            rl.record_action(
                &format!("user{}", i),
                RateLimitAction::ScoreSubmission,
                Some("10.0.0.7"),
            )
            .await;
        }
        assert!(!rl.requires_captcha("10.0.0.7").await);
        for i in 0..3 {
            let result = rl
                .check_rate_limit(
                    &format!("other{}", i),
                    RateLimitAction::ScoreSubmission,
                    Some("10.0.0.7"),
                    None,
                )
                .await;
            assert!(!result.allowed);
        }
        assert!(rl.requires_captcha("10.0.0.7").await);
    }

    #[tokio::test]
    async fn test_store_failure_fails_open_as_inconclusive() {
        use crate::models::RateLimitVerdict;

        let store: StoreHandle = Arc::new(crate::store::testing::FailingStore);
        let config = SecurityConfig::default();
        let penalties = Arc::new(PenaltyEscalator::new(store.clone(), PenaltyConfig::default()));
        let whitelist = Arc::new(WhitelistService::new(store.clone()));
        let monitor = Arc::new(SecurityMonitor::new(store.clone(), config.alerts.clone()));
        let rl = RateLimiter::new(store, config.rate_limits, penalties, whitelist, monitor);

        // With the backend down the check must not block the player, and the
        // verdict must say the windows were never consulted
        let result = rl
            .check_rate_limit(
                "user1",
                RateLimitAction::ScoreSubmission,
                Some("10.0.0.1"),
                None,
            )
            .await;
        assert!(result.allowed);
        assert_eq!(result.verdict, RateLimitVerdict::Inconclusive);
        assert!(result.reason.is_none());

        // Recording and status reads degrade without erroring
        rl.record_action("user1", RateLimitAction::ScoreSubmission, None)
            .await;
        let status = rl.get_rate_limit_status("user1").await;
        assert!(status.actions.iter().all(|a| a.minute.used == 0));
        assert!(!rl.requires_captcha("10.0.0.1").await);
    }

    #[test]
    fn test_adjusted_limit_arithmetic() {
        // base x whitelist / penalty, rounded down, floor 1
        assert_eq!(adjusted_limit(10, 1, 1.0), 10);
        assert_eq!(adjusted_limit(10, 5, 1.0), 50);
        assert_eq!(adjusted_limit(10, 1, 3.0), 3);
        assert_eq!(adjusted_limit(10, 5, 3.0), 16);
        assert_eq!(adjusted_limit(10, 1, 10.0), 1);
        assert_eq!(adjusted_limit(1, 1, 10.0), 1);
        assert_eq!(adjusted_limit(10, 2, 1.5), 13);
    }

    #[test]
    fn test_window_counts_never_grow_as_time_advances() {
        let base_ms = 1_700_000_000_000i64;
        let mut data = RateLimitData::default();
        for i in 0..8 {
            let ts = base_ms + i * 10_000; // one every 10s
            data.minute.push(ts);
            data.hour.push(ts);
            data.day.push(ts);
        }

        let mut previous = (usize::MAX, usize::MAX, usize::MAX);
        for offset_secs in [0i64, 30, 70, 600, 3_700, 90_000] {
            let mut snapshot = data.clone();
            prune_windows(&mut snapshot, base_ms + offset_secs * 1000);
            let counts = (
                snapshot.minute.len(),
                snapshot.hour.len(),
                snapshot.day.len(),
            );
            assert!(counts.0 <= previous.0);
            assert!(counts.1 <= previous.1);
            assert!(counts.2 <= previous.2);
            previous = counts;
        }
    }

    #[test]
    fn test_hour_window_blocks_after_minute_entries_expire() {
        let base_ms = 1_700_000_000_000i64;
        let mut data = RateLimitData::default();
        // 120 actions spread over the last hour, all older than a minute
        for i in 0..120 {
            let ts = base_ms - 120_000 - i * 20_000;
            data.minute.push(ts);
            data.hour.push(ts);
            data.day.push(ts);
        }
        prune_windows(&mut data, base_ms);
        assert!(data.minute.is_empty());
        assert_eq!(data.hour.len(), 120);

        let limits = ActionLimits { minute: 10, hour: 120, day: 500 };
        let (_, violation) = evaluate_windows(&data, &limits, 1, 1.0);
        let v = violation.expect("hour window must still block");
        assert_eq!(v.period, WindowPeriod::Hour);
    }
}
