// Reaction Guard: tunable thresholds and limits
// All detection thresholds are fixed constants by design (no adaptive
// computation); this module holds their defaults and the environment
// overrides used in deployment.

use anyhow::Result;
use lazy_static::lazy_static;
use std::collections::HashMap;
use std::env;

use crate::models::{ActionLimits, RateLimitAction};

lazy_static! {
    /// Default per-user limits by action.
    static ref DEFAULT_USER_LIMITS: HashMap<RateLimitAction, ActionLimits> = {
        let mut m = HashMap::new();
        m.insert(RateLimitAction::ScoreSubmission, ActionLimits { minute: 10, hour: 120, day: 500 });
        m.insert(RateLimitAction::GameStart, ActionLimits { minute: 15, hour: 200, day: 800 });
        m.insert(RateLimitAction::ChallengeCreate, ActionLimits { minute: 2, hour: 10, day: 30 });
        m.insert(RateLimitAction::ReportSubmit, ActionLimits { minute: 3, hour: 15, day: 40 });
        m.insert(RateLimitAction::AppealSubmit, ActionLimits { minute: 1, hour: 5, day: 10 });
        m
    };

    /// Per-IP limits are looser: several legitimate players can share a NAT.
    static ref DEFAULT_IP_LIMITS: HashMap<RateLimitAction, ActionLimits> = {
        let mut m = HashMap::new();
        m.insert(RateLimitAction::ScoreSubmission, ActionLimits { minute: 30, hour: 400, day: 2000 });
        m.insert(RateLimitAction::GameStart, ActionLimits { minute: 45, hour: 600, day: 3000 });
        m.insert(RateLimitAction::ChallengeCreate, ActionLimits { minute: 6, hour: 30, day: 100 });
        m.insert(RateLimitAction::ReportSubmit, ActionLimits { minute: 9, hour: 45, day: 120 });
        m.insert(RateLimitAction::AppealSubmit, ActionLimits { minute: 3, hour: 15, day: 30 });
        m
    };
}

// Plausibility band edges and context checks (milliseconds unless noted)
#[derive(Debug, Clone)]
pub struct PlausibilityThresholds {
    pub physically_impossible_ms: f64,
    pub impossibly_fast_ms: f64,
    pub superhuman_ms: f64,
    pub suspiciously_fast_ms: f64,
    pub very_fast_ms: f64,
    pub unusually_slow_ms: f64,
    pub round_number_ceiling_ms: f64,
    pub precision_ceiling_ms: f64,
    pub max_decimal_digits: u32,
    pub instant_submission_ms: i64,
    pub short_session_ms: i64,
    pub min_game_duration_ms: i64,
    pub mobile_floor_ms: f64,
    pub low_refresh_hz: f64,
    pub accept_confidence: f64,
    pub valid_confidence: f64,
}

impl Default for PlausibilityThresholds {
    fn default() -> Self {
        Self {
            physically_impossible_ms: 50.0,
            impossibly_fast_ms: 80.0,
            superhuman_ms: 100.0,
            suspiciously_fast_ms: 120.0,
            very_fast_ms: 150.0,
            unusually_slow_ms: 1000.0,
            round_number_ceiling_ms: 300.0,
            precision_ceiling_ms: 200.0,
            max_decimal_digits: 3,
            instant_submission_ms: 500,
            short_session_ms: 2000,
            min_game_duration_ms: 1500,
            mobile_floor_ms: 110.0,
            low_refresh_hz: 60.0,
            accept_confidence: 0.8,
            valid_confidence: 0.5,
        }
    }
}

#[derive(Debug, Clone)]
pub struct OutlierThresholds {
    pub min_samples: usize,
    pub analysis_window: usize,
    pub z_threshold: f64,
    pub dramatic_improvement: f64,
    pub significant_improvement: f64,
    pub bot_cov_threshold: f64,
    pub bot_min_samples: usize,
    pub history_cap: usize,
}

impl Default for OutlierThresholds {
    fn default() -> Self {
        Self {
            min_samples: 5,
            analysis_window: 20,
            z_threshold: 2.5,
            dramatic_improvement: 0.30,
            significant_improvement: 0.15,
            bot_cov_threshold: 0.12,
            bot_min_samples: 8,
            history_cap: 100,
        }
    }
}

#[derive(Debug, Clone)]
pub struct BehaviorThresholds {
    pub min_games_for_false_start_check: u32,
    pub low_false_start_rate: f64,
    pub high_false_start_rate: f64,
    pub machine_cov_threshold: f64,
    pub machine_min_samples: usize,
    pub unrealistic_improvement: f64,
    pub cov_scale: f64,
}

impl Default for BehaviorThresholds {
    fn default() -> Self {
        Self {
            min_games_for_false_start_check: 20,
            low_false_start_rate: 0.03,
            high_false_start_rate: 0.6,
            machine_cov_threshold: 0.05,
            machine_min_samples: 10,
            unrealistic_improvement: 0.28,
            cov_scale: 5.0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub user_limits: HashMap<RateLimitAction, ActionLimits>,
    pub ip_limits: HashMap<RateLimitAction, ActionLimits>,
    /// IP violations in the trailing hour before a CAPTCHA is required.
    pub captcha_ip_violations: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            user_limits: DEFAULT_USER_LIMITS.clone(),
            ip_limits: DEFAULT_IP_LIMITS.clone(),
            captcha_ip_violations: 3,
        }
    }
}

impl RateLimitConfig {
    pub fn user_limits_for(&self, action: RateLimitAction) -> ActionLimits {
        self.user_limits
            .get(&action)
            .copied()
            .unwrap_or(ActionLimits { minute: 10, hour: 100, day: 400 })
    }

    pub fn ip_limits_for(&self, action: RateLimitAction) -> ActionLimits {
        self.ip_limits
            .get(&action)
            .copied()
            .unwrap_or(ActionLimits { minute: 30, hour: 300, day: 1200 })
    }
}

/// One rung of the progressive-penalty ladder.
#[derive(Debug, Clone, Copy)]
pub struct PenaltyLevel {
    /// Violations in the trailing 24h that reach this level.
    pub violations: u32,
    /// Divides the (whitelist-adjusted) limits while the level is current.
    pub multiplier: f64,
    pub lockout_secs: i64,
}

#[derive(Debug, Clone)]
pub struct PenaltyConfig {
    pub levels: [PenaltyLevel; 5],
    pub violation_window_secs: i64,
    pub violation_ttl_secs: u64,
    pub history_cap: usize,
}

impl Default for PenaltyConfig {
    fn default() -> Self {
        Self {
            levels: [
                PenaltyLevel { violations: 1, multiplier: 1.5, lockout_secs: 5 * 60 },
                PenaltyLevel { violations: 2, multiplier: 2.0, lockout_secs: 15 * 60 },
                PenaltyLevel { violations: 3, multiplier: 3.0, lockout_secs: 60 * 60 },
                PenaltyLevel { violations: 4, multiplier: 5.0, lockout_secs: 6 * 60 * 60 },
                PenaltyLevel { violations: 5, multiplier: 10.0, lockout_secs: 24 * 60 * 60 },
            ],
            violation_window_secs: 86_400,
            violation_ttl_secs: 7 * 86_400,
            history_cap: 100,
        }
    }
}

// Hourly event counts that trigger each alert rule
#[derive(Debug, Clone)]
pub struct AlertThresholds {
    pub critical_violations: u32,
    pub suspicious_users: u32,
    pub rate_limit_violations: u32,
    pub anomaly_detections: u32,
}

impl Default for AlertThresholds {
    fn default() -> Self {
        Self {
            critical_violations: 5,
            suspicious_users: 10,
            rate_limit_violations: 50,
            anomaly_detections: 20,
        }
    }
}

/// Top-level configuration for the anti-abuse core.
#[derive(Debug, Clone, Default)]
pub struct SecurityConfig {
    pub plausibility: PlausibilityThresholds,
    pub outlier: OutlierThresholds,
    pub behavior: BehaviorThresholds,
    pub rate_limits: RateLimitConfig,
    pub penalties: PenaltyConfig,
    pub alerts: AlertThresholds,
}

/// Load configuration from defaults plus environment overrides.
pub fn load_config() -> Result<SecurityConfig> {
    // Load .env file if present
    dotenv::dotenv().ok();

    let mut config = SecurityConfig::default();
    load_from_env(&mut config);
    Ok(config)
}

fn load_from_env(config: &mut SecurityConfig) {
    if let Ok(value) = env::var("RG_Z_THRESHOLD") {
        if let Ok(value) = value.parse() {
            config.outlier.z_threshold = value;
        }
    }

    if let Ok(value) = env::var("RG_ACCEPT_CONFIDENCE") {
        if let Ok(value) = value.parse() {
            config.plausibility.accept_confidence = value;
        }
    }

    if let Ok(value) = env::var("RG_BOT_COV_THRESHOLD") {
        if let Ok(value) = value.parse() {
            config.outlier.bot_cov_threshold = value;
        }
    }

    if let Ok(value) = env::var("RG_CAPTCHA_IP_VIOLATIONS") {
        if let Ok(value) = value.parse() {
            config.rate_limits.captcha_ip_violations = value;
        }
    }

    // Per-action per-minute limit overrides, e.g. RG_LIMIT_SCORE_SUBMISSION_MINUTE=20
    for action in RateLimitAction::all() {
        let key = format!("RG_LIMIT_{}_MINUTE", action.as_str().to_uppercase());
        if let Ok(value) = env::var(&key) {
            if let Ok(value) = value.parse() {
                if let Some(limits) = config.rate_limits.user_limits.get_mut(&action) {
                    limits.minute = value;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_cover_every_action() {
        let config = SecurityConfig::default();
        for action in RateLimitAction::all() {
            assert!(config.rate_limits.user_limits.contains_key(&action));
            assert!(config.rate_limits.ip_limits.contains_key(&action));
        }
    }

    #[test]
    fn test_penalty_ladder_is_monotonic() {
        let config = PenaltyConfig::default();
        for pair in config.levels.windows(2) {
            assert!(pair[1].violations > pair[0].violations);
            assert!(pair[1].multiplier > pair[0].multiplier);
            assert!(pair[1].lockout_secs > pair[0].lockout_secs);
        }
    }

    #[test]
    fn test_ip_limits_are_looser_than_user_limits() {
        let config = RateLimitConfig::default();
        for action in RateLimitAction::all() {
            let user = config.user_limits_for(action);
            let ip = config.ip_limits_for(action);
            assert!(ip.minute >= user.minute);
            assert!(ip.hour >= user.hour);
            assert!(ip.day >= user.day);
        }
    }
}
