// Reaction Guard: score validation pipeline
// A submission passes plausibility first; unless outright rejected, the
// outlier and behavior checks run against the user's stored history and the
// combined confidence drives a single accept/flag/reject decision. Rejected
// and bot-grade submissions also count against the penalty ladder.

pub mod behavior;
pub mod outlier;
pub mod plausibility;
pub(crate) mod stats;

pub use behavior::BehaviorProfiler;
pub use outlier::OutlierDetector;
pub use plausibility::PlausibilityValidator;

use log::warn;
use serde_json::json;
use std::sync::Arc;

use crate::config::SecurityConfig;
use crate::monitoring::SecurityMonitor;
use crate::models::{
    OutlierReason, RateLimitAction, ScoreSubmission, SecurityEvent, SecurityEventType,
    SessionStatistics, SubmissionAssessment, ValidationAction, ValidationFlag, ViolationType,
};
use crate::rate_limit::PenaltyEscalator;
use crate::store::{get_json, StoreHandle};

const HISTORY_TTL_SECS: u64 = 30 * 86_400;

fn history_key(user_id: &str) -> String {
    format!("validation:history:{}", user_id)
}

/// Per-user rolling reaction-time history, capped, stored externally so every
/// handler instance sees the same samples.
pub struct ReactionHistory {
    store: StoreHandle,
    cap: usize,
}

impl ReactionHistory {
    pub fn new(store: StoreHandle, cap: usize) -> Self {
        Self { store, cap }
    }

    /// Read the user's history. Store failures yield an empty history so the
    /// statistical checks degrade to "insufficient data" instead of erroring.
    pub async fn get_times(&self, user_id: &str) -> Vec<f64> {
        match get_json::<Vec<f64>>(self.store.as_ref(), &history_key(user_id)).await {
            Ok(Some(times)) => times,
            Ok(None) => Vec::new(),
            Err(e) => {
                warn!("history read failed for {}: {}", user_id, e);
                Vec::new()
            }
        }
    }

    /// Append an accepted time, dropping the oldest entries past the cap.
    pub async fn append_time(&self, user_id: &str, time_ms: f64) {
        let cap = self.cap;
        let result = self
            .store
            .atomic_update(&history_key(user_id), HISTORY_TTL_SECS, &move |current| {
                let mut times: Vec<f64> = current
                    .and_then(|v| serde_json::from_value(v).ok())
                    .unwrap_or_default();
                times.push(time_ms);
                if times.len() > cap {
                    let excess = times.len() - cap;
                    times.drain(..excess);
                }
                json!(times)
            })
            .await;
        if let Err(e) = result {
            warn!("history append failed for {}: {}", user_id, e);
        }
    }
}

// Weights for combining the three checks into one confidence. Clean outlier
// and behavior results contribute their full weight so a plausible score
// from a user with no history is not penalized.
const PLAUSIBILITY_WEIGHT: f64 = 0.5;
const OUTLIER_WEIGHT: f64 = 0.3;
const BEHAVIOR_WEIGHT: f64 = 0.2;

pub struct ScoreValidator {
    plausibility: PlausibilityValidator,
    outlier: OutlierDetector,
    behavior: BehaviorProfiler,
    history: ReactionHistory,
    monitor: Arc<SecurityMonitor>,
    penalties: Arc<PenaltyEscalator>,
    accept_confidence: f64,
    valid_confidence: f64,
}

impl ScoreValidator {
    pub fn new(
        config: &SecurityConfig,
        store: StoreHandle,
        monitor: Arc<SecurityMonitor>,
        penalties: Arc<PenaltyEscalator>,
    ) -> Self {
        Self {
            plausibility: PlausibilityValidator::new(config.plausibility.clone()),
            outlier: OutlierDetector::new(config.outlier.clone()),
            behavior: BehaviorProfiler::new(config.behavior.clone()),
            history: ReactionHistory::new(store, config.outlier.history_cap),
            monitor,
            penalties,
            accept_confidence: config.plausibility.accept_confidence,
            valid_confidence: config.plausibility.valid_confidence,
        }
    }

    /// Outright-fraudulent submissions count against the same progressive
    /// penalty ladder as rate-limit violations.
    async fn escalate(&self, user_id: &str, violation_type: ViolationType) {
        if let Some(penalty) = self
            .penalties
            .record_violation(user_id, RateLimitAction::ScoreSubmission, violation_type)
            .await
        {
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
    }

    pub fn history(&self) -> &ReactionHistory {
        &self.history
    }

    /// Run the full pipeline for one submission. Total over its inputs:
    /// malformed values come back as rejections, never as errors.
    pub async fn validate_submission(
        &self,
        user_id: &str,
        submission: &ScoreSubmission,
        session_stats: &SessionStatistics,
    ) -> SubmissionAssessment {
        let validation = self.plausibility.validate(
            submission.reaction_time_ms,
            &submission.session,
            submission.device.as_ref(),
            submission.game_started_at,
        );

        if validation.action == ValidationAction::Reject {
            let event_type = if validation.flags.iter().any(|f| {
                matches!(
                    f,
                    ValidationFlag::PhysicallyImpossible | ValidationFlag::ImpossiblyFast
                )
            }) {
                SecurityEventType::ImpossibleTime
            } else {
                SecurityEventType::SuspiciousActivity
            };
            self.monitor
                .log_event(SecurityEvent {
                    event_type,
                    user_id: Some(user_id.to_string()),
                    reporter_id: None,
                    data: Some(json!({
                        "reaction_time_ms": submission.reaction_time_ms,
                        "flags": validation.flags,
                    })),
                })
                .await;
            self.escalate(user_id, ViolationType::ImplausibleScore).await;
            let confidence = validation.confidence;
            return SubmissionAssessment {
                validation,
                outlier: None,
                behavior: None,
                combined_confidence: confidence,
                action: ValidationAction::Reject,
            };
        }

        let history = self.history.get_times(user_id).await;
        let outlier = self.outlier.analyze(
            submission.reaction_time_ms,
            &history,
            submission.context.as_ref(),
        );
        let behavior = self.behavior.profile(session_stats, &history);

        // A suspicious analysis subtracts from its weight in proportion to
        // its confidence; a clean one contributes the full weight.
        let outlier_term = if outlier.is_outlier {
            1.0 - outlier.confidence
        } else {
            1.0
        };
        let behavior_term =
            (1.0 - 0.25 * behavior.suspicious_flags.len() as f64).max(0.0);

        let combined_confidence = (PLAUSIBILITY_WEIGHT * validation.confidence
            + OUTLIER_WEIGHT * outlier_term
            + BEHAVIOR_WEIGHT * behavior_term)
            .clamp(0.0, 1.0);

        let action = if combined_confidence >= self.accept_confidence {
            ValidationAction::Accept
        } else {
            ValidationAction::Flag
        };

        if outlier.is_outlier {
            let bot_like = matches!(
                outlier.reason,
                OutlierReason::BotLikeConsistency | OutlierReason::ZeroVariance
            );
            let event_type = if bot_like {
                SecurityEventType::BotDetection
            } else {
                SecurityEventType::AnomalyDetection
            };
            self.monitor
                .log_event(SecurityEvent {
                    event_type,
                    user_id: Some(user_id.to_string()),
                    reporter_id: None,
                    data: Some(json!({
                        "reaction_time_ms": submission.reaction_time_ms,
                        "z_score": outlier.z_score,
                        "reason": outlier.reason,
                    })),
                })
                .await;
            if bot_like {
                self.escalate(user_id, ViolationType::StatisticalOutlier).await;
            }
        }
        if !behavior.suspicious_flags.is_empty() {
            self.monitor
                .log_event(SecurityEvent {
                    event_type: SecurityEventType::SuspiciousActivity,
                    user_id: Some(user_id.to_string()),
                    reporter_id: None,
                    data: Some(json!({ "behavior_flags": behavior.suspicious_flags })),
                })
                .await;
            // One behavior flag alone is weak evidence; two independent ones
            // on a submission that did not earn an accept go on the record.
            if behavior.suspicious_flags.len() >= 2 && action == ValidationAction::Flag {
                self.escalate(user_id, ViolationType::BehavioralAnomaly).await;
            }
        }

        if action == ValidationAction::Accept {
            self.history
                .append_time(user_id, submission.reaction_time_ms)
                .await;
        }

        let mut validation = validation;
        validation.is_valid = combined_confidence > self.valid_confidence
            && !validation.has_auto_reject_flag();
        SubmissionAssessment {
            validation,
            outlier: Some(outlier),
            behavior: Some(behavior),
            combined_confidence,
            action,
        }
    }
}
