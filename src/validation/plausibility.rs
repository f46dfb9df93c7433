// Reaction Guard: plausibility validation
// Bounds a single reaction time against physiological limits, device timing
// capability, and session/game duration. Pure function of its inputs; no
// history comparison happens here.

use chrono::{DateTime, Utc};
use log::debug;

use crate::config::PlausibilityThresholds;
use crate::models::{
    DeviceCapabilities, SessionData, ValidationAction, ValidationFlag, ValidationResult,
};

pub struct PlausibilityValidator {
    thresholds: PlausibilityThresholds,
}

impl PlausibilityValidator {
    pub fn new(thresholds: PlausibilityThresholds) -> Self {
        Self { thresholds }
    }

    /// Validate a submitted reaction time against physical and device limits.
    pub fn validate(
        &self,
        reaction_time_ms: f64,
        session: &SessionData,
        device: Option<&DeviceCapabilities>,
        game_started_at: Option<DateTime<Utc>>,
    ) -> ValidationResult {
        self.validate_at(Utc::now(), reaction_time_ms, session, device, game_started_at)
    }

    /// Same as `validate`, with an explicit evaluation instant.
    pub fn validate_at(
        &self,
        now: DateTime<Utc>,
        reaction_time_ms: f64,
        session: &SessionData,
        device: Option<&DeviceCapabilities>,
        game_started_at: Option<DateTime<Utc>>,
    ) -> ValidationResult {
        let t = &self.thresholds;

        if !reaction_time_ms.is_finite() {
            return ValidationResult {
                is_valid: false,
                confidence: 0.0,
                flags: vec![ValidationFlag::NonFiniteInput],
                action: ValidationAction::Reject,
            };
        }

        let mut flags: Vec<ValidationFlag> = Vec::new();
        let mut confidence: f64 = 1.0;

        // Magnitude bands. Each band below 150ms lowers confidence further;
        // sub-80ms times are beyond human reaction and auto-reject.
        if reaction_time_ms < t.physically_impossible_ms {
            flags.push(ValidationFlag::PhysicallyImpossible);
            confidence = 0.0;
        } else if reaction_time_ms < t.impossibly_fast_ms {
            flags.push(ValidationFlag::ImpossiblyFast);
            confidence = confidence.min(0.05);
        } else if reaction_time_ms < t.superhuman_ms {
            flags.push(ValidationFlag::Superhuman);
            confidence = confidence.min(0.15);
        } else if reaction_time_ms < t.suspiciously_fast_ms {
            flags.push(ValidationFlag::SuspiciouslyFast);
            confidence = confidence.min(0.35);
        } else if reaction_time_ms < t.very_fast_ms {
            flags.push(ValidationFlag::VeryFast);
            confidence = confidence.min(0.6);
        } else if reaction_time_ms > t.unusually_slow_ms {
            flags.push(ValidationFlag::UnusuallySlow);
            confidence = confidence.min(0.8);
        }

        // Precision analysis. Machine-generated inputs tend to be "clean":
        // round multiples of 10ms or integer values where real timers report
        // sub-millisecond fractions.
        if reaction_time_ms % 10.0 == 0.0 && reaction_time_ms < t.round_number_ceiling_ms {
            flags.push(ValidationFlag::RoundNumber);
            confidence -= 0.1;
        }
        if reaction_time_ms.fract() == 0.0 && reaction_time_ms < t.precision_ceiling_ms {
            flags.push(ValidationFlag::MissingPrecision);
            confidence -= 0.1;
        }
        if decimal_digits(reaction_time_ms) > t.max_decimal_digits {
            flags.push(ValidationFlag::ExcessivePrecision);
            confidence -= 0.2;
        }

        // Session duration: a submission arriving almost immediately after
        // the session opened cannot be a played game.
        let session_elapsed_ms = (now - session.started_at).num_milliseconds();
        if session_elapsed_ms < t.instant_submission_ms {
            flags.push(ValidationFlag::InstantSubmission);
            confidence = 0.0;
        } else if session_elapsed_ms < t.short_session_ms {
            flags.push(ValidationFlag::SessionTooShort);
            confidence = confidence.min(0.2);
        }

        // Game duration: the light sequence takes a minimum real time to run.
        if let Some(game_start) = game_started_at {
            let game_elapsed_ms = (now - game_start).num_milliseconds();
            if game_elapsed_ms < t.min_game_duration_ms {
                flags.push(ValidationFlag::GameTooShort);
                confidence = confidence.min(0.1);
            }
        }

        if let Some(device) = device {
            if !device.has_high_res_timer
                && !device.has_performance_api
                && reaction_time_ms < t.very_fast_ms
            {
                // A very fast time from a device that cannot measure one
                flags.push(ValidationFlag::NoHighResTimer);
                confidence -= 0.2;
            }
            if device.is_mobile && reaction_time_ms < t.mobile_floor_ms {
                flags.push(ValidationFlag::MobileTooFast);
                confidence = confidence.min(0.3);
            }
            if let Some(hz) = device.refresh_rate_hz {
                if hz < t.low_refresh_hz {
                    flags.push(ValidationFlag::LowRefreshRate);
                    confidence -= 0.1;
                }
            }
            if device.legacy_timer_precision {
                flags.push(ValidationFlag::LegacyTimerPrecision);
                confidence = confidence.min(0.7);
            }
        }

        let confidence = confidence.clamp(0.0, 1.0);
        let auto_reject = flags.iter().any(|f| f.is_auto_reject());

        let action = if auto_reject || confidence == 0.0 {
            ValidationAction::Reject
        } else if confidence >= t.accept_confidence {
            ValidationAction::Accept
        } else {
            ValidationAction::Flag
        };

        let result = ValidationResult {
            is_valid: confidence > t.valid_confidence && !auto_reject,
            confidence,
            flags,
            action,
        };
        debug!(
            "plausibility: time={}ms confidence={:.2} action={:?} flags={:?}",
            reaction_time_ms, result.confidence, result.action, result.flags
        );
        result
    }
}

/// Number of significant decimal digits in the value's shortest display form.
fn decimal_digits(value: f64) -> u32 {
    let formatted = format!("{}", value.abs());
    match formatted.split_once('.') {
        Some((_, fraction)) => fraction.len() as u32,
        None => 0,
    }
}
