// Reaction Guard: statistical outlier detection
// Compares a new reaction time against the user's rolling history using
// z-score statistics, and separately watches for machine-like consistency.

use log::debug;

use super::stats;
use crate::config::OutlierThresholds;
use crate::models::{ContextualFactors, OutlierAnalysis, OutlierReason};

pub struct OutlierDetector {
    thresholds: OutlierThresholds,
}

impl OutlierDetector {
    pub fn new(thresholds: OutlierThresholds) -> Self {
        Self { thresholds }
    }

    /// Analyze a new time against the user's history. Too little history is
    /// a neutral low-confidence result, never an error.
    pub fn analyze(
        &self,
        new_time: f64,
        history: &[f64],
        context: Option<&ContextualFactors>,
    ) -> OutlierAnalysis {
        let t = &self.thresholds;

        if history.len() < t.min_samples {
            return OutlierAnalysis {
                is_outlier: false,
                z_score: 0.0,
                confidence: 0.1,
                reason: OutlierReason::InsufficientData,
            };
        }

        // Analyze over the most recent window only; older games reflect a
        // different skill level.
        let start = history.len().saturating_sub(t.analysis_window);
        let recent = &history[start..];

        let mean = stats::mean(recent);
        let std_dev = stats::std_dev(recent);

        // Real humans are never perfectly consistent
        if std_dev == 0.0 {
            return self.adjusted(
                OutlierAnalysis {
                    is_outlier: true,
                    z_score: 0.0,
                    confidence: 0.95,
                    reason: OutlierReason::ZeroVariance,
                },
                context,
            );
        }

        // Machine-generated timings cluster too tightly even when each value
        // individually looks plausible. The new submission joins the sample
        // set so an 8-game history plus the current game is enough to judge.
        let mut sample_set: Vec<f64> = recent.to_vec();
        sample_set.push(new_time);
        if sample_set.len() >= t.bot_min_samples {
            let cov = stats::coefficient_of_variation(&sample_set);
            if cov < t.bot_cov_threshold {
                debug!("outlier: bot-like consistency, cov={:.4}", cov);
                return self.adjusted(
                    OutlierAnalysis {
                        is_outlier: true,
                        z_score: (new_time - mean).abs() / std_dev,
                        confidence: 0.9,
                        reason: OutlierReason::BotLikeConsistency,
                    },
                    context,
                );
            }
        }

        let z_score = (new_time - mean).abs() / std_dev;
        if z_score <= t.z_threshold {
            return OutlierAnalysis {
                is_outlier: false,
                z_score,
                confidence: 0.2,
                reason: OutlierReason::WithinNormalRange,
            };
        }

        let analysis = if new_time < mean {
            // Improvement outliers: severity by percent improvement over the
            // user's own mean.
            let improvement = (mean - new_time) / mean;
            if improvement > t.dramatic_improvement {
                OutlierAnalysis {
                    is_outlier: true,
                    z_score,
                    confidence: 0.9,
                    reason: OutlierReason::DramaticImprovement,
                }
            } else if improvement > t.significant_improvement {
                OutlierAnalysis {
                    is_outlier: true,
                    z_score,
                    confidence: 0.75,
                    reason: OutlierReason::SignificantImprovement,
                }
            } else {
                OutlierAnalysis {
                    is_outlier: true,
                    z_score,
                    confidence: 0.6,
                    reason: OutlierReason::ModerateImprovement,
                }
            }
        } else {
            // Slowing down is not a cheating signal
            OutlierAnalysis {
                is_outlier: true,
                z_score,
                confidence: 0.5,
                reason: OutlierReason::Degradation,
            }
        };

        self.adjusted(analysis, context)
    }

    /// Bounded confidence increments from contextual signals, applied only
    /// when the base analysis already found something.
    fn adjusted(
        &self,
        mut analysis: OutlierAnalysis,
        context: Option<&ContextualFactors>,
    ) -> OutlierAnalysis {
        if let Some(ctx) = context {
            if analysis.is_outlier {
                if ctx.unusual_hour {
                    analysis.confidence += 0.1;
                }
                if ctx.short_session {
                    analysis.confidence += 0.1;
                }
                if ctx.device_changed {
                    analysis.confidence += 0.15;
                }
                if ctx.elevated_latency {
                    analysis.confidence += 0.15;
                }
                analysis.confidence = analysis.confidence.clamp(0.1, 0.99);
            }
        }
        analysis
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detector() -> OutlierDetector {
        OutlierDetector::new(OutlierThresholds::default())
    }

    // History with a human-like spread (CoV ~0.19, well above the bot
    // threshold), mean 285ms
    fn human_history() -> Vec<f64> {
        vec![
            250.0, 340.0, 270.0, 380.0, 210.0, 290.0, 350.0, 230.0, 310.0, 200.0, 330.0, 260.0,
        ]
    }

    #[test]
    fn test_insufficient_data() {
        let d = detector();
        let analysis = d.analyze(250.0, &[250.0, 260.0, 270.0, 280.0], None);
        assert!(!analysis.is_outlier);
        assert_eq!(analysis.reason, OutlierReason::InsufficientData);
        assert!(analysis.confidence <= 0.2);
    }

    #[test]
    fn test_within_normal_range_is_not_an_outlier() {
        let d = detector();
        let history = human_history();
        // Close to the mean: z well under the threshold
        let analysis = d.analyze(285.0, &history, None);
        assert!(!analysis.is_outlier);
        assert!(analysis.z_score <= 2.5);
        assert_eq!(analysis.reason, OutlierReason::WithinNormalRange);
    }

    #[test]
    fn test_dramatic_improvement_outlier() {
        let d = detector();
        let history = human_history();
        // Mean is 285ms; 110ms is both a huge z and a >30% improvement
        let analysis = d.analyze(110.0, &history, None);
        assert!(analysis.is_outlier);
        assert!(analysis.z_score > 2.5);
        assert_eq!(analysis.reason, OutlierReason::DramaticImprovement);
        assert!(analysis.confidence >= 0.9);
    }

    #[test]
    fn test_degradation_outlier_is_less_suspicious() {
        let d = detector();
        let history = human_history();
        let analysis = d.analyze(500.0, &history, None);
        assert!(analysis.is_outlier);
        assert_eq!(analysis.reason, OutlierReason::Degradation);
        assert!((analysis.confidence - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_zero_variance_is_flagged() {
        let d = detector();
        let history = vec![250.0; 6];
        let analysis = d.analyze(250.0, &history, None);
        assert!(analysis.is_outlier);
        assert_eq!(analysis.reason, OutlierReason::ZeroVariance);
        assert!(analysis.confidence >= 0.9);
    }

    #[test]
    fn test_bot_like_consistency_regardless_of_z() {
        let d = detector();
        // CoV ~0.01 across the 8-game history; the new time sits right at
        // the mean so its z-score alone would never trip anything.
        let history = vec![250.0, 255.0, 248.0, 252.0, 249.0, 251.0, 253.0, 247.0];
        let analysis = d.analyze(250.0, &history, None);
        assert!(analysis.is_outlier);
        assert_eq!(analysis.reason, OutlierReason::BotLikeConsistency);
        assert!(analysis.z_score <= 2.5);
        assert!(analysis.confidence >= 0.9);
    }

    #[test]
    fn test_contextual_factors_raise_confidence_with_cap() {
        let d = detector();
        let history = human_history();
        let ctx = ContextualFactors {
            unusual_hour: true,
            short_session: true,
            device_changed: true,
            elevated_latency: true,
        };
        let base = d.analyze(110.0, &history, None);
        let adjusted = d.analyze(110.0, &history, Some(&ctx));
        assert!(adjusted.confidence >= base.confidence);
        assert!(adjusted.confidence <= 0.99);
    }

    #[test]
    fn test_context_does_not_inflate_clean_results() {
        let d = detector();
        let history = human_history();
        let ctx = ContextualFactors {
            unusual_hour: true,
            short_session: true,
            device_changed: true,
            elevated_latency: true,
        };
        let analysis = d.analyze(285.0, &history, Some(&ctx));
        assert!(!analysis.is_outlier);
        assert!((analysis.confidence - 0.2).abs() < 1e-9);
    }

    #[test]
    fn test_analysis_uses_recent_window_only() {
        let d = detector();
        // 30 old slow games followed by 20 recent fast ones: the mean should
        // come from the recent 20, so a fast time is not an outlier.
        let mut history = vec![450.0; 30];
        history.extend([
            250.0, 340.0, 270.0, 380.0, 210.0, 290.0, 350.0, 230.0, 310.0, 200.0, 330.0, 260.0,
            250.0, 340.0, 270.0, 380.0, 210.0, 290.0, 350.0, 230.0,
        ]);
        let analysis = d.analyze(285.0, &history, None);
        assert!(!analysis.is_outlier, "z={}", analysis.z_score);
    }
}
