// Reaction Guard: behavioral profiling
// Aggregates cumulative session statistics into a suspicion profile. A pure
// function of the counters, safe to recompute any number of times.

use super::stats;
use crate::config::BehaviorThresholds;
use crate::models::{BehaviorFlag, BehaviorProfile, SessionStatistics};

pub struct BehaviorProfiler {
    thresholds: BehaviorThresholds,
}

impl BehaviorProfiler {
    pub fn new(thresholds: BehaviorThresholds) -> Self {
        Self { thresholds }
    }

    pub fn profile(&self, session: &SessionStatistics, history: &[f64]) -> BehaviorProfile {
        let t = &self.thresholds;
        let mut flags: Vec<BehaviorFlag> = Vec::new();

        let false_start_rate = if session.games_played > 0 {
            session.false_starts as f64 / session.games_played as f64
        } else {
            0.0
        };

        // Humans false-start. A client tuned to never jump early over a
        // meaningful number of games is as suspicious as one that always does.
        if session.games_played > t.min_games_for_false_start_check
            && false_start_rate < t.low_false_start_rate
        {
            flags.push(BehaviorFlag::TooFewFalseStarts);
        }
        if false_start_rate > t.high_false_start_rate {
            flags.push(BehaviorFlag::ExcessiveFalseStarts);
        }

        let cov = stats::coefficient_of_variation(history);
        let consistency_score = 1.0 - (cov * t.cov_scale).min(1.0);
        if history.len() > t.machine_min_samples && cov < t.machine_cov_threshold {
            flags.push(BehaviorFlag::MachineLikeConsistency);
        }

        // Relative improvement between the first and second half of history.
        // Humans plateau; a second half 28% faster than the first is not a
        // learning curve.
        let improvement_pattern = if history.len() >= 6 {
            let (first, second) = history.split_at(history.len() / 2);
            let first_mean = stats::mean(first);
            if first_mean > 0.0 {
                (first_mean - stats::mean(second)) / first_mean
            } else {
                0.0
            }
        } else {
            0.0
        };
        if improvement_pattern > t.unrealistic_improvement {
            flags.push(BehaviorFlag::UnrealisticImprovement);
        }

        BehaviorProfile {
            consistency_score,
            false_start_rate,
            improvement_pattern,
            suspicious_flags: flags,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profiler() -> BehaviorProfiler {
        BehaviorProfiler::new(BehaviorThresholds::default())
    }

    fn stats_with(games: u32, false_starts: u32) -> SessionStatistics {
        SessionStatistics {
            games_played: games,
            average_time: 280.0,
            false_starts,
            perfect_scores: 0,
            improvement_rate: 0.0,
        }
    }

    #[test]
    fn test_ordinary_player_has_no_flags() {
        let p = profiler();
        let history = vec![
            320.0, 290.0, 350.0, 270.0, 310.0, 260.0, 330.0, 280.0, 300.0, 250.0, 290.0, 270.0,
        ];
        let profile = p.profile(&stats_with(12, 2), &history);
        assert!(profile.suspicious_flags.is_empty());
        assert!(profile.false_start_rate > 0.1 && profile.false_start_rate < 0.2);
    }

    #[test]
    fn test_never_false_starting_is_flagged_after_enough_games() {
        let p = profiler();
        let profile = p.profile(&stats_with(50, 0), &[]);
        assert!(profile
            .suspicious_flags
            .contains(&BehaviorFlag::TooFewFalseStarts));

        // Too few games to judge yet
        let profile = p.profile(&stats_with(10, 0), &[]);
        assert!(!profile
            .suspicious_flags
            .contains(&BehaviorFlag::TooFewFalseStarts));
    }

    #[test]
    fn test_excessive_false_starts_are_flagged() {
        let p = profiler();
        let profile = p.profile(&stats_with(20, 15), &[]);
        assert!(profile
            .suspicious_flags
            .contains(&BehaviorFlag::ExcessiveFalseStarts));
    }

    #[test]
    fn test_machine_like_consistency() {
        let p = profiler();
        let history = vec![
            250.0, 251.0, 249.0, 250.0, 250.5, 249.5, 250.0, 251.0, 249.0, 250.0, 250.5, 249.5,
        ];
        let profile = p.profile(&stats_with(12, 1), &history);
        assert!(profile
            .suspicious_flags
            .contains(&BehaviorFlag::MachineLikeConsistency));
        assert!(profile.consistency_score > 0.9);
    }

    #[test]
    fn test_unrealistic_improvement() {
        let p = profiler();
        // Second half 40% faster than the first
        let history = vec![
            350.0, 360.0, 340.0, 355.0, 345.0, 350.0, 210.0, 215.0, 205.0, 210.0, 212.0, 208.0,
        ];
        let profile = p.profile(&stats_with(12, 1), &history);
        assert!(profile.improvement_pattern > 0.28);
        assert!(profile
            .suspicious_flags
            .contains(&BehaviorFlag::UnrealisticImprovement));
    }

    #[test]
    fn test_no_games_yields_zero_rate() {
        let p = profiler();
        let profile = p.profile(&SessionStatistics::default(), &[]);
        assert_eq!(profile.false_start_rate, 0.0);
        assert!(profile.suspicious_flags.is_empty());
    }
}
