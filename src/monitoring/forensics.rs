// Reaction Guard: forensic analysis
// Read-only aggregation for moderators working a case: every violation,
// security event, and statistical signal for one user over a time range,
// merged into a single chronological timeline with a risk call.

use chrono::{DateTime, Utc};
use std::sync::Arc;

use super::events::SecurityMonitor;
use crate::config::SecurityConfig;
use crate::models::{
    BehaviorProfile, ForensicReport, OutlierAnalysis, RiskAssessment, SessionStatistics, Severity,
    TimelineEntry,
};
use crate::rate_limit::PenaltyEscalator;
use crate::store::StoreHandle;
use crate::validation::{BehaviorProfiler, OutlierDetector, ReactionHistory};

pub struct ForensicAnalyzer {
    monitor: Arc<SecurityMonitor>,
    penalties: Arc<PenaltyEscalator>,
    history: ReactionHistory,
    outlier: OutlierDetector,
    behavior: BehaviorProfiler,
}

impl ForensicAnalyzer {
    pub fn new(
        config: &SecurityConfig,
        store: StoreHandle,
        monitor: Arc<SecurityMonitor>,
        penalties: Arc<PenaltyEscalator>,
    ) -> Self {
        Self {
            monitor,
            penalties,
            history: ReactionHistory::new(store, config.outlier.history_cap),
            outlier: OutlierDetector::new(config.outlier.clone()),
            behavior: BehaviorProfiler::new(config.behavior.clone()),
        }
    }

    /// Build the full forensic picture for a user within [start, end]. Pure
    /// read path: nothing here mutates stored state, so moderators can run
    /// it repeatedly while working a case.
    pub async fn analyze_user(
        &self,
        user_id: &str,
        range_start: DateTime<Utc>,
        range_end: DateTime<Utc>,
        session_stats: Option<&SessionStatistics>,
    ) -> ForensicReport {
        let violations: Vec<_> = self
            .penalties
            .user_violations(user_id)
            .await
            .into_iter()
            .filter(|v| v.timestamp >= range_start && v.timestamp <= range_end)
            .collect();
        let events: Vec<_> = self
            .monitor
            .user_events(user_id)
            .await
            .into_iter()
            .filter(|e| e.timestamp >= range_start && e.timestamp <= range_end)
            .collect();

        let times = self.history.get_times(user_id).await;
        // Re-run the statistical checks against the stored history: the last
        // accepted time against everything before it.
        let statistical_analysis = match times.split_last() {
            Some((last, earlier)) => Some(self.outlier.analyze(*last, earlier, None)),
            None => None,
        };
        let behavior_profile =
            session_stats.map(|stats| self.behavior.profile(stats, &times));

        let mut timeline: Vec<TimelineEntry> = Vec::new();
        for v in &violations {
            timeline.push(TimelineEntry {
                timestamp: v.timestamp,
                severity: Severity::Medium,
                description: format!("{:?} violation on {}", v.violation_type, v.action),
            });
        }
        for e in &events {
            timeline.push(TimelineEntry {
                timestamp: e.timestamp,
                severity: e.severity,
                description: format!("security event {:?}", e.event.event_type),
            });
        }
        timeline.sort_by_key(|entry| entry.timestamp);

        let risk = assess_risk(
            &events,
            violations.len(),
            statistical_analysis.as_ref(),
            behavior_profile.as_ref(),
        );
        let recommendations = recommend(risk, violations.len(), statistical_analysis.as_ref());

        ForensicReport {
            user_id: user_id.to_string(),
            range_start,
            range_end,
            violations,
            events,
            statistical_analysis,
            behavior_profile,
            timeline,
            risk,
            recommendations,
        }
    }
}

fn assess_risk(
    events: &[crate::models::EnrichedSecurityEvent],
    violation_count: usize,
    outlier: Option<&OutlierAnalysis>,
    behavior: Option<&BehaviorProfile>,
) -> RiskAssessment {
    let critical_events = events
        .iter()
        .filter(|e| e.severity == Severity::Critical)
        .count();
    let strong_outlier = outlier.map_or(false, |o| o.is_outlier && o.confidence >= 0.9);
    let behavior_flags = behavior.map_or(0, |b| b.suspicious_flags.len());

    if critical_events >= 2 || strong_outlier {
        RiskAssessment::Critical
    } else if critical_events == 1 || violation_count >= 3 || behavior_flags >= 2 {
        RiskAssessment::High
    } else if violation_count > 0
        || behavior_flags > 0
        || outlier.map_or(false, |o| o.is_outlier)
    {
        RiskAssessment::Medium
    } else {
        RiskAssessment::Low
    }
}

fn recommend(
    risk: RiskAssessment,
    violation_count: usize,
    outlier: Option<&OutlierAnalysis>,
) -> Vec<String> {
    let mut out = Vec::new();
    match risk {
        RiskAssessment::Critical => {
            out.push("suspend score submission pending manual review".to_string());
            out.push("audit every leaderboard entry from this user".to_string());
        }
        RiskAssessment::High => {
            out.push("place the account under enhanced monitoring".to_string());
        }
        RiskAssessment::Medium => {
            out.push("re-check after the next few submissions".to_string());
        }
        RiskAssessment::Low => {
            out.push("no action required".to_string());
        }
    }
    if violation_count >= 3 {
        out.push("review rate-limit violations for automation patterns".to_string());
    }
    if let Some(o) = outlier {
        if o.is_outlier {
            out.push(format!(
                "inspect the flagged submission (z-score {:.2})",
                o.z_score
            ));
        }
    }
    out
}
