// Reaction Guard: threshold alerting
// Four independent rules over the rolling hourly metrics. Rules are
// non-exclusive; several alerts may fire from one evaluation.

use chrono::Utc;
use log::warn;
use serde_json::json;
use uuid::Uuid;

use super::events::SecurityMonitor;
use crate::models::{
    AlertRule, EnrichedSecurityEvent, SecurityAlert, SecurityMetrics, Severity,
};
use crate::store::get_json;

const ACTIVE_ALERTS_KEY: &str = "security:alerts:active";
const ALERT_TTL_SECS: u64 = 86_400;
const ACTIVE_ALERTS_CAP: usize = 50;

impl SecurityMonitor {
    /// Evaluate the four alert rules against a metrics snapshot. Pure: no
    /// reads, no writes.
    pub fn generate_alerts(&self, metrics: &SecurityMetrics) -> Vec<SecurityAlert> {
        let t = &self.alert_thresholds;
        let now = Utc::now();
        let mut alerts = Vec::new();

        if metrics.critical_violations >= t.critical_violations {
            alerts.push(SecurityAlert {
                id: Uuid::new_v4(),
                rule: AlertRule::CriticalViolationSurge,
                severity: Severity::Critical,
                message: format!(
                    "{} critical violations in the last hour (threshold {})",
                    metrics.critical_violations, t.critical_violations
                ),
                recommendations: vec![
                    "review recent impossible-time and bot-detection events".to_string(),
                    "consider freezing score submission for affected challenges".to_string(),
                    "audit leaderboards touched by the flagged users".to_string(),
                ],
                triggered_at: now,
            });
        }

        if metrics.suspicious_users >= t.suspicious_users {
            alerts.push(SecurityAlert {
                id: Uuid::new_v4(),
                rule: AlertRule::SuspiciousUserSurge,
                severity: Severity::High,
                message: format!(
                    "{} distinct users flagged suspicious in the last hour (threshold {})",
                    metrics.suspicious_users, t.suspicious_users
                ),
                recommendations: vec![
                    "check for a shared exploit or new automation script".to_string(),
                    "review the flagged users' behavior profiles".to_string(),
                ],
                triggered_at: now,
            });
        }

        if metrics.rate_limit_violations >= t.rate_limit_violations {
            alerts.push(SecurityAlert {
                id: Uuid::new_v4(),
                rule: AlertRule::RateLimitViolationSurge,
                severity: Severity::Medium,
                message: format!(
                    "{} rate limit violations in the last hour (threshold {})",
                    metrics.rate_limit_violations, t.rate_limit_violations
                ),
                recommendations: vec![
                    "check per-IP counters for a coordinated burst".to_string(),
                    "consider enabling CAPTCHA for affected address ranges".to_string(),
                ],
                triggered_at: now,
            });
        }

        if metrics.anomaly_detections >= t.anomaly_detections {
            alerts.push(SecurityAlert {
                id: Uuid::new_v4(),
                rule: AlertRule::AnomalySurge,
                severity: Severity::Medium,
                message: format!(
                    "{} anomaly detections in the last hour (threshold {})",
                    metrics.anomaly_detections, t.anomaly_detections
                ),
                recommendations: vec![
                    "inspect the outlier analyses behind the detections".to_string(),
                    "verify detection thresholds against current traffic".to_string(),
                ],
                triggered_at: now,
            });
        }

        alerts
    }

    /// Synchronous alert path for critical events: recompute the hourly
    /// metrics, evaluate every rule, and persist whatever fires.
    pub(crate) async fn handle_critical_event(&self, _event: &EnrichedSecurityEvent) {
        let metrics = self.current_metrics().await;
        let alerts = self.generate_alerts(&metrics);
        if !alerts.is_empty() {
            self.store_alerts(&alerts).await;
        }
    }

    pub async fn active_alerts(&self) -> Vec<SecurityAlert> {
        match get_json(self.store.as_ref(), ACTIVE_ALERTS_KEY).await {
            Ok(Some(alerts)) => alerts,
            Ok(None) => Vec::new(),
            Err(e) => {
                warn!("alert read failed: {}", e);
                Vec::new()
            }
        }
    }

    async fn store_alerts(&self, alerts: &[SecurityAlert]) {
        let new_alerts = alerts.to_vec();
        let result = self
            .store
            .atomic_update(ACTIVE_ALERTS_KEY, ALERT_TTL_SECS, &move |current| {
                let mut all: Vec<SecurityAlert> = current
                    .and_then(|v| serde_json::from_value(v).ok())
                    .unwrap_or_default();
                // One live alert per rule: replace instead of stacking
                for alert in &new_alerts {
                    all.retain(|a| a.rule != alert.rule);
                    all.push(alert.clone());
                }
                if all.len() > ACTIVE_ALERTS_CAP {
                    let excess = all.len() - ACTIVE_ALERTS_CAP;
                    all.drain(..excess);
                }
                serde_json::to_value(&all).unwrap_or_else(|_| json!([]))
            })
            .await;
        if let Err(e) = result {
            warn!("alert write failed: {}", e);
        }
    }
}
