// Reaction Guard: security event logging and rolling metrics
// Every validation and rate-limit outcome lands here. Events are enriched,
// persisted with a 30-day TTL, folded into a one-hour rolling metrics
// window, and critical events trigger the alert path synchronously.

use chrono::{DateTime, Duration, Utc};
use log::{error, warn};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashSet;
use uuid::Uuid;

use crate::config::AlertThresholds;
use crate::models::{
    EnrichedSecurityEvent, SecurityDashboard, SecurityEvent, SecurityEventType, SecurityMetrics,
    Severity,
};
use crate::store::{get_json, StoreHandle};

pub(crate) const EVENT_TTL_SECS: u64 = 30 * 86_400;
const METRICS_WINDOW_SECS: i64 = 3_600;
const RECENT_EVENTS_CAP: usize = 500;
const USER_EVENTS_CAP: usize = 100;

const RECENT_EVENTS_KEY: &str = "security:events:recent";
const METRICS_KEY: &str = "security:metrics:realtime";

pub(crate) fn user_events_key(user_id: &str) -> String {
    format!("security:events:user:{}", user_id)
}

// One entry in the rolling metrics window
#[derive(Debug, Clone, Serialize, Deserialize)]
struct MetricsSample {
    event_type: SecurityEventType,
    severity: Severity,
    user_id: Option<String>,
    timestamp: DateTime<Utc>,
}

pub struct SecurityMonitor {
    pub(crate) store: StoreHandle,
    pub(crate) alert_thresholds: AlertThresholds,
}

impl SecurityMonitor {
    pub fn new(store: StoreHandle, alert_thresholds: AlertThresholds) -> Self {
        Self {
            store,
            alert_thresholds,
        }
    }

    /// Enrich and persist an event. Infallible by policy: store failures are
    /// logged and the enriched event is still returned to the caller.
    pub async fn log_event(&self, event: SecurityEvent) -> EnrichedSecurityEvent {
        let severity = event.event_type.severity();
        let enriched = EnrichedSecurityEvent {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            severity,
            context: json!({
                "component": "reaction-guard",
                "user_id": event.user_id,
                "reporter_id": event.reporter_id,
            }),
            event,
        };

        self.persist_event(&enriched).await;
        self.update_realtime_metrics(&enriched).await;

        if severity == Severity::Critical {
            error!(
                "critical security event {:?} for user {:?}",
                enriched.event.event_type, enriched.event.user_id
            );
            self.handle_critical_event(&enriched).await;
        }

        enriched
    }

    async fn persist_event(&self, enriched: &EnrichedSecurityEvent) {
        self.append_event(RECENT_EVENTS_KEY, enriched, RECENT_EVENTS_CAP)
            .await;
        if let Some(user_id) = &enriched.event.user_id {
            self.append_event(&user_events_key(user_id), enriched, USER_EVENTS_CAP)
                .await;
        }
    }

    async fn append_event(&self, key: &str, enriched: &EnrichedSecurityEvent, cap: usize) {
        let enriched = enriched.clone();
        let result = self
            .store
            .atomic_update(key, EVENT_TTL_SECS, &move |current| {
                let mut events: Vec<EnrichedSecurityEvent> = current
                    .and_then(|v| serde_json::from_value(v).ok())
                    .unwrap_or_default();
                events.push(enriched.clone());
                if events.len() > cap {
                    let excess = events.len() - cap;
                    events.drain(..excess);
                }
                serde_json::to_value(&events).unwrap_or_else(|_| json!([]))
            })
            .await;
        if let Err(e) = result {
            warn!("event append failed for {}: {}", key, e);
        }
    }

    async fn update_realtime_metrics(&self, enriched: &EnrichedSecurityEvent) {
        let sample = MetricsSample {
            event_type: enriched.event.event_type.clone(),
            severity: enriched.severity,
            user_id: enriched.event.user_id.clone(),
            timestamp: enriched.timestamp,
        };
        let result = self
            .store
            .atomic_update(METRICS_KEY, METRICS_WINDOW_SECS as u64 * 2, &move |current| {
                let mut samples: Vec<MetricsSample> = current
                    .and_then(|v| serde_json::from_value(v).ok())
                    .unwrap_or_default();
                samples.push(sample.clone());
                // Trim to the trailing hour on every append
                let cutoff = Utc::now() - Duration::seconds(METRICS_WINDOW_SECS);
                samples.retain(|s| s.timestamp > cutoff);
                serde_json::to_value(&samples).unwrap_or_else(|_| json!([]))
            })
            .await;
        if let Err(e) = result {
            warn!("metrics append failed: {}", e);
        }
    }

    /// Counters over the trailing hour of events.
    pub async fn current_metrics(&self) -> SecurityMetrics {
        let samples: Vec<MetricsSample> =
            match get_json(self.store.as_ref(), METRICS_KEY).await {
                Ok(Some(samples)) => samples,
                Ok(None) => Vec::new(),
                Err(e) => {
                    warn!("metrics read failed: {}", e);
                    Vec::new()
                }
            };
        let cutoff = Utc::now() - Duration::seconds(METRICS_WINDOW_SECS);
        let samples: Vec<&MetricsSample> =
            samples.iter().filter(|s| s.timestamp > cutoff).collect();

        let mut suspicious: HashSet<&str> = HashSet::new();
        let mut metrics = SecurityMetrics {
            window_start: samples.iter().map(|s| s.timestamp).min(),
            window_end: samples.iter().map(|s| s.timestamp).max(),
            total_events: samples.len() as u32,
            ..Default::default()
        };
        for sample in &samples {
            if sample.severity == Severity::Critical {
                metrics.critical_violations += 1;
            }
            match sample.event_type {
                SecurityEventType::SuspiciousActivity | SecurityEventType::BotDetection => {
                    if let Some(user_id) = &sample.user_id {
                        suspicious.insert(user_id.as_str());
                    }
                }
                SecurityEventType::RateLimitViolation => metrics.rate_limit_violations += 1,
                SecurityEventType::AnomalyDetection => metrics.anomaly_detections += 1,
                _ => {}
            }
        }
        metrics.suspicious_users = suspicious.len() as u32;
        metrics
    }

    /// Most recent events across all users, newest last.
    pub async fn recent_events(&self) -> Vec<EnrichedSecurityEvent> {
        self.read_events(RECENT_EVENTS_KEY).await
    }

    pub async fn user_events(&self, user_id: &str) -> Vec<EnrichedSecurityEvent> {
        self.read_events(&user_events_key(user_id)).await
    }

    async fn read_events(&self, key: &str) -> Vec<EnrichedSecurityEvent> {
        match get_json(self.store.as_ref(), key).await {
            Ok(Some(events)) => events,
            Ok(None) => Vec::new(),
            Err(e) => {
                warn!("event read failed for {}: {}", key, e);
                Vec::new()
            }
        }
    }

    /// Administrative read model: current metrics, active alerts, pending
    /// ticket counts, and the latest critical events.
    pub async fn get_security_dashboard(&self) -> SecurityDashboard {
        let metrics = self.current_metrics().await;
        let active_alerts = self.active_alerts().await;
        let pending_reports = self.pending_reports().await.len() as u32;
        let pending_appeals = self.pending_appeals().await.len() as u32;
        let recent_critical_events: Vec<EnrichedSecurityEvent> = self
            .recent_events()
            .await
            .into_iter()
            .rev()
            .filter(|e| e.severity == Severity::Critical)
            .take(20)
            .collect();

        SecurityDashboard {
            generated_at: Utc::now(),
            metrics,
            active_alerts,
            pending_reports,
            pending_appeals,
            recent_critical_events,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use std::sync::Arc;

    fn monitor() -> SecurityMonitor {
        SecurityMonitor::new(Arc::new(MemoryStore::new()), AlertThresholds::default())
    }

    fn event(event_type: SecurityEventType, user_id: &str) -> SecurityEvent {
        SecurityEvent {
            event_type,
            user_id: Some(user_id.to_string()),
            reporter_id: None,
            data: None,
        }
    }

    #[tokio::test]
    async fn test_severity_mapping_on_enrichment() {
        let m = monitor();
        let e = m
            .log_event(event(SecurityEventType::ImpossibleTime, "user1"))
            .await;
        assert_eq!(e.severity, Severity::Critical);

        let e = m
            .log_event(event(SecurityEventType::RateLimitViolation, "user1"))
            .await;
        assert_eq!(e.severity, Severity::Medium);

        let e = m
            .log_event(event(SecurityEventType::Other("weird".into()), "user1"))
            .await;
        assert_eq!(e.severity, Severity::Low);
    }

    #[tokio::test]
    async fn test_events_are_persisted_per_user_and_globally() {
        let m = monitor();
        m.log_event(event(SecurityEventType::AnomalyDetection, "user1"))
            .await;
        m.log_event(event(SecurityEventType::AnomalyDetection, "user2"))
            .await;

        assert_eq!(m.recent_events().await.len(), 2);
        assert_eq!(m.user_events("user1").await.len(), 1);
        assert_eq!(m.user_events("user2").await.len(), 1);
        assert!(m.user_events("user3").await.is_empty());
    }

    #[tokio::test]
    async fn test_metrics_count_by_kind() {
        let m = monitor();
        m.log_event(event(SecurityEventType::ImpossibleTime, "user1"))
            .await;
        m.log_event(event(SecurityEventType::BotDetection, "user2"))
            .await;
        m.log_event(event(SecurityEventType::RateLimitViolation, "user3"))
            .await;
        m.log_event(event(SecurityEventType::AnomalyDetection, "user4"))
            .await;
        // Same suspicious user twice counts once
        m.log_event(event(SecurityEventType::SuspiciousActivity, "user2"))
            .await;

        let metrics = m.current_metrics().await;
        assert_eq!(metrics.total_events, 5);
        assert_eq!(metrics.critical_violations, 2);
        assert_eq!(metrics.rate_limit_violations, 1);
        assert_eq!(metrics.anomaly_detections, 1);
        assert_eq!(metrics.suspicious_users, 2);
        assert!(metrics.window_start.is_some());
    }

    #[tokio::test]
    async fn test_store_failure_still_returns_the_enriched_event() {
        let m = SecurityMonitor::new(
            Arc::new(crate::store::testing::FailingStore),
            AlertThresholds::default(),
        );

        // Logging is infallible by policy: the caller still gets the
        // enriched event even though nothing could be persisted
        let e = m
            .log_event(event(SecurityEventType::ImpossibleTime, "user1"))
            .await;
        assert_eq!(e.severity, Severity::Critical);

        assert!(m.recent_events().await.is_empty());
        assert!(m.user_events("user1").await.is_empty());
        assert_eq!(m.current_metrics().await.total_events, 0);
    }

    #[tokio::test]
    async fn test_dashboard_collects_critical_events() {
        let m = monitor();
        for i in 0..7 {
            m.log_event(event(SecurityEventType::ImpossibleTime, &format!("u{}", i)))
                .await;
        }
        let dashboard = m.get_security_dashboard().await;
        assert_eq!(dashboard.metrics.critical_violations, 7);
        assert_eq!(dashboard.recent_critical_events.len(), 7);
        // Seven critical violations in the hour crosses the alert threshold
        assert!(!dashboard.active_alerts.is_empty());
    }
}
