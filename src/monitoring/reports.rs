// Reaction Guard: community reports and score appeals
// Two independent ticketing workflows. Reports accuse another player;
// appeals contest one's own penalty or rejected score. Both are validated,
// assigned a heuristic priority, and persisted with long TTLs.

use anyhow::{Context, Result};
use chrono::Utc;
use log::warn;
use serde_json::json;
use uuid::Uuid;

use super::events::SecurityMonitor;
use crate::models::{
    AppealResult, AppealStatus, CommunityReport, CommunityReportResult, Priority, ReportStatus,
    ScoreAppeal, SecurityEvent, SecurityEventType,
};
use crate::store::get_json;

const REPORTS_KEY: &str = "security:reports";
const APPEALS_KEY: &str = "security:appeals";
const REPORT_TTL_SECS: u64 = 90 * 86_400;
const APPEAL_TTL_SECS: u64 = 60 * 86_400;
const TICKET_CAP: usize = 200;

impl SecurityMonitor {
    /// File a community report against another player. Validation failures
    /// come back as a rejected result, never an error.
    pub async fn submit_report(
        &self,
        reporter_id: &str,
        reported_user_id: &str,
        reason: &str,
        challenge_id: Option<String>,
    ) -> CommunityReportResult {
        let reason = reason.trim();
        if reporter_id.trim().is_empty() || reported_user_id.trim().is_empty() || reason.is_empty()
        {
            return CommunityReportResult {
                accepted: false,
                report_id: None,
                priority: None,
                message: "reporter, reported user, and reason are required".to_string(),
            };
        }
        if reporter_id == reported_user_id {
            return CommunityReportResult {
                accepted: false,
                report_id: None,
                priority: None,
                message: "you cannot report yourself".to_string(),
            };
        }

        let prior_reports = self
            .all_reports()
            .await
            .iter()
            .filter(|r| r.reported_user_id == reported_user_id)
            .count();
        let priority = report_priority(reason, prior_reports);

        // High-priority reports skip the queue and open an investigation
        let status = if priority == Priority::High {
            ReportStatus::Investigating
        } else {
            ReportStatus::Pending
        };

        let report = CommunityReport {
            id: Uuid::new_v4(),
            reporter_id: reporter_id.to_string(),
            reported_user_id: reported_user_id.to_string(),
            reason: reason.to_string(),
            challenge_id,
            submitted_at: Utc::now(),
            status,
            priority,
        };

        if let Err(e) = self.append_report(report.clone()).await {
            warn!("report persist failed: {}", e);
            return CommunityReportResult {
                accepted: false,
                report_id: None,
                priority: None,
                message: "report could not be stored, please retry".to_string(),
            };
        }

        self.log_event(SecurityEvent {
            event_type: SecurityEventType::CommunityReport,
            user_id: Some(reported_user_id.to_string()),
            reporter_id: Some(reporter_id.to_string()),
            data: Some(json!({
                "report_id": report.id,
                "priority": priority,
                "auto_investigating": status == ReportStatus::Investigating,
            })),
        })
        .await;

        CommunityReportResult {
            accepted: true,
            report_id: Some(report.id),
            priority: Some(priority),
            message: match status {
                ReportStatus::Investigating => {
                    "report received and under investigation".to_string()
                }
                _ => "report received".to_string(),
            },
        }
    }

    /// Appeal a rejected score or an applied penalty.
    pub async fn submit_appeal(
        &self,
        user_id: &str,
        challenge_id: &str,
        justification: &str,
    ) -> AppealResult {
        let justification = justification.trim();
        if user_id.trim().is_empty() || challenge_id.trim().is_empty() || justification.is_empty() {
            return AppealResult {
                accepted: false,
                appeal_id: None,
                message: "user, challenge, and justification are required".to_string(),
            };
        }

        let appeal = ScoreAppeal {
            id: Uuid::new_v4(),
            user_id: user_id.to_string(),
            challenge_id: challenge_id.to_string(),
            justification: justification.to_string(),
            submitted_at: Utc::now(),
            status: AppealStatus::Pending,
            priority: appeal_priority(justification),
        };

        if let Err(e) = self.append_appeal(appeal.clone()).await {
            warn!("appeal persist failed: {}", e);
            return AppealResult {
                accepted: false,
                appeal_id: None,
                message: "appeal could not be stored, please retry".to_string(),
            };
        }

        self.log_event(SecurityEvent {
            event_type: SecurityEventType::ScoreAppeal,
            user_id: Some(user_id.to_string()),
            reporter_id: None,
            data: Some(json!({ "appeal_id": appeal.id, "challenge_id": challenge_id })),
        })
        .await;

        AppealResult {
            accepted: true,
            appeal_id: Some(appeal.id),
            message: "appeal received and queued for review".to_string(),
        }
    }

    pub async fn pending_reports(&self) -> Vec<CommunityReport> {
        self.all_reports()
            .await
            .into_iter()
            .filter(|r| matches!(r.status, ReportStatus::Pending | ReportStatus::Investigating))
            .collect()
    }

    pub async fn pending_appeals(&self) -> Vec<ScoreAppeal> {
        self.all_appeals()
            .await
            .into_iter()
            .filter(|a| matches!(a.status, AppealStatus::Pending | AppealStatus::Reviewing))
            .collect()
    }

    /// Moderator path: move a report through its lifecycle.
    pub async fn update_report_status(&self, report_id: Uuid, status: ReportStatus) -> Result<bool> {
        let updated = self
            .store
            .atomic_update(REPORTS_KEY, REPORT_TTL_SECS, &move |current| {
                let mut reports: Vec<CommunityReport> = current
                    .and_then(|v| serde_json::from_value(v).ok())
                    .unwrap_or_default();
                for report in reports.iter_mut() {
                    if report.id == report_id {
                        report.status = status;
                    }
                }
                serde_json::to_value(&reports).unwrap_or_else(|_| json!([]))
            })
            .await
            .context("failed to update report status")?;
        let reports: Vec<CommunityReport> = serde_json::from_value(updated).unwrap_or_default();
        Ok(reports.iter().any(|r| r.id == report_id))
    }

    pub async fn update_appeal_status(&self, appeal_id: Uuid, status: AppealStatus) -> Result<bool> {
        let updated = self
            .store
            .atomic_update(APPEALS_KEY, APPEAL_TTL_SECS, &move |current| {
                let mut appeals: Vec<ScoreAppeal> = current
                    .and_then(|v| serde_json::from_value(v).ok())
                    .unwrap_or_default();
                for appeal in appeals.iter_mut() {
                    if appeal.id == appeal_id {
                        appeal.status = status;
                    }
                }
                serde_json::to_value(&appeals).unwrap_or_else(|_| json!([]))
            })
            .await
            .context("failed to update appeal status")?;
        let appeals: Vec<ScoreAppeal> = serde_json::from_value(updated).unwrap_or_default();
        Ok(appeals.iter().any(|a| a.id == appeal_id))
    }

    async fn all_reports(&self) -> Vec<CommunityReport> {
        match get_json(self.store.as_ref(), REPORTS_KEY).await {
            Ok(Some(reports)) => reports,
            Ok(None) => Vec::new(),
            Err(e) => {
                warn!("report read failed: {}", e);
                Vec::new()
            }
        }
    }

    async fn all_appeals(&self) -> Vec<ScoreAppeal> {
        match get_json(self.store.as_ref(), APPEALS_KEY).await {
            Ok(Some(appeals)) => appeals,
            Ok(None) => Vec::new(),
            Err(e) => {
                warn!("appeal read failed: {}", e);
                Vec::new()
            }
        }
    }

    async fn append_report(&self, report: CommunityReport) -> Result<(), crate::error::StoreError> {
        self.store
            .atomic_update(REPORTS_KEY, REPORT_TTL_SECS, &move |current| {
                let mut reports: Vec<CommunityReport> = current
                    .and_then(|v| serde_json::from_value(v).ok())
                    .unwrap_or_default();
                reports.push(report.clone());
                if reports.len() > TICKET_CAP {
                    let excess = reports.len() - TICKET_CAP;
                    reports.drain(..excess);
                }
                serde_json::to_value(&reports).unwrap_or_else(|_| json!([]))
            })
            .await
            .map(|_| ())
    }

    async fn append_appeal(&self, appeal: ScoreAppeal) -> Result<(), crate::error::StoreError> {
        self.store
            .atomic_update(APPEALS_KEY, APPEAL_TTL_SECS, &move |current| {
                let mut appeals: Vec<ScoreAppeal> = current
                    .and_then(|v| serde_json::from_value(v).ok())
                    .unwrap_or_default();
                appeals.push(appeal.clone());
                if appeals.len() > TICKET_CAP {
                    let excess = appeals.len() - TICKET_CAP;
                    appeals.drain(..excess);
                }
                serde_json::to_value(&appeals).unwrap_or_else(|_| json!([]))
            })
            .await
            .map(|_| ())
    }
}

/// Claims of automation or impossible play jump the queue; users reported by
/// several different people do too.
fn report_priority(reason: &str, prior_reports: usize) -> Priority {
    let lowered = reason.to_lowercase();
    let automation_claim = ["bot", "impossible", "cheat", "script", "macro"]
        .iter()
        .any(|kw| lowered.contains(kw));
    if automation_claim || prior_reports >= 2 {
        Priority::High
    } else if reason.len() > 80 {
        Priority::Medium
    } else {
        Priority::Low
    }
}

fn appeal_priority(justification: &str) -> Priority {
    let lowered = justification.to_lowercase();
    if lowered.contains("lockout") || lowered.contains("banned") || lowered.contains("penalty") {
        Priority::High
    } else if justification.len() > 80 {
        Priority::Medium
    } else {
        Priority::Low
    }
}
