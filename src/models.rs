// Reaction Guard: shared data model
// Types exchanged between validation, rate limiting, and monitoring

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

///////////////////////////////////////////////////////////////////////////////
// Validation
///////////////////////////////////////////////////////////////////////////////

// Final decision for a submitted score
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationAction {
    Accept,
    Flag,
    Reject,
}

// Everything the plausibility checks can object to about a single submission
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationFlag {
    NonFiniteInput,
    PhysicallyImpossible, // < 50ms
    ImpossiblyFast,       // < 80ms
    Superhuman,           // < 100ms
    SuspiciouslyFast,     // < 120ms
    VeryFast,             // < 150ms
    UnusuallySlow,        // > 1000ms
    RoundNumber,
    MissingPrecision,
    ExcessivePrecision,
    InstantSubmission,
    SessionTooShort,
    GameTooShort,
    NoHighResTimer,
    MobileTooFast,
    LowRefreshRate,
    LegacyTimerPrecision,
}

impl ValidationFlag {
    /// Flags that force `action = reject` regardless of the confidence score.
    pub fn is_auto_reject(&self) -> bool {
        matches!(
            self,
            ValidationFlag::NonFiniteInput
                | ValidationFlag::PhysicallyImpossible
                | ValidationFlag::ImpossiblyFast
                | ValidationFlag::InstantSubmission
        )
    }
}

/// Outcome of validating one submission. Never persisted on its own, but
/// embedded in security event payloads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub is_valid: bool,
    pub confidence: f64,
    pub flags: Vec<ValidationFlag>,
    pub action: ValidationAction,
}

impl ValidationResult {
    pub fn has_auto_reject_flag(&self) -> bool {
        self.flags.iter().any(|f| f.is_auto_reject())
    }
}

// Why the outlier detector reached its verdict
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutlierReason {
    InsufficientData,
    WithinNormalRange,
    ZeroVariance,
    DramaticImprovement,    // > 30% faster than the user's mean
    SignificantImprovement, // > 15% faster
    ModerateImprovement,
    Degradation,
    BotLikeConsistency,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutlierAnalysis {
    pub is_outlier: bool,
    pub z_score: f64,
    pub confidence: f64,
    pub reason: OutlierReason,
}

// Session-level red flags, independent of any single submission
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BehaviorFlag {
    TooFewFalseStarts,
    ExcessiveFalseStarts,
    MachineLikeConsistency,
    UnrealisticImprovement,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BehaviorProfile {
    pub consistency_score: f64,
    pub false_start_rate: f64,
    pub improvement_pattern: f64,
    pub suspicious_flags: Vec<BehaviorFlag>,
}

/// Cumulative per-user counters, owned by the session layer and mutated
/// after every completed game. Profiling only reads them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionStatistics {
    pub games_played: u32,
    pub average_time: f64,
    pub false_starts: u32,
    pub perfect_scores: u32,
    pub improvement_rate: f64,
}

// Submission context carried alongside the raw reaction time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionData {
    pub started_at: DateTime<Utc>,
}

// Device timing capabilities as reported by the client
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceCapabilities {
    pub has_high_res_timer: bool,
    pub has_performance_api: bool,
    pub is_mobile: bool,
    pub refresh_rate_hz: Option<f64>,
    pub legacy_timer_precision: bool,
}

// Optional context signals for outlier confidence adjustment
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextualFactors {
    pub unusual_hour: bool,
    pub short_session: bool,
    pub device_changed: bool,
    pub elevated_latency: bool,
}

/// Full submission handed to the validation pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreSubmission {
    pub reaction_time_ms: f64,
    pub session: SessionData,
    pub device: Option<DeviceCapabilities>,
    pub game_started_at: Option<DateTime<Utc>>,
    pub context: Option<ContextualFactors>,
}

/// Combined result of the full validation pipeline: the plausibility verdict
/// plus the history-based analyses and the single decision they feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmissionAssessment {
    pub validation: ValidationResult,
    pub outlier: Option<OutlierAnalysis>,
    pub behavior: Option<BehaviorProfile>,
    pub combined_confidence: f64,
    pub action: ValidationAction,
}

///////////////////////////////////////////////////////////////////////////////
// Rate limiting
///////////////////////////////////////////////////////////////////////////////

// Actions subject to rate limiting; each has its own limit table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RateLimitAction {
    ScoreSubmission,
    GameStart,
    ChallengeCreate,
    ReportSubmit,
    AppealSubmit,
}

impl RateLimitAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            RateLimitAction::ScoreSubmission => "score_submission",
            RateLimitAction::GameStart => "game_start",
            RateLimitAction::ChallengeCreate => "challenge_create",
            RateLimitAction::ReportSubmit => "report_submit",
            RateLimitAction::AppealSubmit => "appeal_submit",
        }
    }

    pub fn all() -> [RateLimitAction; 5] {
        [
            RateLimitAction::ScoreSubmission,
            RateLimitAction::GameStart,
            RateLimitAction::ChallengeCreate,
            RateLimitAction::ReportSubmit,
            RateLimitAction::AppealSubmit,
        ]
    }
}

impl std::fmt::Display for RateLimitAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// The three sliding-window periods
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WindowPeriod {
    Minute,
    Hour,
    Day,
}

impl WindowPeriod {
    pub fn seconds(&self) -> i64 {
        match self {
            WindowPeriod::Minute => 60,
            WindowPeriod::Hour => 3_600,
            WindowPeriod::Day => 86_400,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            WindowPeriod::Minute => "minute",
            WindowPeriod::Hour => "hour",
            WindowPeriod::Day => "day",
        }
    }

    pub fn all() -> [WindowPeriod; 3] {
        [WindowPeriod::Minute, WindowPeriod::Hour, WindowPeriod::Day]
    }
}

/// Per-(identity, action) window record kept in the store. Timestamps are
/// epoch milliseconds; each list is pruned to its window on every access.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RateLimitData {
    pub minute: Vec<i64>,
    pub hour: Vec<i64>,
    pub day: Vec<i64>,
}

impl RateLimitData {
    pub fn window(&self, period: WindowPeriod) -> &Vec<i64> {
        match period {
            WindowPeriod::Minute => &self.minute,
            WindowPeriod::Hour => &self.hour,
            WindowPeriod::Day => &self.day,
        }
    }

    pub fn window_mut(&mut self, period: WindowPeriod) -> &mut Vec<i64> {
        match period {
            WindowPeriod::Minute => &mut self.minute,
            WindowPeriod::Hour => &mut self.hour,
            WindowPeriod::Day => &mut self.day,
        }
    }
}

// Base limits for one action across the three windows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionLimits {
    pub minute: u32,
    pub hour: u32,
    pub day: u32,
}

impl ActionLimits {
    pub fn limit(&self, period: WindowPeriod) -> u32 {
        match period {
            WindowPeriod::Minute => self.minute,
            WindowPeriod::Hour => self.hour,
            WindowPeriod::Day => self.day,
        }
    }
}

/// Three-valued rate-limit verdict so callers can choose their own policy
/// for store failures instead of inheriting ours.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RateLimitVerdict {
    Allowed,
    Denied,
    /// The store could not be consulted; this crate fails open on it.
    Inconclusive,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateLimitResult {
    pub allowed: bool,
    pub verdict: RateLimitVerdict,
    pub remaining: u32,
    pub reset_time: Option<DateTime<Utc>>,
    pub reason: Option<String>,
}

impl RateLimitResult {
    pub fn allowed(remaining: u32) -> Self {
        Self {
            allowed: true,
            verdict: RateLimitVerdict::Allowed,
            remaining,
            reset_time: None,
            reason: None,
        }
    }

    pub fn denied(reset_time: DateTime<Utc>, reason: String) -> Self {
        Self {
            allowed: false,
            verdict: RateLimitVerdict::Denied,
            remaining: 0,
            reset_time: Some(reset_time),
            reason: Some(reason),
        }
    }

    pub fn inconclusive() -> Self {
        Self {
            allowed: true,
            verdict: RateLimitVerdict::Inconclusive,
            remaining: 0,
            reset_time: None,
            reason: None,
        }
    }
}

// Usage of one window inside a status breakdown
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WindowUsage {
    pub used: u32,
    pub limit: u32,
    pub remaining: u32,
    pub resets_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionStatus {
    pub action: RateLimitAction,
    pub minute: WindowUsage,
    pub hour: WindowUsage,
    pub day: WindowUsage,
}

/// Full usage/remaining/reset breakdown for the "submissions remaining" UI.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateLimitStatus {
    pub user_id: String,
    pub generated_at: DateTime<Utc>,
    pub actions: Vec<ActionStatus>,
}

///////////////////////////////////////////////////////////////////////////////
// Penalties, violations, whitelist
///////////////////////////////////////////////////////////////////////////////

// What kind of abuse a violation record captures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationType {
    RateLimitExceeded,
    ImplausibleScore,
    StatisticalOutlier,
    BehavioralAnomaly,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViolationRecord {
    pub action: RateLimitAction,
    pub timestamp: DateTime<Utc>,
    pub violation_type: ViolationType,
}

/// Append-only violation history, capped at 100 entries, 7-day TTL. Used for
/// both user-scoped and IP-scoped namespaces.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ViolationHistory {
    pub entries: Vec<ViolationRecord>,
}

/// An active progressive penalty. Its mere presence (unexpired) hard-denies
/// every rate-limit check for the user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserPenalty {
    pub user_id: String,
    pub level: u8,
    pub reason: String,
    pub applied_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub multiplier: f64,
}

impl UserPenalty {
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.expires_at > now
    }
}

// Whitelist tiers and their limit multipliers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WhitelistLevel {
    Verified,  // 2x base limits
    Moderator, // 5x
    Admin,     // 10x
}

impl WhitelistLevel {
    pub fn multiplier(&self) -> u32 {
        match self {
            WhitelistLevel::Verified => 2,
            WhitelistLevel::Moderator => 5,
            WhitelistLevel::Admin => 10,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WhitelistEntry {
    pub user_id: String,
    pub level: WhitelistLevel,
    pub reason: String,
    pub added_at: DateTime<Utc>,
    pub added_by: String,
}

///////////////////////////////////////////////////////////////////////////////
// Security monitoring
///////////////////////////////////////////////////////////////////////////////

// Raw event kinds; severity is a pure function of the kind
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecurityEventType {
    ImpossibleTime,
    BotDetection,
    SuspiciousActivity,
    RateLimitViolation,
    AnomalyDetection,
    CommunityReport,
    ScoreAppeal,
    PenaltyApplied,
    Other(String),
}

impl SecurityEventType {
    pub fn severity(&self) -> Severity {
        match self {
            SecurityEventType::ImpossibleTime | SecurityEventType::BotDetection => {
                Severity::Critical
            }
            SecurityEventType::SuspiciousActivity
            | SecurityEventType::RateLimitViolation
            | SecurityEventType::PenaltyApplied => Severity::Medium,
            SecurityEventType::AnomalyDetection
            | SecurityEventType::CommunityReport
            | SecurityEventType::ScoreAppeal
            | SecurityEventType::Other(_) => Severity::Low,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

/// Event as reported by a component, before enrichment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecurityEvent {
    pub event_type: SecurityEventType,
    pub user_id: Option<String>,
    pub reporter_id: Option<String>,
    pub data: Option<serde_json::Value>,
}

/// Event as persisted: id, timestamp, derived severity, context metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichedSecurityEvent {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub severity: Severity,
    pub event: SecurityEvent,
    pub context: serde_json::Value,
}

// The four independent alert rules
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertRule {
    CriticalViolationSurge,
    SuspiciousUserSurge,
    RateLimitViolationSurge,
    AnomalySurge,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecurityAlert {
    pub id: Uuid,
    pub rule: AlertRule,
    pub severity: Severity,
    pub message: String,
    pub recommendations: Vec<String>,
    pub triggered_at: DateTime<Utc>,
}

/// Rolling one-hour counters derived from the real-time event window.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SecurityMetrics {
    pub window_start: Option<DateTime<Utc>>,
    pub window_end: Option<DateTime<Utc>>,
    pub critical_violations: u32,
    pub suspicious_users: u32,
    pub rate_limit_violations: u32,
    pub anomaly_detections: u32,
    pub total_events: u32,
}

///////////////////////////////////////////////////////////////////////////////
// Reports, appeals, forensics
///////////////////////////////////////////////////////////////////////////////

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportStatus {
    Pending,
    Investigating,
    Resolved,
    Dismissed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppealStatus {
    Pending,
    Reviewing,
    Approved,
    Denied,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommunityReport {
    pub id: Uuid,
    pub reporter_id: String,
    pub reported_user_id: String,
    pub reason: String,
    pub challenge_id: Option<String>,
    pub submitted_at: DateTime<Utc>,
    pub status: ReportStatus,
    pub priority: Priority,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommunityReportResult {
    pub accepted: bool,
    pub report_id: Option<Uuid>,
    pub priority: Option<Priority>,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreAppeal {
    pub id: Uuid,
    pub user_id: String,
    pub challenge_id: String,
    pub justification: String,
    pub submitted_at: DateTime<Utc>,
    pub status: AppealStatus,
    pub priority: Priority,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppealResult {
    pub accepted: bool,
    pub appeal_id: Option<Uuid>,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskAssessment {
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineEntry {
    pub timestamp: DateTime<Utc>,
    pub severity: Severity,
    pub description: String,
}

/// Read-only forensic aggregation for one user over a time range.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForensicReport {
    pub user_id: String,
    pub range_start: DateTime<Utc>,
    pub range_end: DateTime<Utc>,
    pub violations: Vec<ViolationRecord>,
    pub events: Vec<EnrichedSecurityEvent>,
    pub statistical_analysis: Option<OutlierAnalysis>,
    pub behavior_profile: Option<BehaviorProfile>,
    pub timeline: Vec<TimelineEntry>,
    pub risk: RiskAssessment,
    pub recommendations: Vec<String>,
}

/// Administrative read model for the monitoring UI.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecurityDashboard {
    pub generated_at: DateTime<Utc>,
    pub metrics: SecurityMetrics,
    pub active_alerts: Vec<SecurityAlert>,
    pub pending_reports: u32,
    pub pending_appeals: u32,
    pub recent_critical_events: Vec<EnrichedSecurityEvent>,
}
