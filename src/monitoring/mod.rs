// Reaction Guard: security monitoring
// Event log, rolling metrics, threshold alerts, community reports, score
// appeals, and forensic case analysis, all sharing one monitor over the
// key-value store.

pub mod alerts;
pub mod events;
pub mod forensics;
pub mod reports;

pub use events::SecurityMonitor;
pub use forensics::ForensicAnalyzer;
