// Reaction Guard: error taxonomy for the key-value store contract

use thiserror::Error;

/// Failures of the external key-value store. Every call site in this crate
/// catches these, logs them, and fails open: a missed abuse signal beats
/// blocking a legitimate player.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store operation timed out: {0}")]
    Timeout(String),

    #[error("store backend error: {0}")]
    Backend(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
