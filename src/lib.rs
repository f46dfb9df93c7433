// Reaction Guard: anti-abuse core for a competitive reaction-time game.
// Score plausibility validation, statistical outlier detection, behavioral
// profiling, sliding-window rate limiting with progressive penalties, and
// security monitoring over a shared key-value store.

pub mod config;
pub mod error;
pub mod models;
pub mod monitoring;
pub mod rate_limit;
pub mod store;
pub mod utils;
pub mod validation;

pub use config::{load_config, SecurityConfig};
pub use error::StoreError;
pub use monitoring::{ForensicAnalyzer, SecurityMonitor};
pub use rate_limit::{PenaltyEscalator, RateLimiter, WhitelistService};
pub use store::{KeyValueStore, MemoryStore, StoreHandle};
pub use validation::ScoreValidator;
