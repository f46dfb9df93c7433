// Reaction Guard: rate limiting, penalties, whitelisting
// Gate for every scored action: sliding-window counters per user and IP,
// progressive penalties on repeated violations, and whitelist overrides for
// trusted community members.

pub mod limiter;
pub mod penalty;
pub mod whitelist;

pub use limiter::RateLimiter;
pub use penalty::PenaltyEscalator;
pub use whitelist::WhitelistService;
