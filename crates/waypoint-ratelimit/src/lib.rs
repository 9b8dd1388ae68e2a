//! Multi-dimensional rate limiting: RPM, concurrency, and leased cost
//! windows (5h/daily/weekly/monthly/total), each checked key-scoped then
//! user-scoped, first failure wins.
//!
//! [`limiter::RateLimiter`] is the entry point; [`windows`] builds the
//! ordered cost-window list and resolves daily reset TTLs; [`refresh`] is
//! the periodic ledger-backed counter correction.

pub mod limiter;
pub mod refresh;
pub mod windows;

pub use limiter::{RateLimitLease, RateLimiter, Subject};
pub use refresh::{run_refresh_loop, LedgerReader};
