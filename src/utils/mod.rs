//! Utils Module - Shared Helpers
//!
//! Rate limiting, TTL cache, telemetry counters, address and numeric helpers.

pub mod address;
pub mod cache;
pub mod constants;
pub mod fixed_point;
pub mod rate_limiter;
pub mod telemetry;

pub use address::*;
pub use cache::*;
pub use constants::*;
pub use fixed_point::*;
pub use rate_limiter::*;
pub use telemetry::*;
