//! Core Module - Scoring & Sync Pipelines
//!
//! Pure scoring heuristics plus the wallet, market and popularity pipelines
//! that drive providers and stores, and the periodic jobs that run them.

pub mod discovery;
pub mod market_sync;
pub mod popularity;
pub mod scheduler;
pub mod scoring;
pub mod staleness;
pub mod wallet_sync;

pub use discovery::*;
pub use market_sync::*;
pub use popularity::*;
pub use scheduler::*;
pub use scoring::*;
pub use staleness::*;
pub use wallet_sync::*;
