//! Models Module - Data Structures & Configuration
//!
//! Records, snapshots, sync results, error codes and the runtime config.

pub mod config;
pub mod errors;
pub mod types;

pub use config::*;
pub use errors::*;
pub use types::*;
