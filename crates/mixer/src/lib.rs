//! Anonymity pool orchestration for the RingVRM mixer.
//!
//! This crate manages pools of pending mix transactions, admits signed mix
//! requests with double-spend protection via key images, and settles
//! admitted transactions through randomized two-phase delays.

mod config;
mod error;
mod pool;
mod service;
mod stats;
mod transaction;

pub use config::RingVRMConfig;
pub use error::{MixerError, Result};
pub use pool::{MixPool, PoolId, PoolStatus};
pub use service::RingMixerService;
pub use stats::{PoolStats, RingVRMStats};
pub use transaction::{
    build_mix_proof, MixInput, MixOutput, MixRequest, MixStatus, MixTransaction, MixTransactionId,
};

/// Version of the mixer implementation
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
