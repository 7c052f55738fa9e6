//! Aggregated pool and system statistics.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::pool::MixPool;

/// Aggregates for a single pool
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolStats {
    /// Snapshot of the pool itself
    pub pool: MixPool,

    /// Number of admitted transactions
    pub transaction_count: usize,

    /// Sum of all input amounts
    pub total_volume: Decimal,

    /// Mean submission-to-completion time over completed transactions,
    /// in milliseconds
    pub average_mix_time_ms: u64,
}

/// System-wide aggregates across every pool and transaction observed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RingVRMStats {
    /// Volume of completed mixes
    pub total_mixed: Decimal,

    /// Volume across all transactions regardless of status
    pub total_volume: Decimal,

    /// Mean submission-to-completion time in milliseconds
    pub average_mix_time_ms: u64,

    /// Summed anonymity set size over active and mixing pools
    pub current_anonymity_set: usize,

    /// Pools currently pending, active or mixing
    pub active_pools: usize,

    /// Completed transactions as a percentage of all observed
    pub mix_success_rate: f64,
}
