//! Service configuration.

use ringvrm_crypto::DecoySelectionStrategy;
use serde::{Deserialize, Serialize};

/// Configuration for the mixing service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RingVRMConfig {
    /// Minimum ring size accepted in signatures
    pub min_ring_size: usize,

    /// Maximum ring size and anonymity set target
    pub max_ring_size: usize,

    /// Mix depth applied when a pool is created without one
    pub default_mix_depth: u32,

    /// Upper bound on requested mix depth
    pub max_mix_depth: u32,

    /// Lower bound of the randomized settlement delay, in milliseconds
    pub min_delay_ms: u64,

    /// Upper bound of the randomized settlement delay, in milliseconds
    pub max_delay_ms: u64,

    /// Pool lifetime before expiry, in seconds
    pub pool_ttl_secs: i64,

    /// Mixing fee in basis points, deducted from every input
    pub fee_bps: u32,

    /// How decoy ring members are sampled
    pub decoy_selection_strategy: DecoySelectionStrategy,
}

impl Default for RingVRMConfig {
    fn default() -> Self {
        Self {
            min_ring_size: 8,
            max_ring_size: 64,
            default_mix_depth: 3,
            max_mix_depth: 10,
            min_delay_ms: 1_000,
            max_delay_ms: 30_000,
            pool_ttl_secs: 86_400,
            fee_bps: 10,
            decoy_selection_strategy: DecoySelectionStrategy::RecencyWeighted,
        }
    }
}
