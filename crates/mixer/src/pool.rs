//! Anonymity pools and their lifecycle.

use chrono::{DateTime, Duration, Utc};
use ringvrm_crypto::RingMember;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Pool identifier
pub type PoolId = String;

/// Lifecycle state of a mix pool.
///
/// Transitions only move forward: `Pending -> Active -> Mixing ->
/// Completed`, with `Expired` reachable from `Pending` or `Active` once the
/// pool's TTL elapses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PoolStatus {
    /// Created, accepting joins, no transaction admitted yet
    Pending,

    /// At least one transaction admitted, still accepting joins
    Active,

    /// Settlement in flight, no new joins
    Mixing,

    /// Every admitted transaction settled
    Completed,

    /// TTL elapsed before the pool completed
    Expired,
}

/// A bounded anonymity pool for one asset
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MixPool {
    /// Pool ID
    pub id: PoolId,

    /// Asset mixed in this pool
    pub asset: String,

    /// Requested mix depth, drives the anonymity set target
    pub mix_depth: u32,

    /// Smallest accepted input amount
    pub min_amount: Decimal,

    /// Largest accepted input amount
    pub max_amount: Decimal,

    /// Mixing fee in basis points
    pub fee_bps: u32,

    /// Real and decoy participants admitted so far
    pub anonymity_set: Vec<RingMember>,

    /// Lifecycle state
    pub status: PoolStatus,

    /// Creation time
    pub created_at: DateTime<Utc>,

    /// Expiry time; the pool is evicted once this passes
    pub expires_at: DateTime<Utc>,
}

impl MixPool {
    /// Create a pool pre-seeded with decoys
    pub fn new(
        asset: String,
        min_amount: Decimal,
        max_amount: Decimal,
        mix_depth: u32,
        fee_bps: u32,
        ttl_secs: i64,
        anonymity_set: Vec<RingMember>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: format!("pool-{}", Uuid::new_v4()),
            asset,
            mix_depth,
            min_amount,
            max_amount,
            fee_bps,
            anonymity_set,
            status: PoolStatus::Pending,
            created_at: now,
            expires_at: now + Duration::seconds(ttl_secs),
        }
    }

    /// Whether the TTL has elapsed
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Whether the pool currently accepts joins
    pub fn is_accepting(&self, now: DateTime<Utc>) -> bool {
        matches!(self.status, PoolStatus::Pending | PoolStatus::Active) && !self.is_expired(now)
    }

    /// Whether `amount` falls inside the pool's bounds
    pub fn accepts_amount(&self, amount: Decimal) -> bool {
        amount >= self.min_amount && amount <= self.max_amount
    }

    /// Append a member to the anonymity set at the next index
    pub fn admit_member(&mut self, mut member: RingMember) {
        member.index = self.anonymity_set.len();
        self.anonymity_set.push(member);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn pool() -> MixPool {
        MixPool::new(
            "ETH".to_string(),
            Decimal::from_str("0.1").unwrap(),
            Decimal::from_str("10").unwrap(),
            2,
            10,
            3600,
            Vec::new(),
        )
    }

    #[test]
    fn test_new_pool_is_pending_with_id_prefix() {
        let pool = pool();
        assert_eq!(pool.status, PoolStatus::Pending);
        assert!(pool.id.starts_with("pool-"));
        assert!(pool.expires_at > pool.created_at);
    }

    #[test]
    fn test_amount_bounds_are_inclusive() {
        let pool = pool();
        assert!(pool.accepts_amount(Decimal::from_str("0.1").unwrap()));
        assert!(pool.accepts_amount(Decimal::from_str("10").unwrap()));
        assert!(pool.accepts_amount(Decimal::from_str("1.5").unwrap()));
        assert!(!pool.accepts_amount(Decimal::from_str("0.099").unwrap()));
        assert!(!pool.accepts_amount(Decimal::from_str("100").unwrap()));
    }

    #[test]
    fn test_expired_pool_stops_accepting() {
        let mut pool = pool();
        assert!(pool.is_accepting(Utc::now()));
        pool.expires_at = Utc::now() - Duration::seconds(1);
        assert!(!pool.is_accepting(Utc::now()));
    }

    #[test]
    fn test_mixing_pool_stops_accepting() {
        let mut pool = pool();
        pool.status = PoolStatus::Mixing;
        assert!(!pool.is_accepting(Utc::now()));
    }

    #[test]
    fn test_admit_member_reindexes() {
        let mut pool = pool();
        for expected in 0..3 {
            pool.admit_member(RingMember {
                address: format!("0x{}", expected),
                public_key: String::new(),
                index: 99,
            });
            assert_eq!(pool.anonymity_set[expected].index, expected);
        }
    }

    #[test]
    fn test_status_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&PoolStatus::Pending).unwrap(),
            "\"pending\""
        );
        assert_eq!(
            serde_json::to_string(&PoolStatus::Mixing).unwrap(),
            "\"mixing\""
        );
    }
}
