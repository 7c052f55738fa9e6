//! The ring mixing service.
//!
//! Owns the pool and transaction registries, the global key-image set and
//! the settlement tasks spawned by `execute_mix`. All shared state lives in
//! `Arc`ed maps so the service clones cheaply into background tasks.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::Utc;
use rand::Rng;
use ringvrm_crypto::{RingMember, RingSignatureGenerator};
use rust_decimal::{Decimal, RoundingStrategy};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::{sleep, Duration};
use tracing::{debug, info, warn};

use crate::config::RingVRMConfig;
use crate::error::{MixerError, Result};
use crate::pool::{MixPool, PoolId, PoolStatus};
use crate::stats::{PoolStats, RingVRMStats};
use crate::transaction::{
    build_mix_proof, MixInput, MixOutput, MixRequest, MixStatus, MixTransaction, MixTransactionId,
};

const SYNTHETIC_BLOCK_BASE: u64 = 1_000_000;

/// Orchestrates anonymity pools, admission and delayed settlement.
///
/// Lock order is pools, then transactions, then key images; settlement
/// tasks never hold the transaction map while waiting on the pool map.
#[derive(Clone)]
pub struct RingMixerService {
    config: RingVRMConfig,
    generator: Arc<RingSignatureGenerator>,
    pools: Arc<RwLock<HashMap<PoolId, MixPool>>>,
    transactions: Arc<RwLock<HashMap<MixTransactionId, MixTransaction>>>,
    // Spent key images; never evicted, eviction would reopen double spends.
    used_key_images: Arc<RwLock<HashSet<String>>>,
    settlement_tasks: Arc<RwLock<HashMap<MixTransactionId, JoinHandle<()>>>>,
}

impl RingMixerService {
    /// Create a service with a generator built from the configuration
    pub fn new(config: RingVRMConfig) -> Self {
        let generator = Arc::new(RingSignatureGenerator::new(
            config.min_ring_size,
            config.max_ring_size,
            config.decoy_selection_strategy,
        ));
        Self::with_generator(config, generator)
    }

    /// Create a service around an externally constructed generator
    pub fn with_generator(config: RingVRMConfig, generator: Arc<RingSignatureGenerator>) -> Self {
        Self {
            config,
            generator,
            pools: Arc::new(RwLock::new(HashMap::new())),
            transactions: Arc::new(RwLock::new(HashMap::new())),
            used_key_images: Arc::new(RwLock::new(HashSet::new())),
            settlement_tasks: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// The generator backing this service, shared with signing clients
    pub fn generator(&self) -> Arc<RingSignatureGenerator> {
        Arc::clone(&self.generator)
    }

    /// Create a pool for `asset`, pre-seeded with decoys.
    ///
    /// The anonymity set starts one short of the depth target so the first
    /// real joiner brings it up to size.
    pub async fn create_mix_pool(
        &self,
        asset: &str,
        min_amount: Decimal,
        max_amount: Decimal,
        mix_depth: Option<u32>,
    ) -> Result<MixPool> {
        if asset.is_empty() {
            return Err(MixerError::InvalidRequest("asset must not be empty".to_string()));
        }
        if min_amount <= Decimal::ZERO || max_amount <= min_amount {
            return Err(MixerError::InvalidRequest(format!(
                "invalid amount bounds [{}, {}]",
                min_amount, max_amount
            )));
        }

        let mix_depth = mix_depth.unwrap_or(self.config.default_mix_depth);
        if mix_depth == 0 || mix_depth > self.config.max_mix_depth {
            return Err(MixerError::InvalidMixDepth(format!(
                "depth {} outside [1, {}]",
                mix_depth, self.config.max_mix_depth
            )));
        }

        let target = self.generator.calculate_anonymity_set_size(mix_depth);
        let decoys = self.generator.select_decoys(target - 1, "", asset)?;

        let pool = MixPool::new(
            asset.to_string(),
            min_amount,
            max_amount,
            mix_depth,
            self.config.fee_bps,
            self.config.pool_ttl_secs,
            decoys,
        );

        let mut pools = self.pools.write().await;
        pools.insert(pool.id.clone(), pool.clone());
        info!(
            pool_id = %pool.id,
            asset,
            mix_depth,
            anonymity_set = pool.anonymity_set.len(),
            "created mix pool"
        );
        Ok(pool)
    }

    /// Admit a signed mix request into a pool.
    ///
    /// Atomic: the key-image insertion is the commit point and nothing
    /// fallible runs after it, so either the transaction is fully recorded
    /// or nothing changed.
    pub async fn join_mix_pool(&self, pool_id: &str, request: MixRequest) -> Result<MixTransaction> {
        if request.output_addresses.is_empty() {
            return Err(MixerError::InvalidRequest(
                "at least one output address is required".to_string(),
            ));
        }
        if let Some(depth) = request.mix_depth {
            if depth == 0 || depth > self.config.max_mix_depth {
                return Err(MixerError::InvalidMixDepth(format!(
                    "depth {} outside [1, {}]",
                    depth, self.config.max_mix_depth
                )));
            }
        }
        if let Some((min_ms, max_ms)) = request.delay_range_ms {
            if min_ms > max_ms {
                return Err(MixerError::InvalidRequest(format!(
                    "delay range [{}, {}] is inverted",
                    min_ms, max_ms
                )));
            }
        }
        self.generator
            .validate_signature_structure(&request.ring_signature)?;

        let key_image = request.ring_signature.key_image.clone();
        let now = Utc::now();

        let mut pools = self.pools.write().await;
        let mut transactions = self.transactions.write().await;

        let pool = pools
            .get_mut(pool_id)
            .ok_or_else(|| MixerError::PoolNotFound(pool_id.to_string()))?;
        if pool.is_expired(now) {
            // Expired pools behave as if already evicted.
            return Err(MixerError::PoolNotFound(pool_id.to_string()));
        }
        if !pool.is_accepting(now) {
            return Err(MixerError::PoolNotAccepting(format!(
                "pool {} is {:?}",
                pool_id, pool.status
            )));
        }
        if !pool.accepts_amount(request.amount) {
            return Err(MixerError::AmountOutOfRange(format!(
                "{} outside [{}, {}]",
                request.amount, pool.min_amount, pool.max_amount
            )));
        }
        let admitted = transactions
            .values()
            .filter(|t| t.pool_id == *pool_id)
            .count();
        if admitted >= self.config.max_ring_size {
            return Err(MixerError::PoolNotAccepting(format!(
                "pool {} is at capacity ({})",
                pool_id, admitted
            )));
        }

        {
            let mut images = self.used_key_images.write().await;
            // Test-and-set: insertion is the commit point.
            if !images.insert(key_image.clone()) {
                warn!(pool_id, key_image = %key_image, "rejected duplicate key image");
                return Err(MixerError::DuplicateKeyImage(key_image));
            }
        }

        let mix_depth = request.mix_depth.unwrap_or(pool.mix_depth);
        let outputs = split_outputs(
            request.amount,
            pool.fee_bps,
            &request.output_addresses,
        );
        let timestamp = Utc::now();
        let mix_proof = build_mix_proof(pool_id, 1, request.amount, mix_depth, timestamp);

        let transaction = MixTransaction::new(
            pool_id.to_string(),
            vec![MixInput {
                address: request.input_address.clone(),
                amount: request.amount,
                ring_signature: request.ring_signature.clone(),
            }],
            outputs,
            mix_proof,
            request.delay_range_ms,
        );

        // Extend the anonymity set with the joiner. Any ring key stands in
        // for the hidden signer without linking the address to it.
        let borrowed_key_index =
            rand::thread_rng().gen_range(0..request.ring_signature.ring_members.len());
        let member = RingMember {
            address: request.input_address,
            public_key: request.ring_signature.ring_members[borrowed_key_index].clone(),
            index: 0,
        };
        pool.admit_member(member.clone());
        self.generator.register_candidate(&pool.asset, member);

        if pool.status == PoolStatus::Pending {
            pool.status = PoolStatus::Active;
        }

        transactions.insert(transaction.id.clone(), transaction.clone());
        info!(
            pool_id,
            tx_id = %transaction.id,
            amount = %request.amount,
            anonymity_set = pool.anonymity_set.len(),
            "admitted mix transaction"
        );
        Ok(transaction)
    }

    /// Start randomized delayed settlement for every pending transaction.
    ///
    /// Returns as soon as the tasks are scheduled; each transaction settles
    /// independently after two uniform delays, so completion order is
    /// deliberately unrelated to submission order.
    pub async fn execute_mix(&self, pool_id: &str) -> Result<()> {
        let now = Utc::now();
        let pending: Vec<(MixTransactionId, Option<(u64, u64)>)> = {
            let mut pools = self.pools.write().await;
            let transactions = self.transactions.read().await;

            let pool = pools
                .get_mut(pool_id)
                .ok_or_else(|| MixerError::PoolNotFound(pool_id.to_string()))?;
            if pool.is_expired(now) {
                return Err(MixerError::PoolNotFound(pool_id.to_string()));
            }
            if !matches!(pool.status, PoolStatus::Pending | PoolStatus::Active) {
                return Err(MixerError::PoolNotAccepting(format!(
                    "pool {} is {:?}",
                    pool_id, pool.status
                )));
            }

            let pending: Vec<_> = transactions
                .values()
                .filter(|t| t.pool_id == *pool_id && t.status == MixStatus::Pending)
                .map(|t| (t.id.clone(), t.delay_range_ms))
                .collect();
            if pending.is_empty() {
                return Err(MixerError::InvalidRequest(format!(
                    "pool {} has no pending transactions",
                    pool_id
                )));
            }

            pool.status = PoolStatus::Mixing;
            pending
        };

        let mut tasks = self.settlement_tasks.write().await;
        for (tx_id, delay_override) in &pending {
            let (min_ms, max_ms) =
                delay_override.unwrap_or((self.config.min_delay_ms, self.config.max_delay_ms));
            let (first_delay, second_delay, block_number) = {
                let mut rng = rand::thread_rng();
                (
                    rng.gen_range(min_ms..=max_ms),
                    rng.gen_range(min_ms..=max_ms),
                    SYNTHETIC_BLOCK_BASE + rng.gen_range(0..100_000),
                )
            };

            let service = self.clone();
            let task_pool_id = pool_id.to_string();
            let task_tx_id = tx_id.clone();
            let handle = tokio::spawn(async move {
                service
                    .settle(task_pool_id, task_tx_id, first_delay, second_delay, block_number)
                    .await;
            });
            tasks.insert(tx_id.clone(), handle);
        }

        info!(pool_id, transactions = pending.len(), "mixing started");
        Ok(())
    }

    /// Two-phase settlement for one transaction. A cancelled or missing
    /// transaction is left at its last recorded status.
    async fn settle(
        &self,
        pool_id: String,
        tx_id: MixTransactionId,
        first_delay_ms: u64,
        second_delay_ms: u64,
        block_number: u64,
    ) {
        sleep(Duration::from_millis(first_delay_ms)).await;
        {
            let mut transactions = self.transactions.write().await;
            match transactions.get_mut(&tx_id) {
                Some(tx) if tx.status == MixStatus::Pending => tx.mark_mixed(block_number),
                _ => return,
            }
        }
        debug!(%tx_id, block_number, "transaction mixed");

        sleep(Duration::from_millis(second_delay_ms)).await;
        {
            let mut transactions = self.transactions.write().await;
            match transactions.get_mut(&tx_id) {
                Some(tx) if tx.status == MixStatus::Mixed => tx.complete(),
                _ => return,
            }
        }
        debug!(%tx_id, "transaction completed");

        self.maybe_complete_pool(&pool_id).await;
        self.settlement_tasks.write().await.remove(&tx_id);
    }

    /// Flip a mixing pool to completed once every transaction settled
    async fn maybe_complete_pool(&self, pool_id: &str) {
        let all_completed = {
            let transactions = self.transactions.read().await;
            let mut any = false;
            let mut done = true;
            for tx in transactions.values().filter(|t| t.pool_id == *pool_id) {
                any = true;
                if tx.status != MixStatus::Completed {
                    done = false;
                    break;
                }
            }
            any && done
        };

        if all_completed {
            let mut pools = self.pools.write().await;
            if let Some(pool) = pools.get_mut(pool_id) {
                if pool.status == PoolStatus::Mixing {
                    pool.status = PoolStatus::Completed;
                    info!(pool_id, "pool completed");
                }
            }
        }
    }

    /// Look up a pool by id.
    ///
    /// A pool past its TTL but not yet swept is reported with status
    /// `Expired`.
    pub async fn get_pool(&self, pool_id: &str) -> Result<MixPool> {
        let pools = self.pools.read().await;
        let mut pool = pools
            .get(pool_id)
            .cloned()
            .ok_or_else(|| MixerError::PoolNotFound(pool_id.to_string()))?;
        if pool.is_expired(Utc::now())
            && matches!(pool.status, PoolStatus::Pending | PoolStatus::Active)
        {
            pool.status = PoolStatus::Expired;
        }
        Ok(pool)
    }

    /// All non-expired pools currently accepting joins
    pub async fn get_available_pools(&self) -> Vec<MixPool> {
        let now = Utc::now();
        let pools = self.pools.read().await;
        pools.values().filter(|p| p.is_accepting(now)).cloned().collect()
    }

    /// Accepting pools for `asset` whose bounds contain `amount`, smallest
    /// anonymity set first so thin pools fill up before crowded ones
    pub async fn find_eligible_pools(&self, asset: &str, amount: Decimal) -> Vec<MixPool> {
        let now = Utc::now();
        let pools = self.pools.read().await;
        let mut eligible: Vec<MixPool> = pools
            .values()
            .filter(|p| p.asset == asset && p.is_accepting(now) && p.accepts_amount(amount))
            .cloned()
            .collect();
        eligible.sort_by_key(|p| p.anonymity_set.len());
        eligible
    }

    /// Look up a transaction by id
    pub async fn get_transaction(&self, tx_id: &str) -> Result<MixTransaction> {
        let transactions = self.transactions.read().await;
        transactions
            .get(tx_id)
            .cloned()
            .ok_or_else(|| MixerError::TransactionNotFound(tx_id.to_string()))
    }

    /// All transactions admitted into a pool
    pub async fn get_pool_transactions(&self, pool_id: &str) -> Result<Vec<MixTransaction>> {
        {
            let pools = self.pools.read().await;
            if !pools.contains_key(pool_id) {
                return Err(MixerError::PoolNotFound(pool_id.to_string()));
            }
        }
        let transactions = self.transactions.read().await;
        Ok(transactions
            .values()
            .filter(|t| t.pool_id == *pool_id)
            .cloned()
            .collect())
    }

    /// Aggregates for one pool
    pub async fn get_pool_stats(&self, pool_id: &str) -> Result<PoolStats> {
        let pool = self.get_pool(pool_id).await?;
        let transactions = self.transactions.read().await;
        let pool_txs: Vec<&MixTransaction> = transactions
            .values()
            .filter(|t| t.pool_id == *pool_id)
            .collect();

        let total_volume = pool_txs.iter().map(|t| t.input_total()).sum();
        let mix_times: Vec<u64> = pool_txs.iter().filter_map(|t| t.mix_time_ms()).collect();
        let average_mix_time_ms = if mix_times.is_empty() {
            0
        } else {
            mix_times.iter().sum::<u64>() / mix_times.len() as u64
        };

        Ok(PoolStats {
            transaction_count: pool_txs.len(),
            total_volume,
            average_mix_time_ms,
            pool,
        })
    }

    /// System-wide aggregates across every pool and transaction observed
    pub async fn get_system_stats(&self) -> RingVRMStats {
        let pools = self.pools.read().await;
        let transactions = self.transactions.read().await;

        let mut total_volume = Decimal::ZERO;
        let mut total_mixed = Decimal::ZERO;
        let mut completed = 0usize;
        let mut mix_time_total = 0u64;
        for tx in transactions.values() {
            let volume = tx.input_total();
            total_volume += volume;
            if tx.status == MixStatus::Completed {
                total_mixed += volume;
                completed += 1;
                mix_time_total += tx.mix_time_ms().unwrap_or(0);
            }
        }

        let average_mix_time_ms = if completed == 0 {
            0
        } else {
            mix_time_total / completed as u64
        };
        let mix_success_rate = if transactions.is_empty() {
            0.0
        } else {
            completed as f64 / transactions.len() as f64 * 100.0
        };

        let now = Utc::now();
        let mut current_anonymity_set = 0usize;
        let mut active_pools = 0usize;
        for pool in pools.values() {
            if pool.is_expired(now) {
                continue;
            }
            match pool.status {
                PoolStatus::Active | PoolStatus::Mixing => {
                    current_anonymity_set += pool.anonymity_set.len();
                    active_pools += 1;
                }
                PoolStatus::Pending => active_pools += 1,
                PoolStatus::Completed | PoolStatus::Expired => {}
            }
        }

        RingVRMStats {
            total_mixed,
            total_volume,
            average_mix_time_ms,
            current_anonymity_set,
            active_pools,
            mix_success_rate,
        }
    }

    /// Evict every pool whose TTL elapsed and cancel its settlement tasks.
    ///
    /// Returns the number of evicted pools. Transactions of evicted pools
    /// keep their last status and stay reachable by transaction id only.
    pub async fn cleanup_expired_pools(&self) -> usize {
        let now = Utc::now();
        let expired: Vec<PoolId> = {
            let mut pools = self.pools.write().await;
            let expired: Vec<PoolId> = pools
                .values()
                .filter(|p| p.is_expired(now))
                .map(|p| p.id.clone())
                .collect();
            for id in &expired {
                pools.remove(id);
            }
            expired
        };
        if expired.is_empty() {
            return 0;
        }

        let orphaned: Vec<MixTransactionId> = {
            let transactions = self.transactions.read().await;
            transactions
                .values()
                .filter(|t| expired.contains(&t.pool_id))
                .map(|t| t.id.clone())
                .collect()
        };
        let mut tasks = self.settlement_tasks.write().await;
        for tx_id in &orphaned {
            if let Some(handle) = tasks.remove(tx_id) {
                handle.abort();
            }
        }

        info!(
            pools = expired.len(),
            cancelled_tasks = orphaned.len(),
            "evicted expired pools"
        );
        expired.len()
    }

    /// Cancel every outstanding settlement task.
    ///
    /// In-flight transactions keep their last recorded status.
    pub async fn shutdown(&self) {
        let mut tasks = self.settlement_tasks.write().await;
        let count = tasks.len();
        for (_, handle) in tasks.drain() {
            handle.abort();
        }
        if count > 0 {
            info!(cancelled_tasks = count, "mixer shut down");
        }
    }
}

impl std::fmt::Debug for RingMixerService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RingMixerService")
            .field("config", &self.config)
            .finish()
    }
}

/// Split `amount` minus fees across the output addresses.
///
/// The division remainder lands on the first output so the outputs always
/// sum exactly to the net amount. The per-output share is rounded toward
/// zero so the remainder is never negative.
fn split_outputs(amount: Decimal, fee_bps: u32, addresses: &[String]) -> Vec<MixOutput> {
    let fee = amount * Decimal::from(fee_bps) / Decimal::from(10_000u32);
    let net = amount - fee;
    let count = Decimal::from(addresses.len() as u64);
    let share = (net / count).round_dp_with_strategy(18, RoundingStrategy::ToZero);
    let first = net - share * (count - Decimal::ONE);

    addresses
        .iter()
        .enumerate()
        .map(|(i, address)| MixOutput {
            address: address.clone(),
            amount: if i == 0 { first } else { share },
        })
        .collect()
}
