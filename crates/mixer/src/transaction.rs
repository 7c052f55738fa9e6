//! Mix transactions and join requests.

use chrono::{DateTime, Utc};
use rand::rngs::OsRng;
use rand::RngCore;
use ringvrm_crypto::RingSignature;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::pool::PoolId;

/// Transaction identifier
pub type MixTransactionId = String;

/// Settlement state of a mix transaction; transitions only move forward
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MixStatus {
    /// Admitted, waiting for `execute_mix`
    Pending,

    /// First settlement phase done, synthetic block reference assigned
    Mixed,

    /// Fully settled
    Completed,
}

/// A funded input carrying its ring signature
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MixInput {
    /// Source address
    pub address: String,

    /// Input amount
    pub amount: Decimal,

    /// Client-constructed ring signature over the input
    pub ring_signature: RingSignature,
}

/// A fee-adjusted output
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MixOutput {
    /// Destination address
    pub address: String,

    /// Output amount after fees
    pub amount: Decimal,
}

/// A recorded mix, owned by the pool referenced by `pool_id`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MixTransaction {
    /// Transaction ID
    pub id: MixTransactionId,

    /// Owning pool
    pub pool_id: PoolId,

    /// Inputs with their ring signatures
    pub inputs: Vec<MixInput>,

    /// Fee-adjusted outputs
    pub outputs: Vec<MixOutput>,

    /// Audit binding over the admission parameters
    pub mix_proof: String,

    /// Submission time
    pub timestamp: DateTime<Utc>,

    /// Settlement state
    pub status: MixStatus,

    /// Synthetic block reference, set once mixed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub block_number: Option<u64>,

    /// Settlement completion time
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,

    /// Per-request settlement delay override in milliseconds, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delay_range_ms: Option<(u64, u64)>,
}

impl MixTransaction {
    /// Record a freshly admitted mix as pending
    pub fn new(
        pool_id: PoolId,
        inputs: Vec<MixInput>,
        outputs: Vec<MixOutput>,
        mix_proof: String,
        delay_range_ms: Option<(u64, u64)>,
    ) -> Self {
        Self {
            id: format!("mixtx-{}", Uuid::new_v4()),
            pool_id,
            inputs,
            outputs,
            mix_proof,
            timestamp: Utc::now(),
            status: MixStatus::Pending,
            block_number: None,
            completed_at: None,
            delay_range_ms,
        }
    }

    /// First settlement phase: attach a block reference
    pub fn mark_mixed(&mut self, block_number: u64) {
        self.status = MixStatus::Mixed;
        self.block_number = Some(block_number);
    }

    /// Final settlement phase
    pub fn complete(&mut self) {
        self.status = MixStatus::Completed;
        self.completed_at = Some(Utc::now());
    }

    /// Total of all input amounts
    pub fn input_total(&self) -> Decimal {
        self.inputs.iter().map(|i| i.amount).sum()
    }

    /// Milliseconds from submission to completion, if completed
    pub fn mix_time_ms(&self) -> Option<u64> {
        self.completed_at.map(|done| {
            done.signed_duration_since(self.timestamp)
                .num_milliseconds()
                .max(0) as u64
        })
    }
}

/// A signed request to join a pool, produced by an external signing flow
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MixRequest {
    /// Address funding the mix
    pub input_address: String,

    /// Destination addresses for the mixed funds
    pub output_addresses: Vec<String>,

    /// Amount to mix
    pub amount: Decimal,

    /// Requested mix depth; the pool's depth applies when absent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mix_depth: Option<u32>,

    /// Optional settlement delay window override in milliseconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delay_range_ms: Option<(u64, u64)>,

    /// Ring signature over the client's spend
    pub ring_signature: RingSignature,
}

/// Bind the admission parameters into an auditable proof string.
///
/// Sha256 over the pool id, input count, amount, depth, submission time and
/// a fresh random nonce; the nonce keeps proofs for identical parameters
/// distinct.
pub fn build_mix_proof(
    pool_id: &str,
    input_count: usize,
    amount: Decimal,
    mix_depth: u32,
    timestamp: DateTime<Utc>,
) -> String {
    let mut nonce = [0u8; 16];
    OsRng.fill_bytes(&mut nonce);

    let mut hasher = Sha256::new();
    hasher.update(pool_id.as_bytes());
    hasher.update((input_count as u64).to_le_bytes());
    hasher.update(amount.to_string().as_bytes());
    hasher.update(mix_depth.to_le_bytes());
    hasher.update(timestamp.timestamp_millis().to_le_bytes());
    hasher.update(nonce);
    format!("0x{}", hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_transaction_lifecycle_moves_forward() {
        let mut tx = MixTransaction::new(
            "pool-x".to_string(),
            Vec::new(),
            Vec::new(),
            "0xproof".to_string(),
            None,
        );
        assert_eq!(tx.status, MixStatus::Pending);
        assert!(tx.id.starts_with("mixtx-"));

        tx.mark_mixed(1_234_567);
        assert_eq!(tx.status, MixStatus::Mixed);
        assert_eq!(tx.block_number, Some(1_234_567));

        tx.complete();
        assert_eq!(tx.status, MixStatus::Completed);
        assert!(tx.completed_at.is_some());
        assert!(tx.mix_time_ms().is_some());
    }

    #[test]
    fn test_input_total_sums_inputs() {
        let sig = RingSignature {
            ring_members: Vec::new(),
            key_image: String::new(),
            c0: String::new(),
            responses: Vec::new(),
        };
        let tx = MixTransaction::new(
            "pool-x".to_string(),
            vec![
                MixInput {
                    address: "0xa".to_string(),
                    amount: Decimal::from_str("1.5").unwrap(),
                    ring_signature: sig.clone(),
                },
                MixInput {
                    address: "0xb".to_string(),
                    amount: Decimal::from_str("0.5").unwrap(),
                    ring_signature: sig,
                },
            ],
            Vec::new(),
            "0xproof".to_string(),
            None,
        );
        assert_eq!(tx.input_total(), Decimal::from_str("2").unwrap());
    }

    #[test]
    fn test_mix_proofs_are_unique_per_nonce() {
        let now = Utc::now();
        let amount = Decimal::from_str("1.5").unwrap();
        let first = build_mix_proof("pool-x", 1, amount, 3, now);
        let second = build_mix_proof("pool-x", 1, amount, 3, now);

        assert!(first.starts_with("0x"));
        assert_eq!(first.len(), 66);
        assert_ne!(first, second);
    }

    #[test]
    fn test_status_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&MixStatus::Mixed).unwrap(),
            "\"mixed\""
        );
    }
}
