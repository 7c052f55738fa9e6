//! Ring signature layer for the RingVRM mixer.
//!
//! This crate provides the cryptographic primitives the mixer builds on:
//! bLSAG linkable ring signatures with deterministic key images, and a
//! decoy candidate universe with pluggable selection strategies.

mod decoy;
mod error;
mod signature;

pub use decoy::{
    Candidate, DecoySampler, DecoySelectionStrategy, RecencyWeightedSampler, UniformSampler,
};
pub use error::{CryptoError, Result};
pub use signature::{key_image, sign, validate_structure, verify, RingSignature, SecretKey};

use std::collections::HashMap;
use std::sync::RwLock;

use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Version of the ring signature layer
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Upper bound on candidates retained per asset
const MAX_UNIVERSE_PER_ASSET: usize = 1024;

/// A candidate or real participant in a ring
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RingMember {
    /// External address of the participant
    pub address: String,

    /// Hex-encoded compressed public key
    pub public_key: String,

    /// Position of this member within its ring or anonymity set
    pub index: usize,
}

/// Produces and validates ring signatures and selects decoys.
///
/// Holds a per-asset universe of decoy candidates; selection goes through
/// the configured [`DecoySampler`].
pub struct RingSignatureGenerator {
    min_ring_size: usize,
    max_ring_size: usize,
    sampler: Box<dyn DecoySampler>,
    universe: RwLock<HashMap<String, Vec<Candidate>>>,
}

impl RingSignatureGenerator {
    /// Create a generator with one of the built-in selection strategies
    pub fn new(min_ring_size: usize, max_ring_size: usize, strategy: DecoySelectionStrategy) -> Self {
        Self::with_sampler(min_ring_size, max_ring_size, decoy::sampler_for(strategy))
    }

    /// Create a generator with a custom decoy sampler
    pub fn with_sampler(
        min_ring_size: usize,
        max_ring_size: usize,
        sampler: Box<dyn DecoySampler>,
    ) -> Self {
        Self {
            min_ring_size: min_ring_size.max(2),
            max_ring_size: max_ring_size.max(min_ring_size.max(2)),
            sampler,
            universe: RwLock::new(HashMap::new()),
        }
    }

    /// Minimum ring size enforced on generated signatures
    pub fn min_ring_size(&self) -> usize {
        self.min_ring_size
    }

    /// Target anonymity set size for a mix depth.
    ///
    /// Grows linearly with depth and is clamped to the configured ring
    /// bounds, so deeper mixes get larger rings without unbounded cost.
    pub fn calculate_anonymity_set_size(&self, mix_depth: u32) -> usize {
        self.min_ring_size
            .saturating_mul(mix_depth.max(1) as usize)
            .clamp(self.min_ring_size, self.max_ring_size)
    }

    /// Sign `message` with `secret` hidden among `ring_members`.
    ///
    /// Fails with `InvalidRingSize` when fewer than the configured minimum
    /// of members is supplied and `InvalidSignerIndex` when the index does
    /// not point into the ring.
    pub fn generate_ring_signature(
        &self,
        message: &[u8],
        secret: &SecretKey,
        ring_members: &[RingMember],
        signer_index: usize,
    ) -> Result<RingSignature> {
        if ring_members.len() < self.min_ring_size {
            return Err(CryptoError::InvalidRingSize {
                got: ring_members.len(),
                min: self.min_ring_size,
            });
        }
        signature::sign(message, secret, ring_members, signer_index)
    }

    /// Verify a ring signature against `message`
    pub fn verify_ring_signature(&self, message: &[u8], signature: &RingSignature) -> Result<bool> {
        signature::verify(message, signature)
    }

    /// Decode and shape-check a signature without a message.
    ///
    /// Used at pool admission, where the signed message stays with the
    /// client and only structural validity can be checked.
    pub fn validate_signature_structure(&self, signature: &RingSignature) -> Result<()> {
        if signature.ring_members.len() < self.min_ring_size {
            return Err(CryptoError::InvalidRingSize {
                got: signature.ring_members.len(),
                min: self.min_ring_size,
            });
        }
        signature::validate_structure(signature)
    }

    /// Register an observed participant as a decoy candidate for `asset`
    pub fn register_candidate(&self, asset: &str, member: RingMember) {
        let mut universe = self
            .universe
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let candidates = universe.entry(asset.to_string()).or_default();
        if candidates.len() >= MAX_UNIVERSE_PER_ASSET {
            candidates.remove(0);
        }
        candidates.push(Candidate {
            member,
            last_seen: chrono::Utc::now(),
        });
    }

    /// Select `count` distinct decoys for `asset`, never including
    /// `exclude_address`.
    ///
    /// The universe is topped up with synthesized candidates when it cannot
    /// cover the request.
    pub fn select_decoys(
        &self,
        count: usize,
        exclude_address: &str,
        asset: &str,
    ) -> Result<Vec<RingMember>> {
        if count == 0 {
            return Ok(Vec::new());
        }
        if count >= MAX_UNIVERSE_PER_ASSET {
            return Err(CryptoError::InsufficientDecoys {
                wanted: count,
                available: MAX_UNIVERSE_PER_ASSET - 1,
            });
        }

        let mut rng = OsRng;
        let mut universe = self
            .universe
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let candidates = universe.entry(asset.to_string()).or_default();

        let eligible_now = candidates
            .iter()
            .filter(|c| c.member.address != exclude_address)
            .count();
        if eligible_now < count {
            let missing = count - eligible_now;
            debug!(asset, missing, "topping up decoy universe");
            for _ in 0..missing {
                candidates.push(decoy::synthesize_candidate(&mut rng));
            }
        }

        let eligible: Vec<Candidate> = candidates
            .iter()
            .filter(|c| c.member.address != exclude_address)
            .cloned()
            .collect();

        let picked = self.sampler.sample(&eligible, count, &mut rng);
        if picked.len() < count {
            return Err(CryptoError::InsufficientDecoys {
                wanted: count,
                available: picked.len(),
            });
        }

        Ok(picked
            .into_iter()
            .enumerate()
            .map(|(position, candidate_index)| {
                let mut member = eligible[candidate_index].member.clone();
                member.index = position;
                member
            })
            .collect())
    }
}

impl std::fmt::Debug for RingSignatureGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RingSignatureGenerator")
            .field("min_ring_size", &self.min_ring_size)
            .field("max_ring_size", &self.max_ring_size)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn generator() -> RingSignatureGenerator {
        RingSignatureGenerator::new(8, 64, DecoySelectionStrategy::Uniform)
    }

    #[test]
    fn test_anonymity_set_size_is_monotone_and_bounded() {
        let gen = generator();
        let mut previous = 0;
        for depth in 1..=20 {
            let size = gen.calculate_anonymity_set_size(depth);
            assert!(size >= previous, "size shrank at depth {}", depth);
            assert!(size >= 8 && size <= 64);
            previous = size;
        }
        assert_eq!(gen.calculate_anonymity_set_size(0), 8);
        assert_eq!(gen.calculate_anonymity_set_size(1), 8);
        assert_eq!(gen.calculate_anonymity_set_size(2), 16);
        assert_eq!(gen.calculate_anonymity_set_size(100), 64);
    }

    #[test]
    fn test_select_decoys_distinct_and_excluding() {
        let gen = generator();
        let excluded = "0xme".to_string();
        gen.register_candidate(
            "ETH",
            RingMember {
                address: excluded.clone(),
                public_key: SecretKey::generate().public_key(),
                index: 0,
            },
        );

        let decoys = gen.select_decoys(15, &excluded, "ETH").unwrap();
        assert_eq!(decoys.len(), 15);

        let mut addresses: Vec<&str> = decoys.iter().map(|d| d.address.as_str()).collect();
        addresses.sort_unstable();
        addresses.dedup();
        assert_eq!(addresses.len(), 15);
        assert!(!addresses.contains(&excluded.as_str()));

        for (i, decoy) in decoys.iter().enumerate() {
            assert_eq!(decoy.index, i);
        }
    }

    #[test]
    fn test_select_decoys_tops_up_empty_universe() {
        let gen = generator();
        let decoys = gen.select_decoys(31, "", "BTC").unwrap();
        assert_eq!(decoys.len(), 31);
    }

    #[test]
    fn test_select_decoys_rejects_absurd_counts() {
        let gen = generator();
        let err = gen.select_decoys(2000, "", "ETH").unwrap_err();
        assert!(matches!(err, CryptoError::InsufficientDecoys { .. }));
    }

    #[test]
    fn test_generate_enforces_min_ring_size() {
        let gen = generator();
        let secret = SecretKey::generate();
        let members: Vec<RingMember> = (0..4)
            .map(|i| RingMember {
                address: format!("0x{}", i),
                public_key: secret.public_key(),
                index: i,
            })
            .collect();

        let err = gen
            .generate_ring_signature(b"m", &secret, &members, 0)
            .unwrap_err();
        assert!(matches!(err, CryptoError::InvalidRingSize { got: 4, min: 8 }));
    }

    #[test]
    fn test_generator_end_to_end_round_trip() {
        let gen = generator();
        let secret = SecretKey::generate();
        let mut members = gen.select_decoys(9, "", "ETH").unwrap();
        members[4] = RingMember {
            address: "0xsigner".to_string(),
            public_key: secret.public_key(),
            index: 4,
        };

        let signature = gen
            .generate_ring_signature(b"spend", &secret, &members, 4)
            .unwrap();
        assert!(gen.verify_ring_signature(b"spend", &signature).unwrap());
        assert!(gen.validate_signature_structure(&signature).is_ok());
        assert_eq!(signature.key_image, key_image(&secret));
    }
}
