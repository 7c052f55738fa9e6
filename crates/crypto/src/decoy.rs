//! Decoy candidate universe and selection strategies.
//!
//! The generator keeps a per-asset universe of candidate ring members and
//! draws decoys from it through a pluggable sampler. Real participants can
//! be registered as they are observed; when the universe runs short it is
//! topped up with synthesized members so young assets still get full rings.

use chrono::{DateTime, Duration, Utc};
use rand::distributions::{Distribution, WeightedIndex};
use rand::{Rng, RngCore};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::signature::SecretKey;
use crate::RingMember;

/// Selection policy for decoy sampling, chosen in service configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecoySelectionStrategy {
    /// Every candidate is equally likely
    Uniform,

    /// Recently seen candidates are favored, mimicking real spend-age
    /// distributions
    RecencyWeighted,
}

/// A candidate ring member together with when it was last observed
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candidate {
    /// The ring member itself
    pub member: RingMember,

    /// Last time this address was seen participating
    pub last_seen: DateTime<Utc>,
}

/// Draws `count` distinct candidate indices from a slice of candidates.
///
/// Implementations must never return a duplicate index within one call.
pub trait DecoySampler: Send + Sync {
    fn sample(&self, candidates: &[Candidate], count: usize, rng: &mut dyn RngCore) -> Vec<usize>;
}

/// Uniform sampling without replacement
#[derive(Debug, Default)]
pub struct UniformSampler;

impl DecoySampler for UniformSampler {
    fn sample(&self, candidates: &[Candidate], count: usize, rng: &mut dyn RngCore) -> Vec<usize> {
        let count = count.min(candidates.len());
        rand::seq::index::sample(rng, candidates.len(), count).into_vec()
    }
}

/// Recency-weighted sampling: a candidate's weight halves for every hour
/// since it was last seen, floored so stale candidates stay reachable.
#[derive(Debug, Default)]
pub struct RecencyWeightedSampler;

const MIN_WEIGHT: f64 = 1e-6;

impl DecoySampler for RecencyWeightedSampler {
    fn sample(&self, candidates: &[Candidate], count: usize, rng: &mut dyn RngCore) -> Vec<usize> {
        let count = count.min(candidates.len());
        let now = Utc::now();
        let mut weights: Vec<f64> = candidates
            .iter()
            .map(|c| {
                let age_hours =
                    now.signed_duration_since(c.last_seen).num_seconds().max(0) as f64 / 3600.0;
                (0.5f64).powf(age_hours).max(MIN_WEIGHT)
            })
            .collect();

        let mut selected = Vec::with_capacity(count);
        while selected.len() < count {
            let dist = match WeightedIndex::new(&weights) {
                Ok(dist) => dist,
                // All remaining weight zeroed; fall back to whatever is left.
                Err(_) => break,
            };
            let index = dist.sample(rng);
            weights[index] = 0.0;
            selected.push(index);
        }

        if selected.len() < count {
            for index in 0..candidates.len() {
                if selected.len() == count {
                    break;
                }
                if !selected.contains(&index) {
                    selected.push(index);
                }
            }
        }

        selected
    }
}

pub(crate) fn sampler_for(strategy: DecoySelectionStrategy) -> Box<dyn DecoySampler> {
    match strategy {
        DecoySelectionStrategy::Uniform => Box::new(UniformSampler),
        DecoySelectionStrategy::RecencyWeighted => Box::new(RecencyWeightedSampler),
    }
}

/// Synthesize a fresh candidate with a real keypair and a derived address.
///
/// The address is the truncated hash of the public key, so synthesized
/// members look like ordinary external addresses.
pub(crate) fn synthesize_candidate(rng: &mut dyn RngCore) -> Candidate {
    let public_key = SecretKey::generate().public_key();
    let digest = Sha256::digest(public_key.as_bytes());
    let address = format!("0x{}", hex::encode(&digest[..20]));

    // Spread synthetic ages so recency weighting has something to bite on.
    let age_minutes: i64 = rng.gen_range(0..600);
    Candidate {
        member: RingMember {
            address,
            public_key,
            index: 0,
        },
        last_seen: Utc::now() - Duration::minutes(age_minutes),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::OsRng;

    fn candidates(n: usize) -> Vec<Candidate> {
        let mut rng = OsRng;
        (0..n).map(|_| synthesize_candidate(&mut rng)).collect()
    }

    #[test]
    fn test_uniform_sample_is_distinct() {
        let pool = candidates(32);
        let picked = UniformSampler.sample(&pool, 16, &mut OsRng);

        assert_eq!(picked.len(), 16);
        let mut sorted = picked.clone();
        sorted.sort_unstable();
        sorted.dedup();
        assert_eq!(sorted.len(), 16);
    }

    #[test]
    fn test_recency_sample_is_distinct_and_full() {
        let pool = candidates(32);
        let picked = RecencyWeightedSampler.sample(&pool, 20, &mut OsRng);

        assert_eq!(picked.len(), 20);
        let mut sorted = picked.clone();
        sorted.sort_unstable();
        sorted.dedup();
        assert_eq!(sorted.len(), 20);
    }

    #[test]
    fn test_sample_caps_at_universe_size() {
        let pool = candidates(5);
        assert_eq!(UniformSampler.sample(&pool, 50, &mut OsRng).len(), 5);
        assert_eq!(RecencyWeightedSampler.sample(&pool, 50, &mut OsRng).len(), 5);
    }

    #[test]
    fn test_synthesized_candidates_have_derived_addresses() {
        let candidate = synthesize_candidate(&mut OsRng);
        assert!(candidate.member.address.starts_with("0x"));
        assert_eq!(candidate.member.address.len(), 42);
        assert!(candidate.last_seen <= Utc::now());
    }
}
