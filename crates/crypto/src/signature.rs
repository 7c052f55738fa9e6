//! bLSAG ring signatures over the Ristretto group.
//!
//! Implements Back's linkable spontaneous anonymous group signature scheme
//! (Zero to Monero, ch. 3). A signature proves that one of the ring's public
//! keys signed the message without revealing which one; the key image
//! `I = x * Hp(x * G)` depends only on the secret key, so a second spend of
//! the same key produces the same image and can be rejected.

use curve25519_dalek::constants::RISTRETTO_BASEPOINT_POINT;
use curve25519_dalek::ristretto::{CompressedRistretto, RistrettoPoint};
use curve25519_dalek::scalar::Scalar;
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha512};

use crate::error::{CryptoError, Result};
use crate::RingMember;

const HASH_TO_POINT_DOMAIN: &[u8] = b"ringvrm.hash_to_point.v1";
const CHALLENGE_DOMAIN: &[u8] = b"ringvrm.challenge.v1";

/// A 32-byte secret scalar seed.
#[derive(Clone)]
pub struct SecretKey([u8; 32]);

impl SecretKey {
    /// Create a secret key from raw bytes
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Generate a fresh random secret key
    pub fn generate() -> Self {
        let mut bytes = [0u8; 32];
        OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    pub(crate) fn scalar(&self) -> Scalar {
        Scalar::from_bytes_mod_order(self.0)
    }

    /// The hex-encoded compressed public key for this secret
    pub fn public_key(&self) -> String {
        let point = RISTRETTO_BASEPOINT_POINT * self.scalar();
        hex::encode(point.compress().to_bytes())
    }
}

impl std::fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never print key material
        write!(f, "SecretKey(..)")
    }
}

/// A linkable ring signature over a ring of public keys.
///
/// All group elements are hex-encoded compressed Ristretto points or
/// canonical scalars so the structure serializes cleanly as JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RingSignature {
    /// Hex-encoded public keys of every ring member, real signer included
    pub ring_members: Vec<String>,

    /// Hex-encoded key image, deterministic per secret key
    pub key_image: String,

    /// Hex-encoded seed challenge for the verification walk
    pub c0: String,

    /// Hex-encoded response scalar per ring member
    pub responses: Vec<String>,
}

fn hash_to_point(data: &[u8]) -> RistrettoPoint {
    let mut hasher = Sha512::new();
    hasher.update(HASH_TO_POINT_DOMAIN);
    hasher.update(data);
    let wide: [u8; 64] = hasher.finalize().into();
    RistrettoPoint::from_uniform_bytes(&wide)
}

fn challenge(message: &[u8], l: &RistrettoPoint, r: &RistrettoPoint) -> Scalar {
    let mut hasher = Sha512::new();
    hasher.update(CHALLENGE_DOMAIN);
    hasher.update(message);
    hasher.update(l.compress().to_bytes());
    hasher.update(r.compress().to_bytes());
    let wide: [u8; 64] = hasher.finalize().into();
    Scalar::from_bytes_mod_order_wide(&wide)
}

fn random_scalar(rng: &mut OsRng) -> Scalar {
    let mut wide = [0u8; 64];
    rng.fill_bytes(&mut wide);
    Scalar::from_bytes_mod_order_wide(&wide)
}

pub(crate) fn parse_point(hex_str: &str) -> Result<RistrettoPoint> {
    let bytes: [u8; 32] = hex::decode(hex_str)
        .map_err(|e| CryptoError::MalformedSignature(format!("bad point encoding: {}", e)))?
        .try_into()
        .map_err(|_| CryptoError::MalformedSignature("point is not 32 bytes".to_string()))?;

    CompressedRistretto(bytes)
        .decompress()
        .ok_or_else(|| CryptoError::MalformedSignature("point not on curve".to_string()))
}

fn parse_scalar(hex_str: &str) -> Result<Scalar> {
    let bytes: [u8; 32] = hex::decode(hex_str)
        .map_err(|e| CryptoError::MalformedSignature(format!("bad scalar encoding: {}", e)))?
        .try_into()
        .map_err(|_| CryptoError::MalformedSignature("scalar is not 32 bytes".to_string()))?;

    Option::<Scalar>::from(Scalar::from_canonical_bytes(bytes))
        .ok_or_else(|| CryptoError::MalformedSignature("non-canonical scalar".to_string()))
}

/// Compute the key image `x * Hp(x * G)` for a secret key.
///
/// The image is independent of any ring, so repeated signatures with the
/// same secret always carry the same image.
pub fn key_image(secret: &SecretKey) -> String {
    let x = secret.scalar();
    let public = RISTRETTO_BASEPOINT_POINT * x;
    let image = hash_to_point(&public.compress().to_bytes()) * x;
    hex::encode(image.compress().to_bytes())
}

/// Sign `message` with `secret` hidden among `ring_members`.
///
/// The member at `signer_index` must carry the public key matching `secret`.
pub fn sign(
    message: &[u8],
    secret: &SecretKey,
    ring_members: &[RingMember],
    signer_index: usize,
) -> Result<RingSignature> {
    let n = ring_members.len();
    if n < 2 {
        return Err(CryptoError::InvalidRingSize { got: n, min: 2 });
    }
    if signer_index >= n {
        return Err(CryptoError::InvalidSignerIndex {
            index: signer_index,
            len: n,
        });
    }

    let ring: Vec<RistrettoPoint> = ring_members
        .iter()
        .map(|m| parse_point(&m.public_key))
        .collect::<Result<Vec<_>>>()?;

    let x = secret.scalar();
    let signer_point = RISTRETTO_BASEPOINT_POINT * x;
    if ring[signer_index] != signer_point {
        return Err(CryptoError::MalformedSignature(
            "secret key does not match ring member at signer index".to_string(),
        ));
    }

    let image = hash_to_point(&signer_point.compress().to_bytes()) * x;

    let mut rng = OsRng;
    let alpha = random_scalar(&mut rng);
    let mut c = vec![Scalar::ZERO; n];
    let mut r: Vec<Scalar> = (0..n).map(|_| random_scalar(&mut rng)).collect();

    let hp_signer = hash_to_point(&ring[signer_index].compress().to_bytes());
    c[(signer_index + 1) % n] = challenge(
        message,
        &(RISTRETTO_BASEPOINT_POINT * alpha),
        &(hp_signer * alpha),
    );

    // Walk the ring from the signer's successor back around to the signer,
    // committing a random response at every decoy position.
    let mut i = (signer_index + 1) % n;
    while i != signer_index {
        let next = (i + 1) % n;
        let hp_i = hash_to_point(&ring[i].compress().to_bytes());
        let l = RISTRETTO_BASEPOINT_POINT * r[i] + ring[i] * c[i];
        let rr = hp_i * r[i] + image * c[i];
        c[next] = challenge(message, &l, &rr);
        i = next;
    }

    // Close the ring at the real signer.
    r[signer_index] = alpha - c[signer_index] * x;

    Ok(RingSignature {
        ring_members: ring
            .iter()
            .map(|p| hex::encode(p.compress().to_bytes()))
            .collect(),
        key_image: hex::encode(image.compress().to_bytes()),
        c0: hex::encode(c[0].to_bytes()),
        responses: r.iter().map(|s| hex::encode(s.to_bytes())).collect(),
    })
}

/// Verify a ring signature against `message`.
///
/// Returns `Ok(false)` for a well-formed signature that fails the challenge
/// walk; decoding problems surface as `MalformedSignature`.
pub fn verify(message: &[u8], signature: &RingSignature) -> Result<bool> {
    let (ring, image, c0, responses) = decode(signature)?;
    let n = ring.len();

    let mut ci = c0;
    for i in 0..n {
        let hp_i = hash_to_point(&ring[i].compress().to_bytes());
        let l = RISTRETTO_BASEPOINT_POINT * responses[i] + ring[i] * ci;
        let rr = hp_i * responses[i] + image * ci;
        ci = challenge(message, &l, &rr);
    }

    Ok(ci == c0)
}

/// Decode and shape-check a signature without verifying the challenge walk.
pub fn validate_structure(signature: &RingSignature) -> Result<()> {
    decode(signature).map(|_| ())
}

fn decode(
    signature: &RingSignature,
) -> Result<(Vec<RistrettoPoint>, RistrettoPoint, Scalar, Vec<Scalar>)> {
    let n = signature.ring_members.len();
    if n < 2 {
        return Err(CryptoError::InvalidRingSize { got: n, min: 2 });
    }
    if signature.responses.len() != n {
        return Err(CryptoError::MalformedSignature(format!(
            "{} responses for {} ring members",
            signature.responses.len(),
            n
        )));
    }

    let ring = signature
        .ring_members
        .iter()
        .map(|m| parse_point(m))
        .collect::<Result<Vec<_>>>()?;
    let image = parse_point(&signature.key_image)?;
    let c0 = parse_scalar(&signature.c0)?;
    let responses = signature
        .responses
        .iter()
        .map(|s| parse_scalar(s))
        .collect::<Result<Vec<_>>>()?;

    Ok((ring, image, c0, responses))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build_ring(size: usize, signer_index: usize) -> (SecretKey, Vec<RingMember>) {
        let secret = SecretKey::generate();
        let mut members: Vec<RingMember> = (0..size)
            .map(|i| RingMember {
                address: format!("0xdecoy{}", i),
                public_key: SecretKey::generate().public_key(),
                index: i,
            })
            .collect();
        members[signer_index].public_key = secret.public_key();
        members[signer_index].address = "0xsigner".to_string();
        (secret, members)
    }

    #[test]
    fn test_sign_and_verify() {
        let (secret, members) = build_ring(8, 3);
        let signature = sign(b"mix 1.5 ETH", &secret, &members, 3).unwrap();

        assert_eq!(signature.ring_members.len(), 8);
        assert_eq!(signature.responses.len(), 8);
        assert!(verify(b"mix 1.5 ETH", &signature).unwrap());
    }

    #[test]
    fn test_verify_rejects_wrong_message() {
        let (secret, members) = build_ring(8, 0);
        let signature = sign(b"mix 1.5 ETH", &secret, &members, 0).unwrap();

        assert!(!verify(b"mix 2.0 ETH", &signature).unwrap());
    }

    #[test]
    fn test_verify_rejects_tampered_response() {
        let (secret, members) = build_ring(8, 5);
        let mut signature = sign(b"payload", &secret, &members, 5).unwrap();

        signature.responses[2] = hex::encode(Scalar::ZERO.to_bytes());
        assert!(!verify(b"payload", &signature).unwrap());
    }

    #[test]
    fn test_key_image_is_deterministic_across_rings() {
        let secret = SecretKey::generate();
        let (_, mut ring_a) = build_ring(8, 2);
        ring_a[2].public_key = secret.public_key();
        let (_, mut ring_b) = build_ring(12, 7);
        ring_b[7].public_key = secret.public_key();

        let sig_a = sign(b"first spend", &secret, &ring_a, 2).unwrap();
        let sig_b = sign(b"second spend", &secret, &ring_b, 7).unwrap();

        assert_eq!(sig_a.key_image, sig_b.key_image);
        assert_eq!(sig_a.key_image, key_image(&secret));
    }

    #[test]
    fn test_sign_rejects_tiny_ring() {
        let (secret, members) = build_ring(8, 0);
        let err = sign(b"m", &secret, &members[..1], 0).unwrap_err();
        assert!(matches!(err, CryptoError::InvalidRingSize { got: 1, .. }));
    }

    #[test]
    fn test_sign_rejects_out_of_range_signer() {
        let (secret, members) = build_ring(8, 0);
        let err = sign(b"m", &secret, &members, 8).unwrap_err();
        assert!(matches!(
            err,
            CryptoError::InvalidSignerIndex { index: 8, len: 8 }
        ));
    }

    #[test]
    fn test_sign_rejects_mismatched_signer_key() {
        let (secret, members) = build_ring(8, 1);
        // Point at a position that does not hold the signer's public key.
        let err = sign(b"m", &secret, &members, 4).unwrap_err();
        assert!(matches!(err, CryptoError::MalformedSignature(_)));
    }

    #[test]
    fn test_validate_structure_catches_bad_encoding() {
        let (secret, members) = build_ring(8, 0);
        let mut signature = sign(b"m", &secret, &members, 0).unwrap();
        signature.key_image = "not-hex".to_string();

        assert!(matches!(
            validate_structure(&signature),
            Err(CryptoError::MalformedSignature(_))
        ));
    }

    #[test]
    fn test_signature_serializes_as_json() {
        let (secret, members) = build_ring(4, 1);
        let signature = sign(b"m", &secret, &members, 1).unwrap();

        let encoded = serde_json::to_string(&signature).unwrap();
        let decoded: RingSignature = serde_json::from_str(&encoded).unwrap();
        assert!(verify(b"m", &decoded).unwrap());
    }
}
