//! Error types for the ring signature layer.

use thiserror::Error;

/// Errors that can occur while building or checking ring signatures
#[derive(Error, Debug)]
pub enum CryptoError {
    /// Ring has fewer members than the configured minimum
    #[error("Invalid ring size: got {got} members, minimum is {min}")]
    InvalidRingSize { got: usize, min: usize },

    /// Signer index does not point into the ring
    #[error("Invalid signer index: {index} out of {len} ring members")]
    InvalidSignerIndex { index: usize, len: usize },

    /// Signature data could not be decoded or has inconsistent shape
    #[error("Malformed signature: {0}")]
    MalformedSignature(String),

    /// The decoy universe cannot cover the requested selection
    #[error("Insufficient decoys: wanted {wanted}, available {available}")]
    InsufficientDecoys { wanted: usize, available: usize },
}

pub type Result<T> = std::result::Result<T, CryptoError>;
