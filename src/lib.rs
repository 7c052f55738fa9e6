//! RingVRM
//!
//! A ring-signature transaction mixer: anonymity pools with decoy ring
//! members, key-image based double-spend protection, and randomized
//! delayed settlement to defeat timing correlation.

/// Module version information
pub mod version {
    /// The current version of the RingVRM library
    pub const VERSION: &str = env!("CARGO_PKG_VERSION");
}

/// Re-export the cryptographic primitive layer
pub mod crypto {
    pub use ringvrm_crypto::*;
}

/// Re-export the pool orchestration layer
pub mod mixer {
    pub use ringvrm_mixer::*;
}
