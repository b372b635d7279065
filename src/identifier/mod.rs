//! Pluggable derivation of a stable, filesystem-safe [`Fingerprint`] from a
//! URL.
//!
//! Two variants are provided: [`fast::FastIdentifier`] (XXH3-128, cheap,
//! used when collision probability over the expected corpus is acceptable)
//! and [`strong::StrongIdentifier`] (BLAKE3-256, used when cross-process
//! collision resistance matters more than raw speed).

pub mod fast;
pub mod strong;

/// A deterministic, filesystem-safe identifier derived from a URL.
pub type Fingerprint = String;

/// Duck-typed provider contract: deterministic, collision-resistant,
/// filesystem-safe.
pub trait Identifier: Send + Sync {
    fn identifier(&self, url: &str) -> Fingerprint;
}

pub use fast::FastIdentifier;
pub use strong::StrongIdentifier;
