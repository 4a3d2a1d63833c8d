//! Component definition fingerprints.
//!
//! A fingerprint is a SHA-256 digest over everything that makes up a
//! component definition. Resolved secret values never enter the digest, only
//! a separate digest of them is computed so that secret rotation can be shown
//! without exposing the values.

use sha2::{Digest, Sha256};

use super::types::Component;

/// Hasher for component definitions.
#[derive(Debug, Default)]
pub struct ComponentHasher;

impl ComponentHasher {
    /// Creates a new hasher.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Computes the definition fingerprint of a component.
    ///
    /// Two components with the same definition always share a fingerprint,
    /// whatever their secret values.
    #[must_use]
    pub fn fingerprint(&self, component: &Component) -> String {
        let mut hasher = Sha256::new();

        // Identity
        hasher.update(component.name.as_bytes());
        hasher.update([0u8]);
        hasher.update(component.namespace.as_bytes());
        hasher.update([0u8]);

        // Release
        hasher.update(component.release.chart.as_bytes());
        hasher.update([0u8]);
        hasher.update(component.release.version.as_bytes());
        hasher.update([0u8]);

        // Configuration is a BTreeMap, iteration is already sorted
        for (key, value) in component.configuration.iter() {
            hasher.update(key.as_bytes());
            hasher.update([b'=']);
            hasher.update(value.to_string().as_bytes());
            hasher.update([0u8]);
        }

        for secret in &component.secrets {
            hasher.update(secret.as_bytes());
            hasher.update([0u8]);
        }

        hex::encode(hasher.finalize())
    }

    /// Computes a digest of the resolved secret values.
    #[must_use]
    pub fn secret_digest(&self, component: &Component) -> String {
        let mut hasher = Sha256::new();

        for (name, value) in &component.secret_values {
            hasher.update(name.as_bytes());
            hasher.update((value.len() as u64).to_be_bytes());
            hasher.update(value);
        }

        hex::encode(hasher.finalize())
    }

    /// Computes a short hash (first 8 characters) for display purposes.
    #[must_use]
    pub fn short_hash(&self, hash: &str) -> String {
        hash.chars().take(8).collect()
    }
}
