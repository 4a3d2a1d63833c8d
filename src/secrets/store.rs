//! Secret store trait definitions.
//!
//! This module defines the capabilities the reconciliation engine needs from a
//! secret backend: reading resolved values, and writing or deleting the entry
//! that belongs to a component.

use async_trait::async_trait;

use crate::component::SecretValues;
use crate::error::Result;

/// Reads secret values for a component.
#[async_trait]
pub trait SecretsReader: Send + Sync {
    /// Reads the secrets of a component.
    ///
    /// Returns an empty map when nothing is stored for the component.
    /// Backends that store a single object per component may ignore
    /// `secret_names` and return every stored value.
    async fn read(
        &self,
        component: &str,
        namespace: &str,
        secret_names: &[String],
    ) -> Result<SecretValues>;
}

/// Writes and deletes the secret entry of a component.
#[async_trait]
pub trait SecretsWriteDeleter: Send + Sync {
    /// Writes the secret values of a component, replacing any previous entry.
    ///
    /// The backing namespace or container is created when missing.
    async fn write(&self, component: &str, namespace: &str, values: &SecretValues) -> Result<()>;

    /// Deletes the secret entry of a component.
    ///
    /// Deleting an entry that does not exist succeeds.
    async fn delete(&self, component: &str, namespace: &str) -> Result<()>;

    /// Gets the backend type name.
    fn backend_type(&self) -> &'static str;
}

/// A secret backend that can read, write and delete.
pub trait SecretsReadWriteDeleter: SecretsReader + SecretsWriteDeleter {}

impl<T: SecretsReader + SecretsWriteDeleter> SecretsReadWriteDeleter for T {}
