//! In-memory secret store.
//!
//! Used as the secret source and store in tests and dry experiments. Every
//! operation is recorded so callers can assert on the sequence of writes and
//! deletes.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::component::SecretValues;
use crate::error::Result;

use super::store::{SecretsReader, SecretsWriteDeleter};

/// A recorded secret store operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SecretOperation {
    /// Values were written for `(component, namespace)`.
    Write {
        /// Component name.
        component: String,
        /// Namespace.
        namespace: String,
        /// Written values.
        values: SecretValues,
    },
    /// The entry of `(component, namespace)` was deleted.
    Delete {
        /// Component name.
        component: String,
        /// Namespace.
        namespace: String,
    },
}

#[derive(Debug, Default)]
struct Inner {
    entries: BTreeMap<(String, String), SecretValues>,
    operations: Vec<SecretOperation>,
}

/// Secret store kept in process memory.
#[derive(Debug, Default)]
pub struct InMemorySecretStore {
    inner: Mutex<Inner>,
}

impl InMemorySecretStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds the entry of a component.
    #[must_use]
    pub fn with_entry(self, component: &str, namespace: &str, values: SecretValues) -> Self {
        self.lock()
            .entries
            .insert((component.to_string(), namespace.to_string()), values);
        self
    }

    /// Returns the stored values of a component.
    #[must_use]
    pub fn get(&self, component: &str, namespace: &str) -> Option<SecretValues> {
        self.lock()
            .entries
            .get(&(component.to_string(), namespace.to_string()))
            .cloned()
    }

    /// Returns every operation performed so far.
    #[must_use]
    pub fn operations(&self) -> Vec<SecretOperation> {
        self.lock().operations.clone()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl SecretsReader for InMemorySecretStore {
    async fn read(
        &self,
        component: &str,
        namespace: &str,
        secret_names: &[String],
    ) -> Result<SecretValues> {
        let stored = self.get(component, namespace).unwrap_or_default();

        if secret_names.is_empty() {
            return Ok(stored);
        }

        Ok(stored
            .into_iter()
            .filter(|(key, _)| secret_names.contains(key))
            .collect())
    }
}

#[async_trait]
impl SecretsWriteDeleter for InMemorySecretStore {
    async fn write(&self, component: &str, namespace: &str, values: &SecretValues) -> Result<()> {
        let mut inner = self.lock();
        inner
            .entries
            .insert((component.to_string(), namespace.to_string()), values.clone());
        inner.operations.push(SecretOperation::Write {
            component: component.to_string(),
            namespace: namespace.to_string(),
            values: values.clone(),
        });
        Ok(())
    }

    async fn delete(&self, component: &str, namespace: &str) -> Result<()> {
        let mut inner = self.lock();
        inner
            .entries
            .remove(&(component.to_string(), namespace.to_string()));
        inner.operations.push(SecretOperation::Delete {
            component: component.to_string(),
            namespace: namespace.to_string(),
        });
        Ok(())
    }

    fn backend_type(&self) -> &'static str {
        "memory"
    }
}
