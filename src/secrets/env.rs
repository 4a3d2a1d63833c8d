//! Environment variable secret source.
//!
//! Desired secret values are usually injected into the process environment
//! (directly or through a `.env` file). A secret named `hdfs-password` is read
//! from `HDFS_PASSWORD`.

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::component::SecretValues;
use crate::error::Result;

use super::store::SecretsReader;

/// Lookup function used to resolve an environment variable.
type Lookup = Box<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// Reads secrets from environment variables.
///
/// The component name and namespace are ignored.
pub struct EnvironmentSecretsReader {
    lookup: Lookup,
}

impl EnvironmentSecretsReader {
    /// Creates a reader over the process environment.
    #[must_use]
    pub fn new() -> Self {
        Self::with_lookup(|name| std::env::var(name).ok())
    }

    /// Creates a reader over a custom lookup function.
    #[must_use]
    pub fn with_lookup(lookup: impl Fn(&str) -> Option<String> + Send + Sync + 'static) -> Self {
        Self {
            lookup: Box::new(lookup),
        }
    }

    /// Returns the environment variable a secret is read from.
    #[must_use]
    pub fn env_name(secret_name: &str) -> String {
        secret_name.to_uppercase().replace('-', "_")
    }
}

impl Default for EnvironmentSecretsReader {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EnvironmentSecretsReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EnvironmentSecretsReader").finish_non_exhaustive()
    }
}

#[async_trait]
impl SecretsReader for EnvironmentSecretsReader {
    async fn read(
        &self,
        component: &str,
        _namespace: &str,
        secret_names: &[String],
    ) -> Result<SecretValues> {
        let mut values = SecretValues::new();

        for name in secret_names {
            let env_name = Self::env_name(name);
            let value = (self.lookup)(&env_name).unwrap_or_default();

            if value.is_empty() {
                warn!(
                    component = %component,
                    secret = %name,
                    env_name = %env_name,
                    "Secret not found in environment"
                );
            } else {
                debug!(component = %component, secret = %name, "Resolved secret from environment");
            }

            values.insert(name.clone(), value.into_bytes());
        }

        Ok(values)
    }
}
