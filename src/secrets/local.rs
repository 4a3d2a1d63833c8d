//! Local file-based secret store.
//!
//! This backend keeps one JSON file per component under
//! `<base_dir>/<namespace>/<component>.json`, with values hex encoded. It is
//! meant for local development and for clusters where secrets are synced by
//! other means.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use crate::component::SecretValues;
use crate::error::{HelmsyncError, Result, SecretError};

use super::store::{SecretsReader, SecretsWriteDeleter};

/// Default secrets directory name.
const SECRETS_DIR: &str = ".helmsync/secrets";

/// On-disk representation of a component's secrets.
#[derive(Debug, Default, Serialize, Deserialize)]
struct SecretFile {
    /// Component name.
    component: String,
    /// Hex-encoded values by secret name.
    data: BTreeMap<String, String>,
}

/// Local file-based secret store.
#[derive(Debug)]
pub struct LocalSecretStore {
    /// Base directory for secret files.
    base_dir: PathBuf,
}

impl LocalSecretStore {
    /// Creates a new local secret store under the current directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the current directory cannot be determined.
    pub fn new() -> Result<Self> {
        let base_dir = std::env::current_dir()
            .map_err(|e| HelmsyncError::internal(format!("Cannot determine current directory: {e}")))?
            .join(SECRETS_DIR);

        Ok(Self::with_base_dir(base_dir))
    }

    /// Creates a new local secret store with a custom base directory.
    #[must_use]
    pub fn with_base_dir(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    /// Returns the directory of a namespace.
    fn namespace_dir(&self, namespace: &str) -> PathBuf {
        self.base_dir.join(namespace)
    }

    /// Returns the file holding a component's secrets.
    fn secret_path(&self, component: &str, namespace: &str) -> PathBuf {
        self.namespace_dir(namespace).join(format!("{component}.json"))
    }

    /// Ensures the namespace directory exists.
    async fn ensure_namespace(&self, component: &str, namespace: &str) -> Result<()> {
        let dir = self.namespace_dir(namespace);
        if !dir.exists() {
            debug!("Creating secrets directory: {}", dir.display());
            fs::create_dir_all(&dir)
                .await
                .map_err(|e| backend_error(component, "create secrets directory", &e))?;
        }
        Ok(())
    }

    /// Writes a file atomically with owner-only permissions.
    async fn write_file(component: &str, path: &Path, content: &str) -> Result<()> {
        // Write to a temporary file first, then rename for atomicity
        let temp_path = path.with_extension("tmp");

        let mut file = fs::File::create(&temp_path)
            .await
            .map_err(|e| backend_error(component, "create temp secret file", &e))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&temp_path, std::fs::Permissions::from_mode(0o600))
                .await
                .map_err(|e| backend_error(component, "restrict secret file permissions", &e))?;
        }

        file.write_all(content.as_bytes())
            .await
            .map_err(|e| backend_error(component, "write secret file", &e))?;

        file.sync_all()
            .await
            .map_err(|e| backend_error(component, "sync secret file", &e))?;

        fs::rename(&temp_path, path)
            .await
            .map_err(|e| backend_error(component, "rename secret file", &e))?;

        Ok(())
    }
}

#[async_trait]
impl SecretsReader for LocalSecretStore {
    async fn read(
        &self,
        component: &str,
        namespace: &str,
        _secret_names: &[String],
    ) -> Result<SecretValues> {
        let path = self.secret_path(component, namespace);
        if !path.exists() {
            debug!(component = %component, namespace = %namespace, "No secrets found for component");
            return Ok(SecretValues::new());
        }

        let content = fs::read_to_string(&path)
            .await
            .map_err(|e| backend_error(component, "read secret file", &e))?;

        let file: SecretFile = serde_json::from_str(&content).map_err(|e| {
            HelmsyncError::Secret(SecretError::backend(
                component,
                format!("Failed to parse secret file {}: {e}", path.display()),
            ))
        })?;

        file.data
            .into_iter()
            .map(|(key, value)| {
                hex::decode(&value)
                    .map(|bytes| (key.clone(), bytes))
                    .map_err(|e| {
                        HelmsyncError::Secret(SecretError::backend(
                            component,
                            format!("Secret '{key}' is not valid hex: {e}"),
                        ))
                    })
            })
            .collect()
    }
}

#[async_trait]
impl SecretsWriteDeleter for LocalSecretStore {
    async fn write(&self, component: &str, namespace: &str, values: &SecretValues) -> Result<()> {
        info!(component = %component, namespace = %namespace, "Writing secrets for component");

        self.ensure_namespace(component, namespace).await?;

        let file = SecretFile {
            component: component.to_string(),
            data: values
                .iter()
                .map(|(key, value)| (key.clone(), hex::encode(value)))
                .collect(),
        };

        let content = serde_json::to_string_pretty(&file).map_err(|e| {
            HelmsyncError::Secret(SecretError::backend(
                component,
                format!("Failed to serialize secrets: {e}"),
            ))
        })?;

        Self::write_file(component, &self.secret_path(component, namespace), &content).await?;

        debug!(component = %component, namespace = %namespace, "Secrets saved successfully");
        Ok(())
    }

    async fn delete(&self, component: &str, namespace: &str) -> Result<()> {
        let path = self.secret_path(component, namespace);
        if !path.exists() {
            info!(component = %component, namespace = %namespace, "No secrets found for component");
            return Ok(());
        }

        info!(component = %component, namespace = %namespace, "Deleting secrets for component");
        fs::remove_file(&path)
            .await
            .map_err(|e| backend_error(component, "delete secret file", &e))?;

        Ok(())
    }

    fn backend_type(&self) -> &'static str {
        "local"
    }
}

fn backend_error(component: &str, action: &str, err: &std::io::Error) -> HelmsyncError {
    HelmsyncError::Secret(SecretError::backend(
        component,
        format!("Failed to {action}: {err}"),
    ))
}
