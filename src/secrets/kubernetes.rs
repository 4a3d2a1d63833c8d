//! Kubernetes secret store.
//!
//! Every component owns one Opaque `Secret` named after the component, in the
//! component's namespace. Its data holds the raw secret values.

use async_trait::async_trait;
use k8s_openapi::ByteString;
use k8s_openapi::api::core::v1::{Namespace, Secret};
use kube::api::{Api, DeleteParams, ObjectMeta, Patch, PatchParams, PostParams};
use kube::config::KubeConfigOptions;
use kube::{Client, Config};
use std::collections::BTreeMap;
use tracing::{debug, error, info};

use crate::component::SecretValues;
use crate::error::{HelmsyncError, Result, SecretError};

use super::store::{SecretsReader, SecretsWriteDeleter};

/// Field manager used for server-side apply.
const FIELD_MANAGER: &str = "helmsync";

/// Label marking secrets managed by helmsync.
const MANAGED_BY_LABEL: &str = "app.kubernetes.io/managed-by";

/// Secret store backed by Kubernetes `Secret` objects.
#[derive(Clone)]
pub struct KubeSecretStore {
    client: Client,
}

impl KubeSecretStore {
    /// Creates a store from an existing client.
    #[must_use]
    pub const fn new(client: Client) -> Self {
        Self { client }
    }

    /// Creates a store from the local kubeconfig or in-cluster environment.
    ///
    /// # Errors
    ///
    /// Returns an error if no usable Kubernetes configuration is found.
    pub async fn connect(context: Option<&str>) -> Result<Self> {
        let client = match context {
            Some(context) => {
                let options = KubeConfigOptions {
                    context: Some(context.to_string()),
                    ..KubeConfigOptions::default()
                };
                let config = Config::from_kubeconfig(&options)
                    .await
                    .map_err(|e| connect_error(&e.to_string()))?;
                Client::try_from(config).map_err(|e| connect_error(&e.to_string()))?
            }
            None => Client::try_default()
                .await
                .map_err(|e| connect_error(&e.to_string()))?,
        };

        Ok(Self::new(client))
    }

    /// Creates the namespace, treating "already exists" as success.
    async fn ensure_namespace(&self, namespace: &str) -> Result<()> {
        let namespaces: Api<Namespace> = Api::all(self.client.clone());
        let object = Namespace {
            metadata: ObjectMeta {
                name: Some(namespace.to_string()),
                ..ObjectMeta::default()
            },
            ..Namespace::default()
        };

        match namespaces.create(&PostParams::default(), &object).await {
            Ok(_) => {
                info!(namespace = %namespace, "Created namespace");
                Ok(())
            }
            Err(kube::Error::Api(api_err)) if api_err.code == 409 => Ok(()),
            Err(e) => Err(HelmsyncError::Secret(SecretError::backend(
                namespace,
                format!("Failed to ensure namespace exists: {e}"),
            ))),
        }
    }

    fn secrets(&self, namespace: &str) -> Api<Secret> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

impl std::fmt::Debug for KubeSecretStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeSecretStore").finish_non_exhaustive()
    }
}

#[async_trait]
impl SecretsReader for KubeSecretStore {
    async fn read(
        &self,
        component: &str,
        namespace: &str,
        _secret_names: &[String],
    ) -> Result<SecretValues> {
        debug!(component = %component, namespace = %namespace, "Reading secrets for component");

        let secret = match self.secrets(namespace).get(component).await {
            Ok(secret) => secret,
            Err(kube::Error::Api(api_err)) if api_err.code == 404 => {
                debug!(component = %component, namespace = %namespace, "No secrets found for component");
                return Ok(SecretValues::new());
            }
            Err(e) => {
                error!(
                    component = %component,
                    namespace = %namespace,
                    error = %e,
                    "Error when reading secrets for component"
                );
                return Err(HelmsyncError::Secret(SecretError::backend(
                    component,
                    e.to_string(),
                )));
            }
        };

        Ok(secret
            .data
            .unwrap_or_default()
            .into_iter()
            .map(|(key, value)| (key, value.0))
            .collect())
    }
}

#[async_trait]
impl SecretsWriteDeleter for KubeSecretStore {
    async fn write(&self, component: &str, namespace: &str, values: &SecretValues) -> Result<()> {
        info!(component = %component, namespace = %namespace, "Writing secrets for component");

        self.ensure_namespace(namespace).await?;

        let data: BTreeMap<String, ByteString> = values
            .iter()
            .map(|(key, value)| (key.clone(), ByteString(value.clone())))
            .collect();

        let secret = Secret {
            metadata: ObjectMeta {
                name: Some(component.to_string()),
                namespace: Some(namespace.to_string()),
                labels: Some(BTreeMap::from([(
                    String::from(MANAGED_BY_LABEL),
                    String::from(FIELD_MANAGER),
                )])),
                ..ObjectMeta::default()
            },
            type_: Some(String::from("Opaque")),
            data: Some(data),
            ..Secret::default()
        };

        // Server-side apply replaces the data this manager owns, dropping stale keys.
        self.secrets(namespace)
            .patch(
                component,
                &PatchParams::apply(FIELD_MANAGER).force(),
                &Patch::Apply(&secret),
            )
            .await
            .map_err(|e| {
                error!(
                    component = %component,
                    namespace = %namespace,
                    error = %e,
                    "Error when writing secrets for component"
                );
                HelmsyncError::Secret(SecretError::backend(component, e.to_string()))
            })?;

        info!(component = %component, namespace = %namespace, "Successfully written secrets for component");
        Ok(())
    }

    async fn delete(&self, component: &str, namespace: &str) -> Result<()> {
        info!(component = %component, namespace = %namespace, "Deleting secrets for component");

        match self
            .secrets(namespace)
            .delete(component, &DeleteParams::default())
            .await
        {
            Ok(_) => Ok(()),
            Err(kube::Error::Api(api_err)) if api_err.code == 404 => {
                info!(component = %component, namespace = %namespace, "No secrets found for component");
                Ok(())
            }
            Err(e) => {
                error!(
                    component = %component,
                    namespace = %namespace,
                    error = %e,
                    "Error when deleting secrets for component"
                );
                Err(HelmsyncError::Secret(SecretError::backend(
                    component,
                    e.to_string(),
                )))
            }
        }
    }

    fn backend_type(&self) -> &'static str {
        "kubernetes"
    }
}

fn connect_error(message: &str) -> HelmsyncError {
    HelmsyncError::Secret(SecretError::backend(
        "*",
        format!("Failed to create Kubernetes client: {message}"),
    ))
}
