//! Secret storage for helmsync.
//!
//! Components may require secret material that must never be persisted with
//! the rest of their configuration. This module provides the reader and
//! writer/deleter capabilities the engine consumes, plus their adapters:
//! Kubernetes secrets, local files, the process environment and memory.

mod env;
mod kubernetes;
mod local;
mod memory;
mod store;

pub use env::EnvironmentSecretsReader;
pub use kubernetes::KubeSecretStore;
pub use local::LocalSecretStore;
pub use memory::{InMemorySecretStore, SecretOperation};
pub use store::{SecretsReadWriteDeleter, SecretsReader, SecretsWriteDeleter};
