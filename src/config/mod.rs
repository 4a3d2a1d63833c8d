//! Configuration module for helmsync.
//!
//! This module handles all configuration-related functionality:
//! - Parsing `helmsync.yaml` and the component declaration files
//! - Validation of settings and declarations
//! - Converting declarations into components

mod parser;
mod spec;
mod validator;

pub use parser::{ConfigParser, DEFAULT_CONFIG_FILES, find_config_file};
pub use spec::{
    ApplyConfig, ComponentDeclaration, ForcedUpdateConfig, HelmConfig, ReleaseDeclaration,
    SecretStoreKind, SecretsConfig, Settings, into_components,
};
pub use validator::{ConfigValidator, ValidationError, ValidationResult};
