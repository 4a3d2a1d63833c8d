//! Component model.
//!
//! This module defines the deployable unit reconciled by helmsync and the
//! helpers used to compare and fingerprint component definitions.

mod fingerprint;
mod types;

pub use fingerprint::ComponentHasher;
pub use types::{
    Component, Components, Configuration, Metadata, Release, SecretValues, Secrets, METADATA_KEY,
};
