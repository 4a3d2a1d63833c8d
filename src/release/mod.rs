//! Release backends.
//!
//! A release is one installed instance of a chart, named after its
//! component. Backends install, upgrade and uninstall releases; observers
//! list what is deployed.

mod backend;
mod helm;
mod memory;

pub use backend::{
    split_chart_label, DeleteOptions, DeployedRelease, InstallOptions, ReleaseBackend,
    ReleaseObserver, UpdateOptions,
};
#[cfg(test)]
pub use backend::MockReleaseBackend;
pub use helm::HelmCli;
pub use memory::{InMemoryReleaseBackend, ReleaseCall};
