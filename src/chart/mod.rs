//! Chart loading.
//!
//! Components reference their chart symbolically as
//! `<repository>/<chart>:<version>`. A loader turns that reference into a
//! parsed chart (used to inspect templates) and a local path (handed to the
//! release backend).

mod loader;
mod local;
mod memory;

pub use loader::{Chart, ChartLoader, ChartMetadata, ChartReference, LoadedChart, Template};
#[cfg(test)]
pub use loader::MockChartLoader;
pub use local::LocalChartLoader;
pub use memory::StaticChartLoader;
