pub mod graph;
pub mod curve;
pub mod search;
pub mod bundler;
pub mod error;
pub mod loader;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use bundler::{
    bundle_flows, Bundle, BundleLayout, BundleStats, Bundler, BundlerConfig, FlowOutcome,
    UnbundledFlow,
};
pub use error::ConfigurationError;
pub use graph::{BuildDiagnostics, Flow, FlowNetwork, FlowRecord, Location, Node};
pub use loader::{flows_from_batches, locations_from_batches};
pub use search::PathSearch;
