//! Test utilities for building flow networks programmatically.
//!
//! # Example
//!
//! ```rust
//! use edge_path_bundler::test_utils::TestFlowBuilder;
//!
//! let network = TestFlowBuilder::new()
//!     .add_location("A", 0.0, 0.0)
//!     .add_location("B", 10.0, 0.0)
//!     .add_flow("A", "B", 3)
//!     .build(2.0);
//!
//! assert_eq!(network.node_count(), 2);
//! assert_eq!(network.flow_count(), 1);
//! ```

use petgraph::graph::EdgeIndex;

use crate::graph::{FlowNetwork, FlowRecord, Location};

/// A builder for small location/flow inputs.
pub struct TestFlowBuilder {
    locations: Vec<Location>,
    flows: Vec<FlowRecord>,
}

impl TestFlowBuilder {
    pub fn new() -> Self {
        TestFlowBuilder {
            locations: Vec::new(),
            flows: Vec::new(),
        }
    }

    /// Add a location at planar coordinates `(x, y)`.
    ///
    /// # Panics
    /// Panics if a location with the same key already exists.
    pub fn add_location(mut self, key: &str, x: f64, y: f64) -> Self {
        if self.locations.iter().any(|l| l.key == key) {
            panic!("Location {} already exists", key);
        }
        self.locations.push(Location::new(key, x, y));
        self
    }

    /// Add a flow with the generated `"{origin}_{destination}"` identifier.
    ///
    /// Endpoints are not checked, so flows to unknown keys can be added on purpose.
    pub fn add_flow(mut self, origin: &str, destination: &str, count: u64) -> Self {
        self.flows.push(FlowRecord::new(origin, destination, count));
        self
    }

    pub fn add_flow_with_od_id(
        mut self,
        origin: &str,
        destination: &str,
        od_id: &str,
        count: u64,
    ) -> Self {
        self.flows
            .push(FlowRecord::new(origin, destination, count).with_od_id(od_id));
        self
    }

    /// The raw inputs, for calling [`crate::bundle_flows`] directly.
    pub fn records(&self) -> (Vec<Location>, Vec<FlowRecord>) {
        (self.locations.clone(), self.flows.clone())
    }

    /// Build the network.
    ///
    /// # Panics
    /// Panics if construction fails (e.g. no locations or no flows).
    pub fn build(self, weight_exponent: f64) -> FlowNetwork {
        FlowNetwork::build(&self.locations, &self.flows, weight_exponent)
            .unwrap_or_else(|e| panic!("Failed to build test network: {}", e))
    }
}

impl Default for TestFlowBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Look up a flow by its OD identifier
pub fn find_flow(network: &FlowNetwork, od_id: &str) -> Option<EdgeIndex> {
    network
        .flow_indices()
        .find(|&idx| network.flow(idx).is_some_and(|f| f.od_id == od_id))
}
