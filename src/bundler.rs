use geo::{Coord, LineString};
use petgraph::graph::{EdgeIndex, NodeIndex};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::curve;
use crate::error::ConfigurationError;
use crate::graph::{validate_weight_exponent, FlowNetwork, FlowRecord, Location};
use crate::search::{path_length, PathSearch};

/// Configuration for the bundler
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BundlerConfig {
    /// Flow weight = distance ^ weight_exponent; larger values penalise long flows in routing
    pub weight_exponent: f64,
    /// A route is rejected when longer than this multiple of the direct distance
    pub detour_threshold: f64,
    /// Midpoint refinement levels applied to route vertices (1 = none)
    pub smoothing: u32,
    /// Number of curve samples per bundle
    pub samples: usize,
}

impl Default for BundlerConfig {
    fn default() -> Self {
        BundlerConfig {
            weight_exponent: 2.0,
            detour_threshold: 2.0,
            smoothing: 2,
            samples: 100,
        }
    }
}

impl BundlerConfig {
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        validate_weight_exponent(self.weight_exponent)?;
        if !self.detour_threshold.is_finite() || self.detour_threshold < 0.0 {
            return Err(ConfigurationError::InvalidParameter {
                name: "detour_threshold",
                value: self.detour_threshold.to_string(),
                reason: "must be finite and non-negative",
            });
        }
        if self.smoothing == 0 {
            return Err(ConfigurationError::InvalidParameter {
                name: "smoothing",
                value: self.smoothing.to_string(),
                reason: "must be at least 1",
            });
        }
        Ok(())
    }
}

/// What happened to a flow during the bundling pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FlowOutcome {
    /// Replaced by a route through other flows
    Bundled,
    /// Already claimed as a segment of an earlier bundle; drawn straight
    Absorbed,
    /// The available route was too long a detour; drawn straight
    TooLong,
    /// No alternative route existed; drawn straight
    NoPath,
}

/// A flow drawn as a curve through the segments of its route
#[derive(Debug, Clone)]
pub struct Bundle {
    pub flow: EdgeIndex,
    pub origin: String,
    pub destination: String,
    pub od_id: String,
    pub count: u64,
    /// Flows the route runs along, from origin to destination
    pub path: Vec<EdgeIndex>,
    /// Route vertices after midpoint refinement
    pub control_points: Vec<Coord<f64>>,
    /// Sampled Bézier curve, filled in after routing
    pub curve: LineString<f64>,
}

/// A flow drawn as a straight segment
#[derive(Debug, Clone)]
pub struct UnbundledFlow {
    pub flow: EdgeIndex,
    pub origin: String,
    pub destination: String,
    pub od_id: String,
    pub count: u64,
    pub line: LineString<f64>,
}

/// Counters for one bundling run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundleStats {
    pub total_flows: usize,
    pub bundled: usize,
    pub absorbed: usize,
    pub too_long: usize,
    pub no_path: usize,
    /// Flows dropped at construction for a missing endpoint
    pub edges_removed: usize,
    /// Locations dropped at construction for having no flow
    pub nodes_removed: usize,
}

/// Result of a bundling run
#[derive(Debug, Clone)]
pub struct BundleLayout {
    pub bundles: Vec<Bundle>,
    pub unbundled: Vec<UnbundledFlow>,
    /// Outcome per flow, indexed by edge index
    pub outcomes: Vec<FlowOutcome>,
    pub stats: BundleStats,
}

impl BundleLayout {
    pub fn outcome(&self, flow: EdgeIndex) -> Option<FlowOutcome> {
        self.outcomes.get(flow.index()).copied()
    }
}

/// Greedy edge-path bundler
pub struct Bundler<'a> {
    network: &'a mut FlowNetwork,
    config: BundlerConfig,
    search: PathSearch,
}

impl<'a> Bundler<'a> {
    pub fn new(network: &'a mut FlowNetwork) -> Self {
        Bundler {
            network,
            config: BundlerConfig::default(),
            search: PathSearch::new(),
        }
    }

    pub fn with_config(mut self, config: BundlerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn network(&self) -> &FlowNetwork {
        &*self.network
    }

    /// Route every flow, heaviest first, and produce the layout.
    ///
    /// Flags from a previous run are cleared first, so repeated runs agree.
    /// The configuration is validated before any flag changes.
    /// Flow weights were fixed by [`FlowNetwork::build`]; a different
    /// `weight_exponent` here is logged at debug level and otherwise unused.
    pub fn run(&mut self) -> Result<BundleLayout, ConfigurationError> {
        self.config.validate()?;
        if self.config.weight_exponent != self.network.weight_exponent() {
            tracing::debug!(
                configured = self.config.weight_exponent,
                built_with = self.network.weight_exponent(),
                "weight_exponent ignored, network weights are already computed"
            );
        }
        self.network.reset_flags();

        let flow_count = self.network.flow_count();
        let mut outcomes = Vec::with_capacity(flow_count);
        let mut bundles = Vec::new();

        let order: Vec<EdgeIndex> = self.network.flow_indices().collect();
        for edge_idx in order {
            let outcome = self.process_flow(edge_idx, &mut bundles);
            outcomes.push(outcome);
        }

        // Routing is done and control points are fixed; sampling is independent per bundle
        let samples = self.config.samples;
        bundles.par_iter_mut().for_each(|bundle: &mut Bundle| {
            bundle.curve = curve::sample_line(&bundle.control_points, samples);
        });

        let unbundled = self.collect_unbundled();
        let diagnostics = self.network.diagnostics();
        let count = |wanted: FlowOutcome| outcomes.iter().filter(|&&o| o == wanted).count();
        let stats = BundleStats {
            total_flows: flow_count,
            bundled: count(FlowOutcome::Bundled),
            absorbed: count(FlowOutcome::Absorbed),
            too_long: count(FlowOutcome::TooLong),
            no_path: count(FlowOutcome::NoPath),
            edges_removed: diagnostics.edges_removed,
            nodes_removed: diagnostics.nodes_removed,
        };

        tracing::info!(
            total = stats.total_flows,
            bundled = stats.bundled,
            absorbed = stats.absorbed,
            too_long = stats.too_long,
            no_path = stats.no_path,
            "bundling finished"
        );

        Ok(BundleLayout {
            bundles,
            unbundled,
            outcomes,
            stats,
        })
    }

    fn process_flow(&mut self, edge_idx: EdgeIndex, bundles: &mut Vec<Bundle>) -> FlowOutcome {
        let Some((source, dest)) = self.network.endpoints(edge_idx) else {
            return FlowOutcome::NoPath;
        };
        let Some(flow) = self.network.flow_mut(edge_idx) else {
            return FlowOutcome::NoPath;
        };
        if flow.locked {
            return FlowOutcome::Absorbed;
        }
        // Keep the flow itself out of its own route
        flow.skip = true;

        let path = self.search.shortest_path(self.network, source, dest);
        if path.is_empty() {
            tracing::debug!(flow = edge_idx.index(), "no alternative path");
            self.restore(edge_idx);
            return FlowOutcome::NoPath;
        }

        let direct = self.network.graph[source].distance_to(&self.network.graph[dest]);
        let routed = path_length(self.network, &path);
        if routed > self.config.detour_threshold * direct {
            tracing::debug!(
                flow = edge_idx.index(),
                direct,
                routed,
                "detour too long"
            );
            self.restore(edge_idx);
            return FlowOutcome::TooLong;
        }

        for &segment in &path {
            if let Some(segment_flow) = self.network.flow_mut(segment) {
                segment_flow.locked = true;
            }
        }

        let vertices = self.route_vertices(source, dest, &path);
        let control_points = curve::refine(&vertices, self.config.smoothing);
        bundles.push(self.bundle_for(edge_idx, source, dest, path, control_points));
        tracing::debug!(flow = edge_idx.index(), "bundled");

        FlowOutcome::Bundled
    }

    fn restore(&mut self, edge_idx: EdgeIndex) {
        if let Some(flow) = self.network.flow_mut(edge_idx) {
            flow.skip = false;
        }
    }

    /// Node coordinates along a path, starting at `source` and ending at `dest`
    fn route_vertices(
        &self,
        source: NodeIndex,
        dest: NodeIndex,
        path: &[EdgeIndex],
    ) -> Vec<Coord<f64>> {
        let graph = &self.network.graph;
        let mut vertices = Vec::with_capacity(path.len() + 1);
        let mut current = source;
        for &segment in path {
            vertices.push(graph[current].coord.0);
            if let Some(next) = self.network.opposite(segment, current) {
                current = next;
            }
        }
        vertices.push(graph[dest].coord.0);
        vertices
    }

    fn bundle_for(
        &self,
        edge_idx: EdgeIndex,
        source: NodeIndex,
        dest: NodeIndex,
        path: Vec<EdgeIndex>,
        control_points: Vec<Coord<f64>>,
    ) -> Bundle {
        let graph = &self.network.graph;
        let flow = &graph[edge_idx];
        Bundle {
            flow: edge_idx,
            origin: graph[source].name.clone(),
            destination: graph[dest].name.clone(),
            od_id: flow.od_id.clone(),
            count: flow.count,
            path,
            control_points,
            curve: LineString::new(Vec::new()),
        }
    }

    /// Flows still part of the substrate are drawn as straight lines
    fn collect_unbundled(&self) -> Vec<UnbundledFlow> {
        let graph = &self.network.graph;
        self.network
            .flow_indices()
            .filter(|&idx| !graph[idx].skip)
            .filter_map(|idx| {
                let (source, dest) = self.network.endpoints(idx)?;
                let flow = &graph[idx];
                Some(UnbundledFlow {
                    flow: idx,
                    origin: graph[source].name.clone(),
                    destination: graph[dest].name.clone(),
                    od_id: flow.od_id.clone(),
                    count: flow.count,
                    line: self.network.straight_line(idx)?,
                })
            })
            .collect()
    }
}

/// Build the network and run the bundler in one call
pub fn bundle_flows(
    locations: &[Location],
    flows: &[FlowRecord],
    config: &BundlerConfig,
) -> Result<BundleLayout, ConfigurationError> {
    config.validate()?;
    let mut network = FlowNetwork::build(locations, flows, config.weight_exponent)?;
    Bundler::new(&mut network)
        .with_config(config.clone())
        .run()
}
