use ahash::AHashMap;
use geo::{EuclideanDistance, LineString, Point};
use petgraph::graph::{EdgeIndex, NodeIndex, UnGraph};
use serde::{Deserialize, Serialize};

use crate::error::ConfigurationError;

/// A named location as handed over by the caller (e.g. a region centroid)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub key: String,
    pub coord: Point<f64>,
}

impl Location {
    pub fn new(key: impl Into<String>, x: f64, y: f64) -> Self {
        Location {
            key: key.into(),
            coord: Point::new(x, y),
        }
    }
}

/// One origin-destination record with its intensity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowRecord {
    pub origin: String,
    pub destination: String,
    pub od_id: String,
    pub count: u64,
}

impl FlowRecord {
    /// Create a record whose OD identifier is `"{origin}_{destination}"`.
    pub fn new(origin: impl Into<String>, destination: impl Into<String>, count: u64) -> Self {
        let origin = origin.into();
        let destination = destination.into();
        let od_id = format!("{}_{}", origin, destination);
        FlowRecord {
            origin,
            destination,
            od_id,
            count,
        }
    }

    pub fn with_od_id(mut self, od_id: impl Into<String>) -> Self {
        self.od_id = od_id.into();
        self
    }
}

/// A location in the routing graph
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    /// Stable ID, assigned from 1 in first-seen order of the location keys
    pub id: u32,
    pub name: String,
    pub coord: Point<f64>,
}

impl Node {
    /// Planar (Euclidean) distance, not geodesic
    pub fn distance_to(&self, other: &Node) -> f64 {
        self.coord.euclidean_distance(&other.coord)
    }
}

/// A flow between two nodes, doubling as a routing edge for other flows
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Flow {
    pub od_id: String,
    pub count: u64,
    pub distance: f64,
    /// distance ^ weight exponent
    pub weight: f64,
    /// Claimed as a segment of an accepted bundle
    pub locked: bool,
    /// Excluded from the routing substrate
    pub skip: bool,
}

/// Counts reported by network construction
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildDiagnostics {
    /// Flows dropped because an endpoint key is not a known location
    pub edges_removed: usize,
    /// Locations dropped because no flow touches them
    pub nodes_removed: usize,
}

/// Flow ready to insert into the graph, endpoints resolved to node IDs.
struct PendingFlow {
    source: u32,
    destination: u32,
    flow: Flow,
}

/// The flow graph used both as the set of flows to bundle and as the routing substrate.
///
/// Edge indices follow processing order: descending weight, ties kept in input order.
pub struct FlowNetwork {
    pub graph: UnGraph<Node, Flow>,
    incident: Vec<Vec<EdgeIndex>>,
    diagnostics: BuildDiagnostics,
    weight_exponent: f64,
}

/// Weights must stay finite and non-negative for the path search
pub fn validate_weight_exponent(weight_exponent: f64) -> Result<(), ConfigurationError> {
    if !weight_exponent.is_finite() || weight_exponent < 0.0 {
        return Err(ConfigurationError::InvalidParameter {
            name: "weight_exponent",
            value: weight_exponent.to_string(),
            reason: "must be finite and non-negative",
        });
    }
    Ok(())
}

impl FlowNetwork {
    /// Build the network from locations and flow records.
    ///
    /// Flows referencing an unknown key are dropped, and locations left
    /// without any flow are removed. Both counts end up in [`BuildDiagnostics`].
    pub fn build(
        locations: &[Location],
        flows: &[FlowRecord],
        weight_exponent: f64,
    ) -> Result<Self, ConfigurationError> {
        validate_weight_exponent(weight_exponent)?;
        if locations.is_empty() {
            return Err(ConfigurationError::EmptyLocations);
        }
        if flows.is_empty() {
            return Err(ConfigurationError::EmptyFlows);
        }

        let mut key_to_id: AHashMap<&str, u32> = AHashMap::with_capacity(locations.len());
        let mut nodes: Vec<Node> = Vec::with_capacity(locations.len());

        for (index, location) in locations.iter().enumerate() {
            if location.key.is_empty() {
                return Err(ConfigurationError::EmptyField { field: "key", index });
            }
            if key_to_id.contains_key(location.key.as_str()) {
                tracing::warn!(key = %location.key, "duplicate location key, keeping first coordinate");
                continue;
            }
            let id = nodes.len() as u32 + 1;
            key_to_id.insert(location.key.as_str(), id);
            nodes.push(Node {
                id,
                name: location.key.clone(),
                coord: location.coord,
            });
        }

        // Resolve endpoints first; a flow with an unknown key never touches node state
        let mut degree = vec![0usize; nodes.len()];
        let mut pending: Vec<PendingFlow> = Vec::with_capacity(flows.len());
        let mut edges_removed = 0;

        for (index, record) in flows.iter().enumerate() {
            if record.origin.is_empty() {
                return Err(ConfigurationError::EmptyField {
                    field: "origin",
                    index,
                });
            }
            if record.destination.is_empty() {
                return Err(ConfigurationError::EmptyField {
                    field: "destination",
                    index,
                });
            }

            let endpoints = (
                key_to_id.get(record.origin.as_str()),
                key_to_id.get(record.destination.as_str()),
            );
            let (Some(&source), Some(&destination)) = endpoints else {
                edges_removed += 1;
                tracing::debug!(od_id = %record.od_id, "dropping flow with unknown endpoint");
                continue;
            };

            let source_slot = source as usize - 1;
            let destination_slot = destination as usize - 1;
            let distance = nodes[source_slot].distance_to(&nodes[destination_slot]);
            degree[source_slot] += 1;
            degree[destination_slot] += 1;

            pending.push(PendingFlow {
                source,
                destination,
                flow: Flow {
                    od_id: record.od_id.clone(),
                    count: record.count,
                    distance,
                    weight: distance.powf(weight_exponent),
                    locked: false,
                    skip: false,
                },
            });
        }

        if edges_removed > 0 {
            tracing::warn!(edges_removed, "flows dropped for missing endpoints");
        }

        let mut graph: UnGraph<Node, Flow> = UnGraph::with_capacity(nodes.len(), pending.len());
        let mut id_to_index: Vec<Option<NodeIndex>> = vec![None; nodes.len()];
        let mut nodes_removed = 0;

        for (node, &node_degree) in nodes.into_iter().zip(&degree) {
            if node_degree == 0 {
                nodes_removed += 1;
                continue;
            }
            let slot = node.id as usize - 1;
            id_to_index[slot] = Some(graph.add_node(node));
        }

        // Stable sort: equal weights keep input order
        pending.sort_by(|a, b| b.flow.weight.total_cmp(&a.flow.weight));

        let mut incident: Vec<Vec<EdgeIndex>> = vec![Vec::new(); graph.node_count()];
        for p in pending {
            let source = id_to_index[p.source as usize - 1];
            let destination = id_to_index[p.destination as usize - 1];
            let (Some(source), Some(destination)) = (source, destination) else {
                continue;
            };
            let edge_idx = graph.add_edge(source, destination, p.flow);
            incident[source.index()].push(edge_idx);
            if source != destination {
                incident[destination.index()].push(edge_idx);
            }
        }

        for edges in incident.iter_mut() {
            edges.sort_by(|a, b| graph[*a].distance.total_cmp(&graph[*b].distance));
        }

        let diagnostics = BuildDiagnostics {
            edges_removed,
            nodes_removed,
        };
        tracing::info!(
            nodes = graph.node_count(),
            flows = graph.edge_count(),
            edges_removed,
            nodes_removed,
            "flow network built"
        );

        Ok(FlowNetwork {
            graph,
            incident,
            diagnostics,
            weight_exponent,
        })
    }

    pub fn diagnostics(&self) -> BuildDiagnostics {
        self.diagnostics
    }

    /// Exponent the flow weights were computed with
    pub fn weight_exponent(&self) -> f64 {
        self.weight_exponent
    }

    /// Get node by index
    pub fn node(&self, idx: NodeIndex) -> Option<&Node> {
        self.graph.node_weight(idx)
    }

    /// Get flow by index
    pub fn flow(&self, idx: EdgeIndex) -> Option<&Flow> {
        self.graph.edge_weight(idx)
    }

    pub fn flow_mut(&mut self, idx: EdgeIndex) -> Option<&mut Flow> {
        self.graph.edge_weight_mut(idx)
    }

    /// Find a node by its location key
    pub fn find_node(&self, name: &str) -> Option<NodeIndex> {
        self.graph
            .node_indices()
            .find(|&idx| self.graph[idx].name == name)
    }

    /// Source and destination of a flow, in the direction of the original record
    pub fn endpoints(&self, idx: EdgeIndex) -> Option<(NodeIndex, NodeIndex)> {
        self.graph.edge_endpoints(idx)
    }

    /// The endpoint of `edge` that is not `node`
    pub fn opposite(&self, edge: EdgeIndex, node: NodeIndex) -> Option<NodeIndex> {
        let (source, destination) = self.graph.edge_endpoints(edge)?;
        if source == node {
            Some(destination)
        } else {
            Some(source)
        }
    }

    /// Flows touching a node, ascending by distance
    pub fn incident_flows(&self, node: NodeIndex) -> &[EdgeIndex] {
        self.incident
            .get(node.index())
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// All flows in processing order (descending weight)
    pub fn flow_indices(&self) -> impl Iterator<Item = EdgeIndex> {
        self.graph.edge_indices()
    }

    /// Clear every `locked` and `skip` flag
    pub fn reset_flags(&mut self) {
        for flow in self.graph.edge_weights_mut() {
            flow.locked = false;
            flow.skip = false;
        }
    }

    /// Straight segment from source to destination
    pub fn straight_line(&self, idx: EdgeIndex) -> Option<LineString<f64>> {
        let (source, destination) = self.endpoints(idx)?;
        let from = self.graph[source].coord;
        let to = self.graph[destination].coord;
        Some(LineString::from(vec![from.0, to.0]))
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn flow_count(&self) -> usize {
        self.graph.edge_count()
    }
}
