use std::cmp::Ordering;
use std::collections::BinaryHeap;

use petgraph::graph::{EdgeIndex, NodeIndex};

use crate::graph::FlowNetwork;

/// Dijkstra frontier entry for the priority queue
#[derive(Clone, Copy)]
struct FrontierNode {
    node: NodeIndex,
    id: u32,
    distance: f64,
}

impl PartialEq for FrontierNode {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for FrontierNode {}

impl PartialOrd for FrontierNode {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for FrontierNode {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse ordering for min-heap; equal distances pop the lower node ID first
        other
            .distance
            .total_cmp(&self.distance)
            .then_with(|| other.id.cmp(&self.id))
    }
}

/// Per-search bookkeeping, indexed by node index
#[derive(Debug, Default)]
struct SearchScratch {
    distance: Vec<f64>,
    visited: Vec<bool>,
    previous: Vec<Option<(NodeIndex, EdgeIndex)>>,
}

impl SearchScratch {
    fn reset(&mut self, node_count: usize) {
        self.distance.clear();
        self.distance.resize(node_count, f64::INFINITY);
        self.visited.clear();
        self.visited.resize(node_count, false);
        self.previous.clear();
        self.previous.resize(node_count, None);
    }
}

/// Shortest-path search over the flows not flagged `skip`.
///
/// Holds its scratch buffers between calls to avoid reallocating, but every
/// call starts from a fully reset state.
#[derive(Debug, Default)]
pub struct PathSearch {
    scratch: SearchScratch,
}

impl PathSearch {
    pub fn new() -> Self {
        PathSearch::default()
    }

    /// Minimum-weight path from `source` to `dest` as an ordered list of flows.
    ///
    /// Returns an empty path when `dest` is unreachable or equals `source`.
    pub fn shortest_path(
        &mut self,
        network: &FlowNetwork,
        source: NodeIndex,
        dest: NodeIndex,
    ) -> Vec<EdgeIndex> {
        let node_count = network.node_count();
        if source.index() >= node_count || dest.index() >= node_count {
            return Vec::new();
        }

        let scratch = &mut self.scratch;
        scratch.reset(node_count);
        scratch.distance[source.index()] = 0.0;

        let mut frontier = BinaryHeap::new();
        frontier.push(FrontierNode {
            node: source,
            id: network.graph[source].id,
            distance: 0.0,
        });

        while let Some(current) = frontier.pop() {
            if scratch.visited[current.node.index()] {
                continue;
            }
            scratch.visited[current.node.index()] = true;

            // Weights are non-negative, so the first pop of dest is final
            if current.node == dest {
                break;
            }

            for &edge_idx in network.incident_flows(current.node) {
                let flow = &network.graph[edge_idx];
                if flow.skip {
                    continue;
                }
                let Some(neighbor) = network.opposite(edge_idx, current.node) else {
                    continue;
                };

                let candidate = current.distance + flow.weight;
                if candidate < scratch.distance[neighbor.index()] {
                    scratch.distance[neighbor.index()] = candidate;
                    scratch.previous[neighbor.index()] = Some((current.node, edge_idx));
                    frontier.push(FrontierNode {
                        node: neighbor,
                        id: network.graph[neighbor].id,
                        distance: candidate,
                    });
                }
            }
        }

        let mut path = Vec::new();
        let mut node = dest;
        while let Some((previous, edge_idx)) = scratch.previous[node.index()] {
            path.push(edge_idx);
            node = previous;
        }
        path.reverse();
        path
    }
}

/// Sum of the geometric distances of the flows on a path
pub fn path_length(network: &FlowNetwork, path: &[EdgeIndex]) -> f64 {
    path.iter()
        .filter_map(|&idx| network.flow(idx))
        .map(|flow| flow.distance)
        .sum()
}
