//! Analysis sink: load the network into a petgraph undirected graph for
//! structural checks (isolated nodes, connected components) before the
//! expensive database load runs.

use ahash::AHashMap;
use petgraph::algo::connected_components;
use petgraph::graph::{NodeIndex, UnGraph};
use tracing::warn;

use crate::aggregate::NetworkGraph;

#[derive(Debug, Clone)]
pub struct AnalysisNode {
    pub node_key: String,
    pub coords: [f64; 2],
    pub is_asset: bool,
}

#[derive(Debug, Clone)]
pub struct AnalysisEdge {
    pub edge_key: String,
    pub tag: String,
    pub segment_length: f64,
}

pub struct AnalysisGraph {
    pub graph: UnGraph<AnalysisNode, AnalysisEdge>,
    pub index: AHashMap<String, NodeIndex>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GraphStats {
    pub node_count: usize,
    pub edge_count: usize,
    pub isolated_nodes: usize,
    pub connected_components: usize,
}

impl AnalysisGraph {
    /// Load every node and edge. Edges whose endpoints are missing from the
    /// node set are dropped with a warning rather than panicking petgraph.
    pub fn from_network(network: &NetworkGraph) -> Self {
        let mut graph = UnGraph::new_undirected();
        let mut index: AHashMap<String, NodeIndex> = AHashMap::new();

        for node in &network.pipe_nodes {
            let idx = graph.add_node(AnalysisNode {
                node_key: node.node_key.clone(),
                coords: node.coords,
                is_asset: false,
            });
            index.insert(node.node_key.clone(), idx);
        }
        for node in &network.asset_nodes {
            let idx = graph.add_node(AnalysisNode {
                node_key: node.node_key.clone(),
                coords: node.coords,
                is_asset: true,
            });
            index.insert(node.node_key.clone(), idx);
        }

        let mut add_edge = |from: &str, to: &str, weight: AnalysisEdge| {
            match (index.get(from), index.get(to)) {
                (Some(&a), Some(&b)) => {
                    graph.add_edge(a, b, weight);
                }
                _ => warn!(edge_key = %weight.edge_key, "edge references unknown node"),
            }
        };

        for edge in &network.pipe_edges {
            add_edge(
                &edge.from_node_key,
                &edge.to_node_key,
                AnalysisEdge {
                    edge_key: edge.edge_key.clone(),
                    tag: edge.tag.clone(),
                    segment_length: edge.segment_length,
                },
            );
        }
        for edge in &network.attachment_edges {
            add_edge(
                &edge.from_node_key,
                &edge.to_node_key,
                AnalysisEdge {
                    edge_key: edge.edge_key.clone(),
                    tag: String::new(),
                    segment_length: 0.0,
                },
            );
        }

        AnalysisGraph { graph, index }
    }

    pub fn stats(&self) -> GraphStats {
        let isolated_nodes = self
            .graph
            .node_indices()
            .filter(|&idx| self.graph.neighbors(idx).next().is_none())
            .count();

        GraphStats {
            node_count: self.graph.node_count(),
            edge_count: self.graph.edge_count(),
            isolated_nodes,
            connected_components: connected_components(&self.graph),
        }
    }
}
