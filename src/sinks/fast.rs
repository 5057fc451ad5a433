//! Compact adjacency-list form of the structural network, built for the
//! coverage propagator: integer node ids, edge attribute access without
//! hashing, and O(1) incident-edge lookup. Asset nodes and attachment edges
//! are deliberately excluded; acoustic coverage travels along pipes only.

use ahash::AHashMap;

use crate::aggregate::NetworkGraph;
use crate::errors::NetworkError;
use crate::models::PIPE_END_LABEL;

#[derive(Debug, Clone)]
pub struct FastNode {
    pub node_key: String,
    pub coords: [f64; 2],
    /// Coverage propagation stops at pipe ends.
    pub is_pipe_end: bool,
}

#[derive(Debug, Clone)]
pub struct FastEdge {
    pub a: usize,
    pub b: usize,
    pub edge_key: String,
    pub tag: String,
    pub material: String,
    pub length_m: f64,
    pub wkt: String,
    pub dma_code: String,
    pub utility: String,
}

#[derive(Debug, Clone, Default)]
pub struct FastGraph {
    nodes: Vec<FastNode>,
    edges: Vec<FastEdge>,
    adjacency: Vec<Vec<usize>>,
    node_index: AHashMap<String, usize>,
}

impl FastGraph {
    pub fn from_network(network: &NetworkGraph) -> Result<Self, NetworkError> {
        let mut graph = FastGraph::default();

        for node in &network.pipe_nodes {
            let id = graph.nodes.len();
            graph.nodes.push(FastNode {
                node_key: node.node_key.clone(),
                coords: node.coords,
                is_pipe_end: node.node_labels.iter().any(|l| l == PIPE_END_LABEL),
            });
            graph.adjacency.push(Vec::new());
            graph.node_index.insert(node.node_key.clone(), id);
        }

        for edge in &network.pipe_edges {
            let a = graph.require(&edge.from_node_key)?;
            let b = graph.require(&edge.to_node_key)?;
            let edge_id = graph.edges.len();
            graph.edges.push(FastEdge {
                a,
                b,
                edge_key: edge.edge_key.clone(),
                tag: edge.tag.clone(),
                material: edge.material.clone(),
                length_m: edge.segment_length,
                wkt: edge.segment_wkt.clone(),
                dma_code: edge.dma_codes.first().cloned().unwrap_or_default(),
                utility: edge.utility.clone(),
            });
            graph.adjacency[a].push(edge_id);
            graph.adjacency[b].push(edge_id);
        }

        Ok(graph)
    }

    fn require(&self, node_key: &str) -> Result<usize, NetworkError> {
        self.node_index
            .get(node_key)
            .copied()
            .ok_or_else(|| NetworkError::MissingNode {
                node_key: node_key.to_string(),
            })
    }

    pub fn node_id(&self, node_key: &str) -> Option<usize> {
        self.node_index.get(node_key).copied()
    }

    pub fn node(&self, id: usize) -> &FastNode {
        &self.nodes[id]
    }

    pub fn edge(&self, id: usize) -> &FastEdge {
        &self.edges[id]
    }

    pub fn incident_edges(&self, node_id: usize) -> &[usize] {
        &self.adjacency[node_id]
    }

    /// The node at the opposite end of `edge_id` from `node_id`.
    pub fn other_end(&self, edge_id: usize, node_id: usize) -> usize {
        let edge = &self.edges[edge_id];
        if edge.a == node_id { edge.b } else { edge.a }
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate;
    use crate::models::{PIPE_MAIN_NAME, PipeRecord, TouchingPipe};

    fn record(tag: &str, wkt: &str) -> PipeRecord {
        PipeRecord {
            id: 0,
            tag: tag.to_string(),
            pipe_type: "distribution".to_string(),
            asset_name: PIPE_MAIN_NAME.to_string(),
            material: "Steel".to_string(),
            diameter: 110.0,
            wkt: wkt.to_string(),
            dma_ids: vec![],
            dma_codes: vec!["ZDM01".to_string()],
            dma_names: vec!["North".to_string()],
            utilities: vec!["severn_trent_water".to_string()],
            line_start_intersection_tags: vec![],
            line_start_intersection_ids: vec![],
            line_end_intersection_tags: vec![],
            line_end_intersection_ids: vec![],
            touching_pipes: vec![],
            nearby_assets: vec![],
        }
    }

    #[test]
    fn test_adjacency_and_other_end() {
        let mut p1 = record("P1", "LINESTRING (0 0, 100 0)");
        let mut p2 = record("P2", "LINESTRING (50 -50, 50 50)");
        p1.touching_pipes = vec![TouchingPipe {
            id: 2,
            tag: "P2".to_string(),
            wkt: p2.wkt.clone(),
        }];
        p2.touching_pipes = vec![TouchingPipe {
            id: 1,
            tag: "P1".to_string(),
            wkt: p1.wkt.clone(),
        }];
        let network = aggregate::build_network(&[p1, p2]);
        let fast = FastGraph::from_network(&network).unwrap();

        assert_eq!(fast.node_count(), 5);
        assert_eq!(fast.edge_count(), 4);

        let junction = (0..fast.node_count())
            .find(|&id| fast.incident_edges(id).len() == 4)
            .expect("crossing produces a degree-4 junction");
        for &edge_id in fast.incident_edges(junction) {
            let far = fast.other_end(edge_id, junction);
            assert_ne!(far, junction);
            assert!(fast.node(far).is_pipe_end);
        }
    }

    #[test]
    fn test_pipe_ends_are_flagged() {
        let network = aggregate::build_network(&[record("P1", "LINESTRING (0 0, 100 0)")]);
        let fast = FastGraph::from_network(&network).unwrap();

        assert_eq!(fast.node_count(), 2);
        assert!(fast.node(0).is_pipe_end);
        assert!(fast.node(1).is_pipe_end);
        assert_eq!(fast.edge(0).dma_code, "ZDM01");
    }
}
