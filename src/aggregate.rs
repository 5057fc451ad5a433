//! Network aggregation: run the per-pipe pipeline over a batch of pipe
//! records and merge the parts into one deduplicated graph. Pipes that fail
//! their data-integrity checks are logged and skipped; one broken record
//! must not sink a batch of half a million.

use ahash::AHashSet;
use rayon::prelude::*;
use tracing::{info, warn};

use crate::edges;
use crate::errors::NetworkError;
use crate::models::{
    AssetNode, AttachmentEdge, DmaMembership, HAS_ASSET_LABEL, NETWORK_NODE_LABEL, PIPE_END_LABEL,
    PIPE_JUNCTION_LABEL, PIPE_NODE_LABEL, POINT_ASSET_LABEL, PipeEdge, PipeNode, PipeRecord,
    UtilityMembership,
};
use crate::topology::{self, BasePipe};

/// Everything a single pipe contributes to the network graph.
#[derive(Debug, Clone, Default)]
pub struct PipeGraphParts {
    pub pipe_nodes: Vec<PipeNode>,
    pub asset_nodes: Vec<AssetNode>,
    pub pipe_edges: Vec<PipeEdge>,
    pub attachment_edges: Vec<AttachmentEdge>,
    pub dma_memberships: Vec<DmaMembership>,
    pub utility_memberships: Vec<UtilityMembership>,
    pub asset_node_labels: Vec<String>,
}

/// Run the full per-pipe pipeline: parse and validate, locate crossings and
/// assets, stage and consolidate candidate nodes, materialize them, and
/// assemble the edges.
pub fn process_pipe(record: &PipeRecord) -> Result<PipeGraphParts, NetworkError> {
    let base = BasePipe::from_record(record)?;

    let junctions = topology::locate_touching_pipes(&base, &record.touching_pipes)?;
    let assets = topology::locate_assets(&base, &record.nearby_assets)?;

    let candidates = topology::build_candidate_nodes(&base, &junctions, &assets);
    let groups = topology::consolidate_by_position(candidates);
    let materialized = topology::materialize_groups(&base, groups)?;

    let pipe_edges = edges::assemble_pipe_edges(&base, &materialized.groups);
    let attachment_edges = edges::assemble_attachment_edges(&materialized.groups);

    let mut parts = PipeGraphParts {
        pipe_edges,
        attachment_edges,
        dma_memberships: materialized.dma_memberships,
        utility_memberships: materialized.utility_memberships,
        asset_node_labels: materialized.asset_node_labels,
        ..Default::default()
    };
    for group in materialized.groups {
        parts.pipe_nodes.push(group.pipe_node);
        parts.asset_nodes.extend(group.asset_nodes);
    }

    Ok(parts)
}

/// The merged, deduplicated network graph.
#[derive(Debug, Clone, Default)]
pub struct NetworkGraph {
    pub pipe_nodes: Vec<PipeNode>,
    pub asset_nodes: Vec<AssetNode>,
    pub pipe_edges: Vec<PipeEdge>,
    pub attachment_edges: Vec<AttachmentEdge>,
    pub dma_memberships: Vec<DmaMembership>,
    pub utility_memberships: Vec<UtilityMembership>,
    /// Every node label present in the graph.
    pub node_labels: Vec<String>,
    /// Every edge label present in the graph (pipe asset labels plus the
    /// attachment relationship).
    pub edge_labels: Vec<String>,
    pub pipes_processed: usize,
    pub pipes_failed: usize,
}

/// Merge accumulator. Node keys, edge keys and membership pairs are interned
/// so the first pipe to discover an element wins and later duplicates from
/// neighbouring pipes are dropped.
#[derive(Default)]
struct GraphAccumulator {
    graph: NetworkGraph,
    node_keys: AHashSet<String>,
    edge_keys: AHashSet<String>,
    dma_pairs: AHashSet<(String, String)>,
    utility_pairs: AHashSet<(String, String)>,
    labels: AHashSet<String>,
    edge_labels: AHashSet<String>,
}

impl GraphAccumulator {
    fn new() -> Self {
        let mut acc = GraphAccumulator::default();
        for label in [
            NETWORK_NODE_LABEL,
            PIPE_NODE_LABEL,
            PIPE_JUNCTION_LABEL,
            PIPE_END_LABEL,
            POINT_ASSET_LABEL,
        ] {
            acc.labels.insert(label.to_string());
            acc.graph.node_labels.push(label.to_string());
        }
        acc
    }

    fn merge(&mut self, parts: PipeGraphParts) {
        for node in parts.pipe_nodes {
            if self.node_keys.insert(node.node_key.clone()) {
                self.graph.pipe_nodes.push(node);
            }
        }
        for node in parts.asset_nodes {
            if self.node_keys.insert(node.node_key.clone()) {
                self.graph.asset_nodes.push(node);
            }
        }
        for edge in parts.pipe_edges {
            if self.edge_labels.insert(edge.asset_label.clone()) {
                self.graph.edge_labels.push(edge.asset_label.clone());
            }
            if self.edge_keys.insert(edge.edge_key.clone()) {
                self.graph.pipe_edges.push(edge);
            }
        }
        for edge in parts.attachment_edges {
            if self.edge_labels.insert(HAS_ASSET_LABEL.to_string()) {
                self.graph.edge_labels.push(HAS_ASSET_LABEL.to_string());
            }
            if self.edge_keys.insert(edge.edge_key.clone()) {
                self.graph.attachment_edges.push(edge);
            }
        }
        for membership in parts.dma_memberships {
            let pair = (membership.code.clone(), membership.to_node_key.clone());
            if self.dma_pairs.insert(pair) {
                self.graph.dma_memberships.push(membership);
            }
        }
        for membership in parts.utility_memberships {
            let pair = (membership.name.clone(), membership.to_node_key.clone());
            if self.utility_pairs.insert(pair) {
                self.graph.utility_memberships.push(membership);
            }
        }
        for label in parts.asset_node_labels {
            if self.labels.insert(label.clone()) {
                self.graph.node_labels.push(label);
            }
        }
        self.graph.pipes_processed += 1;
    }

    fn skip(&mut self, tag: &str, err: &NetworkError) {
        warn!(pipe_tag = tag, error = %err, "skipping pipe");
        self.graph.pipes_failed += 1;
    }
}

fn finish(mut acc: GraphAccumulator) -> NetworkGraph {
    acc.graph.node_labels.sort();
    acc.graph.edge_labels.sort();
    info!(
        pipes = acc.graph.pipes_processed,
        failed = acc.graph.pipes_failed,
        nodes = acc.graph.pipe_nodes.len() + acc.graph.asset_nodes.len(),
        edges = acc.graph.pipe_edges.len() + acc.graph.attachment_edges.len(),
        "network graph assembled"
    );
    acc.graph
}

pub fn build_network(records: &[PipeRecord]) -> NetworkGraph {
    let mut acc = GraphAccumulator::new();

    for record in records {
        match process_pipe(record) {
            Ok(parts) => acc.merge(parts),
            Err(err) => acc.skip(&record.tag, &err),
        }
    }

    finish(acc)
}

/// Parallel variant: the per-pipe stage is embarrassingly parallel, the merge
/// stays sequential in input order so the output is identical to the serial
/// build.
pub fn build_network_parallel(records: &[PipeRecord]) -> NetworkGraph {
    let results: Vec<(usize, Result<PipeGraphParts, NetworkError>)> = records
        .par_iter()
        .enumerate()
        .map(|(idx, record)| (idx, process_pipe(record)))
        .collect();

    let mut acc = GraphAccumulator::new();
    for (idx, result) in results {
        match result {
            Ok(parts) => acc.merge(parts),
            Err(err) => acc.skip(&records[idx].tag, &err),
        }
    }

    finish(acc)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AssetRecord, PIPE_MAIN_NAME, TouchingPipe};

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

    fn crossing_pair() -> Vec<PipeRecord> {
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
        vec![p1, p2]
    }

    #[test]
    fn test_crossing_pipes_share_one_junction() {
        let graph = build_network(&crossing_pair());

        // 4 pipe ends plus a single shared junction
        assert_eq!(graph.pipe_nodes.len(), 5);
        assert_eq!(graph.pipe_edges.len(), 4);
        assert_eq!(graph.pipes_processed, 2);
        assert_eq!(graph.pipes_failed, 0);

        let junctions: Vec<&PipeNode> = graph
            .pipe_nodes
            .iter()
            .filter(|n| n.node_labels.iter().any(|l| l == PIPE_JUNCTION_LABEL))
            .collect();
        assert_eq!(junctions.len(), 1);
        assert_eq!(
            junctions[0].pipe_tags,
            vec!["P1".to_string(), "P2".to_string()]
        );
    }

    #[test]
    fn test_rebuilding_the_same_batch_is_idempotent() {
        let mut records = crossing_pair();
        records.extend(crossing_pair());
        let graph = build_network(&records);

        assert_eq!(graph.pipe_nodes.len(), 5);
        assert_eq!(graph.pipe_edges.len(), 4);
        assert_eq!(graph.pipes_processed, 4);
    }

    #[test]
    fn test_parallel_build_matches_serial() {
        let records = crossing_pair();
        let serial = build_network(&records);
        let parallel = build_network_parallel(&records);

        assert_eq!(serial.pipe_nodes, parallel.pipe_nodes);
        assert_eq!(serial.pipe_edges, parallel.pipe_edges);
        assert_eq!(serial.dma_memberships, parallel.dma_memberships);
    }

    #[test]
    fn test_bad_pipe_is_skipped_not_fatal() {
        let mut records = crossing_pair();
        records.push(record("BAD", "POLYGON ((0 0, 1 0, 1 1, 0 0))"));
        let graph = build_network(&records);

        assert_eq!(graph.pipes_processed, 2);
        assert_eq!(graph.pipes_failed, 1);
        assert_eq!(graph.pipe_nodes.len(), 5);
    }

    #[test]
    fn test_asset_labels_are_collected() {
        let mut records = crossing_pair();
        records[0].nearby_assets = vec![AssetRecord {
            tag: "H1".to_string(),
            asset_name: "hydrant".to_string(),
            wkt: "POINT (20 0)".to_string(),
            subtype: None,
            acoustic_logger: false,
        }];
        let graph = build_network(&records);

        assert_eq!(graph.asset_nodes.len(), 1);
        assert_eq!(graph.attachment_edges.len(), 1);
        assert!(graph.node_labels.iter().any(|l| l == "Hydrant"));
        assert!(graph.edge_labels.iter().any(|l| l == "PipeMain"));
        assert!(graph.edge_labels.iter().any(|l| l == HAS_ASSET_LABEL));
    }

    #[test]
    fn test_memberships_are_deduplicated() {
        let graph = build_network(&crossing_pair());

        // one membership per node per dma/utility
        assert_eq!(graph.utility_memberships.len(), graph.pipe_nodes.len());
        assert_eq!(graph.dma_memberships.len(), graph.pipe_nodes.len());
    }
}
