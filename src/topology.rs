//! Per-pipe topology: combine a pipe's terminal points, the junctions where
//! other pipes cross it, and the point assets sitting on it into one
//! position-ordered, consolidated sequence of candidate nodes, then
//! materialize those into keyed graph nodes.

use crate::errors::NetworkError;
use crate::geometry;
use crate::materials;
use crate::models::{
    AssetNode, AssetRecord, DmaMembership, NETWORK_NODE_LABEL, PIPE_END_LABEL,
    PIPE_JUNCTION_LABEL, PIPE_NODE_LABEL, POINT_ASSET_LABEL, PipeNode, PipeRecord, TouchingPipe,
    UtilityMembership, dma_json, pascal_label,
};
use crate::node_key::{
    ASSET_DISCRIMINATOR_BASE, JUNCTION_DISCRIMINATOR, PIPE_END_DISCRIMINATOR, encode_node_key,
};
use geo_types::{LineString, Point};

/// Closed classification of everything that can occupy a position along a
/// pipe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    PipeEnd,
    PipeJunction,
    PointAsset,
}

/// A pipe record with its geometry parsed and its single utility resolved.
#[derive(Debug, Clone)]
pub struct BasePipe {
    pub id: i64,
    pub tag: String,
    pub pipe_type: String,
    pub asset_name: String,
    pub asset_label: String,
    pub material: String,
    pub diameter: f64,
    pub geometry: LineString<f64>,
    pub length_m: f64,
    pub start_point: Point<f64>,
    pub end_point: Point<f64>,
    pub dma_codes: Vec<String>,
    pub dma_names: Vec<String>,
    pub dmas: String,
    pub utility: String,
    pub line_start_intersection_tags: Vec<String>,
    pub line_end_intersection_tags: Vec<String>,
}

impl BasePipe {
    pub fn from_record(record: &PipeRecord) -> Result<Self, NetworkError> {
        let geometry = geometry::parse_line(&record.wkt)?;
        let length_m = geometry::line_length(&geometry);
        if length_m == 0.0 {
            return Err(NetworkError::DegenerateGeometry(format!(
                "pipe {} has zero-length geometry",
                record.tag
            )));
        }

        let start_point = Point::from(geometry.0[0]);
        let end_point = Point::from(geometry.0[geometry.0.len() - 1]);
        let utility = single_utility(record)?;

        Ok(BasePipe {
            id: record.id,
            tag: record.tag.clone(),
            pipe_type: record.pipe_type.clone(),
            asset_name: record.asset_name.clone(),
            asset_label: pascal_label(&record.asset_name),
            material: record.material.clone(),
            diameter: record.diameter,
            geometry,
            length_m,
            start_point,
            end_point,
            dma_codes: record.dma_codes.clone(),
            dma_names: record.dma_names.clone(),
            dmas: dma_json(&record.dma_codes, &record.dma_names),
            utility,
            line_start_intersection_tags: record.line_start_intersection_tags.clone(),
            line_end_intersection_tags: record.line_end_intersection_tags.clone(),
        })
    }

    /// Distance key of the pipe's end point.
    pub fn end_distance_cm(&self) -> i64 {
        (self.length_m * geometry::CM_PER_M).round() as i64
    }
}

/// A pipe belongs to exactly one utility; its DMA memberships must agree.
fn single_utility(record: &PipeRecord) -> Result<String, NetworkError> {
    let mut utilities = record.utilities.clone();
    utilities.sort();
    utilities.dedup();

    if utilities.len() == 1 {
        Ok(utilities.remove(0))
    } else {
        Err(NetworkError::MultiUtilityPipe {
            tag: record.tag.clone(),
            utilities,
        })
    }
}

/// One candidate position along the pipe, before consolidation.
#[derive(Debug, Clone)]
pub struct CandidateNode {
    pub kind: NodeKind,
    pub distance_cm: i64,
    pub position: f64,
    pub point: Point<f64>,
    /// Tags of every pipe incident at this position (structural nodes only).
    pub pipe_tags: Vec<String>,
    /// Set for `NodeKind::PointAsset` candidates.
    pub asset: Option<AssetRecord>,
}

/// A touching pipe's intersection, projected onto the base pipe.
#[derive(Debug, Clone)]
pub struct LocatedTouch {
    pub tag: String,
    pub point: Point<f64>,
    pub distance_cm: i64,
    pub position: f64,
}

/// A nearby asset's position on the base pipe.
#[derive(Debug, Clone)]
pub struct LocatedAsset {
    pub asset: AssetRecord,
    pub point: Point<f64>,
    pub distance_cm: i64,
    pub position: f64,
}

/// Intersect every touching pipe against the base pipe. A single touch can
/// yield several crossings (and therefore several located entries).
pub fn locate_touching_pipes(
    base: &BasePipe,
    touches: &[TouchingPipe],
) -> Result<Vec<LocatedTouch>, NetworkError> {
    let mut located = Vec::new();

    for touch in touches {
        let other = geometry::parse_geometry(&touch.wkt)?;
        for point in geometry::intersection_points(&base.geometry, &other)? {
            let on_line = geometry::locate_on_line(&base.geometry, &point)?;
            located.push(LocatedTouch {
                tag: touch.tag.clone(),
                point: on_line.point,
                distance_cm: on_line.distance_cm,
                position: on_line.position,
            });
        }
    }

    Ok(located)
}

pub fn locate_assets(
    base: &BasePipe,
    assets: &[AssetRecord],
) -> Result<Vec<LocatedAsset>, NetworkError> {
    let mut located = Vec::new();

    for asset in assets {
        let other = geometry::parse_geometry(&asset.wkt)?;
        for point in geometry::intersection_points(&base.geometry, &other)? {
            let on_line = geometry::locate_on_line(&base.geometry, &point)?;
            located.push(LocatedAsset {
                asset: asset.clone(),
                point: on_line.point,
                distance_cm: on_line.distance_cm,
                position: on_line.position,
            });
        }
    }

    Ok(located)
}

/// Build the full position-ordered candidate list for one pipe: terminals
/// first, then non-terminal junctions, then assets.
pub fn build_candidate_nodes(
    base: &BasePipe,
    junctions: &[LocatedTouch],
    assets: &[LocatedAsset],
) -> Vec<CandidateNode> {
    let mut nodes = terminal_nodes(base);
    insert_non_terminal_junctions(base, &mut nodes, junctions);
    insert_assets(&mut nodes, assets);
    nodes
}

/// The pipe's two terminal candidates. An end that touches no other pipe is
/// a pipe end; otherwise it is a junction carrying the touching tags.
fn terminal_nodes(base: &BasePipe) -> Vec<CandidateNode> {
    let classify = |touching: &[String]| {
        if touching.is_empty() {
            NodeKind::PipeEnd
        } else {
            NodeKind::PipeJunction
        }
    };

    let mut start_tags: Vec<String> = base.line_start_intersection_tags.clone();
    start_tags.push(base.tag.clone());
    start_tags.sort();

    let mut end_tags: Vec<String> = base.line_end_intersection_tags.clone();
    end_tags.push(base.tag.clone());
    end_tags.sort();

    vec![
        CandidateNode {
            kind: classify(&base.line_start_intersection_tags),
            distance_cm: 0,
            position: 0.0,
            point: base.start_point,
            pipe_tags: start_tags,
            asset: None,
        },
        CandidateNode {
            kind: classify(&base.line_end_intersection_tags),
            distance_cm: base.end_distance_cm(),
            position: 1.0,
            point: base.end_point,
            pipe_tags: end_tags,
            asset: None,
        },
    ]
}

/// Insert mid-pipe junctions by binary insertion on the rounded distance.
/// A crossing at a distance already occupied by a structural node merges its
/// tag into that node instead of duplicating the position.
fn insert_non_terminal_junctions(
    base: &BasePipe,
    nodes: &mut Vec<CandidateNode>,
    junctions: &[LocatedTouch],
) {
    let terminal_tags: Vec<&String> = base
        .line_start_intersection_tags
        .iter()
        .chain(base.line_end_intersection_tags.iter())
        .collect();
    let end_cm = base.end_distance_cm();

    for junction in junctions {
        if terminal_tags.contains(&&junction.tag) {
            continue;
        }
        // Terminal positions are already covered by the terminal stage.
        if junction.distance_cm <= 0 || junction.distance_cm >= end_cm {
            continue;
        }

        if let Some(existing) = nodes
            .iter_mut()
            .find(|n| n.kind != NodeKind::PointAsset && n.distance_cm == junction.distance_cm)
        {
            if !existing.pipe_tags.contains(&junction.tag) {
                existing.pipe_tags.push(junction.tag.clone());
                existing.pipe_tags.sort();
            }
            continue;
        }

        let mut tags = vec![base.tag.clone(), junction.tag.clone()];
        tags.sort();

        let insert_at = nodes.partition_point(|n| n.distance_cm <= junction.distance_cm);
        nodes.insert(
            insert_at,
            CandidateNode {
                kind: NodeKind::PipeJunction,
                distance_cm: junction.distance_cm,
                position: junction.position,
                point: junction.point,
                pipe_tags: tags,
                asset: None,
            },
        );
    }
}

/// Assets are inserted in position order but never merged into a junction;
/// consolidation later groups them with whatever shares their position.
fn insert_assets(nodes: &mut Vec<CandidateNode>, assets: &[LocatedAsset]) {
    for located in assets {
        let insert_at = nodes.partition_point(|n| n.distance_cm <= located.distance_cm);
        nodes.insert(
            insert_at,
            CandidateNode {
                kind: NodeKind::PointAsset,
                distance_cm: located.distance_cm,
                position: located.position,
                point: located.point,
                pipe_tags: Vec::new(),
                asset: Some(located.asset.clone()),
            },
        );
    }
}

/// Group the ordered candidate list by rounded distance. Input order is
/// preserved inside each group.
pub fn consolidate_by_position(nodes: Vec<CandidateNode>) -> Vec<Vec<CandidateNode>> {
    let mut groups: Vec<Vec<CandidateNode>> = Vec::new();

    for node in nodes {
        match groups.last_mut() {
            Some(group) if group[0].distance_cm == node.distance_cm => group.push(node),
            _ => groups.push(vec![node]),
        }
    }

    groups
}

/// One consolidated position, materialized: exactly one structural node plus
/// any asset nodes sharing the position.
#[derive(Debug, Clone)]
pub struct MaterializedGroup {
    pub distance_cm: i64,
    pub pipe_node: PipeNode,
    pub asset_nodes: Vec<AssetNode>,
}

/// Everything one pipe contributes to the graph, before edges are assembled.
#[derive(Debug, Clone, Default)]
pub struct PipeMaterialization {
    pub groups: Vec<MaterializedGroup>,
    pub dma_memberships: Vec<DmaMembership>,
    pub utility_memberships: Vec<UtilityMembership>,
    pub asset_node_labels: Vec<String>,
}

/// Turn each position group into keyed nodes. A group holding only assets
/// gets a synthesized junction so the assets have a pipe node to attach to.
pub fn materialize_groups(
    base: &BasePipe,
    groups: Vec<Vec<CandidateNode>>,
) -> Result<PipeMaterialization, NetworkError> {
    let mut out = PipeMaterialization::default();

    for group in groups {
        let distance_cm = group[0].distance_cm;
        let structural: Vec<&CandidateNode> = group
            .iter()
            .filter(|n| n.kind != NodeKind::PointAsset)
            .collect();

        if structural.len() > 1 {
            return Err(NetworkError::InvalidNodeGroup {
                tag: base.tag.clone(),
                distance_cm,
                count: structural.len(),
            });
        }

        let pipe_node = match structural.first() {
            Some(node) => structural_pipe_node(base, node),
            // A lone mid-pipe asset: synthesize the junction that splits the
            // pipe at this position.
            None => synthesized_junction_node(base, &group[0]),
        };

        let mut asset_nodes = Vec::new();
        for candidate in group.iter().filter(|n| n.kind == NodeKind::PointAsset) {
            let node = asset_node(base, candidate)?;
            out.asset_node_labels
                .push(node.node_labels[2].clone());
            record_memberships(base, &node.node_key, &mut out);
            asset_nodes.push(node);
        }

        record_memberships(base, &pipe_node.node_key, &mut out);
        out.groups.push(MaterializedGroup {
            distance_cm,
            pipe_node,
            asset_nodes,
        });
    }

    Ok(out)
}

fn structural_pipe_node(base: &BasePipe, candidate: &CandidateNode) -> PipeNode {
    let (kind_label, discriminator) = match candidate.kind {
        NodeKind::PipeJunction => (PIPE_JUNCTION_LABEL, JUNCTION_DISCRIMINATOR),
        NodeKind::PipeEnd => (PIPE_END_LABEL, PIPE_END_DISCRIMINATOR),
        NodeKind::PointAsset => unreachable!("asset candidates are materialized separately"),
    };

    PipeNode {
        node_key: encode_node_key(&candidate.point, &[discriminator]),
        node_labels: vec![
            NETWORK_NODE_LABEL.to_string(),
            PIPE_NODE_LABEL.to_string(),
            kind_label.to_string(),
        ],
        coords: [candidate.point.x(), candidate.point.y()],
        pipe_tags: candidate.pipe_tags.clone(),
        utility: base.utility.clone(),
        dma_codes: base.dma_codes.clone(),
        dma_names: base.dma_names.clone(),
        dmas: base.dmas.clone(),
    }
}

fn synthesized_junction_node(base: &BasePipe, candidate: &CandidateNode) -> PipeNode {
    PipeNode {
        node_key: encode_node_key(&candidate.point, &[JUNCTION_DISCRIMINATOR]),
        node_labels: vec![
            NETWORK_NODE_LABEL.to_string(),
            PIPE_NODE_LABEL.to_string(),
            PIPE_JUNCTION_LABEL.to_string(),
        ],
        coords: [candidate.point.x(), candidate.point.y()],
        pipe_tags: vec![base.tag.clone()],
        utility: base.utility.clone(),
        dma_codes: base.dma_codes.clone(),
        dma_names: base.dma_names.clone(),
        dmas: base.dmas.clone(),
    }
}

fn asset_node(base: &BasePipe, candidate: &CandidateNode) -> Result<AssetNode, NetworkError> {
    let asset = candidate
        .asset
        .as_ref()
        .expect("PointAsset candidate always carries its asset record");
    let type_index = materials::asset_type_index(&asset.asset_name)?;

    Ok(AssetNode {
        node_key: encode_node_key(&candidate.point, &[ASSET_DISCRIMINATOR_BASE + type_index]),
        node_labels: vec![
            NETWORK_NODE_LABEL.to_string(),
            POINT_ASSET_LABEL.to_string(),
            pascal_label(&asset.asset_name),
        ],
        coords: [candidate.point.x(), candidate.point.y()],
        tag: asset.tag.clone(),
        subtype: asset.subtype.clone(),
        acoustic_logger: asset.acoustic_logger,
        utility: base.utility.clone(),
        dma_codes: base.dma_codes.clone(),
        dma_names: base.dma_names.clone(),
        dmas: base.dmas.clone(),
    })
}

fn record_memberships(base: &BasePipe, node_key: &str, out: &mut PipeMaterialization) {
    out.utility_memberships.push(UtilityMembership {
        name: base.utility.clone(),
        to_node_key: node_key.to_string(),
    });
    for (code, name) in base.dma_codes.iter().zip(base.dma_names.iter()) {
        out.dma_memberships.push(DmaMembership {
            code: code.clone(),
            name: name.clone(),
            to_node_key: node_key.to_string(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PIPE_MAIN_NAME;

    fn record(tag: &str, wkt: &str) -> PipeRecord {
        PipeRecord {
            id: 1,
            tag: tag.to_string(),
            pipe_type: "distribution".to_string(),
            asset_name: PIPE_MAIN_NAME.to_string(),
            material: "Steel".to_string(),
            diameter: 110.0,
            wkt: wkt.to_string(),
            dma_ids: vec![7],
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

    fn hydrant(tag: &str, wkt: &str) -> AssetRecord {
        AssetRecord {
            tag: tag.to_string(),
            asset_name: "hydrant".to_string(),
            wkt: wkt.to_string(),
            subtype: None,
            acoustic_logger: false,
        }
    }

    #[test]
    fn test_isolated_pipe_has_two_pipe_ends() {
        let base = BasePipe::from_record(&record("P1", "LINESTRING (0 0, 100 0)")).unwrap();
        let nodes = build_candidate_nodes(&base, &[], &[]);

        assert_eq!(nodes.len(), 2);
        assert_eq!(nodes[0].kind, NodeKind::PipeEnd);
        assert_eq!(nodes[1].kind, NodeKind::PipeEnd);
        assert_eq!(nodes[0].distance_cm, 0);
        assert_eq!(nodes[1].distance_cm, 10_000);
    }

    #[test]
    fn test_terminal_touch_makes_a_junction() {
        let mut rec = record("P1", "LINESTRING (0 0, 100 0)");
        rec.line_start_intersection_tags = vec!["P2".to_string()];
        let base = BasePipe::from_record(&rec).unwrap();
        let nodes = build_candidate_nodes(&base, &[], &[]);

        assert_eq!(nodes[0].kind, NodeKind::PipeJunction);
        assert_eq!(
            nodes[0].pipe_tags,
            vec!["P1".to_string(), "P2".to_string()]
        );
        assert_eq!(nodes[1].kind, NodeKind::PipeEnd);
    }

    #[test]
    fn test_mid_pipe_crossing_inserts_in_order() {
        let base = BasePipe::from_record(&record("P1", "LINESTRING (0 0, 100 0)")).unwrap();
        let touches = locate_touching_pipes(
            &base,
            &[TouchingPipe {
                id: 2,
                tag: "P2".to_string(),
                wkt: "LINESTRING (60 -10, 60 10)".to_string(),
            }],
        )
        .unwrap();
        let nodes = build_candidate_nodes(&base, &touches, &[]);

        assert_eq!(nodes.len(), 3);
        assert_eq!(nodes[1].kind, NodeKind::PipeJunction);
        assert_eq!(nodes[1].distance_cm, 6_000);
        assert_eq!(
            nodes[1].pipe_tags,
            vec!["P1".to_string(), "P2".to_string()]
        );

        let distances: Vec<i64> = nodes.iter().map(|n| n.distance_cm).collect();
        let mut sorted = distances.clone();
        sorted.sort();
        assert_eq!(distances, sorted);
    }

    #[test]
    fn test_two_crossings_at_same_position_merge_tags() {
        let base = BasePipe::from_record(&record("P1", "LINESTRING (0 0, 100 0)")).unwrap();
        let touches = locate_touching_pipes(
            &base,
            &[
                TouchingPipe {
                    id: 2,
                    tag: "P2".to_string(),
                    wkt: "LINESTRING (50 -10, 50 10)".to_string(),
                },
                TouchingPipe {
                    id: 3,
                    tag: "P3".to_string(),
                    wkt: "LINESTRING (49.998 10, 50.002 -10)".to_string(),
                },
            ],
        )
        .unwrap();
        let nodes = build_candidate_nodes(&base, &touches, &[]);

        assert_eq!(nodes.len(), 3);
        assert_eq!(
            nodes[1].pipe_tags,
            vec!["P1".to_string(), "P2".to_string(), "P3".to_string()]
        );
    }

    #[test]
    fn test_asset_at_junction_stays_a_separate_candidate() {
        let base = BasePipe::from_record(&record("P1", "LINESTRING (0 0, 100 0)")).unwrap();
        let touches = locate_touching_pipes(
            &base,
            &[TouchingPipe {
                id: 2,
                tag: "P2".to_string(),
                wkt: "LINESTRING (50 -10, 50 10)".to_string(),
            }],
        )
        .unwrap();
        let assets = locate_assets(&base, &[hydrant("H1", "POINT (50 0)")]).unwrap();
        let nodes = build_candidate_nodes(&base, &touches, &assets);

        assert_eq!(nodes.len(), 4);
        let groups = consolidate_by_position(nodes);
        assert_eq!(groups.len(), 3);
        assert_eq!(groups[1].len(), 2);
        assert!(groups[1].iter().any(|n| n.kind == NodeKind::PipeJunction));
        assert!(groups[1].iter().any(|n| n.kind == NodeKind::PointAsset));
    }

    #[test]
    fn test_lone_mid_pipe_asset_synthesizes_a_junction() {
        let base = BasePipe::from_record(&record("P1", "LINESTRING (0 0, 100 0)")).unwrap();
        let assets = locate_assets(&base, &[hydrant("H1", "POINT (30 0)")]).unwrap();
        let nodes = build_candidate_nodes(&base, &[], &assets);
        let groups = consolidate_by_position(nodes);
        let materialized = materialize_groups(&base, groups).unwrap();

        assert_eq!(materialized.groups.len(), 3);
        let mid = &materialized.groups[1];
        assert!(
            mid.pipe_node
                .node_labels
                .contains(&PIPE_JUNCTION_LABEL.to_string())
        );
        assert_eq!(mid.asset_nodes.len(), 1);
        assert_eq!(mid.asset_nodes[0].tag, "H1");
        assert_ne!(mid.pipe_node.node_key, mid.asset_nodes[0].node_key);
    }

    #[test]
    fn test_junction_and_asset_keys_differ_at_shared_position() {
        let base = BasePipe::from_record(&record("P1", "LINESTRING (0 0, 100 0)")).unwrap();
        let touches = locate_touching_pipes(
            &base,
            &[TouchingPipe {
                id: 2,
                tag: "P2".to_string(),
                wkt: "LINESTRING (50 -10, 50 10)".to_string(),
            }],
        )
        .unwrap();
        let assets = locate_assets(&base, &[hydrant("H1", "POINT (50 0)")]).unwrap();
        let nodes = build_candidate_nodes(&base, &touches, &assets);
        let materialized = materialize_groups(&base, consolidate_by_position(nodes)).unwrap();

        let mid = &materialized.groups[1];
        assert_eq!(mid.asset_nodes.len(), 1);
        assert_ne!(mid.pipe_node.node_key, mid.asset_nodes[0].node_key);
    }

    #[test]
    fn test_multi_utility_pipe_is_fatal() {
        let mut rec = record("P1", "LINESTRING (0 0, 100 0)");
        rec.utilities = vec![
            "severn_trent_water".to_string(),
            "thames_water".to_string(),
        ];
        assert!(matches!(
            BasePipe::from_record(&rec),
            Err(NetworkError::MultiUtilityPipe { .. })
        ));
    }

    #[test]
    fn test_duplicate_utility_entries_are_fine() {
        let mut rec = record("P1", "LINESTRING (0 0, 100 0)");
        rec.utilities = vec![
            "severn_trent_water".to_string(),
            "severn_trent_water".to_string(),
        ];
        let base = BasePipe::from_record(&rec).unwrap();
        assert_eq!(base.utility, "severn_trent_water");
    }

    #[test]
    fn test_memberships_recorded_per_node() {
        let base = BasePipe::from_record(&record("P1", "LINESTRING (0 0, 100 0)")).unwrap();
        let nodes = build_candidate_nodes(&base, &[], &[]);
        let materialized = materialize_groups(&base, consolidate_by_position(nodes)).unwrap();

        assert_eq!(materialized.utility_memberships.len(), 2);
        assert_eq!(materialized.dma_memberships.len(), 2);
        assert_eq!(materialized.dma_memberships[0].code, "ZDM01");
    }
}
