use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use thiserror::Error;

use super::bifurcation::{BifurcationCap, CapError, build_cap};
use super::conflict::{Arm, DEFAULT_TRIM_STEP, Resolution, resolve_conflicts};
use super::topology::{Bifurcation, BranchTopology};
use crate::branch::{Branch, BranchError, BranchFactory, TrimRange};
use crate::geom::{
    GeomMesh, ObjError, Point3, SmoothOptions, TriangulationError, polygon_cap, ring_points,
    ring_vertex, stitch_ring_indices, sweep_rings, windowed_sinc_smooth, write_obj,
};
use crate::graph::VesselGraph;
use crate::graph::node::NodeId;

#[derive(Debug, Error)]
pub enum ModelError {
    #[error(transparent)]
    Branch(#[from] BranchError),
    #[error("tube tessellation needs at least 3 sides, got {0}")]
    TooFewSides(usize),
    #[error(transparent)]
    Triangulation(#[from] TriangulationError),
    #[error("tree model has no geometry")]
    EmptyMesh,
    #[error(transparent)]
    Obj(#[from] ObjError),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModelOptions {
    /// Sides of every tube cross-section.
    pub num_sides: usize,
    pub trim_step: f64,
    pub smoothing: SmoothOptions,
    pub smooth_caps: bool,
}

impl Default for ModelOptions {
    fn default() -> Self {
        Self {
            num_sides: 16,
            trim_step: DEFAULT_TRIM_STEP,
            smoothing: SmoothOptions::default(),
            smooth_caps: true,
        }
    }
}

/// Why a bifurcation got plain overlapping tubes instead of a cap.
#[derive(Debug, Clone, PartialEq)]
pub enum FallbackReason {
    Unresolved(Resolution),
    Cap(CapError),
}

impl fmt::Display for FallbackReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unresolved(Resolution::Collapsed { arm }) => {
                write!(f, "branch {arm} ran out of range while trimming")
            }
            Self::Unresolved(other) => write!(f, "conflicts not resolved ({other:?})"),
            Self::Cap(err) => write!(f, "cap failed: {err}"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModelReport {
    pub capped: Vec<NodeId>,
    pub fallback: Vec<(NodeId, FallbackReason)>,
    /// Splits with three or more children.
    pub multiway: Vec<NodeId>,
    /// Points inserted by bifurcation caps.
    pub cap_points: usize,
}

impl ModelReport {
    #[must_use]
    pub fn is_capped(&self, node: NodeId) -> bool {
        self.capped.contains(&node)
    }
}

/// Surface mesh of one vessel tree.
#[derive(Debug, Clone, PartialEq)]
pub struct TreeModel {
    pub mesh: GeomMesh,
    pub report: ModelReport,
}

/// Vertex indices of the first and last ring of a swept tube.
#[derive(Debug, Clone)]
struct TubeEnds {
    first: Vec<u32>,
    last: Vec<u32>,
}

impl TreeModel {
    /// Tubes for every edge, caps at binary bifurcations, flat caps at the
    /// root and the terminals.
    pub fn build<F>(graph: &VesselGraph, factory: &F, options: &ModelOptions) -> Result<Self, ModelError>
    where
        F: BranchFactory + ?Sized,
    {
        let sides = options.num_sides;
        if sides < 3 {
            return Err(ModelError::TooFewSides(sides));
        }

        let topology = graph.build_branch_topology(factory)?;
        let mut ranges: BTreeMap<NodeId, TrimRange> =
            topology.branches.keys().map(|&k| (k, TrimRange::FULL)).collect();
        let mut report = ModelReport {
            multiway: topology.multiway.clone(),
            ..ModelReport::default()
        };

        let mut resolved = Vec::new();
        for bif in &topology.bifurcations {
            let Some(mut arms) = arms_at(&topology, &ranges, bif) else {
                continue;
            };
            let outcome = resolve_conflicts(bif.center, &mut arms, options.trim_step);
            if outcome.is_resolved() {
                apply_arms(&mut ranges, bif, &arms);
                resolved.push(*bif);
            } else {
                let reason = FallbackReason::Unresolved(outcome);
                log::warn!("bifurcation {}: {reason}, extending tubes", bif.node);
                report.fallback.push((bif.node, reason));
            }
        }

        let mut caps = Vec::new();
        for bif in resolved {
            match cap_at(&topology, &ranges, &bif, sides) {
                Ok(cap) => caps.push((bif, cap)),
                Err(err) => {
                    reset_ends(&mut ranges, &bif);
                    let reason = FallbackReason::Cap(err);
                    log::warn!("bifurcation {}: {reason}, extending tubes", bif.node);
                    report.fallback.push((bif.node, reason));
                }
            }
        }

        let mut mesh = GeomMesh::default();
        let mut tubes: BTreeMap<NodeId, TubeEnds> = BTreeMap::new();
        let samples = factory.sweep_samples().max(2);
        for (&target, branch) in &topology.branches {
            let range = ranges.get(&target).copied().unwrap_or_default();
            let count = ((samples - 1) as f64 * range.span()).ceil().max(1.0) as usize + 1;
            let rings: Vec<Vec<Point3>> = branch
                .sample(range, count)
                .into_iter()
                .map(|(t, _)| ring_at(branch, t, sides))
                .collect();
            let offset = mesh.vertex_count() as u32;
            mesh.append(&sweep_rings(&rings));
            let ring = |r: usize| -> Vec<u32> {
                (0..sides).map(|s| offset + ring_vertex(r, s, sides)).collect()
            };
            tubes.insert(
                target,
                TubeEnds {
                    first: ring(0),
                    last: ring(rings.len() - 1),
                },
            );
        }

        let mut movable = Vec::new();
        for (bif, cap) in &caps {
            if stitch_cap(&mut mesh, &mut movable, &tubes, bif, cap) {
                report.capped.push(bif.node);
                report.cap_points += cap.points.len();
                log::debug!("bifurcation {}: capped with {} points", bif.node, cap.points.len());
            }
        }

        add_end_caps(graph, &topology, &tubes, &mut mesh, sides)?;

        if options.smooth_caps && movable.iter().any(|&m| m) {
            movable.resize(mesh.vertex_count(), false);
            windowed_sinc_smooth(&mut mesh, &movable, options.smoothing);
        }

        if mesh.is_empty() {
            return Err(ModelError::EmptyMesh);
        }
        log::info!(
            "tree model: {} vertices, {} triangles, {} capped, {} fallback bifurcations",
            mesh.vertex_count(),
            mesh.triangle_count(),
            report.capped.len(),
            report.fallback.len()
        );
        Ok(Self { mesh, report })
    }

    pub fn write_obj(&self, path: &Path, name: &str) -> Result<(), ModelError> {
        write_obj(path, &self.mesh, name)?;
        Ok(())
    }
}

/// Shorthand for [`TreeModel::build`].
pub fn generate_model<F>(graph: &VesselGraph, factory: &F, options: &ModelOptions) -> Result<TreeModel, ModelError>
where
    F: BranchFactory + ?Sized,
{
    TreeModel::build(graph, factory, options)
}

/// Ring of `sides` points at parameter `t`, in the branch's canonical frame.
fn ring_at(branch: &Branch, t: f64, sides: usize) -> Vec<Point3> {
    ring_points(branch.evaluate(t), &branch.frame_at(t), branch.radius(), sides)
}

/// Arms oriented away from the bifurcation; the parent branch is swapped.
fn arms_at(
    topology: &BranchTopology,
    ranges: &BTreeMap<NodeId, TrimRange>,
    bif: &Bifurcation,
) -> Option<[Arm; 3]> {
    let [p, c1, c2] = bif.branches;
    let parent_range = ranges.get(&p)?;
    let child = |key: NodeId| -> Option<Arm> {
        let range = ranges.get(&key)?;
        Some(Arm::new(topology.branch(key)?.clone(), range.start, range.end))
    };
    Some([
        Arm::new(
            topology.branch(p)?.swapped(),
            1.0 - parent_range.end,
            1.0 - parent_range.start,
        ),
        child(c1)?,
        child(c2)?,
    ])
}

fn apply_arms(ranges: &mut BTreeMap<NodeId, TrimRange>, bif: &Bifurcation, arms: &[Arm; 3]) {
    let [p, c1, c2] = bif.branches;
    if let Some(range) = ranges.get_mut(&p) {
        range.end = 1.0 - arms[0].t_min;
    }
    for (key, arm) in [(c1, &arms[1]), (c2, &arms[2])] {
        if let Some(range) = ranges.get_mut(&key) {
            range.start = arm.t_min;
        }
    }
}

/// Undoes the trimming of the three ends meeting at `bif`.
fn reset_ends(ranges: &mut BTreeMap<NodeId, TrimRange>, bif: &Bifurcation) {
    let [p, c1, c2] = bif.branches;
    if let Some(range) = ranges.get_mut(&p) {
        range.end = 1.0;
    }
    for key in [c1, c2] {
        if let Some(range) = ranges.get_mut(&key) {
            range.start = 0.0;
        }
    }
}

fn cap_at(
    topology: &BranchTopology,
    ranges: &BTreeMap<NodeId, TrimRange>,
    bif: &Bifurcation,
    sides: usize,
) -> Result<BifurcationCap, CapError> {
    let [p, c1, c2] = bif.branches;
    let end_ring = |key: NodeId, at_end: bool| -> Option<(Vec<Point3>, f64)> {
        let branch = topology.branch(key)?;
        let range = ranges.get(&key)?;
        let t = if at_end { range.end } else { range.start };
        Some((ring_at(branch, t, sides), branch.radius()))
    };
    let (Some(parent), Some(first), Some(second)) =
        (end_ring(p, true), end_ring(c1, false), end_ring(c2, false))
    else {
        return Err(CapError::RingMismatch([0; 3]));
    };
    build_cap(
        bif.center,
        [&parent.0, &first.0, &second.0],
        [parent.1, first.1, second.1],
    )
}

/// Appends `cap` and joins its holes to the tube ends. Returns `false` when a
/// tube is missing, leaving the mesh untouched.
fn stitch_cap(
    mesh: &mut GeomMesh,
    movable: &mut Vec<bool>,
    tubes: &BTreeMap<NodeId, TubeEnds>,
    bif: &Bifurcation,
    cap: &BifurcationCap,
) -> bool {
    let [p, c1, c2] = bif.branches;
    let (Some(parent), Some(first), Some(second)) = (tubes.get(&p), tubes.get(&c1), tubes.get(&c2))
    else {
        return false;
    };

    let offset = mesh.vertex_count() as u32;
    mesh.positions.extend(cap.points.iter().map(|p| p.to_array()));
    for t in &cap.triangles {
        mesh.indices.extend(t.map(|i| offset + i as u32));
    }
    let cap_ring = |i: usize| -> Vec<u32> { cap.ring(i).map(|k| offset + k as u32).collect() };

    // Parent runs into the cap, the children run out of it.
    stitch_ring_indices(&parent.last, &cap_ring(0), &mut mesh.indices);
    stitch_ring_indices(&cap_ring(1), &first.first, &mut mesh.indices);
    stitch_ring_indices(&cap_ring(2), &second.first, &mut mesh.indices);

    movable.resize(mesh.vertex_count(), false);
    let cap_vertices = offset as usize..mesh.vertex_count();
    let rings = parent.last.iter().chain(&first.first).chain(&second.first);
    for v in cap_vertices.chain(rings.map(|&v| v as usize)) {
        movable[v] = true;
    }
    true
}

/// Flat caps at the start of the root branches and the end of every terminal branch.
fn add_end_caps(
    graph: &VesselGraph,
    topology: &BranchTopology,
    tubes: &BTreeMap<NodeId, TubeEnds>,
    mesh: &mut GeomMesh,
    sides: usize,
) -> Result<(), ModelError> {
    let triangles = polygon_cap(sides)?;

    if let Some(root) = graph.root() {
        for child in topology.children_of(graph, root) {
            if let Some(tube) = tubes.get(&child) {
                for &[a, b, c] in &triangles {
                    mesh.indices.extend([tube.first[a], tube.first[c], tube.first[b]]);
                }
            }
        }
    }

    for (&target, tube) in tubes {
        if graph.children(target).is_empty() {
            for &[a, b, c] in &triangles {
                mesh.indices.extend([tube.last[a], tube.last[b], tube.last[c]]);
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::branch::{CurveOptions, CurvedTree, StraightFactory};
    use crate::graph::edge::Edge;

    fn y_tree(child_dx: f64) -> VesselGraph {
        let mut graph = VesselGraph::new();
        let root = graph.add_node(Point3::ORIGIN);
        let split = graph.add_node(Point3::new(0.0, 0.0, 1.0));
        let left = graph.add_node(Point3::new(-child_dx, 0.0, 1.8));
        let right = graph.add_node(Point3::new(child_dx, 0.0, 1.8));
        graph.add_edge(Edge::new(root, split, 0.1)).unwrap();
        graph.add_edge(Edge::new(split, left, 0.07)).unwrap();
        graph.add_edge(Edge::new(split, right, 0.07)).unwrap();
        graph
    }

    #[test]
    fn straight_y_tree_is_capped_and_closed() {
        let graph = y_tree(0.5);
        let options = ModelOptions {
            num_sides: 12,
            ..ModelOptions::default()
        };
        let model = TreeModel::build(&graph, &StraightFactory, &options).unwrap();

        assert_eq!(model.report.capped, vec![NodeId::new(1)]);
        assert!(model.report.fallback.is_empty());
        assert_eq!(model.report.cap_points, 36);
        assert_eq!(model.mesh.vertex_count(), 3 * 2 * 12 + 36);
        assert_eq!(model.mesh.open_edge_count(), 0);
        assert!(model.mesh.validate().is_ok());
        assert!(model.mesh.enclosed_volume() > 0.0);
    }

    #[test]
    fn overlapping_children_fall_back_to_extension() {
        let graph = y_tree(0.001);
        let model = TreeModel::build(&graph, &StraightFactory, &ModelOptions::default()).unwrap();
        assert!(model.report.capped.is_empty());
        assert_eq!(model.report.fallback.len(), 1);
        assert_eq!(model.report.fallback[0].0, NodeId::new(1));
        assert_eq!(model.report.cap_points, 0);
        assert_eq!(model.mesh.vertex_count(), 3 * 2 * 16);
    }

    #[test]
    fn too_few_sides_is_an_error() {
        let options = ModelOptions {
            num_sides: 2,
            ..ModelOptions::default()
        };
        assert!(matches!(
            TreeModel::build(&y_tree(0.5), &StraightFactory, &options),
            Err(ModelError::TooFewSides(2))
        ));
    }

    #[test]
    fn empty_graph_has_no_geometry() {
        let graph = VesselGraph::new();
        assert!(matches!(
            TreeModel::build(&graph, &StraightFactory, &ModelOptions::default()),
            Err(ModelError::EmptyMesh)
        ));
    }

    #[test]
    fn curved_tree_builds_a_valid_mesh() {
        let mut graph = y_tree(0.5);
        let factory = CurvedTree::prepare(&mut graph, CurveOptions::default()).unwrap();
        let model = generate_model(&graph, &factory, &ModelOptions::default()).unwrap();
        assert!(model.mesh.validate().is_ok());
        assert_eq!(model.report.capped.len() + model.report.fallback.len(), 1);
        assert!(model.mesh.vertex_count() > 3 * 2 * 16);
    }
}
