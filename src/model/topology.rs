//! Branches per edge and the binary bifurcations of a tree.

use std::collections::BTreeMap;

use crate::branch::{Branch, BranchError, BranchFactory};
use crate::geom::Point3;
use crate::graph::VesselGraph;
use crate::graph::edge::EdgeId;
use crate::graph::node::NodeId;

/// Node with one parent edge and exactly two child edges.
///
/// `branches` holds the keys into [`BranchTopology::branches`]:
/// `[parent, child_1, child_2]`. The parent branch is keyed by the
/// bifurcation node itself, since branches are keyed by their target.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bifurcation {
    pub node: NodeId,
    pub branches: [NodeId; 3],
    pub center: Point3,
}

#[derive(Debug, Clone, Default)]
pub struct BranchTopology {
    /// One branch per edge, keyed by the edge's target node.
    pub branches: BTreeMap<NodeId, Branch>,
    pub edges: BTreeMap<NodeId, EdgeId>,
    pub bifurcations: Vec<Bifurcation>,
    /// Nodes with three or more children; their tubes only meet.
    pub multiway: Vec<NodeId>,
}

impl BranchTopology {
    #[must_use]
    pub fn branch(&self, target: NodeId) -> Option<&Branch> {
        self.branches.get(&target)
    }

    /// Target nodes of the branches leaving `node`, in edge order.
    #[must_use]
    pub fn children_of(&self, graph: &VesselGraph, node: NodeId) -> Vec<NodeId> {
        graph
            .children(node)
            .into_iter()
            .filter_map(|e| graph.edge(e).map(|edge| edge.target))
            .collect()
    }
}

impl VesselGraph {
    /// Builds every branch through `factory` and groups the binary bifurcations.
    pub fn build_branch_topology<F>(&self, factory: &F) -> Result<BranchTopology, BranchError>
    where
        F: BranchFactory + ?Sized,
    {
        let mut topology = BranchTopology::default();
        for id in self.edge_ids() {
            let Some(edge) = self.edge(id) else {
                continue;
            };
            let branch = factory.make_branch(self, id)?;
            topology.branches.insert(edge.target, branch);
            topology.edges.insert(edge.target, id);
        }

        for node in self.nodes() {
            let children = topology.children_of(self, node.id);
            match (self.parent_edge(node.id), children.as_slice()) {
                (Some(_), [first, second]) => topology.bifurcations.push(Bifurcation {
                    node: node.id,
                    branches: [node.id, *first, *second],
                    center: node.position,
                }),
                (None, [_, _]) => {
                    log::debug!("{}: split without parent edge, no bifurcation cap", node.id);
                }
                (_, c) if c.len() > 2 => {
                    log::debug!("{}: {} children, tubes are extended instead", node.id, c.len());
                    topology.multiway.push(node.id);
                }
                _ => {}
            }
        }
        Ok(topology)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::branch::StraightFactory;
    use crate::graph::edge::Edge;

    #[test]
    fn groups_binary_splits_only() {
        let mut graph = VesselGraph::new();
        let ids: Vec<NodeId> = [
            Point3::ORIGIN,
            Point3::new(0.0, 0.0, 1.0),
            Point3::new(-1.0, 0.0, 2.0),
            Point3::new(1.0, 0.0, 2.0),
            Point3::new(-2.0, 0.0, 3.0),
            Point3::new(-1.0, 0.0, 3.0),
            Point3::new(0.0, 0.0, 3.0),
        ]
        .into_iter()
        .map(|p| graph.add_node(p))
        .collect();
        for (s, t) in [(0, 1), (1, 2), (1, 3), (2, 4), (2, 5), (2, 6)] {
            graph.add_edge(Edge::new(ids[s], ids[t], 0.1)).unwrap();
        }

        let topology = graph.build_branch_topology(&StraightFactory).unwrap();
        assert_eq!(topology.branches.len(), 6);
        assert_eq!(topology.bifurcations.len(), 1);
        let bif = topology.bifurcations[0];
        assert_eq!(bif.node, ids[1]);
        assert_eq!(bif.branches, [ids[1], ids[2], ids[3]]);
        assert_eq!(bif.center, Point3::new(0.0, 0.0, 1.0));
        assert_eq!(topology.multiway, vec![ids[2]]);
        assert_eq!(topology.edges[&ids[3]], EdgeId::new(2));
    }
}
