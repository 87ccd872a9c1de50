use super::{Branch, BranchError, BranchFactory};
use crate::geom::Point3;
use crate::graph::VesselGraph;
use crate::graph::edge::EdgeId;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StraightBranch {
    pub start: Point3,
    pub end: Point3,
    pub radius: f64,
}

impl StraightBranch {
    #[must_use]
    pub fn new(start: Point3, end: Point3, radius: f64) -> Self {
        Self { start, end, radius }
    }

    #[must_use]
    pub fn evaluate(&self, t: f64) -> Point3 {
        if t <= 0.0 {
            self.start
        } else if t >= 1.0 {
            self.end
        } else {
            self.start.lerp(self.end, t)
        }
    }

    #[must_use]
    pub fn swapped(&self) -> Self {
        Self::new(self.end, self.start, self.radius)
    }
}

/// `p1 + t (p2 - p1)`; always succeeds for an existing edge.
#[derive(Debug, Clone, Copy, Default)]
pub struct StraightFactory;

impl BranchFactory for StraightFactory {
    fn make_branch(&self, graph: &VesselGraph, edge: EdgeId) -> Result<Branch, BranchError> {
        let (start, end) = graph.endpoints(edge).ok_or(BranchError::UnknownEdge(edge))?;
        let radius = graph.edge(edge).map_or(0.0, |e| e.radius);
        Ok(Branch::Straight(StraightBranch::new(start, end, radius)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::edge::Edge;

    #[test]
    fn factory_uses_edge_endpoints_and_radius() {
        let mut graph = VesselGraph::new();
        let a = graph.add_node(Point3::new(1.0, 0.0, 0.0));
        let b = graph.add_node(Point3::new(3.0, 0.0, 0.0));
        let id = graph.add_edge(Edge::new(a, b, 0.25)).unwrap();

        let branch = StraightFactory.make_branch(&graph, id).unwrap();
        assert_eq!(branch.evaluate(0.5), Point3::new(2.0, 0.0, 0.0));
        assert_eq!(branch.radius(), 0.25);
        let swapped = branch.swapped();
        assert_eq!(swapped.endpoints(), (Point3::new(3.0, 0.0, 0.0), Point3::new(1.0, 0.0, 0.0)));
        assert!(StraightFactory.make_branch(&graph, EdgeId::new(5)).is_err());
    }
}
