//! Richting afleiden voor ongerichte invoer.
//!
//! Elke knoop beschouwt zijn dikste aangrenzende verbinding als ouder en alle
//! andere als kinderen. Beide eindpunten stemmen per verbinding; alleen een
//! strikte meerderheid voor omdraaien keert de verbinding om, bij gelijke
//! stand blijft de opgeslagen richting staan.

use super::VesselGraph;
use super::edge::EdgeId;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Votes {
    swap: u32,
    keep: u32,
}

/// Oriënteert alle verbindingen; geeft het aantal omgedraaide verbindingen terug.
pub fn orient_edges(graph: &mut VesselGraph) -> usize {
    let node_count = graph.node_count();
    let mut adjacency: Vec<Vec<EdgeId>> = vec![Vec::new(); node_count];
    for id in graph.edge_ids() {
        let edge = &graph.edges()[id.index()];
        if edge.source == edge.target {
            continue;
        }
        for node in [edge.source, edge.target] {
            if let Some(list) = adjacency.get_mut(node.index()) {
                list.push(id);
            }
        }
    }

    let mut votes = vec![Votes::default(); graph.edge_count()];
    for (node, adjacent) in adjacency.iter().enumerate() {
        let Some(parent) = thickest(graph, adjacent) else {
            continue;
        };
        for &id in adjacent {
            let edge = &graph.edges()[id.index()];
            let points_to_node = edge.target.index() == node;
            let wants_to_node = id == parent;
            let vote = &mut votes[id.index()];
            if points_to_node == wants_to_node {
                vote.keep += 1;
            } else {
                vote.swap += 1;
            }
        }
    }

    let mut swapped = 0;
    for (edge, vote) in graph.edges_mut().iter_mut().zip(&votes) {
        if vote.swap > vote.keep {
            edge.reverse();
            swapped += 1;
        }
    }
    log::debug!("orientation vote swapped {swapped} of {} edges", votes.len());
    swapped
}

/// Eerste verbinding met de grootste straal.
fn thickest(graph: &VesselGraph, adjacent: &[EdgeId]) -> Option<EdgeId> {
    let mut best: Option<(EdgeId, f64)> = None;
    for &id in adjacent {
        let radius = graph.edges()[id.index()].radius;
        match best {
            Some((_, r)) if radius <= r => {}
            _ => best = Some((id, radius)),
        }
    }
    best.map(|(id, _)| id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geom::Point3;
    use crate::graph::edge::Edge;
    use crate::graph::node::NodeId;

    fn scrambled_tree() -> VesselGraph {
        // 0 -> 1 -> {2, 3}, 3 -> {4, 5}; radii shrink towards the leaves.
        // The root edge is stored correctly: a single-edge root always votes
        // against it, so only the other endpoint can keep it.
        let mut graph = VesselGraph::new();
        for i in 0..6 {
            graph.add_node(Point3::new(i as f64, 0.0, 0.0));
        }
        let n = NodeId::new;
        graph.add_edge(Edge::new(n(0), n(1), 1.0)).unwrap();
        graph.add_edge(Edge::new(n(1), n(2), 0.6)).unwrap();
        graph.add_edge(Edge::new(n(3), n(1), 0.8)).unwrap();
        graph.add_edge(Edge::new(n(4), n(3), 0.5)).unwrap();
        graph.add_edge(Edge::new(n(3), n(5), 0.4)).unwrap();
        graph
    }

    #[test]
    fn every_non_root_node_gets_one_parent() {
        let mut graph = scrambled_tree();
        let swapped = orient_edges(&mut graph);
        assert_eq!(swapped, 2);
        assert!(graph.validate_tree().is_ok());
        assert_eq!(graph.root(), Some(NodeId::new(0)));
        for node in 1..graph.node_count() {
            assert_eq!(graph.incoming(NodeId::new(node)).len(), 1);
        }
    }

    #[test]
    fn ties_keep_stored_orientation() {
        // Both endpoints elect the only edge as their parent: one vote each way.
        let mut graph = VesselGraph::new();
        graph.add_node(Point3::ORIGIN);
        graph.add_node(Point3::new(1.0, 0.0, 0.0));
        graph
            .add_edge(Edge::new(NodeId::new(0), NodeId::new(1), 1.0))
            .unwrap();
        let before = graph.clone();
        assert_eq!(orient_edges(&mut graph), 0);
        assert_eq!(graph, before);
    }
}
