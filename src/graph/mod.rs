//! Kern datastructuren voor vaatbomen: knopen met posities, verbindingen met
//! straal en krommeparameters.

pub mod attributes;
pub mod edge;
pub mod node;
pub mod orient;

use thiserror::Error;

use crate::geom::Point3;
use edge::{Edge, EdgeId};
use node::{Node, NodeId};

/// Graph container; ids zijn indices in `nodes` en `edges`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VesselGraph {
    nodes: Vec<Node>,
    edges: Vec<Edge>,
}

/// Fouten die kunnen optreden bij het opbouwen of valideren van de graph.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
    #[error("knoop {0} niet gevonden in graph")]
    UnknownNode(NodeId),
    #[error("knoop {node} heeft meerdere ouders: {edges:?}")]
    MultipleParents { node: NodeId, edges: Vec<EdgeId> },
    #[error("graph heeft geen wortelknoop")]
    NoRoot,
}

impl VesselGraph {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Voegt een knoop toe met het volgende vrije id.
    pub fn add_node(&mut self, position: Point3) -> NodeId {
        let id = NodeId::new(self.nodes.len());
        self.nodes.push(Node::new(id, position));
        id
    }

    /// Voegt een knoop toe; het id wordt overschreven met de index.
    pub fn push_node(&mut self, mut node: Node) -> NodeId {
        let id = NodeId::new(self.nodes.len());
        node.id = id;
        self.nodes.push(node);
        id
    }

    /// Voeg een verbinding toe tussen twee bestaande knopen.
    pub fn add_edge(&mut self, edge: Edge) -> Result<EdgeId, GraphError> {
        for id in [edge.source, edge.target] {
            if id.index() >= self.nodes.len() {
                return Err(GraphError::UnknownNode(id));
            }
        }
        self.edges.push(edge);
        Ok(EdgeId::new(self.edges.len() - 1))
    }

    #[must_use]
    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.index())
    }

    pub fn node_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(id.index())
    }

    #[must_use]
    pub fn edge(&self, id: EdgeId) -> Option<&Edge> {
        self.edges.get(id.index())
    }

    pub fn edge_mut(&mut self, id: EdgeId) -> Option<&mut Edge> {
        self.edges.get_mut(id.index())
    }

    #[must_use]
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn nodes_mut(&mut self) -> &mut [Node] {
        &mut self.nodes
    }

    #[must_use]
    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn edges_mut(&mut self) -> &mut [Edge] {
        &mut self.edges
    }

    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Positie van een knoop; `None` voor onbekende ids.
    #[must_use]
    pub fn position(&self, id: NodeId) -> Option<Point3> {
        self.node(id).map(|n| n.position)
    }

    /// Endpoints of an edge as positions.
    #[must_use]
    pub fn endpoints(&self, id: EdgeId) -> Option<(Point3, Point3)> {
        let edge = self.edge(id)?;
        Some((self.position(edge.source)?, self.position(edge.target)?))
    }

    /// Uitgaande verbindingen van `node`, in graph-volgorde.
    #[must_use]
    pub fn children(&self, node: NodeId) -> Vec<EdgeId> {
        self.edge_ids().filter(|&e| self.edges[e.index()].source == node).collect()
    }

    /// Alle inkomende verbindingen van `node`.
    #[must_use]
    pub fn incoming(&self, node: NodeId) -> Vec<EdgeId> {
        self.edge_ids().filter(|&e| self.edges[e.index()].target == node).collect()
    }

    /// De enige inkomende verbinding, als die er precies één is.
    #[must_use]
    pub fn parent_edge(&self, node: NodeId) -> Option<EdgeId> {
        match self.incoming(node).as_slice() {
            [single] => Some(*single),
            _ => None,
        }
    }

    /// Eerste knoop zonder inkomende verbinding (bij conventie knoop 0).
    #[must_use]
    pub fn root(&self) -> Option<NodeId> {
        let mut has_parent = vec![false; self.nodes.len()];
        for edge in &self.edges {
            if let Some(flag) = has_parent.get_mut(edge.target.index()) {
                *flag = true;
            }
        }
        has_parent.iter().position(|p| !p).map(NodeId::new)
    }

    pub fn edge_ids(&self) -> impl Iterator<Item = EdgeId> + '_ {
        (0..self.edges.len()).map(EdgeId::new)
    }

    /// Controleert de boom-invarianten: bestaande knopen, hoogstens één ouder
    /// per knoop en een wortel.
    pub fn validate_tree(&self) -> Result<(), GraphError> {
        let mut parents: Vec<Vec<EdgeId>> = vec![Vec::new(); self.nodes.len()];
        for id in self.edge_ids() {
            let edge = &self.edges[id.index()];
            for node in [edge.source, edge.target] {
                if node.index() >= self.nodes.len() {
                    return Err(GraphError::UnknownNode(node));
                }
            }
            parents[edge.target.index()].push(id);
        }

        if let Some((node, edges)) = parents.iter().enumerate().find(|(_, e)| e.len() > 1) {
            return Err(GraphError::MultipleParents {
                node: NodeId::new(node),
                edges: edges.clone(),
            });
        }

        let roots: Vec<usize> = (0..parents.len()).filter(|&n| parents[n].is_empty()).collect();
        match roots.as_slice() {
            [] if !self.nodes.is_empty() => Err(GraphError::NoRoot),
            [] | [_] => Ok(()),
            [first, ..] => {
                log::warn!(
                    "graph has {} nodes without parent, using n{first} as root",
                    roots.len()
                );
                Ok(())
            }
        }
    }
}
