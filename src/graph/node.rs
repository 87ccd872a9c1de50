//! Knopen van een vaatboom.

use std::collections::BTreeMap;
use std::fmt;

use crate::geom::Point3;

/// Identifier voor een knoop; tevens de index in [`super::VesselGraph::nodes`].
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Default, Ord, PartialOrd)]
pub struct NodeId(pub usize);

impl NodeId {
    #[must_use]
    pub const fn new(id: usize) -> Self {
        Self(id)
    }

    #[must_use]
    pub const fn index(self) -> usize {
        self.0
    }
}

impl From<usize> for NodeId {
    fn from(value: usize) -> Self {
        Self::new(value)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n{}", self.0)
    }
}

/// Extra benoemde scalaire attributen.
pub type AttributeMap = BTreeMap<String, f64>;

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Node {
    pub id: NodeId,
    pub position: Point3,
    pub extra: AttributeMap,
}

impl Node {
    #[must_use]
    pub fn new(id: NodeId, position: Point3) -> Self {
        Self {
            id,
            position,
            extra: AttributeMap::new(),
        }
    }

    #[must_use]
    pub fn with_extra(mut self, name: impl Into<String>, value: f64) -> Self {
        self.extra.insert(name.into(), value);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_id_displays_like_interchange_ids() {
        assert_eq!(NodeId::new(12).to_string(), "n12");
        let node = Node::new(NodeId::new(3), Point3::new(1.0, 2.0, 3.0)).with_extra("pressure", 4.0);
        assert_eq!(node.extra.get("pressure"), Some(&4.0));
    }
}
