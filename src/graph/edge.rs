//! Verbindingen (vaatsegmenten) tussen knopen.

use std::fmt;

use super::node::{AttributeMap, NodeId};
use crate::geom::Vec3;

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Default, Ord, PartialOrd)]
pub struct EdgeId(pub usize);

impl EdgeId {
    #[must_use]
    pub const fn new(id: usize) -> Self {
        Self(id)
    }

    #[must_use]
    pub const fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for EdgeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "e{}", self.0)
    }
}

/// Parameters van een sinus-gegenereerde kromme.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CurveParams {
    /// Maximale laterale uitwijking.
    pub height: f64,
    /// Eenheidsvector waarin de kromme uitwijkt.
    pub direction: Vec3,
}

pub const ATTR_RADIUS: &str = "radius";
pub const ATTR_LENGTH: &str = "length";
pub const ATTR_ARC_LENGTH: &str = "arc_length";
pub const ATTR_TORTUOSITY: &str = "tortuosity";
pub const ATTR_BRANCHING_ANGLE: &str = "branching_angle";
pub const ATTR_CURVE_HEIGHT: &str = "curveHeight";
pub const ATTR_CURVE_DIRECTION: [&str; 3] =
    ["curveDirectionX", "curveDirectionY", "curveDirectionZ"];

#[derive(Debug, Clone, PartialEq)]
pub struct Edge {
    pub source: NodeId,
    pub target: NodeId,
    /// Gemiddelde straal.
    pub radius: f64,
    pub curve: Option<CurveParams>,
    pub tortuosity: Option<f64>,
    pub branching_angle: Option<f64>,
    pub length: Option<f64>,
    pub arc_length: Option<f64>,
    pub extra: AttributeMap,
}

impl Edge {
    #[must_use]
    pub fn new(source: NodeId, target: NodeId, radius: f64) -> Self {
        Self {
            source,
            target,
            radius,
            curve: None,
            tortuosity: None,
            branching_angle: None,
            length: None,
            arc_length: None,
            extra: AttributeMap::new(),
        }
    }

    #[must_use]
    pub fn with_curve(mut self, height: f64, direction: Vec3) -> Self {
        self.curve = Some(CurveParams { height, direction });
        self
    }

    /// Keert de richting om.
    pub fn reverse(&mut self) {
        std::mem::swap(&mut self.source, &mut self.target);
    }

    /// Scalaire waarde van een attribuut op naam, getypte velden eerst.
    #[must_use]
    pub fn attribute(&self, name: &str) -> Option<f64> {
        match name {
            ATTR_RADIUS => Some(self.radius),
            ATTR_LENGTH => self.length,
            ATTR_ARC_LENGTH => self.arc_length,
            ATTR_TORTUOSITY => self.tortuosity,
            ATTR_BRANCHING_ANGLE => self.branching_angle,
            ATTR_CURVE_HEIGHT => self.curve.map(|c| c.height),
            n if n == ATTR_CURVE_DIRECTION[0] => self.curve.map(|c| c.direction.x),
            n if n == ATTR_CURVE_DIRECTION[1] => self.curve.map(|c| c.direction.y),
            n if n == ATTR_CURVE_DIRECTION[2] => self.curve.map(|c| c.direction.z),
            other => self.extra.get(other).copied(),
        }
    }

    /// Zet een attribuut op naam. Onbekende namen belanden in `extra`.
    pub fn set_attribute(&mut self, name: &str, value: f64) {
        match name {
            ATTR_RADIUS => self.radius = value,
            ATTR_LENGTH => self.length = Some(value),
            ATTR_ARC_LENGTH => self.arc_length = Some(value),
            ATTR_TORTUOSITY => self.tortuosity = Some(value),
            ATTR_BRANCHING_ANGLE => self.branching_angle = Some(value),
            ATTR_CURVE_HEIGHT => {
                let curve = self.curve.get_or_insert(CurveParams {
                    height: 0.0,
                    direction: Vec3::ZERO,
                });
                curve.height = value;
            }
            n if ATTR_CURVE_DIRECTION.contains(&n) => {
                let curve = self.curve.get_or_insert(CurveParams {
                    height: 0.0,
                    direction: Vec3::ZERO,
                });
                if n == ATTR_CURVE_DIRECTION[0] {
                    curve.direction.x = value;
                } else if n == ATTR_CURVE_DIRECTION[1] {
                    curve.direction.y = value;
                } else {
                    curve.direction.z = value;
                }
            }
            other => {
                self.extra.insert(other.to_owned(), value);
            }
        }
    }

    /// Alle aanwezige attributen behalve de straal, in vaste volgorde.
    #[must_use]
    pub fn attributes(&self) -> Vec<(String, f64)> {
        let mut out = Vec::new();
        let typed = [
            (ATTR_LENGTH, self.length),
            (ATTR_ARC_LENGTH, self.arc_length),
            (ATTR_TORTUOSITY, self.tortuosity),
            (ATTR_BRANCHING_ANGLE, self.branching_angle),
        ];
        for (name, value) in typed {
            if let Some(value) = value {
                out.push((name.to_owned(), value));
            }
        }
        if let Some(curve) = self.curve {
            out.push((ATTR_CURVE_HEIGHT.to_owned(), curve.height));
            for (name, value) in ATTR_CURVE_DIRECTION.iter().zip(curve.direction.to_array()) {
                out.push(((*name).to_owned(), value));
            }
        }
        out.extend(self.extra.iter().map(|(k, v)| (k.clone(), *v)));
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attributes_resolve_typed_fields_before_extra() {
        let mut edge = Edge::new(NodeId::new(0), NodeId::new(1), 0.5);
        edge.set_attribute("length", 2.0);
        edge.set_attribute("flow", 3.0);
        edge.set_attribute("curveDirectionY", 1.0);

        assert_eq!(edge.attribute("radius"), Some(0.5));
        assert_eq!(edge.length, Some(2.0));
        assert_eq!(edge.attribute("flow"), Some(3.0));
        assert_eq!(edge.curve.unwrap().direction, Vec3::Y);
        assert_eq!(edge.attribute("missing"), None);

        let names: Vec<String> = edge.attributes().into_iter().map(|(n, _)| n).collect();
        assert_eq!(
            names,
            ["length", "curveHeight", "curveDirectionX", "curveDirectionY", "curveDirectionZ", "flow"]
        );
    }

    #[test]
    fn reverse_swaps_endpoints() {
        let mut edge = Edge::new(NodeId::new(4), NodeId::new(7), 1.0);
        edge.reverse();
        assert_eq!((edge.source, edge.target), (NodeId::new(7), NodeId::new(4)));
    }
}
