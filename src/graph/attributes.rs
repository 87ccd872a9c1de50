//! Afgeleide geometrische attributen en coördinatentransformaties.

use super::VesselGraph;
use crate::geom::{Point3, Vec3};

/// Sentinel for edges without a defined branching angle.
pub const UNDEFINED_ANGLE: f64 = -1.0;

impl VesselGraph {
    /// Euclidische lengte per verbinding; met `tortuosity` ook `arc_length`.
    /// Overschrijven van eerder berekende lengtes wordt gelogd.
    pub fn compute_lengths(&mut self) {
        let mut overwritten = 0usize;
        let lengths: Vec<Option<f64>> = self
            .edge_ids()
            .map(|id| self.endpoints(id).map(|(a, b)| a.distance_to(b)))
            .collect();

        for (edge, length) in self.edges_mut().iter_mut().zip(lengths) {
            let Some(length) = length else {
                continue;
            };
            if edge.length.is_some() {
                overwritten += 1;
            }
            edge.length = Some(length);
            if let Some(tortuosity) = edge.tortuosity {
                edge.arc_length = Some(length * tortuosity);
            }
        }

        if overwritten > 0 {
            log::warn!("compute_lengths overwrote {overwritten} previously computed edge lengths");
        }
    }

    /// Hoek tussen een verbinding en haar ouderverbinding, in `[0, π]`.
    ///
    /// [`UNDEFINED_ANGLE`] bij de wortel, bij meerdere ouderkandidaten of bij
    /// gedegenereerde richtingen.
    pub fn compute_branching_angles(&mut self) {
        let angles: Vec<f64> = self
            .edge_ids()
            .map(|id| {
                let Some(edge) = self.edge(id) else {
                    return UNDEFINED_ANGLE;
                };
                let Some(parent) = self.parent_edge(edge.source) else {
                    return UNDEFINED_ANGLE;
                };
                let direction = |e| self.endpoints(e).map(|(a, b): (Point3, Point3)| b - a);
                match (direction(parent), direction(id)) {
                    (Some(p), Some(c)) => p.angle_to(c).unwrap_or(UNDEFINED_ANGLE),
                    _ => UNDEFINED_ANGLE,
                }
            })
            .collect();

        for (edge, angle) in self.edges_mut().iter_mut().zip(angles) {
            edge.branching_angle = Some(angle);
        }
    }

    /// `new_origin + pos * scale` voor elke knoop.
    pub fn rescale_and_translate(&mut self, new_origin: Point3, scale: f64) {
        for node in self.nodes_mut() {
            node.position = new_origin + node.position.to_vec3() * scale;
        }
    }

    /// Schaalt de genoemde attributen per naam met de bijbehorende factor.
    /// Ontbrekende attributen worden gelogd, niet als fout behandeld.
    pub fn scale_edge_attributes(&mut self, names: &[&str], factors: &[f64]) {
        if names.len() != factors.len() {
            log::warn!(
                "scale_edge_attributes: {} names but {} factors, extra entries ignored",
                names.len(),
                factors.len()
            );
        }
        let total = self.edge_count();
        for (&name, &factor) in names.iter().zip(factors) {
            let mut missing = 0usize;
            for edge in self.edges_mut() {
                match edge.attribute(name) {
                    Some(value) => edge.set_attribute(name, value * factor),
                    None => missing += 1,
                }
            }
            if missing == total && total > 0 {
                log::warn!("attribute `{name}` missing on all {total} edges, not scaled");
            } else if missing > 0 {
                log::warn!("attribute `{name}` missing on {missing} of {total} edges");
            }
        }
    }

    /// Langste rechte verbinding; 0 voor een lege graph.
    #[must_use]
    pub fn max_edge_length(&self) -> f64 {
        self.edge_ids()
            .filter_map(|id| self.endpoints(id))
            .map(|(a, b)| a.distance_to(b))
            .fold(0.0, f64::max)
    }

    /// Richtingsvector van een verbinding (doel min bron).
    #[must_use]
    pub fn edge_vector(&self, id: super::edge::EdgeId) -> Option<Vec3> {
        self.endpoints(id).map(|(a, b)| b - a)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::edge::EdgeId;
    use crate::graph::node::NodeId;
    use crate::graph::tests::y_tree;

    #[test]
    fn lengths_and_arc_lengths() {
        let mut graph = y_tree();
        graph.edges_mut()[0].tortuosity = Some(1.5);
        graph.compute_lengths();
        assert_eq!(graph.edges()[0].length, Some(1.0));
        assert_eq!(graph.edges()[0].arc_length, Some(1.5));
        assert!(graph.edges()[1].arc_length.is_none());
        // Second pass only overwrites, values stay consistent.
        graph.compute_lengths();
        assert_eq!(graph.edges()[0].arc_length, Some(1.5));
    }

    #[test]
    fn branching_angles_use_parent_direction() {
        let mut graph = y_tree();
        graph.compute_branching_angles();
        assert_eq!(graph.edges()[0].branching_angle, Some(UNDEFINED_ANGLE));
        let expected = (0.5f64).atan2(0.8);
        let left = graph.edges()[1].branching_angle.unwrap();
        assert!((left - expected).abs() < 1e-12);
    }

    #[test]
    fn rescale_maps_grid_to_world() {
        let mut graph = y_tree();
        graph.rescale_and_translate(Point3::new(10.0, 0.0, 0.0), 2.0);
        assert_eq!(
            graph.position(NodeId::new(1)),
            Some(Point3::new(10.0, 0.0, 2.0))
        );
        assert!((graph.max_edge_length() - 2.0).abs() < 1e-12);
        assert_eq!(graph.edge_vector(EdgeId::new(0)), Some(Vec3::new(0.0, 0.0, 2.0)));
    }

    #[test]
    fn scaling_skips_missing_attributes() {
        let mut graph = y_tree();
        graph.edges_mut()[1].extra.insert("flow".to_owned(), 2.0);
        graph.scale_edge_attributes(&["radius", "flow", "absent"], &[10.0, 0.5, 3.0]);
        assert!((graph.edges()[0].radius - 1.0).abs() < 1e-12);
        assert_eq!(graph.edges()[1].extra.get("flow"), Some(&1.0));
        assert!(graph.edges()[2].extra.get("flow").is_none());
        assert!(graph.edges()[2].extra.get("absent").is_none());
    }
}
