//! Entry points for the three liver trees.
//!
//! The two primary vessels enter on a common plane `x = x_ref`: their y
//! positions are drawn as fractions of the occupied y-range and z is the top
//! of the occupied column. The artery is placed on a square ring around the
//! first primary vessel.

use std::collections::BTreeMap;

use rand::Rng;

use super::map::{MapError, PerfusionMap};
use super::voxel::Voxel;
use crate::geom::Point3;
use crate::vasculature::sampling::TruncatedNormal;

/// Inputs of [`PerfusionMap::find_liver_perforation_points`].
#[derive(Debug, Clone, PartialEq)]
pub struct LiverPerforationRequest {
    /// Names and y-fraction distributions of the two primary vessels.
    pub primary: [(String, TruncatedNormal); 2],
    /// Name of the arterial tree and its ring distance in voxels.
    pub artery: Option<(String, usize)>,
    /// Centroid of a reference vessel surface, in world coordinates.
    pub reference_centroid: Option<Point3>,
    /// Margin kept from both ends of the occupied x-range when drawing `x_ref`.
    pub x_tolerance_fraction: f64,
}

impl PerfusionMap {
    pub fn find_liver_perforation_points<R: Rng + ?Sized>(
        &self,
        request: &LiverPerforationRequest,
        rng: &mut R,
    ) -> Result<BTreeMap<String, Voxel>, MapError> {
        let x = self.reference_plane(request, rng)?;
        let rows = self.occupied_rows(x);
        let (Some(&y_min), Some(&y_max)) = (rows.first(), rows.last()) else {
            return Err(MapError::EmptyOccupancy("plane projection"));
        };

        let mut points = BTreeMap::new();
        let mut first_primary = None;
        for (name, distribution) in &request.primary {
            let fraction = distribution.sample(rng).clamp(0.0, 1.0);
            let target = y_min as f64 + fraction * (y_max - y_min) as f64;
            let y = nearest_row(&rows, target);
            let Some(z) = self.top_z(x, y) else {
                continue;
            };
            first_primary.get_or_insert([x, y, z]);
            points.insert(name.clone(), self.inward([x, y, z]));
        }

        if let Some((name, distance)) = &request.artery {
            let taken: Vec<Voxel> = points.values().copied().collect();
            let free = |p: &Voxel| !taken.contains(p);
            let artery = first_primary
                .and_then(|centre| self.ring_candidate(centre, (*distance).max(1), &free))
                .or_else(|| {
                    log::warn!("no ring position for `{name}`, using a random boundary point");
                    self.find_boundary_points(rng)
                        .into_iter()
                        .map(|p| self.inward(p))
                        .find(free)
                });
            match artery {
                Some(point) => {
                    points.insert(name.clone(), point);
                }
                None => log::warn!("no perforation point for `{name}`"),
            }
        }

        Ok(points)
    }

    /// Plane index from the reference centroid, otherwise uniform within the
    /// occupied x-range shrunk by the tolerance on both sides.
    fn reference_plane<R: Rng + ?Sized>(
        &self,
        request: &LiverPerforationRequest,
        rng: &mut R,
    ) -> Result<usize, MapError> {
        let nx = self.frame().dims[0];
        let xs: Vec<usize> = (0..nx).filter(|&x| !self.occupied_rows(x).is_empty()).collect();
        let (Some(&x_min), Some(&x_max)) = (xs.first(), xs.last()) else {
            return Err(MapError::EmptyOccupancy("plane projection"));
        };

        let wanted = match request.reference_centroid {
            Some(centroid) => self.frame().world_to_grid(centroid).x.floor().max(0.0) as usize,
            None => {
                let tol = (request.x_tolerance_fraction * (x_max - x_min) as f64).round() as usize;
                let (low, high) = (x_min + tol, x_max.saturating_sub(tol));
                if low <= high {
                    rng.random_range(low..=high)
                } else {
                    (x_min + x_max) / 2
                }
            }
        };
        // Snap to the nearest plane that has occupied voxels.
        Ok(nearest_row(&xs, wanted as f64))
    }

    /// One voxel down when that voxel is occupied, so the entry sits inside the organ.
    fn inward(&self, [x, y, z]: Voxel) -> Voxel {
        if z > 0 && self.is_occupied([x, y, z - 1]) {
            [x, y, z - 1]
        } else {
            [x, y, z]
        }
    }

    /// y values with at least one occupied voxel in plane `x`.
    fn occupied_rows(&self, x: usize) -> Vec<usize> {
        let [_, ny, _] = self.frame().dims;
        (0..ny).filter(|&y| self.top_z(x, y).is_some()).collect()
    }

    /// Point on the square ring of Chebyshev radius `distance` around `centre`
    /// with the most occupied surroundings, pulled inward and accepted by `free`.
    fn ring_candidate<F>(&self, centre: Voxel, distance: usize, free: F) -> Option<Voxel>
    where
        F: Fn(&Voxel) -> bool,
    {
        let [nx, ny, _] = self.frame().dims;
        let r = distance as i64;
        let (cx, cy) = (centre[0] as i64, centre[1] as i64);
        let support = self.ring_support();

        let mut best: Option<(f64, Voxel)> = None;
        for dy in -r..=r {
            for dx in -r..=r {
                if dx.abs().max(dy.abs()) != r {
                    continue;
                }
                let (x, y) = (cx + dx, cy + dy);
                if x < 0 || y < 0 || x >= nx as i64 || y >= ny as i64 {
                    continue;
                }
                let (x, y) = (x as usize, y as usize);
                let Some(z) = self.top_z(x, y) else {
                    continue;
                };
                let point = self.inward([x, y, z]);
                if !free(&point) {
                    continue;
                }
                let score = support[self.frame().index([x, y, z])];
                if best.is_none_or(|(s, _)| score > s) {
                    best = Some((score, point));
                }
            }
        }
        best.map(|(_, v)| v)
    }
}

fn nearest_row(rows: &[usize], target: f64) -> usize {
    rows.iter()
        .copied()
        .min_by(|a, b| {
            let da = (*a as f64 - target).abs();
            let db = (*b as f64 - target).abs();
            da.total_cmp(&db)
        })
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geom::GeomMesh;
    use crate::perfusion::MapParams;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn box_map() -> PerfusionMap {
        let organ = GeomMesh::cuboid(Point3::ORIGIN, Point3::new(2.0, 1.0, 1.0));
        let params = MapParams {
            grid_width: 20,
            ..MapParams::default()
        };
        PerfusionMap::compute(&organ, &params).unwrap()
    }

    fn request(artery: Option<usize>) -> LiverPerforationRequest {
        LiverPerforationRequest {
            primary: [
                ("portal".to_owned(), TruncatedNormal::new(0.3, 0.05, 0.0, 1.0)),
                ("hepatic".to_owned(), TruncatedNormal::new(0.7, 0.05, 0.0, 1.0)),
            ],
            artery: artery.map(|d| ("artery".to_owned(), d)),
            reference_centroid: None,
            x_tolerance_fraction: 0.2,
        }
    }

    #[test]
    fn primary_vessels_share_a_plane_below_the_top() {
        let map = box_map();
        let points = map
            .find_liver_perforation_points(&request(None), &mut StdRng::seed_from_u64(11))
            .unwrap();
        let portal = points["portal"];
        let hepatic = points["hepatic"];
        assert_eq!(portal[0], hepatic[0]);
        assert!(portal[1] < hepatic[1]);
        // Top occupied z is 8; pulled one voxel inwards.
        assert_eq!(portal[2], 7);
        assert!(map.is_occupied(portal) && map.is_occupied(hepatic));
        assert!((4..=15).contains(&portal[0]));
    }

    #[test]
    fn artery_sits_on_the_ring() {
        let map = box_map();
        let points = map
            .find_liver_perforation_points(&request(Some(2)), &mut StdRng::seed_from_u64(5))
            .unwrap();
        let portal = points["portal"];
        let artery = points["artery"];
        let dx = portal[0].abs_diff(artery[0]);
        let dy = portal[1].abs_diff(artery[1]);
        assert_eq!(dx.max(dy), 2);
        assert!(map.is_occupied(artery));
    }

    #[test]
    fn reference_centroid_fixes_the_plane() {
        let map = box_map();
        let mut req = request(None);
        req.reference_centroid = Some(Point3::new(0.55, 0.5, 0.5));
        let points = map
            .find_liver_perforation_points(&req, &mut StdRng::seed_from_u64(2))
            .unwrap();
        assert_eq!(points["portal"][0], 5);
    }

    #[test]
    fn unreachable_ring_falls_back_to_the_boundary() {
        let map = box_map();
        let points = map
            .find_liver_perforation_points(&request(Some(100)), &mut StdRng::seed_from_u64(9))
            .unwrap();
        assert!(map.is_occupied(points["artery"]));
    }

    #[test]
    fn boundary_fallback_avoids_the_primary_entries() {
        let map = box_map();
        for seed in 0..20 {
            let points = map
                .find_liver_perforation_points(&request(Some(100)), &mut StdRng::seed_from_u64(seed))
                .unwrap();
            assert_ne!(points["artery"], points["portal"]);
            assert_ne!(points["artery"], points["hepatic"]);
        }
    }
}
