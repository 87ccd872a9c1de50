//! Spherical cap joining the three tube ends of a bifurcation.
//!
//! Ring points are projected onto a small sphere around the bifurcation point
//! and triangulated as a convex hull through a stereographic projection from
//! the parent ring's axis. Triangles lying within one ring are cut away so
//! every ring leaves an open hole for its tube.

use thiserror::Error;

use crate::geom::{Point3, TriangulationError, Vec3, stereographic_triangulation, triangle_normal};

#[derive(Debug, Error, Clone, PartialEq)]
pub enum CapError {
    #[error("ring sizes {0:?} differ or have fewer than 3 points")]
    RingMismatch([usize; 3]),
    #[error("cap sphere is degenerate (radius {0})")]
    Degenerate(f64),
    #[error(transparent)]
    Triangulation(#[from] TriangulationError),
    #[error("cap uses {found} of {expected} ring points")]
    PointCount { expected: usize, found: usize },
    #[error("cap has {found} triangles, expected {expected}")]
    TriangleCount { expected: usize, found: usize },
}

/// Cap points and outward triangles. Ring `i` occupies points
/// `i * sides .. (i + 1) * sides`, in the order of the input ring.
#[derive(Debug, Clone, PartialEq)]
pub struct BifurcationCap {
    pub sides: usize,
    pub points: Vec<Point3>,
    pub triangles: Vec<[usize; 3]>,
}

impl BifurcationCap {
    #[must_use]
    pub fn ring(&self, i: usize) -> std::ops::Range<usize> {
        i * self.sides..(i + 1) * self.sides
    }
}

/// Builds the cap for `rings` (parent first) of tubes with `radii` around `center`.
///
/// The sphere radius is half the smallest distance from `center` to a ring
/// centre. Each ring is pushed out by a shell of half its tube radius, scaled
/// to the sphere.
pub fn build_cap(
    center: Point3,
    rings: [&[Point3]; 3],
    radii: [f64; 3],
) -> Result<BifurcationCap, CapError> {
    let sizes = rings.map(<[Point3]>::len);
    let sides = sizes[0];
    if sides < 3 || sizes.iter().any(|&s| s != sides) {
        return Err(CapError::RingMismatch(sizes));
    }

    let mut ring_centres = [Point3::ORIGIN; 3];
    let mut distances = [0.0; 3];
    for i in 0..3 {
        let centre = Point3::centroid(rings[i]).ok_or(CapError::RingMismatch(sizes))?;
        ring_centres[i] = centre;
        distances[i] = centre.distance_to(center);
    }
    let sphere = 0.5 * distances.iter().copied().fold(f64::INFINITY, f64::min);
    if !(sphere > 0.0) || !sphere.is_finite() {
        return Err(CapError::Degenerate(sphere));
    }

    let mut directions = Vec::with_capacity(3 * sides);
    let mut points = Vec::with_capacity(3 * sides);
    for i in 0..3 {
        let shell = sphere * (1.0 + 0.5 * radii[i] / distances[i]);
        for p in rings[i] {
            let dir = (*p - center).normalized().ok_or(CapError::Degenerate(sphere))?;
            directions.push(dir);
            points.push(center + dir * shell);
        }
    }

    let pole = (ring_centres[0] - center)
        .normalized()
        .ok_or(CapError::Degenerate(sphere))?;
    let hull = stereographic_triangulation(&directions, pole)?;

    let ring_of = |v: usize| v / sides;
    let triangles: Vec<[usize; 3]> = hull
        .into_iter()
        .filter(|t| !(ring_of(t[0]) == ring_of(t[1]) && ring_of(t[1]) == ring_of(t[2])))
        .map(|t| orient_outward(t, &points, center))
        .collect();

    let mut used = vec![false; points.len()];
    for t in &triangles {
        for &v in t {
            used[v] = true;
        }
    }
    let found = used.iter().filter(|&&u| u).count();
    if found != 3 * sides {
        return Err(CapError::PointCount {
            expected: 3 * sides,
            found,
        });
    }
    // Hull of 3n points has 6n - 4 facets; three ring caps of n - 2 are removed.
    if triangles.len() != 3 * sides + 2 {
        return Err(CapError::TriangleCount {
            expected: 3 * sides + 2,
            found: triangles.len(),
        });
    }

    Ok(BifurcationCap {
        sides,
        points,
        triangles,
    })
}

fn orient_outward(t: [usize; 3], points: &[Point3], center: Point3) -> [usize; 3] {
    let [a, b, c] = t.map(|i| points[i]);
    let outward: Vec3 = Point3::centroid(&[a, b, c]).map_or(Vec3::ZERO, |m| m - center);
    if triangle_normal(a, b, c).dot(outward) < 0.0 {
        [t[0], t[2], t[1]]
    } else {
        t
    }
}
