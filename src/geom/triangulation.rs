//! Delaunay helpers built on `delaunator`: planar triangulation with
//! recentring, flat polygon caps, and spherical caps through stereographic
//! projection.

use super::Vec3;

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum TriangulationError {
    #[error("need at least 3 points, got {0}")]
    TooFewPoints(usize),
    #[error("points are degenerate (collinear, coincident or non-finite)")]
    Degenerate,
    #[error("projection pole coincides with an input point")]
    PoleOnInput,
}

/// Delaunay triangulation of planar points, returned counter-clockwise.
///
/// Points are recentred on their bounding box and scaled to unit size first so
/// that the predicates keep their precision for tiny or far-away inputs.
pub fn delaunay_2d(points: &[[f64; 2]]) -> Result<Vec<[usize; 3]>, TriangulationError> {
    if points.len() < 3 {
        return Err(TriangulationError::TooFewPoints(points.len()));
    }
    if points.iter().any(|p| !p[0].is_finite() || !p[1].is_finite()) {
        return Err(TriangulationError::Degenerate);
    }

    let (mut min_x, mut min_y) = (f64::INFINITY, f64::INFINITY);
    let (mut max_x, mut max_y) = (f64::NEG_INFINITY, f64::NEG_INFINITY);
    for p in points {
        min_x = min_x.min(p[0]);
        min_y = min_y.min(p[1]);
        max_x = max_x.max(p[0]);
        max_y = max_y.max(p[1]);
    }
    let scale = (max_x - min_x).max(max_y - min_y);
    if !(scale > 0.0) {
        return Err(TriangulationError::Degenerate);
    }
    let cx = 0.5 * (min_x + max_x);
    let cy = 0.5 * (min_y + max_y);

    let normalized: Vec<[f64; 2]> = points
        .iter()
        .map(|p| [(p[0] - cx) / scale, (p[1] - cy) / scale])
        .collect();
    let delaunator_points: Vec<delaunator::Point> = normalized
        .iter()
        .map(|p| delaunator::Point { x: p[0], y: p[1] })
        .collect();

    let triangulation = delaunator::triangulate(&delaunator_points);
    if triangulation.triangles.is_empty() {
        return Err(TriangulationError::Degenerate);
    }

    let triangles = triangulation
        .triangles
        .chunks_exact(3)
        .map(|t| {
            let (a, b, c) = (t[0], t[1], t[2]);
            if signed_area(normalized[a], normalized[b], normalized[c]) < 0.0 {
                [a, c, b]
            } else {
                [a, b, c]
            }
        })
        .collect();
    Ok(triangles)
}

fn signed_area(a: [f64; 2], b: [f64; 2], c: [f64; 2]) -> f64 {
    0.5 * ((b[0] - a[0]) * (c[1] - a[1]) - (b[1] - a[1]) * (c[0] - a[0]))
}

/// Triangulation of a regular polygon with `sides` vertices, numbered
/// counter-clockwise from angle 0. All tube rings share this topology.
pub fn polygon_cap(sides: usize) -> Result<Vec<[usize; 3]>, TriangulationError> {
    if sides < 3 {
        return Err(TriangulationError::TooFewPoints(sides));
    }
    let points: Vec<[f64; 2]> = (0..sides)
        .map(|k| {
            let angle = 2.0 * std::f64::consts::PI * k as f64 / sides as f64;
            [angle.cos(), angle.sin()]
        })
        .collect();

    // Cocircular input: any triangulation is Delaunay, but it must still be complete.
    match delaunay_2d(&points) {
        Ok(triangles) if triangles.len() == sides - 2 => Ok(triangles),
        _ => {
            log::debug!("polygon cap with {sides} sides: using fan triangulation");
            Ok((1..sides - 1).map(|k| [0, k, k + 1]).collect())
        }
    }
}

/// Triangulates points on the unit sphere by stereographic projection from `pole`.
///
/// The result is the convex hull of `directions` without the facets visible from
/// `pole`, i.e. the region around the pole is left open. Triangle winding is
/// not adjusted; callers orient against their own reference.
pub fn stereographic_triangulation(
    directions: &[Vec3],
    pole: Vec3,
) -> Result<Vec<[usize; 3]>, TriangulationError> {
    let pole = pole.normalized().ok_or(TriangulationError::Degenerate)?;
    let e1 = pole.any_perpendicular().ok_or(TriangulationError::Degenerate)?;
    let e2 = pole.cross(e1);

    let mut projected = Vec::with_capacity(directions.len());
    for dir in directions {
        let d = dir.normalized().ok_or(TriangulationError::Degenerate)?;
        let denom = 1.0 - d.dot(pole);
        if denom <= 1e-12 {
            return Err(TriangulationError::PoleOnInput);
        }
        projected.push([d.dot(e1) / denom, d.dot(e2) / denom]);
    }

    delaunay_2d(&projected)
}
