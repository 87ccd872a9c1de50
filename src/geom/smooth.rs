//! Windowed-sinc mesh smoothing (Taubin's low-pass filter evaluated with a
//! Chebyshev recursion and a Hamming window).

use std::collections::BTreeSet;

use super::GeomMesh;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SmoothOptions {
    /// Number of Chebyshev terms (filter order).
    pub iterations: usize,
    /// Pass band in `(0, 2)`; smaller values smooth more.
    pub passband: f64,
}

impl Default for SmoothOptions {
    fn default() -> Self {
        Self {
            iterations: 30,
            passband: 0.1,
        }
    }
}

impl SmoothOptions {
    /// Filter coefficients `w_i * c_i`, normalized to sum to one.
    #[must_use]
    pub fn coefficients(&self) -> Vec<f64> {
        let n = self.iterations;
        let passband = self.passband.clamp(1e-6, 2.0);
        let theta_pb = (1.0 - 0.5 * passband).acos();
        let pi = std::f64::consts::PI;

        let mut coeffs: Vec<f64> = (0..=n)
            .map(|i| {
                let c = if i == 0 {
                    theta_pb / pi
                } else {
                    2.0 * (i as f64 * theta_pb).sin() / (i as f64 * pi)
                };
                let w = 0.54 + 0.46 * (i as f64 * pi / (n as f64 + 1.0)).cos();
                c * w
            })
            .collect();

        let sum: f64 = coeffs.iter().sum();
        if sum.abs() > f64::EPSILON {
            for c in &mut coeffs {
                *c /= sum;
            }
        }
        coeffs
    }
}

/// Unique vertex neighbours through triangle edges.
#[must_use]
pub fn vertex_neighbours(mesh: &GeomMesh) -> Vec<Vec<usize>> {
    let mut sets = vec![BTreeSet::new(); mesh.vertex_count()];
    for tri in mesh.indices.chunks_exact(3) {
        let t = [tri[0] as usize, tri[1] as usize, tri[2] as usize];
        for (a, b) in [(t[0], t[1]), (t[1], t[2]), (t[2], t[0])] {
            if a != b && a < sets.len() && b < sets.len() {
                sets[a].insert(b);
                sets[b].insert(a);
            }
        }
    }
    sets.into_iter().map(|s| s.into_iter().collect()).collect()
}

/// Smooths the vertices flagged in `movable`; the others act as fixed anchors.
///
/// `movable` shorter than the vertex list leaves the remaining vertices fixed.
pub fn windowed_sinc_smooth(mesh: &mut GeomMesh, movable: &[bool], options: SmoothOptions) {
    if options.iterations == 0 || mesh.is_empty() {
        return;
    }
    let neighbours = vertex_neighbours(mesh);
    let is_movable = |i: usize| movable.get(i).copied().unwrap_or(false) && !neighbours[i].is_empty();
    let coeffs = options.coefficients();

    let laplacian = |x: &[[f64; 3]], i: usize| -> [f64; 3] {
        if !is_movable(i) {
            return [0.0; 3];
        }
        let nbrs = &neighbours[i];
        let mut avg = [0.0; 3];
        for &j in nbrs {
            for axis in 0..3 {
                avg[axis] += x[j][axis];
            }
        }
        let inv = 1.0 / nbrs.len() as f64;
        [
            avg[0] * inv - x[i][0],
            avg[1] * inv - x[i][1],
            avg[2] * inv - x[i][2],
        ]
    };

    let count = mesh.vertex_count();
    let x0 = mesh.positions.clone();
    let mut x1: Vec<[f64; 3]> = (0..count)
        .map(|i| {
            let d = laplacian(&x0, i);
            [x0[i][0] + 0.5 * d[0], x0[i][1] + 0.5 * d[1], x0[i][2] + 0.5 * d[2]]
        })
        .collect();

    let mut acc: Vec<[f64; 3]> = (0..count)
        .map(|i| {
            [
                coeffs[0] * x0[i][0] + coeffs[1] * x1[i][0],
                coeffs[0] * x0[i][1] + coeffs[1] * x1[i][1],
                coeffs[0] * x0[i][2] + coeffs[1] * x1[i][2],
            ]
        })
        .collect();

    let mut prev = x0.clone();
    for &c in &coeffs[2..] {
        let next: Vec<[f64; 3]> = (0..count)
            .map(|i| {
                let d = laplacian(&x1, i);
                [
                    2.0 * x1[i][0] + d[0] - prev[i][0],
                    2.0 * x1[i][1] + d[1] - prev[i][1],
                    2.0 * x1[i][2] + d[2] - prev[i][2],
                ]
            })
            .collect();
        for (a, p) in acc.iter_mut().zip(&next) {
            for axis in 0..3 {
                a[axis] += c * p[axis];
            }
        }
        prev = std::mem::replace(&mut x1, next);
    }

    for (i, position) in mesh.positions.iter_mut().enumerate() {
        if is_movable(i) {
            *position = acc[i];
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geom::Point3;

    fn grid_mesh(n: usize) -> GeomMesh {
        let mut positions = Vec::new();
        for j in 0..n {
            for i in 0..n {
                positions.push([i as f64, j as f64, 0.0]);
            }
        }
        let mut indices = Vec::new();
        for j in 0..n - 1 {
            for i in 0..n - 1 {
                let a = (j * n + i) as u32;
                let b = a + 1;
                let c = a + n as u32;
                let d = c + 1;
                indices.extend_from_slice(&[a, b, d, a, d, c]);
            }
        }
        GeomMesh::new(positions, indices)
    }

    #[test]
    fn coefficients_are_normalized() {
        let coeffs = SmoothOptions::default().coefficients();
        assert_eq!(coeffs.len(), 31);
        assert!((coeffs.iter().sum::<f64>() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn spike_is_flattened_and_anchors_stay() {
        let n = 7;
        let mut mesh = grid_mesh(n);
        let centre = 3 * n + 3;
        mesh.positions[centre][2] = 1.0;
        let movable: Vec<bool> = (0..n * n)
            .map(|i| {
                let (x, y) = (i % n, i / n);
                x > 0 && y > 0 && x < n - 1 && y < n - 1
            })
            .collect();

        windowed_sinc_smooth(&mut mesh, &movable, SmoothOptions::default());

        assert!(mesh.positions[centre][2] < 0.5);
        assert_eq!(mesh.positions[0], [0.0, 0.0, 0.0]);
        assert!(!mesh.has_invalid_vertices());
    }

    #[test]
    fn flat_patch_is_a_fixed_point() {
        let n = 5;
        let mut mesh = grid_mesh(n);
        let before = mesh.clone();
        let movable = vec![true; n * n];
        // Boundary vertices move inward slightly; interior of a regular grid stays put.
        windowed_sinc_smooth(&mut mesh, &movable, SmoothOptions::default());
        let mid = 2 * n + 2;
        let moved = Point3::from_array(mesh.positions[mid])
            .distance_to(Point3::from_array(before.positions[mid]));
        assert!(moved < 0.2);
        assert!(mesh.positions.iter().all(|p| p[2].abs() < 1e-12));
    }
}
