//! Scatter-to-grid interpolation kernels.

use super::Point3;

/// Regular grid description used by the scatter kernels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScatterGrid {
    pub origin: Point3,
    pub pitch: f64,
    pub dims: [usize; 3],
}

impl ScatterGrid {
    #[must_use]
    pub fn cell_count(&self) -> usize {
        self.dims[0] * self.dims[1] * self.dims[2]
    }

    #[must_use]
    pub fn cell_center(&self, i: usize, j: usize, k: usize) -> Point3 {
        Point3::new(
            self.origin.x + (i as f64 + 0.5) * self.pitch,
            self.origin.y + (j as f64 + 0.5) * self.pitch,
            self.origin.z + (k as f64 + 0.5) * self.pitch,
        )
    }

    #[must_use]
    pub fn index(&self, i: usize, j: usize, k: usize) -> usize {
        (k * self.dims[1] + j) * self.dims[0] + i
    }
}

/// Gaussian-weighted scatter of `(point, value)` samples onto `grid`.
///
/// Each cell receives `Σ w·v / Σ w` over samples within `3σ`, with
/// `w = exp(-d² / 2σ²)`. Cells with no sample in range are `None`.
#[must_use]
pub fn gaussian_scatter_to_grid(
    samples: &[(Point3, f64)],
    grid: &ScatterGrid,
    sigma: f64,
) -> Vec<Option<f64>> {
    let cells = grid.cell_count();
    let mut weighted = vec![0.0; cells];
    let mut weights = vec![0.0; cells];
    if sigma <= 0.0 || !sigma.is_finite() || grid.pitch <= 0.0 {
        return vec![None; cells];
    }

    let cutoff = 3.0 * sigma;
    let reach = (cutoff / grid.pitch).ceil() as i64;
    let inv_two_sigma_sq = 1.0 / (2.0 * sigma * sigma);

    for &(point, value) in samples {
        if !point.is_finite() || !value.is_finite() {
            continue;
        }
        let ci = ((point.x - grid.origin.x) / grid.pitch).floor() as i64;
        let cj = ((point.y - grid.origin.y) / grid.pitch).floor() as i64;
        let ck = ((point.z - grid.origin.z) / grid.pitch).floor() as i64;

        for k in (ck - reach)..=(ck + reach) {
            if k < 0 || k >= grid.dims[2] as i64 {
                continue;
            }
            for j in (cj - reach)..=(cj + reach) {
                if j < 0 || j >= grid.dims[1] as i64 {
                    continue;
                }
                for i in (ci - reach)..=(ci + reach) {
                    if i < 0 || i >= grid.dims[0] as i64 {
                        continue;
                    }
                    let (i, j, k) = (i as usize, j as usize, k as usize);
                    let d_sq = grid.cell_center(i, j, k).distance_squared_to(point);
                    if d_sq > cutoff * cutoff {
                        continue;
                    }
                    let w = (-d_sq * inv_two_sigma_sq).exp();
                    let idx = grid.index(i, j, k);
                    weighted[idx] += w * value;
                    weights[idx] += w;
                }
            }
        }
    }

    weighted
        .into_iter()
        .zip(weights)
        .map(|(sum, w)| (w > 0.0).then(|| sum / w))
        .collect()
}
