use std::fmt::Write as _;
use std::sync::OnceLock;

use rand::Rng;
use rand::seq::SliceRandom;
use thiserror::Error;

use super::voxel::{GridFrame, Voxel, VoxelGrid, erode, fill_holes, shell_voxels};
use crate::geom::{GeomMesh, gaussian_scatter_to_grid};

#[derive(Debug, Error, Clone, PartialEq)]
pub enum MapError {
    #[error("organ surface has no triangles")]
    EmptySurface,
    #[error("organ surface is invalid: {0}")]
    InvalidSurface(String),
    #[error("grid width must be positive")]
    InvalidGridWidth,
    #[error("organ bounding box is degenerate along x")]
    DegenerateBounds,
    #[error("occupancy map is empty after {0}")]
    EmptyOccupancy(&'static str),
}

/// Voxelization and output parameters of [`PerfusionMap::compute`].
#[derive(Debug, Clone, PartialEq)]
pub struct MapParams {
    /// Cells along x.
    pub grid_width: usize,
    /// Distance normalization, as a fraction of the bounding-box diagonal.
    pub voxelizer_tolerance: f64,
    /// Normalized distance up to which a voxel belongs to the shell.
    pub occupancy_threshold: f64,
    /// Erosion half-size as a fraction of each axis.
    pub erosion_fraction: f64,
    /// Demand value written for every occupied voxel.
    pub fill_value: f64,
    pub supply_parameters: Vec<f64>,
}

impl Default for MapParams {
    fn default() -> Self {
        Self {
            grid_width: 100,
            voxelizer_tolerance: 0.1,
            occupancy_threshold: 0.5,
            erosion_fraction: 1.0 / 20.0,
            fill_value: 1.0,
            supply_parameters: vec![0.65, 1.0, 1.0, 1.0],
        }
    }
}

/// Texts handed to the growth tool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DemandMaps {
    pub demand_map: String,
    pub supply_map: String,
}

/// Eroded occupancy of an organ with its grid.
#[derive(Debug, Clone)]
pub struct PerfusionMap {
    occupancy: VoxelGrid,
    filled_voxels: usize,
    fill_value: f64,
    supply_parameters: Vec<f64>,
    /// Unit-sigma smoothing, filled on the first entry point search.
    support: OnceLock<Vec<f64>>,
}

impl PartialEq for PerfusionMap {
    fn eq(&self, other: &Self) -> bool {
        self.occupancy == other.occupancy
            && self.filled_voxels == other.filled_voxels
            && self.fill_value == other.fill_value
            && self.supply_parameters == other.supply_parameters
    }
}

impl PerfusionMap {
    pub fn compute(surface: &GeomMesh, params: &MapParams) -> Result<Self, MapError> {
        if surface.triangle_count() == 0 {
            return Err(MapError::EmptySurface);
        }
        surface.validate().map_err(MapError::InvalidSurface)?;
        if params.grid_width == 0 {
            return Err(MapError::InvalidGridWidth);
        }
        let bbox = surface.bbox().ok_or(MapError::EmptySurface)?;
        let frame = GridFrame::from_bbox(bbox, params.grid_width).ok_or(MapError::DegenerateBounds)?;

        let scale = params.voxelizer_tolerance * bbox.diagonal();
        let limit = if params.occupancy_threshold >= 1.0 {
            f64::INFINITY
        } else {
            params.occupancy_threshold * scale
        };
        let shell = shell_voxels(surface, frame, limit);
        let filled = fill_holes(&shell);
        if filled.is_empty() {
            return Err(MapError::EmptyOccupancy("hole filling"));
        }

        let half = frame.dims.map(|n| ((params.erosion_fraction * n as f64).round() as usize).max(1));
        let occupancy = erode(&filled, half);
        if occupancy.is_empty() {
            return Err(MapError::EmptyOccupancy("erosion"));
        }
        log::debug!(
            "perfusion map {:?}, pitch {:.5}: {} filled, {} after erosion by {half:?}",
            frame.dims,
            frame.pitch,
            filled.count(),
            occupancy.count()
        );

        Ok(Self {
            filled_voxels: filled.count(),
            occupancy,
            fill_value: params.fill_value,
            supply_parameters: params.supply_parameters.clone(),
            support: OnceLock::new(),
        })
    }

    #[must_use]
    pub fn frame(&self) -> &GridFrame {
        self.occupancy.frame()
    }

    #[must_use]
    pub fn occupancy(&self) -> &VoxelGrid {
        &self.occupancy
    }

    #[must_use]
    pub fn is_occupied(&self, v: Voxel) -> bool {
        self.occupancy.get(v)
    }

    /// Volume of the filled map before erosion, in world units.
    #[must_use]
    pub fn occupied_volume(&self) -> f64 {
        self.filled_voxels as f64 * self.frame().pitch.powi(3)
    }

    #[must_use]
    pub fn demand_map_text(&self) -> String {
        let [nx, ny, nz] = self.frame().dims;
        let mut out = String::new();
        let _ = writeln!(out, "{nx} {ny} {nz}");
        let _ = writeln!(out, "0 0 0 {nx} {ny} {nz}");
        let _ = writeln!(out, "0");
        for [x, y, z] in self.occupancy.occupied() {
            let _ = writeln!(out, "{x} {y} {z} {} {} {}", x + 1, y + 1, z + 1);
            let _ = writeln!(out, "{}", self.fill_value);
        }
        out
    }

    #[must_use]
    pub fn supply_map_text(&self) -> String {
        let [nx, ny, nz] = self.frame().dims;
        let values: Vec<String> = self.supply_parameters.iter().map(f64::to_string).collect();
        format!(
            "{nx} {ny} {nz} {}\n0 0 0 {nx} {ny} {nz}\n{}\n",
            values.len(),
            values.join(" ")
        )
    }

    #[must_use]
    pub fn maps(&self) -> DemandMaps {
        DemandMaps {
            demand_map: self.demand_map_text(),
            supply_map: self.supply_map_text(),
        }
    }

    /// Occupied voxels with an empty voxel (or the grid border) among their
    /// 26 neighbours, shuffled by `rng`.
    pub fn find_boundary_points<R: Rng + ?Sized>(&self, rng: &mut R) -> Vec<Voxel> {
        let mut points: Vec<Voxel> = self
            .occupancy
            .occupied()
            .filter(|&v| self.touches_empty(v))
            .collect();
        points.shuffle(rng);
        points
    }

    fn touches_empty(&self, v: Voxel) -> bool {
        let [x, y, z] = v.map(|c| c as i64);
        (-1..=1).any(|dz| {
            (-1..=1).any(|dy| {
                (-1..=1).any(|dx| {
                    (dx, dy, dz) != (0, 0, 0) && !self.occupancy.get_signed([x + dx, y + dy, z + dz])
                })
            })
        })
    }

    /// Highest occupied z in column `(x, y)`.
    #[must_use]
    pub fn top_z(&self, x: usize, y: usize) -> Option<usize> {
        let [nx, ny, nz] = self.frame().dims;
        if x >= nx || y >= ny {
            return None;
        }
        (0..nz).rev().find(|&z| self.occupancy.get([x, y, z]))
    }

    /// Occupancy smoothed with a Gaussian of `sigma` voxels; cells with no
    /// occupied voxel in range read 0.
    #[must_use]
    pub fn smoothed_occupancy(&self, sigma: f64) -> Vec<f64> {
        let frame = self.frame();
        let samples: Vec<_> = (0..frame.cell_count())
            .map(|i| {
                let v = frame.voxel(i);
                (frame.cell_center(v), if self.occupancy.get(v) { 1.0 } else { 0.0 })
            })
            .collect();
        gaussian_scatter_to_grid(&samples, &frame.scatter_grid(), sigma * frame.pitch)
            .into_iter()
            .map(|v| v.unwrap_or(0.0))
            .collect()
    }

    /// `smoothed_occupancy(1.0)`, computed once per map.
    pub(crate) fn ring_support(&self) -> &[f64] {
        self.support.get_or_init(|| self.smoothed_occupancy(1.0))
    }
}
