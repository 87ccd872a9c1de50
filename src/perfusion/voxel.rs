//! Voxel grid with cubic cells: surface shell, hole filling and box erosion.

use std::collections::VecDeque;

use crate::geom::{BBox, Bvh, GeomMesh, Point3, ScatterGrid, distance_point_triangle};

/// Integer grid coordinates `[x, y, z]`.
pub type Voxel = [usize; 3];

/// Discrete coordinate system of a perfusion map. Voxel `[i, j, k]` spans
/// `origin + [i, j, k] * pitch ..= origin + [i + 1, j + 1, k + 1] * pitch`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridFrame {
    pub origin: Point3,
    pub pitch: f64,
    pub dims: [usize; 3],
}

impl GridFrame {
    /// Grid over `bbox` with exactly `grid_width` cells along x.
    #[must_use]
    pub fn from_bbox(bbox: BBox, grid_width: usize) -> Option<Self> {
        let size = bbox.size();
        if grid_width == 0 || !(size.x > 0.0) || !size.is_finite() {
            return None;
        }
        let pitch = size.x / grid_width as f64;
        let cells = |extent: f64| ((extent / pitch) - 1e-9).ceil().max(1.0) as usize;
        Some(Self {
            origin: bbox.min,
            pitch,
            dims: [grid_width, cells(size.y), cells(size.z)],
        })
    }

    #[must_use]
    pub fn cell_count(&self) -> usize {
        self.dims[0] * self.dims[1] * self.dims[2]
    }

    #[must_use]
    pub fn index(&self, v: Voxel) -> usize {
        (v[2] * self.dims[1] + v[1]) * self.dims[0] + v[0]
    }

    #[must_use]
    pub fn voxel(&self, index: usize) -> Voxel {
        let [nx, ny, _] = self.dims;
        [index % nx, (index / nx) % ny, index / (nx * ny)]
    }

    #[must_use]
    pub fn contains(&self, v: [i64; 3]) -> bool {
        v.iter().zip(self.dims).all(|(&c, n)| c >= 0 && (c as usize) < n)
    }

    #[must_use]
    pub fn cell_center(&self, v: Voxel) -> Point3 {
        self.grid_to_world(Point3::new(
            v[0] as f64 + 0.5,
            v[1] as f64 + 0.5,
            v[2] as f64 + 0.5,
        ))
    }

    /// `origin + p * pitch`.
    #[must_use]
    pub fn grid_to_world(&self, p: Point3) -> Point3 {
        self.origin + p.to_vec3() * self.pitch
    }

    #[must_use]
    pub fn world_to_grid(&self, p: Point3) -> Point3 {
        Point3::from((p - self.origin) / self.pitch)
    }

    #[must_use]
    pub fn scatter_grid(&self) -> ScatterGrid {
        ScatterGrid {
            origin: self.origin,
            pitch: self.pitch,
            dims: self.dims,
        }
    }
}

/// Boolean occupancy over a [`GridFrame`].
#[derive(Debug, Clone, PartialEq)]
pub struct VoxelGrid {
    frame: GridFrame,
    cells: Vec<bool>,
}

impl VoxelGrid {
    #[must_use]
    pub fn empty(frame: GridFrame) -> Self {
        Self {
            frame,
            cells: vec![false; frame.cell_count()],
        }
    }

    #[must_use]
    pub fn frame(&self) -> &GridFrame {
        &self.frame
    }

    #[must_use]
    pub fn get(&self, v: Voxel) -> bool {
        self.cells[self.frame.index(v)]
    }

    /// Occupancy with cells outside the grid counting as empty.
    #[must_use]
    pub fn get_signed(&self, v: [i64; 3]) -> bool {
        self.frame.contains(v) && self.get([v[0] as usize, v[1] as usize, v[2] as usize])
    }

    pub fn set(&mut self, v: Voxel, value: bool) {
        let index = self.frame.index(v);
        self.cells[index] = value;
    }

    #[must_use]
    pub fn count(&self) -> usize {
        self.cells.iter().filter(|&&c| c).count()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        !self.cells.iter().any(|&c| c)
    }

    /// Occupied voxels in index order (x fastest).
    pub fn occupied(&self) -> impl Iterator<Item = Voxel> + '_ {
        self.cells
            .iter()
            .enumerate()
            .filter(|(_, c)| **c)
            .map(|(i, _)| self.frame.voxel(i))
    }
}

/// Voxels whose centre lies within `limit` of a surface triangle.
#[must_use]
pub fn shell_voxels(surface: &GeomMesh, frame: GridFrame, limit: f64) -> VoxelGrid {
    let triangles: Vec<[Point3; 3]> = surface.triangles().collect();
    let boxes: Vec<BBox> = triangles
        .iter()
        .map(|&[a, b, c]| BBox::new(a, a).expand_point(b).expand_point(c))
        .collect();
    let Some(bvh) = Bvh::build(&boxes) else {
        return VoxelGrid::empty(frame);
    };
    log::debug!("shell over {} triangles, {} cells", triangles.len(), frame.cell_count());

    let near = |index: usize| {
        let p = frame.cell_center(frame.voxel(index));
        bvh.any_within(p, limit, |prim| {
            let [a, b, c] = triangles[prim];
            distance_point_triangle(p, a, b, c) <= limit
        })
    };

    let cells = shell_cells(frame.cell_count(), near);
    VoxelGrid { frame, cells }
}

#[cfg(feature = "parallel")]
fn shell_cells(count: usize, near: impl Fn(usize) -> bool + Sync + Send) -> Vec<bool> {
    use rayon::prelude::*;
    (0..count).into_par_iter().map(near).collect()
}

#[cfg(not(feature = "parallel"))]
fn shell_cells(count: usize, near: impl Fn(usize) -> bool) -> Vec<bool> {
    (0..count).map(near).collect()
}

/// Everything not reachable from the border through empty cells
/// (6-connected) becomes occupied.
#[must_use]
pub fn fill_holes(shell: &VoxelGrid) -> VoxelGrid {
    let frame = shell.frame;
    let [nx, ny, nz] = frame.dims;
    let mut outside = vec![false; frame.cell_count()];
    let mut queue = VecDeque::new();

    for index in 0..frame.cell_count() {
        let [x, y, z] = frame.voxel(index);
        let border = x == 0 || y == 0 || z == 0 || x + 1 == nx || y + 1 == ny || z + 1 == nz;
        if border && !shell.cells[index] {
            outside[index] = true;
            queue.push_back([x, y, z]);
        }
    }

    const STEPS: [[i64; 3]; 6] = [[1, 0, 0], [-1, 0, 0], [0, 1, 0], [0, -1, 0], [0, 0, 1], [0, 0, -1]];
    while let Some(v) = queue.pop_front() {
        for step in STEPS {
            let n = [v[0] as i64 + step[0], v[1] as i64 + step[1], v[2] as i64 + step[2]];
            if !frame.contains(n) {
                continue;
            }
            let n = [n[0] as usize, n[1] as usize, n[2] as usize];
            let index = frame.index(n);
            if !outside[index] && !shell.cells[index] {
                outside[index] = true;
                queue.push_back(n);
            }
        }
    }

    VoxelGrid {
        frame,
        cells: outside.into_iter().map(|o| !o).collect(),
    }
}

/// Erosion by a box of half-size `half` per axis; cells beyond the grid are empty.
#[must_use]
pub fn erode(grid: &VoxelGrid, half: [usize; 3]) -> VoxelGrid {
    let mut cells = grid.cells.clone();
    for axis in 0..3 {
        cells = erode_axis(&grid.frame, &cells, axis, half[axis]);
    }
    VoxelGrid {
        frame: grid.frame,
        cells,
    }
}

/// One-dimensional erosion along `axis` using a running count of occupied cells.
fn erode_axis(frame: &GridFrame, cells: &[bool], axis: usize, half: usize) -> Vec<bool> {
    if half == 0 {
        return cells.to_vec();
    }
    let dims = frame.dims;
    let len = dims[axis];
    let mut out = vec![false; cells.len()];
    let (a1, a2) = match axis {
        0 => (1, 2),
        1 => (0, 2),
        _ => (0, 1),
    };

    let mut prefix = vec![0usize; len + 1];
    for u in 0..dims[a1] {
        for w in 0..dims[a2] {
            let at = |c: usize| {
                let mut v = [0usize; 3];
                v[axis] = c;
                v[a1] = u;
                v[a2] = w;
                frame.index(v)
            };
            for c in 0..len {
                prefix[c + 1] = prefix[c] + usize::from(cells[at(c)]);
            }
            for c in 0..len {
                if c < half || c + half >= len {
                    continue;
                }
                let occupied = prefix[c + half + 1] - prefix[c - half];
                out[at(c)] = occupied == 2 * half + 1;
            }
        }
    }
    out
}
