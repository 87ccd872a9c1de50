use super::{BBox, Point3, Vec3};

/// Indexed triangle mesh.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct GeomMesh {
    pub positions: Vec<[f64; 3]>,
    pub indices: Vec<u32>,
}

impl GeomMesh {
    #[must_use]
    pub fn new(positions: Vec<[f64; 3]>, indices: Vec<u32>) -> Self {
        Self { positions, indices }
    }

    #[must_use]
    pub fn from_points(points: &[Point3], indices: Vec<u32>) -> Self {
        Self::new(points.iter().map(|p| p.to_array()).collect(), indices)
    }

    #[must_use]
    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    #[must_use]
    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    #[must_use]
    pub fn point(&self, index: u32) -> Point3 {
        Point3::from_array(self.positions[index as usize])
    }

    pub fn points(&self) -> impl Iterator<Item = Point3> + '_ {
        self.positions.iter().copied().map(Point3::from_array)
    }

    pub fn triangles(&self) -> impl Iterator<Item = [Point3; 3]> + '_ {
        self.indices
            .chunks_exact(3)
            .map(|t| [self.point(t[0]), self.point(t[1]), self.point(t[2])])
    }

    #[must_use]
    pub fn bbox(&self) -> Option<BBox> {
        let points: Vec<Point3> = self.points().collect();
        BBox::from_points(&points)
    }

    /// Returns true if any vertex position contains NaN or Inf values.
    #[must_use]
    pub fn has_invalid_vertices(&self) -> bool {
        self.positions
            .iter()
            .any(|p| !p[0].is_finite() || !p[1].is_finite() || !p[2].is_finite())
    }

    #[must_use]
    pub fn has_valid_indices(&self) -> bool {
        let n = self.positions.len() as u32;
        self.indices.iter().all(|&i| i < n)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.indices.len() % 3 != 0 {
            return Err("mesh indices are not a triangle list (len % 3 != 0)".to_string());
        }
        if self.has_invalid_vertices() {
            return Err("mesh has invalid vertex coordinates (NaN/Inf)".to_string());
        }
        if !self.has_valid_indices() {
            return Err("mesh has out-of-bounds vertex indices".to_string());
        }
        Ok(())
    }

    /// Append `other`, offsetting its indices.
    pub fn append(&mut self, other: &Self) {
        let offset = self.positions.len() as u32;
        self.positions.extend_from_slice(&other.positions);
        self.indices.extend(other.indices.iter().map(|i| i + offset));
    }

    /// Enclosed volume by the divergence theorem. Only meaningful for closed,
    /// consistently oriented meshes; the absolute value is returned.
    #[must_use]
    pub fn enclosed_volume(&self) -> f64 {
        let signed: f64 = self
            .triangles()
            .map(|[a, b, c]| a.to_vec3().dot(b.to_vec3().cross(c.to_vec3())) / 6.0)
            .sum();
        signed.abs()
    }

    /// Counts edges used by exactly one triangle.
    #[must_use]
    pub fn open_edge_count(&self) -> usize {
        let mut counts: std::collections::HashMap<(u32, u32), usize> =
            std::collections::HashMap::new();
        for tri in self.indices.chunks_exact(3) {
            for (a, b) in [(tri[0], tri[1]), (tri[1], tri[2]), (tri[2], tri[0])] {
                let key = if a < b { (a, b) } else { (b, a) };
                *counts.entry(key).or_insert(0) += 1;
            }
        }
        counts.values().filter(|&&c| c == 1).count()
    }

    /// Axis-aligned box mesh, outward oriented.
    #[must_use]
    pub fn cuboid(min: Point3, max: Point3) -> Self {
        let corners = [
            [min.x, min.y, min.z],
            [max.x, min.y, min.z],
            [max.x, max.y, min.z],
            [min.x, max.y, min.z],
            [min.x, min.y, max.z],
            [max.x, min.y, max.z],
            [max.x, max.y, max.z],
            [min.x, max.y, max.z],
        ];
        let indices = vec![
            0, 2, 1, 0, 3, 2, // -z
            4, 5, 6, 4, 6, 7, // +z
            0, 1, 5, 0, 5, 4, // -y
            3, 7, 6, 3, 6, 2, // +y
            0, 4, 7, 0, 7, 3, // -x
            1, 2, 6, 1, 6, 5, // +x
        ];
        Self::new(corners.to_vec(), indices)
    }
}

/// Normal of triangle `abc` (not normalized).
#[must_use]
pub fn triangle_normal(a: Point3, b: Point3, c: Point3) -> Vec3 {
    (b - a).cross(c - a)
}

/// Flat `[x0, y0, z0, ...]` view of the position buffer.
#[must_use]
pub fn positions_flat(mesh: &GeomMesh) -> Vec<f64> {
    mesh.positions.iter().flat_map(|p| *p).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cuboid_is_closed_with_expected_volume() {
        let mesh = GeomMesh::cuboid(Point3::ORIGIN, Point3::new(1.0, 2.0, 3.0));
        assert_eq!(mesh.triangle_count(), 12);
        assert_eq!(mesh.open_edge_count(), 0);
        assert!((mesh.enclosed_volume() - 6.0).abs() < 1e-12);
        assert!(mesh.validate().is_ok());
    }

    #[test]
    fn append_offsets_indices() {
        let mut a = GeomMesh::cuboid(Point3::ORIGIN, Point3::new(1.0, 1.0, 1.0));
        let b = a.clone();
        a.append(&b);
        assert_eq!(a.vertex_count(), 16);
        assert_eq!(a.indices[36], 8);
        assert!(a.has_valid_indices());
        assert_eq!(positions_flat(&a).len(), 48);
    }
}
