//! Tube sweeping: circular rings along a rail, joined into an open tube mesh.
//!
//! Frames are parallel transported along the rail so consecutive rings do not
//! twist. Rings are ordered counter-clockwise around the tangent, which makes
//! the side quads outward facing.

use super::{GeomMesh, Point3, Tolerance, Vec3};

/// Orthonormal frame attached to a point of a rail.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RingFrame {
    pub tangent: Vec3,
    pub normal: Vec3,
    pub binormal: Vec3,
}

impl RingFrame {
    /// Frame with an arbitrary (but deterministic) normal around `tangent`.
    #[must_use]
    pub fn from_tangent(tangent: Vec3) -> Option<Self> {
        let tangent = tangent.normalized()?;
        let normal = tangent.any_perpendicular()?;
        let binormal = tangent.cross(normal).normalized()?;
        Some(Self {
            tangent,
            normal,
            binormal,
        })
    }

    /// Parallel transport of this frame onto `new_tangent`.
    #[must_use]
    pub fn transported(&self, new_tangent: Vec3, tol: Tolerance) -> Self {
        let Some(new_tangent) = new_tangent.normalized() else {
            return *self;
        };
        let cross = self.tangent.cross(new_tangent);

        if cross.length_squared() < tol.eps_squared() {
            if self.tangent.dot(new_tangent) < 0.0 {
                return Self {
                    tangent: new_tangent,
                    normal: -self.normal,
                    binormal: -self.binormal,
                };
            }
            return Self {
                tangent: new_tangent,
                ..*self
            };
        }

        let axis = cross.normalized().unwrap_or(Vec3::Z);
        let angle = self.tangent.dot(new_tangent).clamp(-1.0, 1.0).acos();
        let normal = self
            .normal
            .rotated_around(axis, angle)
            .normalized()
            .unwrap_or(self.normal);
        let binormal = new_tangent
            .cross(normal)
            .normalized()
            .unwrap_or(self.binormal);

        Self {
            tangent: new_tangent,
            normal,
            binormal,
        }
    }
}

/// `sides` points on the circle of `radius` around `center` in the plane of `frame`.
#[must_use]
pub fn ring_points(center: Point3, frame: &RingFrame, radius: f64, sides: usize) -> Vec<Point3> {
    (0..sides)
        .map(|seg| {
            let angle = 2.0 * std::f64::consts::PI * seg as f64 / sides as f64;
            center + frame.normal * (radius * angle.cos()) + frame.binormal * (radius * angle.sin())
        })
        .collect()
}

/// Parallel-transported frames along `rail`, starting from `initial`.
#[must_use]
pub fn transport_frames(rail: &[Point3], initial: RingFrame, tol: Tolerance) -> Vec<RingFrame> {
    let mut frames = Vec::with_capacity(rail.len());
    let mut current = initial;
    for i in 0..rail.len() {
        let tangent = if rail.len() < 2 {
            current.tangent
        } else if i == 0 {
            rail[1] - rail[0]
        } else if i + 1 == rail.len() {
            rail[i] - rail[i - 1]
        } else {
            (rail[i + 1] - rail[i]) + (rail[i] - rail[i - 1])
        };
        if i > 0 || !tol.is_zero_vec3(tangent) {
            current = current.transported(tangent, tol);
        }
        frames.push(current);
    }
    frames
}

/// Index of vertex `seg` of ring `ring` in a tube built by [`sweep_rings`].
#[must_use]
pub fn ring_vertex(ring: usize, seg: usize, sides: usize) -> u32 {
    (ring * sides + seg % sides) as u32
}

/// Triangles joining two rings of equal size, outward for counter-clockwise rings
/// where `next` lies further along the tangent than `current`.
pub fn stitch_ring_indices(current: &[u32], next: &[u32], indices: &mut Vec<u32>) {
    let sides = current.len().min(next.len());
    for seg in 0..sides {
        let seg_next = (seg + 1) % sides;
        let i0 = current[seg];
        let i1 = current[seg_next];
        let i2 = next[seg_next];
        let i3 = next[seg];
        indices.extend_from_slice(&[i0, i1, i2]);
        indices.extend_from_slice(&[i0, i2, i3]);
    }
}

/// Open tube through consecutive rings (no end caps).
#[must_use]
pub fn sweep_rings(rings: &[Vec<Point3>]) -> GeomMesh {
    let sides = rings.first().map_or(0, Vec::len);
    let positions: Vec<[f64; 3]> = rings
        .iter()
        .flat_map(|ring| ring.iter().map(|p| p.to_array()))
        .collect();

    let mut indices = Vec::with_capacity(rings.len().saturating_sub(1) * sides * 6);
    for r in 1..rings.len() {
        let current: Vec<u32> = (0..sides).map(|s| ring_vertex(r - 1, s, sides)).collect();
        let next: Vec<u32> = (0..sides).map(|s| ring_vertex(r, s, sides)).collect();
        stitch_ring_indices(&current, &next, &mut indices);
    }

    GeomMesh::new(positions, indices)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geom::triangle_normal;

    #[test]
    fn frame_is_orthonormal_and_right_handed() {
        let frame = RingFrame::from_tangent(Vec3::new(1.0, 2.0, 3.0)).unwrap();
        assert!(frame.tangent.dot(frame.normal).abs() < 1e-12);
        assert!(frame.tangent.dot(frame.binormal).abs() < 1e-12);
        assert!((frame.normal.cross(frame.binormal) - frame.tangent).length() < 1e-12);
    }

    #[test]
    fn transport_keeps_normal_perpendicular() {
        let rail: Vec<Point3> = (0..20)
            .map(|i| {
                let t = i as f64 * 0.2;
                Point3::new(t.cos(), t.sin(), 0.3 * t)
            })
            .collect();
        let initial = RingFrame::from_tangent(rail[1] - rail[0]).unwrap();
        let frames = transport_frames(&rail, initial, Tolerance::DEFAULT);
        assert_eq!(frames.len(), rail.len());
        for frame in frames {
            assert!(frame.tangent.dot(frame.normal).abs() < 1e-9);
        }
    }

    #[test]
    fn swept_tube_faces_outward() {
        let frame = RingFrame::from_tangent(Vec3::Z).unwrap();
        let rings = vec![
            ring_points(Point3::ORIGIN, &frame, 0.5, 8),
            ring_points(Point3::new(0.0, 0.0, 1.0), &frame, 0.5, 8),
        ];
        let mesh = sweep_rings(&rings);
        assert_eq!(mesh.triangle_count(), 16);
        for [a, b, c] in mesh.triangles() {
            let centroid = Point3::centroid(&[a, b, c]).unwrap();
            let radial = Vec3::new(centroid.x, centroid.y, 0.0);
            assert!(triangle_normal(a, b, c).dot(radial) > 0.0);
        }
    }
}
