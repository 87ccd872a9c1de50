mod bvh;
mod convert;
mod core;
mod interpolate;
mod mesh;
mod obj;
mod smooth;
mod triangulation;
mod tube;

pub use bvh::Bvh;
pub use convert::{ConvertError, NumericBuffer, points_from_buffer, points_from_flat, points_to_flat};
pub use core::{
    BBox, Point3, Tolerance, Vec3, closest_point_triangle, distance_point_polyline,
    distance_point_segment, distance_point_triangle,
};
pub use interpolate::{ScatterGrid, gaussian_scatter_to_grid};
pub use mesh::{GeomMesh, positions_flat, triangle_normal};
pub use obj::{ObjError, obj_string, parse_obj, read_obj, write_obj};
pub use smooth::{SmoothOptions, vertex_neighbours, windowed_sinc_smooth};
pub use triangulation::{
    TriangulationError, delaunay_2d, polygon_cap, stereographic_triangulation,
};
pub use tube::{
    RingFrame, ring_points, ring_vertex, stitch_ring_indices, sweep_rings, transport_frames,
};

#[cfg(test)]
mod tests;
