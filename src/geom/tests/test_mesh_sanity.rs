use crate::geom::{GeomMesh, Point3, obj_string, parse_obj, points_from_flat, positions_flat};

#[test]
fn cuboid_survives_obj_and_flat_buffers() {
    let mesh = GeomMesh::cuboid(Point3::new(-1.0, -1.0, -1.0), Point3::new(1.0, 2.0, 3.0));
    mesh.validate().expect("mesh validate");

    let parsed = parse_obj(&obj_string(&mesh, "organ")).expect("parse");
    assert_eq!(parsed.vertex_count(), 8);
    assert_eq!(parsed.open_edge_count(), 0);
    assert!((parsed.enclosed_volume() - 24.0).abs() < 1e-9);

    let points = points_from_flat(&positions_flat(&parsed)).expect("triples");
    assert_eq!(points.len(), parsed.vertex_count());
    let bbox = parsed.bbox().expect("bbox");
    assert_eq!(bbox.min, Point3::new(-1.0, -1.0, -1.0));
    assert_eq!(bbox.max, Point3::new(1.0, 2.0, 3.0));
}

#[test]
fn validate_rejects_bad_indices_and_nan() {
    let mut mesh = GeomMesh::cuboid(Point3::ORIGIN, Point3::new(1.0, 1.0, 1.0));
    mesh.indices.push(99);
    assert!(mesh.validate().is_err());

    let mut mesh = GeomMesh::cuboid(Point3::ORIGIN, Point3::new(1.0, 1.0, 1.0));
    mesh.positions[3][1] = f64::NAN;
    assert!(mesh.has_invalid_vertices());
    assert!(mesh.validate().is_err());
}
