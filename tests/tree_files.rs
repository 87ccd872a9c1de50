use std::fs;
use std::path::PathBuf;

use vascu_engine::branch::{CurveOptions, CurvedTree, StraightFactory};
use vascu_engine::geom::read_obj;
use vascu_engine::graph::VesselGraph;
use vascu_engine::graph::orient::orient_edges;
use vascu_engine::model::{ModelOptions, TreeModel};
use vascu_engine::parse::gxl::parse_gxl_str;

const GROWN: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE gxl SYSTEM "http://www.gupro.de/GXL/gxl-1.0.dtd">
<gxl><graph id="portal_vein" edgeids=" true" edgemode=" directed" hypergraph=" false">
<node id="n0"><attr name=" nodeType"><string> root node </string></attr><attr name=" position"><tup><float>8</float><float>8</float><float>1</float></tup></attr></node>
<node id="n1"><attr name=" position"><tup><float>8</float><float>8</float><float>5</float></tup></attr></node>
<node id="n2"><attr name=" position"><tup><float>5.6</float><float>8</float><float>6.8</float></tup></attr></node>
<node id="n3"><attr name=" position"><tup><float>10.4</float><float>8</float><float>6.8</float></tup></attr></node>
<edge id="e0" to="n1" from="n0"><attr name=" flow"><float>0.0002</float></attr><attr name=" radius"><float>0.2</float></attr></edge>
<edge id="e1" to="n2" from="n1"><attr name=" flow"><float>0.0001</float></attr><attr name=" radius"><float>0.15</float></attr></edge>
<edge id="e2" to="n3" from="n1"><attr name=" flow"><float>0.0001</float></attr><attr name=" radius"><float>0.15</float></attr></edge>
</graph></gxl>"#;

fn grown_tree() -> VesselGraph {
    parse_gxl_str(GROWN).expect("parse gxl")
}

fn scratch(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("vascu_tree_files_{name}_{}", std::process::id()));
    fs::create_dir_all(&dir).expect("scratch dir");
    dir
}

#[test]
fn grown_tree_survives_graphml_round_trip() {
    let dir = scratch("roundtrip");
    let gxl = dir.join("portal_vein.gxl");
    fs::write(&gxl, GROWN).expect("write gxl");

    let graph = VesselGraph::load(&gxl).expect("load gxl");
    assert_eq!(graph.node_count(), 4);
    assert_eq!(graph.edge_count(), 3);
    graph.validate_tree().expect("tree");

    let graphml = dir.join("portal_vein.graphml");
    graph.save_graphml(&graphml).expect("save graphml");
    let reloaded = VesselGraph::load(&graphml).expect("load graphml");
    assert_eq!(reloaded.node_count(), graph.node_count());
    for (a, b) in graph.nodes().iter().zip(reloaded.nodes()) {
        assert!(a.position.distance_to(b.position) < 1e-9);
    }
    for (a, b) in graph.edges().iter().zip(reloaded.edges()) {
        assert_eq!((a.source, a.target), (b.source, b.target));
        assert!((a.radius - b.radius).abs() < 1e-12);
    }

    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn grown_tree_is_saved_back_as_gxl() {
    let dir = scratch("gxl_save");
    let mut graph = grown_tree();
    graph.compute_lengths();
    graph.edges_mut()[2].set_attribute("wall<thickness>", 0.02);
    graph.nodes_mut()[1].extra.insert("pressure".to_owned(), 63_000.5);

    let path = dir.join("saved.gxl");
    graph.save_gxl(&path).expect("save gxl");
    let text = fs::read_to_string(&path).expect("read back");
    assert!(text.contains("wall&lt;thickness&gt;"));

    let reloaded = VesselGraph::load(&path).expect("load saved gxl");
    assert_eq!(reloaded, graph);
    assert_eq!(reloaded.edges()[2].attribute("wall<thickness>"), Some(0.02));

    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn reversed_edges_are_oriented_before_meshing() {
    let mut graph = grown_tree();
    let expected = graph.edges()[1].clone();
    graph.edges_mut()[1].reverse();
    assert!(graph.validate_tree().is_err());

    assert_eq!(orient_edges(&mut graph), 1);
    assert_eq!(graph.edges()[1].source, expected.source);
    assert_eq!(graph.edges()[0].source, graph.nodes()[0].id);
    graph.validate_tree().expect("tree after orientation");
}

#[test]
fn straight_and_curved_models_are_written_as_obj() {
    let dir = scratch("models");
    let options = ModelOptions {
        num_sides: 10,
        ..ModelOptions::default()
    };

    let graph = grown_tree();
    let straight = TreeModel::build(&graph, &StraightFactory, &options).expect("straight");
    let path = dir.join("straight.obj");
    straight.write_obj(&path, "straight").expect("write obj");
    let mesh = read_obj(&path).expect("read obj");
    assert_eq!(mesh.vertex_count(), straight.mesh.vertex_count());
    assert_eq!(mesh.triangle_count(), straight.mesh.triangle_count());

    let mut curved_graph = grown_tree();
    let factory = CurvedTree::prepare(&mut curved_graph, CurveOptions::default()).expect("prepare");
    assert!(curved_graph.edges().iter().all(|e| e.tortuosity.is_some_and(|t| t >= 1.0)));
    let curved = TreeModel::build(&curved_graph, &factory, &options).expect("curved");
    assert!(curved.mesh.validate().is_ok());
    assert!(curved.mesh.vertex_count() > straight.mesh.vertex_count());

    let _ = fs::remove_dir_all(&dir);
}
