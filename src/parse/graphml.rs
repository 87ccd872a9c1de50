//! GraphML-formaat van externe vaatanalyse-tools.
//!
//! Knoopcoördinaten staan in `v_X`/`v_Y`/`v_Z`, de straal in `e_radius_avg`.
//! Overige `v_*`/`e_*` sleutels worden alleen overgenomen als ze op de
//! allow-list staan. Ongerichte grafen worden georiënteerd met
//! [`crate::graph::orient::orient_edges`].

use std::collections::{BTreeSet, HashMap};

use quick_xml::de::from_str;
use serde::{Deserialize, Serialize};

use super::{ParseError, ParseResult, numeric_suffix, strip_xml_prolog};
use crate::geom::Point3;
use crate::graph::VesselGraph;
use crate::graph::edge::Edge;
use crate::graph::node::{Node, NodeId};
use crate::graph::orient::orient_edges;

const NODE_PREFIX: &str = "v_";
const EDGE_PREFIX: &str = "e_";
const KEY_X: &str = "v_X";
const KEY_Y: &str = "v_Y";
const KEY_Z: &str = "v_Z";
const KEY_RADIUS: &str = "e_radius_avg";
const GRAPHML_NS: &str = "http://graphml.graphdrawing.org/xmlns";

/// Extra attribuutnamen (zonder `v_`/`e_` prefix) die bij het lezen behouden blijven.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AttributeAllowList {
    pub node: BTreeSet<String>,
    pub edge: BTreeSet<String>,
}

impl AttributeAllowList {
    #[must_use]
    pub fn new<N, E>(node: N, edge: E) -> Self
    where
        N: IntoIterator,
        N::Item: Into<String>,
        E: IntoIterator,
        E::Item: Into<String>,
    {
        Self {
            node: node.into_iter().map(Into::into).collect(),
            edge: edge.into_iter().map(Into::into).collect(),
        }
    }
}

pub fn parse_graphml_str(input: &str, allow: &AttributeAllowList) -> ParseResult<VesselGraph> {
    let document: GraphmlDocument = from_str(strip_xml_prolog(input))?;
    let GraphmlGraph {
        edgedefault,
        mut nodes,
        edges,
        ..
    } = document.graph;
    let undirected = edgedefault.trim().eq_ignore_ascii_case("undirected");
    log::debug!(
        "GraphML document met {} knopen, {} verbindingen (ongericht: {undirected})",
        nodes.len(),
        edges.len()
    );

    if nodes.iter().all(|n| numeric_suffix(&n.id).is_some()) {
        nodes.sort_by_key(|n| numeric_suffix(&n.id));
    }

    let mut graph = VesselGraph::new();
    let mut ids: HashMap<String, NodeId> = HashMap::with_capacity(nodes.len());
    for raw in nodes {
        let key = raw.id.trim().to_owned();
        let node = build_node(&raw, allow)?;
        ids.insert(key, graph.push_node(node));
    }

    for raw in edges {
        let lookup = |key: &str| {
            ids.get(key.trim())
                .copied()
                .ok_or_else(|| ParseError::UnknownNodeId(key.trim().to_owned()))
        };
        let edge = build_edge(lookup(&raw.source)?, lookup(&raw.target)?, &raw, allow)?;
        graph.add_edge(edge)?;
    }

    if undirected {
        orient_edges(&mut graph);
    }
    graph.validate_tree()?;
    Ok(graph)
}

fn build_node(raw: &GraphmlNode, allow: &AttributeAllowList) -> ParseResult<Node> {
    let mut coords = [None; 3];
    let mut node = Node::default();
    for data in &raw.data {
        let key = data.key.trim();
        let slot = [KEY_X, KEY_Y, KEY_Z].iter().position(|k| *k == key);
        match slot {
            Some(axis) => coords[axis] = Some(data.value()?),
            None => {
                let name = key.strip_prefix(NODE_PREFIX).unwrap_or(key);
                if allow.node.contains(name) {
                    node.extra.insert(name.to_owned(), data.value()?);
                }
            }
        }
    }

    let missing = |axis: usize| ParseError::MissingAttribute {
        element: format!("node {}", raw.id.trim()),
        attribute: [KEY_X, KEY_Y, KEY_Z][axis].to_owned(),
    };
    node.position = Point3::new(
        coords[0].ok_or_else(|| missing(0))?,
        coords[1].ok_or_else(|| missing(1))?,
        coords[2].ok_or_else(|| missing(2))?,
    );
    Ok(node)
}

fn build_edge(
    source: NodeId,
    target: NodeId,
    raw: &GraphmlEdge,
    allow: &AttributeAllowList,
) -> ParseResult<Edge> {
    let mut radius = None;
    let mut edge = Edge::new(source, target, 0.0);
    for data in &raw.data {
        let key = data.key.trim();
        if key == KEY_RADIUS {
            radius = Some(data.value()?);
            continue;
        }
        let name = key.strip_prefix(EDGE_PREFIX).unwrap_or(key);
        if allow.edge.contains(name) {
            edge.set_attribute(name, data.value()?);
        }
    }
    edge.radius = radius.ok_or_else(|| ParseError::MissingAttribute {
        element: format!("edge {source}->{target}"),
        attribute: KEY_RADIUS.to_owned(),
    })?;
    Ok(edge)
}

/// Serialiseert naar gerichte GraphML. Sleutels worden gedeclareerd voor elk
/// attribuut dat op de eerste knoop resp. eerste verbinding aanwezig is.
pub fn to_graphml_string(graph: &VesselGraph) -> ParseResult<String> {
    let node_extra: Vec<String> = graph
        .nodes()
        .first()
        .map(|n| n.extra.keys().cloned().collect())
        .unwrap_or_default();
    let edge_extra: Vec<String> = graph
        .edges()
        .first()
        .map(|e| e.attributes().into_iter().map(|(name, _)| name).collect())
        .unwrap_or_default();

    let mut keys = vec![
        GraphmlKey::double(KEY_X, "node", "X"),
        GraphmlKey::double(KEY_Y, "node", "Y"),
        GraphmlKey::double(KEY_Z, "node", "Z"),
    ];
    keys.extend(
        node_extra
            .iter()
            .map(|n| GraphmlKey::double(&format!("{NODE_PREFIX}{n}"), "node", n)),
    );
    keys.push(GraphmlKey::double(KEY_RADIUS, "edge", "radius_avg"));
    keys.extend(
        edge_extra
            .iter()
            .map(|n| GraphmlKey::double(&format!("{EDGE_PREFIX}{n}"), "edge", n)),
    );

    let nodes = graph
        .nodes()
        .iter()
        .map(|node| {
            let p = node.position;
            let mut data = vec![
                GraphmlData::new(KEY_X, p.x),
                GraphmlData::new(KEY_Y, p.y),
                GraphmlData::new(KEY_Z, p.z),
            ];
            data.extend(node_extra.iter().filter_map(|name| {
                node.extra
                    .get(name)
                    .map(|v| GraphmlData::new(&format!("{NODE_PREFIX}{name}"), *v))
            }));
            GraphmlNode {
                id: node.id.to_string(),
                data,
            }
        })
        .collect();

    let edges = graph
        .edges()
        .iter()
        .map(|edge| {
            let mut data = vec![GraphmlData::new(KEY_RADIUS, edge.radius)];
            data.extend(edge_extra.iter().filter_map(|name| {
                edge.attribute(name)
                    .map(|v| GraphmlData::new(&format!("{EDGE_PREFIX}{name}"), v))
            }));
            GraphmlEdge {
                source: edge.source.to_string(),
                target: edge.target.to_string(),
                data,
            }
        })
        .collect();

    let document = GraphmlDocument {
        xmlns: Some(GRAPHML_NS.to_owned()),
        keys,
        graph: GraphmlGraph {
            id: Some("G".to_owned()),
            edgedefault: "directed".to_owned(),
            nodes,
            edges,
        },
    };

    let body = quick_xml::se::to_string_with_root("graphml", &document)
        .map_err(|e| ParseError::Write(e.to_string()))?;
    Ok(format!("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n{body}\n"))
}

#[derive(Debug, Serialize, Deserialize)]
struct GraphmlDocument {
    #[serde(rename = "@xmlns", default, skip_serializing_if = "Option::is_none")]
    xmlns: Option<String>,
    #[serde(rename = "key", default)]
    keys: Vec<GraphmlKey>,
    graph: GraphmlGraph,
}

#[derive(Debug, Serialize, Deserialize)]
struct GraphmlKey {
    #[serde(rename = "@id")]
    id: String,
    #[serde(rename = "@for", default)]
    domain: String,
    #[serde(rename = "@attr.name", default)]
    attr_name: String,
    #[serde(rename = "@attr.type", default)]
    attr_type: String,
}

impl GraphmlKey {
    fn double(id: &str, domain: &str, name: &str) -> Self {
        Self {
            id: id.to_owned(),
            domain: domain.to_owned(),
            attr_name: name.to_owned(),
            attr_type: "double".to_owned(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct GraphmlGraph {
    #[serde(rename = "@id", default, skip_serializing_if = "Option::is_none")]
    id: Option<String>,
    #[serde(rename = "@edgedefault", default = "default_edgedefault")]
    edgedefault: String,
    #[serde(rename = "node", default)]
    nodes: Vec<GraphmlNode>,
    #[serde(rename = "edge", default)]
    edges: Vec<GraphmlEdge>,
}

fn default_edgedefault() -> String {
    "directed".to_owned()
}

#[derive(Debug, Serialize, Deserialize)]
struct GraphmlNode {
    #[serde(rename = "@id")]
    id: String,
    #[serde(rename = "data", default)]
    data: Vec<GraphmlData>,
}

#[derive(Debug, Serialize, Deserialize)]
struct GraphmlEdge {
    #[serde(rename = "@source")]
    source: String,
    #[serde(rename = "@target")]
    target: String,
    #[serde(rename = "data", default)]
    data: Vec<GraphmlData>,
}

#[derive(Debug, Serialize, Deserialize)]
struct GraphmlData {
    #[serde(rename = "@key")]
    key: String,
    #[serde(rename = "$text", default)]
    text: String,
}

impl GraphmlData {
    fn new(key: &str, value: f64) -> Self {
        Self {
            key: key.to_owned(),
            text: value.to_string(),
        }
    }

    fn value(&self) -> ParseResult<f64> {
        Ok(self.text.trim().parse()?)
    }
}
