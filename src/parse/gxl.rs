//! GXL-formaat zoals het groeiprogramma het schrijft.
//!
//! Attribuutnamen beginnen daar met een spatie (`name=" position"`); bij het
//! lezen wordt getrimd, bij het schrijven wordt de spatie weer toegevoegd.

use std::collections::HashMap;

use quick_xml::de::from_str;
use serde::{Deserialize, Serialize};

use super::{ParseError, ParseResult, numeric_suffix, strip_xml_prolog};
use crate::geom::Point3;
use crate::graph::edge::{ATTR_CURVE_DIRECTION, ATTR_CURVE_HEIGHT, ATTR_RADIUS, Edge};
use crate::graph::node::{Node, NodeId};
use crate::graph::VesselGraph;

const ATTR_POSITION: &str = "position";
const ATTR_CURVE_DIRECTION_TUP: &str = "curveDirection";

/// Leest een GXL-document (`<gxl><graph>` of een kale `<graph>`).
pub fn parse_gxl_str(input: &str) -> ParseResult<VesselGraph> {
    let body = strip_xml_prolog(input);
    let graph: GxlGraph = if body.starts_with("<gxl") {
        from_str::<GxlDocument>(body)?.graph
    } else {
        from_str(body)?
    };
    log::debug!(
        "GXL document met {} knopen en {} verbindingen",
        graph.nodes.len(),
        graph.edges.len()
    );
    build_graph(graph)
}

fn build_graph(raw: GxlGraph) -> ParseResult<VesselGraph> {
    let GxlGraph { mut nodes, edges, .. } = raw;

    // Dense ids n0..nN are expected; order by the numeric part when every id has one.
    if nodes.iter().all(|n| numeric_suffix(&n.id).is_some()) {
        nodes.sort_by_key(|n| numeric_suffix(&n.id));
    }

    let mut graph = VesselGraph::new();
    let mut ids: HashMap<String, NodeId> = HashMap::with_capacity(nodes.len());
    for raw_node in nodes {
        let key = raw_node.id.trim().to_owned();
        let node = build_node(raw_node)?;
        let id = graph.push_node(node);
        if numeric_suffix(&key) != Some(id.index()) {
            log::warn!("GXL node `{key}` stored as {id}: ids are not dense from n0");
        }
        ids.insert(key, id);
    }

    for raw_edge in edges {
        let lookup = |key: &str| {
            ids.get(key.trim())
                .copied()
                .ok_or_else(|| ParseError::UnknownNodeId(key.trim().to_owned()))
        };
        let source = lookup(&raw_edge.from)?;
        let target = lookup(&raw_edge.to)?;
        let edge = build_edge(source, target, &raw_edge.attrs)?;
        graph.add_edge(edge)?;
    }

    graph.validate_tree()?;
    Ok(graph)
}

fn build_node(raw: GxlNode) -> ParseResult<Node> {
    let mut position = None;
    let mut node = Node::default();
    for attr in &raw.attrs {
        match attr.name.trim() {
            ATTR_POSITION => position = Some(attr.point()?),
            name => {
                if let Some(value) = attr.scalar()? {
                    node.extra.insert(name.to_owned(), value);
                }
            }
        }
    }
    node.position = position.ok_or_else(|| ParseError::MissingAttribute {
        element: format!("node {}", raw.id.trim()),
        attribute: ATTR_POSITION.to_owned(),
    })?;
    Ok(node)
}

fn build_edge(source: NodeId, target: NodeId, attrs: &[GxlAttr]) -> ParseResult<Edge> {
    let mut edge = Edge::new(source, target, 0.0);
    let mut has_radius = false;
    for attr in attrs {
        match attr.name.trim() {
            ATTR_CURVE_DIRECTION_TUP => {
                let dir = attr.point()?;
                for (name, value) in ATTR_CURVE_DIRECTION.iter().zip(dir.to_array()) {
                    edge.set_attribute(name, value);
                }
            }
            name => {
                if let Some(value) = attr.scalar()? {
                    has_radius |= name == ATTR_RADIUS;
                    edge.set_attribute(name, value);
                }
            }
        }
    }
    if !has_radius {
        return Err(ParseError::MissingAttribute {
            element: format!("edge {source}->{target}"),
            attribute: ATTR_RADIUS.to_owned(),
        });
    }
    Ok(edge)
}

/// Schrijft de graph als GXL, leesbaar voor [`parse_gxl_str`].
pub fn to_gxl_string(graph: &VesselGraph) -> ParseResult<String> {
    let nodes = graph
        .nodes()
        .iter()
        .map(|node| {
            let mut attrs = vec![GxlAttr::tup(ATTR_POSITION, node.position.to_array())];
            attrs.extend(node.extra.iter().map(|(name, value)| GxlAttr::float(name, *value)));
            GxlNode {
                id: node.id.to_string(),
                attrs,
            }
        })
        .collect();

    let edges = graph
        .edges()
        .iter()
        .enumerate()
        .map(|(index, edge)| {
            let mut attrs = vec![GxlAttr::float(ATTR_RADIUS, edge.radius)];
            if let Some(curve) = edge.curve {
                attrs.push(GxlAttr::float(ATTR_CURVE_HEIGHT, curve.height));
                attrs.push(GxlAttr::tup(ATTR_CURVE_DIRECTION_TUP, curve.direction.to_array()));
            }
            attrs.extend(
                edge.attributes()
                    .into_iter()
                    .filter(|(name, _)| {
                        name != ATTR_CURVE_HEIGHT && !ATTR_CURVE_DIRECTION.contains(&name.as_str())
                    })
                    .map(|(name, value)| GxlAttr::float(&name, value)),
            );
            GxlEdge {
                id: Some(format!("e{index}")),
                from: edge.source.to_string(),
                to: edge.target.to_string(),
                attrs,
            }
        })
        .collect();

    let document = GxlDocument {
        graph: GxlGraph {
            id: Some("vessel tree".to_owned()),
            edgeids: Some(" true".to_owned()),
            edgemode: Some(" directed".to_owned()),
            hypergraph: Some(" false".to_owned()),
            nodes,
            edges,
        },
    };
    let body = quick_xml::se::to_string_with_root("gxl", &document)
        .map_err(|e| ParseError::Write(e.to_string()))?;
    Ok(format!("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n{body}\n"))
}

#[derive(Debug, Serialize, Deserialize)]
struct GxlDocument {
    graph: GxlGraph,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct GxlGraph {
    #[serde(rename = "@id", default, skip_serializing_if = "Option::is_none")]
    id: Option<String>,
    #[serde(rename = "@edgeids", default, skip_serializing_if = "Option::is_none")]
    edgeids: Option<String>,
    #[serde(rename = "@edgemode", default, skip_serializing_if = "Option::is_none")]
    edgemode: Option<String>,
    #[serde(rename = "@hypergraph", default, skip_serializing_if = "Option::is_none")]
    hypergraph: Option<String>,
    #[serde(default, rename = "node")]
    nodes: Vec<GxlNode>,
    #[serde(default, rename = "edge")]
    edges: Vec<GxlEdge>,
}

#[derive(Debug, Serialize, Deserialize)]
struct GxlNode {
    #[serde(rename = "@id")]
    id: String,
    #[serde(default, rename = "attr")]
    attrs: Vec<GxlAttr>,
}

#[derive(Debug, Serialize, Deserialize)]
struct GxlEdge {
    #[serde(rename = "@id", default, skip_serializing_if = "Option::is_none")]
    id: Option<String>,
    #[serde(rename = "@to")]
    to: String,
    #[serde(rename = "@from")]
    from: String,
    #[serde(default, rename = "attr")]
    attrs: Vec<GxlAttr>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct GxlAttr {
    #[serde(rename = "@name")]
    name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    float: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    int: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    string: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tup: Option<GxlTup>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct GxlTup {
    #[serde(default, rename = "float")]
    floats: Vec<String>,
}

impl GxlAttr {
    /// Het groeiprogramma zet een spatie voor elke attribuutnaam.
    fn float(name: &str, value: f64) -> Self {
        Self {
            name: format!(" {name}"),
            float: Some(value.to_string()),
            ..Self::default()
        }
    }

    fn tup(name: &str, values: [f64; 3]) -> Self {
        Self {
            name: format!(" {name}"),
            tup: Some(GxlTup {
                floats: values.iter().map(f64::to_string).collect(),
            }),
            ..Self::default()
        }
    }

    /// Numerieke waarde van `<float>` of `<int>`; tekst-attributen geven `None`.
    fn scalar(&self) -> ParseResult<Option<f64>> {
        match self.float.as_deref().or(self.int.as_deref()) {
            Some(raw) => Ok(Some(raw.trim().parse()?)),
            None => {
                if let Some(text) = &self.string {
                    log::debug!("GXL tekst-attribuut `{}` = `{}` overgeslagen", self.name.trim(), text.trim());
                }
                Ok(None)
            }
        }
    }

    fn point(&self) -> ParseResult<Point3> {
        let floats = self.tup.as_ref().map(|t| t.floats.as_slice()).unwrap_or_default();
        if floats.len() != 3 {
            return Err(ParseError::MissingAttribute {
                element: format!("attr `{}`", self.name.trim()),
                attribute: "tup met drie floats".to_owned(),
            });
        }
        Ok(Point3::new(
            floats[0].trim().parse()?,
            floats[1].trim().parse()?,
            floats[2].trim().parse()?,
        ))
    }
}
