//! Inlezen en wegschrijven van vaatbomen in de twee uitwisselingsformaten:
//! GXL (uitvoer van het groeiprogramma) en GraphML (analyse-tools).

pub mod graphml;
pub mod gxl;

use std::fs;
use std::num::ParseFloatError;
use std::path::Path;

use thiserror::Error;

use crate::graph::{GraphError, VesselGraph};

pub use graphml::AttributeAllowList;

/// Result type voor het parsen van uitwisselingsbestanden.
pub type ParseResult<T> = Result<T, ParseError>;

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("kan {path} niet lezen of schrijven: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    /// Het XML-document kon niet gede-serialiseerd worden.
    #[error("XML parsefout: {0}")]
    Xml(#[from] quick_xml::DeError),
    #[error("XML schrijffout: {0}")]
    Write(String),
    #[error("onbekende bestandsextensie: {0:?}")]
    UnsupportedExtension(String),
    #[error("ongeldige numerieke waarde: {0}")]
    Number(#[from] ParseFloatError),
    #[error("ontbrekend verplicht attribuut `{attribute}` op {element}")]
    MissingAttribute { element: String, attribute: String },
    #[error("onbekende knoop-id `{0}`")]
    UnknownNodeId(String),
    #[error("ongeldige graph: {0}")]
    Graph(#[from] GraphError),
}

/// Bestandsformaat, afgeleid van de extensie.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GraphFormat {
    Gxl,
    GraphMl,
}

impl GraphFormat {
    pub fn from_path(path: &Path) -> ParseResult<Self> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();
        match ext.as_str() {
            "gxl" | "xml" => Ok(Self::Gxl),
            "graphml" => Ok(Self::GraphMl),
            _ => Err(ParseError::UnsupportedExtension(ext)),
        }
    }
}

impl VesselGraph {
    /// Leest een boom uit `path`; het formaat volgt uit de extensie.
    pub fn load(path: &Path) -> ParseResult<Self> {
        Self::load_with(path, &AttributeAllowList::default())
    }

    /// Zoals [`Self::load`], met extra GraphML-attributen uit `allow`.
    pub fn load_with(path: &Path, allow: &AttributeAllowList) -> ParseResult<Self> {
        let format = GraphFormat::from_path(path)?;
        let text = fs::read_to_string(path).map_err(|source| ParseError::Io {
            path: path.display().to_string(),
            source,
        })?;
        log::debug!("loading {format:?} graph from {}", path.display());
        match format {
            GraphFormat::Gxl => gxl::parse_gxl_str(&text),
            GraphFormat::GraphMl => graphml::parse_graphml_str(&text, allow),
        }
    }

    /// Schrijft de boom als (gerichte) GraphML.
    pub fn save_graphml(&self, path: &Path) -> ParseResult<()> {
        let text = graphml::to_graphml_string(self)?;
        write_text(path, &text)
    }

    /// Schrijft de boom als GXL.
    pub fn save_gxl(&self, path: &Path) -> ParseResult<()> {
        let text = gxl::to_gxl_string(self)?;
        write_text(path, &text)
    }
}

fn write_text(path: &Path, text: &str) -> ParseResult<()> {
    let io_err = |source: std::io::Error| ParseError::Io {
        path: path.display().to_string(),
        source,
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(io_err)?;
    }
    fs::write(path, text).map_err(io_err)
}

/// Verwijdert BOM, XML-declaratie, DOCTYPE en commentaar vóór het root-element.
pub(crate) fn strip_xml_prolog(input: &str) -> &str {
    let mut rest = input.trim_start_matches(|c: char| c == '\u{feff}' || c.is_whitespace());
    loop {
        let end = if rest.starts_with("<?") {
            rest.find("?>").map(|i| i + 2)
        } else if rest.starts_with("<!--") {
            rest.find("-->").map(|i| i + 3)
        } else if rest.starts_with("<!") {
            rest.find('>').map(|i| i + 1)
        } else {
            None
        };
        match end {
            Some(end) => rest = rest[end..].trim_start(),
            None => return rest,
        }
    }
}

/// Numeriek deel van ids als `n12`; `None` als er geen cijfers in staan.
pub(crate) fn numeric_suffix(id: &str) -> Option<usize> {
    let digits: String = id.trim().chars().filter(char::is_ascii_digit).collect();
    digits.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_follows_extension() {
        assert_eq!(GraphFormat::from_path(Path::new("a/tree.GXL")).unwrap(), GraphFormat::Gxl);
        assert_eq!(
            GraphFormat::from_path(Path::new("tree.graphml")).unwrap(),
            GraphFormat::GraphMl
        );
        assert!(matches!(
            GraphFormat::from_path(Path::new("tree.vtp")),
            Err(ParseError::UnsupportedExtension(ext)) if ext == "vtp"
        ));
    }

    #[test]
    fn prolog_is_stripped() {
        let text = "\u{feff}<?xml version=\"1.0\"?>\n<!DOCTYPE gxl SYSTEM \"gxl.dtd\">\n<!-- x -->\n<gxl/>";
        assert_eq!(strip_xml_prolog(text), "<gxl/>");
        assert_eq!(numeric_suffix(" n42"), Some(42));
        assert_eq!(numeric_suffix("root"), None);
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let err = VesselGraph::load(Path::new("/definitely/not/here.gxl")).unwrap_err();
        assert!(matches!(err, ParseError::Io { .. }));
    }
}
