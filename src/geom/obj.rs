//! Minimal Wavefront OBJ reading (organ surfaces) and writing (tree models).

use std::fmt::Write as _;
use std::fs;
use std::io::{BufWriter, Write};
use std::path::Path;

use super::GeomMesh;

#[derive(Debug, thiserror::Error)]
pub enum ObjError {
    #[error("i/o error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("line {line}: {message}")]
    Syntax { line: usize, message: String },
    #[error("invalid mesh: {0}")]
    InvalidMesh(String),
}

/// Parse OBJ text. Only `v` and `f` records are used; polygons are fan-triangulated.
pub fn parse_obj(text: &str) -> Result<GeomMesh, ObjError> {
    let mut positions = Vec::new();
    let mut indices = Vec::new();

    for (line_idx, raw) in text.lines().enumerate() {
        let line = raw.split('#').next().unwrap_or("").trim();
        let mut fields = line.split_whitespace();
        match fields.next() {
            Some("v") => {
                let coords: Vec<f64> = fields
                    .take(3)
                    .map(str::parse)
                    .collect::<Result<_, _>>()
                    .map_err(|e| ObjError::Syntax {
                        line: line_idx + 1,
                        message: format!("bad vertex coordinate: {e}"),
                    })?;
                if coords.len() != 3 {
                    return Err(ObjError::Syntax {
                        line: line_idx + 1,
                        message: "vertex needs three coordinates".to_owned(),
                    });
                }
                positions.push([coords[0], coords[1], coords[2]]);
            }
            Some("f") => {
                let face = fields
                    .map(|f| parse_face_index(f, positions.len()))
                    .collect::<Option<Vec<u32>>>()
                    .ok_or_else(|| ObjError::Syntax {
                        line: line_idx + 1,
                        message: "bad face index".to_owned(),
                    })?;
                if face.len() < 3 {
                    return Err(ObjError::Syntax {
                        line: line_idx + 1,
                        message: "face needs at least three vertices".to_owned(),
                    });
                }
                for i in 1..face.len() - 1 {
                    indices.extend_from_slice(&[face[0], face[i], face[i + 1]]);
                }
            }
            _ => {}
        }
    }

    let mesh = GeomMesh::new(positions, indices);
    mesh.validate().map_err(ObjError::InvalidMesh)?;
    Ok(mesh)
}

fn parse_face_index(field: &str, vertex_count: usize) -> Option<u32> {
    let raw: i64 = field.split('/').next()?.parse().ok()?;
    let idx = if raw < 0 {
        vertex_count as i64 + raw
    } else {
        raw - 1
    };
    u32::try_from(idx).ok()
}

pub fn read_obj(path: &Path) -> Result<GeomMesh, ObjError> {
    let text = fs::read_to_string(path).map_err(|source| ObjError::Io {
        path: path.display().to_string(),
        source,
    })?;
    parse_obj(&text)
}

#[must_use]
pub fn obj_string(mesh: &GeomMesh, name: &str) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "o {name}");
    for p in &mesh.positions {
        let _ = writeln!(out, "v {} {} {}", p[0], p[1], p[2]);
    }
    for tri in mesh.indices.chunks_exact(3) {
        let _ = writeln!(out, "f {} {} {}", tri[0] + 1, tri[1] + 1, tri[2] + 1);
    }
    out
}

pub fn write_obj(path: &Path, mesh: &GeomMesh, name: &str) -> Result<(), ObjError> {
    mesh.validate().map_err(ObjError::InvalidMesh)?;
    let io_err = |source: std::io::Error| ObjError::Io {
        path: path.display().to_string(),
        source,
    };

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(io_err)?;
    }
    let file = fs::File::create(path).map_err(io_err)?;
    let mut w = BufWriter::new(file);
    w.write_all(obj_string(mesh, name).as_bytes()).map_err(io_err)?;
    w.flush().map_err(io_err)
}
