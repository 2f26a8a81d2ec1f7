//! On-disk formats: the TetGen quartet a scene is built from, and OBJ
//! export of the deformed surface.

use crate::math::{Real, Vec3};
use crate::mesh::TetMesh;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;
use tracing::info;

/// Errors raised while loading a TetGen mesh.
#[derive(Debug, thiserror::Error)]
pub enum TetGenError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{file}:{line}: {message}")]
    Parse {
        file: String,
        line: usize,
        message: String,
    },
}

/// The four TetGen tables: `<base>.1.node`, `.1.face`, `.1.ele`, `.1.edge`.
#[derive(Debug, Clone)]
pub struct TetGenMesh {
    pub vertices: Vec<Vec3>,
    pub faces: Vec<[usize; 3]>,
    pub tets: Vec<[usize; 4]>,
    pub edges: Vec<[usize; 2]>,
}

impl TetGenMesh {
    /// Build a [`TetMesh`] from the loaded tables.
    pub fn into_mesh(self) -> Result<TetMesh, crate::mesh::MeshError> {
        TetMesh::with_surface(self.vertices, self.faces, self.tets)
    }
}

// each data row is a 1-based primitive index followed by its payload
fn read_rows(path: &Path, payload: usize) -> Result<Vec<Vec<String>>, TetGenError> {
    let file_name = path.display().to_string();
    let reader = BufReader::new(File::open(path)?);

    let mut rows = Vec::new();
    let mut expected: Option<usize> = None;
    for (line_number, line) in reader.lines().enumerate() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let tokens: Vec<String> = trimmed.split_whitespace().map(str::to_owned).collect();

        // the first data line carries the primitive count
        let Some(count) = expected else {
            let count = tokens[0].parse::<usize>().map_err(|_| TetGenError::Parse {
                file: file_name.clone(),
                line: line_number + 1,
                message: format!("bad count '{}'", tokens[0]),
            })?;
            expected = Some(count);
            continue;
        };

        if rows.len() == count {
            break;
        }
        if tokens.len() < payload + 1 {
            return Err(TetGenError::Parse {
                file: file_name.clone(),
                line: line_number + 1,
                message: format!("expected {} fields, found {}", payload + 1, tokens.len()),
            });
        }
        rows.push(tokens);
    }

    if let Some(count) = expected {
        if rows.len() != count {
            return Err(TetGenError::Parse {
                file: file_name,
                line: 0,
                message: format!("expected {} rows, found {}", count, rows.len()),
            });
        }
    }
    Ok(rows)
}

fn parse_real(file: &Path, token: &str) -> Result<Real, TetGenError> {
    token.parse::<Real>().map_err(|_| TetGenError::Parse {
        file: file.display().to_string(),
        line: 0,
        message: format!("bad coordinate '{}'", token),
    })
}

fn parse_index(file: &Path, token: &str) -> Result<usize, TetGenError> {
    let raw = token.parse::<usize>().map_err(|_| TetGenError::Parse {
        file: file.display().to_string(),
        line: 0,
        message: format!("bad index '{}'", token),
    })?;
    if raw == 0 {
        return Err(TetGenError::Parse {
            file: file.display().to_string(),
            line: 0,
            message: "TetGen indices are 1-based".into(),
        });
    }
    Ok(raw - 1)
}

/// Read the TetGen quartet rooted at `base` (e.g. `assets/bunny`).
pub fn read_tetgen(base: &Path) -> Result<TetGenMesh, TetGenError> {
    let with_extension = |suffix: &str| {
        let mut name = base.as_os_str().to_owned();
        name.push(suffix);
        std::path::PathBuf::from(name)
    };

    let node_path = with_extension(".1.node");
    let mut vertices = Vec::new();
    for row in read_rows(&node_path, 3)? {
        vertices.push(Vec3::new(
            parse_real(&node_path, &row[1])?,
            parse_real(&node_path, &row[2])?,
            parse_real(&node_path, &row[3])?,
        ));
    }

    let face_path = with_extension(".1.face");
    let mut faces = Vec::new();
    for row in read_rows(&face_path, 3)? {
        faces.push([
            parse_index(&face_path, &row[1])?,
            parse_index(&face_path, &row[2])?,
            parse_index(&face_path, &row[3])?,
        ]);
    }

    let ele_path = with_extension(".1.ele");
    let mut tets = Vec::new();
    for row in read_rows(&ele_path, 4)? {
        tets.push([
            parse_index(&ele_path, &row[1])?,
            parse_index(&ele_path, &row[2])?,
            parse_index(&ele_path, &row[3])?,
            parse_index(&ele_path, &row[4])?,
        ]);
    }

    let edge_path = with_extension(".1.edge");
    let mut edges = Vec::new();
    for row in read_rows(&edge_path, 2)? {
        edges.push([
            parse_index(&edge_path, &row[1])?,
            parse_index(&edge_path, &row[2])?,
        ]);
    }

    info!(
        "Read TetGen mesh '{}': {} vertices, {} faces, {} tets, {} edges",
        base.display(),
        vertices.len(),
        faces.len(),
        tets.len(),
        edges.len()
    );

    Ok(TetGenMesh {
        vertices,
        faces,
        tets,
        edges,
    })
}

/// Write the deformed surface as an OBJ triangle mesh (1-based indices).
pub fn write_surface_obj(path: &Path, mesh: &TetMesh) -> std::io::Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);

    for vertex in mesh.vertices() {
        writeln!(writer, "v {} {} {}", vertex[0], vertex[1], vertex[2])?;
    }
    for triangle in mesh.surface_triangles() {
        writeln!(
            writer,
            "f {} {} {}",
            triangle[0] + 1,
            triangle[1] + 1,
            triangle[2] + 1
        )?;
    }
    Ok(())
}

/// Rescale vertices into the unit cube centred at (½, ½, ½).
pub fn normalize_vertices(vertices: &[Vec3]) -> Vec<Vec3> {
    assert!(!vertices.is_empty());
    let mut mins = vertices[0];
    let mut maxs = vertices[0];
    for v in vertices {
        mins = mins.inf(v);
        maxs = maxs.sup(v);
    }

    let lengths = maxs - mins;
    let max_length_inv = 1.0 / lengths.max();

    vertices
        .iter()
        .map(|v| (v - mins) * max_length_inv)
        .collect()
}
