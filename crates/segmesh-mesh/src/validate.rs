//! Mesh data validation.
//!
//! Catches the problems that would make downstream processing panic or write
//! garbage: face indices outside the vertex array and non-finite coordinates.

use tracing::debug;

use crate::Mesh;
use crate::error::{MeshError, MeshResult};

/// Validate mesh data, failing on the first invalid index or coordinate.
pub fn validate_mesh_data(mesh: &Mesh) -> MeshResult<()> {
    for (vertex_index, vertex) in mesh.vertices.iter().enumerate() {
        let coords = [
            ("x", vertex.position.x),
            ("y", vertex.position.y),
            ("z", vertex.position.z),
        ];
        for (coordinate, value) in coords {
            if !value.is_finite() {
                return Err(MeshError::InvalidCoordinate {
                    vertex_index,
                    coordinate,
                    value,
                });
            }
        }
    }

    let vertex_count = mesh.vertices.len();
    for (face_index, face) in mesh.faces.iter().enumerate() {
        if let Some(&vertex_index) = face.iter().find(|&&idx| idx as usize >= vertex_count) {
            return Err(MeshError::InvalidVertexIndex {
                face_index,
                vertex_index,
                vertex_count,
            });
        }
    }

    debug!("Mesh data validation passed");
    Ok(())
}
