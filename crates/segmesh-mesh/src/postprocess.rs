//! Smoothing and decimation applied to every extracted surface.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::Mesh;
use crate::decimate::{DecimateParams, decimate_mesh};
use crate::error::MeshResult;
use crate::smooth::{SmoothParams, smooth_laplacian};
use crate::validate::validate_mesh_data;

/// Parameters for [`post_process`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostProcessParams {
    /// Laplacian smoothing. Zero iterations disables it.
    pub smooth: SmoothParams,
    /// Fraction of triangles to remove, in [0, 1).
    pub decimate_reduction: f64,
    /// Compute area-weighted vertex normals after decimation.
    pub compute_normals: bool,
}

impl Default for PostProcessParams {
    fn default() -> Self {
        Self {
            smooth: SmoothParams::default(),
            decimate_reduction: 0.1,
            compute_normals: false,
        }
    }
}

/// Output of [`post_process`].
#[derive(Debug, Clone)]
pub struct PostProcessOutcome {
    /// The processed mesh.
    pub mesh: Mesh,
    /// Face count before decimation.
    pub faces_before: usize,
    /// Face count after decimation.
    pub faces_after: usize,
    /// Edge collapses performed by decimation.
    pub collapses_performed: usize,
}

/// Validate, smooth, decimate and optionally compute normals.
///
/// An empty mesh is returned unchanged. Invalid meshes (out-of-range face
/// indices, non-finite coordinates) are rejected before any processing.
pub fn post_process(mut mesh: Mesh, params: &PostProcessParams) -> MeshResult<PostProcessOutcome> {
    validate_mesh_data(&mesh)?;

    let decimate = DecimateParams::with_reduction(params.decimate_reduction);
    decimate.validate()?;

    let faces_before = mesh.face_count();
    if mesh.is_empty() {
        return Ok(PostProcessOutcome {
            mesh,
            faces_before,
            faces_after: faces_before,
            collapses_performed: 0,
        });
    }

    smooth_laplacian(&mut mesh, &params.smooth);

    let (mut mesh, collapses_performed) = if params.decimate_reduction > 0.0 {
        let result = decimate_mesh(&mesh, &decimate);
        (result.mesh, result.collapses_performed)
    } else {
        (mesh, 0)
    };

    if params.compute_normals {
        mesh.compute_vertex_normals();
    }

    let faces_after = mesh.face_count();
    debug!(
        faces_before,
        faces_after,
        collapses_performed,
        smoothing_iterations = params.smooth.iterations,
        "Post-processing complete"
    );

    Ok(PostProcessOutcome {
        mesh,
        faces_before,
        faces_after,
        collapses_performed,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Vertex;
    use crate::error::MeshError;

    fn octahedron() -> Mesh {
        Mesh {
            vertices: vec![
                Vertex::from_coords(1.0, 0.0, 0.0),
                Vertex::from_coords(-1.0, 0.0, 0.0),
                Vertex::from_coords(0.0, 1.0, 0.0),
                Vertex::from_coords(0.0, -1.0, 0.0),
                Vertex::from_coords(0.0, 0.0, 1.0),
                Vertex::from_coords(0.0, 0.0, -1.0),
            ],
            faces: vec![
                [0, 2, 4],
                [2, 1, 4],
                [1, 3, 4],
                [3, 0, 4],
                [2, 0, 5],
                [1, 2, 5],
                [3, 1, 5],
                [0, 3, 5],
            ],
        }
    }

    #[test]
    fn test_octahedron_fixture_is_outward() {
        assert!(octahedron().signed_volume() > 0.0);
    }

    #[test]
    fn test_empty_mesh_passes_through() {
        let outcome = post_process(Mesh::new(), &PostProcessParams::default()).unwrap();
        assert!(outcome.mesh.is_empty());
        assert_eq!(outcome.faces_before, 0);
        assert_eq!(outcome.faces_after, 0);
    }

    #[test]
    fn test_disabled_stages_are_identity() {
        let params = PostProcessParams {
            smooth: SmoothParams::with_iterations(0),
            decimate_reduction: 0.0,
            compute_normals: false,
        };
        let outcome = post_process(octahedron(), &params).unwrap();
        assert_eq!(outcome.mesh, octahedron());
        assert_eq!(outcome.collapses_performed, 0);
    }

    #[test]
    fn test_face_count_never_grows() {
        let outcome = post_process(octahedron(), &PostProcessParams::default()).unwrap();
        assert!(outcome.faces_after <= outcome.faces_before);
        assert_eq!(outcome.faces_after, outcome.mesh.face_count());
    }

    #[test]
    fn test_compute_normals() {
        let params = PostProcessParams {
            compute_normals: true,
            decimate_reduction: 0.0,
            ..Default::default()
        };
        let outcome = post_process(octahedron(), &params).unwrap();
        assert!(outcome.mesh.vertices.iter().all(|v| v.normal.is_some()));
    }

    #[test]
    fn test_invalid_mesh_rejected() {
        let mut mesh = octahedron();
        mesh.faces.push([0, 1, 99]);
        let err = post_process(mesh, &PostProcessParams::default()).unwrap_err();
        assert!(matches!(err, MeshError::InvalidVertexIndex { .. }));
    }

    #[test]
    fn test_invalid_ratio_rejected() {
        let params = PostProcessParams {
            decimate_reduction: 1.5,
            ..Default::default()
        };
        let err = post_process(octahedron(), &params).unwrap_err();
        assert!(matches!(err, MeshError::DecimationFailed { .. }));
    }
}
