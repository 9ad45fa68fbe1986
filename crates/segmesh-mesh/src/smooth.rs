//! Laplacian vertex relaxation.
//!
//! Marching-tetrahedra surfaces follow voxel steps closely; a few relaxation
//! passes remove the staircase pattern before decimation.

use nalgebra::{Point3, Vector3};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::Mesh;
use crate::adjacency::MeshAdjacency;

/// Default fraction of the way each vertex moves toward its neighbor centroid.
pub const DEFAULT_RELAXATION: f64 = 0.5;

/// Parameters for Laplacian smoothing.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SmoothParams {
    /// Number of relaxation passes. Zero leaves the mesh untouched.
    pub iterations: usize,
    /// Damping factor in (0, 1]. Default: 0.5
    pub relaxation: f64,
}

impl Default for SmoothParams {
    fn default() -> Self {
        Self {
            iterations: 10,
            relaxation: DEFAULT_RELAXATION,
        }
    }
}

impl SmoothParams {
    /// Create params with the given iteration count and default relaxation.
    pub fn with_iterations(iterations: usize) -> Self {
        Self {
            iterations,
            ..Default::default()
        }
    }
}

/// Smooth a mesh in place.
///
/// Each pass moves every vertex toward the centroid of its edge-adjacent
/// neighbors by `relaxation`. Displacements are computed from the positions at
/// the start of the pass so the result does not depend on vertex order.
/// Isolated vertices do not move. Faces are never modified.
pub fn smooth_laplacian(mesh: &mut Mesh, params: &SmoothParams) {
    if params.iterations == 0 || mesh.faces.is_empty() {
        return;
    }

    let adjacency = MeshAdjacency::build(mesh.vertices.len(), &mesh.faces);
    let mut positions: Vec<Point3<f64>> = mesh.vertices.iter().map(|v| v.position).collect();
    let mut next = positions.clone();

    for _ in 0..params.iterations {
        for (vi, neighbors) in adjacency.vertex_neighbors.iter().enumerate() {
            if neighbors.is_empty() {
                continue;
            }
            let sum: Vector3<f64> = neighbors
                .iter()
                .map(|&ni| positions[ni as usize].coords)
                .sum();
            let centroid = Point3::from(sum / neighbors.len() as f64);
            next[vi] = positions[vi] + (centroid - positions[vi]) * params.relaxation;
        }
        std::mem::swap(&mut positions, &mut next);
    }

    for (vertex, position) in mesh.vertices.iter_mut().zip(positions) {
        vertex.position = position;
        vertex.normal = None;
    }

    debug!(
        iterations = params.iterations,
        relaxation = params.relaxation,
        vertices = mesh.vertices.len(),
        "Laplacian smoothing complete"
    );
}
