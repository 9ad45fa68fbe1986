//! Triangle meshes for segmentation export.
//!
//! This crate holds the mesh side of the segmentation-to-mesh pipeline: the
//! indexed triangle mesh model, Laplacian smoothing, quadric-error decimation
//! and file export.
//!
//! # Features
//!
//! - **Model**: [`Mesh`] with indexed faces, bounds, volume and area
//! - **Post-processing**: [`smooth_laplacian`], [`decimate_mesh`] and the combined [`post_process`]
//! - **Validation**: out-of-range face indices and non-finite coordinates
//! - **Export**: binary and ASCII STL, OBJ, PLY, 3MF and legacy VTK via [`write_mesh`]
//!
//! # Units and Orientation
//!
//! Coordinates are in the physical space of the source volume, usually
//! millimeters. Faces wind counter-clockwise seen from outside, so a closed
//! surface has positive [`Mesh::signed_volume`].
//!
//! # Quick Start
//!
//! ```no_run
//! use segmesh_mesh::{Mesh, MeshFormat, PostProcessParams, Vertex};
//! use std::path::Path;
//!
//! let mut mesh = Mesh::new();
//! mesh.vertices.push(Vertex::from_coords(0.0, 0.0, 0.0));
//! mesh.vertices.push(Vertex::from_coords(1.0, 0.0, 0.0));
//! mesh.vertices.push(Vertex::from_coords(0.0, 1.0, 0.0));
//! mesh.faces.push([0, 1, 2]);
//!
//! let outcome = mesh.post_process(&PostProcessParams::default()).unwrap();
//! outcome.mesh.save(Path::new("meshes/triangle.stl"), MeshFormat::Stl).unwrap();
//! ```
//!
//! # Logging
//!
//! Operations log through `tracing`. Timing events use the `segmesh::timing`
//! target; see [`tracing_ext`].

mod error;
pub mod tracing_ext;
mod types;

pub mod adjacency;
pub mod decimate;
pub mod io;
pub mod postprocess;
pub mod smooth;
pub mod validate;

pub use error::{ErrorCode, MeshError, MeshResult};
pub use types::{Mesh, Triangle, Vertex};

pub use adjacency::MeshAdjacency;
pub use decimate::{DecimateParams, DecimateResult, decimate_mesh, try_decimate_mesh};
pub use io::{MeshFormat, write_mesh};
pub use postprocess::{PostProcessOutcome, PostProcessParams, post_process};
pub use smooth::{DEFAULT_RELAXATION, SmoothParams, smooth_laplacian};
pub use validate::validate_mesh_data;

use std::path::Path;

impl Mesh {
    /// Write the mesh to `path` in `format`.
    pub fn save(&self, path: &Path, format: MeshFormat) -> MeshResult<()> {
        write_mesh(self, path, format)
    }

    /// Run the full post-processing stage.
    pub fn post_process(self, params: &PostProcessParams) -> MeshResult<PostProcessOutcome> {
        post_process(self, params)
    }
}
