//! Error types for mesh operations with rich diagnostics.
//!
//! Each error has a code in the format `MESH-XXXX`:
//! - `MESH-1xxx`: I/O errors (writing, directory creation)
//! - `MESH-2xxx`: Validation errors (indices, coordinates)
//! - `MESH-3xxx`: Processing errors (decimation)
//! - `MESH-4xxx`: Format errors (unsupported format token)
//!
//! # Example
//!
//! ```
//! use segmesh_mesh::{MeshError, MeshFormat};
//!
//! let err = "gltf".parse::<MeshFormat>().unwrap_err();
//! assert!(matches!(err, MeshError::UnsupportedFormat { .. }));
//! assert_eq!(err.code().as_str(), "MESH-4001");
//! ```

use miette::Diagnostic;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for mesh operations.
pub type MeshResult<T> = Result<T, MeshError>;

/// Machine-readable error codes for mesh operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// MESH-1002: Failed to write file
    IoWrite = 1002,
    /// MESH-1004: Failed to create output directory
    CreateDir = 1004,

    /// MESH-2001: Face references invalid vertex index
    InvalidVertexIndex = 2001,
    /// MESH-2002: Vertex has NaN or Infinity coordinate
    InvalidCoordinate = 2002,

    /// MESH-3004: Decimation failed
    DecimationFailed = 3004,

    /// MESH-4001: Unsupported file format
    UnsupportedFormat = 4001,
}

impl ErrorCode {
    /// Returns the error code as a string in the format `MESH-XXXX`.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::IoWrite => "MESH-1002",
            ErrorCode::CreateDir => "MESH-1004",
            ErrorCode::InvalidVertexIndex => "MESH-2001",
            ErrorCode::InvalidCoordinate => "MESH-2002",
            ErrorCode::DecimationFailed => "MESH-3004",
            ErrorCode::UnsupportedFormat => "MESH-4001",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Errors that can occur during mesh operations.
#[derive(Debug, Error, Diagnostic)]
pub enum MeshError {
    /// Error writing to a file.
    #[error("failed to write mesh to {path}")]
    #[diagnostic(
        code(mesh::io::write),
        help("Check that the directory is writable and the disk is not full")
    )]
    IoWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Error creating the directory that should hold an output file.
    #[error("failed to create output directory {path}")]
    #[diagnostic(
        code(mesh::io::create_dir),
        help("Check that no parent path component is a regular file and that permissions allow it")
    )]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Unsupported output format token.
    #[error("unsupported mesh format: {token:?}")]
    #[diagnostic(
        code(mesh::format::unsupported),
        help("Supported formats: stl, stl-ascii, obj, ply, 3mf, vtk")
    )]
    UnsupportedFormat { token: String },

    /// Invalid vertex index in face data.
    #[error(
        "invalid vertex index: face {face_index} references vertex {vertex_index}, but mesh only has {vertex_count} vertices"
    )]
    #[diagnostic(code(mesh::validation::vertex_index))]
    InvalidVertexIndex {
        face_index: usize,
        vertex_index: u32,
        vertex_count: usize,
    },

    /// Invalid coordinate value (NaN or Infinity).
    #[error("invalid coordinate at vertex {vertex_index}: {coordinate} is {value}")]
    #[diagnostic(
        code(mesh::validation::coordinate),
        help("Check the voxel spacing and orientation of the source volume")
    )]
    InvalidCoordinate {
        vertex_index: usize,
        coordinate: &'static str,
        value: f64,
    },

    /// Decimation failed.
    #[error("decimation failed: {details}")]
    #[diagnostic(
        code(mesh::decimate::failed),
        help("Use a reduction ratio in [0, 1)")
    )]
    DecimationFailed { details: String },
}

impl MeshError {
    /// Returns the machine-readable error code.
    pub fn code(&self) -> ErrorCode {
        match self {
            MeshError::IoWrite { .. } => ErrorCode::IoWrite,
            MeshError::CreateDir { .. } => ErrorCode::CreateDir,
            MeshError::UnsupportedFormat { .. } => ErrorCode::UnsupportedFormat,
            MeshError::InvalidVertexIndex { .. } => ErrorCode::InvalidVertexIndex,
            MeshError::InvalidCoordinate { .. } => ErrorCode::InvalidCoordinate,
            MeshError::DecimationFailed { .. } => ErrorCode::DecimationFailed,
        }
    }

    /// Whether this error came from the filesystem rather than the mesh data.
    pub fn is_io(&self) -> bool {
        matches!(self, MeshError::IoWrite { .. } | MeshError::CreateDir { .. })
    }

    pub(crate) fn io_write(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        MeshError::IoWrite {
            path: path.into(),
            source,
        }
    }
}
