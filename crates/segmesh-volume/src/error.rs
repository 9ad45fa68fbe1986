// Allow unused_assignments lint for error struct fields that are used in thiserror Display macros
// but appear as "never read" to the compiler.
#![allow(unused_assignments)]

//! Error types for volume operations with rich diagnostics.
//!
//! Codes follow the pattern `VOL-XXXX` where:
//! - 1xxx = Input errors (missing file, unreadable or invalid volume)
//! - 2xxx = Grid errors (spacing, dimensions, size limits)
//! - 3xxx = Extraction errors

use miette::Diagnostic;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for volume operations.
pub type VolumeResult<T> = Result<T, VolumeError>;

/// Machine-readable error codes for volume operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VolumeErrorCode {
    /// VOL-1001: Volume file not found
    NotFound = 1001,
    /// VOL-1002: Volume file could not be parsed as a label volume
    Format = 1002,

    /// VOL-2001: Voxel spacing is zero, negative or non-finite
    InvalidSpacing = 2001,
    /// VOL-2002: Dimensions do not match the label data
    InvalidDimensions = 2002,
    /// VOL-2003: Grid exceeds the voxel limit
    GridTooLarge = 2003,

    /// VOL-3001: Isosurface extraction failed
    ExtractionFailed = 3001,
}

impl VolumeErrorCode {
    /// Returns the error code as a string in the format `VOL-XXXX`.
    pub fn as_str(&self) -> &'static str {
        match self {
            VolumeErrorCode::NotFound => "VOL-1001",
            VolumeErrorCode::Format => "VOL-1002",
            VolumeErrorCode::InvalidSpacing => "VOL-2001",
            VolumeErrorCode::InvalidDimensions => "VOL-2002",
            VolumeErrorCode::GridTooLarge => "VOL-2003",
            VolumeErrorCode::ExtractionFailed => "VOL-3001",
        }
    }
}

impl std::fmt::Display for VolumeErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Errors that can occur while loading, resampling or extracting from a volume.
#[derive(Debug, Error, Diagnostic)]
pub enum VolumeError {
    /// The volume path does not resolve to a readable file.
    #[error("volume not found: {path}")]
    #[diagnostic(
        code(volume::input::not_found),
        help("Check the path. Supported inputs are NIfTI-1 files (.nii, .nii.gz, .hdr/.img).")
    )]
    NotFound { path: PathBuf },

    /// The file exists but is not a usable label volume.
    #[error("invalid label volume {path}: {details}")]
    #[diagnostic(
        code(volume::input::format),
        help("The volume must be a 3D NIfTI image of non-negative integer labels.")
    )]
    Format { path: PathBuf, details: String },

    /// Spacing is zero, negative or non-finite.
    #[error("invalid voxel spacing {spacing:?}: every component must be a positive finite number")]
    #[diagnostic(code(volume::grid::spacing))]
    InvalidSpacing { spacing: [f64; 3] },

    /// Label data does not match the declared dimensions.
    #[error("invalid dimensions {dims:?}: {details}")]
    #[diagnostic(code(volume::grid::dimensions))]
    InvalidDimensions { dims: [usize; 3], details: String },

    /// The grid would exceed the voxel limit.
    #[error("grid too large: {dims:?} = {total} voxels exceeds limit of {max}")]
    #[diagnostic(
        code(volume::grid::too_large),
        help("Use a coarser resampling spacing or raise the voxel limit.")
    )]
    GridTooLarge {
        dims: [usize; 3],
        total: u128,
        max: u64,
    },

    /// Extraction produced an unrepresentable mesh.
    #[error("extraction of label {label} failed: {details}")]
    #[diagnostic(code(volume::extract::failed))]
    ExtractionFailed { label: u32, details: String },
}

impl VolumeError {
    /// Returns the machine-readable error code.
    ///
    /// Distinct from [`Diagnostic::code`], which wrapping errors forward.
    pub fn error_code(&self) -> VolumeErrorCode {
        match self {
            VolumeError::NotFound { .. } => VolumeErrorCode::NotFound,
            VolumeError::Format { .. } => VolumeErrorCode::Format,
            VolumeError::InvalidSpacing { .. } => VolumeErrorCode::InvalidSpacing,
            VolumeError::InvalidDimensions { .. } => VolumeErrorCode::InvalidDimensions,
            VolumeError::GridTooLarge { .. } => VolumeErrorCode::GridTooLarge,
            VolumeError::ExtractionFailed { .. } => VolumeErrorCode::ExtractionFailed,
        }
    }

    // Constructor helpers

    /// Create a format error.
    pub fn format(path: impl Into<PathBuf>, details: impl Into<String>) -> Self {
        VolumeError::Format {
            path: path.into(),
            details: details.into(),
        }
    }

    /// Create a grid too large error.
    pub fn grid_too_large(dims: [usize; 3], max: u64) -> Self {
        VolumeError::GridTooLarge {
            dims,
            total: dims.iter().map(|&d| d as u128).product(),
            max,
        }
    }

    /// Create an extraction failed error.
    pub fn extraction_failed(label: u32, details: impl Into<String>) -> Self {
        VolumeError::ExtractionFailed {
            label,
            details: details.into(),
        }
    }
}
