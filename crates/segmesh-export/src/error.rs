// Allow unused_assignments lint for error struct fields that are used in thiserror Display macros
// but appear as "never read" to the compiler.
#![allow(unused_assignments)]

//! Batch-level and catalog errors.
//!
//! Codes follow the pattern `CAT-XXXX` for label tables and `EXP-XXXX` for
//! export requests. Per-segment problems are not errors: they are recorded as
//! [`SegmentFailure`](crate::SegmentFailure) values in the summary.

use miette::Diagnostic;
use segmesh_volume::VolumeError;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for batch-level export operations.
pub type BatchResult<T> = Result<T, ExportError>;

/// Machine-readable error codes for catalog and export errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExportErrorCode {
    /// CAT-1001: Label table could not be read
    CatalogRead,
    /// CAT-1002: Label table could not be parsed
    CatalogParse,
    /// CAT-2001: Group name not defined
    UnknownGroup,

    /// EXP-1001: Unsupported output format token
    UnsupportedFormat,
    /// EXP-1002: Request parameter out of range
    InvalidRequest,
    /// EXP-1003: Export configuration file could not be used
    Config,
    /// EXP-2001: Selection resolved to no labels
    EmptySelection,
    /// EXP-3001: Output directory not creatable or not writable
    OutputDirectory,
}

impl ExportErrorCode {
    /// Returns the error code as a string in the format `CAT-XXXX` or `EXP-XXXX`.
    pub fn as_str(&self) -> &'static str {
        match self {
            ExportErrorCode::CatalogRead => "CAT-1001",
            ExportErrorCode::CatalogParse => "CAT-1002",
            ExportErrorCode::UnknownGroup => "CAT-2001",
            ExportErrorCode::UnsupportedFormat => "EXP-1001",
            ExportErrorCode::InvalidRequest => "EXP-1002",
            ExportErrorCode::Config => "EXP-1003",
            ExportErrorCode::EmptySelection => "EXP-2001",
            ExportErrorCode::OutputDirectory => "EXP-3001",
        }
    }
}

impl std::fmt::Display for ExportErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Errors from loading or querying a label catalog.
#[derive(Debug, Error, Diagnostic)]
pub enum CatalogError {
    /// The label table file could not be read.
    #[error("failed to read label table {path}")]
    #[diagnostic(code(catalog::read))]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The label table is malformed.
    #[error("invalid label table {path}: {details}")]
    #[diagnostic(
        code(catalog::parse),
        help("Use TOML or JSON with [[labels]] entries, or CSV lines of the form `id,name[,group;group]`")
    )]
    Parse { path: PathBuf, details: String },

    /// The requested group is not defined.
    #[error("unknown label group {group:?}")]
    #[diagnostic(code(catalog::unknown_group), help("Known groups: {available}"))]
    UnknownGroup { group: String, available: String },
}

impl CatalogError {
    /// Returns the machine-readable error code.
    pub fn error_code(&self) -> ExportErrorCode {
        match self {
            CatalogError::Read { .. } => ExportErrorCode::CatalogRead,
            CatalogError::Parse { .. } => ExportErrorCode::CatalogParse,
            CatalogError::UnknownGroup { .. } => ExportErrorCode::UnknownGroup,
        }
    }

    pub(crate) fn parse(path: impl Into<PathBuf>, details: impl Into<String>) -> Self {
        CatalogError::Parse {
            path: path.into(),
            details: details.into(),
        }
    }
}

/// Errors that stop a batch before any segment is attempted.
#[derive(Debug, Error, Diagnostic)]
pub enum ExportError {
    /// The volume could not be loaded or resampled.
    #[error(transparent)]
    #[diagnostic(transparent)]
    Volume(#[from] VolumeError),

    /// Label table or group resolution failed.
    #[error(transparent)]
    #[diagnostic(transparent)]
    Catalog(#[from] CatalogError),

    /// The format token names no known mesh format.
    #[error("unsupported output format {token:?}")]
    #[diagnostic(
        code(export::request::format),
        help("Supported formats: stl, stl-ascii, obj, ply, 3mf, vtk")
    )]
    UnsupportedFormat { token: String },

    /// A numeric request parameter is out of range.
    #[error("invalid export request: {details}")]
    #[diagnostic(code(export::request::invalid))]
    InvalidRequest { details: String },

    /// An export configuration file could not be read or parsed.
    #[error("invalid export configuration {path}: {details}")]
    #[diagnostic(code(export::config))]
    Config { path: PathBuf, details: String },

    /// The selection resolved to no exportable labels.
    #[error("selection {selection} resolved to no labels")]
    #[diagnostic(
        code(export::selection::empty),
        help("Label 0 is background and never exported; check the group definition or the label list")
    )]
    EmptySelection { selection: String },

    /// The output directory cannot be created or written.
    #[error("output directory {path} is not writable")]
    #[diagnostic(
        code(export::output_dir),
        help("Check that the path is a directory you can write to")
    )]
    OutputDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ExportError {
    /// Returns the machine-readable error code, or `None` for volume errors,
    /// which carry their own [`VolumeErrorCode`](segmesh_volume::VolumeErrorCode).
    pub fn code(&self) -> Option<ExportErrorCode> {
        match self {
            ExportError::Volume(_) => None,
            ExportError::Catalog(e) => Some(e.error_code()),
            ExportError::UnsupportedFormat { .. } => Some(ExportErrorCode::UnsupportedFormat),
            ExportError::InvalidRequest { .. } => Some(ExportErrorCode::InvalidRequest),
            ExportError::Config { .. } => Some(ExportErrorCode::Config),
            ExportError::EmptySelection { .. } => Some(ExportErrorCode::EmptySelection),
            ExportError::OutputDirectory { .. } => Some(ExportErrorCode::OutputDirectory),
        }
    }

    /// Machine-readable code as a string, including volume codes.
    pub fn code_str(&self) -> &'static str {
        match self {
            ExportError::Volume(e) => e.error_code().as_str(),
            other => other.code().map_or("EXP-0000", |c| c.as_str()),
        }
    }

    pub(crate) fn invalid(details: impl Into<String>) -> Self {
        ExportError::InvalidRequest {
            details: details.into(),
        }
    }
}
