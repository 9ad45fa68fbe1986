//! Export segmentation labels as named triangle meshes.
//!
//! An [`Exporter`] takes a [`LabelVolume`](segmesh_volume::LabelVolume), a
//! [`LabelCatalog`] of names and groups, and an [`ExportRequest`], and writes
//! one mesh file per selected label:
//!
//! 1. The request is validated: parameters, selection, output directory.
//! 2. The volume is resampled once if the request asks for it.
//! 3. Each label is extracted, smoothed, decimated and written.
//! 4. An [`ExportSummary`] records every label as succeeded, empty or failed.
//!
//! A failure in one label never aborts the batch.
//!
//! # Example
//!
//! ```no_run
//! use segmesh_export::{ExportRequest, Exporter, LabelCatalog, SegmentSelection};
//!
//! let catalog = LabelCatalog::load("openmap_level1.csv")?;
//! let request = ExportRequest::new(SegmentSelection::Group("key_structures".into()))
//!     .with_output_dir("meshes");
//!
//! let summary = Exporter::new(catalog).export_path("seg.nii".as_ref(), &request)?;
//! println!("{summary}");
//! for (result, failure) in summary.failures() {
//!     eprintln!("{} ({}): {failure}", result.name, result.label);
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

mod error;

pub mod catalog;
pub mod config;
pub mod naming;
pub mod orchestrator;
pub mod request;
pub mod summary;

pub use catalog::{ALL_GROUP, LabelCatalog, SegmentDescriptor, fallback_name, labels_present};
pub use config::{ExportConfig, SpacingSpec, parse_format};
pub use error::{BatchResult, CatalogError, ExportError, ExportErrorCode};
pub use naming::{sanitize_name, unique_stems};
pub use orchestrator::{CancelToken, Exporter};
pub use request::{EmptySegmentPolicy, ExportRequest, NamingMode, ResolvedTargets, SegmentSelection};
pub use summary::{ExportResult, ExportSummary, FailureStage, SegmentFailure, SegmentStatus};
