//! Export requests and label selections.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::path::PathBuf;
use tracing::warn;

use segmesh_mesh::{MeshFormat, PostProcessParams, SmoothParams};
use segmesh_volume::{BACKGROUND, LabelId, LabelVolume};

use crate::catalog::LabelCatalog;
use crate::error::{BatchResult, ExportError};

/// Which labels a request exports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SegmentSelection {
    /// One label.
    Single(LabelId),
    /// Explicit labels, exported in the given order.
    List(Vec<LabelId>),
    /// A named catalog group.
    Group(String),
    /// Every non-background label present in the volume, ascending.
    AllPresent,
}

impl fmt::Display for SegmentSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SegmentSelection::Single(id) => write!(f, "label {id}"),
            SegmentSelection::List(ids) => {
                let ids: Vec<String> = ids.iter().map(ToString::to_string).collect();
                write!(f, "labels [{}]", ids.join(", "))
            }
            SegmentSelection::Group(name) => write!(f, "group {name:?}"),
            SegmentSelection::AllPresent => write!(f, "all present labels"),
        }
    }
}

/// How output files are named.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NamingMode {
    /// Catalog name, falling back to `segment_<id>`.
    #[default]
    Anatomical,
    /// The numeric label id.
    NumericId,
}

/// What to do with a label whose surface has no faces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmptySegmentPolicy {
    /// Record the segment as empty and write nothing.
    #[default]
    Skip,
    /// Record the segment as empty and write a valid file with no geometry.
    WritePlaceholder,
}

/// Everything one export batch needs besides the volume and the catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportRequest {
    pub targets: SegmentSelection,
    /// Resample the volume to this spacing (mm) before extraction.
    pub resample_spacing: Option<[f64; 3]>,
    pub smooth_iterations: usize,
    pub smooth_relaxation: f64,
    /// Fraction of triangles to remove, in [0, 1).
    pub decimate_reduction: f64,
    /// Compute vertex normals for formats that store them.
    pub compute_normals: bool,
    pub format: MeshFormat,
    pub output_dir: PathBuf,
    pub naming: NamingMode,
    pub empty_policy: EmptySegmentPolicy,
    /// Segments processed concurrently. 1 is sequential.
    pub workers: usize,
}

impl Default for ExportRequest {
    fn default() -> Self {
        let smooth = SmoothParams::default();
        Self {
            targets: SegmentSelection::AllPresent,
            resample_spacing: None,
            smooth_iterations: smooth.iterations,
            smooth_relaxation: smooth.relaxation,
            decimate_reduction: 0.1,
            compute_normals: false,
            format: MeshFormat::Stl,
            output_dir: PathBuf::from("meshes"),
            naming: NamingMode::Anatomical,
            empty_policy: EmptySegmentPolicy::Skip,
            workers: 1,
        }
    }
}

impl ExportRequest {
    /// Default parameters for the given selection.
    pub fn new(targets: SegmentSelection) -> Self {
        Self {
            targets,
            ..Default::default()
        }
    }

    /// Every label in the volume, resampled to 0.5 mm, lightly smoothed.
    pub fn full_batch() -> Self {
        Self {
            targets: SegmentSelection::AllPresent,
            resample_spacing: Some([0.5; 3]),
            smooth_iterations: 5,
            decimate_reduction: 0.05,
            output_dir: PathBuf::from("meshes/all_segments"),
            ..Default::default()
        }
    }

    /// A hand-picked list of labels.
    pub fn custom_selection(ids: Vec<LabelId>) -> Self {
        Self {
            targets: SegmentSelection::List(ids),
            smooth_iterations: 10,
            decimate_reduction: 0.1,
            output_dir: PathBuf::from("meshes/custom_segments"),
            ..Default::default()
        }
    }

    /// The `key_structures` catalog group with default parameters.
    pub fn key_structures() -> Self {
        Self::new(SegmentSelection::Group("key_structures".into()))
    }

    pub fn with_format(mut self, format: MeshFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = dir.into();
        self
    }

    pub fn with_resample(mut self, spacing: [f64; 3]) -> Self {
        self.resample_spacing = Some(spacing);
        self
    }

    pub fn with_smoothing(mut self, iterations: usize) -> Self {
        self.smooth_iterations = iterations;
        self
    }

    pub fn with_reduction(mut self, reduction: f64) -> Self {
        self.decimate_reduction = reduction;
        self
    }

    pub fn with_naming(mut self, naming: NamingMode) -> Self {
        self.naming = naming;
        self
    }

    pub fn with_empty_policy(mut self, policy: EmptySegmentPolicy) -> Self {
        self.empty_policy = policy;
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    /// Check numeric parameters.
    pub fn validate(&self) -> BatchResult<()> {
        if let Some(spacing) = self.resample_spacing {
            if !spacing.iter().all(|s| s.is_finite() && *s > 0.0) {
                return Err(ExportError::invalid(format!(
                    "resample spacing {spacing:?} must be positive"
                )));
            }
        }
        if !(self.smooth_relaxation.is_finite()
            && self.smooth_relaxation > 0.0
            && self.smooth_relaxation <= 1.0)
        {
            return Err(ExportError::invalid(format!(
                "smoothing relaxation {} must be in (0, 1]",
                self.smooth_relaxation
            )));
        }
        if !(0.0..1.0).contains(&self.decimate_reduction) {
            return Err(ExportError::invalid(format!(
                "decimation reduction {} must be in [0, 1)",
                self.decimate_reduction
            )));
        }
        if self.workers == 0 {
            return Err(ExportError::invalid("worker count must be at least 1"));
        }
        Ok(())
    }

    /// Smoothing and decimation parameters for each segment.
    pub fn post_process_params(&self) -> PostProcessParams {
        PostProcessParams {
            smooth: SmoothParams {
                iterations: self.smooth_iterations,
                relaxation: self.smooth_relaxation,
            },
            decimate_reduction: self.decimate_reduction,
            compute_normals: self.compute_normals && self.format.carries_vertex_normals(),
        }
    }

    /// Turn the selection into the ordered list of labels to export.
    ///
    /// Repeats are dropped (first occurrence wins) and background is removed.
    /// Fails with `EmptySelection` when nothing is left.
    pub fn resolve(&self, catalog: &LabelCatalog, volume: &LabelVolume) -> BatchResult<ResolvedTargets> {
        let raw = match &self.targets {
            SegmentSelection::Single(id) => vec![*id],
            SegmentSelection::List(ids) => ids.clone(),
            SegmentSelection::Group(name) => catalog.expand_group(name)?,
            SegmentSelection::AllPresent => catalog.all_labels_present(volume),
        };

        if raw.contains(&BACKGROUND) {
            warn!(selection = %self.targets, "Label 0 is background and will not be exported");
        }

        let mut seen = HashSet::with_capacity(raw.len());
        let labels: Vec<LabelId> = raw
            .into_iter()
            .filter(|&id| id != BACKGROUND && seen.insert(id))
            .collect();

        if labels.is_empty() {
            return Err(ExportError::EmptySelection {
                selection: self.targets.to_string(),
            });
        }
        Ok(ResolvedTargets { labels })
    }
}

/// Ordered, de-duplicated, non-empty list of labels to export.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedTargets {
    labels: Vec<LabelId>,
}

impl ResolvedTargets {
    pub fn as_slice(&self) -> &[LabelId] {
        &self.labels
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    /// Never true once resolution has succeeded.
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = LabelId> + '_ {
        self.labels.iter().copied()
    }
}
