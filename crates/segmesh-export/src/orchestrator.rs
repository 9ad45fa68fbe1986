//! Batch export of many labels from one volume.
//!
//! A batch is validated as a whole before any surface is extracted:
//! numeric parameters, then the selection, then the output directory. The
//! grid is then scanned once for the bounds of every label, and each segment
//! runs independently through
//! `Extracting → PostProcessing → Writing`. Errors and panics inside a segment
//! are recorded in its [`ExportResult`] and never stop the batch.

use rayon::prelude::*;
use std::any::Any;
use std::borrow::Cow;
use std::cell::Cell;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;
use tracing::{debug, info, warn};

use segmesh_mesh::tracing_ext::OperationTimer;
use segmesh_mesh::{Mesh, MeshFormat, PostProcessParams, post_process, write_mesh};
use segmesh_volume::{
    LabelId, LabelVolume, LoadOptions, ResampleParams, VoxelBounds, extract_label_in, resample_nearest,
};

use crate::catalog::LabelCatalog;
use crate::error::{BatchResult, ExportError};
use crate::naming::unique_stems;
use crate::request::{EmptySegmentPolicy, ExportRequest, NamingMode};
use crate::summary::{ExportResult, ExportSummary, FailureStage, SegmentFailure, SegmentStatus};

/// Shared flag that stops a running batch from starting new segments.
///
/// Segments already in progress finish normally; segments not yet started
/// are recorded as failed at the `Cancelled` stage.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// One segment's work order.
#[derive(Debug)]
struct SegmentPlan {
    label: LabelId,
    name: String,
    path: PathBuf,
}

/// Successful end states of one segment.
enum SegmentDone {
    Written { vertices: usize, faces: usize },
    Empty { placeholder: bool },
}

/// Runs export requests against a label catalog.
#[derive(Debug, Clone, Default)]
pub struct Exporter {
    catalog: LabelCatalog,
    cancel: CancelToken,
}

impl Exporter {
    pub fn new(catalog: LabelCatalog) -> Self {
        Self {
            catalog,
            cancel: CancelToken::new(),
        }
    }

    /// Use an externally owned cancellation token.
    pub fn with_cancel(mut self, token: CancelToken) -> Self {
        self.cancel = token;
        self
    }

    /// Token that cancels batches run by this exporter.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn catalog(&self) -> &LabelCatalog {
        &self.catalog
    }

    /// Load a volume and export it.
    ///
    /// Numeric parameters are checked before the volume is read. Load
    /// failures stop the batch.
    pub fn export_path(&self, path: &Path, request: &ExportRequest) -> BatchResult<ExportSummary> {
        request.validate()?;
        let volume = LabelVolume::load_with(path, &LoadOptions::default())?;
        self.export(&volume, request)
    }

    /// Export the selected labels of `volume`.
    pub fn export(&self, volume: &LabelVolume, request: &ExportRequest) -> BatchResult<ExportSummary> {
        let start = Instant::now();
        let _timer = OperationTimer::new("export_batch");

        request.validate()?;
        let targets = request.resolve(&self.catalog, volume)?;
        let output_dir = prepare_output_dir(&request.output_dir)?;

        let plans = self.plan(targets.as_slice(), request, &output_dir);

        let volume = match request.resample_spacing {
            Some(spacing) => Cow::Owned(resample_nearest(volume, &ResampleParams::new(spacing))?),
            None => Cow::Borrowed(volume),
        };
        let bounds = volume.all_label_bounds();

        info!(
            segments = plans.len(),
            format = %request.format,
            output_dir = %output_dir.display(),
            workers = request.workers,
            "Starting export"
        );

        let params = request.post_process_params();
        let run = |plan: &SegmentPlan| {
            let label_bounds = bounds.get(&plan.label).copied();
            self.run_segment(&volume, label_bounds, plan, request, &params)
        };

        let results: Vec<ExportResult> = if request.workers <= 1 {
            plans.iter().map(run).collect()
        } else {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(request.workers)
                .thread_name(|i| format!("segmesh-export-{i}"))
                .build()
                .map_err(|e| ExportError::invalid(format!("cannot start worker pool: {e}")))?;
            // Indexed collect keeps target order.
            pool.install(|| plans.par_iter().map(run).collect())
        };

        let summary = ExportSummary::new(
            output_dir,
            results,
            start.elapsed().as_secs_f64() * 1000.0,
        );
        info!(
            succeeded = summary.succeeded,
            empty = summary.empty,
            failed = summary.failed,
            "Export finished"
        );
        Ok(summary)
    }

    /// Resolve names and output paths for every target.
    fn plan(&self, labels: &[LabelId], request: &ExportRequest, output_dir: &Path) -> Vec<SegmentPlan> {
        let entries: Vec<(LabelId, String)> = labels
            .iter()
            .map(|&label| {
                let name = match request.naming {
                    NamingMode::Anatomical => self.catalog.name(label),
                    NamingMode::NumericId => label.to_string(),
                };
                (label, name)
            })
            .collect();

        let extension = request.format.extension();
        let stems = unique_stems(&entries);
        entries
            .into_iter()
            .zip(stems)
            .map(|((label, name), stem)| SegmentPlan {
                label,
                name,
                path: output_dir.join(format!("{stem}.{extension}")),
            })
            .collect()
    }

    fn run_segment(
        &self,
        volume: &LabelVolume,
        bounds: Option<VoxelBounds>,
        plan: &SegmentPlan,
        request: &ExportRequest,
        params: &PostProcessParams,
    ) -> ExportResult {
        let mut result = ExportResult {
            label: plan.label,
            name: plan.name.clone(),
            status: SegmentStatus::Succeeded,
            output_path: None,
            vertex_count: 0,
            face_count: 0,
            elapsed_ms: 0.0,
        };

        if self.cancel.is_cancelled() {
            debug!(label = plan.label, "Batch cancelled; segment not started");
            result.status = SegmentStatus::Failed(SegmentFailure::new(
                FailureStage::Cancelled,
                "export cancelled before this segment started",
            ));
            return result;
        }

        let timer = OperationTimer::for_label("export_segment", plan.label);
        let stage = Cell::new(FailureStage::Extraction);
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            process_segment(
                volume,
                bounds,
                plan,
                request.format,
                request.empty_policy,
                params,
                &stage,
            )
        }));
        result.elapsed_ms = timer.elapsed_ms();

        match outcome {
            Ok(Ok(SegmentDone::Written { vertices, faces })) => {
                result.vertex_count = vertices;
                result.face_count = faces;
                result.output_path = Some(plan.path.clone());
                info!(
                    label = plan.label,
                    name = %plan.name,
                    vertices,
                    faces,
                    path = %plan.path.display(),
                    "Segment exported"
                );
            }
            Ok(Ok(SegmentDone::Empty { placeholder })) => {
                result.status = SegmentStatus::Empty;
                if placeholder {
                    result.output_path = Some(plan.path.clone());
                }
                info!(label = plan.label, name = %plan.name, placeholder, "Segment is empty");
            }
            Ok(Err(failure)) => {
                warn!(label = plan.label, name = %plan.name, %failure, "Segment failed");
                result.status = SegmentStatus::Failed(failure);
            }
            Err(payload) => {
                let failure = SegmentFailure::new(
                    stage.get(),
                    format!("panicked: {}", panic_message(payload.as_ref())),
                );
                warn!(label = plan.label, name = %plan.name, %failure, "Segment panicked");
                result.status = SegmentStatus::Failed(failure);
            }
        }
        result
    }
}

/// Extract, post-process and write one segment, tracking the current stage.
///
/// `bounds` is `None` when the label does not occur in the volume.
fn process_segment(
    volume: &LabelVolume,
    bounds: Option<VoxelBounds>,
    plan: &SegmentPlan,
    format: MeshFormat,
    empty_policy: EmptySegmentPolicy,
    params: &PostProcessParams,
    stage: &Cell<FailureStage>,
) -> Result<SegmentDone, SegmentFailure> {
    stage.set(FailureStage::Extraction);
    #[cfg(test)]
    fault::check(plan.label, FailureStage::Extraction);
    let mesh = match bounds {
        Some(bounds) => extract_label_in(volume, plan.label, bounds)
            .map_err(|e| SegmentFailure::new(FailureStage::Extraction, e.to_string()))?,
        None => Mesh::new(),
    };

    if mesh.is_empty() {
        return match empty_policy {
            EmptySegmentPolicy::Skip => Ok(SegmentDone::Empty { placeholder: false }),
            EmptySegmentPolicy::WritePlaceholder => {
                stage.set(FailureStage::Write);
                #[cfg(test)]
                fault::check(plan.label, FailureStage::Write);
                write_mesh(&mesh, &plan.path, format)
                    .map_err(|e| SegmentFailure::new(FailureStage::Write, error_chain(&e)))?;
                Ok(SegmentDone::Empty { placeholder: true })
            }
        };
    }
    debug!(
        label = plan.label,
        vertices = mesh.vertex_count(),
        faces = mesh.face_count(),
        "Extracted surface"
    );

    stage.set(FailureStage::PostProcess);
    #[cfg(test)]
    fault::check(plan.label, FailureStage::PostProcess);
    let processed = post_process(mesh, params)
        .map_err(|e| SegmentFailure::new(FailureStage::PostProcess, e.to_string()))?;

    stage.set(FailureStage::Write);
    #[cfg(test)]
    fault::check(plan.label, FailureStage::Write);
    write_mesh(&processed.mesh, &plan.path, format)
        .map_err(|e| SegmentFailure::new(FailureStage::Write, error_chain(&e)))?;

    Ok(SegmentDone::Written {
        vertices: processed.mesh.vertex_count(),
        faces: processed.mesh.face_count(),
    })
}

/// Create the output directory and prove it accepts new files.
///
/// Returns the directory mesh paths are built from. A path with `..`
/// components is replaced by its canonical form, since the mesh writer
/// refuses such paths.
fn prepare_output_dir(dir: &Path) -> BatchResult<PathBuf> {
    let output_error = |source| ExportError::OutputDirectory {
        path: dir.to_path_buf(),
        source,
    };

    std::fs::create_dir_all(dir).map_err(output_error)?;
    let resolved = if dir.components().any(|c| matches!(c, Component::ParentDir)) {
        dir.canonicalize().map_err(output_error)?
    } else {
        dir.to_path_buf()
    };

    // The check file is removed when dropped.
    tempfile::Builder::new()
        .prefix(".segmesh-write-check-")
        .tempfile_in(&resolved)
        .map_err(output_error)?;
    debug!(path = %resolved.display(), "Output directory is writable");
    Ok(resolved)
}

/// Error message with its source chain, e.g. "failed to write mesh to x: Is a directory".
fn error_chain(err: &dyn std::error::Error) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Test-only panics at a chosen label and stage.
#[cfg(test)]
mod fault {
    use super::*;

    thread_local! {
        static PANIC_AT: Cell<Option<(LabelId, FailureStage)>> = const { Cell::new(None) };
    }

    pub(super) fn panic_at(target: Option<(LabelId, FailureStage)>) {
        PANIC_AT.with(|f| f.set(target));
    }

    pub(super) fn check(label: LabelId, stage: FailureStage) {
        if PANIC_AT.with(Cell::get) == Some((label, stage)) {
            panic!("fault in {stage} of label {label}");
        }
    }
}
