//! Per-segment outcomes and the batch summary.

use serde::Serialize;
use std::fmt;
use std::path::PathBuf;

use segmesh_volume::LabelId;

/// Pipeline stage at which a segment failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureStage {
    Extraction,
    PostProcess,
    Write,
    /// The batch was cancelled before the segment started.
    Cancelled,
}

impl fmt::Display for FailureStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FailureStage::Extraction => "extraction",
            FailureStage::PostProcess => "post-processing",
            FailureStage::Write => "write",
            FailureStage::Cancelled => "cancelled",
        })
    }
}

/// Why a segment failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SegmentFailure {
    pub stage: FailureStage,
    pub reason: String,
}

impl SegmentFailure {
    pub fn new(stage: FailureStage, reason: impl Into<String>) -> Self {
        Self {
            stage,
            reason: reason.into(),
        }
    }
}

impl fmt::Display for SegmentFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} failed: {}", self.stage, self.reason)
    }
}

/// Final state of one segment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SegmentStatus {
    Succeeded,
    /// The label has no surface in the volume.
    Empty,
    Failed(SegmentFailure),
}

/// Outcome of exporting one label.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExportResult {
    pub label: LabelId,
    /// Resolved name, before sanitizing for the file system.
    pub name: String,
    #[serde(flatten)]
    pub status: SegmentStatus,
    /// Written file, if any.
    pub output_path: Option<PathBuf>,
    pub vertex_count: usize,
    pub face_count: usize,
    pub elapsed_ms: f64,
}

impl ExportResult {
    pub fn is_succeeded(&self) -> bool {
        self.status == SegmentStatus::Succeeded
    }

    pub fn is_empty(&self) -> bool {
        self.status == SegmentStatus::Empty
    }

    pub fn failure(&self) -> Option<&SegmentFailure> {
        match &self.status {
            SegmentStatus::Failed(failure) => Some(failure),
            _ => None,
        }
    }
}

/// Results of one batch, in target order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExportSummary {
    pub output_dir: PathBuf,
    pub results: Vec<ExportResult>,
    pub succeeded: usize,
    pub empty: usize,
    pub failed: usize,
    pub elapsed_ms: f64,
}

impl ExportSummary {
    pub fn new(output_dir: PathBuf, results: Vec<ExportResult>, elapsed_ms: f64) -> Self {
        let succeeded = results.iter().filter(|r| r.is_succeeded()).count();
        let empty = results.iter().filter(|r| r.is_empty()).count();
        let failed = results.len() - succeeded - empty;
        Self {
            output_dir,
            results,
            succeeded,
            empty,
            failed,
            elapsed_ms,
        }
    }

    pub fn total(&self) -> usize {
        self.results.len()
    }

    /// Result for one label.
    pub fn result(&self, label: LabelId) -> Option<&ExportResult> {
        self.results.iter().find(|r| r.label == label)
    }

    /// Failed segments with their reasons.
    pub fn failures(&self) -> impl Iterator<Item = (&ExportResult, &SegmentFailure)> {
        self.results
            .iter()
            .filter_map(|r| r.failure().map(|failure| (r, failure)))
    }

    /// Paths of all files written, in target order.
    pub fn written_files(&self) -> impl Iterator<Item = &PathBuf> {
        self.results.iter().filter_map(|r| r.output_path.as_ref())
    }

    /// True when no segment failed.
    pub fn is_success(&self) -> bool {
        self.failed == 0
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

impl fmt::Display for ExportSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} segments: {} succeeded, {} empty, {} failed",
            self.total(),
            self.succeeded,
            self.empty,
            self.failed
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(label: LabelId, status: SegmentStatus) -> ExportResult {
        ExportResult {
            label,
            name: format!("segment_{label}"),
            output_path: matches!(status, SegmentStatus::Succeeded)
                .then(|| PathBuf::from(format!("out/segment_{label}.stl"))),
            status,
            vertex_count: 0,
            face_count: 0,
            elapsed_ms: 1.0,
        }
    }

    fn summary() -> ExportSummary {
        ExportSummary::new(
            PathBuf::from("out"),
            vec![
                result(1, SegmentStatus::Succeeded),
                result(2, SegmentStatus::Empty),
                result(
                    3,
                    SegmentStatus::Failed(SegmentFailure::new(FailureStage::Write, "disk full")),
                ),
            ],
            3.0,
        )
    }

    #[test]
    fn test_counts() {
        let s = summary();
        assert_eq!((s.succeeded, s.empty, s.failed), (1, 1, 1));
        assert!(!s.is_success());
        assert_eq!(s.to_string(), "3 segments: 1 succeeded, 1 empty, 1 failed");
        assert_eq!(s.written_files().count(), 1);

        let (r, failure) = s.failures().next().unwrap();
        assert_eq!(r.label, 3);
        assert_eq!(failure.to_string(), "write failed: disk full");
    }

    #[test]
    fn test_json_shape() {
        let json: serde_json::Value = serde_json::from_str(&summary().to_json().unwrap()).unwrap();
        let results = json["results"].as_array().unwrap();
        assert_eq!(results[0]["status"], "succeeded");
        assert_eq!(results[1]["status"], "empty");
        assert_eq!(results[2]["status"], "failed");
        assert_eq!(results[2]["stage"], "write");
        assert_eq!(results[2]["reason"], "disk full");
        assert_eq!(json["failed"], 1);
    }
}
