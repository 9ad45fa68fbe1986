//! Tracing helpers shared by the segmesh crates.
//!
//! Timing events go to the `segmesh::timing` target, so they can be filtered
//! independently of the rest:
//!
//! ```text
//! RUST_LOG=segmesh::timing=info,segmesh_export=debug segmesh export ...
//! ```

use std::time::Instant;
use tracing::{debug, info};

/// A performance timer that logs its duration on drop.
///
/// # Example
///
/// ```rust
/// use segmesh_mesh::tracing_ext::OperationTimer;
///
/// let timer = OperationTimer::new("extract");
/// // ... do work ...
/// let _elapsed = timer.elapsed_ms();
/// ```
pub struct OperationTimer {
    name: &'static str,
    start: Instant,
}

impl OperationTimer {
    /// Create a new operation timer.
    pub fn new(name: &'static str) -> Self {
        debug!(target: "segmesh::timing", operation = name, "Starting operation");
        Self {
            name,
            start: Instant::now(),
        }
    }

    /// Create a timer tagged with the segment label it works on.
    pub fn for_label(name: &'static str, label: u32) -> Self {
        debug!(
            target: "segmesh::timing",
            operation = name,
            label,
            "Starting operation"
        );
        Self {
            name,
            start: Instant::now(),
        }
    }

    /// Elapsed time in milliseconds.
    pub fn elapsed_ms(&self) -> f64 {
        self.start.elapsed().as_secs_f64() * 1000.0
    }
}

impl Drop for OperationTimer {
    fn drop(&mut self) {
        info!(
            target: "segmesh::timing",
            operation = self.name,
            elapsed_ms = format!("{:.2}", self.elapsed_ms()),
            "Operation completed"
        );
    }
}
