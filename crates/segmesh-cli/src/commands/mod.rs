//! Subcommand implementations.

pub mod export;
pub mod labels;

use std::path::Path;

use anyhow::{Context, Result};
use segmesh_export::LabelCatalog;

/// Load the label table, or an empty catalog when none is given.
pub fn load_catalog(path: Option<&Path>) -> Result<LabelCatalog> {
    match path {
        Some(path) => LabelCatalog::load(path)
            .with_context(|| format!("Failed to load label table from {}", path.display())),
        None => Ok(LabelCatalog::new()),
    }
}
