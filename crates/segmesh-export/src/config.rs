//! File-based export settings.
//!
//! An `ExportConfig` holds the request parameters a user wants to reuse across
//! runs. Every field is optional; fields that are set override the request
//! they are applied to.
//!
//! ```toml
//! output_dir = "meshes/key"
//! format = "obj"
//! smooth_iterations = 10
//! decimate_reduction = 0.1
//! resample_spacing = 0.5
//! empty_policy = "write_placeholder"
//! labels_file = "openmap_level1.csv"
//!
//! [selection]
//! group = "key_structures"
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use segmesh_mesh::MeshFormat;

use crate::error::{BatchResult, ExportError};
use crate::request::{EmptySegmentPolicy, ExportRequest, NamingMode, SegmentSelection};

/// Voxel spacing given as one isotropic value or one value per axis.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SpacingSpec {
    Isotropic(f64),
    PerAxis([f64; 3]),
}

impl SpacingSpec {
    pub fn to_array(self) -> [f64; 3] {
        match self {
            SpacingSpec::Isotropic(s) => [s; 3],
            SpacingSpec::PerAxis(s) => s,
        }
    }
}

/// Export settings loaded from TOML or JSON.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExportConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selection: Option<SegmentSelection>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_dir: Option<PathBuf>,
    /// Format token, checked when the config is applied.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resample_spacing: Option<SpacingSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub smooth_iterations: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub smooth_relaxation: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decimate_reduction: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compute_normals: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub naming: Option<NamingMode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub empty_policy: Option<EmptySegmentPolicy>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workers: Option<usize>,
    /// Label table to build the catalog from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub labels_file: Option<PathBuf>,
}

impl ExportConfig {
    /// Load from a file: `.json` as JSON, anything else as TOML.
    ///
    /// A relative `labels_file` is resolved against the config file's directory.
    pub fn load(path: impl AsRef<Path>) -> BatchResult<Self> {
        let path = path.as_ref();
        let config_error = |details: String| ExportError::Config {
            path: path.to_path_buf(),
            details,
        };

        let contents = std::fs::read_to_string(path).map_err(|e| config_error(e.to_string()))?;
        let is_json = path
            .extension()
            .is_some_and(|e| e.eq_ignore_ascii_case("json"));
        let mut config = if is_json {
            Self::from_json(&contents)
        } else {
            Self::from_toml(&contents)
        }
        .map_err(config_error)?;

        if let (Some(labels), Some(dir)) = (&config.labels_file, path.parent()) {
            if labels.is_relative() {
                config.labels_file = Some(dir.join(labels));
            }
        }
        Ok(config)
    }

    pub fn from_toml(contents: &str) -> Result<Self, String> {
        toml::from_str(contents).map_err(|e| e.to_string())
    }

    pub fn from_json(contents: &str) -> Result<Self, String> {
        serde_json::from_str(contents).map_err(|e| e.to_string())
    }

    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Overlay the fields that are set onto `request`.
    ///
    /// The format token is parsed first; an unknown token fails with
    /// `UnsupportedFormat` before anything else is looked at.
    pub fn apply(&self, mut request: ExportRequest) -> BatchResult<ExportRequest> {
        if let Some(token) = &self.format {
            request.format = parse_format(token)?;
        }
        if let Some(selection) = &self.selection {
            request.targets = selection.clone();
        }
        if let Some(dir) = &self.output_dir {
            request.output_dir = dir.clone();
        }
        if let Some(spacing) = self.resample_spacing {
            request.resample_spacing = Some(spacing.to_array());
        }
        if let Some(iterations) = self.smooth_iterations {
            request.smooth_iterations = iterations;
        }
        if let Some(relaxation) = self.smooth_relaxation {
            request.smooth_relaxation = relaxation;
        }
        if let Some(reduction) = self.decimate_reduction {
            request.decimate_reduction = reduction;
        }
        if let Some(normals) = self.compute_normals {
            request.compute_normals = normals;
        }
        if let Some(naming) = self.naming {
            request.naming = naming;
        }
        if let Some(policy) = self.empty_policy {
            request.empty_policy = policy;
        }
        if let Some(workers) = self.workers {
            request.workers = workers;
        }
        Ok(request)
    }
}

/// Parse a format token into a [`MeshFormat`].
pub fn parse_format(token: &str) -> BatchResult<MeshFormat> {
    token.parse().map_err(|_| ExportError::UnsupportedFormat {
        token: token.to_string(),
    })
}
