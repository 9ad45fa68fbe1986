//! Labeled volumes and per-label surface extraction.
//!
//! This crate turns a segmentation volume (a 3D grid of integer labels) into
//! one closed triangle surface per label:
//!
//! 1. **Load** a NIfTI-1 label volume ([`LabelVolume::load`])
//! 2. **Resample** it onto a new spacing with nearest-label interpolation ([`resample_nearest`])
//! 3. **Extract** the surface of one label by marching tetrahedra ([`extract_label`])
//!
//! # Example
//!
//! ```
//! use segmesh_volume::{LabelVolume, extract_label};
//!
//! // A single voxel of label 7 in a 3x3x3 grid with 1 mm spacing.
//! let mut labels = vec![0; 27];
//! labels[13] = 7;
//! let volume = LabelVolume::new([3, 3, 3], labels, [1.0, 1.0, 1.0]).unwrap();
//!
//! let mesh = extract_label(&volume, 7).unwrap();
//! assert_eq!(mesh.face_count(), 24);
//! assert!(mesh.signed_volume() > 0.0);
//! ```
//!
//! # Coordinates
//!
//! Voxel centers sit at integer indices. The world position of index `g` is
//! `origin + direction * (g ∘ spacing)`, taken from the NIfTI sform or qform.

mod error;

pub mod extract;
pub mod nifti;
pub mod resample;
pub mod volume;

pub use error::{VolumeError, VolumeErrorCode, VolumeResult};
pub use extract::{extract_label, extract_label_in};
pub use crate::nifti::{LoadOptions, load_nifti};
pub use resample::{ResampleParams, resample_nearest, resampled_dims};
pub use volume::{BACKGROUND, DEFAULT_MAX_VOXELS, LabelId, LabelVolume, VoxelBounds};
