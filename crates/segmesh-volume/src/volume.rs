//! In-memory labeled volume.

use hashbrown::HashMap;
use nalgebra::{Matrix3, Point3, Vector3};
use rayon::prelude::*;
use std::collections::BTreeMap;
use std::path::Path;

use crate::error::{VolumeError, VolumeResult};
use crate::nifti::{LoadOptions, load_nifti};

/// Integer segment label. 0 is background.
pub type LabelId = u32;

/// The background label, never exported.
pub const BACKGROUND: LabelId = 0;

/// Default upper bound on voxel count accepted by the loader and the resampler.
pub const DEFAULT_MAX_VOXELS: u64 = 2_000_000_000;

/// Inclusive voxel-index bounding box.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VoxelBounds {
    /// Minimum corner (inclusive).
    pub min: [usize; 3],
    /// Maximum corner (inclusive).
    pub max: [usize; 3],
}

impl VoxelBounds {
    fn single(p: [usize; 3]) -> Self {
        Self { min: p, max: p }
    }

    fn merge(self, other: Self) -> Self {
        Self {
            min: std::array::from_fn(|a| self.min[a].min(other.min[a])),
            max: std::array::from_fn(|a| self.max[a].max(other.max[a])),
        }
    }

    /// Extent along each axis, in voxels.
    pub fn extent(&self) -> [usize; 3] {
        std::array::from_fn(|a| self.max[a] - self.min[a] + 1)
    }
}

/// A 3D grid of integer labels with physical geometry.
///
/// Labels are stored x-fastest. The world position of voxel index `g` is
/// `origin + direction * (g ∘ spacing)`; voxel centers sit at integer indices.
#[derive(Debug, Clone, PartialEq)]
pub struct LabelVolume {
    dims: [usize; 3],
    spacing: [f64; 3],
    origin: Point3<f64>,
    direction: Matrix3<f64>,
    labels: Vec<LabelId>,
}

impl LabelVolume {
    /// Build a volume from x-fastest label data.
    ///
    /// Fails when any spacing component is not a positive finite number, a
    /// dimension is zero, or `labels` does not hold exactly one value per voxel.
    pub fn new(dims: [usize; 3], labels: Vec<LabelId>, spacing: [f64; 3]) -> VolumeResult<Self> {
        validate_spacing(spacing)?;

        if dims.contains(&0) {
            return Err(VolumeError::InvalidDimensions {
                dims,
                details: "every dimension must be at least 1".into(),
            });
        }
        let expected = dims
            .iter()
            .try_fold(1usize, |acc, &d| acc.checked_mul(d))
            .ok_or_else(|| VolumeError::InvalidDimensions {
                dims,
                details: "voxel count overflows usize".into(),
            })?;
        if labels.len() != expected {
            return Err(VolumeError::InvalidDimensions {
                dims,
                details: format!("expected {expected} labels, got {}", labels.len()),
            });
        }

        Ok(Self {
            dims,
            spacing,
            origin: Point3::origin(),
            direction: Matrix3::identity(),
            labels,
        })
    }

    /// Load a NIfTI-1 label volume with default options.
    pub fn load(path: impl AsRef<Path>) -> VolumeResult<Self> {
        load_nifti(path.as_ref(), &LoadOptions::default())
    }

    /// Load a NIfTI-1 label volume with explicit options.
    pub fn load_with(path: impl AsRef<Path>, options: &LoadOptions) -> VolumeResult<Self> {
        load_nifti(path.as_ref(), options)
    }

    /// Set the world position of voxel (0, 0, 0).
    pub fn with_origin(mut self, origin: Point3<f64>) -> Self {
        self.origin = origin;
        self
    }

    /// Set the direction matrix (columns are the world directions of i, j, k).
    pub fn with_direction(mut self, direction: Matrix3<f64>) -> Self {
        self.direction = direction;
        self
    }

    pub fn dims(&self) -> [usize; 3] {
        self.dims
    }

    pub fn spacing(&self) -> [f64; 3] {
        self.spacing
    }

    pub fn origin(&self) -> Point3<f64> {
        self.origin
    }

    pub fn direction(&self) -> Matrix3<f64> {
        self.direction
    }

    /// Raw x-fastest label data.
    pub fn labels(&self) -> &[LabelId] {
        &self.labels
    }

    /// Total number of voxels.
    pub fn voxel_count(&self) -> usize {
        self.labels.len()
    }

    /// Linear index of voxel (x, y, z).
    #[inline]
    pub fn index(&self, x: usize, y: usize, z: usize) -> usize {
        x + self.dims[0] * (y + self.dims[1] * z)
    }

    /// Label at (x, y, z), or `None` outside the grid.
    #[inline]
    pub fn label_at(&self, x: usize, y: usize, z: usize) -> Option<LabelId> {
        if x < self.dims[0] && y < self.dims[1] && z < self.dims[2] {
            Some(self.labels[self.index(x, y, z)])
        } else {
            None
        }
    }

    /// Label at a signed index; anything outside the grid is background.
    #[inline]
    pub(crate) fn label_or_background(&self, p: [i64; 3]) -> LabelId {
        if p.iter().any(|&c| c < 0) {
            return BACKGROUND;
        }
        self.label_at(p[0] as usize, p[1] as usize, p[2] as usize)
            .unwrap_or(BACKGROUND)
    }

    /// World position of a (possibly fractional) grid coordinate.
    pub fn world_position(&self, grid: Point3<f64>) -> Point3<f64> {
        let scaled = grid
            .coords
            .component_mul(&Vector3::from(self.spacing));
        self.origin + self.direction * scaled
    }

    /// Whether the direction matrix mirrors space.
    pub fn is_mirrored(&self) -> bool {
        self.direction.determinant() < 0.0
    }

    /// Bounding box of one label, or `None` if the label is absent.
    pub fn label_bounds(&self, label: LabelId) -> Option<VoxelBounds> {
        let [nx, ny, _] = self.dims;
        self.labels
            .par_chunks(nx * ny)
            .enumerate()
            .filter_map(|(z, slice)| {
                slice
                    .iter()
                    .enumerate()
                    .filter(|&(_, &l)| l == label)
                    .map(|(i, _)| VoxelBounds::single([i % nx, i / nx, z]))
                    .reduce(VoxelBounds::merge)
            })
            .reduce_with(VoxelBounds::merge)
    }

    /// Bounding boxes of every non-background label, from one scan of the grid.
    pub fn all_label_bounds(&self) -> BTreeMap<LabelId, VoxelBounds> {
        let [nx, ny, _] = self.dims;
        self.labels
            .par_chunks(nx * ny)
            .enumerate()
            .map(|(z, slice)| {
                let mut bounds = HashMap::new();
                for (i, &label) in slice.iter().enumerate() {
                    if label != BACKGROUND {
                        merge_into(&mut bounds, label, VoxelBounds::single([i % nx, i / nx, z]));
                    }
                }
                bounds
            })
            .reduce(HashMap::new, |mut acc, slice| {
                for (label, b) in slice {
                    merge_into(&mut acc, label, b);
                }
                acc
            })
            .into_iter()
            .collect()
    }

    /// Number of voxels carrying `label`.
    pub fn count_label(&self, label: LabelId) -> usize {
        self.labels.par_iter().filter(|&&l| l == label).count()
    }
}

fn merge_into(map: &mut HashMap<LabelId, VoxelBounds>, label: LabelId, bounds: VoxelBounds) {
    map.entry(label)
        .and_modify(|b| *b = b.merge(bounds))
        .or_insert(bounds);
}

pub(crate) fn validate_spacing(spacing: [f64; 3]) -> VolumeResult<()> {
    if spacing.iter().all(|s| s.is_finite() && *s > 0.0) {
        Ok(())
    } else {
        Err(VolumeError::InvalidSpacing { spacing })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn volume_3x2x2() -> LabelVolume {
        #[rustfmt::skip]
        let labels = vec![
            0, 1, 0,
            0, 1, 2,
            0, 0, 0,
            5, 1, 0,
        ];
        LabelVolume::new([3, 2, 2], labels, [1.0, 1.0, 2.0]).unwrap()
    }

    #[test]
    fn test_x_fastest_indexing() {
        let v = volume_3x2x2();
        assert_eq!(v.label_at(1, 0, 0), Some(1));
        assert_eq!(v.label_at(2, 1, 0), Some(2));
        assert_eq!(v.label_at(0, 1, 1), Some(5));
        assert_eq!(v.label_at(3, 0, 0), None);
        assert_eq!(v.label_or_background([-1, 0, 0]), BACKGROUND);
    }

    #[test]
    fn test_rejects_bad_spacing() {
        for spacing in [[0.0, 1.0, 1.0], [1.0, -1.0, 1.0], [1.0, 1.0, f64::NAN]] {
            let err = LabelVolume::new([1, 1, 1], vec![0], spacing).unwrap_err();
            assert!(matches!(err, VolumeError::InvalidSpacing { .. }));
        }
    }

    #[test]
    fn test_rejects_mismatched_length() {
        let err = LabelVolume::new([2, 2, 2], vec![0; 7], [1.0; 3]).unwrap_err();
        assert!(matches!(err, VolumeError::InvalidDimensions { .. }));

        let err = LabelVolume::new([0, 2, 2], vec![], [1.0; 3]).unwrap_err();
        assert!(matches!(err, VolumeError::InvalidDimensions { .. }));
    }

    #[test]
    fn test_label_bounds() {
        let v = volume_3x2x2();
        let b = v.label_bounds(1).unwrap();
        assert_eq!(b.min, [1, 0, 0]);
        assert_eq!(b.max, [1, 1, 1]);
        assert_eq!(b.extent(), [1, 2, 2]);
        assert!(v.label_bounds(42).is_none());
    }

    #[test]
    fn test_all_label_bounds_match_single_scans() {
        let v = volume_3x2x2();
        let all = v.all_label_bounds();
        assert_eq!(all.keys().copied().collect::<Vec<_>>(), vec![1, 2, 5]);
        for (&label, bounds) in &all {
            assert_eq!(Some(*bounds), v.label_bounds(label));
        }
    }

    #[test]
    fn test_count_label() {
        let v = volume_3x2x2();
        assert_eq!(v.count_label(1), 3);
        assert_eq!(v.count_label(0), 7);
        assert_eq!(v.count_label(9), 0);
    }

    #[test]
    fn test_world_position() {
        let v = volume_3x2x2()
            .with_origin(Point3::new(10.0, 20.0, 30.0))
            .with_direction(Matrix3::new(-1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0));

        let p = v.world_position(Point3::new(1.0, 1.0, 1.0));
        assert_relative_eq!(p, Point3::new(9.0, 21.0, 32.0));
        assert!(v.is_mirrored());
    }
}
