//! Nearest-label resampling onto a new voxel spacing.
//!
//! Nearest-neighbor is the only interpolation that never invents labels, so
//! every output voxel carries a label that exists in the input.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{VolumeError, VolumeResult};
use crate::volume::{DEFAULT_MAX_VOXELS, LabelId, LabelVolume, validate_spacing};

/// Parameters for [`resample_nearest`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResampleParams {
    /// Target spacing along x, y and z.
    pub spacing: [f64; 3],
    /// Results with more voxels than this fail with `GridTooLarge`.
    #[serde(default = "default_max_voxels")]
    pub max_voxels: u64,
}

fn default_max_voxels() -> u64 {
    DEFAULT_MAX_VOXELS
}

impl ResampleParams {
    pub fn new(spacing: [f64; 3]) -> Self {
        Self {
            spacing,
            max_voxels: DEFAULT_MAX_VOXELS,
        }
    }

    /// Same spacing on all three axes.
    pub fn isotropic(spacing: f64) -> Self {
        Self::new([spacing; 3])
    }
}

/// Output dimensions for resampling `dims` from `source` to `target` spacing.
///
/// Both grids share voxel (0, 0, 0); the output covers the same physical
/// extent without extrapolating past the last input voxel.
pub fn resampled_dims(dims: [usize; 3], source: [f64; 3], target: [f64; 3]) -> [usize; 3] {
    std::array::from_fn(|a| {
        let extent = (dims[a].saturating_sub(1)) as f64 * source[a];
        // Tolerate rounding when the extent is an exact multiple of the target.
        (extent / target[a] + 1e-9).floor() as usize + 1
    })
}

/// Resample to a new spacing, keeping origin and direction.
pub fn resample_nearest(volume: &LabelVolume, params: &ResampleParams) -> VolumeResult<LabelVolume> {
    validate_spacing(params.spacing)?;

    let source = volume.spacing();
    if source == params.spacing {
        debug!("Resample target equals source spacing; skipping");
        return Ok(volume.clone());
    }

    let dims = volume.dims();
    let out_dims = resampled_dims(dims, source, params.spacing);
    let total: u128 = out_dims.iter().map(|&d| d as u128).product();
    if total > params.max_voxels as u128 {
        return Err(VolumeError::grid_too_large(out_dims, params.max_voxels));
    }

    // Per-axis lookup of the nearest source index.
    let maps: [Vec<usize>; 3] = std::array::from_fn(|a| {
        let ratio = params.spacing[a] / source[a];
        (0..out_dims[a])
            .map(|i| ((i as f64 * ratio).round() as usize).min(dims[a] - 1))
            .collect()
    });

    let [nx, ny, _] = out_dims;
    let mut labels: Vec<LabelId> = vec![0; total as usize];
    labels
        .par_chunks_mut(nx * ny)
        .enumerate()
        .for_each(|(z, slice)| {
            let sz = maps[2][z];
            for y in 0..ny {
                let sy = maps[1][y];
                let row = &mut slice[y * nx..(y + 1) * nx];
                for (x, out) in row.iter_mut().enumerate() {
                    *out = volume.labels()[volume.index(maps[0][x], sy, sz)];
                }
            }
        });

    info!(
        from = ?dims,
        to = ?out_dims,
        spacing = ?params.spacing,
        "Resampled label volume"
    );

    Ok(LabelVolume::new(out_dims, labels, params.spacing)?
        .with_origin(volume.origin())
        .with_direction(volume.direction()))
}
