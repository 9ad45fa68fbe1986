//! NIfTI-1 label volume loading.
//!
//! Reads `.nii`, `.nii.gz` and `.hdr/.img` pairs through the `nifti` crate.
//! The header is read first so dimension and size checks run before the
//! voxel data is decoded.

use nalgebra::{Matrix3, Point3, Vector3};
use ::nifti::{IntoNdArray, NiftiHeader, NiftiObject, ReaderOptions};
use std::path::Path;
use tracing::{debug, info};

use crate::error::{VolumeError, VolumeResult};
use crate::volume::{DEFAULT_MAX_VOXELS, LabelId, LabelVolume};

/// Options for loading a label volume.
#[derive(Debug, Clone)]
pub struct LoadOptions {
    /// Volumes with more voxels than this are refused with `GridTooLarge`.
    pub max_voxels: u64,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            max_voxels: DEFAULT_MAX_VOXELS,
        }
    }
}

/// Voxel-to-world geometry decoded from a header.
#[derive(Debug, Clone, PartialEq)]
pub struct HeaderGeometry {
    pub dims: [usize; 3],
    pub spacing: [f64; 3],
    pub origin: Point3<f64>,
    pub direction: Matrix3<f64>,
}

/// Load a NIfTI-1 file as a label volume.
pub fn load_nifti(path: &Path, options: &LoadOptions) -> VolumeResult<LabelVolume> {
    if !path.is_file() {
        return Err(VolumeError::NotFound {
            path: path.to_path_buf(),
        });
    }

    let header = NiftiHeader::from_file(path)
        .map_err(|e| VolumeError::format(path, format!("cannot read NIfTI header: {e}")))?;
    let geometry = header_geometry(&header).map_err(|details| VolumeError::format(path, details))?;

    let total: u64 = geometry.dims.iter().map(|&d| d as u64).product();
    if total > options.max_voxels {
        return Err(VolumeError::grid_too_large(geometry.dims, options.max_voxels));
    }

    debug!(
        path = %path.display(),
        dims = ?geometry.dims,
        spacing = ?geometry.spacing,
        sform_code = header.sform_code,
        qform_code = header.qform_code,
        "Read NIfTI header"
    );

    let object = ReaderOptions::new()
        .read_file(path)
        .map_err(|e| VolumeError::format(path, format!("cannot read NIfTI data: {e}")))?;
    let data = object
        .into_volume()
        // Decoded as f64 so every u32 label is exact.
        .into_ndarray::<f64>()
        .map_err(|e| VolumeError::format(path, format!("cannot decode voxel data: {e}")))?;

    let expected = total as usize;
    if data.len() != expected {
        return Err(VolumeError::format(
            path,
            format!("expected {expected} voxels, found {}", data.len()),
        ));
    }

    // The array is indexed [x, y, z, ..]; the transposed view iterates x-fastest.
    let labels = data
        .t()
        .iter()
        .enumerate()
        .map(|(i, &value)| to_label(value).ok_or(i))
        .collect::<Result<Vec<LabelId>, usize>>()
        .map_err(|i| {
            VolumeError::format(
                path,
                format!(
                    "voxel {i} has value {}; labels must be non-negative integers",
                    data.t().iter().nth(i).copied().unwrap_or(f64::NAN)
                ),
            )
        })?;

    let volume = LabelVolume::new(geometry.dims, labels, geometry.spacing)?
        .with_origin(geometry.origin)
        .with_direction(geometry.direction);

    info!(
        path = %path.display(),
        dims = ?volume.dims(),
        spacing = ?volume.spacing(),
        "Loaded label volume"
    );

    Ok(volume)
}

fn to_label(value: f64) -> Option<LabelId> {
    if value.is_finite() && value >= 0.0 && value.fract() == 0.0 && value <= LabelId::MAX as f64 {
        Some(value as LabelId)
    } else {
        None
    }
}

/// Decode dimensions, spacing and orientation from a header.
///
/// Orientation comes from the sform when `sform_code > 0`, else from the
/// qform quaternion when `qform_code > 0`, else identity at the origin.
pub fn header_geometry(header: &NiftiHeader) -> Result<HeaderGeometry, String> {
    let ndim = header.dim[0] as usize;
    if !(1..=7).contains(&ndim) {
        return Err(format!("dim[0] = {ndim} is outside 1..=7"));
    }

    let dims: [usize; 3] =
        std::array::from_fn(|a| if a < ndim { header.dim[a + 1] as usize } else { 1 });
    if dims.contains(&0) {
        return Err(format!("zero-sized dimension in {dims:?}"));
    }
    if let Some(extra) = (4..=ndim).find(|&d| header.dim[d] > 1) {
        return Err(format!(
            "volume is not 3D: dimension {extra} has size {}",
            header.dim[extra]
        ));
    }

    let spacing: [f64; 3] = std::array::from_fn(|a| header.pixdim[a + 1] as f64);
    if !spacing.iter().all(|s| s.is_finite() && *s > 0.0) {
        return Err(format!("voxel spacing {spacing:?} must be positive"));
    }

    let (origin, direction) = if header.sform_code > 0 {
        sform_geometry(header.srow_x, header.srow_y, header.srow_z)?
    } else if header.qform_code > 0 {
        let qfac = if header.pixdim[0] < 0.0 { -1.0 } else { 1.0 };
        let direction = quaternion_direction(
            header.quatern_b as f64,
            header.quatern_c as f64,
            header.quatern_d as f64,
            qfac,
        );
        let origin = Point3::new(
            header.quatern_x as f64,
            header.quatern_y as f64,
            header.quatern_z as f64,
        );
        (origin, direction)
    } else {
        (Point3::origin(), Matrix3::identity())
    };

    Ok(HeaderGeometry {
        dims,
        spacing,
        origin,
        direction,
    })
}

/// Origin and unit-column direction from the affine rows.
fn sform_geometry(
    row_x: [f32; 4],
    row_y: [f32; 4],
    row_z: [f32; 4],
) -> Result<(Point3<f64>, Matrix3<f64>), String> {
    let affine = Matrix3::new(
        row_x[0] as f64, row_x[1] as f64, row_x[2] as f64,
        row_y[0] as f64, row_y[1] as f64, row_y[2] as f64,
        row_z[0] as f64, row_z[1] as f64, row_z[2] as f64,
    );

    let mut direction = Matrix3::zeros();
    for a in 0..3 {
        let column: Vector3<f64> = affine.column(a).into_owned();
        let unit = column
            .try_normalize(1e-12)
            .ok_or_else(|| format!("sform column {a} is zero"))?;
        direction.set_column(a, &unit);
    }

    let origin = Point3::new(row_x[3] as f64, row_y[3] as f64, row_z[3] as f64);
    Ok((origin, direction))
}

/// Rotation from the quaternion (b, c, d), with the third column scaled by `qfac`.
pub fn quaternion_direction(b: f64, c: f64, d: f64, qfac: f64) -> Matrix3<f64> {
    let a = (1.0 - (b * b + c * c + d * d)).max(0.0).sqrt();

    Matrix3::new(
        a * a + b * b - c * c - d * d,
        2.0 * (b * c - a * d),
        2.0 * (b * d + a * c) * qfac,
        2.0 * (b * c + a * d),
        a * a + c * c - b * b - d * d,
        2.0 * (c * d - a * b) * qfac,
        2.0 * (b * d - a * c),
        2.0 * (c * d + a * b),
        (a * a + d * d - c * c - b * b) * qfac,
    )
}
