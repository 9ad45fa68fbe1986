//! Per-label isosurface extraction by marching tetrahedra.
//!
//! Each grid cube is split into six tetrahedra along its main diagonal
//! (the Kuhn/Freudenthal split). Neighboring cubes split their shared faces the
//! same way, and a tetrahedron has no ambiguous cases, so the 0.5 level set of
//! the label indicator comes out as a closed 2-manifold.
//!
//! With a 0/1 indicator every surface vertex is the midpoint of a tetrahedron
//! edge with exactly one endpoint inside the label. Those edges are lattice
//! segments stepping +1 along one, two or three axes (a cube edge, a face
//! diagonal or the main diagonal). Vertices are keyed by their segment, so
//! working memory scales with the surface, not the grid.

use hashbrown::HashMap;
use nalgebra::{Point3, Vector3};
use tracing::debug;

use segmesh_mesh::{Mesh, Vertex};

use crate::error::{VolumeError, VolumeResult};
use crate::volume::{LabelId, LabelVolume, VoxelBounds};

/// Axis orders of the six tetrahedra in a cube. Each walks from corner 0 to
/// corner 7 one axis at a time.
const KUHN_PATHS: [[u8; 3]; 6] = [
    [0, 1, 2],
    [0, 2, 1],
    [1, 0, 2],
    [1, 2, 0],
    [2, 0, 1],
    [2, 1, 0],
];

/// Upper bound on the buffer pre-allocation hint.
const MAX_RESERVE: usize = 1 << 22;

/// Cube corner offset for a 3-bit mask (bit 0 = x, bit 1 = y, bit 2 = z).
#[inline]
fn corner_offset(mask: u8) -> [i64; 3] {
    [(mask & 1) as i64, ((mask >> 1) & 1) as i64, ((mask >> 2) & 1) as i64]
}

/// Lattice segment identified by its lower endpoint and the 0/1 step to the upper one.
type EdgeKey = ([i32; 3], u8);

struct SurfaceBuilder {
    positions: Vec<Point3<f64>>,
    faces: Vec<[u32; 3]>,
    edge_vertices: HashMap<EdgeKey, u32>,
    label: LabelId,
}

impl SurfaceBuilder {
    fn with_capacity(label: LabelId, vertices: usize) -> Self {
        Self {
            positions: Vec::with_capacity(vertices),
            faces: Vec::with_capacity(vertices * 2),
            edge_vertices: HashMap::with_capacity(vertices),
            label,
        }
    }

    /// Vertex at the midpoint of the segment between two corners of the cube
    /// at `base`. One corner mask must be a subset of the other.
    fn edge_vertex(&mut self, base: [i64; 3], a: u8, b: u8) -> VolumeResult<u32> {
        let (lo, hi) = if a & b == a { (a, b) } else { (b, a) };
        let lo_offset = corner_offset(lo);
        let lower: [i64; 3] = std::array::from_fn(|i| base[i] + lo_offset[i]);
        let step = lo ^ hi;
        let key = (lower.map(|c| c as i32), step);

        if let Some(&index) = self.edge_vertices.get(&key) {
            return Ok(index);
        }

        let index = u32::try_from(self.positions.len()).map_err(|_| {
            VolumeError::extraction_failed(self.label, "vertex count exceeds u32 indices")
        })?;
        let half = corner_offset(step);
        self.positions.push(Point3::new(
            lower[0] as f64 + 0.5 * half[0] as f64,
            lower[1] as f64 + 0.5 * half[1] as f64,
            lower[2] as f64 + 0.5 * half[2] as f64,
        ));
        self.edge_vertices.insert(key, index);
        Ok(index)
    }

    /// Push a triangle, flipping it if its normal does not follow `outward`.
    fn triangle(&mut self, tri: [u32; 3], outward: Vector3<f64>) {
        let [a, b, c] = tri.map(|i| self.positions[i as usize]);
        let normal = (b - a).cross(&(c - a));
        if normal.dot(&outward) < 0.0 {
            self.faces.push([tri[0], tri[2], tri[1]]);
        } else {
            self.faces.push(tri);
        }
    }

    /// Emit the surface piece of one tetrahedron.
    fn tetrahedron(&mut self, base: [i64; 3], masks: [u8; 4], inside: [bool; 4]) -> VolumeResult<()> {
        let corner = |m: u8| {
            let o = corner_offset(m);
            Point3::new(
                (base[0] + o[0]) as f64,
                (base[1] + o[1]) as f64,
                (base[2] + o[2]) as f64,
            )
        };
        let centroid = |ms: &[u8]| {
            let sum: Vector3<f64> = ms.iter().map(|&m| corner(m).coords).sum();
            Point3::from(sum / ms.len() as f64)
        };

        let ins: Vec<u8> = (0..4).filter(|&k| inside[k]).map(|k| masks[k]).collect();
        let outs: Vec<u8> = (0..4).filter(|&k| !inside[k]).map(|k| masks[k]).collect();

        match (ins.as_slice(), outs.as_slice()) {
            ([a], [b0, b1, b2]) => {
                let tri = [
                    self.edge_vertex(base, *a, *b0)?,
                    self.edge_vertex(base, *a, *b1)?,
                    self.edge_vertex(base, *a, *b2)?,
                ];
                self.triangle(tri, centroid(&outs) - corner(*a));
            }
            ([a0, a1, a2], [b]) => {
                let tri = [
                    self.edge_vertex(base, *a0, *b)?,
                    self.edge_vertex(base, *a1, *b)?,
                    self.edge_vertex(base, *a2, *b)?,
                ];
                self.triangle(tri, corner(*b) - centroid(&ins));
            }
            ([a0, a1], [b0, b1]) => {
                // The four crossing points form a planar quad in this order.
                let q = [
                    self.edge_vertex(base, *a0, *b0)?,
                    self.edge_vertex(base, *a0, *b1)?,
                    self.edge_vertex(base, *a1, *b1)?,
                    self.edge_vertex(base, *a1, *b0)?,
                ];
                let outward = centroid(&outs) - centroid(&ins);
                let [p0, p1, p2] = [q[0], q[1], q[2]].map(|i| self.positions[i as usize]);
                if (p1 - p0).cross(&(p2 - p0)).dot(&outward) < 0.0 {
                    self.faces.push([q[0], q[2], q[1]]);
                    self.faces.push([q[0], q[3], q[2]]);
                } else {
                    self.faces.push([q[0], q[1], q[2]]);
                    self.faces.push([q[0], q[2], q[3]]);
                }
            }
            _ => {}
        }
        Ok(())
    }
}

/// Extract the closed surface of one label.
///
/// Returns an empty mesh when the label does not occur. Vertex positions are
/// in world coordinates; faces wind counter-clockwise seen from outside the
/// label, also for volumes with a mirroring direction matrix.
pub fn extract_label(volume: &LabelVolume, label: LabelId) -> VolumeResult<Mesh> {
    match volume.label_bounds(label) {
        Some(bounds) => extract_label_in(volume, label, bounds),
        None => {
            debug!(label, "Label absent; empty surface");
            Ok(Mesh::new())
        }
    }
}

/// Extract the surface of one label whose voxel bounds are already known.
///
/// `bounds` must enclose every voxel of the label, as returned by
/// [`LabelVolume::label_bounds`] or [`LabelVolume::all_label_bounds`]; voxels
/// outside it are not seen.
pub fn extract_label_in(volume: &LabelVolume, label: LabelId, bounds: VoxelBounds) -> VolumeResult<Mesh> {
    let extent = bounds.extent();
    let shell_estimate = 2 * (extent[0] * extent[1] + extent[1] * extent[2] + extent[0] * extent[2]);
    let mut builder = SurfaceBuilder::with_capacity(label, (shell_estimate * 2).min(MAX_RESERVE));

    let lo: [i64; 3] = bounds.min.map(|c| c as i64 - 1);
    let hi: [i64; 3] = bounds.max.map(|c| c as i64);

    for z in lo[2]..=hi[2] {
        for y in lo[1]..=hi[1] {
            for x in lo[0]..=hi[0] {
                let base = [x, y, z];
                let corners: [bool; 8] = std::array::from_fn(|m| {
                    let o = corner_offset(m as u8);
                    volume.label_or_background([x + o[0], y + o[1], z + o[2]]) == label
                });
                if corners.iter().all(|&c| c == corners[0]) {
                    continue;
                }

                for path in KUHN_PATHS {
                    let m1 = 1u8 << path[0];
                    let m2 = m1 | (1u8 << path[1]);
                    let masks = [0u8, m1, m2, 7u8];
                    let inside = masks.map(|m| corners[m as usize]);
                    if inside.iter().all(|&c| c == inside[0]) {
                        continue;
                    }
                    builder.tetrahedron(base, masks, inside)?;
                }
            }
        }
    }

    let mirrored = volume.is_mirrored();
    let mut mesh = Mesh::with_capacity(builder.positions.len(), builder.faces.len());
    mesh.vertices.extend(
        builder
            .positions
            .iter()
            .map(|&g| Vertex::new(volume.world_position(g))),
    );
    mesh.faces = builder.faces;
    if mirrored {
        mesh.flip_winding();
    }

    debug!(
        label,
        vertices = mesh.vertex_count(),
        faces = mesh.face_count(),
        bounds_min = ?bounds.min,
        bounds_max = ?bounds.max,
        mirrored,
        "Extracted label surface"
    );

    Ok(mesh)
}
