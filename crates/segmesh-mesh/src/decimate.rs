//! Mesh decimation using edge collapse with quadric error metrics.
//!
//! Edges are collapsed cheapest-first until the face count reaches the target.
//! A collapse is rejected when it would break the link condition (pinching the
//! surface into a non-manifold shape) or flip the orientation of a surviving
//! face, so closed label surfaces stay closed and outward-facing.
//!
//! The reduction ratio is a target, not a guarantee: when every remaining
//! collapse is rejected the loop stops early. The face count never grows.

use hashbrown::HashSet;
use nalgebra::{Point3, Vector3};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use tracing::debug;

use crate::adjacency::{MeshAdjacency, normalize_edge};
use crate::error::{MeshError, MeshResult};
use crate::{Mesh, Vertex};

/// Parameters for mesh decimation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecimateParams {
    /// Fraction of triangles to remove, in [0, 1). 0 disables decimation.
    pub reduction: f64,
    /// Whether to keep vertices that lie on boundary edges fixed.
    /// Default: true
    pub preserve_boundary: bool,
    /// Minimum cosine between a face normal before and after a collapse.
    /// Collapses that rotate a face further are rejected. Default: 0.0 (90 degrees)
    pub min_normal_cosine: f64,
}

impl Default for DecimateParams {
    fn default() -> Self {
        Self {
            reduction: 0.0,
            preserve_boundary: true,
            min_normal_cosine: 0.0,
        }
    }
}

impl DecimateParams {
    /// Create params removing the given fraction of triangles.
    pub fn with_reduction(reduction: f64) -> Self {
        Self {
            reduction,
            ..Default::default()
        }
    }

    /// Check that the reduction ratio is in [0, 1).
    pub fn validate(&self) -> MeshResult<()> {
        if !(0.0..1.0).contains(&self.reduction) {
            return Err(MeshError::DecimationFailed {
                details: format!("reduction ratio {} is outside [0, 1)", self.reduction),
            });
        }
        Ok(())
    }

    /// Face count to aim for, given the input face count.
    pub fn target_faces(&self, original: usize) -> usize {
        let keep = (1.0 - self.reduction).clamp(0.0, 1.0);
        ((original as f64) * keep).ceil() as usize
    }
}

/// Result of mesh decimation.
#[derive(Debug, Clone)]
pub struct DecimateResult {
    /// The decimated mesh.
    pub mesh: Mesh,
    /// Number of triangles in original mesh.
    pub original_triangles: usize,
    /// Number of triangles in decimated mesh.
    pub final_triangles: usize,
    /// Number of edge collapses performed.
    pub collapses_performed: usize,
    /// Number of edge collapses rejected.
    pub collapses_rejected: usize,
}

impl DecimateResult {
    fn unchanged(mesh: &Mesh) -> Self {
        Self {
            mesh: mesh.clone(),
            original_triangles: mesh.faces.len(),
            final_triangles: mesh.faces.len(),
            collapses_performed: 0,
            collapses_rejected: 0,
        }
    }

    /// Fraction of triangles actually removed.
    pub fn achieved_reduction(&self) -> f64 {
        if self.original_triangles == 0 {
            0.0
        } else {
            1.0 - self.final_triangles as f64 / self.original_triangles as f64
        }
    }
}

/// Quadric error matrix (4x4 symmetric matrix stored as 10 values).
#[derive(Debug, Clone, Copy, Default)]
struct Quadric {
    // Upper triangle of:
    // [a b c d]
    // [  e f g]
    // [    h i]
    // [      j]
    a: f64,
    b: f64,
    c: f64,
    d: f64,
    e: f64,
    f: f64,
    g: f64,
    h: f64,
    i: f64,
    j: f64,
}

impl Quadric {
    /// Create a quadric from a plane equation (ax + by + cz + d = 0).
    fn from_plane(a: f64, b: f64, c: f64, d: f64) -> Self {
        Self {
            a: a * a,
            b: a * b,
            c: a * c,
            d: a * d,
            e: b * b,
            f: b * c,
            g: b * d,
            h: c * c,
            i: c * d,
            j: d * d,
        }
    }

    fn add(&mut self, other: &Quadric) {
        self.a += other.a;
        self.b += other.b;
        self.c += other.c;
        self.d += other.d;
        self.e += other.e;
        self.f += other.f;
        self.g += other.g;
        self.h += other.h;
        self.i += other.i;
        self.j += other.j;
    }

    /// Evaluate v^T Q v for v = [x, y, z, 1].
    fn evaluate(&self, p: &Point3<f64>) -> f64 {
        let (x, y, z) = (p.x, p.y, p.z);
        self.a * x * x
            + 2.0 * self.b * x * y
            + 2.0 * self.c * x * z
            + 2.0 * self.d * x
            + self.e * y * y
            + 2.0 * self.f * y * z
            + 2.0 * self.g * y
            + self.h * z * z
            + 2.0 * self.i * z
            + self.j
    }

    /// Point minimizing the error, or None if the system is singular.
    fn optimal_point(&self) -> Option<Point3<f64>> {
        let det = self.a * (self.e * self.h - self.f * self.f)
            - self.b * (self.b * self.h - self.f * self.c)
            + self.c * (self.b * self.f - self.e * self.c);

        if det.abs() < 1e-10 {
            return None;
        }

        let inv_det = 1.0 / det;
        let m00 = (self.e * self.h - self.f * self.f) * inv_det;
        let m01 = (self.c * self.f - self.b * self.h) * inv_det;
        let m02 = (self.b * self.f - self.c * self.e) * inv_det;
        let m11 = (self.a * self.h - self.c * self.c) * inv_det;
        let m12 = (self.b * self.c - self.a * self.f) * inv_det;
        let m22 = (self.a * self.e - self.b * self.b) * inv_det;

        Some(Point3::new(
            -(m00 * self.d + m01 * self.g + m02 * self.i),
            -(m01 * self.d + m11 * self.g + m12 * self.i),
            -(m02 * self.d + m12 * self.g + m22 * self.i),
        ))
    }
}

/// An edge collapse candidate in the priority queue.
#[derive(Debug, Clone)]
struct EdgeCollapse {
    v1: u32,
    v2: u32,
    /// Vertex versions when the candidate was queued; stale entries are skipped.
    stamp: (u32, u32),
    cost: f64,
    target: Point3<f64>,
}

impl PartialEq for EdgeCollapse {
    fn eq(&self, other: &Self) -> bool {
        self.cost == other.cost
    }
}

impl Eq for EdgeCollapse {}

impl PartialOrd for EdgeCollapse {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for EdgeCollapse {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed for min-heap behavior.
        other
            .cost
            .partial_cmp(&self.cost)
            .unwrap_or(Ordering::Equal)
    }
}

/// Working state of one decimation run.
struct Decimator<'a> {
    params: &'a DecimateParams,
    positions: Vec<Point3<f64>>,
    vertex_alive: Vec<bool>,
    version: Vec<u32>,
    locked: Vec<bool>,
    quadrics: Vec<Quadric>,
    faces: Vec<[u32; 3]>,
    face_alive: Vec<bool>,
    vertex_faces: Vec<Vec<u32>>,
    active_faces: usize,
}

impl<'a> Decimator<'a> {
    fn new(mesh: &Mesh, params: &'a DecimateParams) -> Self {
        let adjacency = MeshAdjacency::build(mesh.vertices.len(), &mesh.faces);
        let positions: Vec<Point3<f64>> = mesh.vertices.iter().map(|v| v.position).collect();

        let mut locked = vec![false; positions.len()];
        if params.preserve_boundary {
            for (a, b) in adjacency.boundary_edges() {
                locked[a as usize] = true;
                locked[b as usize] = true;
            }
        }

        let quadrics = compute_vertex_quadrics(&positions, &mesh.faces);

        // Faces with a repeated index appear more than once in the lists.
        let mut vertex_faces = adjacency.vertex_faces;
        for list in &mut vertex_faces {
            list.dedup();
        }

        Self {
            params,
            vertex_alive: vec![true; positions.len()],
            version: vec![0; positions.len()],
            locked,
            quadrics,
            face_alive: vec![true; mesh.faces.len()],
            faces: mesh.faces.clone(),
            vertex_faces,
            active_faces: mesh.faces.len(),
            positions,
        }
    }

    fn candidate(&self, v1: u32, v2: u32) -> Option<EdgeCollapse> {
        if self.locked[v1 as usize] || self.locked[v2 as usize] {
            return None;
        }

        let mut combined = self.quadrics[v1 as usize];
        combined.add(&self.quadrics[v2 as usize]);

        let p1 = self.positions[v1 as usize];
        let p2 = self.positions[v2 as usize];
        let midpoint = Point3::from((p1.coords + p2.coords) * 0.5);

        // Keep the optimum only when it stays near the edge; far-away optima
        // come from nearly flat neighborhoods and create spikes.
        let edge_len = (p2 - p1).norm();
        let optimum = combined
            .optimal_point()
            .filter(|p| (p - midpoint).norm() <= edge_len);

        let (target, cost) = optimum
            .into_iter()
            .chain([p1, p2, midpoint])
            .map(|p| (p, combined.evaluate(&p).max(0.0)))
            .min_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(Ordering::Equal))
            .unwrap_or((midpoint, 0.0));

        Some(EdgeCollapse {
            v1,
            v2,
            stamp: (self.version[v1 as usize], self.version[v2 as usize]),
            cost,
            target,
        })
    }

    fn live_faces(&self, v: u32) -> impl Iterator<Item = u32> + '_ {
        self.vertex_faces[v as usize]
            .iter()
            .copied()
            .filter(move |&f| self.face_alive[f as usize] && self.faces[f as usize].contains(&v))
    }

    fn neighbors(&self, v: u32) -> HashSet<u32> {
        let mut neighbors = HashSet::new();
        for f in self.live_faces(v) {
            for &vi in &self.faces[f as usize] {
                if vi != v {
                    neighbors.insert(vi);
                }
            }
        }
        neighbors
    }

    /// Link condition plus orientation check for collapsing v2 into v1.
    fn is_collapse_valid(&self, v1: u32, v2: u32, target: &Point3<f64>) -> bool {
        let n1 = self.neighbors(v1);
        let n2 = self.neighbors(v2);
        if !n1.contains(&v2) {
            return false;
        }

        let mut shared_faces = 0;
        let mut opposite = HashSet::new();
        for f in self.live_faces(v1) {
            let face = self.faces[f as usize];
            if face.contains(&v2) {
                shared_faces += 1;
                for &vi in &face {
                    if vi != v1 && vi != v2 {
                        opposite.insert(vi);
                    }
                }
            }
        }

        // An interior edge has two faces; collapsing it would remove both and
        // leave a non-manifold fin if the two opposite vertices were the same.
        if shared_faces != 2 || opposite.len() != 2 {
            return false;
        }

        let common = n1.intersection(&n2).filter(|v| !opposite.contains(*v)).count();
        if common > 0 {
            return false;
        }

        // A face of v2 re-attached to v1 must not duplicate a face v1 already
        // has. This is what stops a tetrahedron from folding flat.
        for f in self.live_faces(v2) {
            let face = self.faces[f as usize];
            if face.contains(&v1) {
                continue;
            }
            let duplicate = self.live_faces(v1).any(|g| {
                let other = self.faces[g as usize];
                face.iter().all(|&vi| vi == v2 || other.contains(&vi))
            });
            if duplicate {
                return false;
            }
        }

        // Reject flips in faces that survive the collapse.
        for (moving, other) in [(v1, v2), (v2, v1)] {
            for f in self.live_faces(moving) {
                let face = self.faces[f as usize];
                if face.contains(&other) {
                    continue;
                }
                let before = face_normal(&self.positions, face);
                let moved = face.map(|vi| {
                    if vi == moving {
                        *target
                    } else {
                        self.positions[vi as usize]
                    }
                });
                let after = triangle_normal(&moved[0], &moved[1], &moved[2]);
                match (before, after) {
                    (Some(b), Some(a)) if b.dot(&a) >= self.params.min_normal_cosine => {}
                    (None, _) => {}
                    _ => return false,
                }
            }
        }

        true
    }

    /// Merge v2 into v1 at `target`.
    fn collapse(&mut self, v1: u32, v2: u32, target: Point3<f64>) {
        self.positions[v1 as usize] = target;
        let q2 = self.quadrics[v2 as usize];
        self.quadrics[v1 as usize].add(&q2);

        let mut incident: Vec<u32> = self.live_faces(v2).collect();
        incident.dedup();
        for f in incident {
            let face = &mut self.faces[f as usize];
            if face.contains(&v1) {
                self.face_alive[f as usize] = false;
                self.active_faces -= 1;
            } else {
                for idx in face.iter_mut() {
                    if *idx == v2 {
                        *idx = v1;
                    }
                }
                self.vertex_faces[v1 as usize].push(f);
            }
        }

        self.vertex_alive[v2 as usize] = false;
        self.vertex_faces[v2 as usize].clear();
        self.version[v1 as usize] += 1;
        self.version[v2 as usize] += 1;

        // Drop stale incidence entries so lists stay proportional to valence.
        let faces = &self.faces;
        let face_alive = &self.face_alive;
        self.vertex_faces[v1 as usize]
            .retain(|&f| face_alive[f as usize] && faces[f as usize].contains(&v1));
    }

    fn is_current(&self, c: &EdgeCollapse) -> bool {
        self.vertex_alive[c.v1 as usize]
            && self.vertex_alive[c.v2 as usize]
            && self.version[c.v1 as usize] == c.stamp.0
            && self.version[c.v2 as usize] == c.stamp.1
    }

    fn into_mesh(self) -> Mesh {
        let mut remap = vec![u32::MAX; self.positions.len()];
        let mut mesh = Mesh::with_capacity(self.positions.len(), self.active_faces);

        for (old, position) in self.positions.iter().enumerate() {
            if self.vertex_alive[old] {
                remap[old] = mesh.vertices.len() as u32;
                mesh.vertices.push(Vertex::new(*position));
            }
        }

        for (face, alive) in self.faces.iter().zip(&self.face_alive) {
            if *alive {
                mesh.faces.push(face.map(|vi| remap[vi as usize]));
            }
        }

        // Vertices left without faces (only possible on already-degenerate
        // input) are kept; writers and consumers tolerate them.
        mesh
    }
}

/// Decimate a mesh using edge collapse with quadric error metrics.
///
/// # Example
/// ```
/// use segmesh_mesh::{Mesh, Vertex, decimate_mesh, DecimateParams};
///
/// let mut mesh = Mesh::new();
/// mesh.vertices.push(Vertex::from_coords(0.0, 0.0, 0.0));
/// mesh.vertices.push(Vertex::from_coords(1.0, 0.0, 0.0));
/// mesh.vertices.push(Vertex::from_coords(0.5, 1.0, 0.0));
/// mesh.faces.push([0, 1, 2]);
///
/// let result = decimate_mesh(&mesh, &DecimateParams::with_reduction(0.5));
/// assert!(result.final_triangles <= result.original_triangles);
/// ```
pub fn decimate_mesh(mesh: &Mesh, params: &DecimateParams) -> DecimateResult {
    let original_triangles = mesh.faces.len();
    let target = params.target_faces(original_triangles);

    if original_triangles == 0 || params.reduction <= 0.0 || original_triangles <= target {
        return DecimateResult::unchanged(mesh);
    }

    let mut decimator = Decimator::new(mesh, params);

    let mut heap = BinaryHeap::new();
    let mut seen = HashSet::new();
    for face in &mesh.faces {
        for i in 0..3 {
            let (a, b) = normalize_edge(face[i], face[(i + 1) % 3]);
            if seen.insert((a, b)) {
                if let Some(candidate) = decimator.candidate(a, b) {
                    heap.push(candidate);
                }
            }
        }
    }
    drop(seen);

    let mut collapses_performed = 0;
    let mut collapses_rejected = 0;

    while decimator.active_faces > target {
        let Some(collapse) = heap.pop() else {
            break;
        };

        if !decimator.is_current(&collapse) {
            continue;
        }

        let (v1, v2) = (collapse.v1, collapse.v2);
        if !decimator.is_collapse_valid(v1, v2, &collapse.target) {
            collapses_rejected += 1;
            continue;
        }

        decimator.collapse(v1, v2, collapse.target);
        collapses_performed += 1;

        for neighbor in decimator.neighbors(v1) {
            if let Some(candidate) = decimator.candidate(v1, neighbor) {
                heap.push(candidate);
            }
        }
    }

    let final_triangles = decimator.active_faces;
    let final_mesh = decimator.into_mesh();

    debug!(
        original = original_triangles,
        target,
        final_faces = final_triangles,
        collapses_performed,
        collapses_rejected,
        "Decimation complete"
    );

    DecimateResult {
        mesh: final_mesh,
        original_triangles,
        final_triangles,
        collapses_performed,
        collapses_rejected,
    }
}

/// Compute quadric error matrices for each vertex.
fn compute_vertex_quadrics(positions: &[Point3<f64>], faces: &[[u32; 3]]) -> Vec<Quadric> {
    let mut quadrics = vec![Quadric::default(); positions.len()];

    for face in faces {
        let Some(n) = face_normal(positions, *face) else {
            continue;
        };
        let p0 = positions[face[0] as usize];
        let d = -n.dot(&p0.coords);
        let q = Quadric::from_plane(n.x, n.y, n.z, d);

        for &vi in face {
            quadrics[vi as usize].add(&q);
        }
    }

    quadrics
}

fn face_normal(positions: &[Point3<f64>], face: [u32; 3]) -> Option<Vector3<f64>> {
    triangle_normal(
        &positions[face[0] as usize],
        &positions[face[1] as usize],
        &positions[face[2] as usize],
    )
}

fn triangle_normal(p0: &Point3<f64>, p1: &Point3<f64>, p2: &Point3<f64>) -> Option<Vector3<f64>> {
    (p1 - p0).cross(&(p2 - p0)).try_normalize(1e-12)
}

/// Decimate with an explicit error for out-of-range ratios.
pub fn try_decimate_mesh(mesh: &Mesh, params: &DecimateParams) -> MeshResult<DecimateResult> {
    params.validate()?;
    Ok(decimate_mesh(mesh, params))
}
