//! Vertex and edge adjacency for triangle meshes.

use hashbrown::HashMap;

/// Adjacency information derived from a face list.
#[derive(Debug, Clone, Default)]
pub struct MeshAdjacency {
    /// Sorted, de-duplicated edge-adjacent neighbors of each vertex.
    pub vertex_neighbors: Vec<Vec<u32>>,
    /// Faces incident to each vertex.
    pub vertex_faces: Vec<Vec<u32>>,
    /// Faces adjacent to each undirected edge, keyed by (min, max).
    pub edge_to_faces: HashMap<(u32, u32), Vec<u32>>,
}

impl MeshAdjacency {
    /// Build adjacency for `vertex_count` vertices from the given faces.
    pub fn build(vertex_count: usize, faces: &[[u32; 3]]) -> Self {
        let mut vertex_neighbors = vec![Vec::new(); vertex_count];
        let mut vertex_faces = vec![Vec::new(); vertex_count];
        let mut edge_to_faces: HashMap<(u32, u32), Vec<u32>> =
            HashMap::with_capacity(faces.len() * 3 / 2);

        for (face_idx, face) in faces.iter().enumerate() {
            for i in 0..3 {
                let a = face[i];
                let b = face[(i + 1) % 3];
                vertex_neighbors[a as usize].push(b);
                vertex_neighbors[b as usize].push(a);
                vertex_faces[a as usize].push(face_idx as u32);
                edge_to_faces
                    .entry(normalize_edge(a, b))
                    .or_default()
                    .push(face_idx as u32);
            }
        }

        for neighbors in &mut vertex_neighbors {
            neighbors.sort_unstable();
            neighbors.dedup();
        }

        Self {
            vertex_neighbors,
            vertex_faces,
            edge_to_faces,
        }
    }

    /// Edges with exactly one adjacent face.
    pub fn boundary_edges(&self) -> impl Iterator<Item = (u32, u32)> + '_ {
        self.edge_to_faces
            .iter()
            .filter(|(_, faces)| faces.len() == 1)
            .map(|(&edge, _)| edge)
    }

    /// Whether every edge is shared by exactly two faces.
    pub fn is_closed_manifold(&self) -> bool {
        self.edge_to_faces.values().all(|faces| faces.len() == 2)
    }
}

/// Normalize edge so smaller index comes first.
#[inline]
pub fn normalize_edge(v1: u32, v2: u32) -> (u32, u32) {
    if v1 < v2 { (v1, v2) } else { (v2, v1) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_edge() {
        assert_eq!(normalize_edge(5, 3), (3, 5));
        assert_eq!(normalize_edge(3, 5), (3, 5));
        assert_eq!(normalize_edge(4, 4), (4, 4));
    }

    #[test]
    fn test_two_triangles() {
        let faces = [[0, 1, 2], [1, 3, 2]];
        let adj = MeshAdjacency::build(4, &faces);

        assert_eq!(adj.vertex_neighbors[1], vec![0, 2, 3]);
        assert_eq!(adj.vertex_faces[2].len(), 2);
        assert_eq!(adj.edge_to_faces[&(1, 2)].len(), 2);
        assert_eq!(adj.boundary_edges().count(), 4);
        assert!(!adj.is_closed_manifold());
    }

    #[test]
    fn test_tetrahedron_is_closed() {
        let faces = [[0, 2, 1], [0, 1, 3], [0, 3, 2], [1, 2, 3]];
        let adj = MeshAdjacency::build(4, &faces);
        assert!(adj.is_closed_manifold());
        assert_eq!(adj.boundary_edges().count(), 0);
    }
}
