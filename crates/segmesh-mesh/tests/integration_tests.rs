//! End-to-end tests for segmesh-mesh.
//!
//! These exercise smooth -> decimate -> write as the export pipeline uses them.

use segmesh_mesh::{
    Mesh, MeshAdjacency, MeshError, MeshFormat, PostProcessParams, SmoothParams, Vertex,
    post_process, smooth_laplacian, write_mesh,
};
use std::collections::HashMap;
use tempfile::TempDir;

/// A closed box made of unit-sized quads, the shape a voxel label surface has
/// before smoothing.
fn voxel_box(nx: i32, ny: i32, nz: i32) -> Mesh {
    let mut mesh = Mesh::new();
    let mut index: HashMap<[i32; 3], u32> = HashMap::new();
    let dims = [nx, ny, nz];

    let mut vertex = |mesh: &mut Mesh, p: [i32; 3]| -> u32 {
        *index.entry(p).or_insert_with(|| {
            mesh.vertices
                .push(Vertex::from_coords(p[0] as f64, p[1] as f64, p[2] as f64));
            (mesh.vertices.len() - 1) as u32
        })
    };

    for axis in 0..3 {
        let u_axis = (axis + 1) % 3;
        let v_axis = (axis + 2) % 3;
        for side in [0, dims[axis]] {
            for u in 0..dims[u_axis] {
                for v in 0..dims[v_axis] {
                    let corner = |du: i32, dv: i32| {
                        let mut p = [0; 3];
                        p[axis] = side;
                        p[u_axis] = u + du;
                        p[v_axis] = v + dv;
                        p
                    };
                    let a = vertex(&mut mesh, corner(0, 0));
                    let b = vertex(&mut mesh, corner(1, 0));
                    let c = vertex(&mut mesh, corner(1, 1));
                    let d = vertex(&mut mesh, corner(0, 1));
                    if side == 0 {
                        mesh.faces.push([a, c, b]);
                        mesh.faces.push([a, d, c]);
                    } else {
                        mesh.faces.push([a, b, c]);
                        mesh.faces.push([a, c, d]);
                    }
                }
            }
        }
    }
    mesh
}

#[test]
fn test_voxel_box_fixture() {
    let mesh = voxel_box(3, 4, 5);
    let adjacency = MeshAdjacency::build(mesh.vertex_count(), &mesh.faces);
    assert!(adjacency.is_closed_manifold());
    assert!((mesh.signed_volume() - 60.0).abs() < 1e-9);
}

#[test]
fn test_full_post_process_keeps_closed_surface() {
    let mesh = voxel_box(6, 6, 6);
    let faces_in = mesh.face_count();

    let params = PostProcessParams {
        smooth: SmoothParams::with_iterations(5),
        decimate_reduction: 0.3,
        compute_normals: true,
    };
    let outcome = post_process(mesh, &params).unwrap();

    assert_eq!(outcome.faces_before, faces_in);
    assert!(outcome.faces_after < faces_in);
    let adjacency = MeshAdjacency::build(outcome.mesh.vertex_count(), &outcome.mesh.faces);
    assert!(adjacency.is_closed_manifold());
    assert!(outcome.mesh.signed_volume() > 0.0);
    assert!(outcome.mesh.vertices.iter().all(|v| v.normal.is_some()));
}

#[test]
fn test_smoothing_shrinks_box_volume() {
    let mut mesh = voxel_box(4, 4, 4);
    let before = mesh.volume();
    smooth_laplacian(&mut mesh, &SmoothParams::with_iterations(10));
    let after = mesh.volume();
    assert!(after < before);
    assert!(after > 0.0);
}

#[test]
fn test_process_and_write_every_format() {
    let dir = TempDir::new().unwrap();
    let outcome = post_process(voxel_box(3, 3, 3), &PostProcessParams::default()).unwrap();

    for format in MeshFormat::ALL {
        let path = dir
            .path()
            .join("out")
            .join(format!("box_{}.{}", format.token(), format.extension()));
        outcome.mesh.save(&path, format).unwrap();
        assert!(std::fs::metadata(&path).unwrap().len() > 0);
    }
}

#[test]
fn test_obj_round_trip_preserves_counts() {
    let dir = TempDir::new().unwrap();
    let mesh = voxel_box(2, 3, 4);
    let path = dir.path().join("box.obj");
    write_mesh(&mesh, &path, MeshFormat::Obj).unwrap();

    let (models, _) = tobj::load_obj(&path, &tobj::LoadOptions::default()).unwrap();
    assert_eq!(models[0].mesh.positions.len(), mesh.vertex_count() * 3);
    assert_eq!(models[0].mesh.indices.len(), mesh.face_count() * 3);
}

#[test]
fn test_stl_round_trip_preserves_faces() {
    let dir = TempDir::new().unwrap();
    let mesh = voxel_box(2, 2, 2);
    let path = dir.path().join("box.stl");
    write_mesh(&mesh, &path, MeshFormat::Stl).unwrap();

    let mut file = std::fs::File::open(&path).unwrap();
    let stl = stl_io::read_stl(&mut file).unwrap();
    assert_eq!(stl.faces.len(), mesh.face_count());
    // stl_io re-indexes shared corners, so the vertex count survives too.
    assert_eq!(stl.vertices.len(), mesh.vertex_count());
}

#[test]
fn test_invalid_mesh_is_not_written() {
    let mut mesh = voxel_box(1, 1, 1);
    mesh.vertices[0].position.x = f64::NAN;

    let err = mesh.post_process(&PostProcessParams::default()).unwrap_err();
    assert!(matches!(err, MeshError::InvalidCoordinate { .. }));
    assert_eq!(err.code().as_str(), "MESH-2002");
}
