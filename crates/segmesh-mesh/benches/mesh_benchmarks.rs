//! Benchmarks for segmesh-mesh post-processing and export.
//!
//! Run with: cargo bench -p segmesh-mesh
//!
//! To compare against baseline:
//! 1. First run: cargo bench -p segmesh-mesh -- --save-baseline main
//! 2. After changes: cargo bench -p segmesh-mesh -- --baseline main

use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use segmesh_mesh::{
    DecimateParams, Mesh, MeshFormat, SmoothParams, Vertex, decimate_mesh, smooth_laplacian,
    write_mesh,
};

// =============================================================================
// Test Mesh Generation
// =============================================================================

/// Create a closed UV sphere with `rings * segments` quads.
fn create_sphere(rings: u32, segments: u32) -> Mesh {
    let mut mesh = Mesh::new();
    mesh.vertices.push(Vertex::from_coords(0.0, 0.0, 1.0));
    for r in 1..rings {
        let theta = std::f64::consts::PI * r as f64 / rings as f64;
        for s in 0..segments {
            let phi = std::f64::consts::TAU * s as f64 / segments as f64;
            mesh.vertices.push(Vertex::from_coords(
                theta.sin() * phi.cos(),
                theta.sin() * phi.sin(),
                theta.cos(),
            ));
        }
    }
    mesh.vertices.push(Vertex::from_coords(0.0, 0.0, -1.0));
    let south = mesh.vertices.len() as u32 - 1;
    let ring = |r: u32, s: u32| 1 + (r - 1) * segments + (s % segments);

    for s in 0..segments {
        mesh.faces.push([0, ring(1, s), ring(1, s + 1)]);
        mesh.faces
            .push([south, ring(rings - 1, s + 1), ring(rings - 1, s)]);
    }
    for r in 1..rings - 1 {
        for s in 0..segments {
            let (a, b, c, d) = (ring(r, s), ring(r + 1, s), ring(r + 1, s + 1), ring(r, s + 1));
            mesh.faces.push([a, b, c]);
            mesh.faces.push([a, c, d]);
        }
    }
    mesh
}

fn test_cases() -> [(&'static str, Mesh); 3] {
    [
        ("sphere_~1k_tri", create_sphere(16, 32)),
        ("sphere_~8k_tri", create_sphere(64, 64)),
        ("sphere_~32k_tri", create_sphere(128, 128)),
    ]
}

// =============================================================================
// Post-processing Benchmarks
// =============================================================================

fn bench_smoothing(c: &mut Criterion) {
    let mut group = c.benchmark_group("Smoothing");

    for (name, mesh) in &test_cases() {
        group.throughput(Throughput::Elements(mesh.vertices.len() as u64));
        group.bench_with_input(BenchmarkId::new("laplacian_10", name), mesh, |b, mesh| {
            let params = SmoothParams::with_iterations(10);
            b.iter(|| {
                let mut m = mesh.clone();
                smooth_laplacian(black_box(&mut m), black_box(&params));
                m
            })
        });
    }

    group.finish();
}

fn bench_decimation(c: &mut Criterion) {
    let mut group = c.benchmark_group("Decimation");
    group.sample_size(20);

    for (name, mesh) in &test_cases() {
        group.throughput(Throughput::Elements(mesh.faces.len() as u64));
        for reduction in [0.05, 0.5] {
            group.bench_with_input(
                BenchmarkId::new(format!("qem_{reduction}"), name),
                mesh,
                |b, mesh| {
                    let params = DecimateParams::with_reduction(reduction);
                    b.iter(|| decimate_mesh(black_box(mesh), black_box(&params)))
                },
            );
        }
    }

    group.finish();
}

// =============================================================================
// Export Benchmarks
// =============================================================================

fn bench_write(c: &mut Criterion) {
    let mut group = c.benchmark_group("Write");
    let dir = tempfile::TempDir::new().expect("temp dir");
    let sphere = create_sphere(64, 64);

    group.throughput(Throughput::Elements(sphere.faces.len() as u64));
    for format in [MeshFormat::Stl, MeshFormat::Obj, MeshFormat::Ply, MeshFormat::ThreeMf] {
        let path = dir.path().join(format!("bench.{}", format.extension()));
        group.bench_function(format.token(), |b| {
            b.iter(|| write_mesh(black_box(&sphere), black_box(&path), format))
        });
    }

    group.finish();
}

criterion_group!(benches, bench_smoothing, bench_decimation, bench_write);

criterion_main!(benches);
