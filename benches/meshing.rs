use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use criterion::{criterion_group, criterion_main, Criterion, black_box};
use glam::{Mat4, Vec3};

use voxmesh::core::config::{FairingConfig, MaterialEncoding, NormalMode};
use voxmesh::generation::{Generator, TerrainParams};
use voxmesh::jobs::JobScheduler;
use voxmesh::math::Aabb;
use voxmesh::mesh::{SurfaceFairer, SurfaceNets};
use voxmesh::voxel::VoxelVolume;

fn filled(generator: &Generator) -> VoxelVolume {
    let mut volume = VoxelVolume::allocate(1.0);
    generator.fill(&Aabb::new(Vec3::ZERO, Vec3::splat(31.0)), &Mat4::IDENTITY, 1.0, &mut volume);
    volume
}

fn bench_surface_nets_sphere(c: &mut Criterion) {
    let volume = filled(&Generator::Sphere { center: Vec3::splat(15.5), radius: 12.0, material: 1 });

    c.bench_function("surface_nets_sphere", |b| {
        let mut nets = SurfaceNets::new(NormalMode::Gradient, MaterialEncoding::BlendWeights);
        b.iter(|| nets.extract(black_box(&volume)));
    });
}

fn bench_surface_nets_terrain(c: &mut Criterion) {
    let volume = filled(&Generator::terrain(TerrainParams::default()));

    c.bench_function("surface_nets_terrain", |b| {
        let mut nets = SurfaceNets::new(NormalMode::Geometry, MaterialEncoding::BlendWeights);
        b.iter(|| nets.extract(black_box(&volume)));
    });
}

fn bench_fairing(c: &mut Criterion) {
    let volume = filled(&Generator::terrain(TerrainParams::default()));
    let mesh = SurfaceNets::new(NormalMode::Gradient, MaterialEncoding::BlendWeights).extract(&volume);
    let fairer = SurfaceFairer::new(FairingConfig::default());

    c.bench_function("fairing_terrain", |b| {
        b.iter(|| {
            let mut mesh = mesh.clone();
            fairer.fair(black_box(&mut mesh), 1.0);
            mesh
        });
    });
}

fn bench_generate_terrain(c: &mut Criterion) {
    let generator = Generator::terrain(TerrainParams::default());
    let mut volume = VoxelVolume::allocate(1.0);
    let bounds = Aabb::new(Vec3::ZERO, Vec3::splat(31.0));

    c.bench_function("generate_terrain", |b| {
        b.iter(|| generator.fill(&bounds, black_box(&Mat4::IDENTITY), 1.0, &mut volume));
    });
}

fn bench_scheduler_chain(c: &mut Criterion) {
    let scheduler = JobScheduler::new(4).unwrap();

    c.bench_function("scheduler_chain_256", |b| {
        b.iter(|| {
            let counter = Arc::new(AtomicUsize::new(0));
            let mut tail = voxmesh::jobs::JobHandle::completed();
            for _ in 0..256 {
                let counter = Arc::clone(&counter);
                tail = scheduler.schedule("bench", &[tail], move || {
                    counter.fetch_add(1, Ordering::Relaxed);
                });
            }
            tail.wait();
            counter.load(Ordering::Relaxed)
        });
    });
}

criterion_group!(
    benches,
    bench_surface_nets_sphere,
    bench_surface_nets_terrain,
    bench_fairing,
    bench_generate_terrain,
    bench_scheduler_chain,
);
criterion_main!(benches);
