//! Rolling-grid demo: streams terrain under a moving window and reports what
//! each commit delivered.
//!
//! Usage: cargo run --release --bin stream_demo -- [OPTIONS]
//!
//! Options:
//!   --dims <N>        Chunks per horizontal axis (default: 4)
//!   --steps <N>       Chunks to travel along +X (default: 8)
//!   --threads <N>     Worker threads, 0 = one per core (default: 0)
//!   --seed <SEED>     Terrain seed (default: 12345)
//!   --fair            Enable the fairing post-pass
//!   --stamp           Carve a sphere into the terrain after every commit
//!   --config <PATH>   Engine config JSON (overrides --threads and --fair)

use std::path::PathBuf;
use std::time::Instant;

use glam::{IVec3, UVec3, Vec3};

use voxmesh::core::config::{EngineConfig, FairingConfig};
use voxmesh::edit::{Stamp, StampMode};
use voxmesh::generation::{Generator, TerrainParams};
use voxmesh::streaming::{GridConfig, MoveOutcome};
use voxmesh::voxel::chunk::ChunkCoord;
use voxmesh::{MeshStore, VoxelWorld};

fn main() {
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or("info"),
    )
    .format_timestamp_millis()
    .init();

    let args: Vec<String> = std::env::args().collect();
    let dims = parse_u32_arg(&args, "--dims").unwrap_or(4);
    let steps = parse_i32_arg(&args, "--steps").unwrap_or(8);
    let threads = parse_usize_arg(&args, "--threads").unwrap_or(0);
    let seed = parse_u32_arg(&args, "--seed").unwrap_or(12345);
    let fair = args.iter().any(|a| a == "--fair");
    let stamp = args.iter().any(|a| a == "--stamp");

    let config = match parse_str_arg(&args, "--config").map(PathBuf::from) {
        Some(path) => match EngineConfig::load(&path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Failed to load {}: {}", path.display(), e);
                std::process::exit(1);
            }
        },
        None => {
            let mut config = EngineConfig { worker_threads: threads, ..Default::default() };
            if fair {
                config.meshing.fairing = Some(FairingConfig::default());
            }
            config
        }
    };

    println!("=== Voxmesh Stream Demo ===");
    println!("Window: {} x 1 x {} chunks", dims, dims);
    println!("Travel: {} chunks along +X", steps);
    println!("Seed:   {}", seed);
    println!("Fairing: {}", config.meshing.fairing.is_some());
    println!();

    let mut world = match VoxelWorld::new(config, MeshStore::new()) {
        Ok(world) => world,
        Err(e) => {
            eprintln!("Failed to start world: {}", e);
            std::process::exit(1);
        }
    };

    let start = Instant::now();
    let grid = world.create_grid(GridConfig {
        dims: UVec3::new(dims, 1, dims),
        rolling: true,
        generator: Generator::terrain(TerrainParams { seed, ..Default::default() }),
        ..Default::default()
    });
    world.wait_idle();
    println!(
        "Initial population: {} chunks, {} triangles in {:.1}ms",
        world.sink().len(),
        world.sink().triangle_count(),
        start.elapsed().as_secs_f64() * 1000.0
    );

    for step in 1..=steps {
        let target = IVec3::new(step, 0, 0);
        let step_start = Instant::now();
        match world.request_move(grid, target) {
            Ok(MoveOutcome::Accepted) => {}
            Ok(outcome) => {
                println!("Move to {:?}: {:?}", target, outcome);
                continue;
            }
            Err(e) => {
                eprintln!("Move to {:?} failed: {}", target, e);
                break;
            }
        }

        let report = world.wait_idle();
        println!(
            "Step {:>3}: anchor {:?}, {} commits, {} meshes, {} triangles total, {:.1}ms",
            step,
            world.grid(grid).map(|g| g.anchor()).unwrap_or_default(),
            report.commits,
            report.meshes_applied,
            world.sink().triangle_count(),
            step_start.elapsed().as_secs_f64() * 1000.0
        );

        if stamp {
            // Carve at the centre of the newest slab, straddling the seam below it
            let spacing = ChunkCoord::spacing(1.0);
            let center = Vec3::new(
                (step + dims as i32 - 1) as f32 * spacing,
                16.0,
                dims as f32 * spacing * 0.5,
            );
            let edited = world.stamp(&Stamp::sphere(center, 6.0, 0).with_mode(StampMode::Subtract));
            world.wait_idle();
            println!("          carved {} chunks at {:?}", edited, center);
        }
    }

    let stats = world.fences().scheduler().stats();
    println!();
    println!("Commits received: {}", world.sink().commits().len());
    println!("Meshes applied:   {}", world.sink().applied());
    println!(
        "Jobs: {} scheduled, {} completed, {} panicked",
        stats.scheduled, stats.completed, stats.panicked
    );
    println!("Total time: {:.2}s", start.elapsed().as_secs_f64());

    world.shutdown();
}

fn parse_u32_arg(args: &[String], flag: &str) -> Option<u32> {
    args.iter().position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .and_then(|s| s.parse().ok())
}

fn parse_i32_arg(args: &[String], flag: &str) -> Option<i32> {
    args.iter().position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .and_then(|s| s.parse().ok())
}

fn parse_usize_arg(args: &[String], flag: &str) -> Option<usize> {
    args.iter().position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .and_then(|s| s.parse().ok())
}

fn parse_str_arg(args: &[String], flag: &str) -> Option<String> {
    args.iter().position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .cloned()
}
