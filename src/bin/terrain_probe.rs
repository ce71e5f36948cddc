//! Build a cave terrain, remesh it, edit it and query it, printing timings.
//!
//! Usage:
//!   cargo run --release --bin terrain_probe -- [--gpu] [--chunks 4] [--size 32] [--seed 7]
//!       [--config terrain.json] [--commands edits.json]

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use glam::{UVec3, Vec3};

use delve::compute::{ComputeBackend, CpuBackend, GpuBackend};
use delve::core::{logging, Result, TerrainConfig};
use delve::edit::EditCommand;
use delve::terrain::{CaveGenerator, CaveParams, Terrain};

struct Args {
    gpu: bool,
    chunks: u32,
    size: u32,
    seed: u32,
    config: Option<PathBuf>,
    commands: Option<PathBuf>,
}

fn value<T: std::str::FromStr>(args: &[String], flag: &str) -> Option<T> {
    args.iter()
        .position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .and_then(|s| s.parse().ok())
}

fn parse_args() -> Args {
    let args: Vec<String> = std::env::args().collect();
    Args {
        gpu: args.iter().any(|a| a == "--gpu"),
        chunks: value(&args, "--chunks").unwrap_or(4),
        size: value(&args, "--size").unwrap_or(32),
        seed: value(&args, "--seed").unwrap_or(12345),
        config: value(&args, "--config"),
        commands: value(&args, "--commands"),
    }
}

fn main() -> Result<()> {
    logging::init();
    let args = parse_args();

    let config = match &args.config {
        Some(path) => TerrainConfig::load(path)?,
        None => TerrainConfig {
            chunk_size: args.size,
            chunks: UVec3::new(args.chunks, (args.chunks / 2).max(1), args.chunks),
            ..Default::default()
        },
    };
    let commands: Vec<EditCommand> = match &args.commands {
        Some(path) => serde_json::from_str(&std::fs::read_to_string(path)?)?,
        None => Vec::new(),
    };

    println!("=== Delve Terrain Probe ===");
    println!("Backend: {}", if args.gpu { "gpu" } else { "cpu" });
    println!("Chunks:  {} x {} x {} of {} cells", config.chunks.x, config.chunks.y, config.chunks.z, config.chunk_size);
    println!("Seed:    {}", args.seed);
    println!();

    if args.gpu {
        run(config, Arc::new(GpuBackend::new()?), args.seed, commands)
    } else {
        run(config, Arc::new(CpuBackend::new()), args.seed, commands)
    }
}

fn run<B: ComputeBackend>(config: TerrainConfig, backend: Arc<B>, seed: u32, commands: Vec<EditCommand>) -> Result<()> {
    let mut terrain = Terrain::new(config, backend)?;
    let bounds = terrain.grid().bounds();
    let center = bounds.center();

    let generator = CaveGenerator::new(CaveParams {
        seed,
        ground_height: bounds.min.y + bounds.size().y * 0.75,
        ..Default::default()
    });

    let start = Instant::now();
    terrain.populate(&generator);
    println!("Populate: {:.1} ms", start.elapsed().as_secs_f64() * 1000.0);

    let start = Instant::now();
    let reports = terrain.regenerate_all()?;
    let triangles: u64 = reports.iter().map(|r| r.triangle_count as u64).sum();
    let area: f32 = terrain.grid().iter().map(|c| c.geometry().surface_area()).sum();
    println!(
        "Remesh:   {:.1} ms ({} chunks, {} triangles, surface {:.1})",
        start.elapsed().as_secs_f64() * 1000.0,
        reports.len(),
        triangles,
        area
    );

    let radius = terrain.grid().scale() * 4.0;
    let start = Instant::now();
    let carve = terrain.carve_sphere(center, radius, 1.0)?;
    println!(
        "Carve:    {:.1} ms ({} chunks remeshed, {} triangles)",
        start.elapsed().as_secs_f64() * 1000.0,
        carve.edited.len(),
        carve.triangles
    );

    let start = Instant::now();
    let fill = terrain.fill_sphere(center + Vec3::splat(radius), radius, 0.5)?;
    println!(
        "Fill:     {:.1} ms ({} chunks remeshed)",
        start.elapsed().as_secs_f64() * 1000.0,
        fill.edited.len()
    );

    let origin = Vec3::new(center.x, bounds.max.y + 10.0, center.z) + Vec3::new(0.37, 0.0, 0.21);
    let direction = Vec3::new(0.0, -(bounds.size().y + 20.0), 0.0);
    let start = Instant::now();
    let ray = terrain.raycast_query(origin, direction)?;
    match ray.hit {
        Some(hit) => println!(
            "Raycast:  {:.2} ms hit at {:?} (distance {:.2}, chunk {:?})",
            start.elapsed().as_secs_f64() * 1000.0,
            hit.position,
            hit.distance,
            hit.chunk
        ),
        None => println!("Raycast:  {:.2} ms miss ({} chunk queries)", start.elapsed().as_secs_f64() * 1000.0, ray.dispatches),
    }

    let start = Instant::now();
    let sphere = terrain.sphere_query(center, radius * 2.0)?;
    println!(
        "Sphere:   {:.2} ms {} ({} candidates{})",
        start.elapsed().as_secs_f64() * 1000.0,
        if sphere.is_hit() { "hit" } else { "miss" },
        sphere.candidates,
        if sphere.overflowed { ", overflowed" } else { "" }
    );

    if !commands.is_empty() {
        let count = commands.len();
        for command in commands {
            terrain.submit(command);
        }
        let start = Instant::now();
        let reports = terrain.process()?;
        let edited: usize = reports.iter().map(|r| r.edited.len()).sum();
        println!(
            "Commands: {} in {:.1} ms ({} chunk remeshes)",
            count,
            start.elapsed().as_secs_f64() * 1000.0,
            edited
        );
    }

    let stats = terrain.stats();
    println!();
    println!("Dispatches: {}, readbacks: {}", stats.dispatches(), stats.readbacks());
    Ok(())
}
