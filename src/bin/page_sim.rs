//! Page cache simulator - flies a camera around a planet and streams pages.
//!
//! Usage: cargo run --release --bin page_sim -- [OPTIONS]
//!
//! Options:
//!   --config <PATH>     JSON cache config (default: defaults + PLANETILE_* env)
//!   --frames <N>        Frames to simulate (default: 600)
//!   --altitude <M>      Camera altitude above max radius in meters (default: 400000)
//!   --tiles <PATTERN>   Read raw tiles from disk, e.g. "tiles/{depth}/{row}_{col}.raw"
//!                       (default: procedural tiles)
//!   --report <N>        Print stats every N frames (default: 60)

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Instant;

use glam::{DMat4, DVec3};

use planetile::core::{logging, CacheConfig};
use planetile::core::error::TileResult;
use planetile::pages::{PageCoord, View};
use planetile::streaming::{Cache, Color, FileTileSource, IndexEntry, TileBuffer, TileFormat, UploadSink};

/// Counts what a renderer would have been sent
#[derive(Default)]
struct CountingSink {
    tiles: usize,
    bytes: usize,
    index_uploads: usize,
}

impl UploadSink<Color> for CountingSink {
    fn upload_tile(&mut self, _slot: u32, _origin: (u32, u32), pixels: &[[u8; 4]]) {
        self.tiles += 1;
        self.bytes += std::mem::size_of_val(pixels);
    }

    fn upload_index(&mut self, entries: &[IndexEntry]) {
        self.index_uploads += 1;
        self.bytes += std::mem::size_of_val(entries);
    }
}

/// Checkerboard tinted by depth, so LOD transitions are visible in dumps
fn procedural_tile(page_size: u32, coord: PageCoord, buffer: &mut TileBuffer) -> TileResult<()> {
    let bytes = buffer.write(page_size, page_size, Color::CHANNELS, Color::tile_bytes(page_size));
    let tint = (coord.depth * 40).min(255) as u8;
    for (i, px) in bytes.chunks_exact_mut(4).enumerate() {
        let x = i as u32 % page_size;
        let y = i as u32 / page_size;
        let check = ((x / 8 + y / 8 + coord.row + coord.col) % 2) as u8 * 128;
        px.copy_from_slice(&[tint, check, 255 - tint, 255]);
    }
    Ok(())
}

fn load_config(args: &[String]) -> planetile::core::Result<CacheConfig> {
    match parse_str_arg(args, "--config") {
        Some(path) => {
            let mut config = CacheConfig::load_sync(&PathBuf::from(path))?;
            config.apply_overrides(|key| std::env::var(key).ok())?;
            Ok(config)
        }
        None => CacheConfig::from_env(),
    }
}

fn orbit_view(frame: u32, radius: f64, altitude: f64) -> View {
    let angle = frame as f64 * 0.01;
    let eye = DVec3::new(angle.sin(), 0.3, angle.cos()).normalize() * (radius + altitude);
    let proj = DMat4::perspective_rh(60f64.to_radians(), 16.0 / 9.0, 1000.0, radius * 4.0);
    let view = DMat4::look_at_rh(eye, DVec3::ZERO, DVec3::Y);
    View::from_view_projection(&(proj * view), eye)
}

fn main() -> ExitCode {
    logging::init();

    let args: Vec<String> = std::env::args().collect();
    let frames = parse_u32_arg(&args, "--frames").unwrap_or(600);
    let altitude = parse_f64_arg(&args, "--altitude").unwrap_or(400_000.0);
    let report_every = parse_u32_arg(&args, "--report").unwrap_or(60).max(1);

    let config = match load_config(&args) {
        Ok(config) => config,
        Err(e) => {
            log::error!("Invalid configuration: {}", e);
            return ExitCode::FAILURE;
        }
    };
    let page_size = config.page_size;
    let radius = config.max_radius;

    let cache = match parse_str_arg(&args, "--tiles") {
        Some(pattern) => {
            log::info!("Reading tiles from {}", pattern);
            Cache::<Color>::new(config, FileTileSource::new::<Color>(pattern, page_size))
        }
        None => Cache::<Color>::new(config, move |coord: PageCoord, buffer: &mut TileBuffer| {
            procedural_tile(page_size, coord, buffer)
        }),
    };
    let mut cache = match cache {
        Ok(cache) => cache,
        Err(e) => {
            log::error!("Failed to create page cache: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let mut sink = CountingSink::default();
    let start = Instant::now();

    for frame in 0..frames {
        cache.update(&[orbit_view(frame, radius, altitude)]);
        cache.proc();
        cache.upload(&mut sink);

        if (frame + 1) % report_every == 0 {
            match serde_json::to_string(&cache.stats()) {
                Ok(json) => println!("{json}"),
                Err(e) => log::warn!("Failed to serialize stats: {}", e),
            }
        }
    }

    let elapsed = start.elapsed();
    cache.shutdown();

    println!();
    println!("=== Simulation complete ===");
    println!("Frames:   {} in {:.2?} ({:.1} fps)", frames, elapsed, frames as f64 / elapsed.as_secs_f64());
    println!("Uploads:  {} tiles, {} index updates, {:.1} MB", sink.tiles, sink.index_uploads, sink.bytes as f64 / 1e6);
    let stats = cache.stats();
    println!(
        "Cache:    {}/{} slots, {} commits, {} evictions, {} missing",
        stats.resident, stats.capacity, stats.commits, stats.evictions, stats.missing
    );

    ExitCode::SUCCESS
}

fn parse_f64_arg(args: &[String], flag: &str) -> Option<f64> {
    args.iter().position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .and_then(|s| s.parse().ok())
}

fn parse_u32_arg(args: &[String], flag: &str) -> Option<u32> {
    args.iter().position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .and_then(|s| s.parse().ok())
}

fn parse_str_arg(args: &[String], flag: &str) -> Option<String> {
    args.iter().position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .cloned()
}
