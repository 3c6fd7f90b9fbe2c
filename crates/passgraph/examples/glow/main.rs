//! Headless glow demo
//!
//! Builds a `diffuse -> blur_x -> blur_y -> glow` pipeline, feeds it an image (or a 2x2
//! blue/red checker when no input is given), presents the last stage into an offscreen
//! texture and writes the result as a PNG.
//!
//! # Usage
//! ```bash
//! RUST_LOG=passgraph=debug cargo run --example glow -- --input photo.png --width 1280 --height 720 glow.png
//! ```

use clap::{Parser, ValueEnum};
use image::RgbaImage;
use passgraph::{PipelineConfig, PipelineExecutor, SamplerFilterMode, SourceDescriptor, presets, readback};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Filter {
    Nearest,
    Linear,
}

#[derive(Parser)]
#[command(version, about = "Render a blur and glow pipeline into a PNG")]
struct Args {
    /// Output PNG path
    output: PathBuf,

    /// Input image; defaults to a 2x2 blue/red checker
    #[arg(long, short)]
    input: Option<PathBuf>,

    /// Display width; defaults to the input width
    #[arg(long)]
    width: Option<u32>,

    /// Display height; defaults to the input height
    #[arg(long)]
    height: Option<u32>,

    /// Sampler filter used by every stage
    #[arg(long, value_enum, default_value = "nearest")]
    filter: Filter,
}

fn checker() -> RgbaImage {
    RgbaImage::from_fn(2, 2, |x, y| if x == y { image::Rgba([0, 0, 255, 255]) } else { image::Rgba([255, 0, 0, 255]) })
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let args = Args::parse();

    let input = match &args.input {
        Some(path) => image::open(path)?.to_rgba8(),
        None => checker(),
    };
    let (width, height) = input.dimensions();
    let display_width = args.width.unwrap_or(width);
    let display_height = args.height.unwrap_or(height);
    tracing::info!(width, height, display_width, display_height, "loaded input");

    let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
        backends: wgpu::Backends::PRIMARY,
        ..Default::default()
    });
    let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
        power_preference: wgpu::PowerPreference::HighPerformance,
        compatible_surface: None,
        force_fallback_adapter: false,
    }))?;
    let (device, queue) = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
        label: None,
        required_features: wgpu::Features::empty(),
        required_limits: wgpu::Limits::downlevel_defaults().using_resolution(adapter.limits()),
        memory_hints: wgpu::MemoryHints::default(),
        trace: Default::default(),
    }))?;

    let filter_mode = match args.filter {
        Filter::Nearest => SamplerFilterMode::Nearest,
        Filter::Linear => SamplerFilterMode::Linear,
    };
    let format = wgpu::TextureFormat::Rgba8Unorm;
    let mut pipeline = PipelineExecutor::new(&device, &queue, PipelineConfig::new(format).with_filter_mode(filter_mode))?;

    let report = pipeline.configure(
        vec![SourceDescriptor::new("diffuse", width, height)],
        vec![
            presets::blur_x("blur_x", width, height, "diffuse"),
            presets::blur_y("blur_y", width, height, "blur_x"),
            presets::glow("glow", width, height, "blur_y"),
        ],
    )?;
    for diagnostic in &report.diagnostics {
        tracing::warn!("{diagnostic}");
    }

    pipeline.set_source_data("diffuse", input.as_raw())?;

    let destination = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("Glow Output"),
        size: wgpu::Extent3d {
            width: display_width,
            height: display_height,
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
        view_formats: &[],
    });

    let start = std::time::Instant::now();
    let summary = pipeline.render_frame(&destination, display_width, display_height)?;
    let pixels = readback::read_rgba8(&device, &queue, &destination)?;
    tracing::info!(draws = summary.draws.len(), elapsed = ?start.elapsed(), "rendered frame");

    let output = RgbaImage::from_raw(display_width, display_height, pixels).ok_or("readback size does not match the display size")?;
    output.save(&args.output)?;
    println!("Saved {}x{} image to {}", display_width, display_height, args.output.display());

    Ok(())
}
