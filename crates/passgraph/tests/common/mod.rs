#![allow(dead_code)]

use passgraph::{PipelineConfig, PipelineExecutor};

pub const BLUE: [u8; 4] = [0, 0, 255, 255];
pub const RED: [u8; 4] = [255, 0, 0, 255];

/// Device for tests that only check structure, draw records and errors
pub struct TestDevice {
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    /// Whether rendered pixels are real and may be read back
    pub hardware: bool,
}

/// A hardware device when one is available, otherwise wgpu's no-op backend
pub fn any_gpu() -> TestDevice {
    if let Some((device, queue)) = gpu() {
        return TestDevice { device, queue, hardware: true };
    }

    let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
        backends: wgpu::Backends::NOOP,
        backend_options: wgpu::BackendOptions {
            noop: wgpu::NoopBackendOptions { enable: true },
            ..Default::default()
        },
        ..Default::default()
    });
    let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions::default())).expect("no-op adapter");
    let (device, queue) = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor::default())).expect("no-op device");
    TestDevice { device, queue, hardware: false }
}

/// Hardware device and queue, or `None` when the machine has no usable adapter
pub fn gpu() -> Option<(wgpu::Device, wgpu::Queue)> {
    let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
        backends: wgpu::Backends::all() - wgpu::Backends::NOOP,
        ..Default::default()
    });
    let adapter = match pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
        power_preference: wgpu::PowerPreference::default(),
        compatible_surface: None,
        force_fallback_adapter: false,
    })) {
        Ok(adapter) => adapter,
        Err(e) => {
            eprintln!("skipping GPU test: {e}");
            return None;
        }
    };

    match pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
        label: Some("passgraph tests"),
        required_features: wgpu::Features::empty(),
        required_limits: wgpu::Limits::downlevel_defaults().using_resolution(adapter.limits()),
        memory_hints: wgpu::MemoryHints::default(),
        trace: Default::default(),
    })) {
        Ok(pair) => Some(pair),
        Err(e) => {
            eprintln!("skipping GPU test: {e}");
            None
        }
    }
}

pub fn executor(device: &wgpu::Device, queue: &wgpu::Queue) -> PipelineExecutor {
    PipelineExecutor::new(device, queue, PipelineConfig::new(wgpu::TextureFormat::Rgba8Unorm)).unwrap()
}

/// Destination texture that can be presented into and read back
pub fn target(device: &wgpu::Device, format: wgpu::TextureFormat, width: u32, height: u32) -> wgpu::Texture {
    target_with(device, format, width, height, 1, 1, 1)
}

/// Destination with explicit layer, mip and sample counts
pub fn target_with(device: &wgpu::Device, format: wgpu::TextureFormat, width: u32, height: u32, layers: u32, mip_level_count: u32, sample_count: u32) -> wgpu::Texture {
    let usage = if sample_count == 1 {
        wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC
    } else {
        wgpu::TextureUsages::RENDER_ATTACHMENT
    };
    device.create_texture(&wgpu::TextureDescriptor {
        label: Some("Test Target"),
        size: wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: layers,
        },
        mip_level_count,
        sample_count,
        dimension: wgpu::TextureDimension::D2,
        format,
        usage,
        view_formats: &[],
    })
}

/// 2x2 image with blue on the main diagonal and red elsewhere
pub fn checker() -> Vec<u8> {
    [BLUE, RED, RED, BLUE].concat()
}

pub fn solid(width: u32, height: u32, color: [u8; 4]) -> Vec<u8> {
    color.repeat((width * height) as usize)
}

pub fn pixel(data: &[u8], width: u32, x: u32, y: u32) -> [u8; 4] {
    let offset = ((y * width + x) * 4) as usize;
    [data[offset], data[offset + 1], data[offset + 2], data[offset + 3]]
}
