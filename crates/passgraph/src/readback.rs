//! Blocking texture readback

use crate::{error::PipelineError, resource::BYTES_PER_PIXEL};

/// Rounds a row length up to the buffer copy alignment
fn padded_bytes_per_row(width: u32) -> u32 {
    let unpadded = width * BYTES_PER_PIXEL;
    unpadded.div_ceil(wgpu::COPY_BYTES_PER_ROW_ALIGNMENT) * wgpu::COPY_BYTES_PER_ROW_ALIGNMENT
}

/// Copies an RGBA8 texture into a tightly packed CPU buffer
///
/// Blocks until the GPU has finished every submitted command that writes the texture.
///
/// # Arguments
/// * `device` - The wgpu device owning the texture
/// * `queue` - Queue the copy is submitted on
/// * `texture` - A single-sample `Rgba8Unorm` or `Rgba8UnormSrgb` texture with `COPY_SRC`
///   usage; only mip level 0 of layer 0 is read
///
/// # Returns
/// `width * height * 4` bytes in row-major order
pub fn read_rgba8(device: &wgpu::Device, queue: &wgpu::Queue, texture: &wgpu::Texture) -> Result<Vec<u8>, PipelineError> {
    let format = texture.format();
    if !matches!(format, wgpu::TextureFormat::Rgba8Unorm | wgpu::TextureFormat::Rgba8UnormSrgb) {
        return Err(PipelineError::UnsupportedFormat(format));
    }

    if !texture.usage().contains(wgpu::TextureUsages::COPY_SRC) {
        return Err(PipelineError::MissingUsage(wgpu::TextureUsages::COPY_SRC));
    }
    if texture.sample_count() != 1 {
        return Err(PipelineError::Readback(format!("cannot copy a texture with {} samples", texture.sample_count())));
    }

    let (width, height) = (texture.width(), texture.height());
    let tight_bytes_per_row = (width * BYTES_PER_PIXEL) as usize;
    let padded = padded_bytes_per_row(width);

    let buffer = device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("Readback Buffer"),
        size: padded as wgpu::BufferAddress * height as wgpu::BufferAddress,
        usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
        mapped_at_creation: false,
    });

    let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some("Readback Encoder") });
    encoder.copy_texture_to_buffer(
        wgpu::TexelCopyTextureInfo {
            texture,
            mip_level: 0,
            origin: wgpu::Origin3d::ZERO,
            aspect: wgpu::TextureAspect::All,
        },
        wgpu::TexelCopyBufferInfo {
            buffer: &buffer,
            layout: wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(padded),
                rows_per_image: Some(height),
            },
        },
        wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        },
    );
    queue.submit(std::iter::once(encoder.finish()));

    let buffer_slice = buffer.slice(..);
    let (sender, receiver) = futures_intrusive::channel::shared::oneshot_channel();
    buffer_slice.map_async(wgpu::MapMode::Read, move |result| {
        // The receiver only goes away if the caller already returned with an error
        let _ = sender.send(result);
    });

    let device_error = |message: String| PipelineError::Device {
        context: "reading back texture".to_string(),
        message,
    };
    device.poll(wgpu::PollType::Wait).map_err(|e| device_error(e.to_string()))?;
    pollster::block_on(receiver.receive())
        .ok_or_else(|| device_error("buffer mapping was cancelled".to_string()))?
        .map_err(|e| device_error(e.to_string()))?;

    let data = buffer_slice.get_mapped_range();
    let mut pixels = Vec::with_capacity(tight_bytes_per_row * height as usize);
    for row in data.chunks(padded as usize) {
        pixels.extend_from_slice(&row[..tight_bytes_per_row]);
    }
    drop(data);
    buffer.unmap();

    tracing::trace!(width, height, "read back texture");
    Ok(pixels)
}
