//! Fixed-size GPU image resources
//!
//! A [`Resource`] is a 2D RGBA8 texture owned by exactly one source or stage. Other stages
//! never hold the texture itself; they keep a [`ResourceRef`] naming the owner and the
//! [`ResourceId`] they were linked against, which the executor re-checks every frame.

use crate::error::{PipelineError, with_error_scope};
use std::{
    fmt,
    sync::atomic::{AtomicU64, Ordering},
};

/// Pixel format of every source and intermediate stage output
pub const RESOURCE_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

/// Bytes per pixel of [`RESOURCE_FORMAT`]
pub const BYTES_PER_PIXEL: u32 = 4;

static NEXT_RESOURCE_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of one resource allocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResourceId(u64);

impl ResourceId {
    pub(crate) fn next() -> Self {
        Self(NEXT_RESOURCE_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// The component that owns a resource
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ResourceOwner {
    /// A host-fed source
    Source(String),
    /// A stage's private output
    Stage(String),
}

impl ResourceOwner {
    /// Name the owner is registered under
    pub fn name(&self) -> &str {
        match self {
            ResourceOwner::Source(name) | ResourceOwner::Stage(name) => name,
        }
    }
}

impl fmt::Display for ResourceOwner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Source(name) => write!(f, "source '{name}'"),
            Self::Stage(name) => write!(f, "stage '{name}'"),
        }
    }
}

/// Non-owning, lifetime-checked reference to another component's resource
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceRef {
    /// Component expected to own the resource
    pub owner: ResourceOwner,
    /// Allocation the reference was linked against
    pub id: ResourceId,
}

/// A fixed-size 2D image usable as a shader-readable texture
#[derive(Debug)]
pub struct Resource {
    id: ResourceId,
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    render_target: bool,
}

impl Resource {
    /// Allocates a new resource
    ///
    /// # Arguments
    /// * `device` - The wgpu device for resource creation
    /// * `label` - Debug label, usually the owner's name
    /// * `width`, `height` - Fixed pixel dimensions
    /// * `render_target` - Whether stages may render into this resource
    ///
    /// # Returns
    /// The resource, or an error when the dimensions are out of range or the device rejects
    /// the allocation
    pub fn create(device: &wgpu::Device, label: &str, width: u32, height: u32, render_target: bool) -> Result<Self, PipelineError> {
        check_dimensions(label, width, height, device.limits().max_texture_dimension_2d)?;

        let usage = if render_target {
            wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_SRC
        } else {
            wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST | wgpu::TextureUsages::COPY_SRC
        };

        let texture = with_error_scope(
            device,
            || format!("allocating {width}x{height} resource '{label}'"),
            || {
                device.create_texture(&wgpu::TextureDescriptor {
                    label: Some(label),
                    size: wgpu::Extent3d {
                        width,
                        height,
                        depth_or_array_layers: 1,
                    },
                    mip_level_count: 1,
                    sample_count: 1,
                    dimension: wgpu::TextureDimension::D2,
                    format: RESOURCE_FORMAT,
                    usage,
                    view_formats: &[],
                })
            },
        )?;
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());

        Ok(Self {
            id: ResourceId::next(),
            texture,
            view,
            render_target,
        })
    }

    pub fn id(&self) -> ResourceId {
        self.id
    }

    pub fn width(&self) -> u32 {
        self.texture.width()
    }

    pub fn height(&self) -> u32 {
        self.texture.height()
    }

    /// Underlying texture, e.g. for readback
    pub fn texture(&self) -> &wgpu::Texture {
        &self.texture
    }

    /// Read-capable view of the resource
    pub fn as_texture(&self) -> &wgpu::TextureView {
        &self.view
    }

    /// Render-target view, if the resource was created as one
    pub fn as_render_target(&self) -> Option<&wgpu::TextureView> {
        self.render_target.then_some(&self.view)
    }

    /// Number of bytes a full upload must contain
    pub fn data_len(&self) -> usize {
        data_len(self.width(), self.height())
    }

    /// Replaces the full pixel contents
    ///
    /// The upload is queued and becomes visible to every command buffer submitted after this
    /// call. Nothing is uploaded unless `data` is exactly [`Resource::data_len`] bytes.
    pub fn upload(&self, queue: &wgpu::Queue, name: &str, data: &[u8]) -> Result<(), PipelineError> {
        let expected = self.data_len();
        if data.len() != expected {
            return Err(PipelineError::DataSize {
                name: name.to_string(),
                expected,
                actual: data.len(),
            });
        }

        let (width, height) = (self.width(), self.height());
        queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &self.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            data,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(width * BYTES_PER_PIXEL),
                rows_per_image: Some(height),
            },
            wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );

        Ok(())
    }
}

/// Byte length of a tightly packed RGBA8 image
pub fn data_len(width: u32, height: u32) -> usize {
    width as usize * height as usize * BYTES_PER_PIXEL as usize
}

/// Rejects zero sizes and sizes beyond the device's 2D texture limit
pub(crate) fn check_dimensions(name: &str, width: u32, height: u32, limit: u32) -> Result<(), PipelineError> {
    if width == 0 || height == 0 || width > limit || height > limit {
        return Err(PipelineError::InvalidDimensions {
            name: name.to_string(),
            width,
            height,
            limit,
        });
    }
    Ok(())
}
