//! Host-fed pipeline inputs

use crate::{error::PipelineError, resource::Resource};

/// Parameters for creating a [`Source`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceDescriptor {
    /// Name stages use to declare this source as an input
    pub name: String,
    pub width: u32,
    pub height: u32,
}

impl SourceDescriptor {
    pub fn new(name: impl Into<String>, width: u32, height: u32) -> Self {
        Self { name: name.into(), width, height }
    }
}

/// A named resource populated with raw RGBA8 pixels by the host
#[derive(Debug)]
pub struct Source {
    name: String,
    resource: Resource,
}

impl Source {
    /// Allocates the source's resource
    pub fn new(device: &wgpu::Device, descriptor: &SourceDescriptor) -> Result<Self, PipelineError> {
        let resource = Resource::create(device, &descriptor.name, descriptor.width, descriptor.height, false)?;
        tracing::debug!(source = %descriptor.name, width = descriptor.width, height = descriptor.height, "created source");

        Ok(Self {
            name: descriptor.name.clone(),
            resource,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn resource(&self) -> &Resource {
        &self.resource
    }

    /// Uploads a full frame of tightly packed RGBA8 pixels
    ///
    /// # Arguments
    /// * `queue` - Queue the upload is recorded on
    /// * `data` - Exactly `width * height * 4` bytes, rows top to bottom
    pub fn set_data(&self, queue: &wgpu::Queue, data: &[u8]) -> Result<(), PipelineError> {
        self.resource.upload(queue, &self.name, data)?;
        tracing::trace!(source = %self.name, bytes = data.len(), "queued source upload");
        Ok(())
    }
}
