//! The canonical full-screen quad every stage draws

use bytemuck::{Pod, Zeroable};
use wgpu::util::DeviceExt;

/// Vertex of the full-screen quad
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct QuadVertex {
    /// Clip-space position
    pub position: [f32; 2],
    /// Texture coordinate, (0, 0) at the top-left of the target
    pub tex_coord: [f32; 2],
}

pub const QUAD_VERTICES: [QuadVertex; 4] = [
    QuadVertex { position: [-1.0, 1.0], tex_coord: [0.0, 0.0] },  // top-left
    QuadVertex { position: [1.0, 1.0], tex_coord: [1.0, 0.0] },   // top-right
    QuadVertex { position: [1.0, -1.0], tex_coord: [1.0, 1.0] },  // bottom-right
    QuadVertex { position: [-1.0, -1.0], tex_coord: [0.0, 1.0] }, // bottom-left
];

pub const QUAD_INDICES: [u16; 6] = [0, 1, 2, 2, 3, 0];

/// Vertex and index buffers shared by all stages of a pipeline
#[derive(Debug)]
pub struct FullscreenQuad {
    vertex_buffer: wgpu::Buffer,
    index_buffer: wgpu::Buffer,
}

impl FullscreenQuad {
    pub fn new(device: &wgpu::Device) -> Self {
        let vertex_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Fullscreen Quad Vertices"),
            contents: bytemuck::cast_slice(&QUAD_VERTICES),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let index_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Fullscreen Quad Indices"),
            contents: bytemuck::cast_slice(&QUAD_INDICES),
            usage: wgpu::BufferUsages::INDEX,
        });

        Self { vertex_buffer, index_buffer }
    }

    /// Vertex attributes for the given shader locations
    ///
    /// Attributes the shader does not declare are left out.
    pub fn attributes(position_location: Option<u32>, tex_coord_location: Option<u32>) -> Vec<wgpu::VertexAttribute> {
        let mut attributes = Vec::with_capacity(2);
        if let Some(shader_location) = position_location {
            attributes.push(wgpu::VertexAttribute {
                format: wgpu::VertexFormat::Float32x2,
                offset: std::mem::offset_of!(QuadVertex, position) as wgpu::BufferAddress,
                shader_location,
            });
        }
        if let Some(shader_location) = tex_coord_location {
            attributes.push(wgpu::VertexAttribute {
                format: wgpu::VertexFormat::Float32x2,
                offset: std::mem::offset_of!(QuadVertex, tex_coord) as wgpu::BufferAddress,
                shader_location,
            });
        }
        attributes
    }

    /// Buffer layout for the quad's single vertex buffer
    pub fn layout(attributes: &[wgpu::VertexAttribute]) -> wgpu::VertexBufferLayout<'_> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<QuadVertex>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes,
        }
    }

    /// Binds the quad buffers and issues the single indexed draw
    pub fn draw(&self, render_pass: &mut wgpu::RenderPass<'_>) {
        render_pass.set_vertex_buffer(0, self.vertex_buffer.slice(..));
        render_pass.set_index_buffer(self.index_buffer.slice(..), wgpu::IndexFormat::Uint16);
        render_pass.draw_indexed(0..QUAD_INDICES.len() as u32, 0, 0..1);
    }
}
