//! Shader-driven processing stages
//!
//! A [`Stage`] owns a compiled shader program, a private render target of fixed size and the
//! list of named inputs its fragment shader declares. The linker fills in where each input
//! comes from; the executor resolves those references to texture views every frame and asks
//! the stage to draw the full-screen quad either into its private output or into the
//! destination target.

use crate::{
    config::PipelineConfig,
    error::{Diagnostic, PipelineError, with_error_scope},
    quad::FullscreenQuad,
    resource::{RESOURCE_FORMAT, Resource, ResourceId, ResourceRef},
    shader::{BindingKind, POSITION_ATTRIBUTE, ShaderProgram, ShaderSource, TEX_COORD_ATTRIBUTE},
};
use bytemuck::{Pod, Zeroable};

/// Parameters for creating a [`Stage`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageDescriptor {
    /// Name of the stage and of its output
    pub name: String,
    /// Width of the private output
    pub width: u32,
    /// Height of the private output
    pub height: u32,
    /// Vertex and fragment WGSL
    pub shader: ShaderSource,
}

impl StageDescriptor {
    pub fn new(name: impl Into<String>, width: u32, height: u32, shader: ShaderSource) -> Self {
        Self {
            name: name.into(),
            width,
            height,
            shader,
        }
    }
}

/// One declared input and the resource the linker attached to it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputBinding {
    /// Input name as declared in the fragment shader
    pub name: String,
    /// `@binding` slot the input is bound to
    pub slot: u32,
    /// Linked resource, or `None` when the input is unresolved
    pub target: Option<ResourceRef>,
}

/// An input resolved to a live texture for the current frame
#[derive(Debug, Clone)]
pub struct ResolvedInput {
    pub slot: u32,
    pub id: ResourceId,
    pub view: wgpu::TextureView,
}

/// Where a draw was rendered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrawTarget {
    /// The stage's own output resource
    Private,
    /// The caller-supplied destination
    Display,
}

/// A single draw issued by a stage
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DrawRecord {
    pub stage: String,
    pub target: DrawTarget,
    /// Viewport size of the draw
    pub width: u32,
    pub height: u32,
}

/// Contents of the `resolution` uniform
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct ResolutionUniform {
    resolution: [f32; 2],
    _padding: [f32; 2],
}

impl ResolutionUniform {
    fn new(width: u32, height: u32) -> Self {
        Self {
            resolution: [width as f32, height as f32],
            _padding: [0.0; 2],
        }
    }
}

/// A named processing step with a private output
#[derive(Debug)]
pub struct Stage {
    name: String,
    program: ShaderProgram,
    output: Resource,
    bind_group_layout: wgpu::BindGroupLayout,
    private_pipeline: wgpu::RenderPipeline,
    /// Present only when the display format differs from the private output format
    display_pipeline: Option<wgpu::RenderPipeline>,
    sampler: wgpu::Sampler,
    resolution_buffer: Option<wgpu::Buffer>,
    clear_color: wgpu::Color,
    bindings: Vec<InputBinding>,
    /// Bind group and the resource IDs it was built from, in binding order
    bind_group: Option<(Vec<ResourceId>, wgpu::BindGroup)>,
}

impl Stage {
    /// Compiles the stage's shader and allocates its private output
    ///
    /// Missing vertex attributes are tolerated: the attribute is left unfed and a
    /// [`Diagnostic::MissingVertexAttribute`] is returned alongside the stage.
    ///
    /// # Arguments
    /// * `device` - The wgpu device for resource creation
    /// * `descriptor` - Name, size and shader of the stage
    /// * `config` - Pipeline-wide formats, filtering and clear color
    pub fn new(device: &wgpu::Device, descriptor: &StageDescriptor, config: &PipelineConfig) -> Result<(Self, Vec<Diagnostic>), PipelineError> {
        let name = descriptor.name.as_str();
        let program = ShaderProgram::compile(name, &descriptor.shader)?;

        let mut diagnostics = Vec::new();
        let mut attribute_location = |attribute: &'static str| {
            let location = program.vertex_attribute_location(attribute);
            if location.is_none() {
                let diagnostic = Diagnostic::MissingVertexAttribute { stage: name.to_string(), attribute };
                tracing::warn!(stage = name, attribute, "{diagnostic}");
                diagnostics.push(diagnostic);
            }
            location
        };
        let position_location = attribute_location(POSITION_ATTRIBUTE);
        let tex_coord_location = attribute_location(TEX_COORD_ATTRIBUTE);

        let output = Resource::create(device, name, descriptor.width, descriptor.height, true)?;

        let mut layout_entries = program
            .bindings()
            .iter()
            .map(|binding| wgpu::BindGroupLayoutEntry {
                binding: binding.binding,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: match binding.kind {
                    BindingKind::SampledTexture => wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    BindingKind::Sampler => wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    BindingKind::Resolution => wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                },
                count: None,
            })
            .collect::<Vec<_>>();
        layout_entries.sort_by_key(|entry| entry.binding);

        let attributes = FullscreenQuad::attributes(position_location, tex_coord_location);

        let (bind_group_layout, private_pipeline, display_pipeline, sampler, resolution_buffer) = with_error_scope(
            device,
            || format!("creating GPU objects for stage '{name}'"),
            || {
                let (vertex_module, fragment_module) = program.create_modules(device, name);

                let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                    label: Some(name),
                    entries: &layout_entries,
                });
                let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                    label: Some(name),
                    bind_group_layouts: &[&bind_group_layout],
                    push_constant_ranges: &[],
                });

                let create_pipeline = |format: wgpu::TextureFormat| {
                    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                        label: Some(name),
                        layout: Some(&pipeline_layout),
                        vertex: wgpu::VertexState {
                            module: &vertex_module,
                            entry_point: Some(program.vertex_entry_point()),
                            compilation_options: Default::default(),
                            buffers: &[FullscreenQuad::layout(&attributes)],
                        },
                        primitive: wgpu::PrimitiveState::default(),
                        depth_stencil: None,
                        multisample: wgpu::MultisampleState::default(),
                        fragment: Some(wgpu::FragmentState {
                            module: &fragment_module,
                            entry_point: Some(program.fragment_entry_point()),
                            compilation_options: Default::default(),
                            targets: &[Some(wgpu::ColorTargetState {
                                format,
                                blend: None,
                                write_mask: wgpu::ColorWrites::ALL,
                            })],
                        }),
                        multiview: None,
                        cache: None,
                    })
                };

                let private_pipeline = create_pipeline(RESOURCE_FORMAT);
                let display_pipeline = (config.display_format != RESOURCE_FORMAT).then(|| create_pipeline(config.display_format));

                let filter = config.filter_mode.to_wgpu();
                let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
                    label: Some(name),
                    address_mode_u: wgpu::AddressMode::ClampToEdge,
                    address_mode_v: wgpu::AddressMode::ClampToEdge,
                    address_mode_w: wgpu::AddressMode::ClampToEdge,
                    mag_filter: filter,
                    min_filter: filter,
                    mipmap_filter: wgpu::FilterMode::Nearest,
                    lod_min_clamp: 0.0,
                    lod_max_clamp: 0.0,
                    compare: None,
                    anisotropy_clamp: 1,
                    border_color: None,
                });

                let resolution_buffer = program.bindings().iter().any(|b| b.kind == BindingKind::Resolution).then(|| {
                    device.create_buffer(&wgpu::BufferDescriptor {
                        label: Some(name),
                        size: std::mem::size_of::<ResolutionUniform>() as wgpu::BufferAddress,
                        usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
                        mapped_at_creation: false,
                    })
                });

                (bind_group_layout, private_pipeline, display_pipeline, sampler, resolution_buffer)
            },
        )?;

        let bindings = program
            .sampled_inputs()
            .map(|input| InputBinding {
                name: input.name.clone(),
                slot: input.binding,
                target: None,
            })
            .collect::<Vec<_>>();

        tracing::debug!(
            stage = name,
            width = descriptor.width,
            height = descriptor.height,
            inputs = ?bindings.iter().map(|b| b.name.as_str()).collect::<Vec<_>>(),
            "created stage"
        );

        let stage = Self {
            name: descriptor.name.clone(),
            program,
            output,
            bind_group_layout,
            private_pipeline,
            display_pipeline,
            sampler,
            resolution_buffer,
            clear_color: config.clear_color,
            bindings,
            bind_group: None,
        };
        Ok((stage, diagnostics))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn width(&self) -> u32 {
        self.output.width()
    }

    pub fn height(&self) -> u32 {
        self.output.height()
    }

    pub fn program(&self) -> &ShaderProgram {
        &self.program
    }

    /// The private output resource other stages may link against
    pub fn output(&self) -> &Resource {
        &self.output
    }

    /// Names of the sampled inputs the fragment shader declares, in reflection order
    pub fn declared_inputs(&self) -> impl Iterator<Item = &str> {
        self.bindings.iter().map(|b| b.name.as_str())
    }

    /// Current input bindings in declaration order
    pub fn bindings(&self) -> &[InputBinding] {
        &self.bindings
    }

    /// Attaches a linked resource to the input called `name`
    ///
    /// Returns `false` if the stage declares no such input.
    pub fn bind_input(&mut self, name: &str, target: ResourceRef) -> bool {
        let mut found = false;
        for binding in self.bindings.iter_mut().filter(|b| b.name == name) {
            binding.target = Some(target.clone());
            found = true;
        }
        if found {
            self.bind_group = None;
        }
        found
    }

    /// Detaches every input, leaving them all unresolved
    pub fn clear_bindings(&mut self) {
        for binding in &mut self.bindings {
            binding.target = None;
        }
        self.bind_group = None;
    }

    /// Resolves every binding to a live texture view
    ///
    /// # Arguments
    /// * `lookup` - Finds the resource a reference points at, if its owner still holds it
    /// * `fallback` - Texture bound to inputs the linker left unresolved
    ///
    /// # Returns
    /// The resolved inputs, or [`PipelineError::StaleBinding`] for the first reference whose
    /// resource no longer exists
    pub fn resolve_inputs<'a>(&self, lookup: impl Fn(&ResourceRef) -> Option<&'a Resource>, fallback: &Resource) -> Result<Vec<ResolvedInput>, PipelineError> {
        self.bindings
            .iter()
            .map(|binding| {
                let resource = match &binding.target {
                    None => fallback,
                    Some(target) => lookup(target).filter(|r| r.id() == target.id).ok_or_else(|| PipelineError::StaleBinding {
                        stage: self.name.clone(),
                        input: binding.name.clone(),
                    })?,
                };
                Ok(ResolvedInput {
                    slot: binding.slot,
                    id: resource.id(),
                    view: resource.as_texture().clone(),
                })
            })
            .collect()
    }

    /// Builds the bind group for the resolved inputs unless the cached one already matches
    pub fn prepare_inputs(&mut self, device: &wgpu::Device, inputs: &[ResolvedInput]) {
        let ids = inputs.iter().map(|input| input.id).collect::<Vec<_>>();
        if self.bind_group.as_ref().is_some_and(|(cached, _)| *cached == ids) {
            return;
        }

        let mut entries = Vec::with_capacity(self.program.bindings().len());
        for binding in self.program.bindings() {
            let resource = match binding.kind {
                BindingKind::SampledTexture => match inputs.iter().find(|input| input.slot == binding.binding) {
                    Some(input) => wgpu::BindingResource::TextureView(&input.view),
                    None => continue,
                },
                BindingKind::Sampler => wgpu::BindingResource::Sampler(&self.sampler),
                BindingKind::Resolution => match &self.resolution_buffer {
                    Some(buffer) => buffer.as_entire_binding(),
                    None => continue,
                },
            };
            entries.push(wgpu::BindGroupEntry {
                binding: binding.binding,
                resource,
            });
        }
        entries.sort_by_key(|entry| entry.binding);

        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(&self.name),
            layout: &self.bind_group_layout,
            entries: &entries,
        });
        tracing::trace!(stage = %self.name, "rebuilt bind group");
        self.bind_group = Some((ids, bind_group));
    }

    /// Renders the stage into its private output at its own size
    pub fn render_to_private_output(&self, queue: &wgpu::Queue, encoder: &mut wgpu::CommandEncoder, quad: &FullscreenQuad) -> Result<DrawRecord, PipelineError> {
        let (width, height) = (self.width(), self.height());
        self.write_resolution(queue, width, height);
        let target = self.output.as_render_target().ok_or_else(|| PipelineError::NotRenderTarget(self.name.clone()))?;
        self.draw(encoder, quad, &self.private_pipeline, target, width, height)?;

        Ok(DrawRecord {
            stage: self.name.clone(),
            target: DrawTarget::Private,
            width,
            height,
        })
    }

    /// Renders the stage into `destination` with a `display_width` x `display_height` viewport
    ///
    /// The display size is also written to the `resolution` uniform when the shader declares it.
    pub fn render_to_display(
        &self,
        queue: &wgpu::Queue,
        encoder: &mut wgpu::CommandEncoder,
        quad: &FullscreenQuad,
        destination: &wgpu::TextureView,
        display_width: u32,
        display_height: u32,
    ) -> Result<DrawRecord, PipelineError> {
        self.write_resolution(queue, display_width, display_height);
        let pipeline = self.display_pipeline.as_ref().unwrap_or(&self.private_pipeline);
        self.draw(encoder, quad, pipeline, destination, display_width, display_height)?;

        Ok(DrawRecord {
            stage: self.name.clone(),
            target: DrawTarget::Display,
            width: display_width,
            height: display_height,
        })
    }

    fn write_resolution(&self, queue: &wgpu::Queue, width: u32, height: u32) {
        if let Some(buffer) = &self.resolution_buffer {
            queue.write_buffer(buffer, 0, bytemuck::bytes_of(&ResolutionUniform::new(width, height)));
        }
    }

    fn draw(&self, encoder: &mut wgpu::CommandEncoder, quad: &FullscreenQuad, pipeline: &wgpu::RenderPipeline, target: &wgpu::TextureView, width: u32, height: u32) -> Result<(), PipelineError> {
        let (_, bind_group) = self.bind_group.as_ref().ok_or_else(|| PipelineError::InputsNotPrepared(self.name.clone()))?;

        let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some(&self.name),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: target,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(self.clear_color),
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
        });

        render_pass.set_pipeline(pipeline);
        render_pass.set_bind_group(0, bind_group, &[]);
        render_pass.set_viewport(0.0, 0.0, width as f32, height as f32, 0.0, 1.0);
        quad.draw(&mut render_pass);

        Ok(())
    }
}
