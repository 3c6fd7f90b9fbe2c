//! WGSL shader programs and their reflection
//!
//! A stage's program is a vertex/fragment pair. Both modules are parsed and validated with
//! naga before anything is created on the device, and the fragment module's group-0
//! bindings are reflected to discover which named inputs the stage consumes.

use crate::error::PipelineError;
use std::{borrow::Cow, path::Path};

/// Vertex stage used when a stage supplies only a fragment shader
pub const FULLSCREEN_VERTEX_SHADER: &str = include_str!("../shaders/fullscreen.wgsl");

/// Vertex input fed with the quad's clip-space position
pub const POSITION_ATTRIBUTE: &str = "position";
/// Vertex input fed with the quad's texture coordinate
pub const TEX_COORD_ATTRIBUTE: &str = "tex_coord";
/// Uniform that receives the size of the target being rendered
pub const RESOLUTION_UNIFORM: &str = "resolution";

/// Bind group every reflected binding must live in
const BIND_GROUP: u32 = 0;

/// WGSL sources for a stage's vertex and fragment modules
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShaderSource {
    pub vertex: Cow<'static, str>,
    pub fragment: Cow<'static, str>,
}

impl ShaderSource {
    pub fn new(vertex: impl Into<Cow<'static, str>>, fragment: impl Into<Cow<'static, str>>) -> Self {
        Self {
            vertex: vertex.into(),
            fragment: fragment.into(),
        }
    }

    /// Pairs a fragment shader with the built-in full-screen vertex shader
    pub fn fragment(fragment: impl Into<Cow<'static, str>>) -> Self {
        Self::new(FULLSCREEN_VERTEX_SHADER, fragment)
    }

    /// Loads shader sources from disk
    ///
    /// # Arguments
    /// * `vertex` - Vertex shader file, or `None` for the built-in full-screen shader
    /// * `fragment` - Fragment shader file
    pub fn from_files(vertex: Option<&Path>, fragment: &Path) -> Result<Self, PipelineError> {
        let read = |path: &Path| {
            std::fs::read_to_string(path).map_err(|source| PipelineError::Io {
                path: path.to_path_buf(),
                source,
            })
        };

        let vertex = match vertex {
            Some(path) => Cow::Owned(read(path)?),
            None => Cow::Borrowed(FULLSCREEN_VERTEX_SHADER),
        };
        Ok(Self {
            vertex,
            fragment: Cow::Owned(read(fragment)?),
        })
    }
}

/// Kind of resource a fragment binding expects
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingKind {
    /// A `texture_2d<f32>` input resolved by name
    SampledTexture,
    /// A filtering sampler
    Sampler,
    /// The `resolution` uniform
    Resolution,
}

/// A resource binding discovered in the fragment module
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReflectedBinding {
    /// Variable name in the shader
    pub name: String,
    /// `@binding` slot in group 0
    pub binding: u32,
    pub kind: BindingKind,
}

/// A validated vertex/fragment pair with its reflected interface
#[derive(Debug, Clone)]
pub struct ShaderProgram {
    source: ShaderSource,
    vertex_entry_point: String,
    fragment_entry_point: String,
    bindings: Vec<ReflectedBinding>,
    vertex_attributes: Vec<(String, u32)>,
}

impl ShaderProgram {
    /// Parses, validates and reflects a shader pair
    ///
    /// # Arguments
    /// * `stage` - Name of the owning stage, used in error messages
    /// * `source` - The WGSL sources
    pub fn compile(stage: &str, source: &ShaderSource) -> Result<Self, PipelineError> {
        let vertex_module = parse_and_validate(stage, &source.vertex)?;
        let fragment_module = parse_and_validate(stage, &source.fragment)?;

        let vertex_entry = vertex_module
            .entry_points
            .iter()
            .find(|ep| ep.stage == naga::ShaderStage::Vertex)
            .ok_or_else(|| PipelineError::MissingEntryPoint { stage: stage.to_string(), kind: "vertex" })?;
        let fragment_entry = fragment_module
            .entry_points
            .iter()
            .find(|ep| ep.stage == naga::ShaderStage::Fragment)
            .ok_or_else(|| PipelineError::MissingEntryPoint { stage: stage.to_string(), kind: "fragment" })?;

        // The quad pipeline has no way to feed vertex-stage resources
        if let Some((_, var)) = vertex_module.global_variables.iter().find(|(_, var)| var.binding.is_some()) {
            let binding = var.binding.as_ref().map_or((0, 0), |b| (b.group, b.binding));
            return Err(PipelineError::UnsupportedBinding {
                stage: stage.to_string(),
                name: var.name.clone().unwrap_or_default(),
                group: binding.0,
                binding: binding.1,
            });
        }

        let bindings = reflect_fragment_bindings(stage, &fragment_module)?;
        let vertex_attributes = reflect_vertex_attributes(&vertex_module, &vertex_entry.function);

        Ok(Self {
            vertex_entry_point: vertex_entry.name.clone(),
            fragment_entry_point: fragment_entry.name.clone(),
            source: source.clone(),
            bindings,
            vertex_attributes,
        })
    }

    /// All reflected group-0 fragment bindings in declaration order
    pub fn bindings(&self) -> &[ReflectedBinding] {
        &self.bindings
    }

    /// Sampled texture inputs in declaration order
    pub fn sampled_inputs(&self) -> impl Iterator<Item = &ReflectedBinding> {
        self.bindings.iter().filter(|b| b.kind == BindingKind::SampledTexture)
    }

    /// Binding slot of a uniform variable
    pub fn uniform_binding(&self, name: &str) -> Option<u32> {
        self.bindings.iter().find(|b| b.kind == BindingKind::Resolution && b.name == name).map(|b| b.binding)
    }

    /// `@location` of a vertex entry-point input
    pub fn vertex_attribute_location(&self, name: &str) -> Option<u32> {
        self.vertex_attributes.iter().find(|(attribute, _)| attribute == name).map(|(_, location)| *location)
    }

    pub fn vertex_entry_point(&self) -> &str {
        &self.vertex_entry_point
    }

    pub fn fragment_entry_point(&self) -> &str {
        &self.fragment_entry_point
    }

    /// Creates the device shader modules for this program
    pub(crate) fn create_modules(&self, device: &wgpu::Device, label: &str) -> (wgpu::ShaderModule, wgpu::ShaderModule) {
        let vertex = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(label),
            source: wgpu::ShaderSource::Wgsl(self.source.vertex.clone()),
        });
        let fragment = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(label),
            source: wgpu::ShaderSource::Wgsl(self.source.fragment.clone()),
        });
        (vertex, fragment)
    }
}

fn parse_and_validate(stage: &str, source: &str) -> Result<naga::Module, PipelineError> {
    let module = naga::front::wgsl::parse_str(source).map_err(|e| PipelineError::Shader {
        stage: stage.to_string(),
        message: e.emit_to_string(source),
    })?;

    let mut validator = naga::valid::Validator::new(naga::valid::ValidationFlags::all(), naga::valid::Capabilities::all());
    validator.validate(&module).map_err(|e| PipelineError::Shader {
        stage: stage.to_string(),
        message: e.to_string(),
    })?;

    Ok(module)
}

fn reflect_fragment_bindings(stage: &str, module: &naga::Module) -> Result<Vec<ReflectedBinding>, PipelineError> {
    let mut bindings = Vec::new();

    for (_, var) in module.global_variables.iter() {
        let Some(resource_binding) = &var.binding else {
            continue;
        };
        let name = var.name.clone().unwrap_or_default();
        let unsupported = || PipelineError::UnsupportedBinding {
            stage: stage.to_string(),
            name: name.clone(),
            group: resource_binding.group,
            binding: resource_binding.binding,
        };

        if resource_binding.group != BIND_GROUP {
            return Err(unsupported());
        }

        let kind = match &module.types[var.ty].inner {
            naga::TypeInner::Image {
                dim: naga::ImageDimension::D2,
                arrayed: false,
                class: naga::ImageClass::Sampled { kind: naga::ScalarKind::Float, multi: false },
            } => BindingKind::SampledTexture,
            naga::TypeInner::Sampler { comparison: false } => BindingKind::Sampler,
            naga::TypeInner::Vector {
                size: naga::VectorSize::Bi,
                scalar: naga::Scalar::F32,
            } if var.space == naga::AddressSpace::Uniform && name == RESOLUTION_UNIFORM => BindingKind::Resolution,
            _ => return Err(unsupported()),
        };

        bindings.push(ReflectedBinding {
            name,
            binding: resource_binding.binding,
            kind,
        });
    }

    Ok(bindings)
}

fn reflect_vertex_attributes(module: &naga::Module, function: &naga::Function) -> Vec<(String, u32)> {
    let mut attributes = Vec::new();

    for argument in &function.arguments {
        match (&argument.binding, &argument.name) {
            (Some(naga::Binding::Location { location, .. }), Some(name)) => attributes.push((name.clone(), *location)),
            (None, _) => {
                // Inputs grouped into a struct carry their locations on the members
                if let naga::TypeInner::Struct { members, .. } = &module.types[argument.ty].inner {
                    for member in members {
                        if let (Some(naga::Binding::Location { location, .. }), Some(name)) = (&member.binding, &member.name) {
                            attributes.push((name.clone(), *location));
                        }
                    }
                }
            }
            _ => {}
        }
    }

    attributes
}
