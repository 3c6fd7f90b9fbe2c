//! Name-linked render-pass graphs on wgpu
//!
//! A pipeline is built from host-fed [`Source`]s and shader-driven [`Stage`]s. Each stage
//! declares its inputs by name in its WGSL fragment shader; the [`linker`] resolves those
//! names against the sources and the other stages' outputs and derives an execution order.
//! Every frame, [`PipelineExecutor`] renders each stage into its private output and presents
//! the last stage into a caller-supplied texture.
//!
//! ```no_run
//! # fn run(device: &wgpu::Device, queue: &wgpu::Queue, target: &wgpu::Texture, pixels: &[u8]) -> Result<(), passgraph::PipelineError> {
//! use passgraph::{PipelineConfig, PipelineExecutor, SourceDescriptor, presets};
//!
//! let mut pipeline = PipelineExecutor::new(device, queue, PipelineConfig::new(target.format()))?;
//! pipeline.configure(
//!     vec![SourceDescriptor::new("diffuse", 2, 2)],
//!     vec![presets::blur_x("blurred", 2, 2, "diffuse"), presets::glow("glow", 2, 2, "blurred")],
//! )?;
//! pipeline.set_source_data("diffuse", pixels)?;
//! pipeline.render_frame(target, target.width(), target.height())?;
//! # Ok(())
//! # }
//! ```

mod config;
mod error;
mod pipeline_executor;
mod quad;
mod resource;
mod source;
mod stage;

pub mod linker;
pub mod presets;
pub mod readback;
pub mod shader;

pub use config::{DuplicatePolicy, PipelineConfig, SamplerFilterMode};
pub use error::{Diagnostic, PipelineError};
pub use linker::LinkReport;
pub use pipeline_executor::{FrameSummary, PipelineExecutor};
pub use quad::{FullscreenQuad, QUAD_INDICES, QUAD_VERTICES, QuadVertex};
pub use resource::{BYTES_PER_PIXEL, RESOURCE_FORMAT, Resource, ResourceId, ResourceOwner, ResourceRef, data_len};
pub use shader::ShaderSource;
pub use source::{Source, SourceDescriptor};
pub use stage::{DrawRecord, DrawTarget, InputBinding, ResolvedInput, Stage, StageDescriptor};
