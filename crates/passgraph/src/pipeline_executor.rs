//! Pipeline configuration and per-frame execution
//!
//! [`PipelineExecutor`] owns the sources and stages of one pipeline configuration. Every
//! frame it re-resolves the linked references, renders each stage except the last into its
//! private output, and renders the last stage into the caller's destination texture.

use crate::{
    config::PipelineConfig,
    error::PipelineError,
    linker::{self, LinkReport},
    quad::FullscreenQuad,
    resource::{Resource, ResourceOwner, check_dimensions},
    source::{Source, SourceDescriptor},
    stage::{DrawRecord, DrawTarget, Stage, StageDescriptor},
};

/// Every draw issued while executing one frame
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FrameSummary {
    /// Draws in execution order; the last one targets the destination
    pub draws: Vec<DrawRecord>,
}

impl FrameSummary {
    /// Number of draws rendered into private stage outputs
    pub fn private_draws(&self) -> usize {
        self.draws.iter().filter(|draw| draw.target == DrawTarget::Private).count()
    }

    /// The draw rendered into the destination
    pub fn presented(&self) -> Option<&DrawRecord> {
        self.draws.iter().find(|draw| draw.target == DrawTarget::Display)
    }
}

/// A configured render-pass graph, ready for execution
#[derive(Debug)]
pub struct PipelineExecutor {
    device: wgpu::Device,
    queue: wgpu::Queue,
    config: PipelineConfig,
    quad: FullscreenQuad,
    /// Bound to inputs the linker could not resolve
    fallback: Resource,
    sources: Vec<Source>,
    stages: Vec<Stage>,
    /// Execution order as indices into `stages`
    order: Vec<usize>,
}

impl PipelineExecutor {
    /// Creates an empty pipeline on the given device
    ///
    /// # Arguments
    /// * `device` - The wgpu device all resources are created on
    /// * `queue` - Queue used for uploads, uniform writes and [`PipelineExecutor::render_frame`]
    /// * `config` - Display format and pipeline-wide settings
    pub fn new(device: &wgpu::Device, queue: &wgpu::Queue, config: PipelineConfig) -> Result<Self, PipelineError> {
        let quad = FullscreenQuad::new(device);
        // Textures are zero-initialized, so this samples as transparent black
        let fallback = Resource::create(device, "Unbound Input", 1, 1, false)?;

        Ok(Self {
            device: device.clone(),
            queue: queue.clone(),
            config,
            quad,
            fallback,
            sources: Vec::new(),
            stages: Vec::new(),
            order: Vec::new(),
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Replaces the whole configuration and links it
    ///
    /// All sources and stages are created before anything is replaced; if any creation or the
    /// link fails, the previous configuration stays active.
    ///
    /// # Arguments
    /// * `sources` - Host-fed inputs
    /// * `stages` - Processing stages; the supplied order breaks ties in the execution order
    ///
    /// # Returns
    /// The link report, including diagnostics from stage creation
    pub fn configure(&mut self, sources: Vec<SourceDescriptor>, stages: Vec<StageDescriptor>) -> Result<LinkReport, PipelineError> {
        if stages.is_empty() {
            return Err(PipelineError::EmptyPipeline);
        }

        let sources = sources.iter().map(|descriptor| Source::new(&self.device, descriptor)).collect::<Result<Vec<_>, _>>()?;

        let mut creation_diagnostics = Vec::new();
        let mut built_stages = Vec::with_capacity(stages.len());
        for descriptor in &stages {
            let (stage, diagnostics) = Stage::new(&self.device, descriptor, &self.config)?;
            creation_diagnostics.extend(diagnostics);
            built_stages.push(stage);
        }

        let mut report = linker::link(&sources, &mut built_stages, self.config.duplicate_policy)?;
        report.diagnostics.splice(0..0, creation_diagnostics);

        self.sources = sources;
        self.stages = built_stages;
        self.order = report.order.clone();

        Ok(report)
    }

    /// Re-runs the linker over the current sources and stages
    ///
    /// Needed after [`PipelineExecutor::replace_source`] or [`PipelineExecutor::remove_source`]
    /// to clear stale references.
    pub fn relink(&mut self) -> Result<LinkReport, PipelineError> {
        if self.stages.is_empty() {
            return Err(PipelineError::EmptyPipeline);
        }
        let report = linker::link(&self.sources, &mut self.stages, self.config.duplicate_policy)?;
        self.order = report.order.clone();
        Ok(report)
    }

    pub fn sources(&self) -> &[Source] {
        &self.sources
    }

    pub fn source(&self, name: &str) -> Option<&Source> {
        self.sources.iter().rev().find(|source| source.name() == name)
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    pub fn stage(&self, name: &str) -> Option<&Stage> {
        self.stages.iter().rev().find(|stage| stage.name() == name)
    }

    /// Stage names in execution order
    pub fn execution_order(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(|&index| self.stages[index].name())
    }

    /// Uploads a full frame of RGBA8 pixels into the named source
    ///
    /// With duplicate source names, the last registered source receives the data, matching
    /// what the linker resolves the name to.
    pub fn set_source_data(&self, name: &str, data: &[u8]) -> Result<(), PipelineError> {
        self.source(name)
            .ok_or_else(|| PipelineError::UnknownSource(name.to_string()))?
            .set_data(&self.queue, data)
    }

    /// Replaces a source with a newly allocated one, possibly of a different size
    ///
    /// References linked against the old resource become stale; execution fails with
    /// [`PipelineError::StaleBinding`] until [`PipelineExecutor::relink`] is called.
    pub fn replace_source(&mut self, descriptor: SourceDescriptor) -> Result<(), PipelineError> {
        let index = self
            .sources
            .iter()
            .rposition(|source| source.name() == descriptor.name)
            .ok_or_else(|| PipelineError::UnknownSource(descriptor.name.clone()))?;
        self.sources[index] = Source::new(&self.device, &descriptor)?;
        tracing::info!(source = %descriptor.name, "replaced source; relink required");
        Ok(())
    }

    /// Destroys a source
    ///
    /// Stages that read it keep a stale reference until the pipeline is relinked.
    pub fn remove_source(&mut self, name: &str) -> Result<(), PipelineError> {
        let index = self
            .sources
            .iter()
            .rposition(|source| source.name() == name)
            .ok_or_else(|| PipelineError::UnknownSource(name.to_string()))?;
        self.sources.remove(index);
        tracing::info!(source = name, "removed source; relink required");
        Ok(())
    }

    /// Records one frame into `encoder`
    ///
    /// Every stage except the last in execution order renders into its private output; the
    /// last renders into `destination` with a `display_width` x `display_height` viewport.
    /// Uniform writes are queued on the pipeline's queue, so submit the encoder before
    /// executing the next frame.
    ///
    /// # Arguments
    /// * `encoder` - The command encoder to record render passes into
    /// * `destination` - Single-sample 2D texture the final stage presents into; must use the
    ///   configured display format and be at least the display size. Only mip level 0 of
    ///   array layer 0 is written.
    /// * `display_width`, `display_height` - Viewport and `resolution` of the final draw
    pub fn execute(&mut self, encoder: &mut wgpu::CommandEncoder, destination: &wgpu::Texture, display_width: u32, display_height: u32) -> Result<FrameSummary, PipelineError> {
        if self.order.is_empty() {
            return Err(PipelineError::EmptyPipeline);
        }
        self.check_destination(destination, display_width, display_height)?;
        self.prepare_stages()?;

        let (&last, rest) = self.order.split_last().ok_or(PipelineError::EmptyPipeline)?;

        let mut summary = FrameSummary::default();
        for &index in rest {
            let draw = self.stages[index].render_to_private_output(&self.queue, encoder, &self.quad)?;
            tracing::trace!(stage = %draw.stage, width = draw.width, height = draw.height, "rendered private output");
            summary.draws.push(draw);
        }

        // A single-mip 2D view of layer 0, whatever the destination's mip or layer count
        let view = destination.create_view(&wgpu::TextureViewDescriptor {
            label: Some("Pipeline Destination"),
            dimension: Some(wgpu::TextureViewDimension::D2),
            base_mip_level: 0,
            mip_level_count: Some(1),
            base_array_layer: 0,
            array_layer_count: Some(1),
            ..Default::default()
        });
        let draw = self.stages[last].render_to_display(&self.queue, encoder, &self.quad, &view, display_width, display_height)?;
        tracing::trace!(stage = %draw.stage, width = display_width, height = display_height, "presented");
        summary.draws.push(draw);

        Ok(summary)
    }

    /// Records one frame at the destination texture's full size
    pub fn execute_native(&mut self, encoder: &mut wgpu::CommandEncoder, destination: &wgpu::Texture) -> Result<FrameSummary, PipelineError> {
        self.execute(encoder, destination, destination.width(), destination.height())
    }

    /// Records one frame and submits it on the pipeline's queue
    pub fn render_frame(&mut self, destination: &wgpu::Texture, display_width: u32, display_height: u32) -> Result<FrameSummary, PipelineError> {
        let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some("Pipeline Frame") });
        let summary = self.execute(&mut encoder, destination, display_width, display_height)?;
        self.queue.submit(std::iter::once(encoder.finish()));
        Ok(summary)
    }

    fn check_destination(&self, destination: &wgpu::Texture, display_width: u32, display_height: u32) -> Result<(), PipelineError> {
        check_dimensions("display", display_width, display_height, self.device.limits().max_texture_dimension_2d)?;

        if destination.format() != self.config.display_format {
            return Err(PipelineError::Destination(format!(
                "format {:?} does not match the configured display format {:?}",
                destination.format(),
                self.config.display_format
            )));
        }
        if !destination.usage().contains(wgpu::TextureUsages::RENDER_ATTACHMENT) {
            return Err(PipelineError::Destination("texture is not usable as a render attachment".to_string()));
        }
        if destination.dimension() != wgpu::TextureDimension::D2 {
            return Err(PipelineError::Destination(format!("{:?} texture cannot be presented into; expected D2", destination.dimension())));
        }
        if destination.sample_count() != 1 {
            return Err(PipelineError::Destination(format!("multisampled texture ({} samples) cannot be presented into", destination.sample_count())));
        }
        if display_width > destination.width() || display_height > destination.height() {
            return Err(PipelineError::Destination(format!(
                "display size {display_width}x{display_height} exceeds the {}x{} destination",
                destination.width(),
                destination.height()
            )));
        }
        Ok(())
    }

    /// Resolves every stage's references and refreshes bind groups that changed
    fn prepare_stages(&mut self) -> Result<(), PipelineError> {
        for index in 0..self.stages.len() {
            let (sources, stages) = (&self.sources, &self.stages);
            let inputs = stages[index].resolve_inputs(
                |target| match &target.owner {
                    ResourceOwner::Source(name) => sources.iter().find(|s| s.name() == name && s.resource().id() == target.id).map(Source::resource),
                    ResourceOwner::Stage(name) => stages.iter().find(|s| s.name() == name && s.output().id() == target.id).map(Stage::output),
                },
                &self.fallback,
            )?;
            self.stages[index].prepare_inputs(&self.device, &inputs);
        }
        Ok(())
    }
}
