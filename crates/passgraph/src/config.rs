//! Pipeline-wide configuration

/// Texture sampling filter modes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SamplerFilterMode {
    /// Nearest neighbor sampling - sharp, pixelated
    #[default]
    Nearest,
    /// Linear interpolation sampling - smooth, blurred
    Linear,
}

impl SamplerFilterMode {
    pub(crate) fn to_wgpu(self) -> wgpu::FilterMode {
        match self {
            SamplerFilterMode::Nearest => wgpu::FilterMode::Nearest,
            SamplerFilterMode::Linear => wgpu::FilterMode::Linear,
        }
    }
}

/// How the linker treats two sources or stages registered under the same name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DuplicatePolicy {
    /// Report a diagnostic and resolve the name to the last registration
    #[default]
    LastWins,
    /// Fail linking with [`PipelineError::DuplicateName`](crate::PipelineError::DuplicateName)
    Reject,
}

/// Settings shared by every stage of a pipeline
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    /// Format of the destination textures the final stage presents into
    pub display_format: wgpu::TextureFormat,
    /// Filter used by every stage sampler
    pub filter_mode: SamplerFilterMode,
    /// Tie-break for duplicate names
    pub duplicate_policy: DuplicatePolicy,
    /// Color every target is cleared to before a stage draws
    pub clear_color: wgpu::Color,
}

impl PipelineConfig {
    /// Creates a configuration presenting into `display_format`
    ///
    /// Stages sample with nearest filtering, duplicate names resolve to the last
    /// registration, and targets are cleared to transparent black.
    pub fn new(display_format: wgpu::TextureFormat) -> Self {
        Self {
            display_format,
            filter_mode: SamplerFilterMode::Nearest,
            duplicate_policy: DuplicatePolicy::LastWins,
            clear_color: wgpu::Color::TRANSPARENT,
        }
    }

    pub fn with_filter_mode(mut self, filter_mode: SamplerFilterMode) -> Self {
        self.filter_mode = filter_mode;
        self
    }

    pub fn with_duplicate_policy(mut self, duplicate_policy: DuplicatePolicy) -> Self {
        self.duplicate_policy = duplicate_policy;
        self
    }

    pub fn with_clear_color(mut self, clear_color: wgpu::Color) -> Self {
        self.clear_color = clear_color;
        self
    }
}
