//! Built-in stage presets
//!
//! Each preset is a fragment shader template whose input variables are named by the caller,
//! so the resulting stage links against whichever source or stage output the caller picks.

use crate::{shader::ShaderSource, stage::StageDescriptor};
use std::borrow::Cow;

const PASSTHROUGH_TEMPLATE: &str = include_str!("../shaders/passthrough.wgsl");
const BLUR_TEMPLATE: &str = include_str!("../shaders/blur.wgsl");
const GLOW_TEMPLATE: &str = include_str!("../shaders/glow.wgsl");
const ADDITIVE_TEMPLATE: &str = include_str!("../shaders/additive.wgsl");

/// Single-input stage presets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StagePreset {
    /// Copies the input unchanged
    Passthrough,
    /// Horizontal Gaussian blur
    BlurX,
    /// Vertical Gaussian blur
    BlurY,
    /// Brightens the input and adds a halo around bright regions
    Glow,
}

impl StagePreset {
    /// Returns the human-readable name of this preset
    pub fn name(&self) -> &'static str {
        match self {
            StagePreset::Passthrough => "passthrough",
            StagePreset::BlurX => "blur_x",
            StagePreset::BlurY => "blur_y",
            StagePreset::Glow => "glow",
        }
    }

    /// Fragment shader reading the input called `input`
    pub fn fragment_shader(&self, input: &str) -> String {
        let template = match self {
            StagePreset::Passthrough => Cow::Borrowed(PASSTHROUGH_TEMPLATE),
            StagePreset::BlurX => Cow::Owned(BLUR_TEMPLATE.replace("{{axis}}", "vec2<f32>(1.0, 0.0)")),
            StagePreset::BlurY => Cow::Owned(BLUR_TEMPLATE.replace("{{axis}}", "vec2<f32>(0.0, 1.0)")),
            StagePreset::Glow => Cow::Borrowed(GLOW_TEMPLATE),
        };
        template.replace("{{input}}", input)
    }

    /// Builds a stage descriptor for this preset
    ///
    /// # Arguments
    /// * `name` - Name of the stage and its output
    /// * `width`, `height` - Size of the private output
    /// * `input` - Name of the source or stage output to read
    pub fn stage(&self, name: impl Into<String>, width: u32, height: u32, input: &str) -> StageDescriptor {
        StageDescriptor::new(name, width, height, ShaderSource::fragment(self.fragment_shader(input)))
    }
}

/// A stage that copies `input`
pub fn passthrough(name: impl Into<String>, width: u32, height: u32, input: &str) -> StageDescriptor {
    StagePreset::Passthrough.stage(name, width, height, input)
}

/// A stage that blurs `input` horizontally
pub fn blur_x(name: impl Into<String>, width: u32, height: u32, input: &str) -> StageDescriptor {
    StagePreset::BlurX.stage(name, width, height, input)
}

/// A stage that blurs `input` vertically
pub fn blur_y(name: impl Into<String>, width: u32, height: u32, input: &str) -> StageDescriptor {
    StagePreset::BlurY.stage(name, width, height, input)
}

/// A stage that adds a halo to `input`, scaled by the `resolution` uniform
pub fn glow(name: impl Into<String>, width: u32, height: u32, input: &str) -> StageDescriptor {
    StagePreset::Glow.stage(name, width, height, input)
}

/// A stage that sums two inputs, saturating at 1.0
///
/// `base` is bound before `overlay`; the two names must differ.
pub fn additive(name: impl Into<String>, width: u32, height: u32, base: &str, overlay: &str) -> StageDescriptor {
    let fragment = ADDITIVE_TEMPLATE.replace("{{base}}", base).replace("{{overlay}}", overlay);
    StageDescriptor::new(name, width, height, ShaderSource::fragment(fragment))
}
