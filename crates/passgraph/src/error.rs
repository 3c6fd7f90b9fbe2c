//! Error and diagnostic types
//!
//! Hard failures are reported as [`PipelineError`] and leave the affected object unusable.
//! Configuration problems that the pipeline can survive are collected as [`Diagnostic`]s
//! and logged where they are produced.

use crate::resource::ResourceOwner;

/// Errors that stop a pipeline operation
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// A pipeline was configured or executed without any stage
    #[error("pipeline has no stages")]
    EmptyPipeline,

    /// A resource or display size is zero or exceeds the device limit
    #[error("invalid dimensions {width}x{height} for '{name}' (limit {limit})")]
    InvalidDimensions { name: String, width: u32, height: u32, limit: u32 },

    /// A pixel upload did not match the resource size exactly
    #[error("data for '{name}' is {actual} bytes, expected {expected}")]
    DataSize { name: String, expected: usize, actual: usize },

    /// No source with this name is configured
    #[error("unknown source '{0}'")]
    UnknownSource(String),

    /// Two sources or stages share a name under [`DuplicatePolicy::Reject`](crate::DuplicatePolicy::Reject)
    #[error("name '{0}' is registered more than once")]
    DuplicateName(String),

    /// The resolved bindings contain a dependency cycle
    #[error("dependency cycle between stages {stages:?}")]
    Cycle { stages: Vec<String> },

    /// WGSL parsing or validation failed
    #[error("shader for stage '{stage}' failed to compile: {message}")]
    Shader { stage: String, message: String },

    /// A shader module has no entry point of the required kind
    #[error("shader for stage '{stage}' has no {kind} entry point")]
    MissingEntryPoint { stage: String, kind: &'static str },

    /// A shader declares a resource binding the stage cannot provide
    #[error("stage '{stage}' declares unsupported binding '{name}' at group {group} binding {binding}")]
    UnsupportedBinding { stage: String, name: String, group: u32, binding: u32 },

    /// A shader file could not be read
    #[error("failed to read shader file {path}: {source}")]
    Io {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The device reported a validation or allocation error
    #[error("device error while {context}: {message}")]
    Device { context: String, message: String },

    /// A binding refers to a resource whose owner was removed or replaced since linking
    #[error("input '{input}' of stage '{stage}' refers to a resource that no longer exists; relink the pipeline")]
    StaleBinding { stage: String, input: String },

    /// A stage was rendered before its inputs were prepared
    #[error("inputs of stage '{0}' have not been prepared for rendering")]
    InputsNotPrepared(String),

    /// A resource created without render-target usage was drawn into
    #[error("resource '{0}' is not a render target")]
    NotRenderTarget(String),

    /// The destination texture cannot receive the presented image
    #[error("invalid destination: {0}")]
    Destination(String),

    /// A texture lacks a usage the requested operation needs
    #[error("texture is missing usage {0:?}")]
    MissingUsage(wgpu::TextureUsages),

    /// A texture cannot be read back
    #[error("readback failed: {0}")]
    Readback(String),

    /// A texture format not supported by the requested operation
    #[error("unsupported texture format {0:?}")]
    UnsupportedFormat(wgpu::TextureFormat),
}

/// Configuration problems that leave the pipeline running in a degraded state
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Diagnostic {
    /// A later registration replaced an earlier one with the same name
    #[error("'{name}' is registered by both {previous} and {replacement}; {replacement} is used")]
    DuplicateName { name: String, previous: ResourceOwner, replacement: ResourceOwner },

    /// A declared input matched no source or stage output and was bound to the fallback texture
    #[error("input '{input}' of stage '{stage}' matches no source or stage output")]
    UnresolvedInput { stage: String, input: String },

    /// A vertex attribute the full-screen quad feeds is absent from the shader
    #[error("stage '{stage}' has no vertex attribute '{attribute}'")]
    MissingVertexAttribute { stage: String, attribute: &'static str },

    /// A stage consumes the output of a stage listed after it and was moved later in the execution order
    #[error("stage '{stage}' reads '{input}' produced by later stage '{producer}'; execution order adjusted")]
    ForwardReference { stage: String, input: String, producer: String },
}

/// Runs `create` inside validation and out-of-memory error scopes
///
/// wgpu reports creation failures asynchronously through the device; the scopes turn them
/// into a [`PipelineError::Device`] for the object being created instead of the default
/// uncaptured-error handler.
pub(crate) fn with_error_scope<T>(device: &wgpu::Device, context: impl FnOnce() -> String, create: impl FnOnce() -> T) -> Result<T, PipelineError> {
    device.push_error_scope(wgpu::ErrorFilter::Validation);
    device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);

    let value = create();

    let out_of_memory = pollster::block_on(device.pop_error_scope());
    let validation = pollster::block_on(device.pop_error_scope());

    match out_of_memory.or(validation) {
        Some(error) => Err(PipelineError::Device {
            context: context(),
            message: error.to_string(),
        }),
        None => Ok(value),
    }
}
