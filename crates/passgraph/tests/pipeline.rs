mod common;

use common::{BLUE, RED, TestDevice, any_gpu, checker, executor, gpu, pixel, solid, target, target_with};
use passgraph::{
    Diagnostic, DrawTarget, DuplicatePolicy, PipelineConfig, PipelineError, PipelineExecutor, Resource, ShaderSource, SourceDescriptor, Stage, StageDescriptor, presets,
    readback,
};

const FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

/// Writes the `resolution` uniform into the red and green channels
const RESOLUTION_AS_COLOR: &str = r#"
@group(0) @binding(0) var<uniform> resolution: vec2<f32>;

@fragment
fn fs_main(@location(0) tex_coord: vec2<f32>) -> @location(0) vec4<f32> {
    return vec4<f32>(resolution / 255.0, 0.0, 1.0);
}
"#;

/// Feeds only the position attribute
const POSITION_ONLY_VERTEX: &str = r#"
@vertex
fn vs_main(@location(0) position: vec2<f32>) -> @builtin(position) vec4<f32> {
    return vec4<f32>(position, 0.0, 1.0);
}
"#;

const SOLID_WHITE: &str = "@fragment fn fs_main() -> @location(0) vec4<f32> { return vec4<f32>(1.0); }";

fn blur_glow_pipeline(device: &wgpu::Device, queue: &wgpu::Queue) -> PipelineExecutor {
    let mut pipeline = executor(device, queue);
    pipeline
        .configure(
            vec![SourceDescriptor::new("diffuse", 2, 2)],
            vec![
                presets::blur_x("blur_x", 2, 2, "diffuse"),
                presets::blur_y("blur_y", 2, 2, "blur_x"),
                presets::glow("glow", 2, 2, "blur_y"),
            ],
        )
        .unwrap();
    pipeline
}

fn assert_upscaled_checker(data: &[u8]) {
    for y in 0..4 {
        for x in 0..4 {
            let expected = if (x < 2) == (y < 2) { BLUE } else { RED };
            assert_eq!(pixel(data, 4, x, y), expected, "pixel ({x}, {y})");
        }
    }
}

#[test]
fn test_single_stage_upscales_to_display() {
    let Some((device, queue)) = gpu() else { return };
    let mut pipeline = executor(&device, &queue);

    let report = pipeline
        .configure(vec![SourceDescriptor::new("diffuse", 2, 2)], vec![presets::passthrough("out", 2, 2, "diffuse")])
        .unwrap();
    assert!(report.is_clean());
    assert_eq!(report.presented_stage(), Some("out"));

    pipeline.set_source_data("diffuse", &checker()).unwrap();
    let destination = target(&device, FORMAT, 4, 4);
    let summary = pipeline.render_frame(&destination, 4, 4).unwrap();

    assert_eq!(summary.draws.len(), 1);
    assert_eq!(summary.private_draws(), 0);
    let presented = summary.presented().unwrap();
    assert_eq!((presented.stage.as_str(), presented.width, presented.height), ("out", 4, 4));

    assert_upscaled_checker(&readback::read_rgba8(&device, &queue, &destination).unwrap());
}

#[test]
fn test_chain_reads_private_outputs() {
    let Some((device, queue)) = gpu() else { return };
    let mut pipeline = executor(&device, &queue);

    pipeline
        .configure(
            vec![SourceDescriptor::new("diffuse", 2, 2)],
            vec![presets::passthrough("copy", 2, 2, "diffuse"), presets::passthrough("out", 2, 2, "copy")],
        )
        .unwrap();
    pipeline.set_source_data("diffuse", &checker()).unwrap();

    let destination = target(&device, FORMAT, 4, 4);
    pipeline.render_frame(&destination, 4, 4).unwrap();

    assert_upscaled_checker(&readback::read_rgba8(&device, &queue, &destination).unwrap());
    let copy = readback::read_rgba8(&device, &queue, pipeline.stage("copy").unwrap().output().texture()).unwrap();
    assert_eq!(copy, checker());
}

#[test]
fn test_blur_glow_chain_draw_targets() {
    let TestDevice { device, queue, hardware } = any_gpu();
    let mut pipeline = executor(&device, &queue);

    let report = pipeline
        .configure(
            vec![SourceDescriptor::new("diffuse", 2, 2)],
            vec![
                presets::blur_x("blur_x", 2, 2, "diffuse"),
                presets::blur_y("blur_y", 2, 2, "blur_x"),
                presets::glow("glow", 2, 2, "blur_y"),
            ],
        )
        .unwrap();
    assert_eq!(report.execution_order, ["blur_x", "blur_y", "glow"]);

    let color = [40, 100, 20, 255];
    pipeline.set_source_data("diffuse", &solid(2, 2, color)).unwrap();
    let destination = target(&device, FORMAT, 6, 6);
    let summary = pipeline.render_frame(&destination, 6, 6).unwrap();

    let targets = summary.draws.iter().map(|d| (d.stage.as_str(), d.target, d.width)).collect::<Vec<_>>();
    assert_eq!(targets, [("blur_x", DrawTarget::Private, 2), ("blur_y", DrawTarget::Private, 2), ("glow", DrawTarget::Display, 6)]);

    // A uniform image below the glow threshold comes through unchanged
    if hardware {
        let output = readback::read_rgba8(&device, &queue, &destination).unwrap();
        for (actual, expected) in output.chunks(4).flat_map(|p| p.iter().zip(color.iter())) {
            assert!(actual.abs_diff(*expected) <= 1, "{actual} vs {expected}");
        }
    }
}

#[test]
fn test_one_draw_per_stage() {
    let TestDevice { device, queue, .. } = any_gpu();
    let mut pipeline = executor(&device, &queue);

    let mut stages = vec![presets::passthrough("stage0", 2, 2, "diffuse")];
    for i in 1..5 {
        stages.push(presets::passthrough(format!("stage{i}"), 2, 2, &format!("stage{}", i - 1)));
    }
    pipeline.configure(vec![SourceDescriptor::new("diffuse", 2, 2)], stages).unwrap();

    let destination = target(&device, FORMAT, 2, 2);
    let summary = pipeline.render_frame(&destination, 2, 2).unwrap();
    assert_eq!(summary.draws.len(), 5);
    assert_eq!(summary.private_draws(), 4);
    assert_eq!(summary.presented().unwrap().stage, "stage4");
}

#[test]
fn test_unresolved_input_still_renders() {
    let TestDevice { device, queue, hardware } = any_gpu();
    let mut pipeline = executor(&device, &queue);

    let report = pipeline
        .configure(vec![SourceDescriptor::new("diffuse", 2, 2)], vec![presets::passthrough("out", 2, 2, "missing")])
        .unwrap();
    assert_eq!(report.unresolved_inputs().collect::<Vec<_>>(), [("out", "missing")]);

    let destination = target(&device, FORMAT, 2, 2);
    let summary = pipeline.render_frame(&destination, 2, 2).unwrap();
    assert_eq!(summary.draws.len(), 1);

    if hardware {
        let output = readback::read_rgba8(&device, &queue, &destination).unwrap();
        assert!(output.iter().all(|&b| b == 0));
    }
}

#[test]
fn test_uploaded_data_is_visible_in_next_frame() {
    let Some((device, queue)) = gpu() else { return };
    let mut pipeline = executor(&device, &queue);
    pipeline
        .configure(vec![SourceDescriptor::new("diffuse", 2, 2)], vec![presets::passthrough("out", 2, 2, "diffuse")])
        .unwrap();
    let destination = target(&device, FORMAT, 2, 2);

    pipeline.set_source_data("diffuse", &solid(2, 2, RED)).unwrap();
    pipeline.render_frame(&destination, 2, 2).unwrap();
    assert_eq!(readback::read_rgba8(&device, &queue, &destination).unwrap(), solid(2, 2, RED));

    pipeline.set_source_data("diffuse", &solid(2, 2, BLUE)).unwrap();
    pipeline.render_frame(&destination, 2, 2).unwrap();
    assert_eq!(readback::read_rgba8(&device, &queue, &destination).unwrap(), solid(2, 2, BLUE));
}

#[test]
fn test_resolution_uniform_matches_draw_size() {
    let Some((device, queue)) = gpu() else { return };
    let mut pipeline = executor(&device, &queue);
    pipeline
        .configure(
            Vec::new(),
            vec![
                StageDescriptor::new("measure", 3, 5, ShaderSource::fragment(RESOLUTION_AS_COLOR)),
                presets::passthrough("show", 2, 2, "measure"),
            ],
        )
        .unwrap();

    let destination = target(&device, FORMAT, 4, 4);
    pipeline.render_frame(&destination, 4, 4).unwrap();
    let measured = readback::read_rgba8(&device, &queue, pipeline.stage("measure").unwrap().output().texture()).unwrap();
    assert_eq!(pixel(&measured, 3, 1, 1), [3, 5, 0, 255]);

    // Presented directly, the stage sees the display size
    pipeline
        .configure(Vec::new(), vec![StageDescriptor::new("measure", 3, 5, ShaderSource::fragment(RESOLUTION_AS_COLOR))])
        .unwrap();
    pipeline.render_frame(&destination, 4, 4).unwrap();
    let output = readback::read_rgba8(&device, &queue, &destination).unwrap();
    assert_eq!(pixel(&output, 4, 2, 2), [4, 4, 0, 255]);
}

#[test]
fn test_forward_reference_is_reordered() {
    let TestDevice { device, queue, hardware } = any_gpu();
    let mut pipeline = executor(&device, &queue);

    let report = pipeline
        .configure(
            vec![SourceDescriptor::new("diffuse", 2, 2)],
            vec![presets::passthrough("out", 2, 2, "copy"), presets::passthrough("copy", 2, 2, "diffuse")],
        )
        .unwrap();
    assert!(matches!(&report.diagnostics[..], [Diagnostic::ForwardReference { stage, producer, .. }] if stage == "out" && producer == "copy"));
    assert_eq!(pipeline.execution_order().collect::<Vec<_>>(), ["copy", "out"]);

    pipeline.set_source_data("diffuse", &checker()).unwrap();
    let destination = target(&device, FORMAT, 4, 4);
    pipeline.render_frame(&destination, 4, 4).unwrap();
    if hardware {
        assert_upscaled_checker(&readback::read_rgba8(&device, &queue, &destination).unwrap());
    }
}

#[test]
fn test_failed_configure_keeps_previous_pipeline() {
    let TestDevice { device, queue, .. } = any_gpu();
    let mut pipeline = executor(&device, &queue);
    pipeline
        .configure(vec![SourceDescriptor::new("diffuse", 2, 2)], vec![presets::passthrough("out", 2, 2, "diffuse")])
        .unwrap();

    let err = pipeline
        .configure(Vec::new(), vec![presets::passthrough("a", 2, 2, "b"), presets::passthrough("b", 2, 2, "a")])
        .unwrap_err();
    assert!(matches!(err, PipelineError::Cycle { ref stages } if stages == &["a", "b"]));

    let err = pipeline
        .configure(Vec::new(), vec![StageDescriptor::new("broken", 2, 2, ShaderSource::fragment("@fragment fn fs_main( {"))])
        .unwrap_err();
    assert!(matches!(err, PipelineError::Shader { .. }));

    assert_eq!(pipeline.execution_order().collect::<Vec<_>>(), ["out"]);
    assert!(pipeline.source("diffuse").is_some());
}

#[test]
fn test_duplicate_names() {
    let TestDevice { device, queue, hardware } = any_gpu();
    let sources = || vec![SourceDescriptor::new("diffuse", 2, 2), SourceDescriptor::new("diffuse", 2, 2)];
    let stages = || vec![presets::passthrough("out", 2, 2, "diffuse")];

    let mut pipeline = executor(&device, &queue);
    let report = pipeline.configure(sources(), stages()).unwrap();
    assert!(matches!(&report.diagnostics[..], [Diagnostic::DuplicateName { name, .. }] if name == "diffuse"));

    // Data goes to the registration the stage was linked against
    pipeline.set_source_data("diffuse", &solid(2, 2, RED)).unwrap();
    let destination = target(&device, FORMAT, 2, 2);
    pipeline.render_frame(&destination, 2, 2).unwrap();
    if hardware {
        assert_eq!(readback::read_rgba8(&device, &queue, &destination).unwrap(), solid(2, 2, RED));
    }

    let config = PipelineConfig::new(FORMAT).with_duplicate_policy(DuplicatePolicy::Reject);
    let mut strict = PipelineExecutor::new(&device, &queue, config).unwrap();
    let err = strict.configure(sources(), stages()).unwrap_err();
    assert!(matches!(err, PipelineError::DuplicateName(ref name) if name == "diffuse"));
}

#[test]
fn test_precondition_errors() {
    let TestDevice { device, queue, .. } = any_gpu();
    let mut pipeline = executor(&device, &queue);
    let destination = target(&device, FORMAT, 2, 2);

    assert!(matches!(pipeline.render_frame(&destination, 2, 2), Err(PipelineError::EmptyPipeline)));
    assert!(matches!(pipeline.configure(vec![SourceDescriptor::new("diffuse", 2, 2)], Vec::new()), Err(PipelineError::EmptyPipeline)));
    assert!(matches!(
        pipeline.configure(Vec::new(), vec![presets::passthrough("out", 0, 2, "diffuse")]),
        Err(PipelineError::InvalidDimensions { width: 0, .. })
    ));

    pipeline
        .configure(vec![SourceDescriptor::new("diffuse", 2, 2)], vec![presets::passthrough("out", 2, 2, "diffuse")])
        .unwrap();

    let err = pipeline.set_source_data("diffuse", &[0; 3]).unwrap_err();
    assert!(matches!(err, PipelineError::DataSize { expected: 16, actual: 3, .. }));
    assert!(matches!(pipeline.set_source_data("nothing", &checker()), Err(PipelineError::UnknownSource(_))));

    assert!(matches!(pipeline.render_frame(&destination, 4, 4), Err(PipelineError::Destination(_))));
    assert!(matches!(pipeline.render_frame(&destination, 0, 2), Err(PipelineError::InvalidDimensions { .. })));
    let wrong_format = target(&device, wgpu::TextureFormat::Bgra8Unorm, 2, 2);
    assert!(matches!(pipeline.render_frame(&wrong_format, 2, 2), Err(PipelineError::Destination(_))));
}

#[test]
fn test_replaced_source_requires_relink() {
    let TestDevice { device, queue, hardware } = any_gpu();
    let mut pipeline = executor(&device, &queue);
    pipeline
        .configure(vec![SourceDescriptor::new("diffuse", 2, 2)], vec![presets::passthrough("out", 4, 4, "diffuse")])
        .unwrap();
    let destination = target(&device, FORMAT, 4, 4);

    pipeline.replace_source(SourceDescriptor::new("diffuse", 4, 4)).unwrap();
    let err = pipeline.render_frame(&destination, 4, 4).unwrap_err();
    assert!(matches!(err, PipelineError::StaleBinding { ref stage, ref input } if stage == "out" && input == "diffuse"));

    assert!(pipeline.relink().unwrap().is_clean());
    pipeline.set_source_data("diffuse", &solid(4, 4, BLUE)).unwrap();
    pipeline.render_frame(&destination, 4, 4).unwrap();
    if hardware {
        assert_eq!(readback::read_rgba8(&device, &queue, &destination).unwrap(), solid(4, 4, BLUE));
    }

    pipeline.remove_source("diffuse").unwrap();
    assert!(matches!(pipeline.render_frame(&destination, 4, 4), Err(PipelineError::StaleBinding { .. })));
    let report = pipeline.relink().unwrap();
    assert_eq!(report.unresolved_inputs().collect::<Vec<_>>(), [("out", "diffuse")]);
    pipeline.render_frame(&destination, 4, 4).unwrap();
}

#[test]
fn test_srgb_display_and_native_size() {
    let TestDevice { device, queue, hardware } = any_gpu();
    let format = wgpu::TextureFormat::Rgba8UnormSrgb;
    let mut pipeline = PipelineExecutor::new(&device, &queue, PipelineConfig::new(format)).unwrap();
    pipeline
        .configure(vec![SourceDescriptor::new("diffuse", 2, 2)], vec![presets::passthrough("out", 2, 2, "diffuse")])
        .unwrap();
    pipeline.set_source_data("diffuse", &checker()).unwrap();

    let destination = target(&device, format, 4, 4);
    let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor::default());
    let summary = pipeline.execute_native(&mut encoder, &destination).unwrap();
    queue.submit(std::iter::once(encoder.finish()));

    assert_eq!(summary.presented().map(|d| (d.width, d.height)), Some((4, 4)));
    // Fully saturated channels survive the sRGB encode
    if hardware {
        assert_upscaled_checker(&readback::read_rgba8(&device, &queue, &destination).unwrap());
    }
}

#[test]
fn test_presents_into_first_mip_and_layer() {
    let TestDevice { device, queue, hardware } = any_gpu();
    let mut pipeline = blur_glow_pipeline(&device, &queue);

    let mipmapped = target_with(&device, FORMAT, 4, 4, 1, 2, 1);
    let summary = pipeline.render_frame(&mipmapped, 4, 4).unwrap();
    assert_eq!(summary.draws.len(), 3);
    assert_eq!(summary.presented().map(|d| d.stage.as_str()), Some("glow"));

    let layered = target_with(&device, FORMAT, 4, 4, 2, 1, 1);
    pipeline.render_frame(&layered, 4, 4).unwrap();

    if hardware {
        pipeline.set_source_data("diffuse", &solid(2, 2, [40, 100, 20, 255])).unwrap();
        pipeline.render_frame(&mipmapped, 4, 4).unwrap();
        let output = readback::read_rgba8(&device, &queue, &mipmapped).unwrap();
        assert_eq!(output.len(), 4 * 4 * 4);
    }
}

#[test]
fn test_rejects_multisampled_destination() {
    let TestDevice { device, queue, .. } = any_gpu();
    let mut pipeline = blur_glow_pipeline(&device, &queue);

    let multisampled = target_with(&device, FORMAT, 4, 4, 1, 1, 4);
    let err = pipeline.render_frame(&multisampled, 4, 4).unwrap_err();
    assert!(matches!(err, PipelineError::Destination(ref message) if message.contains("samples")));

    // The pipeline stays usable after the rejected frame
    let destination = target(&device, FORMAT, 4, 4);
    assert_eq!(pipeline.render_frame(&destination, 4, 4).unwrap().draws.len(), 3);
}

#[test]
fn test_missing_tex_coord_attribute_is_diagnosed() {
    let TestDevice { device, queue, .. } = any_gpu();
    let descriptor = StageDescriptor::new("solid", 2, 2, ShaderSource::new(POSITION_ONLY_VERTEX, SOLID_WHITE));

    let (stage, diagnostics) = Stage::new(&device, &descriptor, &PipelineConfig::new(FORMAT)).unwrap();
    assert_eq!(stage.declared_inputs().count(), 0);
    assert_eq!(
        diagnostics,
        [Diagnostic::MissingVertexAttribute {
            stage: "solid".to_string(),
            attribute: "tex_coord",
        }]
    );

    // The stage still renders
    let mut pipeline = executor(&device, &queue);
    let report = pipeline.configure(Vec::new(), vec![descriptor]).unwrap();
    assert!(matches!(&report.diagnostics[..], [Diagnostic::MissingVertexAttribute { attribute: "tex_coord", .. }]));
    let destination = target(&device, FORMAT, 2, 2);
    assert_eq!(pipeline.render_frame(&destination, 2, 2).unwrap().draws.len(), 1);
}

#[test]
fn test_only_stage_outputs_are_render_targets() {
    let TestDevice { device, .. } = any_gpu();

    let source = Resource::create(&device, "diffuse", 2, 2, false).unwrap();
    assert!(source.as_render_target().is_none());

    let output = Resource::create(&device, "blur_x", 2, 2, true).unwrap();
    assert!(output.as_render_target().is_some());
}

#[test]
fn test_readback_requires_copy_src() {
    let TestDevice { device, queue, .. } = any_gpu();
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("Render Only"),
        size: wgpu::Extent3d {
            width: 2,
            height: 2,
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: FORMAT,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
        view_formats: &[],
    });

    let err = readback::read_rgba8(&device, &queue, &texture).unwrap_err();
    assert!(matches!(err, PipelineError::MissingUsage(usage) if usage == wgpu::TextureUsages::COPY_SRC));
}
