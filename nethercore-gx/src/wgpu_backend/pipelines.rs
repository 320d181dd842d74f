//! Bind group layouts and render pipeline creation
//!
//! Group 0 holds the frame uniforms and the back-facing mask, group 1 the
//! per-draw polygon record (dynamic offset) and group 2 the polygon texture.
//! Full-screen programs use group 1 for the attachments they read.

use crate::graphics::{
    Attachment, ColorMask, CompareFunction, DrawState, GeometryFlags, Primitive,
    StencilOperation, StencilState,
};
use crate::shader_gen::FullscreenShader;

use super::attachments::{ATTACHMENTS, COLOR_FORMAT, DEPTH_COPY_FORMAT, DEPTH_STENCIL_FORMAT};
use super::uniforms::{GpuVertex, PolygonUniformData};

// =============================================================================
// Pipeline keys
// =============================================================================

/// Everything a render pipeline is specialized on.
///
/// Draw states are reduced with `DrawState::pipeline_key`, the stencil
/// reference being dynamic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipelineKey {
    Geometry {
        flags: GeometryFlags,
        primitive: Primitive,
        state: DrawState,
    },
    Fullscreen {
        shader: FullscreenShader,
        state: DrawState,
        target: Option<Attachment>,
    },
}

impl PipelineKey {
    pub fn geometry(flags: GeometryFlags, primitive: Primitive, state: &DrawState) -> Self {
        PipelineKey::Geometry {
            flags,
            primitive,
            state: state.pipeline_key(),
        }
    }

    pub fn fullscreen(
        shader: FullscreenShader,
        state: &DrawState,
        target: Option<Attachment>,
    ) -> Self {
        PipelineKey::Fullscreen {
            shader,
            state: state.pipeline_key(),
            target,
        }
    }
}

/// Color attachments a full-screen pass renders into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FullscreenTargets {
    None,
    One(Attachment),
    /// All four G-buffer attachments in output order
    GBuffer,
    DepthCopy,
}

impl FullscreenTargets {
    pub fn new(shader: FullscreenShader, target: Option<Attachment>) -> Self {
        match shader {
            FullscreenShader::ClearImage => FullscreenTargets::GBuffer,
            FullscreenShader::DepthResolve { .. } => FullscreenTargets::DepthCopy,
            FullscreenShader::StencilFill => FullscreenTargets::None,
            _ => target.map_or(FullscreenTargets::None, FullscreenTargets::One),
        }
    }
}

/// Whether a full-screen pass needs the depth/stencil attachment.
pub fn fullscreen_uses_depth_stencil(shader: FullscreenShader, state: &DrawState) -> bool {
    match shader {
        FullscreenShader::ClearImage | FullscreenShader::StencilFill => true,
        FullscreenShader::DepthResolve { .. } => false,
        _ => state.stencil_test || state.depth_test,
    }
}

/// Attachments sampled by a full-screen program, in binding order.
///
/// `DepthCopy` stands for the float depth copy; the clear image and depth
/// resolve inputs are bound separately.
pub fn fullscreen_inputs(shader: FullscreenShader) -> &'static [FullscreenInput] {
    match shader {
        FullscreenShader::ZeroAlphaMask => &[FullscreenInput::Attachment(Attachment::Color)],
        FullscreenShader::EdgeMark => &[
            FullscreenInput::Attachment(Attachment::PolygonId),
            FullscreenInput::DepthCopy,
        ],
        FullscreenShader::Fog(_) => &[
            FullscreenInput::Attachment(Attachment::Color),
            FullscreenInput::Attachment(Attachment::FogAttributes),
            FullscreenInput::DepthCopy,
        ],
        FullscreenShader::ClearImage => {
            &[FullscreenInput::ClearColor, FullscreenInput::ClearAttributes]
        }
        FullscreenShader::DepthResolve { .. } => &[FullscreenInput::Depth],
        FullscreenShader::StencilFill => &[],
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FullscreenInput {
    Attachment(Attachment),
    DepthCopy,
    ClearColor,
    ClearAttributes,
    Depth,
}

// =============================================================================
// Fixed-function state
// =============================================================================

/// Source-alpha blending on color; alpha keeps the larger of both values.
pub fn blend_state() -> wgpu::BlendState {
    wgpu::BlendState {
        color: wgpu::BlendComponent {
            src_factor: wgpu::BlendFactor::SrcAlpha,
            dst_factor: wgpu::BlendFactor::OneMinusSrcAlpha,
            operation: wgpu::BlendOperation::Add,
        },
        alpha: wgpu::BlendComponent {
            src_factor: wgpu::BlendFactor::One,
            dst_factor: wgpu::BlendFactor::One,
            operation: wgpu::BlendOperation::Max,
        },
    }
}

/// Write mask of each G-buffer attachment for a geometry draw.
///
/// Identity, fog attributes and the back-facing mask are only written by
/// variants that produce them.
pub fn geometry_write_masks(flags: GeometryFlags, state: &DrawState) -> [wgpu::ColorWrites; 4] {
    let mask = state.color_mask.to_wgpu();
    ATTACHMENTS.map(|attachment| {
        let written = match attachment {
            Attachment::Color => true,
            Attachment::PolygonId => flags.contains(GeometryFlags::EDGE_MARK),
            Attachment::FogAttributes => flags.contains(GeometryFlags::FOG),
            Attachment::Working => flags.contains(GeometryFlags::OPAQUE_DRAW),
        };
        if written { mask } else { wgpu::ColorWrites::empty() }
    })
}

fn color_target(
    format: wgpu::TextureFormat,
    state: &DrawState,
    write_mask: wgpu::ColorWrites,
) -> Option<wgpu::ColorTargetState> {
    Some(wgpu::ColorTargetState {
        format,
        blend: state.blend.then(blend_state),
        write_mask,
    })
}

/// Image clear: depth and the full stencil byte are replaced unconditionally.
pub fn clear_image_state() -> DrawState {
    DrawState {
        depth_test: true,
        depth_compare: CompareFunction::Always,
        depth_write: true,
        stencil_test: true,
        stencil: StencilState::new(CompareFunction::Always, 0, 0xFF).with_ops(
            StencilOperation::Replace,
            StencilOperation::Replace,
            StencilOperation::Replace,
        ),
        color_mask: ColorMask::All,
        blend: false,
    }
}

/// Masked stencil clear drawn as a full-screen triangle.
pub fn stencil_fill_state(value: u8, write_mask: u8) -> DrawState {
    DrawState {
        depth_test: false,
        depth_compare: CompareFunction::Always,
        depth_write: false,
        stencil_test: true,
        stencil: StencilState::new(CompareFunction::Always, value, 0xFF)
            .with_ops(
                StencilOperation::Keep,
                StencilOperation::Keep,
                StencilOperation::Replace,
            )
            .with_write_mask(write_mask),
        color_mask: ColorMask::None,
        blend: false,
    }
}

// =============================================================================
// Layouts
// =============================================================================

fn input_texture_entry(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::FRAGMENT,
        ty: wgpu::BindingType::Texture {
            sample_type: wgpu::TextureSampleType::Float { filterable: false },
            view_dimension: wgpu::TextureViewDimension::D2,
            multisampled: false,
        },
        count: None,
    }
}

/// Bind group layouts shared by every pipeline.
pub struct Layouts {
    pub frame: wgpu::BindGroupLayout,
    pub polygon: wgpu::BindGroupLayout,
    pub texture: wgpu::BindGroupLayout,
    /// Full-screen inputs by binding count (1 to 3)
    inputs: [wgpu::BindGroupLayout; 3],
    depth: wgpu::BindGroupLayout,
    depth_multisampled: wgpu::BindGroupLayout,
}

impl Layouts {
    pub fn new(device: &wgpu::Device) -> Self {
        let frame = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("GX Frame Bind Group Layout"),
            entries: &[
                // Binding 0: frame uniforms (tables, clear values, size)
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: wgpu::BufferSize::new(
                            std::mem::size_of::<super::uniforms::FrameUniforms>() as u64,
                        ),
                    },
                    count: None,
                },
                // Binding 1: back-facing mask
                input_texture_entry(1),
            ],
        });

        let polygon = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("GX Polygon Bind Group Layout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: true,
                    min_binding_size: wgpu::BufferSize::new(
                        std::mem::size_of::<PolygonUniformData>() as u64,
                    ),
                },
                count: None,
            }],
        });

        let texture = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("GX Texture Bind Group Layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });

        let inputs = [1u32, 2, 3].map(|count| {
            let entries: Vec<_> = (0..count).map(input_texture_entry).collect();
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some(&format!("GX Fullscreen Inputs Layout ({})", count)),
                entries: &entries,
            })
        });

        let depth_layout = |multisampled: bool| {
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("GX Depth Input Layout"),
                entries: &[wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Depth,
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled,
                    },
                    count: None,
                }],
            })
        };

        Self {
            frame,
            polygon,
            texture,
            inputs,
            depth: depth_layout(false),
            depth_multisampled: depth_layout(true),
        }
    }

    /// Input layout (group 1) of a full-screen program, if it reads anything.
    pub fn fullscreen_inputs(&self, shader: FullscreenShader) -> Option<&wgpu::BindGroupLayout> {
        match shader {
            FullscreenShader::DepthResolve { multisampled: true } => Some(&self.depth_multisampled),
            FullscreenShader::DepthResolve { multisampled: false } => Some(&self.depth),
            _ => match fullscreen_inputs(shader).len() {
                0 => None,
                count => self.inputs.get(count - 1),
            },
        }
    }
}

// =============================================================================
// Pipeline creation
// =============================================================================

fn multisample_state(count: u32) -> wgpu::MultisampleState {
    wgpu::MultisampleState {
        count,
        mask: !0,
        alpha_to_coverage_enabled: false,
    }
}

/// Create the pipeline for one geometry variant and draw state.
pub fn create_geometry_pipeline(
    device: &wgpu::Device,
    layouts: &Layouts,
    shader_module: &wgpu::ShaderModule,
    key: &PipelineKey,
    sample_count: u32,
) -> Option<wgpu::RenderPipeline> {
    let PipelineKey::Geometry {
        flags,
        primitive,
        state,
    } = *key
    else {
        return None;
    };

    let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some("GX Geometry Pipeline Layout"),
        bind_group_layouts: &[&layouts.frame, &layouts.polygon, &layouts.texture],
        push_constant_ranges: &[],
    });

    let targets =
        geometry_write_masks(flags, &state).map(|mask| color_target(COLOR_FORMAT, &state, mask));
    let topology = match primitive {
        Primitive::Triangles => wgpu::PrimitiveTopology::TriangleList,
        Primitive::Lines => wgpu::PrimitiveTopology::LineList,
    };

    let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some(&format!("GX {} {:?}", flags.label(), primitive)),
        layout: Some(&pipeline_layout),
        vertex: wgpu::VertexState {
            module: shader_module,
            entry_point: Some("vs"),
            buffers: &[GpuVertex::layout()],
            compilation_options: Default::default(),
        },
        fragment: Some(wgpu::FragmentState {
            module: shader_module,
            entry_point: Some("fs"),
            targets: &targets,
            compilation_options: Default::default(),
        }),
        primitive: wgpu::PrimitiveState {
            topology,
            strip_index_format: None,
            front_face: wgpu::FrontFace::Ccw,
            cull_mode: None, // Facing is resolved before polygons reach the rasterizer
            unclipped_depth: false,
            polygon_mode: wgpu::PolygonMode::Fill,
            conservative: false,
        },
        depth_stencil: Some(state.to_wgpu_depth_stencil(DEPTH_STENCIL_FORMAT)),
        multisample: multisample_state(sample_count),
        multiview: None,
        cache: None,
    });

    Some(pipeline)
}

/// Create the pipeline for a full-screen pass.
pub fn create_fullscreen_pipeline(
    device: &wgpu::Device,
    layouts: &Layouts,
    shader_module: &wgpu::ShaderModule,
    key: &PipelineKey,
    sample_count: u32,
) -> Option<wgpu::RenderPipeline> {
    let PipelineKey::Fullscreen {
        shader,
        state,
        target,
    } = *key
    else {
        return None;
    };

    let mut bind_group_layouts = vec![&layouts.frame];
    bind_group_layouts.extend(layouts.fullscreen_inputs(shader));
    let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some("GX Fullscreen Pipeline Layout"),
        bind_group_layouts: &bind_group_layouts,
        push_constant_ranges: &[],
    });

    let mask = state.color_mask.to_wgpu();
    let (targets, sample_count): (Vec<_>, u32) = match FullscreenTargets::new(shader, target) {
        FullscreenTargets::None => (Vec::new(), sample_count),
        FullscreenTargets::One(_) => (vec![color_target(COLOR_FORMAT, &state, mask)], sample_count),
        FullscreenTargets::GBuffer => (
            ATTACHMENTS
                .iter()
                .map(|_| color_target(COLOR_FORMAT, &state, mask))
                .collect(),
            sample_count,
        ),
        FullscreenTargets::DepthCopy => (
            vec![color_target(DEPTH_COPY_FORMAT, &state, wgpu::ColorWrites::ALL)],
            1,
        ),
    };

    let depth_stencil = fullscreen_uses_depth_stencil(shader, &state)
        .then(|| state.to_wgpu_depth_stencil(DEPTH_STENCIL_FORMAT));

    let fragment = shader.has_fragment().then(|| wgpu::FragmentState {
        module: shader_module,
        entry_point: Some("fs"),
        targets: &targets,
        compilation_options: Default::default(),
    });

    let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some(&format!("GX {}", shader.label())),
        layout: Some(&pipeline_layout),
        vertex: wgpu::VertexState {
            module: shader_module,
            entry_point: Some("vs"),
            buffers: &[],
            compilation_options: Default::default(),
        },
        fragment,
        primitive: wgpu::PrimitiveState {
            topology: wgpu::PrimitiveTopology::TriangleList,
            strip_index_format: None,
            front_face: wgpu::FrontFace::Ccw,
            cull_mode: None,
            unclipped_depth: false,
            polygon_mode: wgpu::PolygonMode::Fill,
            conservative: false,
        },
        depth_stencil,
        multisample: multisample_state(sample_count),
        multiview: None,
        cache: None,
    });

    Some(pipeline)
}

#[cfg(test)]
mod tests {
    use super::*;
    use gx_common::FogProgramKey;

    #[test]
    fn test_pipeline_key_ignores_stencil_reference() {
        let mut a = DrawState::default();
        a.stencil.reference = 3;
        let mut b = a;
        b.stencil.reference = 42;
        assert_eq!(
            PipelineKey::geometry(GeometryFlags::FOG, Primitive::Triangles, &a),
            PipelineKey::geometry(GeometryFlags::FOG, Primitive::Triangles, &b)
        );
        assert_ne!(
            PipelineKey::geometry(GeometryFlags::FOG, Primitive::Triangles, &a),
            PipelineKey::geometry(GeometryFlags::FOG, Primitive::Lines, &a)
        );
    }

    #[test]
    fn test_geometry_write_masks_follow_variant() {
        let state = DrawState::default();
        let masks = geometry_write_masks(GeometryFlags::EDGE_MARK, &state);
        assert_eq!(masks[0], wgpu::ColorWrites::ALL);
        assert_eq!(masks[1], wgpu::ColorWrites::ALL);
        assert!(masks[2].is_empty());
        assert!(masks[3].is_empty());

        let masked = DrawState {
            color_mask: ColorMask::None,
            ..state
        };
        let masks = geometry_write_masks(GeometryFlags::ALL, &masked);
        assert!(masks.iter().all(|mask| mask.is_empty()));
    }

    #[test]
    fn test_blend_alpha_keeps_maximum() {
        let blend = blend_state();
        assert_eq!(blend.alpha.operation, wgpu::BlendOperation::Max);
        assert_eq!(blend.color.src_factor, wgpu::BlendFactor::SrcAlpha);
        assert_eq!(blend.color.dst_factor, wgpu::BlendFactor::OneMinusSrcAlpha);
    }

    #[test]
    fn test_fullscreen_targets() {
        assert_eq!(
            FullscreenTargets::new(FullscreenShader::ClearImage, None),
            FullscreenTargets::GBuffer
        );
        assert_eq!(
            FullscreenTargets::new(FullscreenShader::ZeroAlphaMask, None),
            FullscreenTargets::None
        );
        assert_eq!(
            FullscreenTargets::new(
                FullscreenShader::Fog(FogProgramKey::new(0, 0)),
                Some(Attachment::Working)
            ),
            FullscreenTargets::One(Attachment::Working)
        );
        assert_eq!(
            FullscreenTargets::new(FullscreenShader::DepthResolve { multisampled: true }, None),
            FullscreenTargets::DepthCopy
        );
    }

    #[test]
    fn test_fullscreen_depth_stencil_attachment() {
        let plain = DrawState::fullscreen();
        assert!(!fullscreen_uses_depth_stencil(FullscreenShader::EdgeMark, &plain));
        let stenciled = DrawState {
            stencil_test: true,
            ..plain
        };
        assert!(fullscreen_uses_depth_stencil(FullscreenShader::EdgeMark, &stenciled));
        assert!(fullscreen_uses_depth_stencil(FullscreenShader::StencilFill, &plain));
        assert!(!fullscreen_uses_depth_stencil(
            FullscreenShader::DepthResolve { multisampled: false },
            &stenciled
        ));
    }

    #[test]
    fn test_fullscreen_inputs_never_include_targets() {
        let fog = FullscreenShader::Fog(FogProgramKey::new(0x200, 1));
        for input in fullscreen_inputs(fog) {
            assert_ne!(*input, FullscreenInput::Attachment(Attachment::Working));
        }
        for input in fullscreen_inputs(FullscreenShader::EdgeMark) {
            assert_ne!(*input, FullscreenInput::Attachment(Attachment::Color));
        }
        assert!(fullscreen_inputs(FullscreenShader::StencilFill).is_empty());
    }

    #[test]
    fn test_stencil_fill_state() {
        let state = stencil_fill_state(0x40, 0xC0);
        assert_eq!(state.stencil.reference, 0x40);
        assert_eq!(state.stencil.write_mask, 0xC0);
        assert_eq!(state.stencil.apply(0x3F, crate::graphics::StencilOutcome::Pass), 0x7F);
        assert!(!state.writes_depth());
        assert!(clear_image_state().writes_depth());
    }
}
