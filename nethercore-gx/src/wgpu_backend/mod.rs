//! wgpu rasterizer
//!
//! Commands are recorded as they arrive and encoded in one go at
//! `end_frame`:
//! 1. **Prepare**: build missing shader modules and pipelines, lay out the
//!    polygon uniform records and create the bind groups each pass needs
//! 2. **Encode**: consecutive draws share one render pass over the whole
//!    G-buffer; every full-screen call, clear and copy gets its own
//! 3. **Readback**: the output attachment is copied to a staging buffer and
//!    mapped asynchronously until `read_pixels`
//!
//! Attachments use a top-left origin. Every pass resolves multisampled
//! attachments, so the explicit resolve commands only have to copy the
//! back-facing mask and the depth.

mod attachments;
mod device;
mod pipelines;
mod readback;
mod textures;
mod uniforms;

pub use attachments::{COLOR_FORMAT, DEPTH_COPY_FORMAT, DEPTH_STENCIL_FORMAT};
pub use device::GpuContext;

use bytemuck::Zeroable;
use hashbrown::HashMap;
use wgpu::util::DeviceExt;

use crate::capabilities::DeviceCapabilities;
use crate::error::{GxError, GxResult};
use crate::graphics::{
    Attachment, ClearSource, ClearTargets, DrawCall, FogProgramCache, FrameGeometry, FrameState,
    FramebufferDesc, FramebufferOrigin, FullscreenCall, FullscreenProgram, GeometryFlags,
    GxCommand, IndexRange, ProgramSettings, Rasterizer, VariantCache,
};
use crate::shader_gen::{FullscreenShader, generate_fullscreen_shader, generate_geometry_shader};

use self::attachments::{Attachments, clear_colors};
use self::pipelines::{
    FullscreenInput, FullscreenTargets, Layouts, PipelineKey, clear_image_state,
    create_fullscreen_pipeline, create_geometry_pipeline, fullscreen_inputs,
    fullscreen_uses_depth_stencil, stencil_fill_state,
};
use self::readback::PendingReadback;
use self::textures::{ClearImageTextures, TextureCache};
use self::uniforms::{
    FrameUniforms, GpuVertex, POLYGON_UNIFORM_STRIDE, PolygonUniformData, scissor_rect,
};

// =============================================================================
// Prepared passes
// =============================================================================

struct DrawStep {
    key: PipelineKey,
    reference: u8,
    scissor: [u32; 4],
    range: IndexRange,
    polygon_offset: u32,
    texture: wgpu::BindGroup,
}

struct FullscreenStep {
    key: PipelineKey,
    label: String,
    targets: FullscreenTargets,
    depth_stencil: bool,
    reference: u8,
    inputs: Option<wgpu::BindGroup>,
}

enum Pass {
    Clear {
        colors: [wgpu::Color; 4],
        depth: f32,
        stencil: u8,
    },
    Geometry(Vec<DrawStep>),
    Fullscreen(FullscreenStep),
    CopyBackFacing,
}

impl From<FullscreenProgram> for FullscreenShader {
    fn from(program: FullscreenProgram) -> Self {
        match program {
            FullscreenProgram::ZeroAlphaMask => FullscreenShader::ZeroAlphaMask,
            FullscreenProgram::EdgeMark => FullscreenShader::EdgeMark,
            FullscreenProgram::Fog(key) => FullscreenShader::Fog(key),
        }
    }
}

/// Polygon uniform records laid out at `POLYGON_UNIFORM_STRIDE`.
fn polygon_records(records: &[PolygonUniformData]) -> Vec<u8> {
    let stride = POLYGON_UNIFORM_STRIDE as usize;
    let mut bytes = vec![0u8; stride * records.len().max(1)];
    for (record, chunk) in records.iter().zip(bytes.chunks_exact_mut(stride)) {
        let data = bytemuck::bytes_of(record);
        chunk[..data.len()].copy_from_slice(data);
    }
    bytes
}

fn compile_error(label: String, error: impl std::fmt::Display) -> GxError {
    GxError::ShaderCompile {
        label,
        message: error.to_string(),
    }
}

// =============================================================================
// Rasterizer
// =============================================================================

/// Per-frame GPU buffers uploaded at `begin_frame`.
struct FrameBuffers {
    vertices: wgpu::Buffer,
    indices: wgpu::Buffer,
}

pub struct WgpuRasterizer {
    gpu: GpuContext,
    layouts: Layouts,
    desc: FramebufferDesc,
    attachments: Option<Attachments>,

    geometry_modules: VariantCache<wgpu::ShaderModule>,
    fog_modules: FogProgramCache<wgpu::ShaderModule>,
    fullscreen_modules: HashMap<FullscreenShader, wgpu::ShaderModule>,
    pipelines: HashMap<PipelineKey, wgpu::RenderPipeline>,

    frame_uniforms: wgpu::Buffer,
    frame_bind_group: Option<wgpu::BindGroup>,
    textures: TextureCache,
    clear_image: Option<ClearImageTextures>,
    buffers: Option<FrameBuffers>,

    frame: Option<FrameState>,
    commands: Vec<GxCommand>,
    pending: Option<PendingReadback>,
}

impl WgpuRasterizer {
    /// Create a rasterizer on a new headless device.
    pub fn new() -> GxResult<Self> {
        Ok(Self::with_context(GpuContext::new_headless()?))
    }

    pub fn with_context(gpu: GpuContext) -> Self {
        let layouts = Layouts::new(&gpu.device);
        let frame_uniforms = gpu.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("GX Frame Uniforms"),
            size: std::mem::size_of::<FrameUniforms>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let textures = TextureCache::new(&gpu.device, &gpu.queue);

        Self {
            gpu,
            layouts,
            desc: FramebufferDesc {
                width: 0,
                height: 0,
                multisample_size: 0,
            },
            attachments: None,
            geometry_modules: VariantCache::new(),
            fog_modules: FogProgramCache::new(),
            fullscreen_modules: HashMap::new(),
            pipelines: HashMap::new(),
            frame_uniforms,
            frame_bind_group: None,
            textures,
            clear_image: None,
            buffers: None,
            frame: None,
            commands: Vec::new(),
            pending: None,
        }
    }

    pub fn adapter_name(&self) -> &str {
        &self.gpu.adapter_name
    }

    fn attachments(&self) -> GxResult<&Attachments> {
        self.attachments
            .as_ref()
            .ok_or_else(|| GxError::Device("no framebuffer allocated".into()))
    }

    fn create_frame_bind_group(&self, attachments: &Attachments) -> wgpu::BindGroup {
        self.gpu
            .device
            .create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("GX Frame Bind Group"),
                layout: &self.layouts.frame,
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: 0,
                        resource: self.frame_uniforms.as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 1,
                        resource: wgpu::BindingResource::TextureView(
                            attachments.back_facing_view(),
                        ),
                    },
                ],
            })
    }

    // =========================================================================
    // Programs and pipelines
    // =========================================================================

    fn ensure_pipeline(&mut self, key: PipelineKey) -> GxResult<()> {
        if self.pipelines.contains_key(&key) {
            return Ok(());
        }
        let sample_count = self.attachments()?.sample_count;

        let (label, pipeline) = match key {
            PipelineKey::Geometry { flags, .. } => {
                let gpu = &self.gpu;
                let module = self
                    .geometry_modules
                    .get_or_create(flags, |flags, settings| compile_geometry(gpu, flags, settings))?;
                let pipeline = self.gpu.scoped(|device| {
                    create_geometry_pipeline(device, &self.layouts, module, &key, sample_count)
                });
                (flags.label(), pipeline)
            }
            PipelineKey::Fullscreen { shader, .. } => {
                let module = fullscreen_module(
                    &self.gpu,
                    &mut self.fog_modules,
                    &mut self.fullscreen_modules,
                    shader,
                )?;
                let pipeline = self.gpu.scoped(|device| {
                    create_fullscreen_pipeline(device, &self.layouts, module, &key, sample_count)
                });
                (shader.label(), pipeline)
            }
        };

        match pipeline {
            Ok(Some(pipeline)) => {
                tracing::debug!(
                    "Created pipeline for {} ({} cached)",
                    label,
                    self.pipelines.len() + 1
                );
                self.pipelines.insert(key, pipeline);
                Ok(())
            }
            Ok(None) => Err(compile_error(label, "pipeline key does not match program")),
            Err(message) => Err(compile_error(label, message)),
        }
    }

    // =========================================================================
    // Prepare
    // =========================================================================

    fn input_bind_group(&self, shader: FullscreenShader) -> GxResult<Option<wgpu::BindGroup>> {
        let Some(layout) = self.layouts.fullscreen_inputs(shader) else {
            return Ok(None);
        };
        let attachments = self.attachments()?;
        let clear_image = || {
            self.clear_image
                .as_ref()
                .ok_or_else(|| GxError::Device("image clear without a clear image".into()))
        };

        let mut views = Vec::with_capacity(3);
        for input in fullscreen_inputs(shader) {
            let view = match input {
                FullscreenInput::Attachment(attachment) => attachments.view(*attachment),
                FullscreenInput::DepthCopy => attachments.depth_copy_view(),
                FullscreenInput::ClearColor => clear_image()?.color_view(),
                FullscreenInput::ClearAttributes => clear_image()?.attributes_view(),
                FullscreenInput::Depth => attachments.depth_view(),
            };
            views.push(view);
        }

        let entries: Vec<_> = views
            .iter()
            .enumerate()
            .map(|(binding, view)| wgpu::BindGroupEntry {
                binding: binding as u32,
                resource: wgpu::BindingResource::TextureView(view),
            })
            .collect();

        Ok(Some(self.gpu.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(&format!("GX {} Inputs", shader.label())),
            layout,
            entries: &entries,
        })))
    }

    fn fullscreen_step(
        &mut self,
        shader: FullscreenShader,
        state: crate::graphics::DrawState,
        target: Option<Attachment>,
    ) -> GxResult<Pass> {
        let key = PipelineKey::fullscreen(shader, &state, target);
        self.ensure_pipeline(key)?;
        Ok(Pass::Fullscreen(FullscreenStep {
            key,
            label: shader.label(),
            targets: FullscreenTargets::new(shader, target),
            depth_stencil: fullscreen_uses_depth_stencil(shader, &state),
            reference: state.stencil.reference,
            inputs: self.input_bind_group(shader)?,
        }))
    }

    fn draw_step(
        &mut self,
        call: &DrawCall,
        records: &mut Vec<PolygonUniformData>,
    ) -> GxResult<Option<DrawStep>> {
        let attachments = self.attachments()?;
        let (width, height) = (attachments.width, attachments.height);
        let record = PolygonUniformData::new(&call.uniforms, width, height);
        let Some(scissor) = scissor_rect(record.viewport, width, height) else {
            return Ok(None);
        };
        if call.range.count == 0 {
            return Ok(None);
        }

        let key = PipelineKey::geometry(call.flags, call.primitive, &call.state);
        self.ensure_pipeline(key)?;

        let texture = self
            .textures
            .bind_group(&self.gpu.device, &self.layouts.texture, &call.uniforms.texture)
            .clone();
        let polygon_offset = (records.len() as u64 * POLYGON_UNIFORM_STRIDE) as u32;
        records.push(record);

        Ok(Some(DrawStep {
            key,
            reference: call.state.stencil.reference,
            scissor,
            range: call.range,
            polygon_offset,
            texture,
        }))
    }

    fn prepare(&mut self) -> GxResult<(Vec<Pass>, Vec<PolygonUniformData>)> {
        let frame = self
            .frame
            .take()
            .ok_or_else(|| GxError::Device("end_frame without begin_frame".into()))?;
        let commands = std::mem::take(&mut self.commands);
        let result = self.prepare_commands(&frame, &commands);
        self.frame = Some(frame);
        self.commands = commands;
        result
    }

    fn prepare_commands(
        &mut self,
        frame: &FrameState,
        commands: &[GxCommand],
    ) -> GxResult<(Vec<Pass>, Vec<PolygonUniformData>)> {
        let multisampled = self.attachments()?.sample_count > 1;
        let mut passes = Vec::new();
        let mut records = Vec::new();

        for command in commands {
            match command {
                GxCommand::Clear(ClearSource::Image) if self.clear_image.is_some() => {
                    let mut state = clear_image_state();
                    state.stencil.reference = frame.clear.polygon_id & gx_common::MAX_POLYGON_ID;
                    passes.push(self.fullscreen_step(FullscreenShader::ClearImage, state, None)?);
                }
                GxCommand::Clear(_) => {
                    let targets = ClearTargets::from_values(&frame.clear);
                    passes.push(Pass::Clear {
                        colors: clear_colors(&targets),
                        depth: targets.depth,
                        stencil: targets.stencil,
                    });
                }
                GxCommand::ClearStencil { value, write_mask } => {
                    let state = stencil_fill_state(*value, *write_mask);
                    passes.push(self.fullscreen_step(FullscreenShader::StencilFill, state, None)?);
                }
                GxCommand::Draw(call) => {
                    let Some(step) = self.draw_step(call, &mut records)? else {
                        continue;
                    };
                    match passes.last_mut() {
                        Some(Pass::Geometry(steps)) => steps.push(step),
                        _ => passes.push(Pass::Geometry(vec![step])),
                    }
                }
                GxCommand::Fullscreen(FullscreenCall {
                    program,
                    state,
                    target,
                }) => {
                    passes.push(self.fullscreen_step((*program).into(), *state, *target)?);
                }
                GxCommand::ResolveWorkingBackFacing => passes.push(Pass::CopyBackFacing),
                GxCommand::ResolveGeometry => {
                    let shader = FullscreenShader::DepthResolve { multisampled };
                    let state = crate::graphics::DrawState::fullscreen();
                    passes.push(self.fullscreen_step(shader, state, None)?);
                }
                // Every pass already resolves into the sampled textures
                GxCommand::ResolveColor => {}
            }
        }

        Ok((passes, records))
    }

    // =========================================================================
    // Encode
    // =========================================================================

    fn encode(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        passes: &[Pass],
        polygon_bind_group: &wgpu::BindGroup,
    ) -> GxResult<()> {
        let attachments = self.attachments()?;
        let frame_bind_group = self
            .frame_bind_group
            .as_ref()
            .ok_or_else(|| GxError::Device("frame bind group missing".into()))?;
        let buffers = self
            .buffers
            .as_ref()
            .ok_or_else(|| GxError::Device("frame buffers missing".into()))?;

        for pass in passes {
            match pass {
                Pass::Clear {
                    colors,
                    depth,
                    stencil,
                } => {
                    let color_attachments = attachments.geometry_attachments(Some(colors));
                    encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                        label: Some("GX Clear Pass"),
                        color_attachments: &color_attachments,
                        depth_stencil_attachment: Some(
                            attachments.depth_stencil_attachment(Some((*depth, *stencil))),
                        ),
                        timestamp_writes: None,
                        occlusion_query_set: None,
                    });
                }
                Pass::Geometry(steps) => {
                    let color_attachments = attachments.geometry_attachments(None);
                    let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                        label: Some("GX Geometry Pass"),
                        color_attachments: &color_attachments,
                        depth_stencil_attachment: Some(attachments.depth_stencil_attachment(None)),
                        timestamp_writes: None,
                        occlusion_query_set: None,
                    });
                    render_pass.set_vertex_buffer(0, buffers.vertices.slice(..));
                    render_pass.set_index_buffer(buffers.indices.slice(..), wgpu::IndexFormat::Uint32);
                    render_pass.set_bind_group(0, frame_bind_group, &[]);

                    for step in steps {
                        let pipeline = self.pipelines.get(&step.key).ok_or_else(|| {
                            GxError::Device("geometry pipeline missing after prepare".into())
                        })?;
                        let [x, y, width, height] = step.scissor;
                        render_pass.set_pipeline(pipeline);
                        render_pass.set_stencil_reference(u32::from(step.reference));
                        render_pass.set_scissor_rect(x, y, width, height);
                        render_pass.set_bind_group(1, polygon_bind_group, &[step.polygon_offset]);
                        render_pass.set_bind_group(2, &step.texture, &[]);
                        render_pass.draw_indexed(step.range.first..step.range.end(), 0, 0..1);
                    }
                }
                Pass::Fullscreen(step) => {
                    let pipeline = self.pipelines.get(&step.key).ok_or_else(|| {
                        GxError::Device(format!("{} pipeline missing after prepare", step.label))
                    })?;
                    let color_attachments: Vec<_> = match step.targets {
                        FullscreenTargets::None => Vec::new(),
                        FullscreenTargets::One(attachment) => {
                            vec![Some(attachments.color_attachment(attachment, wgpu::LoadOp::Load))]
                        }
                        FullscreenTargets::GBuffer => Vec::from(attachments.geometry_attachments(None)),
                        FullscreenTargets::DepthCopy => vec![Some(attachments.depth_copy_attachment())],
                    };
                    let depth_stencil_attachment = step
                        .depth_stencil
                        .then(|| attachments.depth_stencil_attachment(None));

                    let label = format!("GX {} Pass", step.label);
                    let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                        label: Some(&label),
                        color_attachments: &color_attachments,
                        depth_stencil_attachment,
                        timestamp_writes: None,
                        occlusion_query_set: None,
                    });
                    render_pass.set_pipeline(pipeline);
                    if step.depth_stencil {
                        render_pass.set_stencil_reference(u32::from(step.reference));
                    }
                    render_pass.set_bind_group(0, frame_bind_group, &[]);
                    if let Some(inputs) = &step.inputs {
                        render_pass.set_bind_group(1, inputs, &[]);
                    }
                    render_pass.draw(0..3, 0..1);
                }
                Pass::CopyBackFacing => attachments.copy_back_facing(encoder),
            }
        }
        Ok(())
    }
}

fn fullscreen_module<'a>(
    gpu: &GpuContext,
    fog_modules: &'a mut FogProgramCache<wgpu::ShaderModule>,
    modules: &'a mut HashMap<FullscreenShader, wgpu::ShaderModule>,
    shader: FullscreenShader,
) -> GxResult<&'a wgpu::ShaderModule> {
    let build = |shader: FullscreenShader| -> GxResult<wgpu::ShaderModule> {
        let label = shader.label();
        let source =
            generate_fullscreen_shader(shader).map_err(|e| compile_error(label.clone(), e))?;
        gpu.compile(&label, &source)
    };

    if let FullscreenShader::Fog(key) = shader {
        return fog_modules.get_or_create(key, |key| build(FullscreenShader::Fog(key)));
    }
    if !modules.contains_key(&shader) {
        tracing::debug!("Creating full-screen program: {}", shader.label());
        let module = build(shader)?;
        modules.insert(shader, module);
    }
    Ok(&modules[&shader])
}

fn compile_geometry(
    gpu: &GpuContext,
    flags: GeometryFlags,
    settings: &ProgramSettings,
) -> GxResult<wgpu::ShaderModule> {
    let label = flags.label();
    let source =
        generate_geometry_shader(flags, settings).map_err(|e| compile_error(label.clone(), e))?;
    gpu.compile(&label, &source)
}

impl Rasterizer for WgpuRasterizer {
    fn name(&self) -> &'static str {
        "wgpu"
    }

    fn capabilities(&self) -> DeviceCapabilities {
        self.gpu.capabilities
    }

    fn origin(&self) -> FramebufferOrigin {
        FramebufferOrigin::TopLeft
    }

    fn resize(&mut self, desc: &FramebufferDesc) -> GxResult<()> {
        let resize_error = |reason: String| GxError::Resize {
            width: desc.width,
            height: desc.height,
            reason,
        };

        let sample_count = desc.sample_count();
        if sample_count > 1 && !self.gpu.sample_counts.contains(&sample_count) {
            return Err(resize_error(format!(
                "{}x multisampling unsupported (supported: {:?})",
                sample_count, self.gpu.sample_counts
            )));
        }
        let max = self.gpu.max_texture_dimension;
        if desc.width == 0 || desc.height == 0 || desc.width > max || desc.height > max {
            return Err(resize_error(format!("size outside 1..={}", max)));
        }
        if self.attachments.is_some() && self.desc == *desc {
            return Ok(());
        }

        // Allocate first so a failure leaves the current attachments in place
        let attachments = self
            .gpu
            .scoped(|device| Attachments::new(device, desc))
            .map_err(resize_error)?;

        let frame_bind_group = self.create_frame_bind_group(&attachments);
        if self.desc.sample_count() != sample_count {
            self.pipelines.clear();
        }
        self.attachments = Some(attachments);
        self.frame_bind_group = Some(frame_bind_group);
        self.desc = *desc;
        self.pending = None;
        tracing::info!(
            "Framebuffer resized to {}x{} ({} samples)",
            desc.width,
            desc.height,
            sample_count
        );
        Ok(())
    }

    fn rebuild_programs(&mut self, settings: &ProgramSettings) -> GxResult<()> {
        if !self.geometry_modules.invalidate(*settings) {
            return Ok(());
        }
        // Pipelines reference the old modules
        self.pipelines.clear();
        let gpu = &self.gpu;
        self.geometry_modules
            .pregenerate(|flags, settings| compile_geometry(gpu, flags, settings))?;
        tracing::info!(
            "Built {} geometry programs on {}",
            self.geometry_modules.len(),
            self.gpu.adapter_name
        );
        Ok(())
    }

    fn begin_frame(&mut self, frame: &FrameState, geometry: FrameGeometry<'_>) -> GxResult<()> {
        let device = &self.gpu.device;
        let queue = &self.gpu.queue;

        queue.write_buffer(
            &self.frame_uniforms,
            0,
            bytemuck::bytes_of(&FrameUniforms::new(frame)),
        );

        let mut vertices: Vec<GpuVertex> = geometry.vertices.iter().map(GpuVertex::from).collect();
        if vertices.is_empty() {
            vertices.push(GpuVertex::zeroed());
        }
        let mut indices = geometry.indices.to_vec();
        if indices.is_empty() {
            indices.push(0);
        }
        self.buffers = Some(FrameBuffers {
            vertices: device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("GX Vertex Buffer"),
                contents: bytemuck::cast_slice(&vertices),
                usage: wgpu::BufferUsages::VERTEX,
            }),
            indices: device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("GX Index Buffer"),
                contents: bytemuck::cast_slice(&indices),
                usage: wgpu::BufferUsages::INDEX,
            }),
        });

        self.textures.sync(device, queue, geometry.textures);
        self.clear_image = frame
            .clear_image
            .as_ref()
            .map(|image| ClearImageTextures::new(device, queue, image));

        tracing::trace!(
            "Frame uploaded: {} vertices, {} indices, {} textures",
            geometry.vertices.len(),
            geometry.indices.len(),
            self.textures.len()
        );

        self.frame = Some(frame.clone());
        self.commands.clear();
        Ok(())
    }

    fn execute(&mut self, command: &GxCommand) -> GxResult<()> {
        if self.frame.is_none() {
            return Err(GxError::Device("command executed outside a frame".into()));
        }
        self.commands.push(command.clone());
        Ok(())
    }

    fn end_frame(&mut self, output: Attachment) -> GxResult<()> {
        let (passes, records) = self.prepare()?;

        let device = &self.gpu.device;
        let polygon_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("GX Polygon Uniforms"),
            contents: &polygon_records(&records),
            usage: wgpu::BufferUsages::UNIFORM,
        });
        let polygon_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("GX Polygon Bind Group"),
            layout: &self.layouts.polygon,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                    buffer: &polygon_buffer,
                    offset: 0,
                    size: wgpu::BufferSize::new(std::mem::size_of::<PolygonUniformData>() as u64),
                }),
            }],
        });

        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("GX Frame Encoder"),
        });
        self.encode(&mut encoder, &passes, &polygon_bind_group)?;

        let attachments = self.attachments()?;
        let mut readback = PendingReadback::record(
            device,
            &mut encoder,
            attachments.texture(output),
            attachments.width,
            attachments.height,
        );

        self.gpu
            .scoped(|_| self.gpu.queue.submit(std::iter::once(encoder.finish())))
            .map_err(|e| GxError::Device(format!("frame submission failed: {}", e)))?;
        readback.begin_map();

        tracing::trace!(
            "Frame submitted: {} commands in {} passes, {} draws, output {:?}",
            self.commands.len(),
            passes.len(),
            records.len(),
            output
        );
        self.pending = Some(readback);
        self.frame = None;
        Ok(())
    }

    fn read_pixels(&mut self, pixels: &mut Vec<[u8; 4]>) -> GxResult<bool> {
        let Some(readback) = self.pending.take() else {
            return Ok(false);
        };
        readback.finish(&self.gpu.device, pixels)?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gx_common::FogProgramKey;

    #[test]
    fn test_polygon_records_use_stride() {
        let mut first = PolygonUniformData::zeroed();
        first.values[0] = 1.0;
        let mut second = PolygonUniformData::zeroed();
        second.params[1] = 0xAB;

        let bytes = polygon_records(&[first, second]);
        assert_eq!(bytes.len(), 2 * POLYGON_UNIFORM_STRIDE as usize);
        let stride = POLYGON_UNIFORM_STRIDE as usize;
        let decoded: &PolygonUniformData =
            bytemuck::from_bytes(&bytes[stride..stride + std::mem::size_of::<PolygonUniformData>()]);
        assert_eq!(decoded.params[1], 0xAB);
    }

    #[test]
    fn test_empty_frame_still_has_one_record() {
        assert_eq!(polygon_records(&[]).len(), POLYGON_UNIFORM_STRIDE as usize);
    }

    #[test]
    fn test_program_to_shader() {
        let key = FogProgramKey::new(0x40, 3);
        assert_eq!(
            FullscreenShader::from(FullscreenProgram::Fog(key)),
            FullscreenShader::Fog(key)
        );
        assert_eq!(
            FullscreenShader::from(FullscreenProgram::EdgeMark),
            FullscreenShader::EdgeMark
        );
    }
}
