//! Software reference rasterizer
//!
//! Replays the command list on CPU buffers with the same fixed-function
//! semantics the GPU backend configures: 8-bit stencil with GL compare
//! rules, 24-bit depth, four float color attachments. Used as the fallback
//! when no GPU device is available and as the reference for end-to-end
//! tests.

mod buffers;
mod postprocess;
mod raster;
mod shading;

#[cfg(test)]
mod tests;

pub use buffers::GBuffer;

use gx_common::color::f32_to_rgba8;
use gx_common::{TOON_TABLE_LEN, TextureSet, Vertex};
use rayon::prelude::*;

use self::shading::ShadeContext;
use crate::capabilities::DeviceCapabilities;
use crate::error::{GxError, GxResult};
use crate::graphics::{
    Attachment, ClearSource, ClearTargets, DrawCall, FrameGeometry, FrameState, FramebufferDesc,
    FramebufferOrigin, GxCommand, ProgramSettings, Rasterizer, clear_image_index,
};

/// Per-frame inputs copied at `begin_frame`.
#[derive(Default)]
struct FrameInputs {
    frame: Option<FrameState>,
    vertices: Vec<Vertex>,
    indices: Vec<u32>,
    textures: TextureSet,
    toon_colors: [[f32; 4]; TOON_TABLE_LEN],
}

pub struct SoftRasterizer {
    desc: FramebufferDesc,
    gbuffer: GBuffer,
    programs: Option<ProgramSettings>,
    inputs: FrameInputs,
    pending_output: Option<Attachment>,
    commands_executed: usize,
}

impl SoftRasterizer {
    pub fn new() -> Self {
        Self {
            desc: FramebufferDesc {
                width: 0,
                height: 0,
                multisample_size: 0,
            },
            gbuffer: GBuffer::default(),
            programs: None,
            inputs: FrameInputs::default(),
            pending_output: None,
            commands_executed: 0,
        }
    }

    /// Current attachments, for inspection.
    pub fn gbuffer(&self) -> &GBuffer {
        &self.gbuffer
    }

    fn frame(&self) -> GxResult<&FrameState> {
        self.inputs
            .frame
            .as_ref()
            .ok_or_else(|| GxError::Device("command executed outside a frame".into()))
    }

    fn clear(&mut self, source: ClearSource) -> GxResult<()> {
        let frame = self.frame()?;
        let (width, height) = (self.gbuffer.width, self.gbuffer.height);

        let targets: Vec<ClearTargets> = match (source, &frame.clear_image) {
            (ClearSource::Image, Some(image)) => {
                let polygon_id = frame.clear.polygon_id;
                (0..self.gbuffer.len())
                    .into_par_iter()
                    .map(|i| {
                        let x = i as u32 % width;
                        // Stored rows run bottom-up; the image runs top-down
                        let y_from_top = height - 1 - i as u32 / width;
                        let texel = clear_image_index(x, y_from_top, width, height);
                        ClearTargets::from_image(image, texel, polygon_id)
                    })
                    .collect()
            }
            _ => vec![ClearTargets::from_values(&frame.clear); self.gbuffer.len()],
        };

        for (index, target) in targets.iter().enumerate() {
            self.gbuffer.clear_pixel(index, target);
        }
        Ok(())
    }

    fn draw(&mut self, call: &DrawCall) -> GxResult<()> {
        let settings = self.programs.ok_or(GxError::ProgramsNotBuilt)?;
        let inputs = &self.inputs;
        let frame = inputs
            .frame
            .as_ref()
            .ok_or_else(|| GxError::Device("draw outside a frame".into()))?;

        let texture = call
            .uniforms
            .texture
            .handle
            .and_then(|handle| inputs.textures.get(handle));
        let ctx = ShadeContext {
            settings: &settings,
            flags: call.flags,
            uniforms: &call.uniforms,
            texture,
            toon_colors: &inputs.toon_colors,
            alpha_test_ref: frame.alpha_test_ref,
        };

        raster::draw(&mut self.gbuffer, call, &ctx, &inputs.vertices, &inputs.indices);
        Ok(())
    }
}

impl Default for SoftRasterizer {
    fn default() -> Self {
        Self::new()
    }
}

impl Rasterizer for SoftRasterizer {
    fn name(&self) -> &'static str {
        "software"
    }

    fn capabilities(&self) -> DeviceCapabilities {
        DeviceCapabilities {
            max_color_attachments: 4,
            max_draw_buffers: 4,
            max_texture_units: 8,
            max_samples: 1,
            offscreen_targets: true,
        }
    }

    fn origin(&self) -> FramebufferOrigin {
        FramebufferOrigin::BottomLeft
    }

    fn resize(&mut self, desc: &FramebufferDesc) -> GxResult<()> {
        if desc.width == self.desc.width && desc.height == self.desc.height {
            self.desc = *desc;
            return Ok(());
        }
        // Allocate first so a failure leaves the current buffers in place
        let gbuffer = GBuffer::new(desc.width, desc.height)?;
        self.gbuffer = gbuffer;
        self.desc = *desc;
        self.pending_output = None;
        tracing::debug!("Software framebuffer resized to {}x{}", desc.width, desc.height);
        Ok(())
    }

    fn rebuild_programs(&mut self, settings: &ProgramSettings) -> GxResult<()> {
        if self.programs != Some(*settings) {
            tracing::debug!(
                "Software programs configured for {}x{}",
                settings.framebuffer_width,
                settings.framebuffer_height
            );
            self.programs = Some(*settings);
        }
        Ok(())
    }

    fn begin_frame(&mut self, frame: &FrameState, geometry: FrameGeometry<'_>) -> GxResult<()> {
        let inputs = &mut self.inputs;
        inputs.vertices.clear();
        inputs.vertices.extend_from_slice(geometry.vertices);
        inputs.indices.clear();
        inputs.indices.extend_from_slice(geometry.indices);
        inputs.textures.clone_from(geometry.textures);
        inputs.toon_colors = frame.toon_colors.map(gx_common::color::rgba8_to_f32);
        inputs.frame = Some(frame.clone());
        self.commands_executed = 0;
        Ok(())
    }

    fn execute(&mut self, command: &GxCommand) -> GxResult<()> {
        self.commands_executed += 1;
        match command {
            GxCommand::Clear(source) => self.clear(*source)?,
            GxCommand::ClearStencil { value, write_mask } => {
                self.gbuffer.clear_stencil(*value, *write_mask)
            }
            GxCommand::Draw(call) => self.draw(call)?,
            GxCommand::Fullscreen(call) => {
                let frame = self
                    .inputs
                    .frame
                    .as_ref()
                    .ok_or_else(|| GxError::Device("full-screen pass outside a frame".into()))?;
                postprocess::run(&mut self.gbuffer, call, frame);
            }
            GxCommand::ResolveWorkingBackFacing => self.gbuffer.resolve_back_facing(),
            // Single-sampled: color and geometry attachments are always readable
            GxCommand::ResolveColor | GxCommand::ResolveGeometry => {}
        }
        Ok(())
    }

    fn end_frame(&mut self, output: Attachment) -> GxResult<()> {
        tracing::trace!(
            "Software frame finished: {} commands, output {:?}",
            self.commands_executed,
            output
        );
        self.pending_output = Some(output);
        Ok(())
    }

    fn read_pixels(&mut self, pixels: &mut Vec<[u8; 4]>) -> GxResult<bool> {
        let Some(output) = self.pending_output.take() else {
            return Ok(false);
        };
        let source = self.gbuffer.attachment(output);
        pixels.clear();
        pixels.par_extend(source.par_iter().map(|&color| f32_to_rgba8(color)));
        Ok(true)
    }
}
