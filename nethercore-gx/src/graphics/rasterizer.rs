//! Rasterizer backend abstraction
//!
//! A rasterizer owns the framebuffer set and the compiled programs. The
//! renderer drives it with one `begin_frame`, a list of commands and one
//! `end_frame` per frame, then reads pixels back.

use gx_common::{TextureSet, Vertex};

use super::command::{Attachment, GxCommand};
use super::frame_state::FrameState;
use super::framebuffer::{FramebufferDesc, FramebufferOrigin};
use super::variant::ProgramSettings;
use crate::capabilities::DeviceCapabilities;
use crate::error::GxResult;

/// Per-frame buffers referenced by draw commands.
#[derive(Debug, Clone, Copy)]
pub struct FrameGeometry<'a> {
    pub vertices: &'a [Vertex],
    pub indices: &'a [u32],
    pub textures: &'a TextureSet,
}

pub trait Rasterizer {
    /// Short backend name for logs.
    fn name(&self) -> &'static str;

    fn capabilities(&self) -> DeviceCapabilities;

    fn origin(&self) -> FramebufferOrigin;

    /// Recreate every attachment for `desc`.
    ///
    /// On failure the previous attachments must remain usable.
    fn resize(&mut self, desc: &FramebufferDesc) -> GxResult<()>;

    /// Drop cached programs built for different settings.
    fn rebuild_programs(&mut self, settings: &ProgramSettings) -> GxResult<()>;

    /// Upload the frame's vertices, indices, textures and lookup tables.
    fn begin_frame(&mut self, frame: &FrameState, geometry: FrameGeometry<'_>) -> GxResult<()>;

    fn execute(&mut self, command: &GxCommand) -> GxResult<()>;

    /// Finish the frame and start reading back `output`.
    fn end_frame(&mut self, output: Attachment) -> GxResult<()>;

    /// Wait for the pending readback and copy RGBA8 pixels, in the
    /// rasterizer's own row order, into `pixels`.
    ///
    /// Returns false when no readback was pending.
    fn read_pixels(&mut self, pixels: &mut Vec<[u8; 4]>) -> GxResult<bool>;
}

// =============================================================================
// Recording rasterizer (tests)
// =============================================================================

/// Rasterizer that records what it is asked to do.
#[cfg(test)]
pub(crate) struct CommandRecorder {
    pub caps: DeviceCapabilities,
    pub desc: FramebufferDesc,
    pub program_settings: Option<ProgramSettings>,
    pub program_builds: usize,
    pub commands: Vec<GxCommand>,
    pub frames: usize,
    pub output: Option<Attachment>,
    pub fail_resize: bool,
    /// Fail builds for settings other than the current ones
    pub fail_rebuild: bool,
    pub fill: [u8; 4],
    pending: bool,
}

#[cfg(test)]
impl CommandRecorder {
    pub fn new() -> Self {
        Self {
            caps: DeviceCapabilities {
                max_color_attachments: 8,
                max_draw_buffers: 8,
                max_texture_units: 16,
                max_samples: 4,
                offscreen_targets: true,
            },
            desc: FramebufferDesc::default(),
            program_settings: None,
            program_builds: 0,
            commands: Vec::new(),
            frames: 0,
            output: None,
            fail_resize: false,
            fail_rebuild: false,
            fill: [0, 0, 0, 0],
            pending: false,
        }
    }
}

#[cfg(test)]
impl Rasterizer for CommandRecorder {
    fn name(&self) -> &'static str {
        "recorder"
    }

    fn capabilities(&self) -> DeviceCapabilities {
        self.caps
    }

    fn origin(&self) -> FramebufferOrigin {
        FramebufferOrigin::BottomLeft
    }

    fn resize(&mut self, desc: &FramebufferDesc) -> GxResult<()> {
        if self.fail_resize {
            return Err(crate::error::GxError::Resize {
                width: desc.width,
                height: desc.height,
                reason: "out of memory".into(),
            });
        }
        self.desc = *desc;
        Ok(())
    }

    fn rebuild_programs(&mut self, settings: &ProgramSettings) -> GxResult<()> {
        if self.program_settings != Some(*settings) {
            if self.fail_rebuild {
                return Err(crate::error::GxError::ShaderCompile {
                    label: "geometry".into(),
                    message: "link failed".into(),
                });
            }
            self.program_settings = Some(*settings);
            self.program_builds += 1;
        }
        Ok(())
    }

    fn begin_frame(&mut self, _frame: &FrameState, _geometry: FrameGeometry<'_>) -> GxResult<()> {
        self.commands.clear();
        Ok(())
    }

    fn execute(&mut self, command: &GxCommand) -> GxResult<()> {
        self.commands.push(command.clone());
        Ok(())
    }

    fn end_frame(&mut self, output: Attachment) -> GxResult<()> {
        self.frames += 1;
        self.output = Some(output);
        self.pending = true;
        Ok(())
    }

    fn read_pixels(&mut self, pixels: &mut Vec<[u8; 4]>) -> GxResult<bool> {
        if !self.pending {
            return Ok(false);
        }
        self.pending = false;
        pixels.clear();
        pixels.resize(self.desc.pixel_count(), self.fill);
        // Mark the bottom row so tests can observe the flip.
        if let Some(first) = pixels.first_mut() {
            *first = [0xFF, 0, 0, 0xFF];
        }
        Ok(true)
    }
}
