//! Frame driver
//!
//! `Renderer` owns a rasterizer and the effective settings. Each frame it
//! snapshots the render state, builds the command list, replays it on the
//! rasterizer and leaves the readback pending until `finish` or the next
//! frame.

use gx_common::{GeometryList, OutputFormat, RenderState, TextureSet};

use super::draw::build_frame;
use super::framebuffer::FramebufferDesc;
use super::frame_state::FrameState;
use super::index_buffer::IndexBuffer;
use super::output::{pack_5551, pack_main};
use super::rasterizer::{FrameGeometry, Rasterizer};
use crate::capabilities::FeatureSupport;
use crate::config::Config;
use crate::error::{GxError, GxResult};
use crate::settings::FrameSettings;

/// Asked before the framebuffer grows; returning false rejects the resize.
pub type ResizeClient = Box<dyn FnMut(u32, u32) -> bool>;

pub struct Renderer<R: Rasterizer> {
    rasterizer: R,
    config: Config,
    features: FeatureSupport,
    settings: FrameSettings,
    desc: FramebufferDesc,
    resize_client: Option<ResizeClient>,

    /// Last read-back frame, in the rasterizer's row order
    pixels: Vec<[u8; 4]>,
    pixels_ready: bool,
    frame_count: u64,
}

impl<R: Rasterizer> Renderer<R> {
    /// Probe the rasterizer, resolve settings and build the native-size framebuffer.
    pub fn new(mut rasterizer: R, config: Config) -> GxResult<Self> {
        let caps = rasterizer.capabilities();
        caps.check_shader_support()?;

        let features = caps.features();
        let settings = FrameSettings::resolve(&config, &features, caps.max_samples);

        if config.quality.multisample_size > 0 && !features.multisample {
            tracing::warn!(
                "Multisampling requested ({}x) but unsupported by {}",
                config.quality.multisample_size,
                rasterizer.name()
            );
        }

        let desc = FramebufferDesc {
            multisample_size: settings.multisample_size,
            ..Default::default()
        };
        rasterizer.resize(&desc)?;
        rasterizer.rebuild_programs(&settings.program_settings(desc.width, desc.height))?;

        tracing::info!(
            "{} renderer ready: {}x{}, multisample {}",
            rasterizer.name(),
            desc.width,
            desc.height,
            desc.multisample_size
        );

        Ok(Self {
            rasterizer,
            config,
            features,
            settings,
            desc,
            resize_client: None,
            pixels: Vec::with_capacity(desc.pixel_count()),
            pixels_ready: false,
            frame_count: 0,
        })
    }

    pub fn rasterizer(&self) -> &R {
        &self.rasterizer
    }

    pub fn settings(&self) -> &FrameSettings {
        &self.settings
    }

    pub fn features(&self) -> &FeatureSupport {
        &self.features
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn framebuffer(&self) -> FramebufferDesc {
        self.desc
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    pub fn set_resize_client(&mut self, client: ResizeClient) {
        self.resize_client = Some(client);
    }

    /// Adopt a new configuration. Takes effect from the next frame.
    pub fn apply_config(&mut self, config: Config) -> GxResult<()> {
        let caps = self.rasterizer.capabilities();
        let settings = FrameSettings::resolve(&config, &self.features, caps.max_samples);

        if config.quality.multisample_size > 0 && !self.features.multisample {
            tracing::warn!(
                "Multisampling requested ({}x) but unsupported by {}",
                config.quality.multisample_size,
                self.rasterizer.name()
            );
        }

        if settings.multisample_size != self.desc.multisample_size {
            let desc = FramebufferDesc {
                multisample_size: settings.multisample_size,
                ..self.desc
            };
            self.rasterizer.resize(&desc)?;
            self.desc = desc;
            tracing::info!("Multisample size changed to {}", desc.multisample_size);
        }

        if settings.requires_program_rebuild(&self.settings) {
            tracing::info!("Emulation settings changed, rebuilding geometry programs");
            self.rasterizer
                .rebuild_programs(&settings.program_settings(self.desc.width, self.desc.height))?;
        }

        self.settings = settings;
        self.config = config;
        Ok(())
    }

    /// Resize every attachment. Sizes below the native resolution are ignored.
    ///
    /// On failure the previous framebuffer set stays in use.
    pub fn set_framebuffer_size(&mut self, width: u32, height: u32) -> GxResult<()> {
        if !FramebufferDesc::is_valid_size(width, height) {
            tracing::debug!("Ignoring framebuffer size {}x{} below native", width, height);
            return Ok(());
        }
        if width == self.desc.width && height == self.desc.height {
            return Ok(());
        }

        if let Some(client) = self.resize_client.as_mut()
            && !client(width, height)
        {
            return Err(GxError::ClientResize { width, height });
        }

        self.finish()?;

        let desc = FramebufferDesc {
            width,
            height,
            ..self.desc
        };
        self.rasterizer.resize(&desc)?;
        if let Err(e) = self
            .rasterizer
            .rebuild_programs(&self.settings.program_settings(width, height))
        {
            // Back to the attachments and programs of the current size
            let previous = self.desc;
            let restored = self.rasterizer.resize(&previous).and_then(|()| {
                self.rasterizer.rebuild_programs(
                    &self.settings.program_settings(previous.width, previous.height),
                )
            });
            if let Err(restore_err) = restored {
                tracing::warn!(
                    "Failed to restore {}x{} framebuffer: {}",
                    previous.width,
                    previous.height,
                    restore_err
                );
            }
            return Err(e);
        }
        self.desc = desc;

        self.pixels.clear();
        self.pixels_ready = false;

        tracing::info!("Framebuffer resized to {}x{}", width, height);
        Ok(())
    }

    /// Draw one frame. The readback stays pending until `finish`.
    pub fn render(
        &mut self,
        geometry: &GeometryList,
        textures: &TextureSet,
        state: &RenderState,
    ) -> GxResult<()> {
        self.finish()?;
        geometry.validate(textures)?;

        let frame = FrameState::capture(state, self.settings, self.desc.width, self.desc.height);
        let indices = IndexBuffer::build(geometry);
        let commands = build_frame(&frame, geometry, &indices, textures);

        self.rasterizer.begin_frame(
            &frame,
            FrameGeometry {
                vertices: &geometry.vertices,
                indices: &indices.indices,
                textures,
            },
        )?;
        for command in &commands.commands {
            self.rasterizer.execute(command)?;
        }
        self.rasterizer.end_frame(commands.output)?;

        self.frame_count += 1;
        Ok(())
    }

    /// Complete the pending readback, if any.
    ///
    /// Returns true when new pixels were read.
    pub fn finish(&mut self) -> GxResult<bool> {
        let read = self.rasterizer.read_pixels(&mut self.pixels)?;
        if read {
            self.pixels_ready = true;
        }
        Ok(read)
    }

    /// Last frame's pixels, in the rasterizer's row order.
    pub fn pixels(&self) -> Option<&[[u8; 4]]> {
        self.pixels_ready.then_some(self.pixels.as_slice())
    }

    /// Convert the last frame into the presentation buffers, top row first.
    ///
    /// Buffers must hold `width * height` pixels of the current framebuffer.
    pub fn flush(
        &mut self,
        main: Option<&mut [[u8; 4]]>,
        buffer16: Option<&mut [u16]>,
    ) -> GxResult<()> {
        self.finish()?;
        if !self.pixels_ready {
            return Ok(());
        }

        let count = self.desc.pixel_count();
        if self.pixels.len() != count {
            return Err(GxError::Readback(format!(
                "expected {} pixels, read {}",
                count,
                self.pixels.len()
            )));
        }

        let width = self.desc.width as usize;
        let origin = self.rasterizer.origin();
        if let Some(main) = main {
            pack_main(&self.pixels, width, origin, self.output_format(), main);
        }
        if let Some(buffer16) = buffer16 {
            pack_5551(&self.pixels, width, origin, buffer16);
        }
        Ok(())
    }

    pub fn output_format(&self) -> OutputFormat {
        self.settings.output_format
    }

    /// Drop the last frame.
    pub fn reset(&mut self) -> GxResult<()> {
        self.finish()?;
        self.pixels.clear();
        self.pixels_ready = false;
        self.frame_count = 0;
        Ok(())
    }

    /// Blank both presentation buffers.
    pub fn power_off(&mut self, main: Option<&mut [[u8; 4]]>, buffer16: Option<&mut [u16]>) {
        if let Some(main) = main {
            main.fill([0; 4]);
        }
        if let Some(buffer16) = buffer16 {
            buffer16.fill(0);
        }
        self.pixels.clear();
        self.pixels_ready = false;
    }
}
