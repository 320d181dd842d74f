//! Nethercore GX - handheld 3D core emulation on programmable rasterizers
//!
//! Turns a sorted, clipped geometry list plus per-frame render state into
//! pixels the way the console's fixed-function 3D engine would: per-polygon
//! identity and shadow rules live in the stencil byte, translucency is
//! composited against zero-alpha destinations, and edge marking and fog run
//! as full-screen passes.
//!
//! ```no_run
//! use nethercore_gx::{RendererPreference, config, select_renderer};
//!
//! let renderer = select_renderer(config::load(), RendererPreference::Auto)?;
//! println!("{} {:?}", renderer.backend_name(), renderer.framebuffer());
//! # Ok::<(), nethercore_gx::GxError>(())
//! ```

pub mod capabilities;
pub mod config;
pub mod error;
pub mod graphics;
pub mod settings;
mod shader_gen;
pub mod soft;
pub mod wgpu_backend;

use std::fmt;
use std::str::FromStr;

use gx_common::{GeometryList, OutputFormat, RenderState, TextureSet};

pub use capabilities::{DeviceCapabilities, FeatureSupport};
pub use config::Config;
pub use error::{GxError, GxResult};
pub use graphics::{FramebufferDesc, FramebufferOrigin, Rasterizer, Renderer};
pub use settings::FrameSettings;
pub use soft::SoftRasterizer;
pub use wgpu_backend::WgpuRasterizer;

/// Which rasterizer `select_renderer` should try.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RendererPreference {
    /// wgpu, falling back to software
    #[default]
    Auto,
    /// wgpu only; device or program failures are returned
    Wgpu,
    Software,
}

impl FromStr for RendererPreference {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "wgpu" | "gpu" => Ok(Self::Wgpu),
            "software" | "soft" | "cpu" => Ok(Self::Software),
            other => Err(format!(
                "unknown renderer '{}' (expected auto, wgpu or software)",
                other
            )),
        }
    }
}

impl fmt::Display for RendererPreference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Auto => "auto",
            Self::Wgpu => "wgpu",
            Self::Software => "software",
        };
        f.write_str(name)
    }
}

/// A renderer on whichever backend `select_renderer` settled on.
pub enum AnyRenderer {
    Wgpu(Box<Renderer<WgpuRasterizer>>),
    Software(Renderer<SoftRasterizer>),
}

macro_rules! dispatch {
    ($self:expr, $renderer:ident => $body:expr) => {
        match $self {
            AnyRenderer::Wgpu($renderer) => $body,
            AnyRenderer::Software($renderer) => $body,
        }
    };
}

impl AnyRenderer {
    /// Name of the active rasterizer.
    pub fn backend_name(&self) -> &'static str {
        dispatch!(self, r => r.rasterizer().name())
    }

    pub fn origin(&self) -> FramebufferOrigin {
        dispatch!(self, r => r.rasterizer().origin())
    }

    pub fn framebuffer(&self) -> FramebufferDesc {
        dispatch!(self, r => r.framebuffer())
    }

    pub fn settings(&self) -> &FrameSettings {
        dispatch!(self, r => r.settings())
    }

    pub fn features(&self) -> &FeatureSupport {
        dispatch!(self, r => r.features())
    }

    pub fn frame_count(&self) -> u64 {
        dispatch!(self, r => r.frame_count())
    }

    pub fn output_format(&self) -> OutputFormat {
        dispatch!(self, r => r.output_format())
    }

    pub fn apply_config(&mut self, config: Config) -> GxResult<()> {
        dispatch!(self, r => r.apply_config(config))
    }

    pub fn set_framebuffer_size(&mut self, width: u32, height: u32) -> GxResult<()> {
        dispatch!(self, r => r.set_framebuffer_size(width, height))
    }

    pub fn render(
        &mut self,
        geometry: &GeometryList,
        textures: &TextureSet,
        state: &RenderState,
    ) -> GxResult<()> {
        dispatch!(self, r => r.render(geometry, textures, state))
    }

    pub fn finish(&mut self) -> GxResult<bool> {
        dispatch!(self, r => r.finish())
    }

    pub fn pixels(&self) -> Option<&[[u8; 4]]> {
        dispatch!(self, r => r.pixels())
    }

    pub fn flush(
        &mut self,
        main: Option<&mut [[u8; 4]]>,
        buffer16: Option<&mut [u16]>,
    ) -> GxResult<()> {
        dispatch!(self, r => r.flush(main, buffer16))
    }

    pub fn reset(&mut self) -> GxResult<()> {
        dispatch!(self, r => r.reset())
    }

    pub fn power_off(&mut self, main: Option<&mut [[u8; 4]]>, buffer16: Option<&mut [u16]>) {
        dispatch!(self, r => r.power_off(main, buffer16))
    }
}

fn create_wgpu_renderer(config: Config) -> GxResult<Renderer<WgpuRasterizer>> {
    let rasterizer = WgpuRasterizer::new()?;
    tracing::info!("Created wgpu rasterizer on {}", rasterizer.adapter_name());
    Renderer::new(rasterizer, config)
}

/// Build a renderer for `preference`.
///
/// `Auto` falls back to the software rasterizer when no device can be
/// created or the programs fail to build. A renderer is either fully
/// capable of its backend's programs or not created at all.
pub fn select_renderer(config: Config, preference: RendererPreference) -> GxResult<AnyRenderer> {
    match preference {
        RendererPreference::Software => {
            Renderer::new(SoftRasterizer::new(), config).map(AnyRenderer::Software)
        }
        RendererPreference::Wgpu => {
            create_wgpu_renderer(config).map(|r| AnyRenderer::Wgpu(Box::new(r)))
        }
        RendererPreference::Auto => match create_wgpu_renderer(config.clone()) {
            Ok(renderer) => Ok(AnyRenderer::Wgpu(Box::new(renderer))),
            Err(e) => {
                tracing::warn!("wgpu renderer unavailable ({}), using software rasterizer", e);
                Renderer::new(SoftRasterizer::new(), config).map(AnyRenderer::Software)
            }
        },
    }
}
