//! Backend-independent 3D core
//!
//! # Architecture
//!
//! **RenderState + GeometryList** → **FrameState** → **GxCommand list** → **Rasterizer**
//!
//! - `Renderer` snapshots settings and render state into a `FrameState`
//! - the polygon drawer turns the draw list into fixed-function state
//!   changes and draws, encoding the console rules in the stencil byte
//! - post-process passes (edge marking, fog) are appended as full-screen calls
//! - a `Rasterizer` (wgpu or software) replays the commands and reads back

mod clear;
mod command;
mod draw;
mod frame_state;
mod framebuffer;
mod index_buffer;
mod output;
mod pipeline_state;
mod postprocess;
mod rasterizer;
mod renderer;
mod variant;

pub use clear::{ClearTargets, clear_command, clear_image_index};
pub use command::{
    Attachment, ClearSource, DrawCall, FullscreenCall, FullscreenProgram, GxCommand, IndexRange,
    PolygonUniforms, Primitive, TextureBinding,
};
pub use draw::{DEPTH_EQUAL_TOLERANCE, DrawMode, FrameCommands, PolygonDrawer, build_frame};
pub use frame_state::FrameState;
pub use framebuffer::{FramebufferDesc, FramebufferOrigin};
pub use index_buffer::{IndexBuffer, PolygonSpan};
pub use output::{pack_5551, pack_main, pack_pixel};
pub use pipeline_state::{
    ColorMask, CompareFunction, DrawState, StencilOperation, StencilOutcome, StencilState,
};
pub use postprocess::postprocess_commands;
pub use rasterizer::{FrameGeometry, Rasterizer};
pub use renderer::{Renderer, ResizeClient};
pub use variant::{FogProgramCache, GeometryFlags, ProgramSettings, VariantCache};

#[cfg(test)]
pub(crate) use rasterizer::CommandRecorder;
