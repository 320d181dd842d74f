//! Rasterizer command model
//!
//! The draw state machine never talks to a device directly. It emits a flat
//! list of [`GxCommand`]s, each carrying the complete fixed-function state
//! and uniforms it needs, and a [`Rasterizer`](super::Rasterizer) replays
//! them in order.

use gx_common::{FogProgramKey, PolygonMode, Viewport, WrapMode};

use super::pipeline_state::DrawState;
use super::variant::GeometryFlags;

// =============================================================================
// Geometry draws
// =============================================================================

/// Primitive type of an indexed draw.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Primitive {
    Triangles,
    /// Closed wireframe outlines, expanded to line lists
    Lines,
}

/// Range in the frame's index buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct IndexRange {
    pub first: u32,
    pub count: u32,
}

impl IndexRange {
    pub fn end(&self) -> u32 {
        self.first + self.count
    }
}

/// Texture binding for one polygon.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureBinding {
    /// `None` samples white.
    pub handle: Option<u32>,
    /// Texels are either fully transparent or fully opaque
    pub single_bit_alpha: bool,
    pub wrap_s: WrapMode,
    pub wrap_t: WrapMode,
    pub linear_filter: bool,
}

impl Default for TextureBinding {
    fn default() -> Self {
        Self {
            handle: None,
            single_bit_alpha: false,
            wrap_s: WrapMode::Clamp,
            wrap_t: WrapMode::Clamp,
            linear_filter: false,
        }
    }
}

/// Per-draw inputs of the geometry program.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PolygonUniforms {
    pub mode: PolygonMode,
    /// Polygon alpha, 1.0 for wireframes
    pub alpha: f32,
    pub polygon_id: u8,
    pub wireframe: bool,
    pub fog: bool,
    pub back_facing: bool,
    /// Added to the fragment depth; non-zero only during tolerance passes
    pub depth_offset: f32,
    /// Discard texels that are not fully opaque (except in decal mode)
    pub draw_opaque_texels: bool,
    /// Discard fragments that would tie with an opaque back face
    pub depth_equals_test: bool,
    /// Shadow paint pass: shadow polygons only produce color here
    pub draw_shadow: bool,
    pub texture: TextureBinding,
    pub viewport: Viewport,
}

impl Default for PolygonUniforms {
    fn default() -> Self {
        Self {
            mode: PolygonMode::Modulation,
            alpha: 1.0,
            polygon_id: 0,
            wireframe: false,
            fog: false,
            back_facing: false,
            depth_offset: 0.0,
            draw_opaque_texels: false,
            depth_equals_test: false,
            draw_shadow: false,
            texture: TextureBinding::default(),
            viewport: Viewport::default(),
        }
    }
}

impl PolygonUniforms {
    /// Shadow polygons only reach the G-buffer during their paint pass.
    pub fn is_drawable(&self) -> bool {
        self.mode != PolygonMode::Shadow || self.draw_shadow
    }
}

/// One indexed geometry draw.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DrawCall {
    pub state: DrawState,
    pub flags: GeometryFlags,
    pub primitive: Primitive,
    pub range: IndexRange,
    pub uniforms: PolygonUniforms,
}

// =============================================================================
// Full-screen passes
// =============================================================================

/// G-buffer color attachments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Attachment {
    Color,
    PolygonId,
    FogAttributes,
    /// Back-facing mask during geometry, fog output afterwards
    Working,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FullscreenProgram {
    /// Discards pixels whose color alpha is zero; stencil-only output
    ZeroAlphaMask,
    /// Edge color from identity and depth of the four neighbors
    EdgeMark,
    /// Fogged copy of the color attachment
    Fog(FogProgramKey),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FullscreenCall {
    pub program: FullscreenProgram,
    pub state: DrawState,
    /// `None` writes no color at all
    pub target: Option<Attachment>,
}

// =============================================================================
// Commands
// =============================================================================

/// Where the frame clear takes its values from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClearSource {
    Values,
    Image,
}

#[derive(Debug, Clone, PartialEq)]
pub enum GxCommand {
    /// Clear every attachment from the frame's clear values or clear image.
    Clear(ClearSource),
    /// Clear the stencil bits selected by `write_mask` to `value`.
    ClearStencil { value: u8, write_mask: u8 },
    Draw(DrawCall),
    Fullscreen(FullscreenCall),
    /// Make the color attachment sampleable mid-frame (multisample resolve).
    ResolveColor,
    /// Make the back-facing mask readable by translucent draws.
    ResolveWorkingBackFacing,
    /// Resolve geometry attachments before post-processing.
    ResolveGeometry,
}

impl GxCommand {
    pub fn as_draw(&self) -> Option<&DrawCall> {
        match self {
            GxCommand::Draw(call) => Some(call),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shadow_drawable_only_in_paint_pass() {
        let mut uniforms = PolygonUniforms {
            mode: PolygonMode::Shadow,
            ..Default::default()
        };
        assert!(!uniforms.is_drawable());
        uniforms.draw_shadow = true;
        assert!(uniforms.is_drawable());
        assert!(PolygonUniforms::default().is_drawable());
    }

    #[test]
    fn test_index_range_end() {
        let range = IndexRange { first: 6, count: 9 };
        assert_eq!(range.end(), 15);
    }
}
