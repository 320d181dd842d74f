//! Polygon, vertex and viewport types produced by the geometry stage
//!
//! All of these are read-only inputs to the core; they arrive fully
//! transformed, clipped and sorted.

use bytemuck::{Pod, Zeroable};
use serde::{Deserialize, Serialize};

/// Native output width of the 3D core.
pub const NATIVE_WIDTH: u32 = 256;
/// Native output height of the 3D core.
pub const NATIVE_HEIGHT: u32 = 192;

/// Largest polygon identity (6 bits).
pub const MAX_POLYGON_ID: u8 = 63;
/// Largest polygon alpha (5 bits).
pub const MAX_POLYGON_ALPHA: u8 = 31;

// ============================================================================
// Attributes
// ============================================================================

/// How a polygon's vertex color combines with its texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolygonMode {
    #[default]
    Modulation = 0,
    Decal = 1,
    ToonHighlight = 2,
    Shadow = 3,
}

impl PolygonMode {
    pub fn from_u32(value: u32) -> Self {
        match value & 3 {
            0 => Self::Modulation,
            1 => Self::Decal,
            2 => Self::ToonHighlight,
            _ => Self::Shadow,
        }
    }

    pub fn as_u32(self) -> u32 {
        self as u32
    }
}

/// Per-polygon attribute word.
///
/// Two polygons with equal attributes share identical draw state, which is
/// what the draw loop uses to skip redundant state setup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PolygonAttributes {
    pub polygon_id: u8,
    #[serde(default)]
    pub mode: PolygonMode,
    /// 0 draws the polygon as a wireframe, 31 is opaque.
    pub alpha: u8,
    #[serde(default)]
    pub depth_equal_test: bool,
    #[serde(default)]
    pub translucent_depth_write: bool,
    #[serde(default)]
    pub fog: bool,
}

impl Default for PolygonAttributes {
    fn default() -> Self {
        Self {
            polygon_id: 0,
            mode: PolygonMode::Modulation,
            alpha: MAX_POLYGON_ALPHA,
            depth_equal_test: false,
            translucent_depth_write: false,
            fog: false,
        }
    }
}

impl PolygonAttributes {
    #[inline]
    pub fn is_wireframe(&self) -> bool {
        self.alpha == 0
    }

    #[inline]
    pub fn is_opaque(&self) -> bool {
        self.alpha == MAX_POLYGON_ALPHA
    }

    #[inline]
    pub fn is_shadow(&self) -> bool {
        self.mode == PolygonMode::Shadow
    }

    /// Alpha as seen by the fragment program. Wireframes draw at full alpha.
    pub fn alpha_normalized(&self) -> f32 {
        if self.is_wireframe() {
            1.0
        } else {
            f32::from(self.alpha) / f32::from(MAX_POLYGON_ALPHA)
        }
    }
}

// ============================================================================
// Topology
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Topology {
    #[default]
    Triangles,
    Quads,
    TriangleStrip,
    QuadStrip,
}

impl Topology {
    /// Number of vertices one polygon of this topology references.
    pub fn vertex_count(self) -> usize {
        match self {
            Self::Triangles | Self::TriangleStrip => 3,
            Self::Quads | Self::QuadStrip => 4,
        }
    }
}

// ============================================================================
// Texture parameters
// ============================================================================

/// Decoded texel format reported by the texture cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TexelFormat {
    #[default]
    None,
    A3I5,
    Palette4,
    Palette16,
    Palette256,
    Compressed4x4,
    A5I3,
    Direct,
}

impl TexelFormat {
    /// Formats carrying a per-texel translucent alpha; these need the
    /// alpha-keyed draw path that splits opaque and translucent texels.
    pub fn has_translucent_texels(self) -> bool {
        matches!(self, Self::A3I5 | Self::A5I3)
    }

    /// Formats whose alpha is either fully transparent or fully opaque.
    pub fn has_single_bit_alpha(self) -> bool {
        !self.has_translucent_texels()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct TextureParams {
    /// Index into the frame's texture set. `None` draws untextured.
    #[serde(default)]
    pub handle: Option<u32>,
    #[serde(default)]
    pub format: TexelFormat,
    #[serde(default)]
    pub repeat_s: bool,
    #[serde(default)]
    pub repeat_t: bool,
    #[serde(default)]
    pub mirror_s: bool,
    #[serde(default)]
    pub mirror_t: bool,
}

impl TextureParams {
    pub fn is_enabled(&self) -> bool {
        self.handle.is_some() && self.format != TexelFormat::None
    }
}

/// Wrapping behavior along one texture axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WrapMode {
    Clamp,
    Repeat,
    MirrorRepeat,
}

impl WrapMode {
    pub fn from_flags(repeat: bool, mirror: bool) -> Self {
        match (repeat, mirror) {
            (true, true) => Self::MirrorRepeat,
            (true, false) => Self::Repeat,
            _ => Self::Clamp,
        }
    }
}

// ============================================================================
// Viewport
// ============================================================================

/// Viewport in native 256x192 coordinates, origin at the bottom-left.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Viewport {
    pub x: u16,
    pub y: u16,
    pub width: u16,
    pub height: u16,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            x: 0,
            y: 0,
            width: NATIVE_WIDTH as u16,
            height: NATIVE_HEIGHT as u16,
        }
    }
}

impl Viewport {
    /// Scale the native viewport into a framebuffer of the given size.
    ///
    /// Returns `[x, y, width, height]` in framebuffer pixels, origin bottom-left.
    pub fn scaled(&self, framebuffer_width: u32, framebuffer_height: u32) -> [f32; 4] {
        let sx = framebuffer_width as f32 / NATIVE_WIDTH as f32;
        let sy = framebuffer_height as f32 / NATIVE_HEIGHT as f32;
        [
            f32::from(self.x) * sx,
            f32::from(self.y) * sy,
            f32::from(self.width) * sx,
            f32::from(self.height) * sy,
        ]
    }
}

// ============================================================================
// Vertices and polygons
// ============================================================================

/// A transformed vertex.
///
/// `position` is in clip space, `tex_coord` in texels and `color` holds
/// 6-bit channels (0-63).
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default, Pod, Zeroable, Serialize, Deserialize)]
pub struct Vertex {
    pub position: [f32; 4],
    #[serde(default)]
    pub tex_coord: [f32; 2],
    pub color: [u32; 3],
}

impl Vertex {
    pub fn new(position: [f32; 4], tex_coord: [f32; 2], color: [u32; 3]) -> Self {
        Self {
            position,
            tex_coord,
            color,
        }
    }

    /// Vertex color normalized to 0..1.
    pub fn color_normalized(&self) -> glam::Vec3 {
        glam::Vec3::new(
            self.color[0] as f32 / 63.0,
            self.color[1] as f32 / 63.0,
            self.color[2] as f32 / 63.0,
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Polygon {
    pub attributes: PolygonAttributes,
    #[serde(default)]
    pub topology: Topology,
    /// Indices into the frame's vertex list; only the first
    /// `topology.vertex_count()` entries are used.
    pub vertices: [u16; 4],
    #[serde(default)]
    pub texture: TextureParams,
    #[serde(default)]
    pub viewport: Viewport,
}

impl Polygon {
    pub fn vertex_indices(&self) -> &[u16] {
        &self.vertices[..self.topology.vertex_count()]
    }
}

/// One entry of the clipped, sorted draw list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClippedPolygon {
    /// Index into the polygon list.
    pub index: usize,
    #[serde(default)]
    pub back_facing: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wireframe_draws_at_full_alpha() {
        let attrs = PolygonAttributes {
            alpha: 0,
            ..Default::default()
        };
        assert!(attrs.is_wireframe());
        assert!(!attrs.is_opaque());
        assert_eq!(attrs.alpha_normalized(), 1.0);
    }

    #[test]
    fn test_alpha_normalized() {
        let attrs = PolygonAttributes {
            alpha: 15,
            ..Default::default()
        };
        assert!((attrs.alpha_normalized() - 15.0 / 31.0).abs() < 1e-6);
    }

    #[test]
    fn test_single_bit_alpha_formats() {
        assert!(TexelFormat::A3I5.has_translucent_texels());
        assert!(TexelFormat::A5I3.has_translucent_texels());
        assert!(TexelFormat::Palette16.has_single_bit_alpha());
        assert!(TexelFormat::Direct.has_single_bit_alpha());
    }

    #[test]
    fn test_viewport_scaling() {
        let viewport = Viewport {
            x: 16,
            y: 8,
            width: 128,
            height: 96,
        };
        assert_eq!(viewport.scaled(512, 384), [32.0, 16.0, 256.0, 192.0]);
    }

    #[test]
    fn test_wrap_mode_from_flags() {
        assert_eq!(WrapMode::from_flags(false, true), WrapMode::Clamp);
        assert_eq!(WrapMode::from_flags(true, false), WrapMode::Repeat);
        assert_eq!(WrapMode::from_flags(true, true), WrapMode::MirrorRepeat);
    }

    #[test]
    fn test_mode_from_u32() {
        assert_eq!(PolygonMode::from_u32(3), PolygonMode::Shadow);
        assert_eq!(PolygonMode::from_u32(5), PolygonMode::Decal);
    }
}
