//! Global 3D state supplied alongside each frame's geometry

use serde::{Deserialize, Serialize};

use crate::color::rgba5551_to_rgba8;
use crate::edge::EDGE_COLOR_COUNT;
use crate::fog::FOG_TABLE_LEN;
use crate::polygon::{NATIVE_HEIGHT, NATIVE_WIDTH};

/// Number of entries in the toon table.
pub const TOON_TABLE_LEN: usize = 32;

/// Largest 24-bit depth value.
pub const DEPTH_MAX: u32 = 0x00FF_FFFF;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToonShading {
    #[default]
    Toon,
    Highlight,
}

/// Constant clear values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClearValues {
    /// RGBA6665
    pub color: [u8; 4],
    /// 24-bit depth
    pub depth: u32,
    pub polygon_id: u8,
    pub fog: bool,
}

impl Default for ClearValues {
    fn default() -> Self {
        Self {
            color: [0, 0, 0, 0],
            depth: DEPTH_MAX,
            polygon_id: 0,
            fog: false,
        }
    }
}

impl ClearValues {
    pub fn depth_normalized(&self) -> f32 {
        (self.depth & DEPTH_MAX) as f32 / DEPTH_MAX as f32
    }
}

/// Native-resolution clear image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClearImage {
    /// RGBA5551, 256x192, rows top to bottom.
    pub color: Vec<u16>,
    /// 24-bit depth, same layout.
    pub depth: Vec<u32>,
    /// Per-pixel fog enable, same layout.
    pub fog: Vec<bool>,
}

impl ClearImage {
    pub const PIXELS: usize = (NATIVE_WIDTH * NATIVE_HEIGHT) as usize;

    pub fn is_complete(&self) -> bool {
        self.color.len() == Self::PIXELS
            && self.depth.len() == Self::PIXELS
            && self.fog.len() == Self::PIXELS
    }

    pub fn color_rgba8(&self, index: usize) -> [u8; 4] {
        rgba5551_to_rgba8(self.color[index])
    }

    pub fn depth_normalized(&self, index: usize) -> f32 {
        (self.depth[index] & DEPTH_MAX) as f32 / DEPTH_MAX as f32
    }
}

/// Per-frame global 3D state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderState {
    pub enable_alpha_blending: bool,
    pub enable_alpha_test: bool,
    /// 0-31
    pub alpha_test_ref: u8,
    pub enable_antialiasing: bool,
    pub enable_edge_marking: bool,
    pub enable_fog: bool,
    pub enable_fog_alpha_only: bool,
    /// RGB555 in bits 0-14, 5-bit alpha in bits 16-20
    pub fog_color: u32,
    pub fog_offset: u16,
    pub fog_shift: u8,
    /// Raw 7-bit densities
    pub fog_density: [u8; FOG_TABLE_LEN],
    /// RGB555
    pub edge_mark_colors: [u16; EDGE_COLOR_COUNT],
    /// RGB555
    pub toon_table: [u16; TOON_TABLE_LEN],
    pub toon_shading: ToonShading,
    pub w_buffer: bool,
    pub clear: ClearValues,
    pub clear_image: Option<ClearImage>,
}

impl Default for RenderState {
    fn default() -> Self {
        Self {
            enable_alpha_blending: true,
            enable_alpha_test: false,
            alpha_test_ref: 0,
            enable_antialiasing: false,
            enable_edge_marking: false,
            enable_fog: false,
            enable_fog_alpha_only: false,
            fog_color: 0,
            fog_offset: 0,
            fog_shift: 0,
            fog_density: [0; FOG_TABLE_LEN],
            edge_mark_colors: [0; EDGE_COLOR_COUNT],
            toon_table: [0; TOON_TABLE_LEN],
            toon_shading: ToonShading::Toon,
            w_buffer: false,
            clear: ClearValues::default(),
            clear_image: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clear_depth_normalized() {
        let clear = ClearValues {
            depth: DEPTH_MAX,
            ..Default::default()
        };
        assert_eq!(clear.depth_normalized(), 1.0);
    }

    #[test]
    fn test_clear_image_completeness() {
        let image = ClearImage {
            color: vec![0; ClearImage::PIXELS],
            depth: vec![0; ClearImage::PIXELS],
            fog: vec![false; 4],
        };
        assert!(!image.is_complete());
    }

    #[test]
    fn test_partial_state_json() {
        let state: RenderState = serde_json::from_str(r#"{"enable_fog": true, "fog_shift": 3}"#).unwrap();
        assert!(state.enable_fog);
        assert_eq!(state.fog_shift, 3);
        assert!(state.enable_alpha_blending);
    }
}
