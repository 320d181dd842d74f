//! Color format conversions
//!
//! Channel layouts used by the 3D core:
//! - RGB555 / RGBA5551: bits 0-4 red, 5-9 green, 10-14 blue, bit 15 alpha
//! - RGBA6665: 6-bit color channels with a 5-bit alpha, one channel per byte
//! - RGBA8888: straight 8-bit channels

use serde::{Deserialize, Serialize};

/// Precision of the main output buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormat {
    #[default]
    Rgba6665,
    Rgba8888,
}

/// Expand a 5-bit channel to 8 bits.
#[inline]
pub const fn expand_5bit(value: u16) -> u8 {
    let v = (value & 0x1F) as u8;
    (v << 3) | (v >> 2)
}

/// Convert a float channel to unorm8 with round-to-nearest.
#[inline]
pub fn unorm8(value: f32) -> u8 {
    (value.clamp(0.0, 1.0) * 255.0).round() as u8
}

#[inline]
pub fn unorm8_to_f32(value: u8) -> f32 {
    f32::from(value) / 255.0
}

pub fn rgba8_to_f32(color: [u8; 4]) -> [f32; 4] {
    color.map(unorm8_to_f32)
}

pub fn f32_to_rgba8(color: [f32; 4]) -> [u8; 4] {
    color.map(unorm8)
}

/// RGB555 with a separate 8-bit alpha to RGBA8888.
pub const fn rgb555_to_rgba8(color: u16, alpha: u8) -> [u8; 4] {
    [
        expand_5bit(color),
        expand_5bit(color >> 5),
        expand_5bit(color >> 10),
        alpha,
    ]
}

/// RGBA5551 to RGBA8888; the alpha bit maps to 0 or 255.
pub const fn rgba5551_to_rgba8(color: u16) -> [u8; 4] {
    let alpha = if color & 0x8000 != 0 { 0xFF } else { 0x00 };
    rgb555_to_rgba8(color, alpha)
}

/// RGBA6665 channels normalized to 0..1 (6-bit color over 63, 5-bit alpha over 31).
pub fn rgba6665_to_f32(color: [u8; 4]) -> [f32; 4] {
    [
        f32::from(color[0] & 0x3F) / 63.0,
        f32::from(color[1] & 0x3F) / 63.0,
        f32::from(color[2] & 0x3F) / 63.0,
        f32::from(color[3] & 0x1F) / 31.0,
    ]
}

/// Reduce RGBA8888 to RGBA6665.
#[inline]
pub const fn rgba8_to_6665(color: [u8; 4]) -> [u8; 4] {
    [color[0] >> 2, color[1] >> 2, color[2] >> 2, color[3] >> 3]
}

/// Reduce RGBA8888 to RGBA5551. Any non-zero alpha sets the alpha bit.
#[inline]
pub const fn rgba8_to_5551(color: [u8; 4]) -> u16 {
    let r = (color[0] >> 3) as u16;
    let g = (color[1] >> 3) as u16;
    let b = (color[2] >> 3) as u16;
    let a = if color[3] != 0 { 0x8000 } else { 0 };
    r | (g << 5) | (b << 10) | a
}

/// Decode the packed fog color word: RGB555 in bits 0-14, 5-bit alpha in bits 16-20.
pub fn fog_color_to_f32(color: u32) -> [f32; 4] {
    [
        (color & 0x1F) as f32 / 31.0,
        ((color >> 5) & 0x1F) as f32 / 31.0,
        ((color >> 10) & 0x1F) as f32 / 31.0,
        ((color >> 16) & 0x1F) as f32 / 31.0,
    ]
}
