//! Geometry fragment program
//!
//! Evaluates one geometry variant for one fragment: texture fetch, polygon
//! mode combine, discard rules and the auxiliary G-buffer outputs.

use glam::{Vec2, Vec3, Vec4};
use gx_common::color::rgba8_to_f32;
use gx_common::{MAX_POLYGON_ID, PolygonMode, TOON_TABLE_LEN, TextureImage, WrapMode};

use crate::graphics::{GeometryFlags, PolygonUniforms, ProgramSettings, TextureBinding};

/// Per-draw inputs shared by every fragment.
pub struct ShadeContext<'a> {
    pub settings: &'a ProgramSettings,
    pub flags: GeometryFlags,
    pub uniforms: &'a PolygonUniforms,
    pub texture: Option<&'a TextureImage>,
    pub toon_colors: &'a [[f32; 4]; TOON_TABLE_LEN],
    pub alpha_test_ref: f32,
}

/// Interpolated varyings.
#[derive(Debug, Clone, Copy)]
pub struct Varyings {
    /// Vertex color, 0..1
    pub color: Vec3,
    /// Texture coordinate in texels
    pub tex_coord: Vec2,
}

/// Values written to each G-buffer attachment.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FragmentOutput {
    pub color: [f32; 4],
    pub polygon_id: [f32; 4],
    pub fog: [f32; 4],
    pub working: [f32; 4],
}

impl ShadeContext<'_> {
    /// Shade one fragment. `None` means the fragment is discarded.
    ///
    /// `dst_back_facing` is the resolved back-facing flag under the fragment.
    pub fn shade(&self, varyings: Varyings, dst_back_facing: bool) -> Option<FragmentOutput> {
        let u = self.uniforms;

        if self.settings.depth_lequal_facing
            && !self.flags.contains(GeometryFlags::OPAQUE_DRAW)
            && u.depth_equals_test
            && (u.back_facing || !dst_back_facing)
        {
            return None;
        }

        let textured = self.flags.contains(GeometryFlags::TEXTURE_SAMPLING) && self.texture.is_some();
        let mut texel = match self.texture {
            Some(image) if textured => sample(image, &u.texture, varyings.tex_coord),
            _ => Vec4::ONE,
        };

        if !u.texture.single_bit_alpha {
            if u.draw_opaque_texels && u.mode != PolygonMode::Decal && texel.w <= 0.999 {
                return None;
            }
        } else if self.settings.texture_smoothing {
            if texel.w < 0.5 {
                texel.w = 0.0;
            } else {
                texel = (texel.truncate() / texel.w).extend(1.0);
            }
        }

        let vertex = varyings.color.extend(u.alpha);
        let mut color = texel * vertex;

        match u.mode {
            PolygonMode::Decal => {
                let rgb = if textured {
                    vertex.truncate().lerp(texel.truncate(), texel.w)
                } else {
                    vertex.truncate()
                };
                color = rgb.extend(vertex.w);
            }
            PolygonMode::ToonHighlight => {
                let toon = Vec4::from(self.toon_colors[toon_index(vertex.x)]).truncate();
                let rgb = if self.flags.contains(GeometryFlags::TOON_HIGHLIGHT) {
                    (texel.truncate() * vertex.x + toon).min(Vec3::ONE)
                } else {
                    texel.truncate() * toon
                };
                color = rgb.extend(color.w);
            }
            PolygonMode::Shadow if u.draw_shadow => color = vertex,
            _ => {}
        }

        let drawable = u.is_drawable();
        if drawable
            && (color.w < 0.001
                || (self.flags.contains(GeometryFlags::ALPHA_TEST) && color.w < self.alpha_test_ref))
        {
            return None;
        }

        let opaque = color.w > 0.999;
        let (polygon_id, fog) = if drawable {
            (
                [
                    f32::from(u.polygon_id) / f32::from(MAX_POLYGON_ID),
                    f32::from(u8::from(u.wireframe)),
                    0.0,
                    f32::from(u8::from(opaque)),
                ],
                [
                    f32::from(u8::from(u.fog)),
                    0.0,
                    0.0,
                    if opaque { 1.0 } else { 0.5 },
                ],
            )
        } else {
            ([0.0; 4], [0.0; 4])
        };

        Some(FragmentOutput {
            color: color.clamp(Vec4::ZERO, Vec4::ONE).to_array(),
            polygon_id,
            fog,
            working: [f32::from(u8::from(u.back_facing)), 0.0, 0.0, 1.0],
        })
    }
}

/// Toon table entry selected by the vertex red channel.
fn toon_index(red: f32) -> usize {
    ((red * TOON_TABLE_LEN as f32) as usize).min(TOON_TABLE_LEN - 1)
}

// =============================================================================
// Texture sampling
// =============================================================================

fn wrap(coord: i64, size: u32, mode: WrapMode) -> u32 {
    let size = i64::from(size.max(1));
    let wrapped = match mode {
        WrapMode::Clamp => coord.clamp(0, size - 1),
        WrapMode::Repeat => coord.rem_euclid(size),
        WrapMode::MirrorRepeat => {
            let period = coord.rem_euclid(size * 2);
            if period < size { period } else { size * 2 - 1 - period }
        }
    };
    wrapped as u32
}

fn fetch(image: &TextureImage, binding: &TextureBinding, x: i64, y: i64) -> Vec4 {
    let x = wrap(x, image.width, binding.wrap_s);
    let y = wrap(y, image.height, binding.wrap_t);
    Vec4::from(rgba8_to_f32(image.texel(x, y)))
}

/// Sample `image` at a texel-space coordinate.
pub fn sample(image: &TextureImage, binding: &TextureBinding, coord: Vec2) -> Vec4 {
    if image.width == 0 || image.height == 0 {
        return Vec4::ONE;
    }

    if !binding.linear_filter {
        return fetch(image, binding, coord.x.floor() as i64, coord.y.floor() as i64);
    }

    let p = coord - Vec2::splat(0.5);
    let base = p.floor();
    let t = p - base;
    let (x0, y0) = (base.x as i64, base.y as i64);

    let top = fetch(image, binding, x0, y0).lerp(fetch(image, binding, x0 + 1, y0), t.x);
    let bottom = fetch(image, binding, x0, y0 + 1).lerp(fetch(image, binding, x0 + 1, y0 + 1), t.x);
    top.lerp(bottom, t.y)
}
