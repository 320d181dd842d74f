//! GPU-side uniform and vertex layouts
//!
//! Mirrors the structs declared in `shaders/common.wgsl` and
//! `shaders/geometry.wgsl`.

use bytemuck::{Pod, Zeroable};
use gx_common::color::{rgba8_to_f32, unorm8_to_f32};
use gx_common::edge::EDGE_COLOR_COUNT;
use gx_common::{FOG_TABLE_LEN, MAX_POLYGON_ID, TOON_TABLE_LEN, Vertex};

use crate::graphics::{FrameState, PolygonUniforms};

/// Distance between polygon uniform records in the dynamic-offset buffer.
pub const POLYGON_UNIFORM_STRIDE: u64 = 256;

// Polygon flag bits, see POLY_* in geometry.wgsl
pub const POLY_WIREFRAME: u32 = 1 << 0;
pub const POLY_FOG: u32 = 1 << 1;
pub const POLY_BACK_FACING: u32 = 1 << 2;
pub const POLY_OPAQUE_TEXELS: u32 = 1 << 3;
pub const POLY_DEPTH_EQUALS_TEST: u32 = 1 << 4;
pub const POLY_DRAW_SHADOW: u32 = 1 << 5;
pub const POLY_SINGLE_BIT_ALPHA: u32 = 1 << 6;
pub const POLY_TEXTURED: u32 = 1 << 7;

/// Per-frame lookup tables and constants (group 0, binding 0).
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct FrameUniforms {
    pub toon_colors: [[f32; 4]; TOON_TABLE_LEN],
    pub edge_colors: [[f32; 4]; EDGE_COLOR_COUNT],
    /// Densities normalized to 0..1, four per vector
    pub fog_density: [[f32; 4]; FOG_TABLE_LEN / 4],
    pub fog_color: [f32; 4],
    /// x: alpha test reference, y: clear depth, z: fog alpha only
    pub params: [f32; 4],
    /// x: clear identity, y: framebuffer width, z: framebuffer height
    pub ids: [u32; 4],
}

impl FrameUniforms {
    pub fn new(frame: &FrameState) -> Self {
        let mut fog_density = [[0.0; 4]; FOG_TABLE_LEN / 4];
        for (index, &density) in frame.fog_density.iter().enumerate() {
            fog_density[index / 4][index % 4] = unorm8_to_f32(density);
        }

        Self {
            toon_colors: frame.toon_colors.map(rgba8_to_f32),
            edge_colors: frame.edge_colors.map(rgba8_to_f32),
            fog_density,
            fog_color: frame.fog_color,
            params: [
                frame.alpha_test_ref,
                frame.clear_depth(),
                if frame.fog_alpha_only { 1.0 } else { 0.0 },
                0.0,
            ],
            ids: [
                u32::from(frame.clear.polygon_id & MAX_POLYGON_ID),
                frame.width,
                frame.height,
                0,
            ],
        }
    }
}

/// Per-draw record (group 1, dynamic offset).
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct PolygonUniformData {
    /// x: alpha, y: identity / 63, z: depth offset
    pub values: [f32; 4],
    /// x: polygon mode, y: POLY_* bits
    pub params: [u32; 4],
    /// Framebuffer-space viewport, origin bottom-left
    pub viewport: [f32; 4],
}

impl PolygonUniformData {
    pub fn new(uniforms: &PolygonUniforms, width: u32, height: u32) -> Self {
        let texture = &uniforms.texture;
        let bits = [
            (uniforms.wireframe, POLY_WIREFRAME),
            (uniforms.fog, POLY_FOG),
            (uniforms.back_facing, POLY_BACK_FACING),
            (uniforms.draw_opaque_texels, POLY_OPAQUE_TEXELS),
            (uniforms.depth_equals_test, POLY_DEPTH_EQUALS_TEST),
            (uniforms.draw_shadow, POLY_DRAW_SHADOW),
            (texture.single_bit_alpha, POLY_SINGLE_BIT_ALPHA),
            (texture.handle.is_some(), POLY_TEXTURED),
        ]
        .into_iter()
        .filter(|(set, _)| *set)
        .fold(0, |acc, (_, bit)| acc | bit);

        Self {
            values: [
                uniforms.alpha,
                f32::from(uniforms.polygon_id) / f32::from(MAX_POLYGON_ID),
                uniforms.depth_offset,
                0.0,
            ],
            params: [uniforms.mode.as_u32(), bits, 0, 0],
            viewport: uniforms.viewport.scaled(width, height),
        }
    }
}

/// Vertex as consumed by the geometry program.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct GpuVertex {
    pub position: [f32; 4],
    pub tex_coord: [f32; 2],
    pub color: [f32; 3],
}

impl GpuVertex {
    pub const ATTRIBUTES: [wgpu::VertexAttribute; 3] =
        wgpu::vertex_attr_array![0 => Float32x4, 1 => Float32x2, 2 => Float32x3];

    pub fn layout() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<GpuVertex>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &Self::ATTRIBUTES,
        }
    }
}

impl From<&Vertex> for GpuVertex {
    fn from(vertex: &Vertex) -> Self {
        Self {
            position: vertex.position,
            tex_coord: vertex.tex_coord,
            color: vertex.color_normalized().to_array(),
        }
    }
}

/// Framebuffer scissor for a bottom-left viewport, as (x, y, width, height)
/// with a top-left origin. `None` when nothing of the viewport is visible.
pub fn scissor_rect(viewport: [f32; 4], width: u32, height: u32) -> Option<[u32; 4]> {
    let [vx, vy, vw, vh] = viewport;
    let x0 = (vx.floor() as i64).max(0);
    let y0 = (vy.floor() as i64).max(0);
    let x1 = ((vx + vw).ceil() as i64).min(i64::from(width));
    let y1 = ((vy + vh).ceil() as i64).min(i64::from(height));
    if x1 <= x0 || y1 <= y0 {
        return None;
    }
    Some([
        x0 as u32,
        (i64::from(height) - y1) as u32,
        (x1 - x0) as u32,
        (y1 - y0) as u32,
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use gx_common::{PolygonMode, RenderState, Viewport};

    use crate::graphics::TextureBinding;
    use crate::settings::FrameSettings;

    #[test]
    fn test_layout_sizes_match_wgsl() {
        assert_eq!(std::mem::size_of::<FrameUniforms>(), 816);
        assert_eq!(std::mem::size_of::<PolygonUniformData>(), 48);
        assert!(std::mem::size_of::<PolygonUniformData>() as u64 <= POLYGON_UNIFORM_STRIDE);
        assert_eq!(std::mem::size_of::<GpuVertex>(), 36);
    }

    #[test]
    fn test_polygon_bits() {
        let uniforms = PolygonUniforms {
            mode: PolygonMode::Shadow,
            polygon_id: 63,
            wireframe: true,
            back_facing: true,
            draw_shadow: true,
            texture: TextureBinding {
                handle: Some(2),
                single_bit_alpha: true,
                ..Default::default()
            },
            ..Default::default()
        };
        let data = PolygonUniformData::new(&uniforms, 256, 192);
        assert_eq!(data.params[0], 3);
        assert_eq!(
            data.params[1],
            POLY_WIREFRAME | POLY_BACK_FACING | POLY_DRAW_SHADOW | POLY_SINGLE_BIT_ALPHA | POLY_TEXTURED
        );
        assert_eq!(data.values[1], 1.0);
        assert_eq!(data.viewport, [0.0, 0.0, 256.0, 192.0]);
    }

    #[test]
    fn test_viewport_scales_with_framebuffer() {
        let uniforms = PolygonUniforms {
            viewport: Viewport {
                x: 16,
                y: 8,
                width: 128,
                height: 96,
            },
            ..Default::default()
        };
        let data = PolygonUniformData::new(&uniforms, 512, 384);
        assert_eq!(data.viewport, [32.0, 16.0, 256.0, 192.0]);
    }

    #[test]
    fn test_frame_uniforms_pack_density() {
        let mut state = RenderState::default();
        state.fog_density[5] = 127;
        state.clear.polygon_id = 9;
        let settings = FrameSettings {
            emulate_shadow_polygon: true,
            emulate_zero_dst_alpha: true,
            emulate_nds_depth: true,
            emulate_depth_lequal_facing: false,
            texture_smoothing: false,
            multisample_size: 0,
            edge_mark: true,
            fog: true,
            clear_image: false,
            output_format: gx_common::OutputFormat::Rgba6665,
        };
        let frame = FrameState::capture(&state, settings, 256, 192);
        let uniforms = FrameUniforms::new(&frame);
        assert_eq!(uniforms.fog_density[1][1], 1.0);
        assert_eq!(uniforms.fog_density[0][0], 0.0);
        assert_eq!(uniforms.ids, [9, 256, 192, 0]);
    }

    #[test]
    fn test_scissor_flips_to_top_left() {
        // Lower half of a 256x192 framebuffer
        assert_eq!(
            scissor_rect([0.0, 0.0, 256.0, 96.0], 256, 192),
            Some([0, 96, 256, 96])
        );
        // Clamped to the framebuffer
        assert_eq!(
            scissor_rect([-10.0, 150.0, 300.0, 100.0], 256, 192),
            Some([0, 0, 256, 42])
        );
        assert_eq!(scissor_rect([0.0, 0.0, 0.0, 10.0], 256, 192), None);
    }
}
