//! Full-screen passes on the software G-buffer
//!
//! Each pass reads attachments it does not write, so rows are processed in
//! parallel with rayon.

use glam::Vec4;
use gx_common::color::rgba8_to_f32;
use gx_common::edge::{EDGE_COLOR_COUNT, edge_color_index};
use gx_common::fog::fog_weight;
use gx_common::{EdgeSample, EdgeSentinel, FogProgramKey, MAX_POLYGON_ID, detect_edge};
use rayon::prelude::*;

use super::buffers::{GBuffer, depth_to_normalized};
use super::raster::write_color;
use crate::graphics::{Attachment, DrawState, FrameState, FullscreenCall, FullscreenProgram};

pub fn run(gbuffer: &mut GBuffer, call: &FullscreenCall, frame: &FrameState) {
    match call.program {
        FullscreenProgram::ZeroAlphaMask => zero_alpha_mask(gbuffer, &call.state),
        FullscreenProgram::EdgeMark => edge_mark(gbuffer, call, frame),
        FullscreenProgram::Fog(key) => fog(gbuffer, call, frame, key),
    }
}

/// Stencil-only pass over every pixel whose color alpha is not zero.
fn zero_alpha_mask(gbuffer: &mut GBuffer, state: &DrawState) {
    if !state.writes_stencil() {
        return;
    }
    gbuffer
        .stencil
        .par_iter_mut()
        .zip(gbuffer.color.par_iter())
        .filter(|(_, color)| color[3] > 0.001)
        .for_each(|(stencil, _)| {
            // Full-screen passes never test depth
            let (value, _) = state.stencil.process(*stencil, || true);
            *stencil = value;
        });
}

fn identity_sample(gbuffer: &GBuffer, index: usize) -> EdgeSample {
    let info = gbuffer.polygon_id[index];
    EdgeSample {
        polygon_id: (info[0] * f32::from(MAX_POLYGON_ID) + 0.5) as u8,
        wireframe: info[1] != 0.0,
        depth: depth_to_normalized(gbuffer.depth[index]),
    }
}

/// Edge color for one pixel, transparent when it is not an edge.
fn edge_color(
    gbuffer: &GBuffer,
    x: u32,
    y: u32,
    sentinel: EdgeSentinel,
    colors: &[[f32; 4]; EDGE_COLOR_COUNT],
) -> [f32; 4] {
    let (w, h) = (gbuffer.width, gbuffer.height);
    let sample = |x: u32, y: u32| identity_sample(gbuffer, gbuffer.index(x, y));
    let neighbors = [
        (x + 1 < w).then(|| sample(x + 1, y)),
        (y + 1 < h).then(|| sample(x, y + 1)),
        (x > 0).then(|| sample(x - 1, y)),
        (y > 0).then(|| sample(x, y - 1)),
    ];
    detect_edge(sample(x, y), neighbors, sentinel)
        .map(|id| colors[edge_color_index(id)])
        .unwrap_or([0.0; 4])
}

fn edge_mark(gbuffer: &mut GBuffer, call: &FullscreenCall, frame: &FrameState) {
    if call.target.is_none() {
        return;
    }
    let sentinel = EdgeSentinel {
        polygon_id: frame.clear.polygon_id & MAX_POLYGON_ID,
        depth: frame.clear_depth(),
    };
    let colors = frame.edge_colors.map(rgba8_to_f32);
    let width = gbuffer.width as usize;
    let state = &call.state;

    let edges: Vec<[f32; 4]> = (0..gbuffer.len())
        .into_par_iter()
        .map(|i| {
            let (x, y) = ((i % width) as u32, (i / width) as u32);
            edge_color(gbuffer, x, y, sentinel, &colors)
        })
        .collect();

    gbuffer
        .color
        .par_iter_mut()
        .zip(gbuffer.stencil.par_iter_mut())
        .zip(edges.par_iter())
        .for_each(|((color, stencil), edge)| {
            if state.stencil_test {
                let (value, passed) = state.stencil.process(*stencil, || true);
                *stencil = value;
                if !passed {
                    return;
                }
            }
            write_color(color, *edge, state.color_mask, state.blend);
        });
}

fn fog(gbuffer: &mut GBuffer, call: &FullscreenCall, frame: &FrameState, key: FogProgramKey) {
    let target = call.target.unwrap_or(Attachment::Working);
    let fog_color = Vec4::from(frame.fog_color);
    let alpha_only = frame.fog_alpha_only;

    let fogged: Vec<[f32; 4]> = gbuffer
        .color
        .par_iter()
        .zip(gbuffer.depth.par_iter())
        .zip(gbuffer.fog.par_iter())
        .map(|((color, &depth), attributes)| {
            let color = Vec4::from(*color);
            if attributes[0] <= 0.999 {
                return color.to_array();
            }
            let weight = fog_weight(depth_to_normalized(depth), key, &frame.fog_density);
            let fog = if alpha_only {
                color.truncate().extend(fog_color.w)
            } else {
                fog_color
            };
            color.lerp(fog, weight).to_array()
        })
        .collect();

    let output = match target {
        Attachment::Color => &mut gbuffer.color,
        Attachment::PolygonId => &mut gbuffer.polygon_id,
        Attachment::FogAttributes => &mut gbuffer.fog,
        Attachment::Working => &mut gbuffer.working,
    };
    output
        .par_iter_mut()
        .zip(fogged.par_iter())
        .for_each(|(dst, &src)| write_color(dst, src, call.state.color_mask, call.state.blend));
}

#[cfg(test)]
mod tests {
    use super::*;
    use gx_common::{ClearValues, DEPTH_MAX, OutputFormat, RenderState};

    use crate::graphics::{ColorMask, CompareFunction, StencilOperation, StencilState};
    use crate::settings::FrameSettings;

    fn frame(state: &RenderState) -> FrameState {
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
            output_format: OutputFormat::Rgba8888,
        };
        FrameState::capture(state, settings, 4, 4)
    }

    fn cleared(width: u32, height: u32) -> GBuffer {
        let mut gbuffer = GBuffer::new(width, height).unwrap();
        for color in &mut gbuffer.color {
            *color = [0.0, 0.0, 0.0, 1.0];
        }
        gbuffer
    }

    fn edge_call(blend: bool) -> FullscreenCall {
        FullscreenCall {
            program: FullscreenProgram::EdgeMark,
            state: DrawState {
                blend,
                ..DrawState::fullscreen()
            },
            target: Some(Attachment::Color),
        }
    }

    #[test]
    fn test_zero_alpha_mask_marks_visible_pixels() {
        let mut gbuffer = cleared(2, 1);
        gbuffer.color[1][3] = 0.0;
        let state = DrawState {
            stencil_test: true,
            stencil: StencilState::new(CompareFunction::Always, 0x40, 0x40)
                .with_ops(
                    StencilOperation::Keep,
                    StencilOperation::Keep,
                    StencilOperation::Replace,
                )
                .with_write_mask(0x40),
            color_mask: ColorMask::None,
            ..DrawState::fullscreen()
        };
        gbuffer.stencil = vec![0x05, 0x05];
        zero_alpha_mask(&mut gbuffer, &state);
        assert_eq!(gbuffer.stencil, vec![0x45, 0x05]);
    }

    #[test]
    fn test_edge_mark_outlines_nearer_polygon() {
        let mut state = RenderState::default();
        state.edge_mark_colors[1] = 0x001F;
        state.enable_edge_marking = true;
        let frame = frame(&state);

        // Pixel (1, 1) holds identity 8 in front of the clear
        let mut gbuffer = cleared(4, 4);
        let center = gbuffer.index(1, 1);
        gbuffer.polygon_id[center] = [8.0 / 63.0, 0.0, 0.0, 1.0];
        gbuffer.depth[center] = DEPTH_MAX / 2;

        edge_mark(&mut gbuffer, &edge_call(true), &frame);

        // Farther neighbors take the polygon's edge color
        let right = gbuffer.index(2, 1);
        assert_eq!(gbuffer.color[right], [1.0, 0.0, 0.0, 1.0]);
        let up = gbuffer.index(1, 2);
        assert_eq!(gbuffer.color[up], [1.0, 0.0, 0.0, 1.0]);
        // The nearer polygon itself is not marked
        assert_eq!(gbuffer.color[center], [0.0, 0.0, 0.0, 1.0]);
        // Diagonal pixels are untouched
        let diagonal = gbuffer.index(2, 2);
        assert_eq!(gbuffer.color[diagonal], [0.0, 0.0, 0.0, 1.0]);
    }

    #[test]
    fn test_edge_mark_border_uses_clear_values() {
        let frame = frame(&RenderState {
            enable_edge_marking: true,
            ..Default::default()
        });
        let mut gbuffer = cleared(4, 4);
        let corner = gbuffer.index(0, 0);
        gbuffer.polygon_id[corner] = [1.0, 0.0, 0.0, 1.0];
        gbuffer.depth[corner] = 0;

        edge_mark(&mut gbuffer, &edge_call(false), &frame);
        // Identity 63 uses the last table entry (black by default, opaque)
        assert_eq!(gbuffer.color[corner], [0.0, 0.0, 0.0, 1.0]);
        // A non-edge pixel written unblended becomes transparent black
        let far_corner = gbuffer.index(3, 3);
        assert_eq!(gbuffer.color[far_corner], [0.0; 4]);
    }

    #[test]
    fn test_fog_only_on_fog_pixels() {
        let mut state = RenderState {
            enable_fog: true,
            fog_color: 0x1F | (31 << 16),
            // Threshold table: everything behind the offset is fully fogged
            fog_shift: 11,
            fog_offset: 0,
            clear: ClearValues {
                depth: DEPTH_MAX,
                ..Default::default()
            },
            ..Default::default()
        };
        state.fog_density = [127; 32];
        let frame = frame(&state);

        let mut gbuffer = cleared(2, 1);
        gbuffer.fog[0] = [1.0, 0.0, 0.0, 1.0];
        let call = FullscreenCall {
            program: FullscreenProgram::Fog(frame.fog_key),
            state: DrawState::fullscreen(),
            target: Some(Attachment::Working),
        };
        run(&mut gbuffer, &call, &frame);

        assert_eq!(gbuffer.working[0], frame.fog_color);
        assert_eq!(gbuffer.working[1], [0.0, 0.0, 0.0, 1.0]);
        // The color attachment itself is untouched
        assert_eq!(gbuffer.color[0], [0.0, 0.0, 0.0, 1.0]);
    }
}
