//! Triangle and line rasterization
//!
//! Window coordinates follow the GL convention: origin bottom-left, pixel
//! centers at half-integers, depth mapped from [-1, 1] to [0, 1]. Fragments
//! are produced in index order so stencil updates from earlier triangles of
//! a draw are visible to later ones.

use glam::{Vec2, Vec3};
use gx_common::Vertex;

use super::buffers::{GBuffer, depth_to_fixed};
use super::shading::{FragmentOutput, ShadeContext, Varyings};
use crate::graphics::{ColorMask, DrawCall, DrawState, GeometryFlags, Primitive, ProgramSettings};

/// Vertex after the viewport transform, attributes pre-divided by w.
#[derive(Debug, Clone, Copy)]
struct WindowVertex {
    position: Vec2,
    z: f32,
    inv_w: f32,
    color: Vec3,
    tex_coord: Vec2,
}

impl WindowVertex {
    fn new(vertex: &Vertex, viewport: [f32; 4]) -> Option<Self> {
        let [x, y, z, w] = vertex.position;
        if w <= 0.0 {
            return None;
        }
        let inv_w = 1.0 / w;
        let [vx, vy, vw, vh] = viewport;
        Some(Self {
            position: Vec2::new(
                vx + (x * inv_w + 1.0) * 0.5 * vw,
                vy + (y * inv_w + 1.0) * 0.5 * vh,
            ),
            z: (z * inv_w + 1.0) * 0.5,
            inv_w,
            color: vertex.color_normalized() * inv_w,
            tex_coord: Vec2::from(vertex.tex_coord) * inv_w,
        })
    }
}

/// Pixel rectangle `[x0, y0, x1, y1)` fragments may land in.
#[derive(Debug, Clone, Copy)]
struct Scissor {
    x0: i32,
    y0: i32,
    x1: i32,
    y1: i32,
}

impl Scissor {
    fn new(viewport: [f32; 4], width: u32, height: u32) -> Self {
        let [vx, vy, vw, vh] = viewport;
        Self {
            x0: (vx.floor() as i32).max(0),
            y0: (vy.floor() as i32).max(0),
            x1: ((vx + vw).ceil() as i32).min(width as i32),
            y1: ((vy + vh).ceil() as i32).min(height as i32),
        }
    }

    fn contains(&self, x: i32, y: i32) -> bool {
        x >= self.x0 && x < self.x1 && y >= self.y0 && y < self.y1
    }
}

/// Rasterize one geometry draw into the G-buffer.
pub fn draw(
    gbuffer: &mut GBuffer,
    call: &DrawCall,
    ctx: &ShadeContext<'_>,
    vertices: &[Vertex],
    indices: &[u32],
) {
    let start = call.range.first as usize;
    let end = (call.range.end() as usize).min(indices.len());
    if start >= end {
        return;
    }

    let viewport = call.uniforms.viewport.scaled(gbuffer.width, gbuffer.height);
    let scissor = Scissor::new(viewport, gbuffer.width, gbuffer.height);
    let window = |index: u32| {
        vertices
            .get(index as usize)
            .and_then(|v| WindowVertex::new(v, viewport))
    };

    let mut target = Target {
        gbuffer,
        call,
        ctx,
        scissor,
    };

    match call.primitive {
        Primitive::Triangles => {
            for tri in indices[start..end].chunks_exact(3) {
                if let (Some(a), Some(b), Some(c)) = (window(tri[0]), window(tri[1]), window(tri[2])) {
                    target.triangle(a, b, c);
                }
            }
        }
        Primitive::Lines => {
            for line in indices[start..end].chunks_exact(2) {
                if let (Some(a), Some(b)) = (window(line[0]), window(line[1])) {
                    target.line(a, b);
                }
            }
        }
    }
}

/// Fragment depth as written by the geometry program.
pub fn fragment_depth(settings: &ProgramSettings, flags: GeometryFlags, z: f32, w: f32, offset: f32) -> f32 {
    if !settings.writes_fragment_depth(flags) {
        return z.clamp(0.0, 1.0);
    }
    let depth = if flags.contains(GeometryFlags::W_DEPTH) {
        w * (4096.0 / 16_777_215.0)
    } else {
        // Low bits dropped to match the console's z precision
        (z * 4_194_303.0).floor() * (4.0 / 16_777_215.0)
    };
    (depth + offset).clamp(0.0, 1.0)
}

/// Write `src` into `dst` under the color mask, blending with the source
/// alpha and keeping the larger alpha.
#[inline]
pub fn write_color(dst: &mut [f32; 4], src: [f32; 4], mask: ColorMask, blend: bool) {
    if mask == ColorMask::None {
        return;
    }
    let value = if blend {
        let a = src[3];
        [
            src[0] * a + dst[0] * (1.0 - a),
            src[1] * a + dst[1] * (1.0 - a),
            src[2] * a + dst[2] * (1.0 - a),
            src[3].max(dst[3]),
        ]
    } else {
        src
    };
    dst[..3].copy_from_slice(&value[..3]);
    if mask.writes_alpha() {
        dst[3] = value[3];
    }
}

/// Edge function; positive when `p` is left of `a -> b` with y up.
#[inline]
fn edge(a: Vec2, b: Vec2, p: Vec2) -> f32 {
    (b.x - a.x) * (p.y - a.y) - (b.y - a.y) * (p.x - a.x)
}

/// Pixels exactly on an edge belong to one of the two triangles sharing it.
#[inline]
fn owns_edge(a: Vec2, b: Vec2) -> bool {
    let d = b - a;
    d.y < 0.0 || (d.y == 0.0 && d.x > 0.0)
}

#[inline]
fn inside(e: f32, owner: bool) -> bool {
    e > 0.0 || (e == 0.0 && owner)
}

struct Target<'g, 'c> {
    gbuffer: &'g mut GBuffer,
    call: &'c DrawCall,
    ctx: &'c ShadeContext<'c>,
    scissor: Scissor,
}

impl Target<'_, '_> {
    fn triangle(&mut self, a: WindowVertex, b: WindowVertex, c: WindowVertex) {
        let area = edge(a.position, b.position, c.position);
        if area == 0.0 || !area.is_finite() {
            return;
        }
        // Counter-clockwise with y up
        let (b, c) = if area < 0.0 { (c, b) } else { (b, c) };
        let area = area.abs();

        let min = a.position.min(b.position).min(c.position);
        let max = a.position.max(b.position).max(c.position);
        let x0 = (min.x.floor() as i32).max(self.scissor.x0);
        let y0 = (min.y.floor() as i32).max(self.scissor.y0);
        let x1 = (max.x.ceil() as i32).min(self.scissor.x1);
        let y1 = (max.y.ceil() as i32).min(self.scissor.y1);

        let owners = [
            owns_edge(b.position, c.position),
            owns_edge(c.position, a.position),
            owns_edge(a.position, b.position),
        ];

        for y in y0..y1 {
            for x in x0..x1 {
                let p = Vec2::new(x as f32 + 0.5, y as f32 + 0.5);
                let e0 = edge(b.position, c.position, p);
                let e1 = edge(c.position, a.position, p);
                let e2 = edge(a.position, b.position, p);
                if !(inside(e0, owners[0]) && inside(e1, owners[1]) && inside(e2, owners[2])) {
                    continue;
                }
                let (l0, l1, l2) = (e0 / area, e1 / area, e2 / area);
                let z = a.z * l0 + b.z * l1 + c.z * l2;
                let inv_w = a.inv_w * l0 + b.inv_w * l1 + c.inv_w * l2;
                let varyings = Varyings {
                    color: (a.color * l0 + b.color * l1 + c.color * l2) / inv_w,
                    tex_coord: (a.tex_coord * l0 + b.tex_coord * l1 + c.tex_coord * l2) / inv_w,
                };
                self.fragment(x as u32, y as u32, z, 1.0 / inv_w, varyings);
            }
        }
    }

    fn line(&mut self, a: WindowVertex, b: WindowVertex) {
        let delta = b.position - a.position;
        let steps = delta.x.abs().max(delta.y.abs()).ceil().max(1.0) as u32;
        let mut last = None;

        // The end pixel is left to the next segment of the outline
        for step in 0..steps {
            let t = step as f32 / steps as f32;
            let p = a.position + delta * t;
            let pixel = (p.x.floor() as i32, p.y.floor() as i32);
            if last == Some(pixel) || !self.scissor.contains(pixel.0, pixel.1) {
                last = Some(pixel);
                continue;
            }
            last = Some(pixel);

            let inv_w = a.inv_w + (b.inv_w - a.inv_w) * t;
            let varyings = Varyings {
                color: a.color.lerp(b.color, t) / inv_w,
                tex_coord: a.tex_coord.lerp(b.tex_coord, t) / inv_w,
            };
            let z = a.z + (b.z - a.z) * t;
            self.fragment(pixel.0 as u32, pixel.1 as u32, z, 1.0 / inv_w, varyings);
        }
    }

    fn fragment(&mut self, x: u32, y: u32, z: f32, w: f32, varyings: Varyings) {
        let index = self.gbuffer.index(x, y);
        let Some(output) = self.ctx.shade(varyings, self.gbuffer.back_facing[index]) else {
            return;
        };

        let uniforms = &self.call.uniforms;
        let depth = fragment_depth(
            self.ctx.settings,
            self.call.flags,
            z,
            w,
            uniforms.depth_offset,
        );
        write_fragment(
            self.gbuffer,
            index,
            &self.call.state,
            self.call.flags,
            depth_to_fixed(depth),
            output,
        );
    }
}

/// Run the stencil and depth tests for one fragment and write what survives.
fn write_fragment(
    gbuffer: &mut GBuffer,
    index: usize,
    state: &DrawState,
    flags: GeometryFlags,
    depth: u32,
    output: FragmentOutput,
) {
    let stored_depth = gbuffer.depth[index];
    let passed = if state.stencil_test {
        let (stencil, passed) = state
            .stencil
            .process(gbuffer.stencil[index], || state.depth_passes(depth, stored_depth));
        gbuffer.stencil[index] = stencil;
        passed
    } else {
        state.depth_passes(depth, stored_depth)
    };
    if !passed {
        return;
    }

    if state.writes_depth() {
        gbuffer.depth[index] = depth;
    }

    let (mask, blend) = (state.color_mask, state.blend);
    write_color(&mut gbuffer.color[index], output.color, mask, blend);
    if flags.contains(GeometryFlags::EDGE_MARK) {
        write_color(&mut gbuffer.polygon_id[index], output.polygon_id, mask, blend);
    }
    if flags.contains(GeometryFlags::FOG) {
        write_color(&mut gbuffer.fog[index], output.fog, mask, blend);
    }
    if flags.contains(GeometryFlags::OPAQUE_DRAW) {
        write_color(&mut gbuffer.working[index], output.working, mask, blend);
    }
}
