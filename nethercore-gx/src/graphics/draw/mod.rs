//! Polygon draw state machine
//!
//! The drawer keeps a persistent [`DrawState`] that it mutates the way a
//! fixed-function pipeline would, and snapshots it into a [`DrawCall`] for
//! every draw. All the console rules live in the stencil byte:
//!
//! - bits 0-5: identity of the last accepted fragment
//! - bit 6: that fragment was translucent (also the zero-alpha "touched" mark)
//! - bit 7: scratch mask for tolerance tests and shadow volumes
//!
//! Bit 7 is always zero again once a compositor returns.

mod compositors;
mod shadow;
mod zero_alpha;


use std::ops::Range;

use gx_common::{
    GeometryList, Polygon, PolygonAttributes, StencilByte, TextureSet, WrapMode,
};

use super::clear::clear_command;
use super::command::{
    Attachment, DrawCall, GxCommand, IndexRange, PolygonUniforms, Primitive, TextureBinding,
};
use super::frame_state::FrameState;
use super::index_buffer::IndexBuffer;
use super::pipeline_state::{ColorMask, CompareFunction, DrawState, StencilOperation};
use super::postprocess::postprocess_commands;
use super::variant::GeometryFlags;

/// Depth window, in normalized units, treated as "equal" by the depth-equal test.
pub const DEPTH_EQUAL_TOLERANCE: f32 = 255.0 / 16_777_215.0;

const ID_MASK: u8 = StencilByte::IDENTITY_MASK;
const TRANSLUCENT: u8 = StencilByte::TRANSLUCENT_BIT;
const SCRATCH: u8 = StencilByte::SCRATCH_BIT;
const TAG_MASK: u8 = StencilByte::TAG_MASK;

/// Which part of the draw list is being drawn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrawMode {
    Opaque,
    Translucent,
    /// Corrective pass over zero-alpha destinations; never changes identities
    ZeroAlpha,
}

/// Commands for one complete frame.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameCommands {
    pub commands: Vec<GxCommand>,
    /// Attachment holding the final image
    pub output: Attachment,
}

/// Emit the clear, geometry and post-process commands for one frame.
pub fn build_frame(
    frame: &FrameState,
    geometry: &GeometryList,
    indices: &IndexBuffer,
    textures: &TextureSet,
) -> FrameCommands {
    let mut drawer = PolygonDrawer::new(frame, geometry, indices, textures);
    drawer.push(clear_command(frame));
    drawer.render_geometry();

    let mut commands = drawer.into_commands();
    let output = postprocess_commands(frame, &mut commands);

    tracing::trace!(
        "Frame built: {} polygons, {} commands",
        geometry.clipped.len(),
        commands.len()
    );

    FrameCommands { commands, output }
}

pub struct PolygonDrawer<'a> {
    frame: &'a FrameState,
    geometry: &'a GeometryList,
    indices: &'a IndexBuffer,
    textures: &'a TextureSet,
    state: DrawState,
    flags: GeometryFlags,
    uniforms: PolygonUniforms,
    commands: Vec<GxCommand>,
}

impl<'a> PolygonDrawer<'a> {
    pub fn new(
        frame: &'a FrameState,
        geometry: &'a GeometryList,
        indices: &'a IndexBuffer,
        textures: &'a TextureSet,
    ) -> Self {
        Self {
            frame,
            geometry,
            indices,
            textures,
            state: DrawState {
                blend: frame.alpha_blending,
                ..Default::default()
            },
            flags: frame.base_flags,
            uniforms: PolygonUniforms::default(),
            commands: Vec::new(),
        }
    }

    pub fn into_commands(self) -> Vec<GxCommand> {
        self.commands
    }

    pub fn state(&self) -> &DrawState {
        &self.state
    }

    fn push(&mut self, command: GxCommand) {
        self.commands.push(command);
    }

    // =========================================================================
    // Pipeline state
    // =========================================================================

    fn depth_func(&mut self, compare: CompareFunction) {
        self.state.depth_compare = compare;
    }

    fn stencil_func(&mut self, compare: CompareFunction, reference: u8, read_mask: u8) {
        self.state.stencil.compare = compare;
        self.state.stencil.reference = reference;
        self.state.stencil.read_mask = read_mask;
    }

    /// Operations in (stencil fail, depth fail, pass) order.
    fn stencil_op(
        &mut self,
        fail: StencilOperation,
        depth_fail: StencilOperation,
        pass: StencilOperation,
    ) {
        self.state.stencil.fail_op = fail;
        self.state.stencil.depth_fail_op = depth_fail;
        self.state.stencil.pass_op = pass;
    }

    fn stencil_mask(&mut self, write_mask: u8) {
        self.state.stencil.write_mask = write_mask;
    }

    fn color_mask(&mut self, mask: ColorMask) {
        self.state.color_mask = mask;
    }

    fn depth_mask(&mut self, enabled: bool) {
        self.state.depth_write = enabled;
    }

    fn depth_offset(&mut self, offset: f32) {
        self.uniforms.depth_offset = offset;
    }

    fn draw(&mut self, primitive: Primitive, range: IndexRange) {
        self.commands.push(GxCommand::Draw(DrawCall {
            state: self.state,
            flags: self.flags,
            primitive,
            range,
            uniforms: self.uniforms,
        }));
    }

    /// Draw once with "draw opaque texels" enabled.
    fn draw_opaque_texels(&mut self, primitive: Primitive, range: IndexRange) {
        self.uniforms.draw_opaque_texels = true;
        self.draw(primitive, range);
        self.uniforms.draw_opaque_texels = false;
    }

    fn facing_emulated(&self) -> bool {
        self.frame.settings.emulate_depth_lequal_facing
    }

    fn tolerance_emulated(&self) -> bool {
        self.frame.settings.emulate_nds_depth
    }

    // =========================================================================
    // Per-polygon setup
    // =========================================================================

    /// Configure depth, stencil and write masks for a polygon.
    ///
    /// `will_change_stencil` is false only in the zero-alpha pass, which
    /// keeps its own stencil state.
    pub fn setup_polygon(
        &mut self,
        polygon: &Polygon,
        treat_as_translucent: bool,
        will_change_stencil: bool,
        back_facing: bool,
    ) {
        let attrs = &polygon.attributes;
        let id = attrs.polygon_id;

        self.depth_func(if attrs.depth_equal_test {
            CompareFunction::Equal
        } else {
            CompareFunction::Less
        });

        if will_change_stencil {
            if attrs.is_shadow() {
                if self.frame.settings.emulate_shadow_polygon {
                    if id == 0 {
                        // Volume build: mark bit 7 where the depth test fails
                        self.stencil_func(CompareFunction::Always, SCRATCH, SCRATCH);
                        self.stencil_op(
                            StencilOperation::Keep,
                            StencilOperation::Replace,
                            StencilOperation::Keep,
                        );
                    } else {
                        // Identity gate: clear bit 7 where the stored identity matches
                        self.stencil_func(CompareFunction::NotEqual, id, ID_MASK);
                        self.stencil_op(
                            StencilOperation::Zero,
                            StencilOperation::Keep,
                            StencilOperation::Keep,
                        );
                    }
                    self.stencil_mask(SCRATCH);
                    self.color_mask(ColorMask::None);
                    self.depth_mask(false);
                }
            } else {
                if treat_as_translucent {
                    self.stencil_func(
                        CompareFunction::NotEqual,
                        StencilByte::translucent_tag(id),
                        TAG_MASK,
                    );
                } else {
                    self.stencil_func(CompareFunction::Always, id, ID_MASK);
                }
                self.stencil_op(
                    StencilOperation::Keep,
                    StencilOperation::Keep,
                    StencilOperation::Replace,
                );
                // Non-shadow draws also reset any leftover shadow mask.
                self.stencil_mask(0xFF);
                self.color_mask(ColorMask::All);
                self.depth_mask(!treat_as_translucent || attrs.translucent_depth_write);
            }
        }

        self.uniforms.mode = attrs.mode;
        self.uniforms.fog = attrs.fog;
        self.uniforms.alpha = attrs.alpha_normalized();
        self.uniforms.polygon_id = id;
        self.uniforms.wireframe = attrs.is_wireframe();
        self.uniforms.depth_offset = 0.0;
        self.uniforms.back_facing = back_facing;
    }

    fn setup_texture(&mut self, polygon: &Polygon) {
        let params = &polygon.texture;
        let handle = params
            .handle
            .filter(|&handle| params.is_enabled() && self.textures.get(handle).is_some());

        self.uniforms.texture = match handle {
            None => TextureBinding::default(),
            Some(handle) => TextureBinding {
                handle: Some(handle),
                single_bit_alpha: params.format.has_single_bit_alpha(),
                wrap_s: WrapMode::from_flags(params.repeat_s, params.mirror_s),
                wrap_t: WrapMode::from_flags(params.repeat_t, params.mirror_t),
                linear_filter: self.frame.settings.texture_smoothing,
            },
        };
    }

    // =========================================================================
    // Draw loop
    // =========================================================================

    /// Draw a range of clipped entries, batching runs that share state.
    ///
    /// `index_offset` and `last_attrs` carry over between ranges so state
    /// setup is skipped when consecutive polygons share attributes.
    pub fn draw_range(
        &mut self,
        mode: DrawMode,
        entries: Range<usize>,
        index_offset: &mut u32,
        last_attrs: &mut PolygonAttributes,
    ) {
        let geometry = self.geometry;
        let indices = self.indices;
        let spans = &indices.spans;
        if entries.is_empty() {
            return;
        }

        let first = geometry.polygon(&geometry.clipped[entries.start]);
        let mut last_texture = first.texture;
        let mut last_viewport = first.viewport;
        self.setup_texture(first);
        self.uniforms.viewport = first.viewport;

        let mut pending = 0;

        for i in entries.clone() {
            let entry = geometry.clipped[i];
            let polygon = geometry.polygon(&entry);

            if *last_attrs != polygon.attributes {
                *last_attrs = polygon.attributes;
                self.setup_polygon(
                    polygon,
                    mode != DrawMode::Opaque,
                    mode != DrawMode::ZeroAlpha,
                    entry.back_facing,
                );
            }
            if last_texture != polygon.texture {
                last_texture = polygon.texture;
                self.setup_texture(polygon);
            }
            if last_viewport != polygon.viewport {
                last_viewport = polygon.viewport;
                self.uniforms.viewport = polygon.viewport;
            }
            self.uniforms.back_facing = entry.back_facing;

            let span = spans[i];
            pending += span.count;

            // Keep accumulating while the next polygon needs no state change.
            if i + 1 < entries.end {
                let next_entry = geometry.clipped[i + 1];
                let next = geometry.polygon(&next_entry);
                if *last_attrs == next.attributes
                    && last_texture == next.texture
                    && last_viewport == next.viewport
                    && span.primitive == Primitive::Triangles
                    && spans[i + 1].primitive == Primitive::Triangles
                    && entry.back_facing == next_entry.back_facing
                {
                    continue;
                }
            }

            let range = IndexRange {
                first: *index_offset,
                count: pending,
            };
            let attrs = polygon.attributes;

            if attrs.is_shadow() {
                if mode != DrawMode::ZeroAlpha && self.frame.settings.emulate_shadow_polygon {
                    self.draw_shadow_polygon(
                        span.primitive,
                        range,
                        &attrs,
                        mode == DrawMode::Translucent,
                    );
                }
            } else if polygon.texture.format.has_translucent_texels() {
                self.draw_alpha_texture_polygon(
                    mode,
                    span.primitive,
                    range,
                    &attrs,
                    attrs.is_wireframe() || attrs.is_opaque(),
                    !entry.back_facing,
                );
            } else {
                self.draw_other_polygon(mode, span.primitive, range, &attrs, !entry.back_facing);
            }

            *index_offset += pending;
            pending = 0;
        }
    }

    /// Draw the opaque entries, then the translucent entries.
    pub fn render_geometry(&mut self) {
        let geometry = self.geometry;

        self.state.depth_test = true;
        self.state.stencil_test = true;
        self.state.blend = self.frame.alpha_blending;

        if !geometry.is_empty() {
            let opaque_count = geometry.opaque().len();
            let count = geometry.clipped.len();
            let first_entry = geometry.clipped[0];
            let first = geometry.polygon(&first_entry);

            let mut last_attrs = first.attributes;
            let mut index_offset = 0;

            if opaque_count > 0 {
                self.setup_polygon(first, false, true, first_entry.back_facing);
                self.draw_range(
                    DrawMode::Opaque,
                    0..opaque_count,
                    &mut index_offset,
                    &mut last_attrs,
                );
            }

            if opaque_count < count {
                self.flags.set(GeometryFlags::OPAQUE_DRAW, false);

                if self.frame.zero_dst_alpha_pass() {
                    if opaque_count == 0 {
                        self.setup_polygon(first, true, false, first_entry.back_facing);
                    }
                    self.zero_dst_alpha_pass(opaque_count..count, index_offset, last_attrs);

                    if opaque_count > 0 {
                        let last_entry = geometry.clipped[opaque_count - 1];
                        let last = geometry.polygon(&last_entry);
                        last_attrs = last.attributes;
                        self.setup_polygon(last, false, true, last_entry.back_facing);
                    }
                } else {
                    // Translucent fragments mark themselves in bit 6.
                    self.push(GxCommand::ClearStencil {
                        value: 0,
                        write_mask: TRANSLUCENT,
                    });
                }

                if opaque_count == 0 {
                    self.setup_polygon(first, true, true, first_entry.back_facing);
                } else if self.facing_emulated() {
                    self.push(GxCommand::ResolveWorkingBackFacing);
                }

                self.draw_range(
                    DrawMode::Translucent,
                    opaque_count..count,
                    &mut index_offset,
                    &mut last_attrs,
                );
            }

            self.color_mask(ColorMask::All);
            self.depth_mask(true);
        }

        self.push(GxCommand::ResolveGeometry);
    }
}
