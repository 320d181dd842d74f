//! Alpha-keyed and general polygon compositors
//!
//! Both paths share the depth-equal tolerance protocol: two masked passes
//! mark bit 7 where the fragment lies within [`DEPTH_EQUAL_TOLERANCE`] of the
//! stored depth, a third pass draws through that mask with depth testing
//! off, and a final pass clears bit 7 again.

use gx_common::{PolygonAttributes, StencilByte};

use super::{
    DEPTH_EQUAL_TOLERANCE, DrawMode, ID_MASK, PolygonDrawer, SCRATCH, TAG_MASK, TRANSLUCENT,
};
use crate::graphics::command::{IndexRange, Primitive};
use crate::graphics::pipeline_state::{ColorMask, CompareFunction, StencilOperation};

impl PolygonDrawer<'_> {
    // =========================================================================
    // Shared passes
    // =========================================================================

    /// Mark bit 7 wherever the fragment is within the depth-equal window.
    ///
    /// The first pass keeps fragments no farther than the window, the
    /// second drops fragments nearer than it. With `opaque_texels` each
    /// pass is repeated for the polygon's fully opaque texels.
    fn mark_depth_window(&mut self, primitive: Primitive, range: IndexRange, opaque_texels: bool) {
        self.depth_offset(-DEPTH_EQUAL_TOLERANCE);
        self.depth_func(CompareFunction::LessEqual);
        self.stencil_func(CompareFunction::Always, SCRATCH, SCRATCH);
        self.stencil_op(
            StencilOperation::Zero,
            StencilOperation::Zero,
            StencilOperation::Replace,
        );
        self.stencil_mask(SCRATCH);
        self.draw(primitive, range);
        if opaque_texels {
            self.draw_opaque_texels(primitive, range);
        }

        self.depth_offset(DEPTH_EQUAL_TOLERANCE);
        self.depth_func(CompareFunction::GreaterEqual);
        self.stencil_func(CompareFunction::Equal, SCRATCH, SCRATCH);
        self.stencil_op(
            StencilOperation::Zero,
            StencilOperation::Zero,
            StencilOperation::Keep,
        );
        self.stencil_mask(SCRATCH);
        self.draw(primitive, range);
        if opaque_texels {
            self.draw_opaque_texels(primitive, range);
        }

        self.depth_offset(0.0);
    }

    /// Drop bit 7 from a masked region that `mark_depth_window` set up.
    fn gate_translucent_identity(&mut self, primitive: Primitive, range: IndexRange, id: u8) {
        self.stencil_func(
            CompareFunction::NotEqual,
            StencilByte::translucent_tag(id),
            TAG_MASK,
        );
        self.stencil_op(
            StencilOperation::Zero,
            StencilOperation::Zero,
            StencilOperation::Keep,
        );
        self.stencil_mask(SCRATCH);
        self.draw(primitive, range);
    }

    /// Set up the draw through the bit 7 mask: stamp identity and translucency into bits 0-6.
    fn stamp_through_mask(&mut self, id: u8, translucent: bool, depth_write: bool) {
        self.color_mask(ColorMask::All);
        self.depth_mask(depth_write);
        self.stencil_func(
            CompareFunction::Equal,
            StencilByte::stamp(id, translucent),
            SCRATCH,
        );
        self.stencil_op(
            StencilOperation::Keep,
            StencilOperation::Keep,
            StencilOperation::Replace,
        );
        self.stencil_mask(TAG_MASK);
    }

    /// Clear bit 7 over the polygon's coverage.
    fn clear_scratch(&mut self, primitive: Primitive, range: IndexRange, opaque_texels: bool) {
        self.stencil_func(CompareFunction::Always, SCRATCH, SCRATCH);
        self.stencil_op(
            StencilOperation::Keep,
            StencilOperation::Keep,
            StencilOperation::Zero,
        );
        self.stencil_mask(SCRATCH);
        self.color_mask(ColorMask::None);
        self.depth_mask(false);
        self.draw(primitive, range);
        if opaque_texels {
            self.draw_opaque_texels(primitive, range);
        }
    }

    /// Restore the per-polygon state `setup_polygon` established for a
    /// depth-equal polygon.
    fn restore_identity_state(&mut self, id: u8, translucent: bool, depth_write: bool) {
        self.depth_func(CompareFunction::Equal);
        if translucent {
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
        self.stencil_mask(0xFF);
        self.color_mask(ColorMask::All);
        self.depth_mask(depth_write);
    }

    /// Opaque draw that lets a front face win a depth tie against an opaque back face.
    ///
    /// Back faces tag themselves with bit 6; a front face at equal depth
    /// over such a pixel draws, then clears the tag.
    fn draw_opaque_with_facing(
        &mut self,
        primitive: Primitive,
        range: IndexRange,
        id: u8,
        front_facing: bool,
    ) {
        if !self.facing_emulated() {
            self.draw(primitive, range);
            return;
        }

        if front_facing {
            self.depth_func(CompareFunction::Equal);
            self.stencil_func(
                CompareFunction::Equal,
                StencilByte::translucent_tag(id),
                TRANSLUCENT,
            );
            self.draw(primitive, range);

            self.color_mask(ColorMask::None);
            self.depth_mask(false);
            self.stencil_op(
                StencilOperation::Keep,
                StencilOperation::Keep,
                StencilOperation::Zero,
            );
            self.stencil_mask(TRANSLUCENT);
            self.draw(primitive, range);

            self.color_mask(ColorMask::All);
            self.depth_mask(true);
            self.depth_func(CompareFunction::Less);
            self.stencil_func(CompareFunction::Always, id, ID_MASK);
            self.stencil_op(
                StencilOperation::Keep,
                StencilOperation::Keep,
                StencilOperation::Replace,
            );
            self.stencil_mask(0xFF);
            self.draw(primitive, range);
        } else {
            self.stencil_func(
                CompareFunction::Always,
                StencilByte::translucent_tag(id),
                TRANSLUCENT,
            );
            self.draw(primitive, range);
            self.stencil_func(CompareFunction::Always, id, ID_MASK);
        }
    }

    /// Front faces first try to land exactly on the depth they tie with.
    fn draw_facing_prepass(&mut self, primitive: Primitive, range: IndexRange, front_facing: bool) {
        if self.facing_emulated() && front_facing {
            self.depth_func(CompareFunction::Equal);
            self.uniforms.depth_equals_test = true;
            self.draw(primitive, range);
            self.depth_func(CompareFunction::Less);
            self.uniforms.depth_equals_test = false;
        }
    }

    // =========================================================================
    // Compositors
    // =========================================================================

    /// Polygons whose texture alpha is uniform (or absent).
    pub(super) fn draw_other_polygon(
        &mut self,
        mode: DrawMode,
        primitive: Primitive,
        range: IndexRange,
        attrs: &PolygonAttributes,
        front_facing: bool,
    ) {
        let id = attrs.polygon_id;
        let translucent = mode == DrawMode::Translucent;
        let depth_write = mode == DrawMode::Opaque || attrs.translucent_depth_write;

        if mode != DrawMode::ZeroAlpha && attrs.depth_equal_test && self.tolerance_emulated() {
            self.color_mask(ColorMask::None);
            self.depth_mask(false);
            self.mark_depth_window(primitive, range, false);
            self.depth_func(CompareFunction::Always);

            if translucent {
                self.gate_translucent_identity(primitive, range, id);
            }

            self.stamp_through_mask(id, translucent, depth_write);
            self.draw(primitive, range);

            self.clear_scratch(primitive, range, false);
            self.restore_identity_state(id, translucent, depth_write);
        } else if mode == DrawMode::Opaque {
            self.draw_opaque_with_facing(primitive, range, id, front_facing);
        } else {
            self.draw_facing_prepass(primitive, range, front_facing);
            self.draw(primitive, range);
        }
    }

    /// Polygons textured with per-texel translucent alpha (A3I5, A5I3).
    ///
    /// Fully opaque texels of an opaque or wireframe polygon are drawn in an
    /// extra "opaque texels" pass that writes depth and an opaque identity.
    pub(super) fn draw_alpha_texture_polygon(
        &mut self,
        mode: DrawMode,
        primitive: Primitive,
        range: IndexRange,
        attrs: &PolygonAttributes,
        can_have_opaque: bool,
        front_facing: bool,
    ) {
        let id = attrs.polygon_id;
        let tolerance = mode != DrawMode::ZeroAlpha
            && attrs.depth_equal_test
            && self.tolerance_emulated();

        if tolerance && mode == DrawMode::Translucent {
            self.color_mask(ColorMask::None);
            self.depth_mask(false);
            self.mark_depth_window(primitive, range, can_have_opaque);
            self.depth_func(CompareFunction::Always);

            self.gate_translucent_identity(primitive, range, id);

            self.stamp_through_mask(id, true, attrs.translucent_depth_write);
            self.draw(primitive, range);

            if can_have_opaque {
                self.stencil_func(CompareFunction::Equal, StencilByte::stamp(id, false), SCRATCH);
                self.depth_mask(true);
                self.draw_opaque_texels(primitive, range);
            }

            self.clear_scratch(primitive, range, can_have_opaque);
            self.restore_identity_state(id, true, attrs.translucent_depth_write);
        } else if tolerance {
            self.color_mask(ColorMask::None);
            self.depth_mask(false);
            self.uniforms.draw_opaque_texels = true;
            self.mark_depth_window(primitive, range, false);

            self.depth_func(CompareFunction::Always);
            self.stamp_through_mask(id, false, true);
            self.draw(primitive, range);

            self.clear_scratch(primitive, range, false);
            self.restore_identity_state(id, false, true);
            self.uniforms.draw_opaque_texels = false;
        } else if mode != DrawMode::Opaque {
            self.draw_facing_prepass(primitive, range, front_facing);
            self.draw(primitive, range);

            if can_have_opaque {
                let zero_alpha = mode == DrawMode::ZeroAlpha;
                if !zero_alpha {
                    self.stencil_func(CompareFunction::Always, id, ID_MASK);
                    self.stencil_op(
                        StencilOperation::Keep,
                        StencilOperation::Keep,
                        StencilOperation::Replace,
                    );
                    self.depth_mask(true);
                }

                self.uniforms.draw_opaque_texels = true;
                self.draw_facing_prepass(primitive, range, front_facing);
                self.draw(primitive, range);
                self.uniforms.draw_opaque_texels = false;

                if !zero_alpha {
                    self.stencil_func(
                        CompareFunction::NotEqual,
                        StencilByte::translucent_tag(id),
                        TAG_MASK,
                    );
                    self.stencil_op(
                        StencilOperation::Keep,
                        StencilOperation::Keep,
                        StencilOperation::Replace,
                    );
                    self.depth_mask(attrs.translucent_depth_write);
                }
            }
        } else {
            self.uniforms.draw_opaque_texels = true;
            self.draw_opaque_with_facing(primitive, range, id, front_facing);
            self.uniforms.draw_opaque_texels = false;
        }
    }
}
