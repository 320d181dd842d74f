//! Shadow volume compositor
//!
//! Shadow polygon 0 builds the volume in bit 7 from its depth-fail region.
//! Every other shadow polygon then gates that mask by identity, stamps
//! itself into the surviving pixels and paints its color there.

use gx_common::{PolygonAttributes, StencilByte};

use super::{DEPTH_EQUAL_TOLERANCE, ID_MASK, PolygonDrawer, SCRATCH, TAG_MASK};
use crate::graphics::command::{IndexRange, Primitive};
use crate::graphics::pipeline_state::{ColorMask, CompareFunction, StencilOperation};

impl PolygonDrawer<'_> {
    pub(super) fn draw_shadow_polygon(
        &mut self,
        primitive: Primitive,
        range: IndexRange,
        attrs: &PolygonAttributes,
        translucent: bool,
    ) {
        let id = attrs.polygon_id;
        let tolerance = attrs.depth_equal_test && self.tolerance_emulated();

        if id == 0 {
            self.build_shadow_volume(primitive, range, tolerance);
            return;
        }

        // Identity gate
        if tolerance {
            self.stencil_func(CompareFunction::Equal, SCRATCH, SCRATCH);
            self.stencil_op(
                StencilOperation::Zero,
                StencilOperation::Zero,
                StencilOperation::Keep,
            );
            self.stencil_mask(SCRATCH);

            self.depth_offset(-DEPTH_EQUAL_TOLERANCE);
            self.depth_func(CompareFunction::LessEqual);
            self.draw(primitive, range);

            self.depth_offset(DEPTH_EQUAL_TOLERANCE);
            self.depth_func(CompareFunction::GreaterEqual);
            self.draw(primitive, range);

            self.depth_offset(0.0);
            self.depth_func(CompareFunction::Always);
            self.stencil_func(CompareFunction::NotEqual, id, ID_MASK);
            self.stencil_op(
                StencilOperation::Zero,
                StencilOperation::Zero,
                StencilOperation::Keep,
            );
            self.draw(primitive, range);
        } else {
            self.draw(primitive, range);
        }

        // Translucency gate
        if translucent {
            self.stencil_func(
                CompareFunction::NotEqual,
                StencilByte::translucent_tag(id),
                TAG_MASK,
            );
            self.stencil_op(
                StencilOperation::Zero,
                StencilOperation::Keep,
                StencilOperation::Keep,
            );
            self.stencil_mask(SCRATCH);
            self.draw(primitive, range);
        }

        // Identity stamp
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
        self.draw(primitive, range);

        // Paint. A depth fail leaves bit 7 set here, which is what the
        // hardware output shows.
        self.stencil_func(CompareFunction::Equal, SCRATCH, SCRATCH);
        self.stencil_op(
            StencilOperation::Zero,
            StencilOperation::Keep,
            StencilOperation::Zero,
        );
        self.stencil_mask(SCRATCH);
        self.color_mask(ColorMask::All);
        self.depth_mask(!translucent || attrs.translucent_depth_write);
        self.uniforms.draw_shadow = true;
        self.draw(primitive, range);
        self.uniforms.draw_shadow = false;

        // Back to the gate state for the next batch of this polygon.
        if tolerance {
            self.depth_func(CompareFunction::Equal);
        }
        self.stencil_func(CompareFunction::NotEqual, id, ID_MASK);
        self.stencil_op(
            StencilOperation::Zero,
            StencilOperation::Keep,
            StencilOperation::Keep,
        );
        self.stencil_mask(SCRATCH);
        self.color_mask(ColorMask::None);
        self.depth_mask(false);
    }

    /// Mark bit 7 wherever shadow polygon 0 is behind the stored depth.
    fn build_shadow_volume(&mut self, primitive: Primitive, range: IndexRange, tolerance: bool) {
        if !tolerance {
            self.draw(primitive, range);
            return;
        }

        self.stencil_op(
            StencilOperation::Keep,
            StencilOperation::Replace,
            StencilOperation::Keep,
        );
        self.stencil_mask(SCRATCH);

        self.depth_offset(-DEPTH_EQUAL_TOLERANCE);
        self.depth_func(CompareFunction::LessEqual);
        self.stencil_func(CompareFunction::Always, SCRATCH, SCRATCH);
        self.draw(primitive, range);

        self.depth_offset(DEPTH_EQUAL_TOLERANCE);
        self.depth_func(CompareFunction::GreaterEqual);
        self.stencil_func(CompareFunction::NotEqual, SCRATCH, SCRATCH);
        self.draw(primitive, range);

        self.depth_offset(0.0);
        self.depth_func(CompareFunction::Equal);
        self.stencil_func(CompareFunction::Always, SCRATCH, SCRATCH);
    }
}
