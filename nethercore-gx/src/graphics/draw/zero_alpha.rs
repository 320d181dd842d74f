//! Zero destination alpha compositing
//!
//! The console does not blend a translucent fragment over a pixel whose
//! alpha is zero; it writes the fragment color as-is. Before the normal
//! translucent pass, pixels with non-zero alpha are marked in bit 6 and the
//! translucent polygons are drawn unblended over the unmarked rest.

use std::ops::Range;

use gx_common::PolygonAttributes;

use super::{DrawMode, PolygonDrawer, TRANSLUCENT};
use crate::graphics::command::{FullscreenCall, FullscreenProgram, GxCommand};
use crate::graphics::pipeline_state::{
    ColorMask, CompareFunction, DrawState, StencilOperation, StencilState,
};
use crate::graphics::variant::GeometryFlags;

impl PolygonDrawer<'_> {
    /// Draw the translucent `entries` over zero-alpha destinations only.
    ///
    /// `index_offset` and `last_attrs` are copies; the real translucent pass
    /// runs over the same entries afterwards.
    pub(super) fn zero_dst_alpha_pass(
        &mut self,
        entries: Range<usize>,
        mut index_offset: u32,
        mut last_attrs: PolygonAttributes,
    ) {
        self.push(GxCommand::ResolveColor);

        // Mark every pixel the mask program keeps (alpha != 0) in bit 6.
        // The translucent flag is borrowed as the mark: no translucent
        // fragment has set it yet this frame and it is cleared at the end.
        let mask_state = DrawState {
            stencil_test: true,
            stencil: StencilState::new(CompareFunction::Always, TRANSLUCENT, TRANSLUCENT)
                .with_ops(
                    StencilOperation::Keep,
                    StencilOperation::Keep,
                    StencilOperation::Replace,
                )
                .with_write_mask(TRANSLUCENT),
            color_mask: ColorMask::None,
            ..DrawState::fullscreen()
        };
        self.push(GxCommand::Fullscreen(FullscreenCall {
            program: FullscreenProgram::ZeroAlphaMask,
            state: mask_state,
            target: None,
        }));

        // The corrective draw leaves auxiliary attributes to the real pass.
        let saved_flags = self.flags;
        self.flags.set(GeometryFlags::EDGE_MARK, false);
        self.flags.set(GeometryFlags::FOG, false);

        self.state.depth_test = true;
        self.color_mask(ColorMask::Rgb);
        self.state.stencil_test = true;
        // Each pixel takes at most one unblended write
        self.stencil_func(CompareFunction::NotEqual, TRANSLUCENT, TRANSLUCENT);
        self.stencil_op(
            StencilOperation::Keep,
            StencilOperation::Keep,
            StencilOperation::Replace,
        );
        self.stencil_mask(TRANSLUCENT);
        self.depth_mask(false);
        self.state.blend = false;

        self.draw_range(
            DrawMode::ZeroAlpha,
            entries,
            &mut index_offset,
            &mut last_attrs,
        );

        self.flags = saved_flags;
        self.push(GxCommand::ClearStencil {
            value: 0,
            write_mask: TRANSLUCENT,
        });
        self.color_mask(ColorMask::All);
        self.depth_mask(true);
        self.stencil_mask(0xFF);
        self.state.blend = self.frame.alpha_blending;
    }
}
