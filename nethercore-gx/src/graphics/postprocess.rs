//! Post-process command emission
//!
//! Edge marking composites into the color attachment in place. Fog reads
//! the color attachment and writes the working attachment, which then
//! becomes the frame output.

use gx_common::StencilByte;

use super::command::{Attachment, FullscreenCall, FullscreenProgram, GxCommand};
use super::frame_state::FrameState;
use super::pipeline_state::{
    ColorMask, CompareFunction, DrawState, StencilOperation, StencilState,
};

const ZERO_ALPHA_MARK: u8 = StencilByte::TRANSLUCENT_BIT;

/// Append the post-process passes and return the attachment holding the final image.
pub fn postprocess_commands(frame: &FrameState, commands: &mut Vec<GxCommand>) -> Attachment {
    if !frame.edge_mark && !frame.fog {
        return Attachment::Color;
    }

    if frame.edge_mark {
        edge_mark_commands(frame, commands);
    }

    if frame.fog {
        commands.push(GxCommand::Fullscreen(FullscreenCall {
            program: FullscreenProgram::Fog(frame.fog_key),
            state: DrawState::fullscreen(),
            target: Some(Attachment::Working),
        }));
        Attachment::Working
    } else {
        Attachment::Color
    }
}

fn edge_mark_commands(frame: &FrameState, commands: &mut Vec<GxCommand>) {
    let blended = DrawState {
        blend: true,
        ..DrawState::fullscreen()
    };

    if frame.zero_dst_alpha_pass() {
        let mark = StencilState::new(CompareFunction::Always, ZERO_ALPHA_MARK, ZERO_ALPHA_MARK)
            .with_ops(
                StencilOperation::Keep,
                StencilOperation::Keep,
                StencilOperation::Replace,
            )
            .with_write_mask(ZERO_ALPHA_MARK);

        // Mark pixels with non-zero alpha
        commands.push(GxCommand::Fullscreen(FullscreenCall {
            program: FullscreenProgram::ZeroAlphaMask,
            state: DrawState {
                stencil_test: true,
                stencil: mark,
                color_mask: ColorMask::None,
                ..DrawState::fullscreen()
            },
            target: None,
        }));

        // Edge colors land unblended on the unmarked pixels
        commands.push(GxCommand::Fullscreen(FullscreenCall {
            program: FullscreenProgram::EdgeMark,
            state: DrawState {
                stencil_test: true,
                stencil: StencilState {
                    compare: CompareFunction::NotEqual,
                    ..mark
                },
                color_mask: ColorMask::Rgb,
                ..DrawState::fullscreen()
            },
            target: Some(Attachment::Color),
        }));
    }

    commands.push(GxCommand::Fullscreen(FullscreenCall {
        program: FullscreenProgram::EdgeMark,
        state: blended,
        target: Some(Attachment::Color),
    }));
}
