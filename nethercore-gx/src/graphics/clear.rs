//! Frame clear values
//!
//! Every attachment starts the frame from the clear values or from the
//! clear image. The stencil byte starts as the bare clear identity, so a
//! translucent polygon carrying that identity still draws over the clear.

use gx_common::color::{rgba6665_to_f32, rgba8_to_f32};
use gx_common::{ClearImage, ClearValues, MAX_POLYGON_ID, NATIVE_HEIGHT, NATIVE_WIDTH};

use super::command::GxCommand;
use super::frame_state::FrameState;

pub fn clear_command(frame: &FrameState) -> GxCommand {
    GxCommand::Clear(frame.clear_source())
}

/// Values written to each attachment by a clear, for one pixel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClearTargets {
    pub color: [f32; 4],
    pub polygon_id: [f32; 4],
    pub fog: [f32; 4],
    pub working: [f32; 4],
    /// Normalized depth
    pub depth: f32,
    pub stencil: u8,
}

impl ClearTargets {
    pub fn from_values(clear: &ClearValues) -> Self {
        Self {
            color: rgba6665_to_f32(clear.color),
            polygon_id: identity_target(clear.polygon_id),
            fog: fog_target(clear.fog),
            working: [0.0; 4],
            depth: clear.depth_normalized(),
            stencil: clear.polygon_id & MAX_POLYGON_ID,
        }
    }

    /// Clear values for one texel of the clear image.
    pub fn from_image(image: &ClearImage, index: usize, polygon_id: u8) -> Self {
        Self {
            color: rgba8_to_f32(image.color_rgba8(index)),
            polygon_id: identity_target(polygon_id),
            fog: fog_target(image.fog[index]),
            working: [0.0; 4],
            depth: image.depth_normalized(index),
            stencil: polygon_id & MAX_POLYGON_ID,
        }
    }
}

fn identity_target(polygon_id: u8) -> [f32; 4] {
    [
        f32::from(polygon_id & MAX_POLYGON_ID) / f32::from(MAX_POLYGON_ID),
        0.0,
        0.0,
        1.0,
    ]
}

fn fog_target(fog: bool) -> [f32; 4] {
    [if fog { 1.0 } else { 0.0 }, 0.0, 0.0, 1.0]
}

/// Clear image texel for framebuffer pixel (`x`, `y`), rows counted from the top.
///
/// The native image is scaled to the framebuffer with nearest sampling.
pub fn clear_image_index(x: u32, y: u32, width: u32, height: u32) -> usize {
    let sx = (u64::from(x) * u64::from(NATIVE_WIDTH) / u64::from(width.max(1))) as u32;
    let sy = (u64::from(y) * u64::from(NATIVE_HEIGHT) / u64::from(height.max(1))) as u32;
    let sx = sx.min(NATIVE_WIDTH - 1);
    let sy = sy.min(NATIVE_HEIGHT - 1);
    (sy * NATIVE_WIDTH + sx) as usize
}

#[cfg(test)]
mod tests {
    use super::*;
    use gx_common::DEPTH_MAX;

    #[test]
    fn test_value_clear_targets() {
        let clear = ClearValues {
            color: [63, 0, 0, 31],
            depth: DEPTH_MAX,
            polygon_id: 63,
            fog: true,
        };
        let targets = ClearTargets::from_values(&clear);
        assert_eq!(targets.color, [1.0, 0.0, 0.0, 1.0]);
        assert_eq!(targets.polygon_id, [1.0, 0.0, 0.0, 1.0]);
        assert_eq!(targets.fog, [1.0, 0.0, 0.0, 1.0]);
        assert_eq!(targets.working, [0.0; 4]);
        assert_eq!(targets.depth, 1.0);
        assert_eq!(targets.stencil, 63);
    }

    #[test]
    fn test_image_clear_targets() {
        let mut image = ClearImage {
            color: vec![0; ClearImage::PIXELS],
            depth: vec![0; ClearImage::PIXELS],
            fog: vec![false; ClearImage::PIXELS],
        };
        image.color[3] = 0x801F;
        image.depth[3] = DEPTH_MAX;
        image.fog[3] = true;

        let targets = ClearTargets::from_image(&image, 3, 7);
        assert_eq!(targets.color, [1.0, 0.0, 0.0, 1.0]);
        assert_eq!(targets.depth, 1.0);
        assert_eq!(targets.fog[0], 1.0);
        assert_eq!(targets.stencil, 7);

        let transparent = ClearTargets::from_image(&image, 0, 7);
        assert_eq!(transparent.color[3], 0.0);
    }

    #[test]
    fn test_clear_image_nearest_scaling() {
        assert_eq!(clear_image_index(0, 0, 256, 192), 0);
        assert_eq!(clear_image_index(255, 191, 256, 192), ClearImage::PIXELS - 1);
        // 2x: each texel covers a 2x2 block
        assert_eq!(clear_image_index(2, 0, 512, 384), 1);
        assert_eq!(clear_image_index(3, 0, 512, 384), 1);
        assert_eq!(clear_image_index(0, 2, 512, 384), 256);
        assert_eq!(clear_image_index(511, 383, 512, 384), ClearImage::PIXELS - 1);
    }
}
