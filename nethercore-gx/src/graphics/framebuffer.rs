//! Framebuffer set description

use gx_common::{NATIVE_HEIGHT, NATIVE_WIDTH};

/// Vertical convention of a rasterizer's attachments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FramebufferOrigin {
    /// Row 0 is the top of the image
    TopLeft,
    /// Row 0 is the bottom of the image; readback must be flipped
    BottomLeft,
}

/// Size and sampling of the G-buffer attachments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FramebufferDesc {
    pub width: u32,
    pub height: u32,
    /// 0 when multisampling is off
    pub multisample_size: u32,
}

impl Default for FramebufferDesc {
    fn default() -> Self {
        Self {
            width: NATIVE_WIDTH,
            height: NATIVE_HEIGHT,
            multisample_size: 0,
        }
    }
}

impl FramebufferDesc {
    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Sample count for multisampled attachments, 1 when disabled.
    pub fn sample_count(&self) -> u32 {
        if self.multisample_size >= 2 {
            self.multisample_size
        } else {
            1
        }
    }

    /// Sizes below the native resolution are rejected.
    pub fn is_valid_size(width: u32, height: u32) -> bool {
        width >= NATIVE_WIDTH && height >= NATIVE_HEIGHT
    }

    /// Integer scale factor for mapping native coordinates, per axis.
    pub fn scale(&self) -> [f32; 2] {
        [
            self.width as f32 / NATIVE_WIDTH as f32,
            self.height as f32 / NATIVE_HEIGHT as f32,
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_sizes() {
        assert!(FramebufferDesc::is_valid_size(256, 192));
        assert!(FramebufferDesc::is_valid_size(512, 384));
        assert!(!FramebufferDesc::is_valid_size(255, 192));
        assert!(!FramebufferDesc::is_valid_size(256, 100));
    }

    #[test]
    fn test_sample_count() {
        let mut desc = FramebufferDesc::default();
        assert_eq!(desc.sample_count(), 1);
        desc.multisample_size = 4;
        assert_eq!(desc.sample_count(), 4);
        assert_eq!(desc.pixel_count(), 256 * 192);
    }
}
