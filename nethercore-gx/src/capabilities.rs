//! Rasterizer capability probing
//!
//! Capabilities are checked once at startup. Missing shader support is
//! fatal; every other gap only removes features.

use crate::error::{GxError, GxResult};

/// Color attachments needed for the G-buffer.
pub const REQUIRED_COLOR_ATTACHMENTS: u32 = 4;
/// Simultaneous draw targets needed for the G-buffer.
pub const REQUIRED_DRAW_BUFFERS: u32 = 4;
/// Texture units needed by the geometry and post-process programs.
pub const REQUIRED_TEXTURE_UNITS: u32 = 8;

/// Limits reported by a rasterizer backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceCapabilities {
    pub max_color_attachments: u32,
    pub max_draw_buffers: u32,
    pub max_texture_units: u32,
    pub max_samples: u32,
    /// Off-screen multi-target framebuffers are available.
    pub offscreen_targets: bool,
}

/// Features that survived capability probing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeatureSupport {
    pub edge_mark: bool,
    pub fog: bool,
    pub depth_equal_tolerance: bool,
    pub depth_lequal_facing: bool,
    pub zero_dst_alpha: bool,
    pub clear_image: bool,
    pub multisample: bool,
}

impl DeviceCapabilities {
    /// Fail if the geometry programs cannot run on this device.
    pub fn check_shader_support(&self) -> GxResult<()> {
        if self.max_color_attachments < REQUIRED_COLOR_ATTACHMENTS {
            return Err(GxError::ShadersUnsupported(format!(
                "{} color attachments available, {} required",
                self.max_color_attachments, REQUIRED_COLOR_ATTACHMENTS
            )));
        }
        if self.max_draw_buffers < REQUIRED_DRAW_BUFFERS {
            return Err(GxError::ShadersUnsupported(format!(
                "{} draw buffers available, {} required",
                self.max_draw_buffers, REQUIRED_DRAW_BUFFERS
            )));
        }
        if self.max_texture_units < REQUIRED_TEXTURE_UNITS {
            return Err(GxError::ShadersUnsupported(format!(
                "{} texture units available, {} required",
                self.max_texture_units, REQUIRED_TEXTURE_UNITS
            )));
        }
        Ok(())
    }

    /// Resolve the reduced feature set for this device.
    pub fn features(&self) -> FeatureSupport {
        let offscreen = self.offscreen_targets;
        let multisample = self.max_samples >= 2;

        if !offscreen {
            tracing::warn!(
                "Off-screen targets unavailable: edge marking, fog, depth-equal tolerance and zero-alpha blending disabled"
            );
        }
        if !multisample {
            tracing::warn!("Multisampling unavailable (max samples {})", self.max_samples);
        }

        FeatureSupport {
            edge_mark: offscreen,
            fog: offscreen,
            depth_equal_tolerance: offscreen,
            depth_lequal_facing: offscreen,
            zero_dst_alpha: offscreen,
            clear_image: offscreen,
            multisample,
        }
    }
}

/// Limit a requested multisample count to what the device supports.
///
/// 0 stays 0 (disabled), 1 becomes 2, anything else rounds up to a power of
/// two and is clamped to `device_max`. Returns 0 when the device cannot
/// multisample at all.
pub fn limited_multisample_size(requested: u32, device_max: u32) -> u32 {
    if requested == 0 || device_max < 2 {
        return 0;
    }
    let size = if requested == 1 {
        2
    } else {
        requested.checked_next_power_of_two().unwrap_or(u32::MAX)
    };
    // Device maxima are powers of two in practice; round down to stay valid.
    let max = if device_max.is_power_of_two() {
        device_max
    } else {
        device_max.next_power_of_two() >> 1
    };
    size.min(max)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn caps() -> DeviceCapabilities {
        DeviceCapabilities {
            max_color_attachments: 8,
            max_draw_buffers: 8,
            max_texture_units: 16,
            max_samples: 4,
            offscreen_targets: true,
        }
    }

    #[test]
    fn test_shader_support() {
        assert!(caps().check_shader_support().is_ok());

        let limited = DeviceCapabilities {
            max_color_attachments: 2,
            ..caps()
        };
        assert!(matches!(
            limited.check_shader_support(),
            Err(GxError::ShadersUnsupported(_))
        ));

        let few_units = DeviceCapabilities {
            max_texture_units: 4,
            ..caps()
        };
        assert!(few_units.check_shader_support().is_err());
    }

    #[test]
    fn test_features_degrade_without_offscreen() {
        let features = DeviceCapabilities {
            offscreen_targets: false,
            ..caps()
        }
        .features();
        assert!(!features.edge_mark);
        assert!(!features.fog);
        assert!(!features.depth_equal_tolerance);
        assert!(!features.zero_dst_alpha);
        assert!(features.multisample);
    }

    #[test]
    fn test_multisample_requires_two_samples() {
        let features = DeviceCapabilities {
            max_samples: 1,
            ..caps()
        }
        .features();
        assert!(!features.multisample);
        assert!(features.edge_mark);
    }

    #[test]
    fn test_limited_multisample_size() {
        assert_eq!(limited_multisample_size(0, 8), 0);
        assert_eq!(limited_multisample_size(1, 8), 2);
        assert_eq!(limited_multisample_size(3, 8), 4);
        assert_eq!(limited_multisample_size(4, 8), 4);
        assert_eq!(limited_multisample_size(5, 8), 8);
        assert_eq!(limited_multisample_size(16, 8), 8);
        assert_eq!(limited_multisample_size(4, 1), 0);
        assert_eq!(limited_multisample_size(8, 6), 4);
    }
}
