//! Effective renderer settings
//!
//! `FrameSettings` combines the user configuration with what the device
//! supports. The renderer holds one copy and hands each frame an immutable
//! snapshot, so configuration changes only take effect between frames.

use gx_common::OutputFormat;

use crate::capabilities::{FeatureSupport, limited_multisample_size};
use crate::config::Config;
use crate::graphics::ProgramSettings;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameSettings {
    pub emulate_shadow_polygon: bool,
    pub emulate_zero_dst_alpha: bool,
    /// Console depth format plus the depth-equal tolerance passes.
    pub emulate_nds_depth: bool,
    pub emulate_depth_lequal_facing: bool,
    pub texture_smoothing: bool,
    /// 0 when multisampling is off.
    pub multisample_size: u32,
    pub edge_mark: bool,
    pub fog: bool,
    pub clear_image: bool,
    pub output_format: OutputFormat,
}

impl FrameSettings {
    pub fn resolve(config: &Config, features: &FeatureSupport, max_samples: u32) -> Self {
        let multisample_size = if features.multisample {
            limited_multisample_size(config.quality.multisample_size, max_samples)
        } else {
            0
        };

        Self {
            emulate_shadow_polygon: config.emulation.shadow_polygon,
            emulate_zero_dst_alpha: config.emulation.special_zero_alpha_blending
                && features.zero_dst_alpha,
            emulate_nds_depth: config.emulation.nds_depth_calculation
                && features.depth_equal_tolerance,
            emulate_depth_lequal_facing: config.emulation.depth_lequal_polygon_facing
                && features.depth_lequal_facing,
            texture_smoothing: config.quality.texture_smoothing,
            multisample_size,
            edge_mark: config.quality.edge_mark && features.edge_mark,
            fog: config.quality.fog && features.fog,
            clear_image: features.clear_image,
            output_format: config.output.format,
        }
    }

    pub fn multisample_enabled(&self) -> bool {
        self.multisample_size >= 2
    }

    pub fn program_settings(&self, width: u32, height: u32) -> ProgramSettings {
        ProgramSettings {
            texture_smoothing: self.texture_smoothing,
            nds_depth_calculation: self.emulate_nds_depth,
            depth_lequal_facing: self.emulate_depth_lequal_facing,
            framebuffer_width: width,
            framebuffer_height: height,
        }
    }

    /// True when switching from `previous` requires rebuilding geometry programs.
    pub fn requires_program_rebuild(&self, previous: &Self) -> bool {
        self.emulate_nds_depth != previous.emulate_nds_depth
            || self.texture_smoothing != previous.texture_smoothing
            || self.emulate_depth_lequal_facing != previous.emulate_depth_lequal_facing
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn full_support() -> FeatureSupport {
        FeatureSupport {
            edge_mark: true,
            fog: true,
            depth_equal_tolerance: true,
            depth_lequal_facing: true,
            zero_dst_alpha: true,
            clear_image: true,
            multisample: true,
        }
    }

    #[test]
    fn test_resolve_defaults() {
        let settings = FrameSettings::resolve(&Config::default(), &full_support(), 8);
        assert!(settings.emulate_shadow_polygon);
        assert!(settings.emulate_zero_dst_alpha);
        assert!(settings.emulate_nds_depth);
        assert!(!settings.emulate_depth_lequal_facing);
        assert!(!settings.multisample_enabled());
        assert!(settings.edge_mark && settings.fog);
    }

    #[test]
    fn test_resolve_respects_missing_features() {
        let mut config = Config::default();
        config.emulation.depth_lequal_polygon_facing = true;
        config.quality.multisample_size = 4;
        let features = FeatureSupport {
            edge_mark: false,
            fog: false,
            depth_equal_tolerance: false,
            depth_lequal_facing: false,
            zero_dst_alpha: false,
            clear_image: false,
            multisample: false,
        };
        let settings = FrameSettings::resolve(&config, &features, 8);
        assert!(!settings.edge_mark);
        assert!(!settings.fog);
        assert!(!settings.emulate_nds_depth);
        assert!(!settings.emulate_depth_lequal_facing);
        assert_eq!(settings.multisample_size, 0);
    }

    #[test]
    fn test_multisample_is_limited() {
        let mut config = Config::default();
        config.quality.multisample_size = 3;
        let settings = FrameSettings::resolve(&config, &full_support(), 8);
        assert_eq!(settings.multisample_size, 4);
        assert!(settings.multisample_enabled());
    }

    #[test]
    fn test_program_rebuild_triggers() {
        let base = FrameSettings::resolve(&Config::default(), &full_support(), 8);

        let mut fog_off = base;
        fog_off.fog = false;
        assert!(!fog_off.requires_program_rebuild(&base));

        let mut smoothing = base;
        smoothing.texture_smoothing = true;
        assert!(smoothing.requires_program_rebuild(&base));
    }
}
