//! Per-frame render state snapshot
//!
//! Captured once at frame start from the geometry stage's [`RenderState`]
//! and the renderer's [`FrameSettings`]. Nothing in the frame reads the live
//! configuration afterwards.

use gx_common::color::{fog_color_to_f32, rgb555_to_rgba8};
use gx_common::edge::{EDGE_COLOR_COUNT, expand_edge_colors};
use gx_common::fog::expand_density_table;
use gx_common::{
    ClearImage, ClearValues, FOG_TABLE_LEN, FogProgramKey, MAX_POLYGON_ALPHA, RenderState,
    TOON_TABLE_LEN, ToonShading,
};

use super::command::ClearSource;
use super::variant::GeometryFlags;
use crate::settings::FrameSettings;

#[derive(Debug, Clone, PartialEq)]
pub struct FrameState {
    pub settings: FrameSettings,
    pub width: u32,
    pub height: u32,

    pub alpha_blending: bool,
    /// Normalized alpha test reference
    pub alpha_test_ref: f32,
    pub antialiasing: bool,
    pub toon_shading: ToonShading,

    pub fog_alpha_only: bool,
    pub fog_color: [f32; 4],
    pub fog_key: FogProgramKey,
    /// Densities expanded to 8 bits
    pub fog_density: [u8; FOG_TABLE_LEN],

    pub edge_colors: [[u8; 4]; EDGE_COLOR_COUNT],
    pub toon_colors: [[u8; 4]; TOON_TABLE_LEN],

    pub clear: ClearValues,
    /// Only present when image clears are supported and the image is complete
    pub clear_image: Option<ClearImage>,

    /// Edge marking enabled by the frame and supported by the device
    pub edge_mark: bool,
    /// Fog enabled by the frame and supported by the device
    pub fog: bool,
    /// Variant bits shared by every geometry draw in the frame
    pub base_flags: GeometryFlags,
}

impl FrameState {
    pub fn capture(state: &RenderState, settings: FrameSettings, width: u32, height: u32) -> Self {
        let edge_mark = state.enable_edge_marking && settings.edge_mark;
        let fog = state.enable_fog && settings.fog;

        let clear_image = match &state.clear_image {
            Some(image) if settings.clear_image && image.is_complete() => Some(image.clone()),
            Some(image) if !image.is_complete() => {
                tracing::warn!(
                    "Clear image is incomplete ({} color texels), clearing with values",
                    image.color.len()
                );
                None
            }
            _ => None,
        };

        let mut base_flags = GeometryFlags::TEXTURE_SAMPLING;
        base_flags.set(GeometryFlags::FOG, fog);
        base_flags.set(GeometryFlags::EDGE_MARK, edge_mark);
        base_flags.set(GeometryFlags::W_DEPTH, state.w_buffer);
        base_flags.set(GeometryFlags::ALPHA_TEST, state.enable_alpha_test);
        base_flags.set(
            GeometryFlags::TOON_HIGHLIGHT,
            state.toon_shading == ToonShading::Highlight,
        );
        base_flags.set(GeometryFlags::OPAQUE_DRAW, settings.emulate_depth_lequal_facing);

        Self {
            settings,
            width,
            height,
            alpha_blending: state.enable_alpha_blending,
            alpha_test_ref: f32::from(state.alpha_test_ref.min(MAX_POLYGON_ALPHA))
                / f32::from(MAX_POLYGON_ALPHA),
            antialiasing: state.enable_antialiasing,
            toon_shading: state.toon_shading,
            fog_alpha_only: state.enable_fog_alpha_only,
            fog_color: fog_color_to_f32(state.fog_color),
            fog_key: FogProgramKey::new(state.fog_offset, state.fog_shift),
            fog_density: expand_density_table(&state.fog_density),
            edge_colors: expand_edge_colors(&state.edge_mark_colors, state.enable_antialiasing),
            toon_colors: state.toon_table.map(|color| rgb555_to_rgba8(color & 0x7FFF, 0xFF)),
            clear: state.clear,
            clear_image,
            edge_mark,
            fog,
            base_flags,
        }
    }

    pub fn clear_source(&self) -> ClearSource {
        if self.clear_image.is_some() {
            ClearSource::Image
        } else {
            ClearSource::Values
        }
    }

    /// Whether translucent polygons may land on zero-alpha destinations.
    ///
    /// Value clears know their alpha up front; an image clear may contain
    /// transparent texels anywhere.
    pub fn needs_zero_dst_alpha(&self) -> bool {
        match self.clear_source() {
            ClearSource::Image => true,
            ClearSource::Values => self.clear.color[3] == 0,
        }
    }

    /// Zero-destination-alpha compositing runs for this frame.
    pub fn zero_dst_alpha_pass(&self) -> bool {
        self.needs_zero_dst_alpha() && self.settings.emulate_zero_dst_alpha
    }

    pub fn clear_depth(&self) -> f32 {
        self.clear.depth_normalized()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capabilities::FeatureSupport;
    use crate::config::Config;

    fn settings() -> FrameSettings {
        let features = FeatureSupport {
            edge_mark: true,
            fog: true,
            depth_equal_tolerance: true,
            depth_lequal_facing: true,
            zero_dst_alpha: true,
            clear_image: true,
            multisample: true,
        };
        FrameSettings::resolve(&Config::default(), &features, 4)
    }

    #[test]
    fn test_capture_flags() {
        let state = RenderState {
            enable_fog: true,
            enable_edge_marking: true,
            enable_alpha_test: true,
            w_buffer: true,
            toon_shading: ToonShading::Highlight,
            ..Default::default()
        };
        let frame = FrameState::capture(&state, settings(), 256, 192);
        let flags = frame.base_flags;
        assert!(flags.contains(GeometryFlags::FOG | GeometryFlags::EDGE_MARK));
        assert!(flags.contains(GeometryFlags::W_DEPTH | GeometryFlags::ALPHA_TEST));
        assert!(flags.contains(GeometryFlags::TEXTURE_SAMPLING | GeometryFlags::TOON_HIGHLIGHT));
        assert!(!flags.contains(GeometryFlags::OPAQUE_DRAW));
    }

    #[test]
    fn test_capture_respects_settings() {
        let state = RenderState {
            enable_fog: true,
            ..Default::default()
        };
        let mut settings = settings();
        settings.fog = false;
        let frame = FrameState::capture(&state, settings, 256, 192);
        assert!(!frame.fog);
        assert!(!frame.base_flags.contains(GeometryFlags::FOG));
    }

    #[test]
    fn test_alpha_test_reference() {
        let state = RenderState {
            alpha_test_ref: 31,
            ..Default::default()
        };
        let frame = FrameState::capture(&state, settings(), 256, 192);
        assert_eq!(frame.alpha_test_ref, 1.0);
    }

    #[test]
    fn test_zero_dst_alpha_follows_clear_alpha() {
        let mut state = RenderState::default();
        state.clear.color = [0, 0, 0, 31];
        let frame = FrameState::capture(&state, settings(), 256, 192);
        assert!(!frame.needs_zero_dst_alpha());

        state.clear.color[3] = 0;
        let frame = FrameState::capture(&state, settings(), 256, 192);
        assert!(frame.zero_dst_alpha_pass());
    }

    #[test]
    fn test_incomplete_clear_image_falls_back_to_values() {
        let state = RenderState {
            clear_image: Some(ClearImage {
                color: vec![0; 4],
                depth: vec![0; 4],
                fog: vec![false; 4],
            }),
            ..Default::default()
        };
        let frame = FrameState::capture(&state, settings(), 256, 192);
        assert_eq!(frame.clear_source(), ClearSource::Values);
    }

    #[test]
    fn test_image_clear_always_needs_zero_alpha_pass() {
        let state = RenderState {
            clear_image: Some(ClearImage {
                color: vec![0x8000; ClearImage::PIXELS],
                depth: vec![0; ClearImage::PIXELS],
                fog: vec![false; ClearImage::PIXELS],
            }),
            ..Default::default()
        };
        let frame = FrameState::capture(&state, settings(), 256, 192);
        assert_eq!(frame.clear_source(), ClearSource::Image);
        assert!(frame.needs_zero_dst_alpha());
    }
}
