// WGSL sources, embedded at build time.

pub const COMMON: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/shaders/common.wgsl"));
pub const FULLSCREEN: &str = include_str!(concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/shaders/fullscreen.wgsl"
));
pub const GEOMETRY: &str = include_str!(concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/shaders/geometry.wgsl"
));
pub const ZERO_ALPHA: &str = include_str!(concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/shaders/zero_alpha.wgsl"
));
pub const EDGE_MARK: &str = include_str!(concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/shaders/edge_mark.wgsl"
));
pub const FOG: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/shaders/fog.wgsl"));
pub const DEPTH_RESOLVE: &str = include_str!(concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/shaders/depth_resolve.wgsl"
));
pub const CLEAR_IMAGE: &str = include_str!(concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/shaders/clear_image.wgsl"
));
