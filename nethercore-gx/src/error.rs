//! Renderer error types

use gx_common::GeometryError;
use thiserror::Error;

/// Errors surfaced by the renderer and its rasterizer backends.
///
/// Capability gaps never show up here during a frame: they are resolved
/// once into a reduced feature set. What remains are initialization
/// failures, resize failures and invalid frame input.
#[derive(Debug, Error)]
pub enum GxError {
    /// The device cannot run the geometry programs at all.
    #[error("shaders unsupported: {0}")]
    ShadersUnsupported(String),

    /// A requested optional feature is missing on this device.
    #[error("feature unsupported: {0}")]
    FeatureUnsupported(&'static str),

    /// Program generation or compilation failed.
    #[error("failed to build {label}: {message}")]
    ShaderCompile { label: String, message: String },

    /// Programs were requested before the first build.
    #[error("geometry programs have not been built")]
    ProgramsNotBuilt,

    /// The presentation client refused the new framebuffer size.
    #[error("client rejected framebuffer resize to {width}x{height}")]
    ClientResize { width: u32, height: u32 },

    /// Attachment allocation failed; the previous framebuffer set stays live.
    #[error("framebuffer resize to {width}x{height} failed: {reason}")]
    Resize {
        width: u32,
        height: u32,
        reason: String,
    },

    #[error("invalid geometry: {0}")]
    Geometry(#[from] GeometryError),

    #[error("readback failed: {0}")]
    Readback(String),

    #[error("device error: {0}")]
    Device(String),

    #[error("config error: {0}")]
    Config(String),
}

pub type GxResult<T> = Result<T, GxError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = GxError::ClientResize {
            width: 512,
            height: 384,
        };
        assert_eq!(err.to_string(), "client rejected framebuffer resize to 512x384");

        let err = GxError::ShaderCompile {
            label: "fog".into(),
            message: "bad".into(),
        };
        assert_eq!(err.to_string(), "failed to build fog: bad");
    }

    #[test]
    fn test_geometry_error_conversion() {
        let err: GxError = GeometryError::OpaqueCountOutOfRange { opaque: 2, count: 1 }.into();
        assert!(matches!(err, GxError::Geometry(_)));
    }
}
