//! WGSL generation for the wgpu rasterizer
//!
//! Geometry programs come from one template specialized by prepending
//! `const` declarations for the seven variant bits and the program-wide
//! settings. The fragment depth output is spliced in only for variants that
//! write depth themselves.
//!
//! Full-screen programs share a vertex stage that covers the target with a
//! single triangle:
//! - zero-alpha mask (stencil only)
//! - edge marking
//! - fog, one program per density table offset/shift
//! - image clear, masked stencil fill and depth resolve (backend internal)

mod error;
mod templates;

pub use error::ShaderGenError;

use std::fmt::Write;

use gx_common::FogProgramKey;

use crate::graphics::{GeometryFlags, ProgramSettings};

/// Markers replaced during generation.
const PLACEHOLDERS: [&str; 3] = ["//FS_DEPTH_OUTPUT", "//FS_DEPTH", "//DEPTH_INPUT"];

/// Full-screen programs known to the generator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FullscreenShader {
    ZeroAlphaMask,
    EdgeMark,
    Fog(FogProgramKey),
    ClearImage,
    /// Vertex-only pass for masked stencil clears
    StencilFill,
    DepthResolve { multisampled: bool },
}

impl FullscreenShader {
    pub fn label(self) -> String {
        match self {
            FullscreenShader::ZeroAlphaMask => "zero_alpha_mask".into(),
            FullscreenShader::EdgeMark => "edge_mark".into(),
            FullscreenShader::Fog(key) => format!("fog_{:04x}_{}", key.offset, key.shift),
            FullscreenShader::ClearImage => "clear_image".into(),
            FullscreenShader::StencilFill => "stencil_fill".into(),
            FullscreenShader::DepthResolve { multisampled } => {
                if multisampled {
                    "depth_resolve_ms".into()
                } else {
                    "depth_resolve".into()
                }
            }
        }
    }

    /// Whether the program has a fragment stage.
    pub fn has_fragment(self) -> bool {
        self != FullscreenShader::StencilFill
    }
}

fn bool_const(source: &mut String, name: &str, value: bool) {
    let _ = writeln!(source, "const {}: bool = {};", name, value);
}

fn f32_const(source: &mut String, name: &str, value: f32) {
    let _ = writeln!(source, "const {}: f32 = {:?};", name, value);
}

fn check_placeholders(label: &str, source: &str) -> Result<(), ShaderGenError> {
    match PLACEHOLDERS.iter().find(|p| source.contains(*p)) {
        Some(placeholder) => Err(ShaderGenError::UnreplacedPlaceholder {
            label: label.to_string(),
            placeholder: placeholder.to_string(),
        }),
        None => Ok(()),
    }
}

/// Generate the geometry program for one variant.
pub fn generate_geometry_shader(
    flags: GeometryFlags,
    settings: &ProgramSettings,
) -> Result<String, ShaderGenError> {
    if settings.framebuffer_width == 0 || settings.framebuffer_height == 0 {
        return Err(ShaderGenError::EmptyFramebuffer {
            width: settings.framebuffer_width,
            height: settings.framebuffer_height,
        });
    }

    let mut source = String::with_capacity(templates::GEOMETRY.len() + 2048);
    let _ = writeln!(source, "// {}", flags.label());
    bool_const(&mut source, "FOG", flags.contains(GeometryFlags::FOG));
    bool_const(&mut source, "EDGE_MARK", flags.contains(GeometryFlags::EDGE_MARK));
    bool_const(&mut source, "OPAQUE_DRAW", flags.contains(GeometryFlags::OPAQUE_DRAW));
    bool_const(&mut source, "W_DEPTH", flags.contains(GeometryFlags::W_DEPTH));
    bool_const(&mut source, "ALPHA_TEST", flags.contains(GeometryFlags::ALPHA_TEST));
    bool_const(
        &mut source,
        "TEXTURE_SAMPLING",
        flags.contains(GeometryFlags::TEXTURE_SAMPLING),
    );
    bool_const(
        &mut source,
        "TOON_HIGHLIGHT",
        flags.contains(GeometryFlags::TOON_HIGHLIGHT),
    );
    bool_const(&mut source, "TEXTURE_SMOOTHING", settings.texture_smoothing);
    bool_const(&mut source, "DEPTH_LEQUAL_FACING", settings.depth_lequal_facing);
    let _ = writeln!(
        source,
        "const FRAMEBUFFER_SIZE: vec2<f32> = vec2<f32>({:?}, {:?});",
        settings.framebuffer_width as f32, settings.framebuffer_height as f32
    );
    source.push_str(templates::COMMON);

    let (depth_output, depth_write) = if settings.writes_fragment_depth(flags) {
        (
            "@builtin(frag_depth) depth: f32,",
            "out.depth = fragment_depth(in.clip_position.z, in.w);",
        )
    } else {
        ("", "")
    };
    source.push_str(
        &templates::GEOMETRY
            .replace("//FS_DEPTH_OUTPUT", depth_output)
            .replace("//FS_DEPTH", depth_write),
    );

    check_placeholders(&flags.label(), &source)?;
    Ok(source)
}

/// Generate a full-screen program.
pub fn generate_fullscreen_shader(shader: FullscreenShader) -> Result<String, ShaderGenError> {
    let mut source = String::with_capacity(4096);

    if let FullscreenShader::Fog(key) = shader {
        match key.coordinate_transform() {
            Some((scale, bias)) => {
                bool_const(&mut source, "FOG_THRESHOLD", false);
                f32_const(&mut source, "FOG_SCALE", scale);
                f32_const(&mut source, "FOG_BIAS", bias);
            }
            None => {
                bool_const(&mut source, "FOG_THRESHOLD", true);
                f32_const(&mut source, "FOG_SCALE", 0.0);
                f32_const(&mut source, "FOG_BIAS", 0.0);
            }
        }
        f32_const(&mut source, "FOG_OFFSET", key.offset_normalized());
    }

    source.push_str(templates::COMMON);
    source.push_str(templates::FULLSCREEN);

    match shader {
        FullscreenShader::ZeroAlphaMask => source.push_str(templates::ZERO_ALPHA),
        FullscreenShader::EdgeMark => source.push_str(templates::EDGE_MARK),
        FullscreenShader::Fog(_) => source.push_str(templates::FOG),
        FullscreenShader::ClearImage => source.push_str(templates::CLEAR_IMAGE),
        FullscreenShader::StencilFill => {}
        FullscreenShader::DepthResolve { multisampled } => {
            let texture = if multisampled {
                "texture_depth_multisampled_2d"
            } else {
                "texture_depth_2d"
            };
            source.push_str(&templates::DEPTH_RESOLVE.replace(
                "//DEPTH_INPUT",
                &format!("@group(1) @binding(0) var depth_input: {};", texture),
            ));
        }
    }

    check_placeholders(&shader.label(), &source)?;
    Ok(source)
}
