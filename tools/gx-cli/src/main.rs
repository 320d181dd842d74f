//! gx-render - headless scene renderer for Nethercore GX
//!
//! Renders a JSON scene with the wgpu or software rasterizer and writes the
//! presented frame as a PNG.
//!
//! # Usage
//!
//! ```bash
//! # Render with the GPU, falling back to software
//! gx-render scene.json -o frame.png
//!
//! # Software reference render at 2x with the 16-bit buffer alongside
//! gx-render scene.json --renderer software --scale 2 --buffer16 frame16.png
//! ```

mod scene;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use gx_common::OutputFormat;
use gx_common::color::rgba5551_to_rgba8;
use nethercore_gx::{Config, RendererPreference, config, select_renderer};

use crate::scene::Scene;

/// Render a GX scene file to PNG
#[derive(Parser)]
#[command(name = "gx-render")]
#[command(about = "Headless scene renderer for Nethercore GX")]
#[command(version)]
struct Cli {
    /// Scene file (JSON)
    scene: PathBuf,

    /// Output PNG (defaults to the scene path with a .png extension)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Rasterizer: auto, wgpu or software
    #[arg(short, long, default_value_t = RendererPreference::Auto)]
    renderer: RendererPreference,

    /// Config file (defaults to gx.toml in the user config directory)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Framebuffer scale relative to 256x192
    #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u32).range(1..=8))]
    scale: u32,

    /// Multisample size override (0 disables)
    #[arg(long)]
    multisample: Option<u32>,

    /// Render the scene this many times before writing the last frame
    #[arg(long, default_value_t = 1)]
    frames: u32,

    /// Keep the configured 6665 output precision instead of rendering RGBA8888
    #[arg(long)]
    native_precision: bool,

    /// Also write the RGBA5551 presentation buffer to this PNG
    #[arg(long)]
    buffer16: Option<PathBuf>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    execute(cli)
}

fn execute(cli: Cli) -> Result<()> {
    let scene = Scene::load(&cli.scene)?;
    let base_dir = cli.scene.parent().unwrap_or(Path::new("."));
    let textures = scene.texture_set(base_dir)?;

    let config = load_config(&cli)?;
    let mut renderer =
        select_renderer(config, cli.renderer).context("Failed to create renderer")?;
    tracing::info!("Rendering with the {} rasterizer", renderer.backend_name());

    if cli.scale > 1 {
        renderer
            .set_framebuffer_size(256 * cli.scale, 192 * cli.scale)
            .context("Failed to resize framebuffer")?;
    }

    for _ in 0..cli.frames.max(1) {
        renderer
            .render(&scene.geometry, &textures, &scene.state)
            .context("Failed to render scene")?;
    }

    let desc = renderer.framebuffer();
    let mut main = vec![[0u8; 4]; desc.pixel_count()];
    let mut buffer16 = vec![0u16; desc.pixel_count()];
    renderer
        .flush(Some(main.as_mut_slice()), Some(buffer16.as_mut_slice()))
        .context("Failed to read back frame")?;

    if renderer.output_format() == OutputFormat::Rgba6665 {
        main.iter_mut().for_each(|pixel| *pixel = expand_6665(*pixel));
    }

    let output = cli
        .output
        .clone()
        .unwrap_or_else(|| cli.scene.with_extension("png"));
    write_png(&output, desc.width, desc.height, &main)?;
    println!("Wrote {} ({}x{})", output.display(), desc.width, desc.height);

    if let Some(path) = &cli.buffer16 {
        let pixels: Vec<[u8; 4]> = buffer16.iter().map(|&c| rgba5551_to_rgba8(c)).collect();
        write_png(path, desc.width, desc.height, &pixels)?;
        println!("Wrote {}", path.display());
    }

    Ok(())
}

fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = match &cli.config {
        Some(path) => config::load_from(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => config::load(),
    };

    if let Some(samples) = cli.multisample {
        config.quality.multisample_size = samples;
    }
    if !cli.native_precision {
        config.output.format = OutputFormat::Rgba8888;
    }
    Ok(config)
}

/// Widen RGBA6665 channels to 8 bits by bit replication.
fn expand_6665([r, g, b, a]: [u8; 4]) -> [u8; 4] {
    let expand6 = |c: u8| (c << 2) | (c >> 4);
    [expand6(r), expand6(g), expand6(b), (a << 3) | (a >> 2)]
}

fn write_png(path: &Path, width: u32, height: u32, pixels: &[[u8; 4]]) -> Result<()> {
    let bytes: Vec<u8> = pixels.iter().flatten().copied().collect();
    let image = image::RgbaImage::from_raw(width, height, bytes)
        .context("Frame size does not match the framebuffer")?;
    image
        .save(path)
        .with_context(|| format!("Failed to write {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expand_6665() {
        assert_eq!(expand_6665([63, 0, 32, 31]), [255, 0, 130, 255]);
        assert_eq!(expand_6665([0, 0, 0, 0]), [0, 0, 0, 0]);
    }

    #[test]
    fn test_cli_defaults() {
        let cli = Cli::parse_from(["gx-render", "scene.json"]);
        assert_eq!(cli.renderer, RendererPreference::Auto);
        assert_eq!(cli.scale, 1);
        assert!(cli.output.is_none());

        let cli = Cli::parse_from(["gx-render", "scene.json", "-r", "software", "--scale", "2"]);
        assert_eq!(cli.renderer, RendererPreference::Software);
        assert_eq!(cli.scale, 2);
        assert!(Cli::try_parse_from(["gx-render", "scene.json", "--scale", "9"]).is_err());
    }

    #[test]
    fn test_config_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gx.toml");
        std::fs::write(&path, "[quality]\nedge_mark = false\n").unwrap();

        let cli = Cli::parse_from([
            "gx-render",
            "scene.json",
            "--config",
            path.to_str().unwrap(),
            "--multisample",
            "4",
        ]);
        let config = load_config(&cli).unwrap();
        assert!(!config.quality.edge_mark);
        assert_eq!(config.quality.multisample_size, 4);
        assert_eq!(config.output.format, OutputFormat::Rgba8888);
    }

    #[test]
    fn test_render_empty_scene_software() {
        let dir = tempfile::tempdir().unwrap();
        let scene = dir.path().join("empty.json");
        std::fs::write(&scene, "{}").unwrap();
        let config = dir.path().join("gx.toml");
        std::fs::write(&config, "").unwrap();

        let cli = Cli::parse_from([
            "gx-render",
            scene.to_str().unwrap(),
            "--renderer",
            "software",
            "--config",
            config.to_str().unwrap(),
        ]);
        execute(cli).unwrap();

        let image = image::open(dir.path().join("empty.png")).unwrap().to_rgba8();
        assert_eq!(image.dimensions(), (256, 192));
    }
}
