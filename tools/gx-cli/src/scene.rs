//! JSON scene files
//!
//! A scene is one frame's worth of renderer input: the render state, the
//! sorted geometry list and the textures it samples. Textures are either
//! inline RGBA8 images or image files resolved relative to the scene.
//!
//! ```json
//! {
//!   "state": { "enable_fog": true, "fog_color": 31 },
//!   "geometry": { "vertices": [...], "polygons": [...], "clipped": [...], "opaque_count": 1 },
//!   "textures": [{ "path": "brick.png" }]
//! }
//! ```

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use gx_common::{GeometryList, RenderState, TextureImage, TextureSet};
use serde::Deserialize;

/// Texture entry of a scene file.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum SceneTexture {
    /// Image file decoded to RGBA8
    File {
        path: PathBuf,
        #[serde(default)]
        key: Option<u64>,
    },
    Inline(TextureImage),
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Scene {
    pub state: RenderState,
    pub geometry: GeometryList,
    pub textures: Vec<SceneTexture>,
}

impl Scene {
    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read scene {}", path.display()))?;
        serde_json::from_str(&json)
            .with_context(|| format!("Failed to parse scene {}", path.display()))
    }

    /// Decode the scene's textures in handle order.
    ///
    /// Relative file paths are resolved against `base_dir`. File textures
    /// without a key are keyed by their handle.
    pub fn texture_set(&self, base_dir: &Path) -> Result<TextureSet> {
        let mut set = TextureSet::default();
        for (handle, texture) in self.textures.iter().enumerate() {
            let image = match texture {
                SceneTexture::Inline(image) => image.clone(),
                SceneTexture::File { path, key } => {
                    let path = base_dir.join(path);
                    let rgba = image::open(&path)
                        .with_context(|| format!("Failed to load texture {}", path.display()))?
                        .to_rgba8();
                    let (width, height) = rgba.dimensions();
                    let texels = rgba.pixels().map(|pixel| pixel.0).collect();
                    TextureImage::new(key.unwrap_or(handle as u64), width, height, texels)
                }
            };
            tracing::debug!(
                "Texture {}: {}x{} (key {:#x})",
                handle,
                image.width,
                image.height,
                image.key
            );
            set.push(image);
        }
        Ok(set)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TRIANGLE: &str = r#"{
        "state": { "enable_fog": true },
        "geometry": {
            "vertices": [
                { "position": [-1.0, -1.0, 0.5, 1.0], "color": [63, 0, 0] },
                { "position": [1.0, -1.0, 0.5, 1.0], "color": [0, 63, 0] },
                { "position": [0.0, 1.0, 0.5, 1.0], "color": [0, 0, 63] }
            ],
            "polygons": [
                { "attributes": { "polygon_id": 1, "alpha": 31 }, "vertices": [0, 1, 2, 0] }
            ],
            "clipped": [{ "index": 0 }],
            "opaque_count": 1
        },
        "textures": [
            { "key": 7, "width": 1, "height": 1, "texels": [[255, 0, 0, 255]] }
        ]
    }"#;

    #[test]
    fn test_parse_scene() {
        let scene: Scene = serde_json::from_str(TRIANGLE).unwrap();
        assert!(scene.state.enable_fog);
        assert_eq!(scene.geometry.vertices.len(), 3);
        assert_eq!(scene.geometry.opaque_count, 1);
        assert!(!scene.geometry.clipped[0].back_facing);
        assert!(matches!(scene.textures[0], SceneTexture::Inline(_)));

        let set = scene.texture_set(Path::new(".")).unwrap();
        assert_eq!(set.get(0).map(|image| image.key), Some(7));
    }

    #[test]
    fn test_empty_scene_uses_defaults() {
        let scene: Scene = serde_json::from_str("{}").unwrap();
        assert!(scene.geometry.is_empty());
        assert_eq!(scene.state, RenderState::default());
    }

    #[test]
    fn test_file_texture_relative_to_scene() {
        let dir = tempfile::tempdir().unwrap();
        let mut png = image::RgbaImage::new(2, 1);
        png.put_pixel(1, 0, image::Rgba([1, 2, 3, 4]));
        png.save(dir.path().join("tex.png")).unwrap();

        let scene_path = dir.path().join("scene.json");
        std::fs::write(&scene_path, r#"{ "textures": [{ "path": "tex.png" }] }"#).unwrap();

        let scene = Scene::load(&scene_path).unwrap();
        let set = scene.texture_set(dir.path()).unwrap();
        let image = set.get(0).unwrap();
        assert_eq!((image.width, image.height, image.key), (2, 1, 0));
        assert_eq!(image.texel(1, 0), [1, 2, 3, 4]);
    }

    #[test]
    fn test_missing_texture_file_fails() {
        let scene: Scene =
            serde_json::from_str(r#"{ "textures": [{ "path": "missing.png" }] }"#).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let err = scene.texture_set(dir.path()).unwrap_err();
        assert!(err.to_string().contains("missing.png"));
    }
}
