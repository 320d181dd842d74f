//! Decoded texture images supplied by the texture cache

use serde::{Deserialize, Serialize};

/// A decoded RGBA8 texture, rows stored top to bottom.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextureImage {
    /// Stable cache key; backends keep uploaded copies keyed by it.
    pub key: u64,
    pub width: u32,
    pub height: u32,
    pub texels: Vec<[u8; 4]>,
}

impl TextureImage {
    pub fn new(key: u64, width: u32, height: u32, texels: Vec<[u8; 4]>) -> Self {
        debug_assert_eq!(texels.len(), (width * height) as usize);
        Self {
            key,
            width,
            height,
            texels,
        }
    }

    /// Fetch a texel with integer coordinates already wrapped into range.
    #[inline]
    pub fn texel(&self, x: u32, y: u32) -> [u8; 4] {
        self.texels[(y * self.width + x) as usize]
    }

    /// Size reciprocal, used to turn texel coordinates into normalized ones.
    pub fn inverse_size(&self) -> [f32; 2] {
        [1.0 / self.width as f32, 1.0 / self.height as f32]
    }
}

/// All textures referenced by one frame, indexed by `TextureParams::handle`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextureSet {
    pub images: Vec<TextureImage>,
}

impl TextureSet {
    pub fn get(&self, handle: u32) -> Option<&TextureImage> {
        self.images.get(handle as usize)
    }

    pub fn push(&mut self, image: TextureImage) -> u32 {
        self.images.push(image);
        (self.images.len() - 1) as u32
    }
}
