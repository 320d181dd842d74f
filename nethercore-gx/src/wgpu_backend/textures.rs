//! Polygon textures, samplers and the clear image on the GPU
//!
//! Uploaded textures are keyed by `TextureImage::key` and survive across
//! frames while the frame's texture set keeps referencing them.

use hashbrown::HashMap;
use wgpu::util::DeviceExt;

use gx_common::{ClearImage, NATIVE_HEIGHT, NATIVE_WIDTH, TextureImage, TextureSet, WrapMode};

use crate::graphics::TextureBinding;

pub const CLEAR_ATTRIBUTES_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rg32Float;

fn address_mode(wrap: WrapMode) -> wgpu::AddressMode {
    match wrap {
        WrapMode::Clamp => wgpu::AddressMode::ClampToEdge,
        WrapMode::Repeat => wgpu::AddressMode::Repeat,
        WrapMode::MirrorRepeat => wgpu::AddressMode::MirrorRepeat,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SamplerKey {
    pub wrap_s: WrapMode,
    pub wrap_t: WrapMode,
    pub linear: bool,
}

impl SamplerKey {
    pub fn from_binding(binding: &TextureBinding) -> Self {
        Self {
            wrap_s: binding.wrap_s,
            wrap_t: binding.wrap_t,
            linear: binding.linear_filter,
        }
    }

    fn descriptor(&self) -> wgpu::SamplerDescriptor<'static> {
        let filter = if self.linear {
            wgpu::FilterMode::Linear
        } else {
            wgpu::FilterMode::Nearest
        };
        wgpu::SamplerDescriptor {
            label: Some("GX Polygon Sampler"),
            address_mode_u: address_mode(self.wrap_s),
            address_mode_v: address_mode(self.wrap_t),
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: filter,
            min_filter: filter,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        }
    }
}

struct TextureEntry {
    #[allow(dead_code)] // Keeps the view alive
    texture: wgpu::Texture,
    view: wgpu::TextureView,
}

fn upload_rgba8(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    label: &str,
    width: u32,
    height: u32,
    texels: &[[u8; 4]],
) -> TextureEntry {
    let texture = device.create_texture_with_data(
        queue,
        &wgpu::TextureDescriptor {
            label: Some(label),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba8Unorm,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        },
        wgpu::util::TextureDataOrder::LayerMajor,
        bytemuck::cast_slice(texels),
    );
    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
    TextureEntry { texture, view }
}

/// Polygon textures plus the samplers and bind groups (group 2) built from them.
pub struct TextureCache {
    textures: HashMap<u64, TextureEntry>,
    /// Handle of the current frame's texture set to cache key
    handles: Vec<Option<u64>>,
    white: TextureEntry,
    samplers: HashMap<SamplerKey, wgpu::Sampler>,
    bind_groups: HashMap<(Option<u64>, SamplerKey), wgpu::BindGroup>,
}

impl TextureCache {
    pub fn new(device: &wgpu::Device, queue: &wgpu::Queue) -> Self {
        Self {
            textures: HashMap::new(),
            handles: Vec::new(),
            white: upload_rgba8(device, queue, "GX White Texture", 1, 1, &[[0xFF; 4]]),
            samplers: HashMap::new(),
            bind_groups: HashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.textures.len()
    }

    /// Upload new textures of `set` and drop the ones it no longer references.
    pub fn sync(&mut self, device: &wgpu::Device, queue: &wgpu::Queue, set: &TextureSet) {
        self.handles.clear();
        for image in &set.images {
            if !is_uploadable(image) {
                tracing::warn!(
                    "Texture {:#x} has invalid size {}x{}, sampling white",
                    image.key,
                    image.width,
                    image.height
                );
                self.handles.push(None);
                continue;
            }
            if !self.textures.contains_key(&image.key) {
                tracing::debug!(
                    "Uploading texture {:#x}: {}x{}",
                    image.key,
                    image.width,
                    image.height
                );
                let entry = upload_rgba8(
                    device,
                    queue,
                    "GX Polygon Texture",
                    image.width,
                    image.height,
                    &image.texels,
                );
                self.textures.insert(image.key, entry);
            }
            self.handles.push(Some(image.key));
        }

        let live: hashbrown::HashSet<u64> = self.handles.iter().flatten().copied().collect();
        let before = self.textures.len();
        self.textures.retain(|key, _| live.contains(key));
        if self.textures.len() != before {
            tracing::debug!("Dropped {} unused textures", before - self.textures.len());
        }
        // Bind groups may reference dropped views
        self.bind_groups.clear();
    }

    /// Bind group for a polygon's texture binding, created on first use.
    pub fn bind_group(
        &mut self,
        device: &wgpu::Device,
        layout: &wgpu::BindGroupLayout,
        binding: &TextureBinding,
    ) -> &wgpu::BindGroup {
        let key = binding
            .handle
            .and_then(|handle| self.handles.get(handle as usize).copied().flatten());
        let sampler_key = SamplerKey::from_binding(binding);

        let Self {
            textures,
            white,
            samplers,
            bind_groups,
            ..
        } = self;

        bind_groups.entry((key, sampler_key)).or_insert_with(|| {
            let view = key
                .and_then(|key| textures.get(&key))
                .map_or(&white.view, |entry| &entry.view);
            let sampler = samplers
                .entry(sampler_key)
                .or_insert_with(|| device.create_sampler(&sampler_key.descriptor()));
            device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("GX Polygon Texture Bind Group"),
                layout,
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: 0,
                        resource: wgpu::BindingResource::TextureView(view),
                    },
                    wgpu::BindGroupEntry {
                        binding: 1,
                        resource: wgpu::BindingResource::Sampler(sampler),
                    },
                ],
            })
        })
    }
}

fn is_uploadable(image: &TextureImage) -> bool {
    image.width > 0
        && image.height > 0
        && image.texels.len() == image.width as usize * image.height as usize
}

/// Clear image color and attributes at native resolution.
pub struct ClearImageTextures {
    color: TextureEntry,
    attributes: TextureEntry,
}

impl ClearImageTextures {
    pub fn new(device: &wgpu::Device, queue: &wgpu::Queue, image: &ClearImage) -> Self {
        let texels: Vec<[u8; 4]> = (0..ClearImage::PIXELS)
            .map(|index| image.color_rgba8(index))
            .collect();
        let color = upload_rgba8(
            device,
            queue,
            "GX Clear Image Color",
            NATIVE_WIDTH,
            NATIVE_HEIGHT,
            &texels,
        );

        let texture = device.create_texture_with_data(
            queue,
            &wgpu::TextureDescriptor {
                label: Some("GX Clear Image Attributes"),
                size: wgpu::Extent3d {
                    width: NATIVE_WIDTH,
                    height: NATIVE_HEIGHT,
                    depth_or_array_layers: 1,
                },
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: CLEAR_ATTRIBUTES_FORMAT,
                usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
                view_formats: &[],
            },
            wgpu::util::TextureDataOrder::LayerMajor,
            bytemuck::cast_slice(&clear_attributes(image)),
        );
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());

        Self {
            color,
            attributes: TextureEntry { texture, view },
        }
    }

    pub fn color_view(&self) -> &wgpu::TextureView {
        &self.color.view
    }

    pub fn attributes_view(&self) -> &wgpu::TextureView {
        &self.attributes.view
    }
}

/// Per-texel (depth, fog) pairs of the clear image.
pub fn clear_attributes(image: &ClearImage) -> Vec<[f32; 2]> {
    (0..ClearImage::PIXELS)
        .map(|index| {
            let fog = if image.fog[index] { 1.0 } else { 0.0 };
            [image.depth_normalized(index), fog]
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use gx_common::DEPTH_MAX;

    #[test]
    fn test_sampler_descriptor_modes() {
        let key = SamplerKey {
            wrap_s: WrapMode::Repeat,
            wrap_t: WrapMode::MirrorRepeat,
            linear: true,
        };
        let desc = key.descriptor();
        assert_eq!(desc.address_mode_u, wgpu::AddressMode::Repeat);
        assert_eq!(desc.address_mode_v, wgpu::AddressMode::MirrorRepeat);
        assert_eq!(desc.mag_filter, wgpu::FilterMode::Linear);

        let nearest = SamplerKey::from_binding(&TextureBinding::default()).descriptor();
        assert_eq!(nearest.address_mode_u, wgpu::AddressMode::ClampToEdge);
        assert_eq!(nearest.min_filter, wgpu::FilterMode::Nearest);
    }

    #[test]
    fn test_clear_attributes_layout() {
        let mut image = ClearImage {
            color: vec![0; ClearImage::PIXELS],
            depth: vec![0; ClearImage::PIXELS],
            fog: vec![false; ClearImage::PIXELS],
        };
        image.depth[3] = DEPTH_MAX;
        image.fog[3] = true;

        let attributes = clear_attributes(&image);
        assert_eq!(attributes.len(), ClearImage::PIXELS);
        assert_eq!(attributes[3], [1.0, 1.0]);
        assert_eq!(attributes[0], [0.0, 0.0]);
    }

    #[test]
    fn test_invalid_texture_not_uploaded() {
        assert!(!is_uploadable(&TextureImage {
            key: 1,
            width: 0,
            height: 8,
            texels: Vec::new(),
        }));
        assert!(!is_uploadable(&TextureImage {
            key: 2,
            width: 2,
            height: 2,
            texels: vec![[0; 4]; 3],
        }));
        assert!(is_uploadable(&TextureImage::new(3, 1, 1, vec![[0; 4]])));
    }
}
