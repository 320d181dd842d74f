//! G-buffer attachments on the GPU
//!
//! Four RGBA8 color attachments (color, identity, fog attributes, working),
//! a combined depth/stencil attachment and two helpers: a float copy of the
//! depth for post-processing and a copy of the back-facing mask that
//! translucent draws sample while the working attachment is bound.
//!
//! With multisampling every pass renders into the multisampled textures and
//! resolves into the single-sampled ones, which are what passes sample and
//! what readback copies.

use crate::graphics::{Attachment, FramebufferDesc};

pub const COLOR_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;
pub const DEPTH_STENCIL_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth24PlusStencil8;
pub const DEPTH_COPY_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::R32Float;

/// Shader output location of each color attachment.
pub const fn attachment_index(attachment: Attachment) -> usize {
    match attachment {
        Attachment::Color => 0,
        Attachment::PolygonId => 1,
        Attachment::FogAttributes => 2,
        Attachment::Working => 3,
    }
}

pub const ATTACHMENTS: [Attachment; 4] = [
    Attachment::Color,
    Attachment::PolygonId,
    Attachment::FogAttributes,
    Attachment::Working,
];

struct ColorTarget {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    multisampled: Option<(wgpu::Texture, wgpu::TextureView)>,
}

pub struct Attachments {
    pub width: u32,
    pub height: u32,
    pub sample_count: u32,
    targets: [ColorTarget; 4],
    #[allow(dead_code)] // Keeps the views below alive
    depth_stencil_texture: wgpu::Texture,
    depth_stencil_view: wgpu::TextureView,
    /// Depth aspect only, for the depth resolve pass
    depth_view: wgpu::TextureView,
    #[allow(dead_code)] // Keeps depth_copy_view alive
    depth_copy_texture: wgpu::Texture,
    depth_copy_view: wgpu::TextureView,
    back_facing_texture: wgpu::Texture,
    back_facing_view: wgpu::TextureView,
}

fn extent(width: u32, height: u32) -> wgpu::Extent3d {
    wgpu::Extent3d {
        width,
        height,
        depth_or_array_layers: 1,
    }
}

fn create_texture(
    device: &wgpu::Device,
    label: &str,
    desc: &FramebufferDesc,
    format: wgpu::TextureFormat,
    sample_count: u32,
    usage: wgpu::TextureUsages,
) -> (wgpu::Texture, wgpu::TextureView) {
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some(label),
        size: extent(desc.width, desc.height),
        mip_level_count: 1,
        sample_count,
        dimension: wgpu::TextureDimension::D2,
        format,
        usage,
        view_formats: &[],
    });
    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
    (texture, view)
}

impl Attachments {
    pub fn new(device: &wgpu::Device, desc: &FramebufferDesc) -> Self {
        let sample_count = desc.sample_count();
        let sampled = wgpu::TextureUsages::RENDER_ATTACHMENT
            | wgpu::TextureUsages::TEXTURE_BINDING
            | wgpu::TextureUsages::COPY_SRC;

        let targets = ATTACHMENTS.map(|attachment| {
            let label = format!("GX {:?} Attachment", attachment);
            let (texture, view) = create_texture(device, &label, desc, COLOR_FORMAT, 1, sampled);
            let multisampled = (sample_count > 1).then(|| {
                let label = format!("GX {:?} Attachment (MSAA)", attachment);
                create_texture(
                    device,
                    &label,
                    desc,
                    COLOR_FORMAT,
                    sample_count,
                    wgpu::TextureUsages::RENDER_ATTACHMENT,
                )
            });
            ColorTarget {
                texture,
                view,
                multisampled,
            }
        });

        let (depth_stencil_texture, depth_stencil_view) = create_texture(
            device,
            "GX Depth Stencil",
            desc,
            DEPTH_STENCIL_FORMAT,
            sample_count,
            wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
        );
        let depth_view = depth_stencil_texture.create_view(&wgpu::TextureViewDescriptor {
            label: Some("GX Depth Aspect"),
            aspect: wgpu::TextureAspect::DepthOnly,
            ..Default::default()
        });

        let (depth_copy_texture, depth_copy_view) = create_texture(
            device,
            "GX Depth Copy",
            desc,
            DEPTH_COPY_FORMAT,
            1,
            wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
        );

        let (back_facing_texture, back_facing_view) = create_texture(
            device,
            "GX Back-Facing Mask",
            desc,
            COLOR_FORMAT,
            1,
            wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
        );

        Self {
            width: desc.width,
            height: desc.height,
            sample_count,
            targets,
            depth_stencil_texture,
            depth_stencil_view,
            depth_view,
            depth_copy_texture,
            depth_copy_view,
            back_facing_texture,
            back_facing_view,
        }
    }

    /// Single-sampled texture of an attachment (readback and copies).
    pub fn texture(&self, attachment: Attachment) -> &wgpu::Texture {
        &self.targets[attachment_index(attachment)].texture
    }

    /// Single-sampled view of an attachment, as sampled by full-screen passes.
    pub fn view(&self, attachment: Attachment) -> &wgpu::TextureView {
        &self.targets[attachment_index(attachment)].view
    }

    pub fn depth_view(&self) -> &wgpu::TextureView {
        &self.depth_view
    }

    pub fn depth_copy_view(&self) -> &wgpu::TextureView {
        &self.depth_copy_view
    }

    pub fn back_facing_view(&self) -> &wgpu::TextureView {
        &self.back_facing_view
    }

    /// Pass attachment for `attachment`, resolving when multisampled.
    pub fn color_attachment(
        &self,
        attachment: Attachment,
        load: wgpu::LoadOp<wgpu::Color>,
    ) -> wgpu::RenderPassColorAttachment<'_> {
        let target = &self.targets[attachment_index(attachment)];
        let (view, resolve_target) = match &target.multisampled {
            Some((_, multisampled)) => (multisampled, Some(&target.view)),
            None => (&target.view, None),
        };
        wgpu::RenderPassColorAttachment {
            view,
            depth_slice: None,
            resolve_target,
            ops: wgpu::Operations {
                load,
                store: wgpu::StoreOp::Store,
            },
        }
    }

    /// All four attachments in shader output order.
    pub fn geometry_attachments(
        &self,
        clear: Option<&[wgpu::Color; 4]>,
    ) -> [Option<wgpu::RenderPassColorAttachment<'_>>; 4] {
        ATTACHMENTS.map(|attachment| {
            let load = match clear {
                Some(colors) => wgpu::LoadOp::Clear(colors[attachment_index(attachment)]),
                None => wgpu::LoadOp::Load,
            };
            Some(self.color_attachment(attachment, load))
        })
    }

    /// Depth/stencil attachment, optionally cleared to (depth, stencil).
    pub fn depth_stencil_attachment(
        &self,
        clear: Option<(f32, u8)>,
    ) -> wgpu::RenderPassDepthStencilAttachment<'_> {
        let (depth_load, stencil_load) = match clear {
            Some((depth, stencil)) => (
                wgpu::LoadOp::Clear(depth),
                wgpu::LoadOp::Clear(u32::from(stencil)),
            ),
            None => (wgpu::LoadOp::Load, wgpu::LoadOp::Load),
        };
        wgpu::RenderPassDepthStencilAttachment {
            view: &self.depth_stencil_view,
            depth_ops: Some(wgpu::Operations {
                load: depth_load,
                store: wgpu::StoreOp::Store,
            }),
            stencil_ops: Some(wgpu::Operations {
                load: stencil_load,
                store: wgpu::StoreOp::Store,
            }),
        }
    }

    /// Float depth copy as a single-sampled color attachment.
    pub fn depth_copy_attachment(&self) -> wgpu::RenderPassColorAttachment<'_> {
        wgpu::RenderPassColorAttachment {
            view: &self.depth_copy_view,
            depth_slice: None,
            resolve_target: None,
            ops: wgpu::Operations {
                load: wgpu::LoadOp::Clear(wgpu::Color::WHITE),
                store: wgpu::StoreOp::Store,
            },
        }
    }

    /// Copy the resolved working attachment into the back-facing mask.
    pub fn copy_back_facing(&self, encoder: &mut wgpu::CommandEncoder) {
        encoder.copy_texture_to_texture(
            self.texture(Attachment::Working).as_image_copy(),
            self.back_facing_texture.as_image_copy(),
            extent(self.width, self.height),
        );
    }
}

/// Clear color of each attachment, in shader output order.
pub fn clear_colors(targets: &crate::graphics::ClearTargets) -> [wgpu::Color; 4] {
    [targets.color, targets.polygon_id, targets.fog, targets.working].map(|[r, g, b, a]| {
        wgpu::Color {
            r: f64::from(r),
            g: f64::from(g),
            b: f64::from(b),
            a: f64::from(a),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use gx_common::ClearValues;

    use crate::graphics::ClearTargets;

    #[test]
    fn test_attachment_index_matches_order() {
        for (index, attachment) in ATTACHMENTS.iter().enumerate() {
            assert_eq!(attachment_index(*attachment), index);
        }
    }

    #[test]
    fn test_clear_colors_order() {
        let targets = ClearTargets::from_values(&ClearValues {
            color: [63, 0, 0, 31],
            polygon_id: 63,
            fog: true,
            ..Default::default()
        });
        let colors = clear_colors(&targets);
        assert_eq!(colors[0], wgpu::Color::RED);
        assert_eq!(colors[1].r, 1.0);
        assert_eq!(colors[2].r, 1.0);
        assert_eq!(colors[3], wgpu::Color::TRANSPARENT);
    }
}
