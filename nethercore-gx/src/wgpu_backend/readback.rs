//! Asynchronous output readback
//!
//! `end_frame` records a copy of the output attachment into a staging
//! buffer and starts mapping it; `read_pixels` waits for the mapping and
//! strips the row padding.

use std::sync::mpsc;

use crate::error::{GxError, GxResult};

const BYTES_PER_PIXEL: u32 = 4;

/// Row pitch of the staging buffer, aligned to `COPY_BYTES_PER_ROW_ALIGNMENT`.
pub fn padded_bytes_per_row(width: u32) -> u32 {
    let unpadded = width * BYTES_PER_PIXEL;
    let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
    unpadded.div_ceil(align) * align
}

/// Copy `height` rows of `width` pixels out of a padded staging buffer.
pub fn unpad_rows(mapped: &[u8], width: u32, height: u32, pixels: &mut Vec<[u8; 4]>) {
    let padded = padded_bytes_per_row(width) as usize;
    let row_bytes = (width * BYTES_PER_PIXEL) as usize;
    pixels.clear();
    pixels.reserve(width as usize * height as usize);
    for row in mapped.chunks(padded).take(height as usize) {
        pixels.extend(
            row[..row_bytes]
                .chunks_exact(BYTES_PER_PIXEL as usize)
                .map(|texel| [texel[0], texel[1], texel[2], texel[3]]),
        );
    }
}

type MapResult = Result<(), wgpu::BufferAsyncError>;

/// Readback recorded into a frame's command encoder.
pub struct PendingReadback {
    buffer: wgpu::Buffer,
    width: u32,
    height: u32,
    receiver: Option<mpsc::Receiver<MapResult>>,
}

impl PendingReadback {
    /// Record a copy of `texture` into a new staging buffer.
    pub fn record(
        device: &wgpu::Device,
        encoder: &mut wgpu::CommandEncoder,
        texture: &wgpu::Texture,
        width: u32,
        height: u32,
    ) -> Self {
        let bytes_per_row = padded_bytes_per_row(width);
        let buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("GX Readback Staging Buffer"),
            size: u64::from(bytes_per_row) * u64::from(height),
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::TexelCopyBufferInfo {
                buffer: &buffer,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(bytes_per_row),
                    rows_per_image: Some(height),
                },
            },
            wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );

        Self {
            buffer,
            width,
            height,
            receiver: None,
        }
    }

    /// Start mapping; call once the copy has been submitted.
    pub fn begin_map(&mut self) {
        let (tx, rx) = mpsc::channel();
        self.buffer
            .slice(..)
            .map_async(wgpu::MapMode::Read, move |result| {
                let _ = tx.send(result);
            });
        self.receiver = Some(rx);
    }

    /// Wait for the mapping and copy the pixels out.
    pub fn finish(self, device: &wgpu::Device, pixels: &mut Vec<[u8; 4]>) -> GxResult<()> {
        let receiver = self
            .receiver
            .ok_or_else(|| GxError::Readback("readback was never submitted".into()))?;

        device
            .poll(wgpu::PollType::wait_indefinitely())
            .map_err(|e| GxError::Readback(format!("failed to poll device: {}", e)))?;

        receiver
            .recv()
            .map_err(|e| GxError::Readback(format!("map callback dropped: {}", e)))?
            .map_err(|e| GxError::Readback(format!("failed to map buffer: {}", e)))?;

        let slice = self.buffer.slice(..);
        let mapped = slice.get_mapped_range();
        unpad_rows(&mapped, self.width, self.height, pixels);
        drop(mapped);
        self.buffer.unmap();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_padded_row_alignment() {
        assert_eq!(padded_bytes_per_row(256), 1024);
        assert_eq!(padded_bytes_per_row(100), 512);
        assert_eq!(padded_bytes_per_row(1), 256);
    }

    #[test]
    fn test_unpad_rows() {
        let width = 3;
        let padded = padded_bytes_per_row(width) as usize;
        let mut mapped = vec![0xAAu8; padded * 2];
        for row in 0..2 {
            for x in 0..3 {
                let offset = row * padded + x * 4;
                mapped[offset..offset + 4].copy_from_slice(&[row as u8, x as u8, 0, 0xFF]);
            }
        }

        let mut pixels = vec![[9; 4]; 10];
        unpad_rows(&mapped, width, 2, &mut pixels);
        assert_eq!(pixels.len(), 6);
        assert_eq!(pixels[0], [0, 0, 0, 0xFF]);
        assert_eq!(pixels[5], [1, 2, 0, 0xFF]);
    }
}
