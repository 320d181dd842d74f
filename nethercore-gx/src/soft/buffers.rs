//! Software G-buffer
//!
//! Rows are stored bottom row first, matching the GL-style window
//! coordinates the rasterizer works in.

use gx_common::DEPTH_MAX;

use crate::error::{GxError, GxResult};
use crate::graphics::{Attachment, ClearTargets};

/// Every attachment of the software framebuffer set.
#[derive(Debug, Clone, Default)]
pub struct GBuffer {
    pub width: u32,
    pub height: u32,
    pub color: Vec<[f32; 4]>,
    pub polygon_id: Vec<[f32; 4]>,
    pub fog: Vec<[f32; 4]>,
    pub working: Vec<[f32; 4]>,
    /// Back-facing mask resolved from the working attachment
    pub back_facing: Vec<bool>,
    /// 24-bit depth
    pub depth: Vec<u32>,
    pub stencil: Vec<u8>,
}

fn allocate<T: Clone>(len: usize, value: T, width: u32, height: u32) -> GxResult<Vec<T>> {
    let mut buffer = Vec::new();
    buffer.try_reserve_exact(len).map_err(|e| GxError::Resize {
        width,
        height,
        reason: e.to_string(),
    })?;
    buffer.resize(len, value);
    Ok(buffer)
}

impl GBuffer {
    pub fn new(width: u32, height: u32) -> GxResult<Self> {
        let len = width as usize * height as usize;
        Ok(Self {
            width,
            height,
            color: allocate(len, [0.0; 4], width, height)?,
            polygon_id: allocate(len, [0.0; 4], width, height)?,
            fog: allocate(len, [0.0; 4], width, height)?,
            working: allocate(len, [0.0; 4], width, height)?,
            back_facing: allocate(len, false, width, height)?,
            depth: allocate(len, DEPTH_MAX, width, height)?,
            stencil: allocate(len, 0, width, height)?,
        })
    }

    pub fn len(&self) -> usize {
        self.color.len()
    }

    pub fn is_empty(&self) -> bool {
        self.color.is_empty()
    }

    #[inline]
    pub fn index(&self, x: u32, y: u32) -> usize {
        y as usize * self.width as usize + x as usize
    }

    pub fn attachment(&self, attachment: Attachment) -> &[[f32; 4]] {
        match attachment {
            Attachment::Color => &self.color,
            Attachment::PolygonId => &self.polygon_id,
            Attachment::FogAttributes => &self.fog,
            Attachment::Working => &self.working,
        }
    }

    /// Write one pixel's clear values.
    #[inline]
    pub fn clear_pixel(&mut self, index: usize, targets: &ClearTargets) {
        self.color[index] = targets.color;
        self.polygon_id[index] = targets.polygon_id;
        self.fog[index] = targets.fog;
        self.working[index] = targets.working;
        self.back_facing[index] = false;
        self.depth[index] = depth_to_fixed(targets.depth);
        self.stencil[index] = targets.stencil;
    }

    /// Clear the stencil bits in `write_mask` to `value`.
    pub fn clear_stencil(&mut self, value: u8, write_mask: u8) {
        for stored in &mut self.stencil {
            *stored = (*stored & !write_mask) | (value & write_mask);
        }
    }

    /// Latch the back-facing flags written to the working attachment.
    pub fn resolve_back_facing(&mut self) {
        for (flag, working) in self.back_facing.iter_mut().zip(&self.working) {
            *flag = working[0] > 0.5;
        }
    }
}

/// Normalized depth to the 24-bit stored format.
#[inline]
pub fn depth_to_fixed(depth: f32) -> u32 {
    (depth.clamp(0.0, 1.0) * DEPTH_MAX as f32).round() as u32
}

/// 24-bit stored depth to normalized depth.
#[inline]
pub fn depth_to_normalized(depth: u32) -> f32 {
    depth as f32 / DEPTH_MAX as f32
}
