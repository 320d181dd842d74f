//! Output packing
//!
//! Converts read-back RGBA8 pixels into the presentation buffers: the main
//! buffer in RGBA6665 or RGBA8888 and the reduced 16-bit RGBA5551 buffer.
//! Both are written top row first.

use gx_common::OutputFormat;
use gx_common::color::{rgba8_to_5551, rgba8_to_6665};
use rayon::prelude::*;

use super::framebuffer::FramebufferOrigin;

/// Source row for output row `row`.
#[inline]
fn source_row(row: usize, height: usize, origin: FramebufferOrigin) -> usize {
    match origin {
        FramebufferOrigin::TopLeft => row,
        FramebufferOrigin::BottomLeft => height - 1 - row,
    }
}

#[inline]
pub fn pack_pixel(color: [u8; 4], format: OutputFormat) -> [u8; 4] {
    match format {
        OutputFormat::Rgba6665 => rgba8_to_6665(color),
        OutputFormat::Rgba8888 => color,
    }
}

/// Fill `main` from `pixels`, flipping rows for bottom-left rasterizers.
pub fn pack_main(
    pixels: &[[u8; 4]],
    width: usize,
    origin: FramebufferOrigin,
    format: OutputFormat,
    main: &mut [[u8; 4]],
) {
    if width == 0 {
        return;
    }
    let height = pixels.len() / width;
    main.par_chunks_mut(width)
        .take(height)
        .enumerate()
        .for_each(|(row, out)| {
            let start = source_row(row, height, origin) * width;
            for (dst, &src) in out.iter_mut().zip(&pixels[start..start + width]) {
                *dst = pack_pixel(src, format);
            }
        });
}

/// Fill the 16-bit buffer from `pixels`, flipping rows for bottom-left rasterizers.
pub fn pack_5551(pixels: &[[u8; 4]], width: usize, origin: FramebufferOrigin, out16: &mut [u16]) {
    if width == 0 {
        return;
    }
    let height = pixels.len() / width;
    out16
        .par_chunks_mut(width)
        .take(height)
        .enumerate()
        .for_each(|(row, out)| {
            let start = source_row(row, height, origin) * width;
            for (dst, &src) in out.iter_mut().zip(&pixels[start..start + width]) {
                *dst = rgba8_to_5551(src);
            }
        });
}

#[cfg(test)]
mod tests {
    use super::*;

    const PIXELS: [[u8; 4]; 4] = [
        [0xFF, 0, 0, 0xFF],
        [0, 0xFF, 0, 0xFF],
        [0, 0, 0xFF, 0x80],
        [0x10, 0x20, 0x30, 0],
    ];

    #[test]
    fn test_pack_6665_top_left() {
        let mut main = [[0u8; 4]; 4];
        pack_main(
            &PIXELS,
            2,
            FramebufferOrigin::TopLeft,
            OutputFormat::Rgba6665,
            &mut main,
        );
        assert_eq!(main[0], [0x3F, 0, 0, 0x1F]);
        assert_eq!(main[2], [0, 0, 0x3F, 0x10]);
        assert_eq!(main[3], [0x04, 0x08, 0x0C, 0]);
    }

    #[test]
    fn test_pack_8888_flips_bottom_left() {
        let mut main = [[0u8; 4]; 4];
        pack_main(
            &PIXELS,
            2,
            FramebufferOrigin::BottomLeft,
            OutputFormat::Rgba8888,
            &mut main,
        );
        assert_eq!(main[0], PIXELS[2]);
        assert_eq!(main[1], PIXELS[3]);
        assert_eq!(main[2], PIXELS[0]);
    }

    #[test]
    fn test_pack_5551() {
        let mut out = [0u16; 4];
        pack_5551(&PIXELS, 2, FramebufferOrigin::TopLeft, &mut out);
        assert_eq!(out[0], 0x801F);
        assert_eq!(out[1], 0x83E0);
        assert_eq!(out[2], 0xFC00);
        // Zero alpha clears the alpha bit
        assert_eq!(out[3], 0x02 | (0x04 << 5) | (0x06 << 10));
    }
}
