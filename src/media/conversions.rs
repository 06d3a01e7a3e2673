// SPDX-License-Identifier: GPL-3.0-only

//! Packed pixel format conversion
//!
//! Raster conversion turns every captured layout into tightly packed RGBA;
//! encoding turns RGBA back into opaque packed RGB.

use crate::backends::camera::types::PixelFormat;
use crate::errors::StageError;
use image::RgbaImage;

/// Convert a packed frame (with optional row padding) into an RGBA image
///
/// Fails on zero dimensions, a stride shorter than one row, or a buffer too
/// short for the declared geometry.
pub fn to_rgba_image(
    data: &[u8],
    width: u32,
    height: u32,
    stride: u32,
    format: PixelFormat,
) -> Result<RgbaImage, StageError> {
    if width == 0 || height == 0 {
        return Err(StageError::Decode(format!(
            "empty frame ({}x{})",
            width, height
        )));
    }

    let w = width as usize;
    let h = height as usize;
    let stride = stride as usize;
    let bpp = format.bytes_per_pixel();
    let row_bytes = w * bpp;

    if stride < row_bytes {
        return Err(StageError::Decode(format!(
            "stride {} shorter than row ({} bytes)",
            stride, row_bytes
        )));
    }

    let required = stride * (h - 1) + row_bytes;
    if data.len() < required {
        return Err(StageError::Decode(format!(
            "buffer has {} bytes, {}x{} {:?} needs {}",
            data.len(),
            width,
            height,
            format,
            required
        )));
    }

    let mut rgba = vec![0u8; w * h * 4];

    // Fast path: already tightly packed RGBA
    if format == PixelFormat::Rgba && stride == row_bytes {
        rgba.copy_from_slice(&data[..w * h * 4]);
    } else {
        for y in 0..h {
            let src = &data[y * stride..y * stride + row_bytes];
            let dst = &mut rgba[y * w * 4..(y + 1) * w * 4];
            convert_row(src, dst, format);
        }
    }

    RgbaImage::from_raw(width, height, rgba)
        .ok_or_else(|| StageError::Decode("RGBA buffer does not match dimensions".into()))
}

/// Convert one row of `format` pixels into RGBA
fn convert_row(src: &[u8], dst: &mut [u8], format: PixelFormat) {
    let bpp = format.bytes_per_pixel();
    for (px, out) in src.chunks_exact(bpp).zip(dst.chunks_exact_mut(4)) {
        let [r, g, b, a] = match format {
            PixelFormat::Rgba => [px[0], px[1], px[2], px[3]],
            PixelFormat::Rgbx => [px[0], px[1], px[2], 255],
            PixelFormat::Bgra => [px[2], px[1], px[0], px[3]],
            PixelFormat::Bgrx => [px[2], px[1], px[0], 255],
            PixelFormat::Rgb24 => [px[0], px[1], px[2], 255],
            PixelFormat::Bgr24 => [px[2], px[1], px[0], 255],
            PixelFormat::Gray8 => [px[0], px[0], px[0], 255],
        };
        out.copy_from_slice(&[r, g, b, a]);
    }
}

/// Drop the alpha channel of packed RGBA pixels
pub fn rgba_to_rgb(rgba: &[u8]) -> Vec<u8> {
    let mut rgb = Vec::with_capacity(rgba.len() / 4 * 3);
    for px in rgba.chunks_exact(4) {
        rgb.extend_from_slice(&px[..3]);
    }
    rgb
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tight_rgba_is_copied_verbatim() {
        let data: Vec<u8> = (0..16).collect();
        let img = to_rgba_image(&data, 2, 2, 8, PixelFormat::Rgba).unwrap();
        assert_eq!(img.as_raw(), &data);
    }

    #[test]
    fn test_stride_padding_is_skipped() {
        // 1x2 BGRx with 4 bytes of padding per row
        let data = [
            3, 2, 1, 0, 9, 9, 9, 9, //
            6, 5, 4, 0, 9, 9, 9, 9,
        ];
        let img = to_rgba_image(&data, 1, 2, 8, PixelFormat::Bgrx).unwrap();
        assert_eq!(img.as_raw(), &vec![1, 2, 3, 255, 4, 5, 6, 255]);
    }

    #[test]
    fn test_gray_expands_to_rgba() {
        let img = to_rgba_image(&[7, 200], 2, 1, 2, PixelFormat::Gray8).unwrap();
        assert_eq!(img.as_raw(), &vec![7, 7, 7, 255, 200, 200, 200, 255]);
    }

    #[test]
    fn test_short_buffer_is_a_decode_error() {
        let err = to_rgba_image(&[0; 10], 2, 2, 8, PixelFormat::Rgba).unwrap_err();
        assert!(matches!(err, StageError::Decode(_)));
    }

    #[test]
    fn test_zero_size_is_a_decode_error() {
        assert!(to_rgba_image(&[], 0, 4, 0, PixelFormat::Rgba).is_err());
    }

    #[test]
    fn test_rgba_to_rgb_discards_alpha() {
        assert_eq!(rgba_to_rgb(&[1, 2, 3, 4, 5, 6, 7, 8]), vec![1, 2, 3, 5, 6, 7]);
    }
}
