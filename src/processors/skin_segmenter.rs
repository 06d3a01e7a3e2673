// SPDX-License-Identifier: GPL-3.0-only

//! Skin-tone segmentation
//!
//! Labels pixels whose chroma falls inside the classic YCbCr skin box as
//! body skin and everything else as background. No model, no face/body
//! split, but it exercises the blend stage with real camera input.

use super::rgb_to_yuv;
use crate::errors::StageError;
use crate::pipelines::compositor::{Category, CategoryMask, Segmenter};
use futures::FutureExt;
use futures::future::BoxFuture;
use image::RgbaImage;
use std::ops::RangeInclusive;
use tracing::{trace, warn};

const CB_RANGE: RangeInclusive<f32> = 77.0..=127.0;
const CR_RANGE: RangeInclusive<f32> = 133.0..=173.0;

/// Chroma-box skin segmenter
#[derive(Debug, Default, Clone, Copy)]
pub struct SkinToneSegmenter;

impl SkinToneSegmenter {
    pub fn new() -> Self {
        Self
    }
}

impl Segmenter for SkinToneSegmenter {
    fn segment<'a>(
        &'a self,
        image: &'a RgbaImage,
        timestamp: u64,
    ) -> BoxFuture<'a, Result<CategoryMask, StageError>> {
        let image = image.clone();
        async move {
            // CPU-bound; keep it off the async workers
            tokio::task::spawn_blocking(move || label_pixels(&image))
                .await
                .map_err(|e| {
                    warn!(timestamp, error = %e, "Segmentation task panicked");
                    StageError::Segmentation(format!("segmentation task failed: {}", e))
                })
        }
        .boxed()
    }
}

fn label_pixels(image: &RgbaImage) -> CategoryMask {
    let start = std::time::Instant::now();
    let mask: CategoryMask = image
        .pixels()
        .map(|px| {
            let (_, u, v) = rgb_to_yuv(px[0] as f32, px[1] as f32, px[2] as f32);
            if CB_RANGE.contains(&(u + 128.0)) && CR_RANGE.contains(&(v + 128.0)) {
                Category::BodySkin.label()
            } else {
                Category::Background.label()
            }
        })
        .collect();
    trace!(
        pixels = mask.len(),
        elapsed_ms = start.elapsed().as_millis(),
        "Skin labels computed"
    );
    mask
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    #[tokio::test]
    async fn test_skin_and_background_labels() {
        let mut image = RgbaImage::new(3, 1);
        image.put_pixel(0, 0, Rgba([224, 172, 140, 255]));
        image.put_pixel(1, 0, Rgba([0, 0, 255, 255]));
        image.put_pixel(2, 0, Rgba([128, 128, 128, 255]));

        let mask = SkinToneSegmenter::new().segment(&image, 0).await.unwrap();
        assert_eq!(
            mask,
            vec![
                Category::BodySkin.label(),
                Category::Background.label(),
                Category::Background.label()
            ]
        );
    }

    #[tokio::test]
    async fn test_mask_matches_pixel_count() {
        let image = RgbaImage::new(7, 5);
        let mask = SkinToneSegmenter::new().segment(&image, 3).await.unwrap();
        assert_eq!(mask.len(), 35);
    }
}
