// SPDX-License-Identifier: MPL-2.0

//! Segmentation blend stage
//!
//! Asks the segmenter for a per-pixel category mask and tints the pixels of
//! the included categories towards their table color:
//!
//! ```text
//! out = round_half_even(c × (1 - mix) + color × mix)
//! ```
//!
//! Alpha is never touched. With the default mix ratio of 0.5 this is the
//! plain average `(c + color) / 2`. A failed or mismatched segmentation
//! leaves the frame unblended and is reported; the frame still moves on.

use super::categories::{Category, CategoryColor, CategoryMask};
use super::raster::RasterFrame;
use super::stage::FrameStage;
use crate::constants::blend::DEFAULT_MIX_RATIO;
use crate::constants::timing::FRAME_LOG_INTERVAL;
use crate::errors::StageError;
use futures::FutureExt;
use futures::future::BoxFuture;
use image::RgbaImage;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

/// Segmentation collaborator
///
/// Returns one label per pixel, row-major. Labels outside the category
/// table are allowed and never blended.
pub trait Segmenter: Send + Sync {
    fn segment<'a>(
        &'a self,
        image: &'a RgbaImage,
        timestamp: u64,
    ) -> BoxFuture<'a, Result<CategoryMask, StageError>>;
}

/// Which categories get tinted and how strongly
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlendSettings {
    /// Categories to tint
    pub include: Vec<Category>,
    /// Weight of the category color (0.0 keeps the frame, 1.0 paints solid)
    pub mix_ratio: f32,
}

impl Default for BlendSettings {
    fn default() -> Self {
        Self {
            include: vec![Category::BodySkin, Category::FaceSkin],
            mix_ratio: DEFAULT_MIX_RATIO,
        }
    }
}

impl BlendSettings {
    /// Canonical form: sorted, deduplicated categories and a mix ratio in
    /// `[0, 1]` (NaN falls back to the default)
    pub fn normalized(&self) -> Self {
        let mut include = self.include.clone();
        include.sort();
        include.dedup();
        let mix_ratio = if self.mix_ratio.is_nan() {
            DEFAULT_MIX_RATIO
        } else {
            self.mix_ratio.clamp(0.0, 1.0)
        };
        Self { include, mix_ratio }
    }
}

/// Precomputed per-label blend targets
///
/// Indexed by the raw mask byte, so a label outside the category table
/// simply has no entry.
pub struct BlendTable {
    targets: [Option<CategoryColor>; 256],
    mix: f32,
}

impl BlendTable {
    pub fn new(settings: &BlendSettings) -> Self {
        let settings = settings.normalized();
        let mut targets = [None; 256];
        for category in &settings.include {
            targets[category.label() as usize] = Some(category.color());
        }
        Self {
            targets,
            mix: settings.mix_ratio,
        }
    }

    #[cfg(test)]
    fn includes(&self, label: u8) -> bool {
        self.targets[label as usize].is_some()
    }

    /// Blend `rgba` in place; `mask` must hold one label per pixel
    pub fn apply(&self, rgba: &mut [u8], mask: &[u8]) {
        let keep = 1.0 - self.mix;
        for (px, &label) in rgba.chunks_exact_mut(4).zip(mask) {
            let Some(color) = self.targets[label as usize] else {
                continue;
            };
            for (channel, target) in px[..3].iter_mut().zip(color) {
                let mixed = *channel as f32 * keep + target as f32 * self.mix;
                *channel = mixed.round_ties_even().clamp(0.0, 255.0) as u8;
            }
        }
    }
}

/// Tint the included categories of `rgba` according to `mask`
pub fn blend_category_mask(rgba: &mut [u8], mask: &[u8], settings: &BlendSettings) {
    BlendTable::new(settings).apply(rgba, mask);
}

/// Segmentation stage: segment, then blend in place
pub struct SegmentationBlendStage {
    segmenter: Arc<dyn Segmenter>,
    table: BlendTable,
    blended: u64,
    failures: u64,
}

impl SegmentationBlendStage {
    pub fn new(segmenter: Arc<dyn Segmenter>, settings: &BlendSettings) -> Self {
        Self {
            segmenter,
            table: BlendTable::new(settings),
            blended: 0,
            failures: 0,
        }
    }

    fn report_failure(&mut self, timestamp: u64, error: &StageError) {
        self.failures += 1;
        if self.failures == 1 || self.failures % FRAME_LOG_INTERVAL == 0 {
            warn!(
                timestamp,
                failures = self.failures,
                error = %error,
                "Segmentation failed, forwarding frame unblended"
            );
        }
    }
}

impl FrameStage for SegmentationBlendStage {
    fn name(&self) -> &'static str {
        "segmentation-blend"
    }

    fn process(&mut self, mut frame: RasterFrame) -> BoxFuture<'_, RasterFrame> {
        async move {
            let timestamp = frame.timestamp();
            let result = self.segmenter.segment(frame.image(), timestamp).await;

            match result {
                Ok(mask) if mask.len() == frame.pixel_count() => {
                    self.table.apply(frame.pixels_mut(), &mask);
                    self.blended += 1;
                    if self.blended % FRAME_LOG_INTERVAL == 0 {
                        debug!(blended = self.blended, "Segmentation blend");
                    }
                }
                Ok(mask) => {
                    let error = StageError::Segmentation(format!(
                        "mask has {} labels for {} pixels",
                        mask.len(),
                        frame.pixel_count()
                    ));
                    self.report_failure(timestamp, &error);
                }
                Err(error) => self.report_failure(timestamp, &error),
            }

            frame
        }
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_blend_averages_body_skin() {
        let mut rgba = vec![200, 200, 200, 255];
        blend_category_mask(&mut rgba, &[2], &BlendSettings::default());
        assert_eq!(rgba, vec![228, 152, 100, 255]);
    }

    #[test]
    fn test_half_values_round_to_even() {
        // (1 + 206) / 2 = 103.5 → 104, (2 + 162) / 2 = 82, (3 + 98) / 2 = 50.5 → 50
        let settings = BlendSettings {
            include: vec![Category::Background],
            ..Default::default()
        };
        let mut rgba = vec![1, 2, 3, 9];
        blend_category_mask(&mut rgba, &[0], &settings);
        assert_eq!(rgba, vec![104, 82, 50, 9]);
    }

    #[test]
    fn test_excluded_and_unknown_labels_untouched() {
        let mut rgba = vec![10, 20, 30, 40, 50, 60, 70, 80, 90, 100, 110, 120];
        let before = rgba.clone();
        blend_category_mask(&mut rgba, &[0, 1, 200], &BlendSettings::default());
        assert_eq!(rgba, before);
    }

    #[test]
    fn test_mix_ratio_extremes() {
        let paint = BlendSettings {
            include: vec![Category::Hair],
            mix_ratio: 1.0,
        };
        let mut rgba = vec![5, 5, 5, 5];
        blend_category_mask(&mut rgba, &[1], &paint);
        assert_eq!(rgba, vec![193, 0, 32, 5]);

        let keep = BlendSettings {
            include: vec![Category::Hair],
            mix_ratio: 0.0,
        };
        let mut rgba = vec![5, 5, 5, 5];
        blend_category_mask(&mut rgba, &[1], &keep);
        assert_eq!(rgba, vec![5, 5, 5, 5]);
    }

    #[test]
    fn test_normalized_sorts_and_clamps() {
        let settings = BlendSettings {
            include: vec![Category::FaceSkin, Category::BodySkin, Category::FaceSkin],
            mix_ratio: 3.0,
        };
        let normalized = settings.normalized();
        assert_eq!(normalized.include, vec![Category::BodySkin, Category::FaceSkin]);
        assert_eq!(normalized.mix_ratio, 1.0);
        assert_eq!(BlendSettings::default().normalized(), BlendSettings::default());
    }

    #[test]
    fn test_table_includes() {
        let table = BlendTable::new(&BlendSettings::default());
        assert!(table.includes(2));
        assert!(table.includes(3));
        assert!(!table.includes(0));
        assert!(!table.includes(255));
    }
}
