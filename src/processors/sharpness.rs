// SPDX-License-Identifier: GPL-3.0-only

//! Edge-width blur measurement
//!
//! Finds vertical edges with a horizontal Sobel gradient and measures how
//! many pixels each edge takes to go from dark to bright along its row. Sharp
//! frames have narrow edges; blurry frames have wide ones. The result is
//! normalized by the frame width.

use super::rgb_to_yuv;
use crate::errors::StageError;
use crate::pipelines::compositor::{BlurStats, SharpnessScorer};
use image::RgbaImage;
use tracing::trace;

/// Minimum Sobel magnitude (out of 1020) for a pixel to count as an edge
const DEFAULT_EDGE_THRESHOLD: f32 = 64.0;

/// Edge-width sharpness scorer
#[derive(Debug, Clone)]
pub struct EdgeWidthScorer {
    threshold: f32,
}

impl Default for EdgeWidthScorer {
    fn default() -> Self {
        Self::new()
    }
}

impl EdgeWidthScorer {
    pub fn new() -> Self {
        Self {
            threshold: DEFAULT_EDGE_THRESHOLD,
        }
    }

    /// Scorer with a custom gradient threshold
    pub fn with_threshold(threshold: f32) -> Self {
        Self { threshold }
    }
}

impl SharpnessScorer for EdgeWidthScorer {
    fn measure(&self, image: &RgbaImage) -> Result<BlurStats, StageError> {
        let start = std::time::Instant::now();
        let width = image.width();
        let height = image.height();
        if width < 3 || height < 3 {
            return Err(StageError::Scoring(format!(
                "image too small ({}x{})",
                width, height
            )));
        }

        let w = width as usize;
        let luma: Vec<f32> = image
            .pixels()
            .map(|px| rgb_to_yuv(px[0] as f32, px[1] as f32, px[2] as f32).0)
            .collect();

        let mut gradient = vec![0.0f32; w];
        let mut num_edges: u32 = 0;
        let mut total_width: u64 = 0;

        for y in 1..height as usize - 1 {
            let above = &luma[(y - 1) * w..y * w];
            let row = &luma[y * w..(y + 1) * w];
            let below = &luma[(y + 1) * w..(y + 2) * w];

            for x in 1..w - 1 {
                gradient[x] = (above[x + 1] + 2.0 * row[x + 1] + below[x + 1])
                    - (above[x - 1] + 2.0 * row[x - 1] + below[x - 1]);
            }

            for x in 1..w - 1 {
                let magnitude = gradient[x].abs();
                if magnitude < self.threshold
                    || magnitude < gradient[x - 1].abs()
                    || magnitude <= gradient[x + 1].abs()
                {
                    continue;
                }
                total_width += edge_width(row, x, gradient[x] > 0.0) as u64;
                num_edges += 1;
            }
        }

        if num_edges == 0 {
            return Err(StageError::Scoring("no edges detected".into()));
        }

        let avg_edge_width = total_width as f32 / num_edges as f32;
        trace!(
            num_edges,
            avg_edge_width,
            elapsed_ms = start.elapsed().as_millis(),
            "Measured edge widths"
        );

        Ok(BlurStats {
            width,
            height,
            num_edges,
            avg_edge_width,
            avg_edge_width_perc: avg_edge_width / width as f32,
        })
    }
}

/// Distance between the luma extrema on either side of an edge at `x`
fn edge_width(row: &[f32], x: usize, rising: bool) -> usize {
    let toward_dark = |a: f32, b: f32| if rising { a < b } else { a > b };

    let mut left = x;
    while left > 0 && toward_dark(row[left - 1], row[left]) {
        left -= 1;
    }
    let mut right = x;
    while right + 1 < row.len() && toward_dark(row[right], row[right + 1]) {
        right += 1;
    }
    (right - left).max(1)
}
