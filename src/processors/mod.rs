// SPDX-License-Identifier: MPL-2.0

//! Built-in frame analysis collaborators
//!
//! - [`sharpness`]: edge-width blur measurement for the scoring stage
//! - [`skin_segmenter`]: color-space skin labeling for the segmentation stage
//!
//! Both are plain CPU implementations. A model-backed segmenter plugs in
//! through the same [`Segmenter`](crate::pipelines::compositor::Segmenter)
//! trait.

pub mod sharpness;
pub mod skin_segmenter;

pub use sharpness::EdgeWidthScorer;
pub use skin_segmenter::SkinToneSegmenter;

/// BT.601 luma/chroma for 0-255 RGB (chroma centered on zero)
#[inline]
pub(crate) fn rgb_to_yuv(r: f32, g: f32, b: f32) -> (f32, f32, f32) {
    let y = 0.299 * r + 0.587 * g + 0.114 * b;
    let u = -0.169 * r - 0.331 * g + 0.500 * b;
    let v = 0.500 * r - 0.419 * g - 0.081 * b;
    (y, u, v)
}
