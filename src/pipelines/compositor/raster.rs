// SPDX-License-Identifier: MPL-2.0

//! Raster conversion stage
//!
//! Every raw frame is decoded into an RGBA drawing surface and released
//! straight away, whether or not decoding worked. Frames that fail to decode
//! are dropped from the stream and reported.

use crate::backends::camera::{HandleTracker, RawFrame, TrackedHandle};
use crate::constants::timing::FRAME_LOG_INTERVAL;
use crate::errors::StageError;
use crate::media::to_rgba_image;
use image::RgbaImage;
use tracing::{debug, warn};

/// RGBA pixels plus the single-use handle of the surface holding them
#[derive(Debug)]
pub struct DrawingSurface {
    image: RgbaImage,
    handle: TrackedHandle,
}

/// A decoded frame travelling between compositor stages
///
/// Owns exactly one drawing surface. The encode stage releases it; nothing
/// else may drop it.
#[derive(Debug)]
pub struct RasterFrame {
    timestamp: u64,
    surface: DrawingSurface,
}

impl RasterFrame {
    /// Wrap a decoded image and the surface handle it lives in
    pub fn new(timestamp: u64, image: RgbaImage, handle: TrackedHandle) -> Self {
        Self {
            timestamp,
            surface: DrawingSurface { image, handle },
        }
    }

    /// Timestamp carried over from the raw frame
    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }

    pub fn width(&self) -> u32 {
        self.surface.image.width()
    }

    pub fn height(&self) -> u32 {
        self.surface.image.height()
    }

    /// Number of pixels (width × height)
    pub fn pixel_count(&self) -> usize {
        self.width() as usize * self.height() as usize
    }

    /// Read-only view of the RGBA image
    pub fn image(&self) -> &RgbaImage {
        &self.surface.image
    }

    /// Packed RGBA bytes
    pub fn pixels(&self) -> &[u8] {
        self.surface.image.as_raw()
    }

    /// Mutable packed RGBA bytes
    pub fn pixels_mut(&mut self) -> &mut [u8] {
        &mut self.surface.image
    }

    /// Release the drawing surface
    pub fn release(self) {
        let RasterFrame { surface, .. } = self;
        let DrawingSurface { image, handle } = surface;
        drop(image);
        handle.release();
    }
}

/// Decodes raw frames into RGBA raster frames
pub struct RasterConversionStage {
    surfaces: HandleTracker,
    decoded: u64,
    failures: u64,
}

impl RasterConversionStage {
    /// Create a stage that allocates surfaces from `surfaces`
    pub fn new(surfaces: HandleTracker) -> Self {
        Self {
            surfaces,
            decoded: 0,
            failures: 0,
        }
    }

    /// Decode one raw frame
    ///
    /// The raw frame is always released before this returns. On success a
    /// fresh surface is allocated for the returned frame.
    pub fn convert(&mut self, raw: RawFrame) -> Result<RasterFrame, StageError> {
        let timestamp = raw.timestamp;
        let decoded = to_rgba_image(raw.data(), raw.width, raw.height, raw.stride, raw.format);
        raw.release();

        match decoded {
            Ok(image) => {
                self.decoded += 1;
                if self.decoded % FRAME_LOG_INTERVAL == 0 {
                    debug!(
                        decoded = self.decoded,
                        width = image.width(),
                        height = image.height(),
                        "Raster conversion"
                    );
                }
                Ok(RasterFrame::new(timestamp, image, self.surfaces.acquire()))
            }
            Err(e) => {
                self.failures += 1;
                if self.failures == 1 || self.failures % FRAME_LOG_INTERVAL == 0 {
                    warn!(
                        timestamp,
                        failures = self.failures,
                        error = %e,
                        "Dropping frame that failed to decode"
                    );
                }
                Err(e)
            }
        }
    }

    /// Frames decoded so far
    pub fn decoded(&self) -> u64 {
        self.decoded
    }

    /// Frames dropped because they failed to decode
    pub fn failures(&self) -> u64 {
        self.failures
    }
}
