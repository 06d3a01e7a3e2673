// SPDX-License-Identifier: MPL-2.0

//! Encode stage: RGBA surface → opaque RGB output frame

use super::raster::RasterFrame;
use crate::constants::timing::FRAME_LOG_INTERVAL;
use crate::media::rgba_to_rgb;
use tracing::debug;

/// An encoded frame ready for the display
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutFrame {
    pub timestamp: u64,
    pub width: u32,
    pub height: u32,
    /// Packed RGB, no alpha
    pub data: Vec<u8>,
}

impl OutFrame {
    /// RGB value at (x, y)
    pub fn rgb_at(&self, x: u32, y: u32) -> Option<[u8; 3]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let offset = (y as usize * self.width as usize + x as usize) * 3;
        self.data
            .get(offset..offset + 3)
            .map(|px| [px[0], px[1], px[2]])
    }
}

/// Converts raster frames to output frames and releases their surfaces
#[derive(Debug, Default)]
pub struct EncodeStage {
    encoded: u64,
}

impl EncodeStage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Encode a frame; its drawing surface is released before returning
    pub fn encode(&mut self, frame: RasterFrame) -> OutFrame {
        let out = OutFrame {
            timestamp: frame.timestamp(),
            width: frame.width(),
            height: frame.height(),
            data: rgba_to_rgb(frame.pixels()),
        };
        frame.release();

        self.encoded += 1;
        if self.encoded % FRAME_LOG_INTERVAL == 0 {
            debug!(
                encoded = self.encoded,
                width = out.width,
                height = out.height,
                "Encoded frame"
            );
        }
        out
    }

    /// Frames encoded so far
    pub fn encoded(&self) -> u64 {
        self.encoded
    }
}
