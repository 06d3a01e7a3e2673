// SPDX-License-Identifier: GPL-3.0-only

//! Virtual camera backend for streaming composited video to PipeWire
//!
//! This is the display end of the compositor: other applications (video
//! conferencing software and the like) see the composited output as a
//! regular camera.
//!
//! # Architecture
//!
//! ```text
//! OutputStream (OutFrame, packed RGB)
//!        │
//!        ▼
//! ┌──────────────────┐
//! │ FrameSink        │  ← VirtualCameraManager or FrameCounter
//! └──────────────────┘
//!        │
//!        ▼
//! ┌──────────────────┐
//! │ GStreamer Sink   │  ← appsrc → videoconvert → pipewiresink
//! │ (PipeWire)       │
//! └──────────────────┘
//!        │
//!        ▼
//!   Video Apps (Zoom, Teams, etc.)
//! ```

mod pipeline;

pub use pipeline::{NodeIdentity, VirtualCameraPipeline};

use crate::backends::camera::types::{BackendError, BackendResult};
use crate::constants::timing::FRAME_LOG_INTERVAL;
use crate::pipelines::compositor::OutFrame;
use tracing::{debug, info, warn};

/// Consumer of encoded frames
pub trait FrameSink: Send {
    /// Present one frame
    fn show(&mut self, frame: OutFrame) -> BackendResult<()>;

    /// Release any output resources
    fn close(&mut self) {}
}

/// Virtual camera manager
///
/// Starts the PipeWire node on the first frame and restarts it whenever the
/// frame dimensions change (for example after a capture format change).
pub struct VirtualCameraManager {
    node: NodeIdentity,
    pipeline: Option<VirtualCameraPipeline>,
}

impl VirtualCameraManager {
    pub fn new(node: NodeIdentity) -> Self {
        Self {
            node,
            pipeline: None,
        }
    }

    /// Check if currently streaming
    pub fn is_streaming(&self) -> bool {
        self.pipeline.is_some()
    }

    fn start(&mut self, width: u32, height: u32) -> BackendResult<()> {
        info!(width, height, "Starting virtual camera");
        let pipeline = VirtualCameraPipeline::new(width, height, &self.node)?;
        pipeline.start()?;
        self.pipeline = Some(pipeline);
        Ok(())
    }

    /// Stop streaming to the virtual camera
    pub fn stop(&mut self) -> BackendResult<()> {
        match self.pipeline.take() {
            Some(pipeline) => pipeline.stop(),
            None => Err(BackendError::Other("Virtual camera not streaming".into())),
        }
    }
}

impl FrameSink for VirtualCameraManager {
    fn show(&mut self, frame: OutFrame) -> BackendResult<()> {
        let dims = (frame.width, frame.height);
        let current = self.pipeline.as_ref().map(VirtualCameraPipeline::dimensions);

        if current != Some(dims) {
            if let Some(old) = current {
                info!(
                    from = ?old,
                    to = ?dims,
                    "Output size changed, restarting virtual camera"
                );
                if let Err(e) = self.stop() {
                    warn!(error = %e, "Failed to stop virtual camera");
                }
            }
            self.start(frame.width, frame.height)?;
        }

        match self.pipeline.as_mut() {
            Some(pipeline) => pipeline.push_frame(frame.data, frame.width, frame.height),
            None => Err(BackendError::Other("Virtual camera not streaming".into())),
        }
    }

    fn close(&mut self) {
        if self.is_streaming()
            && let Err(e) = self.stop()
        {
            warn!(error = %e, "Failed to stop virtual camera");
        }
    }
}

/// Sink that only counts frames (virtual camera disabled)
#[derive(Debug, Default)]
pub struct FrameCounter {
    frames: u64,
    last_timestamp: Option<u64>,
}

impl FrameCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Frames seen so far
    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// Timestamp of the most recent frame
    pub fn last_timestamp(&self) -> Option<u64> {
        self.last_timestamp
    }
}

impl FrameSink for FrameCounter {
    fn show(&mut self, frame: OutFrame) -> BackendResult<()> {
        self.frames += 1;
        self.last_timestamp = Some(frame.timestamp);
        if self.frames % FRAME_LOG_INTERVAL == 0 {
            debug!(
                frames = self.frames,
                timestamp = frame.timestamp,
                width = frame.width,
                height = frame.height,
                "Output frames"
            );
        }
        Ok(())
    }
}
