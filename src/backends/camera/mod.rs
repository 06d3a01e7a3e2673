// SPDX-License-Identifier: MPL-2.0

//! Capture backend abstraction
//!
//! The compositor never talks to hardware directly. It asks a
//! [`CaptureBackend`] for a [`CaptureSession`]: a live [`CaptureSource`]
//! that can be stopped, plus the channel its [`RawFrame`]s arrive on.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────┐
//! │ ReconfigurationController│  ← acquire / stop, one session at a time
//! └────────────┬─────────────┘
//!              │
//!              ▼
//! ┌──────────────────────────┐
//! │   CaptureBackend trait   │  ← common interface
//! └────────────┬─────────────┘
//!              │
//!              ▼
//!        ┌───────────┐
//!        │ GStreamer │  ← pipewiresrc / v4l2src / videotestsrc
//!        └───────────┘
//! ```
//!
//! Stopping a source closes its frame channel. That end-of-stream is the only
//! cancellation signal the frame pipeline needs.

pub mod lifecycle;
pub mod pipeline;
pub mod types;

pub use lifecycle::{HandleTracker, TrackedHandle};
pub use pipeline::{GstCaptureBackend, GstCaptureSource};
pub use types::*;

/// Capture collaborator: hands out live video sources
pub trait CaptureBackend: Send + Sync {
    /// Acquire a video source matching `settings`
    ///
    /// # Returns
    /// * `Ok(CaptureSession)` - Source is running and frames will arrive
    /// * `Err(BackendError::PermissionDenied)` - Access refused
    /// * `Err(BackendError::DeviceUnavailable)` - No usable device
    fn acquire(&self, settings: &CaptureSettings) -> BackendResult<CaptureSession>;

    /// Backend identifier for logging
    fn name(&self) -> &'static str;
}

/// A running hardware video source
pub trait CaptureSource: Send {
    /// Stop capturing and close the frame channel
    ///
    /// Idempotent and infallible. Frames already queued stay in the channel so
    /// the pipeline can drain them before it observes end-of-stream.
    fn stop(&mut self);

    /// Whether [`CaptureSource::stop`] has run
    fn is_stopped(&self) -> bool;

    /// Human readable description for logs
    fn description(&self) -> String;
}

/// A freshly acquired source and the frames it produces
pub struct CaptureSession {
    /// The live source (stop it to end the stream)
    pub source: Box<dyn CaptureSource>,
    /// Frames in capture order
    pub frames: RawFrameReceiver,
    /// Accounting for every RawFrame this source mints
    pub tracker: HandleTracker,
}

impl std::fmt::Debug for CaptureSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaptureSession")
            .field("source", &self.source.description())
            .field("stopped", &self.source.is_stopped())
            .field("outstanding_frames", &self.tracker.outstanding())
            .finish()
    }
}
