// SPDX-License-Identifier: GPL-3.0-only
// Shared types for capture backend abstraction

//! Shared types for capture backends

use super::lifecycle::TrackedHandle;
use gstreamer::buffer::{MappedBuffer, Readable};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use tracing::trace;

/// Frame data storage - either owned bytes or a zero-copy GStreamer buffer
///
/// The `Mapped` variant keeps the GStreamer buffer mapped until the owning
/// [`RawFrame`] is released, at which point the buffer returns to its pool.
pub enum FrameData {
    /// Owned bytes (test sources, file sources)
    Copied(Vec<u8>),
    /// Zero-copy mapped GStreamer buffer
    Mapped(MappedBuffer<Readable>),
}

impl FrameData {
    /// Create FrameData from a mapped GStreamer buffer (zero-copy)
    pub fn from_mapped_buffer(buffer: MappedBuffer<Readable>) -> Self {
        FrameData::Mapped(buffer)
    }

    /// Get the length of the frame data in bytes
    pub fn len(&self) -> usize {
        self.as_ref().len()
    }

    /// Check if the frame data is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for FrameData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FrameData::Copied(data) => write!(f, "FrameData::Copied({} bytes)", data.len()),
            FrameData::Mapped(buf) => write!(f, "FrameData::Mapped({} bytes)", buf.len()),
        }
    }
}

impl AsRef<[u8]> for FrameData {
    fn as_ref(&self) -> &[u8] {
        match self {
            FrameData::Copied(data) => data.as_slice(),
            FrameData::Mapped(buf) => buf.as_slice(),
        }
    }
}

impl From<Vec<u8>> for FrameData {
    fn from(data: Vec<u8>) -> Self {
        FrameData::Copied(data)
    }
}

/// Where the GStreamer capture backend pulls video from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CaptureSourceKind {
    /// PipeWire camera portal (modern Linux standard)
    #[default]
    PipeWire,
    /// Direct V4L2 device access
    V4l2,
    /// Synthetic live test pattern (no hardware needed)
    Test,
}

impl std::fmt::Display for CaptureSourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CaptureSourceKind::PipeWire => write!(f, "pipewire"),
            CaptureSourceKind::V4l2 => write!(f, "v4l2"),
            CaptureSourceKind::Test => write!(f, "test"),
        }
    }
}

impl FromStr for CaptureSourceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pipewire" | "pw" => Ok(CaptureSourceKind::PipeWire),
            "v4l2" => Ok(CaptureSourceKind::V4l2),
            "test" | "videotestsrc" => Ok(CaptureSourceKind::Test),
            other => Err(format!(
                "unknown capture source '{}' (expected pipewire, v4l2 or test)",
                other
            )),
        }
    }
}

/// What to acquire from the capture backend
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureSettings {
    /// Capture source type
    pub source: CaptureSourceKind,
    /// Device path or PipeWire node (None = system default)
    pub device: Option<String>,
    /// Requested width (None = device default)
    pub width: Option<u32>,
    /// Requested height (None = device default)
    pub height: Option<u32>,
    /// Requested framerate (None = device default)
    pub framerate: Option<u32>,
}

impl std::fmt::Display for CaptureSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.source)?;
        if let Some(device) = &self.device {
            write!(f, " ({})", device)?;
        }
        if let (Some(w), Some(h)) = (self.width, self.height) {
            write!(f, " {}x{}", w, h)?;
        }
        if let Some(fps) = self.framerate {
            write!(f, " @ {}fps", fps)?;
        }
        Ok(())
    }
}

/// Pixel layout of a raw captured frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    /// RGBA - 32-bit with alpha, the canonical raster layout
    Rgba,
    /// RGBx - 32-bit, padding byte instead of alpha
    Rgbx,
    /// BGRA - 32-bit with alpha (B G R A byte order)
    Bgra,
    /// BGRx - 32-bit, padding byte instead of alpha
    Bgrx,
    /// RGB24 - 24-bit RGB (3 bytes per pixel, no alpha)
    Rgb24,
    /// BGR24 - 24-bit BGR
    Bgr24,
    /// Gray8 - 8-bit grayscale (IR / monochrome sensors)
    Gray8,
}

impl PixelFormat {
    /// Bytes per pixel (all supported layouts are packed)
    pub fn bytes_per_pixel(&self) -> usize {
        match self {
            Self::Rgba | Self::Rgbx | Self::Bgra | Self::Bgrx => 4,
            Self::Rgb24 | Self::Bgr24 => 3,
            Self::Gray8 => 1,
        }
    }

    /// Convert to a GStreamer video/x-raw format string
    pub fn to_gst_format_string(&self) -> &'static str {
        match self {
            Self::Rgba => "RGBA",
            Self::Rgbx => "RGBx",
            Self::Bgra => "BGRA",
            Self::Bgrx => "BGRx",
            Self::Rgb24 => "RGB",
            Self::Bgr24 => "BGR",
            Self::Gray8 => "GRAY8",
        }
    }

    /// Parse format from GStreamer format string
    pub fn from_gst_format(format: &str) -> Option<Self> {
        match format {
            "RGBA" => Some(Self::Rgba),
            "RGBx" => Some(Self::Rgbx),
            "BGRA" => Some(Self::Bgra),
            "BGRx" => Some(Self::Bgrx),
            "RGB" => Some(Self::Rgb24),
            "BGR" => Some(Self::Bgr24),
            "GRAY8" | "GREY" | "Y8" => Some(Self::Gray8),
            _ => None,
        }
    }
}

/// A single captured, undecoded frame
///
/// Single-use: the stage that consumes it must call [`RawFrame::release`]
/// exactly once. Ownership moves with the frame from stage to stage.
#[derive(Debug)]
pub struct RawFrame {
    /// Capture clock timestamp (microseconds for the GStreamer backend)
    pub timestamp: u64,
    pub width: u32,
    pub height: u32,
    /// Row stride in bytes (may include padding)
    pub stride: u32,
    pub format: PixelFormat,
    data: FrameData,
    handle: TrackedHandle,
}

impl RawFrame {
    /// Wrap captured pixel data in a tracked handle
    pub fn new(
        timestamp: u64,
        width: u32,
        height: u32,
        stride: u32,
        format: PixelFormat,
        data: FrameData,
        handle: TrackedHandle,
    ) -> Self {
        Self {
            timestamp,
            width,
            height,
            stride,
            format,
            data,
            handle,
        }
    }

    /// Pixel bytes of the frame
    pub fn data(&self) -> &[u8] {
        self.data.as_ref()
    }

    /// Release the frame and its underlying buffer
    pub fn release(self) {
        let RawFrame {
            timestamp,
            data,
            handle,
            ..
        } = self;
        drop(data);
        handle.release();
        trace!(timestamp, "Raw frame released");
    }
}

/// Sender half of a capture frame channel
pub type RawFrameSender = futures::channel::mpsc::Sender<RawFrame>;

/// Receiver half of a capture frame channel
pub type RawFrameReceiver = futures::channel::mpsc::Receiver<RawFrame>;

/// Result type for backend operations
pub type BackendResult<T> = Result<T, BackendError>;

/// Error types for backend operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    /// The user or the portal refused camera access
    PermissionDenied(String),
    /// No usable device (missing, busy, unplugged)
    DeviceUnavailable(String),
    /// Failed to initialize the backend pipeline
    InitializationFailed(String),
    /// Format not supported
    FormatNotSupported(String),
    /// Other errors
    Other(String),
}

impl BackendError {
    /// True for the two acquisition failures the capture collaborator reports
    pub fn is_acquisition_failure(&self) -> bool {
        matches!(
            self,
            BackendError::PermissionDenied(_) | BackendError::DeviceUnavailable(_)
        )
    }
}

impl std::fmt::Display for BackendError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendError::PermissionDenied(msg) => write!(f, "Permission denied: {}", msg),
            BackendError::DeviceUnavailable(msg) => write!(f, "Device unavailable: {}", msg),
            BackendError::InitializationFailed(msg) => write!(f, "Initialization failed: {}", msg),
            BackendError::FormatNotSupported(msg) => write!(f, "Format not supported: {}", msg),
            BackendError::Other(msg) => write!(f, "Error: {}", msg),
        }
    }
}

impl std::error::Error for BackendError {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::camera::lifecycle::HandleTracker;

    #[test]
    fn test_capture_source_parsing() {
        assert_eq!("test".parse(), Ok(CaptureSourceKind::Test));
        assert_eq!("V4L2".parse(), Ok(CaptureSourceKind::V4l2));
        assert_eq!("pipewire".parse(), Ok(CaptureSourceKind::PipeWire));
        assert!("webcam".parse::<CaptureSourceKind>().is_err());
    }

    #[test]
    fn test_gst_format_roundtrip_names() {
        for format in [
            PixelFormat::Rgba,
            PixelFormat::Bgrx,
            PixelFormat::Rgb24,
            PixelFormat::Gray8,
        ] {
            assert_eq!(
                PixelFormat::from_gst_format(format.to_gst_format_string()),
                Some(format)
            );
        }
        assert_eq!(PixelFormat::from_gst_format("NV12"), None);
    }

    #[test]
    fn test_raw_frame_release_is_tracked() {
        let tracker = HandleTracker::new("raw-frame");
        let frame = RawFrame::new(
            1000,
            1,
            1,
            4,
            PixelFormat::Rgba,
            vec![1, 2, 3, 4].into(),
            tracker.acquire(),
        );
        assert_eq!(frame.data(), &[1, 2, 3, 4]);

        frame.release();
        assert!(tracker.is_balanced());
    }

    #[test]
    fn test_settings_display() {
        let settings = CaptureSettings {
            source: CaptureSourceKind::V4l2,
            device: Some("/dev/video0".into()),
            width: Some(640),
            height: Some(480),
            framerate: Some(30),
        };
        assert_eq!(settings.to_string(), "v4l2 (/dev/video0) 640x480 @ 30fps");
    }
}
