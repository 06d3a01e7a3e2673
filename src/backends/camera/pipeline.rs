// SPDX-License-Identifier: MPL-2.0

//! GStreamer pipeline for camera capture
//!
//! Builds `<source> ! videoconvert ! videoscale ! video/x-raw,format=RGBA ! appsink`
//! and turns every appsink sample into a zero-copy [`RawFrame`].

use super::lifecycle::HandleTracker;
use super::types::*;
use super::{CaptureBackend, CaptureSession, CaptureSource};
use crate::constants::{pipeline, timing};
use futures::channel::mpsc;
use gstreamer::prelude::*;
use gstreamer_app::AppSink;
use gstreamer_video::{VideoFormat, VideoInfo};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, error, info, warn};

/// Capture backend built on GStreamer source elements
#[derive(Debug, Default, Clone, Copy)]
pub struct GstCaptureBackend;

impl GstCaptureBackend {
    pub fn new() -> Self {
        Self
    }
}

impl CaptureBackend for GstCaptureBackend {
    fn acquire(&self, settings: &CaptureSettings) -> BackendResult<CaptureSession> {
        let tracker = HandleTracker::new("raw-frame");
        let (sender, frames) = mpsc::channel(pipeline::CAPTURE_CHANNEL_CAPACITY);
        let source = GstCaptureSource::start(settings, sender, tracker.clone())?;

        Ok(CaptureSession {
            source: Box::new(source),
            frames,
            tracker,
        })
    }

    fn name(&self) -> &'static str {
        "gstreamer"
    }
}

/// A running GStreamer capture pipeline
pub struct GstCaptureSource {
    pipeline: gstreamer::Pipeline,
    appsink: AppSink,
    /// Taken on stop so the frame channel closes
    sender: Arc<Mutex<Option<RawFrameSender>>>,
    description: String,
    stopped: bool,
}

impl GstCaptureSource {
    /// Build and start the capture pipeline
    pub fn start(
        settings: &CaptureSettings,
        sender: RawFrameSender,
        tracker: HandleTracker,
    ) -> BackendResult<Self> {
        info!(settings = %settings, "Creating capture pipeline");

        gstreamer::init().map_err(|e| BackendError::InitializationFailed(e.to_string()))?;

        let launch = build_launch_description(settings);
        debug!(pipeline = %launch, "Launching capture pipeline");

        let pipeline = gstreamer::parse::launch(&launch)
            .map_err(|e| BackendError::InitializationFailed(e.to_string()))?
            .dynamic_cast::<gstreamer::Pipeline>()
            .map_err(|_| BackendError::InitializationFailed("Failed to cast to pipeline".into()))?;

        let appsink = pipeline
            .by_name("sink")
            .ok_or_else(|| BackendError::InitializationFailed("Failed to get appsink".into()))?
            .dynamic_cast::<AppSink>()
            .map_err(|_| BackendError::InitializationFailed("Failed to cast appsink".into()))?;

        appsink.set_property("sync", false);
        appsink.set_property("max-buffers", pipeline::MAX_BUFFERS);
        appsink.set_property("drop", true);
        appsink.set_property("enable-last-sample", false);

        let sender = Arc::new(Mutex::new(Some(sender)));
        let callback_sender = Arc::clone(&sender);
        let frame_counter = AtomicU64::new(0);
        let last_timestamp = AtomicU64::new(0);

        appsink.set_callbacks(
            gstreamer_app::AppSinkCallbacks::builder()
                .new_sample(move |appsink| {
                    let frame_num = frame_counter.fetch_add(1, Ordering::Relaxed);

                    let sample = appsink
                        .pull_sample()
                        .map_err(|_| gstreamer::FlowError::Eos)?;

                    let frame = match sample_to_raw_frame(&sample, &tracker, &last_timestamp) {
                        Ok(frame) => frame,
                        Err(e) => {
                            if frame_num % timing::FRAME_LOG_INTERVAL == 0 {
                                warn!(frame = frame_num, error = %e, "Skipping unusable sample");
                            }
                            return Ok(gstreamer::FlowSuccess::Ok);
                        }
                    };

                    let mut guard = callback_sender
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner);
                    let Some(sender) = guard.as_mut() else {
                        frame.release();
                        return Err(gstreamer::FlowError::Eos);
                    };

                    match sender.try_send(frame) {
                        Ok(()) => Ok(gstreamer::FlowSuccess::Ok),
                        Err(e) if e.is_full() => {
                            // Pipeline is busy: the capture layer drops this frame
                            if frame_num % timing::FRAME_LOG_INTERVAL == 0 {
                                debug!(frame = frame_num, "Frame dropped (pipeline busy)");
                            }
                            e.into_inner().release();
                            Ok(gstreamer::FlowSuccess::Ok)
                        }
                        Err(e) => {
                            e.into_inner().release();
                            Err(gstreamer::FlowError::Eos)
                        }
                    }
                })
                .build(),
        );

        if let Err(e) = pipeline.set_state(gstreamer::State::Playing) {
            let err = classify_start_failure(&pipeline, e.to_string());
            let _ = pipeline.set_state(gstreamer::State::Null);
            return Err(err);
        }

        let (result, state, pending) = pipeline.state(gstreamer::ClockTime::from_seconds(
            timing::START_TIMEOUT_SECS,
        ));
        debug!(?result, ?state, ?pending, "Capture pipeline state");
        if result.is_err() {
            let err = classify_start_failure(&pipeline, format!("{:?}", result));
            let _ = pipeline.set_state(gstreamer::State::Null);
            return Err(err);
        }

        if let Some(bus) = pipeline.bus() {
            let bus_sender = Arc::clone(&sender);
            let description = settings.to_string();
            bus.set_sync_handler(move |_bus, msg| {
                end_stream_on_terminal_message(msg, &bus_sender, &description);
                gstreamer::BusSyncReply::Pass
            });
        }

        info!(settings = %settings, "Capture pipeline started");

        Ok(Self {
            pipeline,
            appsink,
            sender,
            description: settings.to_string(),
            stopped: false,
        })
    }
}

impl CaptureSource for GstCaptureSource {
    fn stop(&mut self) {
        if self.stopped {
            return;
        }
        self.stopped = true;
        info!(source = %self.description, "Stopping capture pipeline");

        self.appsink
            .set_callbacks(gstreamer_app::AppSinkCallbacks::builder().build());
        if let Some(bus) = self.pipeline.bus() {
            bus.unset_sync_handler();
        }

        if let Err(e) = self.pipeline.set_state(gstreamer::State::Null) {
            warn!(error = %e, "Failed to set capture pipeline to Null");
        }
        let _ = self
            .pipeline
            .state(gstreamer::ClockTime::from_seconds(timing::START_TIMEOUT_SECS));

        // Dropping the sender is the end-of-stream signal for the frame pipeline
        self.sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        info!(source = %self.description, "Capture pipeline stopped");
    }

    fn is_stopped(&self) -> bool {
        self.stopped
    }

    fn description(&self) -> String {
        self.description.clone()
    }
}

impl Drop for GstCaptureSource {
    fn drop(&mut self) {
        if !self.stopped {
            debug!("Capture source dropped while running, stopping");
            self.stop();
        }
    }
}

/// Close the frame channel when the source errors out or reaches EOS
///
/// Runs on the thread posting the message. Returns whether the channel was
/// closed by this message.
fn end_stream_on_terminal_message(
    msg: &gstreamer::Message,
    sender: &Mutex<Option<RawFrameSender>>,
    source: &str,
) -> bool {
    match msg.view() {
        gstreamer::MessageView::Error(err) => {
            error!(
                source,
                error = %err.error(),
                debug = ?err.debug(),
                "Capture source failed, ending stream"
            );
        }
        gstreamer::MessageView::Eos(_) => {
            info!(source, "Capture source reached end of stream");
        }
        _ => return false,
    }
    sender
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .take()
        .is_some()
}

/// Build the gst-launch description for the requested source
pub fn build_launch_description(settings: &CaptureSettings) -> String {
    let source = match settings.source {
        CaptureSourceKind::PipeWire => match &settings.device {
            Some(path) => format!("pipewiresrc path={} do-timestamp=true", path),
            None => "pipewiresrc do-timestamp=true".to_string(),
        },
        CaptureSourceKind::V4l2 => match &settings.device {
            Some(device) => format!("v4l2src device={} do-timestamp=true", device),
            None => "v4l2src do-timestamp=true".to_string(),
        },
        CaptureSourceKind::Test => "videotestsrc is-live=true pattern=smpte".to_string(),
    };

    let mut caps = format!("video/x-raw,format={}", pipeline::CAPTURE_FORMAT);
    if let (Some(w), Some(h)) = (settings.width, settings.height) {
        caps.push_str(&format!(",width={},height={}", w, h));
    }
    if let Some(fps) = settings.framerate {
        caps.push_str(&format!(",framerate={}/1", fps));
    }

    format!(
        "{} ! videoconvert ! videoscale ! {} ! appsink name=sink",
        source, caps
    )
}

/// Map GStreamer raw video formats onto the formats raster conversion accepts
fn pixel_format_from_video_format(format: VideoFormat) -> Option<PixelFormat> {
    match format {
        VideoFormat::Rgba => Some(PixelFormat::Rgba),
        VideoFormat::Rgbx => Some(PixelFormat::Rgbx),
        VideoFormat::Bgra => Some(PixelFormat::Bgra),
        VideoFormat::Bgrx => Some(PixelFormat::Bgrx),
        VideoFormat::Rgb => Some(PixelFormat::Rgb24),
        VideoFormat::Bgr => Some(PixelFormat::Bgr24),
        VideoFormat::Gray8 => Some(PixelFormat::Gray8),
        _ => None,
    }
}

/// Wrap an appsink sample in a tracked RawFrame without copying pixels
fn sample_to_raw_frame(
    sample: &gstreamer::Sample,
    tracker: &HandleTracker,
    last_timestamp: &AtomicU64,
) -> Result<RawFrame, BackendError> {
    let caps = sample
        .caps()
        .ok_or_else(|| BackendError::FormatNotSupported("No caps in sample".into()))?;
    let video_info = VideoInfo::from_caps(caps)
        .map_err(|e| BackendError::FormatNotSupported(e.to_string()))?;
    let format = pixel_format_from_video_format(video_info.format()).ok_or_else(|| {
        BackendError::FormatNotSupported(format!("{:?}", video_info.format()))
    })?;

    let buffer = sample
        .buffer_owned()
        .ok_or_else(|| BackendError::Other("No buffer in sample".into()))?;
    if buffer.flags().contains(gstreamer::BufferFlags::CORRUPTED) {
        return Err(BackendError::Other("Buffer marked as corrupted".into()));
    }

    // Timestamps must never go backwards, even if a buffer has no PTS
    let previous = last_timestamp.load(Ordering::Relaxed);
    let timestamp = buffer
        .pts()
        .map(|pts| pts.useconds())
        .unwrap_or(previous + 1)
        .max(previous);
    last_timestamp.store(timestamp, Ordering::Relaxed);

    let mapped = buffer
        .into_mapped_buffer_readable()
        .map_err(|_| BackendError::Other("Failed to map buffer".into()))?;

    Ok(RawFrame::new(
        timestamp,
        video_info.width(),
        video_info.height(),
        video_info.stride()[0] as u32,
        format,
        FrameData::from_mapped_buffer(mapped),
        tracker.acquire(),
    ))
}

/// Turn a failed start into PermissionDenied / DeviceUnavailable
fn classify_start_failure(pipeline: &gstreamer::Pipeline, fallback: String) -> BackendError {
    if let Some(bus) = pipeline.bus()
        && let Some(msg) = bus.timed_pop_filtered(
            gstreamer::ClockTime::from_mseconds(100),
            &[gstreamer::MessageType::Error],
        )
        && let gstreamer::MessageView::Error(err) = msg.view()
    {
        let error = err.error();
        error!(
            error = %error,
            debug = ?err.debug(),
            source = ?err.src().map(|s| s.name()),
            "GStreamer ERROR during capture start"
        );
        let message = error.message().to_ascii_lowercase();
        if message.contains("permission") || message.contains("not authorized") {
            return BackendError::PermissionDenied(error.to_string());
        }
        return BackendError::DeviceUnavailable(error.to_string());
    }
    BackendError::DeviceUnavailable(fallback)
}
