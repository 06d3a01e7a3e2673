// SPDX-License-Identifier: MPL-2.0

//! Test doubles for the compositor integration tests

#![allow(dead_code)]

use camera_compositor::backends::camera::{
    BackendError, BackendResult, CaptureBackend, CaptureSession, CaptureSettings, CaptureSource,
    FrameData, HandleTracker, PixelFormat, RawFrame, RawFrameReceiver, RawFrameSender,
};
use camera_compositor::errors::StageError;
use camera_compositor::pipelines::compositor::{
    BlurStats, CategoryMask, MetricsSink, Segmenter, SharpnessReport, SharpnessScorer,
};
use futures::FutureExt;
use futures::channel::mpsc;
use futures::future::BoxFuture;
use image::RgbaImage;
use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

pub const FRAME_WIDTH: u32 = 4;
pub const FRAME_HEIGHT: u32 = 2;

/// A tightly packed RGBA frame filled with one color
pub fn solid_frame(tracker: &HandleTracker, timestamp: u64, rgba: [u8; 4]) -> RawFrame {
    let data: Vec<u8> = rgba
        .iter()
        .copied()
        .cycle()
        .take((FRAME_WIDTH * FRAME_HEIGHT * 4) as usize)
        .collect();
    RawFrame::new(
        timestamp,
        FRAME_WIDTH,
        FRAME_HEIGHT,
        FRAME_WIDTH * 4,
        PixelFormat::Rgba,
        FrameData::from(data),
        tracker.acquire(),
    )
}

/// A frame whose buffer is too short to decode
pub fn truncated_frame(tracker: &HandleTracker, timestamp: u64) -> RawFrame {
    RawFrame::new(
        timestamp,
        FRAME_WIDTH,
        FRAME_HEIGHT,
        FRAME_WIDTH * 4,
        PixelFormat::Rgba,
        FrameData::from(vec![0u8; 5]),
        tracker.acquire(),
    )
}

/// Queue `frames` on a fresh capture channel; the sender is returned so the
/// caller decides when the stream ends
pub fn queued(frames: Vec<RawFrame>) -> (RawFrameSender, RawFrameReceiver) {
    let (mut tx, rx) = mpsc::channel(frames.len().max(1));
    for frame in frames {
        tx.try_send(frame).expect("channel sized for the script");
    }
    (tx, rx)
}

/// Lifecycle events recorded by the scripted backend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    Acquired(usize),
    Stopped(usize),
}

struct ScriptedSource {
    id: usize,
    sender: Option<RawFrameSender>,
    stopped: bool,
    events: Arc<Mutex<Vec<Event>>>,
}

impl CaptureSource for ScriptedSource {
    fn stop(&mut self) {
        if !self.stopped {
            self.stopped = true;
            self.sender.take();
            self.events.lock().unwrap().push(Event::Stopped(self.id));
        }
    }

    fn is_stopped(&self) -> bool {
        self.stopped
    }

    fn description(&self) -> String {
        format!("scripted #{}", self.id)
    }
}

/// Capture backend handing out pre-filled sessions
///
/// Each session queues `frames_per_session` solid frames with timestamps
/// `id * 1000 + i`, then stays live until stopped, or ends right away when
/// built with [`ScriptedBackend::ending_streams`].
pub struct ScriptedBackend {
    frames_per_session: usize,
    end_streams: bool,
    color: [u8; 4],
    failures: Mutex<VecDeque<BackendError>>,
    events: Arc<Mutex<Vec<Event>>>,
    trackers: Mutex<Vec<HandleTracker>>,
    surfaces: HandleTracker,
    clean_at_acquire: Mutex<Vec<bool>>,
}

impl ScriptedBackend {
    pub fn new(frames_per_session: usize, surfaces: HandleTracker) -> Self {
        Self {
            frames_per_session,
            end_streams: false,
            color: [200, 200, 200, 255],
            failures: Mutex::new(VecDeque::new()),
            events: Arc::new(Mutex::new(Vec::new())),
            trackers: Mutex::new(Vec::new()),
            surfaces,
            clean_at_acquire: Mutex::new(Vec::new()),
        }
    }

    /// Sessions whose stream ends after the queued frames, as if the
    /// device went away
    pub fn ending_streams(mut self) -> Self {
        self.end_streams = true;
        self
    }

    /// Make the next acquisition fail with `error`
    pub fn fail_next(&self, error: BackendError) {
        self.failures.lock().unwrap().push_back(error);
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }

    pub fn acquisitions(&self) -> usize {
        self.trackers.lock().unwrap().len()
    }

    /// Raw frame trackers of every session so far
    pub fn trackers(&self) -> Vec<HandleTracker> {
        self.trackers.lock().unwrap().clone()
    }

    /// Per acquisition: were all earlier frames and surfaces released?
    pub fn clean_at_acquire(&self) -> Vec<bool> {
        self.clean_at_acquire.lock().unwrap().clone()
    }

    pub fn all_released(&self) -> bool {
        self.trackers().iter().all(HandleTracker::is_balanced) && self.surfaces.is_balanced()
    }
}

impl CaptureBackend for ScriptedBackend {
    fn acquire(&self, _settings: &CaptureSettings) -> BackendResult<CaptureSession> {
        if let Some(error) = self.failures.lock().unwrap().pop_front() {
            return Err(error);
        }

        let mut trackers = self.trackers.lock().unwrap();
        let clean = trackers.iter().all(HandleTracker::is_balanced)
            && self.surfaces.outstanding() == 0;
        self.clean_at_acquire.lock().unwrap().push(clean);

        let id = trackers.len() + 1;
        let tracker = HandleTracker::new("raw-frame");
        trackers.push(tracker.clone());

        let frames = (0..self.frames_per_session)
            .map(|i| solid_frame(&tracker, (id * 1000 + i) as u64, self.color))
            .collect();
        let (sender, receiver) = queued(frames);

        self.events.lock().unwrap().push(Event::Acquired(id));

        Ok(CaptureSession {
            source: Box::new(ScriptedSource {
                id,
                sender: (!self.end_streams).then_some(sender),
                stopped: false,
                events: Arc::clone(&self.events),
            }),
            frames: receiver,
            tracker,
        })
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}

/// Segmenter labelling every pixel with one label
///
/// Timestamps in `fail_on` return an error, those in `short_mask_on` return
/// a mask one label short. Tracks how many calls overlap.
pub struct LabelSegmenter {
    label: u8,
    fail_on: HashSet<u64>,
    short_mask_on: HashSet<u64>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    calls: AtomicUsize,
}

impl LabelSegmenter {
    pub fn new(label: u8) -> Self {
        Self {
            label,
            fail_on: HashSet::new(),
            short_mask_on: HashSet::new(),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing_on(mut self, timestamps: &[u64]) -> Self {
        self.fail_on.extend(timestamps);
        self
    }

    pub fn short_mask_on(mut self, timestamps: &[u64]) -> Self {
        self.short_mask_on.extend(timestamps);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

impl Segmenter for LabelSegmenter {
    fn segment<'a>(
        &'a self,
        image: &'a RgbaImage,
        timestamp: u64,
    ) -> BoxFuture<'a, Result<CategoryMask, StageError>> {
        async move {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);

            tokio::task::yield_now().await;

            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            if self.fail_on.contains(&timestamp) {
                return Err(StageError::Segmentation("scripted failure".into()));
            }
            let mut len = (image.width() * image.height()) as usize;
            if self.short_mask_on.contains(&timestamp) {
                len -= 1;
            }
            Ok(vec![self.label; len])
        }
        .boxed()
    }
}

/// Scorer recording the first pixel it saw per call
pub struct RecordingScorer {
    seen: Mutex<Vec<[u8; 4]>>,
    fail: bool,
}

impl RecordingScorer {
    pub fn new() -> Self {
        Self {
            seen: Mutex::new(Vec::new()),
            fail: false,
        }
    }

    pub fn failing() -> Self {
        Self {
            seen: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    pub fn seen(&self) -> Vec<[u8; 4]> {
        self.seen.lock().unwrap().clone()
    }
}

impl SharpnessScorer for RecordingScorer {
    fn measure(&self, image: &RgbaImage) -> Result<BlurStats, StageError> {
        self.seen.lock().unwrap().push(image.get_pixel(0, 0).0);
        if self.fail {
            return Err(StageError::Scoring("scripted failure".into()));
        }
        Ok(BlurStats {
            width: image.width(),
            height: image.height(),
            num_edges: 1,
            avg_edge_width: 1.0,
            avg_edge_width_perc: 1.0 / image.width() as f32,
        })
    }
}

/// Metrics sink keeping every report
#[derive(Default)]
pub struct CollectingSink {
    reports: Mutex<Vec<SharpnessReport>>,
}

impl CollectingSink {
    pub fn timestamps(&self) -> Vec<u64> {
        self.reports
            .lock()
            .unwrap()
            .iter()
            .map(|r| r.timestamp)
            .collect()
    }
}

impl MetricsSink for CollectingSink {
    fn report(&self, report: SharpnessReport) {
        self.reports.lock().unwrap().push(report);
    }
}
