// SPDX-License-Identifier: MPL-2.0

//! Stage trait, stage ordering and the per-stage task loops
//!
//! Each stage runs as its own task and handles one frame at a time. Stages
//! are linked by capacity-1 channels, so a stage only takes the next frame
//! once the previous one has been handed downstream.
//!
//! End-of-stream flows from capture towards the display: when a stage's
//! input closes and is empty it finishes, which closes its own output. A
//! stage whose downstream has gone away releases the frame in hand, then
//! drains and releases whatever is still queued for it.

use super::PipelineConfig;
use super::encode::{EncodeStage, OutFrame};
use super::raster::{RasterConversionStage, RasterFrame};
use crate::backends::camera::RawFrameReceiver;
use futures::StreamExt;
use futures::future::BoxFuture;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info};

/// A pass-through compositor stage operating on raster frames
///
/// Implementations may modify the pixels but must return the same frame.
pub trait FrameStage: Send {
    /// Stage name for logs
    fn name(&self) -> &'static str;

    /// Process one frame and hand it back
    fn process(&mut self, frame: RasterFrame) -> BoxFuture<'_, RasterFrame>;
}

/// The stages a pipeline can contain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StageKind {
    RasterConversion,
    SharpnessScoring,
    SegmentationBlend,
    Encode,
}

impl StageKind {
    /// Stage chain for a configuration, in frame order
    ///
    /// Raster conversion always comes first and encode always last; the
    /// optional stages sit in between in this fixed order.
    pub fn chain_for(config: &PipelineConfig) -> Vec<StageKind> {
        let mut chain = vec![StageKind::RasterConversion];
        if config.enable_scoring {
            chain.push(StageKind::SharpnessScoring);
        }
        if config.enable_segmentation {
            chain.push(StageKind::SegmentationBlend);
        }
        chain.push(StageKind::Encode);
        chain
    }

    /// Whether this is one of the optional raster-to-raster stages
    pub fn is_optional(&self) -> bool {
        matches!(
            self,
            StageKind::SharpnessScoring | StageKind::SegmentationBlend
        )
    }

    pub fn name(&self) -> &'static str {
        match self {
            StageKind::RasterConversion => "raster-conversion",
            StageKind::SharpnessScoring => "sharpness-scoring",
            StageKind::SegmentationBlend => "segmentation-blend",
            StageKind::Encode => "encode",
        }
    }
}

impl std::fmt::Display for StageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Close `input` and release every frame still queued in it
pub(crate) async fn drain_rasters(input: &mut mpsc::Receiver<RasterFrame>) -> u64 {
    input.close();
    let mut released = 0;
    while let Some(frame) = input.recv().await {
        frame.release();
        released += 1;
    }
    released
}

/// Close `frames` and release every raw frame still queued in it
pub(crate) fn drain_raw_frames(frames: &mut RawFrameReceiver) -> u64 {
    frames.close();
    let mut released = 0;
    while let Ok(Some(frame)) = frames.try_next() {
        frame.release();
        released += 1;
    }
    released
}

/// Raster conversion task: raw capture frames in, raster frames out
pub(crate) async fn run_raster_conversion(
    mut stage: RasterConversionStage,
    mut frames: RawFrameReceiver,
    output: mpsc::Sender<RasterFrame>,
) {
    while let Some(raw) = frames.next().await {
        let Ok(frame) = stage.convert(raw) else {
            continue;
        };
        if let Err(mpsc::error::SendError(frame)) = output.send(frame).await {
            frame.release();
            let drained = drain_raw_frames(&mut frames);
            debug!(drained, "Raster conversion: downstream closed");
            break;
        }
    }
    debug!(
        decoded = stage.decoded(),
        failures = stage.failures(),
        "Raster conversion finished"
    );
}

/// Task loop for an optional stage
pub(crate) async fn run_stage(
    mut stage: Box<dyn FrameStage>,
    mut input: mpsc::Receiver<RasterFrame>,
    output: mpsc::Sender<RasterFrame>,
) {
    let mut processed: u64 = 0;
    while let Some(frame) = input.recv().await {
        let frame = stage.process(frame).await;
        processed += 1;
        if let Err(mpsc::error::SendError(frame)) = output.send(frame).await {
            frame.release();
            let drained = drain_rasters(&mut input).await;
            debug!(stage = stage.name(), drained, "Downstream closed");
            break;
        }
    }
    debug!(stage = stage.name(), processed, "Stage finished");
}

/// Resolves once `closing` is raised or its sender is gone
async fn closing_raised(closing: &mut watch::Receiver<bool>) {
    loop {
        if *closing.borrow_and_update() {
            return;
        }
        if closing.changed().await.is_err() {
            return;
        }
    }
}

/// Encode task: raster frames in, encoded frames out to the display
///
/// Once `closing` is raised (or the display drops the stream) encoded
/// frames are discarded instead of delivered, but the input keeps draining
/// so every surface upstream gets released.
pub(crate) async fn run_encode(
    mut stage: EncodeStage,
    mut input: mpsc::Receiver<RasterFrame>,
    output: mpsc::Sender<OutFrame>,
    mut closing: watch::Receiver<bool>,
) {
    let mut delivering = true;
    let mut discarded: u64 = 0;

    while let Some(frame) = input.recv().await {
        let out = stage.encode(frame);
        if !delivering {
            discarded += 1;
            continue;
        }
        tokio::select! {
            biased;
            sent = output.send(out) => {
                if sent.is_err() {
                    info!("Display closed the output stream");
                    delivering = false;
                }
            }
            _ = closing_raised(&mut closing) => {
                discarded += 1;
                delivering = false;
            }
        }
    }

    debug!(
        encoded = stage.encoded(),
        discarded, "Encode finished"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chain_order_for_every_config() {
        use StageKind::*;
        let cases = [
            ((false, false), vec![RasterConversion, Encode]),
            ((true, false), vec![RasterConversion, SharpnessScoring, Encode]),
            ((false, true), vec![RasterConversion, SegmentationBlend, Encode]),
            (
                (true, true),
                vec![RasterConversion, SharpnessScoring, SegmentationBlend, Encode],
            ),
        ];
        for ((scoring, segmentation), expected) in cases {
            let config = PipelineConfig {
                enable_scoring: scoring,
                enable_segmentation: segmentation,
                ..Default::default()
            };
            assert_eq!(StageKind::chain_for(&config), expected);
        }
    }

    #[test]
    fn test_optional_stages() {
        assert!(!StageKind::RasterConversion.is_optional());
        assert!(StageKind::SharpnessScoring.is_optional());
        assert!(StageKind::SegmentationBlend.is_optional());
        assert!(!StageKind::Encode.is_optional());
    }
}
