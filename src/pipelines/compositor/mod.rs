// SPDX-License-Identifier: MPL-2.0

//! Live camera compositor
//!
//! Turns a stream of captured frames into a stream of display frames:
//!
//! ```text
//! ┌─────────┐   ┌────────────┐   ┌───────────┐   ┌──────────────┐   ┌────────┐   ┌─────────┐
//! │ Capture │ ─▶│   Raster   │ ─▶│ Sharpness │ ─▶│ Segmentation │ ─▶│ Encode │ ─▶│ Display │
//! │RawFrame │   │ conversion │   │ (optional)│   │  (optional)  │   │        │   │OutFrame │
//! └─────────┘   └────────────┘   └───────────┘   └──────────────┘   └────────┘   └─────────┘
//! ```
//!
//! Every stage is its own task, joined to the next by a capacity-1 channel.
//! Frames keep capture order and each one is emitted at most once. Each
//! [`RawFrame`](crate::backends::camera::RawFrame) is released by raster
//! conversion and each drawing surface by encode.
//!
//! The [`controller`] owns the running pipeline and swaps it when the
//! configuration changes.

pub mod categories;
pub mod controller;
pub mod encode;
pub mod raster;
pub mod scoring;
pub mod segmentation;
pub mod stage;

pub use categories::{CATEGORY_COLORS, Category, CategoryMask};
pub use controller::{ControllerState, Reconfigured, ReconfigurationController};
pub use encode::{EncodeStage, OutFrame};
pub use raster::{RasterConversionStage, RasterFrame};
pub use scoring::{
    BlurStats, MetricsSink, SharpnessReport, SharpnessScorer, SharpnessScoringStage,
    TracingMetricsSink,
};
pub use segmentation::{
    BlendSettings, BlendTable, SegmentationBlendStage, Segmenter, blend_category_mask,
};
pub use stage::{FrameStage, StageKind};

use crate::backends::camera::{HandleTracker, RawFrameReceiver};
use crate::constants::pipeline::{OUTPUT_CHANNEL_CAPACITY, STAGE_CHANNEL_CAPACITY};
use crate::errors::PipelineError;
use futures::Stream;
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{error, info};

/// Which optional stages run, and how segmentation blends
///
/// Two configs that compare equal describe the same pipeline.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub enable_scoring: bool,
    pub enable_segmentation: bool,
    pub blend: BlendSettings,
}

impl PipelineConfig {
    /// Canonical form used for equality checks by the controller
    pub fn normalized(&self) -> Self {
        Self {
            enable_scoring: self.enable_scoring,
            enable_segmentation: self.enable_segmentation,
            blend: self.blend.normalized(),
        }
    }
}

impl std::fmt::Display for PipelineConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let chain: Vec<&str> = StageKind::chain_for(self)
            .iter()
            .map(StageKind::name)
            .collect();
        write!(f, "{}", chain.join(" → "))
    }
}

/// The external collaborators stages are built from
///
/// Scorer and segmenter are only required when their stage is enabled.
/// Drawing surfaces for every pipeline come from `surfaces`.
#[derive(Clone)]
pub struct Collaborators {
    scorer: Option<Arc<dyn SharpnessScorer>>,
    segmenter: Option<Arc<dyn Segmenter>>,
    metrics: Arc<dyn MetricsSink>,
    surfaces: HandleTracker,
}

impl Default for Collaborators {
    fn default() -> Self {
        Self::new()
    }
}

impl Collaborators {
    /// No scorer or segmenter; readings go to the log
    pub fn new() -> Self {
        Self {
            scorer: None,
            segmenter: None,
            metrics: Arc::new(TracingMetricsSink),
            surfaces: HandleTracker::new("drawing-surface"),
        }
    }

    pub fn with_scorer(mut self, scorer: Arc<dyn SharpnessScorer>) -> Self {
        self.scorer = Some(scorer);
        self
    }

    pub fn with_segmenter(mut self, segmenter: Arc<dyn Segmenter>) -> Self {
        self.segmenter = Some(segmenter);
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<dyn MetricsSink>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn with_surfaces(mut self, surfaces: HandleTracker) -> Self {
        self.surfaces = surfaces;
        self
    }

    /// Surface accounting shared by every pipeline built from these
    pub fn surfaces(&self) -> &HandleTracker {
        &self.surfaces
    }

    /// Check that every enabled stage has its collaborator
    pub fn check(&self, config: &PipelineConfig) -> Result<(), PipelineError> {
        if config.enable_scoring && self.scorer.is_none() {
            return Err(PipelineError::Assembly(
                "sharpness scoring enabled without a scorer".into(),
            ));
        }
        if config.enable_segmentation && self.segmenter.is_none() {
            return Err(PipelineError::Assembly(
                "segmentation enabled without a segmenter".into(),
            ));
        }
        Ok(())
    }

    fn build_stage(
        &self,
        kind: StageKind,
        config: &PipelineConfig,
    ) -> Result<Box<dyn FrameStage>, PipelineError> {
        match kind {
            StageKind::SharpnessScoring => {
                let scorer = self.scorer.clone().ok_or_else(|| {
                    PipelineError::Assembly("no scorer available".into())
                })?;
                Ok(Box::new(SharpnessScoringStage::new(
                    scorer,
                    Arc::clone(&self.metrics),
                )))
            }
            StageKind::SegmentationBlend => {
                let segmenter = self.segmenter.clone().ok_or_else(|| {
                    PipelineError::Assembly("no segmenter available".into())
                })?;
                Ok(Box::new(SegmentationBlendStage::new(
                    segmenter,
                    &config.blend,
                )))
            }
            StageKind::RasterConversion | StageKind::Encode => Err(PipelineError::Assembly(
                format!("{} is not an optional stage", kind),
            )),
        }
    }
}

impl std::fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collaborators")
            .field("scorer", &self.scorer.is_some())
            .field("segmenter", &self.segmenter.is_some())
            .field("surfaces", &self.surfaces)
            .finish()
    }
}

/// Encoded frames for the display, in capture order
///
/// Ends once the pipeline has finished.
#[derive(Debug)]
pub struct OutputStream {
    receiver: mpsc::Receiver<OutFrame>,
}

impl OutputStream {
    /// Next frame, or `None` once the pipeline is gone
    pub async fn recv(&mut self) -> Option<OutFrame> {
        self.receiver.recv().await
    }
}

impl Stream for OutputStream {
    type Item = OutFrame;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<OutFrame>> {
        self.receiver.poll_recv(cx)
    }
}

/// Running stage tasks of one assembled pipeline
pub struct AssembledPipeline {
    chain: Vec<StageKind>,
    tasks: Vec<JoinHandle<()>>,
    closing: watch::Sender<bool>,
}

impl AssembledPipeline {
    /// Stages in frame order
    pub fn chain(&self) -> &[StageKind] {
        &self.chain
    }

    /// Whether every stage task has exited on its own
    ///
    /// True once the capture stream ended (or the display went away) and
    /// the chain has drained. Such a pipeline produces no more frames.
    pub fn has_ended(&self) -> bool {
        self.tasks.iter().all(JoinHandle::is_finished)
    }

    /// Stop delivering to the display and wait for every stage to finish
    ///
    /// Only returns once the capture stream has ended, so stop the capture
    /// source first. Frames still in flight are drained and released.
    pub async fn finish(self) {
        self.closing.send_replace(true);
        for (kind, task) in self.chain.iter().zip(self.tasks) {
            if let Err(e) = task.await {
                error!(stage = %kind, error = %e, "Stage task failed");
            }
        }
    }
}

/// Build and start the stage chain for `config`
///
/// Must be called inside a Tokio runtime. On error nothing is started and
/// every frame already queued in `frames` is released.
pub fn assemble(
    config: &PipelineConfig,
    mut frames: RawFrameReceiver,
    collaborators: &Collaborators,
) -> Result<(AssembledPipeline, OutputStream), PipelineError> {
    let chain = StageKind::chain_for(config);

    let optional: Result<Vec<Box<dyn FrameStage>>, PipelineError> = chain
        .iter()
        .filter(|kind| kind.is_optional())
        .map(|kind| collaborators.build_stage(*kind, config))
        .collect();
    let optional = match optional {
        Ok(stages) => stages,
        Err(e) => {
            stage::drain_raw_frames(&mut frames);
            return Err(e);
        }
    };

    let (closing, closing_rx) = watch::channel(false);
    let mut tasks = Vec::with_capacity(chain.len());

    let (raster_tx, mut upstream) = mpsc::channel(STAGE_CHANNEL_CAPACITY);
    tasks.push(tokio::spawn(stage::run_raster_conversion(
        RasterConversionStage::new(collaborators.surfaces.clone()),
        frames,
        raster_tx,
    )));

    for stage in optional {
        let (tx, rx) = mpsc::channel(STAGE_CHANNEL_CAPACITY);
        tasks.push(tokio::spawn(stage::run_stage(stage, upstream, tx)));
        upstream = rx;
    }

    let (out_tx, out_rx) = mpsc::channel(OUTPUT_CHANNEL_CAPACITY);
    tasks.push(tokio::spawn(stage::run_encode(
        EncodeStage::new(),
        upstream,
        out_tx,
        closing_rx,
    )));

    info!(chain = %config, "Pipeline assembled");

    Ok((
        AssembledPipeline {
            chain,
            tasks,
            closing,
        },
        OutputStream { receiver: out_rx },
    ))
}
