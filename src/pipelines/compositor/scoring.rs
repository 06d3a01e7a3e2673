// SPDX-License-Identifier: MPL-2.0

//! Sharpness scoring stage
//!
//! Measures edge blur on every frame and publishes the reading to a
//! [`MetricsSink`]. Frames pass through untouched. A scorer failure is
//! reported once; the stage keeps forwarding frames and re-arms the report
//! after the next successful measurement. Measurements run on the blocking
//! pool.

use super::raster::RasterFrame;
use super::stage::FrameStage;
use crate::errors::StageError;
use futures::FutureExt;
use futures::future::BoxFuture;
use image::RgbaImage;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, trace, warn};

/// Edge-width blur statistics for one frame
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BlurStats {
    pub width: u32,
    pub height: u32,
    pub num_edges: u32,
    /// Mean edge width in pixels
    pub avg_edge_width: f32,
    /// Mean edge width relative to the frame width (0.0 - 1.0)
    pub avg_edge_width_perc: f32,
}

impl BlurStats {
    /// Blur metric as a percentage (higher is blurrier)
    pub fn blur_percent(&self) -> f32 {
        self.avg_edge_width_perc * 100.0
    }
}

/// One published sharpness reading
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SharpnessReport {
    pub timestamp: u64,
    pub blur_percent: f32,
    pub stats: BlurStats,
}

/// Scoring collaborator
///
/// Measurements are synchronous and must not modify the image.
pub trait SharpnessScorer: Send + Sync {
    fn measure(&self, image: &RgbaImage) -> Result<BlurStats, StageError>;
}

/// Receiver of sharpness readings
pub trait MetricsSink: Send + Sync {
    fn report(&self, report: SharpnessReport);
}

/// Keeps only the latest reading; consumers poll or await changes
impl MetricsSink for watch::Sender<Option<SharpnessReport>> {
    fn report(&self, report: SharpnessReport) {
        self.send_replace(Some(report));
    }
}

/// Writes readings to the log at debug level
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingMetricsSink;

impl MetricsSink for TracingMetricsSink {
    fn report(&self, report: SharpnessReport) {
        debug!(
            timestamp = report.timestamp,
            blur = %format!("{:.1}", report.blur_percent),
            edges = report.stats.num_edges,
            "Sharpness"
        );
    }
}

/// Pass-through stage publishing a blur reading per frame
pub struct SharpnessScoringStage {
    scorer: Arc<dyn SharpnessScorer>,
    metrics: Arc<dyn MetricsSink>,
    failure_reported: bool,
    failures: u64,
}

impl SharpnessScoringStage {
    pub fn new(scorer: Arc<dyn SharpnessScorer>, metrics: Arc<dyn MetricsSink>) -> Self {
        Self {
            scorer,
            metrics,
            failure_reported: false,
            failures: 0,
        }
    }

    /// Measure on the blocking pool; a panicking scorer counts as a failure
    async fn measure(&self, frame: &RasterFrame) -> Result<BlurStats, StageError> {
        let scorer = Arc::clone(&self.scorer);
        let image = frame.image().clone();
        tokio::task::spawn_blocking(move || scorer.measure(&image))
            .await
            .unwrap_or_else(|e| Err(StageError::Scoring(format!("scoring task failed: {}", e))))
    }

    fn record(&mut self, frame: &RasterFrame, measured: Result<BlurStats, StageError>) {
        match measured {
            Ok(stats) => {
                if self.failure_reported {
                    info!(
                        failures = self.failures,
                        "Sharpness scoring recovered"
                    );
                    self.failure_reported = false;
                    self.failures = 0;
                }
                self.metrics.report(SharpnessReport {
                    timestamp: frame.timestamp(),
                    blur_percent: stats.blur_percent(),
                    stats,
                });
            }
            Err(e) => {
                self.failures += 1;
                if self.failure_reported {
                    trace!(error = %e, "Sharpness scoring still failing");
                } else {
                    warn!(
                        timestamp = frame.timestamp(),
                        error = %e,
                        "Sharpness scoring failed, frames continue without a metric"
                    );
                    self.failure_reported = true;
                }
            }
        }
    }
}

impl FrameStage for SharpnessScoringStage {
    fn name(&self) -> &'static str {
        "sharpness-scoring"
    }

    fn process(&mut self, frame: RasterFrame) -> BoxFuture<'_, RasterFrame> {
        async move {
            let measured = self.measure(&frame).await;
            self.record(&frame, measured);
            frame
        }
        .boxed()
    }
}
