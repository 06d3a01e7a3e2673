// SPDX-License-Identifier: MPL-2.0

//! Reconfiguration controller
//!
//! Owns at most one running pipeline. A new configuration always tears the
//! old pipeline down completely (capture stopped, every stage finished,
//! every frame released) before a new capture source is acquired.
//! Requests are serialized: a request arriving mid-rebuild waits for the
//! rebuild to finish, then runs against the resulting state.
//!
//! ```text
//!            reconfigure(c)                 reconfigure(c') / c' != c
//!   Idle ───────────────────▶ Running(c) ─────────────────────────────┐
//!    ▲                          │   ▲                                  │
//!    │ stop / acquire failed /  │   └── acquire ok ◀── teardown ◀──────┘
//!    │ capture stream ended     │
//!    └──────────────────────────┘
//! ```

use super::{AssembledPipeline, Collaborators, OutputStream, PipelineConfig, assemble};
use crate::backends::camera::{
    BackendError, CaptureBackend, CaptureSession, CaptureSettings, CaptureSource, HandleTracker,
};
use crate::errors::PipelineError;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

/// Observable controller state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerState {
    Idle,
    Running,
}

/// Outcome of a successful reconfiguration
#[derive(Debug)]
pub enum Reconfigured {
    /// The running pipeline already matches; keep using its output
    Unchanged,
    /// A new pipeline is running; its output replaces the previous one
    Rebuilt(OutputStream),
}

/// A running pipeline and the capture session feeding it
struct ActivePipeline {
    id: u64,
    config: PipelineConfig,
    source: Box<dyn CaptureSource>,
    frames: HandleTracker,
    pipeline: AssembledPipeline,
}

impl ActivePipeline {
    /// Stop capture, then wait for every stage to drain and finish
    async fn teardown(self, surfaces: &HandleTracker) {
        let ActivePipeline {
            id,
            source,
            frames,
            pipeline,
            ..
        } = self;

        debug!(pipeline = id, source = %source.description(), "Stopping capture");
        let stopped = stop_source(id, source).await;

        pipeline.finish().await;
        drop(stopped);

        if frames.is_balanced() && surfaces.outstanding() == 0 {
            info!(pipeline = id, frames = frames.acquired(), "Pipeline stopped");
        } else {
            error!(
                pipeline = id,
                raw_outstanding = frames.outstanding(),
                raw_leaked = frames.leaked(),
                surfaces_outstanding = surfaces.outstanding(),
                "Pipeline stopped with unreleased frames"
            );
        }
    }
}

/// Stop a capture source on the blocking pool
///
/// Hands the stopped source back so it is dropped after the chain drains.
async fn stop_source(id: u64, source: Box<dyn CaptureSource>) -> Option<Box<dyn CaptureSource>> {
    let stopped = tokio::task::spawn_blocking(move || {
        let mut source = source;
        source.stop();
        source
    })
    .await;
    match stopped {
        Ok(source) => Some(source),
        Err(e) => {
            error!(pipeline = id, error = %e, "Capture stop task failed");
            None
        }
    }
}

/// Tear down the active pipeline if its capture stream ended on its own
async fn reap_ended(active: &mut Option<ActivePipeline>, surfaces: &HandleTracker) {
    if active
        .as_ref()
        .is_some_and(|current| current.pipeline.has_ended())
        && let Some(ended) = active.take()
    {
        info!(pipeline = ended.id, "Capture stream ended, pipeline finished");
        ended.teardown(surfaces).await;
    }
}

/// Serializes pipeline rebuilds against one capture backend
pub struct ReconfigurationController {
    backend: Arc<dyn CaptureBackend>,
    settings: CaptureSettings,
    collaborators: Collaborators,
    active: Mutex<Option<ActivePipeline>>,
    next_id: AtomicU64,
}

impl ReconfigurationController {
    pub fn new(
        backend: Arc<dyn CaptureBackend>,
        settings: CaptureSettings,
        collaborators: Collaborators,
    ) -> Self {
        Self {
            backend,
            settings,
            collaborators,
            active: Mutex::new(None),
            next_id: AtomicU64::new(1),
        }
    }

    /// Apply a configuration
    ///
    /// A config equal to the running one is a no-op. A pipeline whose
    /// capture stream ended by itself no longer counts as running, so the
    /// same config rebuilds it. Otherwise the running
    /// pipeline is fully stopped first, then capture is acquired and a new
    /// chain assembled. On failure the controller is left Idle.
    ///
    /// # Errors
    /// * `PipelineError::Assembly` - an enabled stage has no collaborator
    ///   (checked before anything is stopped)
    /// * `PipelineError::Acquisition` - capture was denied or unavailable
    pub async fn reconfigure(&self, config: PipelineConfig) -> Result<Reconfigured, PipelineError> {
        let config = config.normalized();
        self.collaborators.check(&config)?;

        let mut active = self.active.lock().await;
        reap_ended(&mut active, self.collaborators.surfaces()).await;

        if let Some(current) = active.as_ref()
            && current.config == config
        {
            debug!(pipeline = current.id, "Configuration unchanged");
            return Ok(Reconfigured::Unchanged);
        }

        if let Some(previous) = active.take() {
            info!(pipeline = previous.id, "Tearing down pipeline for new configuration");
            previous.teardown(self.collaborators.surfaces()).await;
        }

        let session = self.acquire().await?;
        let CaptureSession {
            source,
            frames,
            tracker,
        } = session;

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (pipeline, output) = match assemble(&config, frames, &self.collaborators) {
            Ok(assembled) => assembled,
            Err(e) => {
                stop_source(id, source).await;
                return Err(e);
            }
        };

        info!(
            pipeline = id,
            source = %source.description(),
            chain = %config,
            "Pipeline running"
        );

        *active = Some(ActivePipeline {
            id,
            config,
            source,
            frames: tracker,
            pipeline,
        });

        Ok(Reconfigured::Rebuilt(output))
    }

    async fn acquire(&self) -> Result<CaptureSession, PipelineError> {
        let backend = Arc::clone(&self.backend);
        let settings = self.settings.clone();

        let acquired = tokio::task::spawn_blocking(move || backend.acquire(&settings))
            .await
            .map_err(|e| BackendError::Other(format!("capture task failed: {}", e)))
            .and_then(|result| result);

        acquired.map_err(|e| {
            if e.is_acquisition_failure() {
                warn!(backend = self.backend.name(), error = %e, "Capture acquisition failed");
            } else {
                error!(backend = self.backend.name(), error = %e, "Capture backend error");
            }
            PipelineError::Acquisition(e)
        })
    }

    /// Tear down the running pipeline, if any
    pub async fn stop(&self) {
        let mut active = self.active.lock().await;
        if let Some(previous) = active.take() {
            previous.teardown(self.collaborators.surfaces()).await;
        }
    }

    /// Running while a pipeline is live; a pipeline whose capture stream
    /// ended is torn down here and reported as Idle
    pub async fn state(&self) -> ControllerState {
        let mut active = self.active.lock().await;
        reap_ended(&mut active, self.collaborators.surfaces()).await;
        if active.is_some() {
            ControllerState::Running
        } else {
            ControllerState::Idle
        }
    }

    /// Configuration of the running pipeline
    pub async fn current_config(&self) -> Option<PipelineConfig> {
        let mut active = self.active.lock().await;
        reap_ended(&mut active, self.collaborators.surfaces()).await;
        active.as_ref().map(|active| active.config.clone())
    }

    /// Capture settings every acquisition uses
    pub fn capture_settings(&self) -> &CaptureSettings {
        &self.settings
    }
}
