// SPDX-License-Identifier: MPL-2.0

//! Integration tests for the reconfiguration controller

mod common;

use camera_compositor::backends::camera::{BackendError, CaptureSettings, HandleTracker};
use camera_compositor::pipelines::compositor::{
    BlendSettings, Category, Collaborators, ControllerState, OutputStream, PipelineConfig,
    Reconfigured, ReconfigurationController,
};
use camera_compositor::PipelineError;
use common::*;
use std::sync::Arc;
use std::time::Duration;

const FRAMES: usize = 5;

struct Harness {
    backend: Arc<ScriptedBackend>,
    controller: Arc<ReconfigurationController>,
}

fn harness() -> Harness {
    harness_with(|backend| backend)
}

fn harness_with(script: impl FnOnce(ScriptedBackend) -> ScriptedBackend) -> Harness {
    let surfaces = HandleTracker::new("drawing-surface");
    let backend = Arc::new(script(ScriptedBackend::new(FRAMES, surfaces.clone())));
    let collaborators = Collaborators::new()
        .with_surfaces(surfaces)
        .with_scorer(Arc::new(RecordingScorer::new()))
        .with_segmenter(Arc::new(LabelSegmenter::new(Category::BodySkin.label())));
    let controller = Arc::new(ReconfigurationController::new(
        backend.clone(),
        CaptureSettings::default(),
        collaborators,
    ));
    Harness {
        backend,
        controller,
    }
}

fn scoring(on: bool) -> PipelineConfig {
    PipelineConfig {
        enable_scoring: on,
        ..Default::default()
    }
}

fn rebuilt(result: Result<Reconfigured, PipelineError>) -> OutputStream {
    match result {
        Ok(Reconfigured::Rebuilt(output)) => output,
        other => panic!("expected a rebuilt pipeline, got {:?}", other),
    }
}

async fn take(output: &mut OutputStream, n: usize) -> Vec<u64> {
    let mut timestamps = Vec::new();
    for _ in 0..n {
        timestamps.push(output.recv().await.expect("frame").timestamp);
    }
    timestamps
}

#[tokio::test]
async fn test_first_config_starts_pipeline() {
    let h = harness();
    assert_eq!(h.controller.state().await, ControllerState::Idle);

    let mut output = rebuilt(h.controller.reconfigure(scoring(true)).await);

    assert_eq!(h.controller.state().await, ControllerState::Running);
    assert_eq!(h.controller.current_config().await, Some(scoring(true)));
    assert_eq!(take(&mut output, FRAMES).await, vec![1000, 1001, 1002, 1003, 1004]);

    h.controller.stop().await;
    assert!(h.backend.all_released());
}

#[tokio::test]
async fn test_equal_config_is_a_no_op() {
    let h = harness();
    let _output = rebuilt(h.controller.reconfigure(scoring(false)).await);

    let again = h.controller.reconfigure(scoring(false)).await;
    assert!(matches!(again, Ok(Reconfigured::Unchanged)));
    assert_eq!(h.backend.acquisitions(), 1);
    assert_eq!(h.backend.events(), vec![Event::Acquired(1)]);

    h.controller.stop().await;
}

#[tokio::test]
async fn test_include_order_does_not_matter() {
    let h = harness();
    let config = PipelineConfig {
        enable_segmentation: true,
        blend: BlendSettings {
            include: vec![Category::FaceSkin, Category::BodySkin],
            ..Default::default()
        },
        ..Default::default()
    };
    let _output = rebuilt(h.controller.reconfigure(config).await);

    let reordered = PipelineConfig {
        enable_segmentation: true,
        ..Default::default()
    };
    assert!(matches!(
        h.controller.reconfigure(reordered).await,
        Ok(Reconfigured::Unchanged)
    ));

    h.controller.stop().await;
}

#[tokio::test]
async fn test_reconfigure_stops_previous_before_acquiring() {
    let h = harness();
    let mut first = rebuilt(h.controller.reconfigure(scoring(false)).await);
    assert_eq!(take(&mut first, 2).await, vec![1000, 1001]);

    let mut second = rebuilt(h.controller.reconfigure(scoring(true)).await);

    assert_eq!(
        h.backend.events(),
        vec![Event::Acquired(1), Event::Stopped(1), Event::Acquired(2)]
    );
    assert_eq!(h.backend.clean_at_acquire(), vec![true, true]);
    assert!(h.backend.trackers()[0].is_balanced());

    // The old stream ends; the new one starts from the new session
    while first.recv().await.is_some() {}
    assert_eq!(take(&mut second, FRAMES).await, vec![2000, 2001, 2002, 2003, 2004]);

    h.controller.stop().await;
    assert!(h.backend.all_released());
}

#[tokio::test]
async fn test_acquisition_failure_leaves_controller_idle() {
    let h = harness();
    let _output = rebuilt(h.controller.reconfigure(scoring(false)).await);

    h.backend
        .fail_next(BackendError::PermissionDenied("portal refused".into()));
    let result = h.controller.reconfigure(scoring(true)).await;

    assert!(matches!(
        result,
        Err(PipelineError::Acquisition(BackendError::PermissionDenied(_)))
    ));
    assert_eq!(h.controller.state().await, ControllerState::Idle);
    assert_eq!(h.controller.current_config().await, None);
    assert!(h.backend.all_released());

    // A retry is possible
    let mut output = rebuilt(h.controller.reconfigure(scoring(true)).await);
    assert_eq!(take(&mut output, 1).await, vec![2000]);
    h.controller.stop().await;
}

#[tokio::test]
async fn test_missing_collaborator_is_rejected_before_teardown() {
    let surfaces = HandleTracker::new("drawing-surface");
    let backend = Arc::new(ScriptedBackend::new(FRAMES, surfaces.clone()));
    let controller = ReconfigurationController::new(
        backend.clone(),
        CaptureSettings::default(),
        Collaborators::new().with_surfaces(surfaces),
    );
    let _output = rebuilt(controller.reconfigure(scoring(false)).await);

    let result = controller.reconfigure(scoring(true)).await;

    assert!(matches!(result, Err(PipelineError::Assembly(_))));
    assert_eq!(controller.state().await, ControllerState::Running);
    assert_eq!(backend.events(), vec![Event::Acquired(1)]);
    controller.stop().await;
}

#[tokio::test]
async fn test_stop_is_idempotent() {
    let h = harness();
    let _output = rebuilt(h.controller.reconfigure(scoring(true)).await);

    h.controller.stop().await;
    h.controller.stop().await;

    assert_eq!(h.controller.state().await, ControllerState::Idle);
    assert_eq!(
        h.backend.events(),
        vec![Event::Acquired(1), Event::Stopped(1)]
    );
    assert!(h.backend.all_released());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_reconfigures_are_serialized() {
    let h = harness();

    let configs: Vec<PipelineConfig> = (0..6)
        .map(|i| PipelineConfig {
            enable_scoring: i % 2 == 0,
            enable_segmentation: i % 3 == 0,
            ..Default::default()
        })
        .collect();

    let tasks: Vec<_> = configs
        .into_iter()
        .map(|config| {
            let controller = Arc::clone(&h.controller);
            tokio::spawn(async move { controller.reconfigure(config).await.map(|_| ()) })
        })
        .collect();
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    assert_eq!(h.controller.state().await, ControllerState::Running);
    assert!(h.backend.clean_at_acquire().iter().all(|clean| *clean));

    // Every acquisition after the first is preceded by stopping the previous one
    let events = h.backend.events();
    for pair in events.windows(2) {
        if let [Event::Acquired(a), Event::Acquired(b)] = pair {
            panic!("session {} acquired while {} was still running", b, a);
        }
    }

    h.controller.stop().await;
    assert!(h.backend.all_released());
}

async fn wait_for_idle(controller: &ReconfigurationController) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while controller.state().await != ControllerState::Idle {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("controller should go idle once capture ends");
}

#[tokio::test]
async fn test_capture_end_returns_to_idle_and_same_config_restarts() {
    let h = harness_with(ScriptedBackend::ending_streams);
    let mut first = rebuilt(h.controller.reconfigure(scoring(true)).await);

    assert_eq!(take(&mut first, FRAMES).await, vec![1000, 1001, 1002, 1003, 1004]);
    assert!(first.recv().await.is_none());

    wait_for_idle(&h.controller).await;
    assert_eq!(h.controller.current_config().await, None);
    assert!(h.backend.all_released());

    // The same config is not a no-op once capture has ended
    let mut second = rebuilt(h.controller.reconfigure(scoring(true)).await);
    assert_eq!(
        h.backend.events(),
        vec![Event::Acquired(1), Event::Stopped(1), Event::Acquired(2)]
    );
    assert_eq!(take(&mut second, 1).await, vec![2000]);

    h.controller.stop().await;
    assert!(h.backend.all_released());
}
