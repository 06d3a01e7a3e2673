// SPDX-License-Identifier: GPL-3.0-only

//! CLI commands for running the compositor
//!
//! `run` starts the pipeline and reads live commands from stdin:
//!
//! ```text
//! scoring on|off          toggle sharpness scoring
//! segmentation on|off     toggle segmentation blending
//! include <labels...>     categories to tint (names or label numbers)
//! mix <ratio>             blend strength, 0.0 - 1.0
//! status                  print the controller state and configuration
//! retry                   rebuild with the current configuration if idle
//! quit                    stop and exit
//! ```

use camera_compositor::backends::camera::{CaptureSourceKind, GstCaptureBackend};
use camera_compositor::backends::virtual_camera::{FrameCounter, FrameSink, VirtualCameraManager};
use camera_compositor::constants::timing::{FRAME_LOG_INTERVAL, METRICS_PRINT_INTERVAL};
use camera_compositor::pipelines::compositor::{
    Category, Collaborators, ControllerState, OutFrame, OutputStream, PipelineConfig, Reconfigured,
    ReconfigurationController, SharpnessReport,
};
use camera_compositor::processors::{EdgeWidthScorer, SkinToneSegmenter};
use camera_compositor::{AppError, AppResult, Config};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{mpsc, watch};
use tracing::{info, warn};

/// Options of the `run` subcommand
pub struct RunOptions {
    pub config: Option<PathBuf>,
    pub scoring: bool,
    pub segmentation: bool,
    pub source: Option<CaptureSourceKind>,
    pub device: Option<String>,
    pub no_virtual_camera: bool,
}

/// A live command read from stdin
#[derive(Debug, Clone, PartialEq)]
enum Command {
    Scoring(bool),
    Segmentation(bool),
    Include(Vec<Category>),
    Mix(f32),
    Retry,
    Status,
    Help,
    Quit,
}

impl Command {
    fn parse(line: &str) -> Result<Self, String> {
        let mut words = line.split_whitespace();
        let name = words.next().ok_or_else(|| "empty command".to_string())?;
        let args: Vec<&str> = words.collect();

        match name.to_ascii_lowercase().as_str() {
            "scoring" => parse_switch(&args).map(Command::Scoring),
            "segmentation" | "seg" => parse_switch(&args).map(Command::Segmentation),
            "include" => args
                .iter()
                .map(|arg| arg.parse::<Category>())
                .collect::<Result<Vec<_>, _>>()
                .map(Command::Include),
            "mix" => match args.as_slice() {
                [ratio] => ratio
                    .parse::<f32>()
                    .ok()
                    .filter(|r| (0.0..=1.0).contains(r))
                    .map(Command::Mix)
                    .ok_or_else(|| format!("mix ratio must be between 0 and 1, got '{}'", ratio)),
                _ => Err("usage: mix <ratio>".to_string()),
            },
            "retry" => Ok(Command::Retry),
            "status" => Ok(Command::Status),
            "help" | "?" => Ok(Command::Help),
            "quit" | "exit" | "q" => Ok(Command::Quit),
            other => Err(format!("unknown command '{}' (try 'help')", other)),
        }
    }

    /// Configuration after applying this command, if it changes one
    fn apply_to(&self, config: &PipelineConfig) -> Option<PipelineConfig> {
        let mut next = config.clone();
        match self {
            Command::Scoring(on) => next.enable_scoring = *on,
            Command::Segmentation(on) => next.enable_segmentation = *on,
            Command::Include(categories) => next.blend.include = categories.clone(),
            Command::Mix(ratio) => next.blend.mix_ratio = *ratio,
            Command::Retry => {}
            Command::Status | Command::Help | Command::Quit => return None,
        }
        Some(next)
    }
}

fn parse_switch(args: &[&str]) -> Result<bool, String> {
    match args {
        ["on"] | ["1"] | ["true"] => Ok(true),
        ["off"] | ["0"] | ["false"] => Ok(false),
        _ => Err("expected 'on' or 'off'".to_string()),
    }
}

fn load_config(path: Option<&Path>) -> AppResult<Config> {
    match path {
        Some(path) => Config::load(path),
        None => Config::load_default(),
    }
}

/// Print the effective configuration as JSON
pub fn print_config(path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config(path)?;
    println!("{}", config.to_json()?);
    Ok(())
}

/// Run the compositor until `quit` or Ctrl+C
pub fn run(options: RunOptions) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = load_config(options.config.as_deref())?;
    config.pipeline.enable_scoring |= options.scoring;
    config.pipeline.enable_segmentation |= options.segmentation;
    if let Some(source) = options.source {
        config.capture.source = source;
    }
    if options.device.is_some() {
        config.capture.device = options.device;
    }
    if options.no_virtual_camera {
        config.virtual_camera.enabled = false;
    }

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(run_compositor(config))?;
    Ok(())
}

async fn run_compositor(config: Config) -> AppResult<()> {
    let (metrics_tx, metrics_rx) = watch::channel::<Option<SharpnessReport>>(None);
    let collaborators = Collaborators::new()
        .with_scorer(Arc::new(EdgeWidthScorer::new()))
        .with_segmenter(Arc::new(SkinToneSegmenter::new()))
        .with_metrics(Arc::new(metrics_tx));

    let controller = ReconfigurationController::new(
        Arc::new(GstCaptureBackend::new()),
        config.capture.clone(),
        collaborators,
    );

    let sink: Box<dyn FrameSink> = if config.virtual_camera.enabled {
        Box::new(VirtualCameraManager::new(config.virtual_camera.node()))
    } else {
        Box::new(FrameCounter::new())
    };

    let (streams_tx, streams_rx) = mpsc::unbounded_channel();
    let display = tokio::spawn(display_loop(streams_rx, sink));
    let metrics = tokio::spawn(print_metrics(metrics_rx));

    println!("Capture: {}", config.capture);
    let mut current = config.pipeline.clone();
    match apply(&controller, current.clone(), &streams_tx).await {
        Ok(()) => println!("Running: {} (type 'help' for commands)", current),
        Err(e) => {
            eprintln!("{}", e);
            println!("Idle: type 'retry' to try again, or 'help' for commands");
        }
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                println!();
                println!("Stopping...");
                break;
            }
            line = lines.next_line(), if stdin_open => match line {
                Ok(Some(line)) if line.trim().is_empty() => {}
                Ok(Some(line)) => match Command::parse(&line) {
                    Ok(Command::Quit) => break,
                    Ok(Command::Status) => print_status(&controller, &current).await,
                    Ok(Command::Help) => print_help(),
                    Ok(command) => {
                        let Some(next) = command.apply_to(&current) else {
                            continue;
                        };
                        match apply(&controller, next.clone(), &streams_tx).await {
                            Ok(()) => {
                                current = next;
                                println!("Running: {}", current);
                            }
                            Err(e) => eprintln!("{}", e),
                        }
                    }
                    Err(msg) => eprintln!("{}", msg),
                },
                Ok(None) => {
                    info!("stdin closed, waiting for Ctrl+C");
                    stdin_open = false;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    controller.stop().await;
    drop(streams_tx);
    if let Err(e) = display.await {
        warn!(error = %e, "Display task failed");
    }
    metrics.abort();
    Ok(())
}

/// Reconfigure and hand any new output stream to the display
async fn apply(
    controller: &ReconfigurationController,
    config: PipelineConfig,
    streams: &mpsc::UnboundedSender<OutputStream>,
) -> AppResult<()> {
    match controller.reconfigure(config).await? {
        Reconfigured::Unchanged => {}
        Reconfigured::Rebuilt(output) => {
            streams
                .send(output)
                .map_err(|_| AppError::Other("display task has stopped".into()))?;
        }
    }
    Ok(())
}

/// Forward frames from the latest output stream into the sink
async fn display_loop(
    mut streams: mpsc::UnboundedReceiver<OutputStream>,
    mut sink: Box<dyn FrameSink>,
) {
    let mut current: Option<OutputStream> = None;
    let mut failures: u64 = 0;

    loop {
        tokio::select! {
            next = streams.recv() => match next {
                Some(stream) => current = Some(stream),
                None => break,
            },
            frame = next_frame(&mut current) => match frame {
                Some(frame) => {
                    if let Err(e) = sink.show(frame) {
                        failures += 1;
                        if failures == 1 || failures % FRAME_LOG_INTERVAL == 0 {
                            warn!(failures, error = %e, "Failed to display frame");
                        }
                    }
                }
                None => current = None,
            },
        }
    }

    sink.close();
}

async fn next_frame(stream: &mut Option<OutputStream>) -> Option<OutFrame> {
    match stream {
        Some(stream) => stream.recv().await,
        None => std::future::pending().await,
    }
}

async fn print_status(controller: &ReconfigurationController, requested: &PipelineConfig) {
    println!("{}", status_line(controller.state().await, requested));
}

fn status_line(state: ControllerState, requested: &PipelineConfig) -> String {
    match state {
        ControllerState::Running => format!("Running: {} ({:?})", requested, requested.blend),
        ControllerState::Idle => format!("Idle (requested: {})", requested),
    }
}

/// Print the latest sharpness reading once per interval
async fn print_metrics(mut readings: watch::Receiver<Option<SharpnessReport>>) {
    let mut ticker = tokio::time::interval(METRICS_PRINT_INTERVAL);
    loop {
        ticker.tick().await;
        match readings.has_changed() {
            Ok(true) => {
                let latest = *readings.borrow_and_update();
                if let Some(report) = latest {
                    println!(
                        "Blur: {:.1}% ({} edges, {:.1}px avg)",
                        report.blur_percent, report.stats.num_edges, report.stats.avg_edge_width
                    );
                }
            }
            Ok(false) => {}
            Err(_) => break,
        }
    }
}

fn print_help() {
    println!("Commands:");
    println!("  scoring on|off          toggle sharpness scoring");
    println!("  segmentation on|off     toggle segmentation blending");
    println!("  include <labels...>     categories to tint, e.g. 'include body_skin face_skin'");
    println!("  mix <ratio>             blend strength, 0.0 - 1.0");
    println!("  status                  print the controller state and configuration");
    println!("  retry                   rebuild with the current configuration if idle");
    println!("  quit                    stop and exit");
}

#[cfg(test)]
mod tests {
    use super::*;
    use camera_compositor::backends::camera::{
        BackendError, BackendResult, CaptureBackend, CaptureSession, CaptureSettings,
    };

    #[test]
    fn test_parse_switches() {
        assert_eq!(Command::parse("scoring on"), Ok(Command::Scoring(true)));
        assert_eq!(Command::parse("Segmentation off"), Ok(Command::Segmentation(false)));
        assert!(Command::parse("scoring maybe").is_err());
    }

    #[test]
    fn test_parse_include() {
        assert_eq!(
            Command::parse("include hair 3"),
            Ok(Command::Include(vec![Category::Hair, Category::FaceSkin]))
        );
        assert!(Command::parse("include wings").is_err());
    }

    #[test]
    fn test_parse_mix_bounds() {
        assert_eq!(Command::parse("mix 0.25"), Ok(Command::Mix(0.25)));
        assert!(Command::parse("mix 2").is_err());
        assert!(Command::parse("mix").is_err());
    }

    struct DeniedBackend;

    impl CaptureBackend for DeniedBackend {
        fn acquire(&self, _settings: &CaptureSettings) -> BackendResult<CaptureSession> {
            Err(BackendError::PermissionDenied("portal refused".into()))
        }

        fn name(&self) -> &'static str {
            "denied"
        }
    }

    #[tokio::test]
    async fn test_failed_start_reports_idle_status() {
        let controller = ReconfigurationController::new(
            Arc::new(DeniedBackend),
            Default::default(),
            Collaborators::new(),
        );
        let (streams_tx, _streams_rx) = mpsc::unbounded_channel();
        let requested = PipelineConfig::default();

        assert!(apply(&controller, requested.clone(), &streams_tx).await.is_err());

        let status = status_line(controller.state().await, &requested);
        assert!(status.starts_with("Idle"), "{}", status);
        assert!(Command::parse("retry").is_ok());
    }

    #[test]
    fn test_status_line_when_running() {
        let requested = PipelineConfig::default();
        assert!(status_line(ControllerState::Running, &requested).starts_with("Running:"));
    }

    #[test]
    fn test_apply_to_only_touches_named_field() {
        let base = PipelineConfig::default();
        let next = Command::Scoring(true).apply_to(&base).unwrap();
        assert!(next.enable_scoring);
        assert_eq!(next.blend, base.blend);
        assert_eq!(Command::Status.apply_to(&base), None);
        assert_eq!(Command::Retry.apply_to(&base), Some(base.clone()));
    }
}
