// SPDX-License-Identifier: MPL-2.0

//! Camera Compositor - a live camera frame pipeline
//!
//! Captured frames flow through raster conversion, optional sharpness
//! scoring, optional segmentation blending and encoding, then out to a
//! PipeWire virtual camera. The stage chain can be reconfigured while
//! running without leaking frames or reordering output.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - [`backends`]: Capture sources and the virtual camera sink
//! - [`media`]: Pixel format conversion
//! - [`pipelines`]: The compositor stage chain and its controller
//! - [`processors`]: Built-in scoring and segmentation collaborators
//! - [`config`]: User configuration handling
//!
//! # Example
//!
//! ```ignore
//! let controller = ReconfigurationController::new(backend, settings, collaborators);
//! if let Reconfigured::Rebuilt(mut output) = controller.reconfigure(config).await? {
//!     while let Some(frame) = output.recv().await {
//!         sink.show(frame)?;
//!     }
//! }
//! ```

pub mod backends;
pub mod config;
pub mod constants;
pub mod errors;
pub mod media;
pub mod pipelines;
pub mod processors;

// Re-export commonly used types
pub use config::Config;
pub use errors::{AppError, AppResult, PipelineError, StageError};
pub use pipelines::compositor::{
    Collaborators, ControllerState, OutFrame, OutputStream, PipelineConfig, Reconfigured,
    ReconfigurationController,
};
