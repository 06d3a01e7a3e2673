// SPDX-License-Identifier: MPL-2.0

//! Backend abstraction layer for capture and display
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │              Compositor Layer                │
//! └────────────────────┬────────────────────────┘
//!                      │
//! ┌────────────────────┴────────────────────────┐
//! │              Backend Layer                   │
//! │  ┌──────────────────┐  ┌─────────────────┐  │
//! │  │     Camera       │  │ Virtual Camera  │  │
//! │  │   (GStreamer)    │  │   (PipeWire)    │  │
//! │  └──────────────────┘  └─────────────────┘  │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`camera`]: Capture sources and frame lifecycle accounting
//! - [`virtual_camera`]: Virtual camera sink for the composited output

pub mod camera;
pub mod virtual_camera;
