// SPDX-License-Identifier: MPL-2.0

//! Frame processing pipelines
//!
//! # Pipeline Architecture
//!
//! ```text
//! ┌──────────────┐     ┌───────────────────────┐     ┌────────────────┐
//! │ Camera Frame │ ──▶ │  Compositor Pipeline  │ ──▶ │ Virtual Camera │
//! │  (RawFrame)  │     │  - Raster conversion  │     │   (OutFrame)   │
//! │              │     │  - Sharpness scoring  │     │                │
//! │              │     │  - Segmentation blend │     │                │
//! │              │     │  - Encode             │     │                │
//! └──────────────┘     └───────────────────────┘     └────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`compositor`]: Stage chain, assembly and live reconfiguration

pub mod compositor;
