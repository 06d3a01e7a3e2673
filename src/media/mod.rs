// SPDX-License-Identifier: MPL-2.0

//! Media utilities for pixel format conversion
//!
//! Captured frames arrive in whatever packed layout the source negotiated
//! (RGBA, BGRx, RGB, GRAY8, ...). The compositor works on RGBA rasters, and the
//! virtual camera consumes opaque RGB. The [`conversions`] module covers both
//! directions.

pub mod conversions;

pub use conversions::{rgba_to_rgb, to_rgba_image};
