// SPDX-License-Identifier: GPL-3.0-only

//! Application-wide constants

use std::time::Duration;

/// Frame pipeline constants
pub mod pipeline {
    /// Capacity of the channels between compositor stages
    ///
    /// A stage holds at most one frame while the next one waits in its inbox,
    /// so a frame is never accepted before the previous one was forwarded.
    pub const STAGE_CHANNEL_CAPACITY: usize = 1;

    /// Capacity of the capture → raster conversion channel
    ///
    /// Frames arriving while this is full are dropped by the capture layer.
    pub const CAPTURE_CHANNEL_CAPACITY: usize = 2;

    /// Capacity of the encoded output stream
    pub const OUTPUT_CHANNEL_CAPACITY: usize = 1;

    /// Maximum buffer queue size on the capture appsink (keep small for low latency)
    pub const MAX_BUFFERS: u32 = 2;

    /// Pixel format requested from the capture pipeline
    pub const CAPTURE_FORMAT: &str = "RGBA";

    /// Pixel format pushed to the virtual camera (alpha discarded)
    pub const OUTPUT_FORMAT: &str = "RGB";
}

/// Timing constants
pub mod timing {
    use super::Duration;

    /// Frame counter modulo for periodic logging
    pub const FRAME_LOG_INTERVAL: u64 = 30;

    /// Pipeline playing state timeout on start
    pub const START_TIMEOUT_SECS: u64 = 5;

    /// How often the CLI prints the latest sharpness reading
    pub const METRICS_PRINT_INTERVAL: Duration = Duration::from_millis(1000);
}

/// Segmentation blend defaults
pub mod blend {
    /// Weight of the category color in the blended result
    pub const DEFAULT_MIX_RATIO: f32 = 0.5;
}

/// Virtual camera node defaults
pub mod virtual_camera {
    /// PipeWire node name of the output device
    pub const NODE_NAME: &str = "camera-compositor-virtual";

    /// Human readable name shown by video apps
    pub const NODE_DESCRIPTION: &str = "Camera Compositor (Virtual)";

    /// Framerate advertised in the virtual camera caps
    pub const FRAMERATE: i32 = 30;
}

/// Application information utilities
pub mod app_info {
    /// Get the application version from build-time environment
    pub fn version() -> &'static str {
        env!("GIT_VERSION")
    }

    /// Name of the directory used under the user config dir
    pub const CONFIG_DIR_NAME: &str = "camera-compositor";

    /// File name of the persisted configuration
    pub const CONFIG_FILE_NAME: &str = "config.json";
}
