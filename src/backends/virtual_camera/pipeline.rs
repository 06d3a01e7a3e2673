// SPDX-License-Identifier: MPL-2.0

//! GStreamer pipeline for virtual camera output via PipeWire
//!
//! Creates a pipeline that:
//! 1. Receives packed RGB frames from the compositor (via appsrc)
//! 2. Converts format as needed (via videoconvert)
//! 3. Outputs to a PipeWire virtual camera node

use crate::backends::camera::types::{BackendError, BackendResult};
use crate::constants::pipeline::OUTPUT_FORMAT;
use crate::constants::timing::{FRAME_LOG_INTERVAL, START_TIMEOUT_SECS};
use crate::constants::virtual_camera::FRAMERATE;
use gstreamer::prelude::*;
use gstreamer_app::AppSrc;
use tracing::{debug, error, info, warn};

/// PipeWire node identity of the virtual camera
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeIdentity {
    pub name: String,
    pub description: String,
}

/// Virtual camera GStreamer pipeline
///
/// Uses pipewiresink in provide mode so other applications see a camera.
pub struct VirtualCameraPipeline {
    pipeline: gstreamer::Pipeline,
    appsrc: AppSrc,
    width: u32,
    height: u32,
    pushed: u64,
}

impl VirtualCameraPipeline {
    /// Create a pipeline accepting `width`×`height` packed RGB frames
    pub fn new(width: u32, height: u32, node: &NodeIdentity) -> BackendResult<Self> {
        info!(width, height, node = %node.name, "Creating virtual camera pipeline (RGB)");

        gstreamer::init().map_err(|e| {
            BackendError::InitializationFailed(format!("GStreamer init failed: {}", e))
        })?;

        let pipeline = gstreamer::Pipeline::new();

        let appsrc = make_element("appsrc", "virtual_camera_src")?;
        let videoconvert = make_element("videoconvert", "virtual_camera_convert")?;
        let pipewiresink = make_element("pipewiresink", "virtual_camera_sink")?;

        let appsrc = appsrc.downcast::<AppSrc>().map_err(|_| {
            BackendError::InitializationFailed("Failed to downcast to AppSrc".into())
        })?;

        let caps = gstreamer::Caps::builder("video/x-raw")
            .field("format", OUTPUT_FORMAT)
            .field("width", width as i32)
            .field("height", height as i32)
            .field("framerate", gstreamer::Fraction::new(FRAMERATE, 1))
            .build();

        appsrc.set_caps(Some(&caps));
        appsrc.set_format(gstreamer::Format::Time);
        appsrc.set_is_live(true);
        appsrc.set_do_timestamp(true);

        // media.role = "Camera" lets xdg-desktop-portal list the node as a camera
        pipewiresink.set_property_from_str("mode", "provide");
        let stream_props = gstreamer::Structure::builder("props")
            .field("media.class", "Video/Source")
            .field("media.role", "Camera")
            .field("node.name", node.name.as_str())
            .field("node.description", node.description.as_str())
            .build();
        pipewiresink.set_property("stream-properties", &stream_props);

        pipeline
            .add_many([appsrc.upcast_ref(), &videoconvert, &pipewiresink])
            .map_err(|e| {
                BackendError::InitializationFailed(format!("Failed to add elements: {}", e))
            })?;

        gstreamer::Element::link_many([appsrc.upcast_ref(), &videoconvert, &pipewiresink])
            .map_err(|e| {
                BackendError::InitializationFailed(format!("Failed to link elements: {}", e))
            })?;

        Ok(Self {
            pipeline,
            appsrc,
            width,
            height,
            pushed: 0,
        })
    }

    /// Start the pipeline
    pub fn start(&self) -> BackendResult<()> {
        debug!("Starting virtual camera pipeline");

        self.pipeline
            .set_state(gstreamer::State::Playing)
            .map_err(|e| {
                BackendError::InitializationFailed(format!("Failed to start pipeline: {}", e))
            })?;

        let (result, _state, _pending) = self
            .pipeline
            .state(gstreamer::ClockTime::from_seconds(START_TIMEOUT_SECS));
        if result.is_err() {
            return Err(BackendError::InitializationFailed(
                "Pipeline failed to reach Playing state".into(),
            ));
        }

        info!("Virtual camera pipeline started");
        Ok(())
    }

    /// Send EOS and shut the pipeline down
    pub fn stop(&self) -> BackendResult<()> {
        debug!("Stopping virtual camera pipeline");

        self.appsrc
            .end_of_stream()
            .map_err(|e| BackendError::Other(format!("Failed to send EOS: {}", e)))?;

        self.pipeline
            .set_state(gstreamer::State::Null)
            .map_err(|e| BackendError::Other(format!("Failed to stop pipeline: {}", e)))?;

        info!(pushed = self.pushed, "Virtual camera pipeline stopped");
        Ok(())
    }

    /// Output dimensions this pipeline was negotiated for
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Push one packed RGB frame
    pub fn push_frame(&mut self, rgb: Vec<u8>, width: u32, height: u32) -> BackendResult<()> {
        if (width, height) != (self.width, self.height) {
            return Err(BackendError::FormatNotSupported(format!(
                "Frame size {}x{} doesn't match pipeline {}x{}",
                width, height, self.width, self.height
            )));
        }

        let expected_size = width as usize * height as usize * 3;
        if rgb.len() != expected_size {
            return Err(BackendError::FormatNotSupported(format!(
                "Frame data size {} doesn't match expected {} for {}x{} RGB",
                rgb.len(),
                expected_size,
                width,
                height
            )));
        }

        let padded = pad_rows(rgb, width as usize, height as usize);
        let buffer = gstreamer::Buffer::from_mut_slice(padded);

        match self.appsrc.push_buffer(buffer) {
            Ok(_) => {
                self.pushed += 1;
                if self.pushed % FRAME_LOG_INTERVAL == 0 {
                    debug!(frame = self.pushed, "Virtual camera frames pushed");
                }
                Ok(())
            }
            Err(e) => {
                warn!(?e, "Failed to push frame to virtual camera");
                Err(BackendError::Other(format!("Failed to push frame: {:?}", e)))
            }
        }
    }
}

/// GStreamer expects RGB rows aligned to 4 bytes
fn pad_rows(rgb: Vec<u8>, width: usize, height: usize) -> Vec<u8> {
    let row = width * 3;
    let stride = (row + 3) & !3;
    if stride == row {
        return rgb;
    }
    let mut padded = vec![0u8; stride * height];
    for (src, dst) in rgb.chunks_exact(row).zip(padded.chunks_exact_mut(stride)) {
        dst[..row].copy_from_slice(src);
    }
    padded
}

fn make_element(factory: &str, name: &str) -> BackendResult<gstreamer::Element> {
    gstreamer::ElementFactory::make(factory)
        .name(name)
        .build()
        .map_err(|e| {
            BackendError::InitializationFailed(format!("Failed to create {}: {}", factory, e))
        })
}

impl Drop for VirtualCameraPipeline {
    fn drop(&mut self) {
        debug!("Dropping virtual camera pipeline");
        if let Err(e) = self.pipeline.set_state(gstreamer::State::Null) {
            error!(?e, "Failed to set pipeline to Null on drop");
        }
    }
}
