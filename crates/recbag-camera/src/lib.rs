// recbag-camera/src/lib.rs
// ============================================================
// Capture-session layer for the recbag button recorder
// Wraps a depth-camera pipeline behind a small blocking API so
// the controller can start/stop a recording and drain frame
// bundles on a worker thread without knowing the backend.
// ------------------------------------------------------------
// Public API:
//   * CaptureSession – configure / start / pull / stop
//   * spawn_pull()   – one blocking pull on a worker thread
//   * GstCaptureSession (feature `gst`) – GStreamer backend
// ============================================================

//! recbag – camera capture layer
//!
//! The recorder core treats the camera as an opaque capture session:
//! it is configured once per recording, started against an output
//! path, drained one [`FrameBundle`] at a time and stopped again.
//! The backend owns the container it writes; the core only looks at
//! which components of each bundle are present.

use serde::{Deserialize, Serialize};
#[cfg(feature = "gst")]
use std::os::unix::prelude::RawFd;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

mod worker;
pub use worker::{spawn_pull, PendingPull};

#[cfg(feature = "gst")]
mod gst_session;
#[cfg(feature = "gst")]
pub use gst_session::GstCaptureSession;

#[derive(Error, Debug)]
pub enum CameraError {
    #[error("capture session used before configure()")]
    NotConfigured,
    #[error("capture session is not started")]
    NotStarted,
    #[error("invalid stream parameters: {0}")]
    InvalidParams(String),
    #[error("device failed to start: {0}")]
    Start(String),
    #[error("device failed to stop: {0}")]
    Stop(String),
    #[error("frame pull failed: {0}")]
    Pull(String),
    #[error("stream reached end of stream")]
    EndOfStream,
    #[error("failed to spawn frame worker: {0}")]
    WorkerSpawn(#[source] std::io::Error),
    #[error("frame worker panicked; capture session lost")]
    WorkerPanicked,
    #[cfg(feature = "gst")]
    #[error("GStreamer init failed: {0}")]
    GstInit(#[source] gst::glib::Error),
    #[cfg(feature = "gst")]
    #[error("Failed to parse pipeline: {0}")]
    ParsePipeline(#[source] gst::glib::Error),
    #[cfg(feature = "gst")]
    #[error("Pipeline is not a gst::Pipeline")]
    NotPipeline,
    #[cfg(feature = "gst")]
    #[error("AppSink element `{0}` not found")]
    AppSinkNotFound(&'static str),
    #[cfg(feature = "gst")]
    #[error("AppSink element downcast failed")]
    AppSinkDowncastFailed,
    #[cfg(feature = "gst")]
    #[error("Failed to change pipeline state: {0}")]
    StateChange(#[source] gst::StateChangeError),
    #[cfg(feature = "gst")]
    #[error("Sample has no buffer")]
    MissingBuffer,
    #[cfg(feature = "gst")]
    #[error("Sample has no caps")]
    MissingCaps,
    #[cfg(feature = "gst")]
    #[error("Caps missing struct")]
    MissingStructure,
    #[cfg(feature = "gst")]
    #[error("Failed to get field value: {0}")]
    FieldError(String),
    #[cfg(feature = "gst")]
    #[error("Buffer map failed: {0}")]
    BufferMap(String),
}

pub type Result<T> = std::result::Result<T, CameraError>;

/// Stream layout requested from the device.
///
/// Sources are GStreamer source descriptions (the D400 series exposes
/// color, infrared and depth as separate UVC nodes).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamParams {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub color_source: String,
    pub infrared_source: Option<String>,
    pub depth_source: Option<String>,
    /// Frames buffered between the device and the consumer.
    pub queue_capacity: u32,
}

impl Default for StreamParams {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            fps: 30,
            color_source: "v4l2src device=/dev/video4".into(),
            infrared_source: Some("v4l2src device=/dev/video2".into()),
            depth_source: None,
            queue_capacity: 50,
        }
    }
}

impl StreamParams {
    pub fn validate(&self) -> Result<()> {
        if self.width == 0 || self.height == 0 {
            return Err(CameraError::InvalidParams(format!(
                "frame size {}x{}",
                self.width, self.height
            )));
        }
        if self.fps == 0 {
            return Err(CameraError::InvalidParams("fps must be non-zero".into()));
        }
        if self.queue_capacity == 0 {
            return Err(CameraError::InvalidParams(
                "queue_capacity must be non-zero".into(),
            ));
        }
        Ok(())
    }

    /// Nominal time between two frames.
    pub fn frame_interval(&self) -> Duration {
        Duration::from_secs(1) / self.fps.max(1)
    }
}

/// Where the pixels of a frame live.
///
/// * `DmaBuf`      – zero‑copy path; the fd is valid while `sample` lives
/// * `Cpu(bytes)`  – mapped heap copy
#[derive(Debug)]
pub enum FrameBacking {
    #[cfg(feature = "gst")]
    DmaBuf { fd: RawFd, sample: gst::Sample },
    Cpu(Vec<u8>),
}

/// One component (color, infrared or depth) of a frame bundle.
#[derive(Debug)]
pub struct VideoFrame {
    pub backing: FrameBacking,
    pub width: u32,
    pub height: u32,
    pub stride: u32,
    pub pts: Duration,
}

/// One synchronized set of sensor outputs for a single capture instant.
#[derive(Debug, Default)]
pub struct FrameBundle {
    pub color: Option<VideoFrame>,
    pub infrared: Option<VideoFrame>,
    pub depth: Option<VideoFrame>,
}

impl FrameBundle {
    pub fn has_color(&self) -> bool {
        self.color.is_some()
    }

    pub fn has_infrared(&self) -> bool {
        self.infrared.is_some()
    }

    /// A bundle counts as a recorded frame only when both color and
    /// infrared are present. Depth is optional.
    pub fn is_complete(&self) -> bool {
        self.has_color() && self.has_infrared()
    }
}

/// A camera that can record to a file while handing out frame bundles.
///
/// Implementations must tolerate `stop()` on a session that was never
/// started, or whose `start()` failed halfway.
pub trait CaptureSession {
    fn configure(&mut self, params: &StreamParams) -> Result<()>;

    fn start(&mut self, output: &Path) -> Result<()>;

    /// Block until the next bundle is available. No timeout is applied.
    fn wait_for_frame_bundle(&mut self) -> Result<FrameBundle>;

    fn stop(&mut self) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame() -> VideoFrame {
        VideoFrame {
            backing: FrameBacking::Cpu(vec![0u8; 16]),
            width: 4,
            height: 4,
            stride: 4,
            pts: Duration::ZERO,
        }
    }

    #[test]
    fn bundle_needs_color_and_infrared() {
        let mut bundle = FrameBundle::default();
        assert!(!bundle.is_complete());

        bundle.color = Some(frame());
        assert!(bundle.has_color());
        assert!(!bundle.is_complete());

        bundle.infrared = Some(frame());
        assert!(bundle.is_complete());
    }

    #[test]
    fn depth_alone_is_not_a_frame() {
        let bundle = FrameBundle {
            depth: Some(frame()),
            ..Default::default()
        };
        assert!(!bundle.is_complete());
    }

    #[test]
    fn default_params_match_recorder_layout() {
        let p = StreamParams::default();
        assert_eq!((p.width, p.height, p.fps), (1280, 720, 30));
        assert_eq!(p.queue_capacity, 50);
        assert!(p.validate().is_ok());
        assert_eq!(p.frame_interval(), Duration::from_secs(1) / 30);
    }

    #[test]
    fn zero_fps_is_rejected() {
        let p = StreamParams {
            fps: 0,
            ..Default::default()
        };
        assert!(matches!(p.validate(), Err(CameraError::InvalidParams(_))));
    }
}
