//! # recbag-control
//!
//! Control core of the button-triggered depth-camera recorder.
//!
//! A single active-high button drives everything:
//!
//! - short press while idle: start a recording session (LED on)
//! - press while recording: stop the session (LED off)
//! - hold for the configured threshold while idle: blink the LED and
//!   shut the program down
//!
//! Frames are pulled on a worker thread (see [`recbag_camera::spawn_pull`])
//! so the button keeps being sampled while the device blocks.

use std::path::PathBuf;
use thiserror::Error;

pub mod clock;
pub mod config;
pub mod controller;
pub mod hold;
pub mod io;
pub mod session;
#[cfg(any(test, feature = "sim"))]
pub mod sim;

pub use clock::{Clock, SystemClock};
pub use config::{Pins, RecorderConfig};
pub use controller::{Controller, RunSummary, ShutdownReason};
pub use hold::{ButtonState, HoldTimer};
pub use io::DigitalIo;
pub use session::{Session, SessionEnd, SessionReport, SessionState};

#[cfg(feature = "rpi")]
pub use io::RppalIo;

#[derive(Error, Debug)]
pub enum ControlError {
    #[error("failed to create recording directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("no recording medium found under {0}")]
    NoMedium(PathBuf),
    #[error("failed to read config {path}: {source}")]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config {path}: {source}")]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("GPIO error: {0}")]
    Gpio(String),
    #[error("camera error: {0}")]
    Camera(#[from] recbag_camera::CameraError),
    #[error("capture session was lost by a failed worker")]
    CaptureLost,
}

pub type Result<T> = std::result::Result<T, ControlError>;
