use chrono::{DateTime, Local};
use log::debug;
use recbag_camera::FrameBundle;
use std::path::{Path, PathBuf};

/// Lifecycle of the recorder. `Idle` has no session attached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Recording,
    Stopping,
}

/// `recorded_YYYYMMDD_HHMMSS.<ext>` under `base`.
///
/// Names have one-second resolution: two sessions started within the same
/// second get the same path.
pub fn recording_path(base: &Path, id: &DateTime<Local>, ext: &str) -> PathBuf {
    base.join(format!("recorded_{}.{}", id.format("%Y%m%d_%H%M%S"), ext))
}

/// One recording episode.
#[derive(Debug, Clone)]
pub struct Session {
    pub id: DateTime<Local>,
    pub output_path: PathBuf,
    pub frame_count: u64,
    /// Bundles pulled with color or infrared missing.
    pub skipped: u64,
    /// Worker cycles completed, counted or not.
    pub pulls: u64,
    pub state: SessionState,
}

impl Session {
    pub fn new(id: DateTime<Local>, base: &Path, ext: &str) -> Self {
        Self {
            output_path: recording_path(base, &id, ext),
            id,
            frame_count: 0,
            skipped: 0,
            pulls: 0,
            state: SessionState::Recording,
        }
    }

    /// Account for one finished pull. Only complete bundles count.
    pub fn record_bundle(&mut self, bundle: &FrameBundle) {
        self.pulls += 1;
        if bundle.is_complete() {
            self.frame_count += 1;
        } else {
            self.skipped += 1;
            debug!(
                "skipping incomplete bundle (color: {}, infrared: {})",
                bundle.has_color(),
                bundle.has_infrared()
            );
        }
    }

    /// A pull that ended in a device error still used up a cycle.
    pub fn record_failed_pull(&mut self) {
        self.pulls += 1;
    }
}

/// Why a recording ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEnd {
    StopPressed,
    Shutdown,
    DeviceError(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionReport {
    pub id: DateTime<Local>,
    pub output_path: PathBuf,
    pub frame_count: u64,
    pub skipped: u64,
    pub end: SessionEnd,
}

impl SessionReport {
    pub fn new(session: &Session, end: SessionEnd) -> Self {
        Self {
            id: session.id,
            output_path: session.output_path.clone(),
            frame_count: session.frame_count,
            skipped: session.skipped,
            end,
        }
    }
}
