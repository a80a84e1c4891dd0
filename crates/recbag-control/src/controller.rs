use crate::{
    clock::Clock,
    config::RecorderConfig,
    hold::HoldTimer,
    io::DigitalIo,
    session::{Session, SessionEnd, SessionReport, SessionState},
    ControlError, Result,
};
use log::{debug, error, info, warn};
use recbag_camera::{spawn_pull, CaptureSession};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownReason {
    /// Button held past the threshold while idle
    LongPress,
    /// Shutdown flag raised from outside (Ctrl-C)
    Signal,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub sessions: Vec<SessionReport>,
    pub reason: ShutdownReason,
}

enum IdleExit {
    ShortPress,
    Hold,
    Interrupted,
}

/// Button-driven recorder: Idle → Recording → Stopping → Idle, until a
/// long press (or the shutdown flag) ends the program.
pub struct Controller<I, C, K> {
    io: I,
    capture: Option<C>,
    clock: K,
    config: RecorderConfig,
    shutdown: Arc<AtomicBool>,
    state: SessionState,
    base_dir: PathBuf,
}

impl<I, C, K> Controller<I, C, K>
where
    I: DigitalIo,
    C: CaptureSession + Send + 'static,
    K: Clock,
{
    pub fn new(
        io: I,
        capture: C,
        clock: K,
        config: RecorderConfig,
        base_dir: PathBuf,
        shutdown: Arc<AtomicBool>,
    ) -> Self {
        Self {
            io,
            capture: Some(capture),
            clock,
            config,
            shutdown,
            state: SessionState::Idle,
            base_dir,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Run until shutdown. Only startup failures (recording directory) are
    /// returned as errors; the LED is left low either way.
    pub fn run(mut self) -> Result<RunSummary> {
        if let Err(e) = self.prepare() {
            self.led(false);
            self.io.close();
            return Err(e);
        }

        let mut sessions = Vec::new();
        let reason = loop {
            info!("--- start program ---");
            match self.idle() {
                IdleExit::Hold => {
                    self.shutdown_sequence();
                    break ShutdownReason::LongPress;
                }
                IdleExit::Interrupted => break ShutdownReason::Signal,
                IdleExit::ShortPress => {}
            }

            sessions.push(self.record());
            if self.shutdown_requested() {
                break ShutdownReason::Signal;
            }
        };

        self.led(false);
        self.io.close();
        info!("--- stop program ---");
        Ok(RunSummary { sessions, reason })
    }

    fn prepare(&mut self) -> Result<()> {
        self.led(false);
        ensure_dir(&self.base_dir)?;

        let lamp = self.config.lamp_test();
        if !lamp.is_zero() {
            self.led(true);
            self.clock.sleep(lamp);
            self.led(false);
        }
        Ok(())
    }

    fn shutdown_requested(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }

    fn led(&mut self, on: bool) {
        let pin = self.config.pins.led;
        self.io.write(pin, on);
    }

    fn button(&mut self) -> bool {
        let pin = self.config.pins.button;
        self.io.read(pin)
    }

    /// One idle episode with its own hold timer.
    ///
    /// A press already down when the episode starts (the one that stopped
    /// the last recording) still counts toward the hold, but releasing it
    /// does not arm a new session.
    fn idle(&mut self) -> IdleExit {
        let mut timer = HoldTimer::new(self.config.hold_threshold());
        let mut carried = self.button();
        if carried {
            debug!("button still down from previous press");
        }

        loop {
            if self.shutdown_requested() {
                return IdleExit::Interrupted;
            }

            if self.button() {
                if timer.poll(true, self.clock.now()) {
                    return IdleExit::Hold;
                }
            } else if timer.sample_count() > 0 {
                if !carried {
                    return IdleExit::ShortPress;
                }
                carried = false;
                timer = HoldTimer::new(self.config.hold_threshold());
            }

            self.clock.sleep(self.config.poll_interval());
        }
    }

    /// Blink the LED as confirmation, then raise the shutdown flag.
    fn shutdown_sequence(&mut self) {
        for i in 0..self.config.blink_count {
            self.led(i % 2 == 1);
            self.clock.sleep(self.config.blink_interval());
        }
        self.led(false);
        self.shutdown.store(true, Ordering::Release);
    }

    /// Recording followed by Stopping. Never fails: device errors end the
    /// session and the controller goes back to idle.
    fn record(&mut self) -> SessionReport {
        info!("--- start recording ---");
        self.led(true);
        self.state = SessionState::Recording;

        let mut session = Session::new(self.clock.local_now(), &self.base_dir, &self.config.extension);
        if session.output_path.exists() {
            warn!("{} already exists and will be overwritten", session.output_path.display());
        }

        let end = match self.start_capture(&session.output_path) {
            Ok(()) => self.pump(&mut session).unwrap_or_else(|e| SessionEnd::DeviceError(e.to_string())),
            Err(e) => SessionEnd::DeviceError(e.to_string()),
        };
        if let SessionEnd::DeviceError(msg) = &end {
            error!("recording aborted: {msg}");
        }

        self.state = SessionState::Stopping;
        session.state = SessionState::Stopping;
        self.stop_capture();
        self.led(false);
        self.state = SessionState::Idle;
        info!("--- stop recording ---");

        let report = SessionReport::new(&session, end);
        info!(
            "{}: {} frames, {} incomplete bundles skipped",
            report.output_path.display(),
            report.frame_count,
            report.skipped
        );
        report
    }

    fn start_capture(&mut self, output: &Path) -> Result<()> {
        ensure_dir(&self.base_dir)?;
        let capture = self.capture.as_mut().ok_or(ControlError::CaptureLost)?;
        capture.configure(&self.config.stream)?;
        capture.start(output)?;
        Ok(())
    }

    /// Frame pump: one worker pull per cycle while the main thread keeps
    /// sampling the button. The worker is always joined before the cycle
    /// ends, including when a stop was requested mid-pull.
    fn pump(&mut self, session: &mut Session) -> Result<SessionEnd> {
        loop {
            if self.shutdown_requested() {
                return Ok(SessionEnd::Shutdown);
            }
            let capture = self.capture.take().ok_or(ControlError::CaptureLost)?;
            let mut pending = spawn_pull(capture)?;

            let mut stop = None;
            while !pending.is_complete() {
                if self.shutdown_requested() {
                    stop = Some(SessionEnd::Shutdown);
                    break;
                }
                // a press only counts once a frame has gone through
                if session.pulls > 0 && self.button() {
                    self.led(false);
                    stop = Some(SessionEnd::StopPressed);
                    break;
                }
                self.clock.sleep(self.config.poll_interval());
            }

            let (capture, pulled) = pending.join()?;
            self.capture = Some(capture);

            match (pulled, stop) {
                (Ok(bundle), stop) => {
                    session.record_bundle(&bundle);
                    debug!("frame {} ({} pulls)", session.frame_count, session.pulls);
                    if let Some(end) = stop {
                        return Ok(end);
                    }
                }
                (Err(e), Some(end)) => {
                    session.record_failed_pull();
                    warn!("in-flight pull failed after stop: {e}");
                    return Ok(end);
                }
                (Err(e), None) => {
                    session.record_failed_pull();
                    return Err(e.into());
                }
            }
        }
    }

    fn stop_capture(&mut self) {
        match self.capture.as_mut() {
            Some(capture) => {
                if let Err(e) = capture.stop() {
                    warn!("capture stop failed: {e}");
                }
            }
            None => warn!("no capture session to stop"),
        }
    }
}

/// Create `dir` and its parents; an existing directory is fine.
pub fn ensure_dir(dir: &Path) -> Result<()> {
    fs::create_dir_all(dir).map_err(|source| ControlError::CreateDir {
        path: dir.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn ensure_dir_is_idempotent() {
        let root = tempdir().unwrap();
        let dir = root.path().join("a").join("Realsense_rec");
        ensure_dir(&dir).unwrap();
        ensure_dir(&dir).unwrap();
        assert!(dir.is_dir());
    }

    #[test]
    fn ensure_dir_fails_under_a_file() {
        let root = tempdir().unwrap();
        let file = root.path().join("plain");
        fs::write(&file, b"x").unwrap();
        let err = ensure_dir(&file.join("sub")).unwrap_err();
        assert!(matches!(err, ControlError::CreateDir { .. }));
    }
}
