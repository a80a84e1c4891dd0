// recbag-camera/src/worker.rs
use crate::{CaptureSession, CameraError, FrameBundle, Result};
use crossbeam_channel::{bounded, Receiver, TryRecvError};
use log::{error, warn};
use std::thread::{self, JoinHandle};

/// One in-flight blocking pull running on its own thread.
///
/// The capture session is moved into the worker and only handed back by
/// [`PendingPull::join`], so the caller cannot touch the session (or the
/// bundle the worker is filling) until the worker has been joined.
pub struct PendingPull<C> {
    handle: JoinHandle<(C, Result<FrameBundle>)>,
    done: Receiver<()>,
    complete: bool,
}

/// Spawn a worker that performs exactly one `wait_for_frame_bundle` call.
///
/// If the thread cannot be spawned the session is dropped with the closure.
pub fn spawn_pull<C>(mut session: C) -> Result<PendingPull<C>>
where
    C: CaptureSession + Send + 'static,
{
    let (tx, rx) = bounded(1);

    let handle = thread::Builder::new()
        .name("frame-pull".into())
        .spawn(move || {
            let bundle = session.wait_for_frame_bundle();
            // single publish; the receiver may already be gone
            let _ = tx.send(());
            (session, bundle)
        })
        .map_err(|e| {
            warn!("could not spawn frame worker: {e}");
            CameraError::WorkerSpawn(e)
        })?;

    Ok(PendingPull {
        handle,
        done: rx,
        complete: false,
    })
}

impl<C> PendingPull<C> {
    /// Non-blocking completion check. Once true it stays true.
    ///
    /// A worker that panicked drops its sender, which also reads as complete;
    /// the panic surfaces from `join`.
    pub fn is_complete(&mut self) -> bool {
        if !self.complete {
            match self.done.try_recv() {
                Ok(()) | Err(TryRecvError::Disconnected) => self.complete = true,
                Err(TryRecvError::Empty) => {}
            }
        }
        self.complete
    }

    /// Wait for the worker and take back the session with the pull result.
    pub fn join(self) -> Result<(C, Result<FrameBundle>)> {
        self.handle.join().map_err(|_| {
            error!("frame worker panicked; capture session dropped");
            CameraError::WorkerPanicked
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{FrameBacking, StreamParams, VideoFrame};
    use crossbeam_channel::Sender;
    use std::path::Path;
    use std::time::{Duration, Instant};

    struct GatedSession {
        gate: Receiver<bool>,
        pulls: u32,
    }

    fn frame() -> VideoFrame {
        VideoFrame {
            backing: FrameBacking::Cpu(vec![1, 2, 3]),
            width: 3,
            height: 1,
            stride: 3,
            pts: Duration::ZERO,
        }
    }

    impl CaptureSession for GatedSession {
        fn configure(&mut self, _params: &StreamParams) -> Result<()> {
            Ok(())
        }
        fn start(&mut self, _output: &Path) -> Result<()> {
            Ok(())
        }
        fn wait_for_frame_bundle(&mut self) -> Result<FrameBundle> {
            self.pulls += 1;
            match self.gate.recv() {
                Ok(true) => Ok(FrameBundle {
                    color: Some(frame()),
                    infrared: Some(frame()),
                    depth: None,
                }),
                Ok(false) => panic!("gate asked the worker to die"),
                Err(_) => Err(CameraError::EndOfStream),
            }
        }
        fn stop(&mut self) -> Result<()> {
            Ok(())
        }
    }

    fn gated() -> (GatedSession, Sender<bool>) {
        let (tx, rx) = bounded(1);
        (GatedSession { gate: rx, pulls: 0 }, tx)
    }

    fn wait_complete<C>(pending: &mut PendingPull<C>) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !pending.is_complete() {
            assert!(Instant::now() < deadline, "worker never completed");
            thread::sleep(Duration::from_millis(1));
        }
    }

    #[test]
    fn completion_is_only_published_after_the_pull_returns() {
        let (session, gate) = gated();
        let mut pending = spawn_pull(session).unwrap();

        thread::sleep(Duration::from_millis(20));
        assert!(!pending.is_complete());

        gate.send(true).unwrap();
        wait_complete(&mut pending);
        assert!(pending.is_complete(), "completion must stay latched");

        let (session, bundle) = pending.join().unwrap();
        assert_eq!(session.pulls, 1);
        assert!(bundle.unwrap().is_complete());
    }

    #[test]
    fn session_comes_back_for_the_next_cycle() {
        let (mut session, gate) = gated();
        for n in 1..=3 {
            gate.send(true).unwrap();
            let (back, bundle) = spawn_pull(session).unwrap().join().unwrap();
            assert!(bundle.is_ok());
            assert_eq!(back.pulls, n);
            session = back;
        }
    }

    #[test]
    fn device_error_is_returned_with_the_session() {
        let (session, gate) = gated();
        drop(gate);
        let (session, bundle) = spawn_pull(session).unwrap().join().unwrap();
        assert_eq!(session.pulls, 1);
        assert!(matches!(bundle, Err(CameraError::EndOfStream)));
    }

    #[test]
    fn panicking_worker_reads_complete_and_fails_join() {
        let (session, gate) = gated();
        let mut pending = spawn_pull(session).unwrap();
        gate.send(false).unwrap();
        wait_complete(&mut pending);
        assert!(matches!(pending.join(), Err(CameraError::WorkerPanicked)));
    }
}
