use chrono::{DateTime, Local};
use std::thread;
use std::time::{Duration, Instant};

/// Time source for the controller.
///
/// Monotonic time drives hold detection and polling; wall-clock time only
/// names recordings.
pub trait Clock {
    fn now(&self) -> Instant;
    fn local_now(&self) -> DateTime<Local>;
    fn sleep(&self, d: Duration);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn local_now(&self) -> DateTime<Local> {
        Local::now()
    }

    fn sleep(&self, d: Duration) {
        thread::sleep(d);
    }
}
