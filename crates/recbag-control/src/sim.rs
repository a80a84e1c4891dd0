//! Deterministic doubles for the clock and the digital I/O.
//!
//! Time only moves when the controller sleeps, and the button level is a
//! script indexed by simulated time, so idle-phase behavior replays the
//! same way on every run.

use crate::{clock::Clock, config::Pins, io::DigitalIo};
use chrono::{DateTime, Local};
use crossbeam_channel::{bounded, Receiver, Sender};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

/// Clock that advances only through `sleep`/`advance`. Clones share time.
#[derive(Debug, Clone)]
pub struct SimClock {
    start: Instant,
    wall: DateTime<Local>,
    elapsed_ns: Arc<AtomicU64>,
}

impl SimClock {
    pub fn new() -> Self {
        Self::starting_at(Local::now())
    }

    pub fn starting_at(wall: DateTime<Local>) -> Self {
        Self {
            start: Instant::now(),
            wall,
            elapsed_ns: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn elapsed(&self) -> Duration {
        Duration::from_nanos(self.elapsed_ns.load(Ordering::Acquire))
    }

    pub fn advance(&self, d: Duration) {
        self.elapsed_ns.fetch_add(d.as_nanos() as u64, Ordering::AcqRel);
    }
}

impl Default for SimClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SimClock {
    fn now(&self) -> Instant {
        self.start + self.elapsed()
    }

    fn local_now(&self) -> DateTime<Local> {
        let offset = chrono::Duration::from_std(self.elapsed()).unwrap_or_else(|_| chrono::Duration::zero());
        self.wall + offset
    }

    fn sleep(&self, d: Duration) {
        self.advance(d);
        // let a worker thread make progress while the caller spins
        thread::yield_now();
    }
}

/// Button whose level follows a per-sample script on a [`SimClock`].
///
/// Sample `i` covers `[i * interval, (i + 1) * interval)`; past the end the
/// button reads released. [`ScriptedButton::press`] overrides the script
/// from any thread, e.g. from a fake camera in the middle of a pull.
#[derive(Debug, Clone)]
pub struct ScriptedButton {
    clock: SimClock,
    levels: Arc<Vec<bool>>,
    interval: Duration,
    held: Arc<AtomicBool>,
    seen_tx: Sender<()>,
    seen_rx: Receiver<()>,
}

impl ScriptedButton {
    pub fn new(clock: SimClock, levels: Vec<bool>, interval: Duration) -> Self {
        let (seen_tx, seen_rx) = bounded(1);
        Self {
            clock,
            levels: Arc::new(levels),
            interval,
            held: Arc::new(AtomicBool::new(false)),
            seen_tx,
            seen_rx,
        }
    }

    /// Build a script from `(level, samples)` runs.
    pub fn from_runs(clock: SimClock, runs: &[(bool, usize)], interval: Duration) -> Self {
        let levels = runs
            .iter()
            .flat_map(|&(level, n)| std::iter::repeat(level).take(n))
            .collect();
        Self::new(clock, levels, interval)
    }

    pub fn level(&self) -> bool {
        if self.held.load(Ordering::Acquire) {
            return true;
        }
        let idx = self.clock.elapsed().as_nanos() / self.interval.as_nanos().max(1);
        self.levels.get(idx as usize).copied().unwrap_or(false)
    }

    /// Sample the level the way the controller does; a read that observes
    /// a forced press is reported to [`ScriptedButton::press_and_wait_seen`].
    pub fn read(&self) -> bool {
        let level = self.level();
        if level && self.held.load(Ordering::Acquire) {
            let _ = self.seen_tx.try_send(());
        }
        level
    }

    pub fn press(&self) {
        self.held.store(true, Ordering::Release);
    }

    pub fn release(&self) {
        self.held.store(false, Ordering::Release);
    }

    /// Force the button down and block until someone has read it pressed.
    /// Returns false if nobody looked within `timeout`.
    pub fn press_and_wait_seen(&self, timeout: Duration) -> bool {
        while self.seen_rx.try_recv().is_ok() {}
        self.press();
        self.seen_rx.recv_timeout(timeout).is_ok()
    }
}

/// [`DigitalIo`] over a scripted button, logging every output write.
#[derive(Debug, Clone)]
pub struct SimIo {
    pins: Pins,
    button: ScriptedButton,
    writes: Arc<Mutex<Vec<(u8, bool)>>>,
    closed: Arc<AtomicBool>,
}

impl SimIo {
    pub fn new(pins: Pins, button: ScriptedButton) -> Self {
        Self {
            pins,
            button,
            writes: Arc::new(Mutex::new(Vec::new())),
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn button(&self) -> &ScriptedButton {
        &self.button
    }

    /// Every level written to the LED pin, in order.
    pub fn led_history(&self) -> Vec<bool> {
        self.writes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|(pin, _)| *pin == self.pins.led)
            .map(|&(_, level)| level)
            .collect()
    }

    pub fn led_level(&self) -> bool {
        self.led_history().last().copied().unwrap_or(false)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

impl DigitalIo for SimIo {
    fn read(&mut self, pin: u8) -> bool {
        pin == self.pins.button && self.button.read()
    }

    fn write(&mut self, pin: u8, level: bool) {
        self.writes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((pin, level));
    }

    fn close(&mut self) {
        self.closed.store(true, Ordering::Release);
    }
}
