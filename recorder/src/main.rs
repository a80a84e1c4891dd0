//! Button-triggered depth-camera recorder.
//!
//!   $ recbag                      # defaults: LED on BCM 4, button on BCM 17
//!   $ recbag --config recbag.json --base-dir /mnt/usb/rec
//!
//! Short press: start/stop recording. Hold 3 s while idle: blink and exit.

use anyhow::{Context, Result};
use clap::Parser;
use log::{info, warn};
use recbag_camera::GstCaptureSession;
use recbag_control::{Controller, RecorderConfig, RppalIo, SystemClock};
use std::path::PathBuf;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct CliArgs {
    /// JSON config file; missing fields use defaults
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Recording directory (skips removable-media detection)
    #[arg(short, long)]
    base_dir: Option<PathBuf>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = CliArgs::parse();

    // 1) Configuration
    let mut config = match &args.config {
        Some(path) => RecorderConfig::load(path)?,
        None => RecorderConfig::default(),
    };
    if args.base_dir.is_some() {
        config.base_dir = args.base_dir;
    }
    let base_dir = config
        .resolve_base_dir()
        .context("no place to store recordings")?;
    info!("recordings go to {}", base_dir.display());

    // 2) Devices
    let io = RppalIo::open(config.pins).context("failed to open GPIO")?;
    let capture = GstCaptureSession::new().context("failed to initialise GStreamer")?;

    // 3) Ctrl-C raises the same flag as the long press
    let shutdown = Arc::new(AtomicBool::new(false));
    {
        let shutdown = shutdown.clone();
        ctrlc::set_handler(move || {
            warn!("interrupt received, shutting down");
            shutdown.store(true, Ordering::Release);
        })
        .context("failed to install Ctrl-C handler")?;
    }

    // 4) Run until long press or signal
    let summary = Controller::new(io, capture, SystemClock, config, base_dir, shutdown).run()?;

    for s in &summary.sessions {
        info!(
            "{} – {} frames ({} skipped), ended by {:?}",
            s.output_path.display(),
            s.frame_count,
            s.skipped,
            s.end
        );
    }
    info!("exiting after {:?}", summary.reason);
    Ok(())
}
