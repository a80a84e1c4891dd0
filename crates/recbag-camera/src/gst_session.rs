// recbag-camera/src/gst_session.rs
// GStreamer backend: color + infrared (+ optional depth) sources are
// tee'd into appsinks for the controller and into a matroska file.

use crate::{CameraError, CaptureSession, FrameBacking, FrameBundle, Result, StreamParams, VideoFrame};
use gst::prelude::*;
use log::{debug, info, warn};
use std::path::Path;
use std::time::Duration;

const EOS_TIMEOUT: gst::ClockTime = gst::ClockTime::from_seconds(5);

struct Running {
    pipeline: gst::Pipeline,
    color: gst_app::AppSink,
    infrared: Option<gst_app::AppSink>,
    depth: Option<gst_app::AppSink>,
}

/// Capture session backed by a `gst::Pipeline` rebuilt for every recording.
#[derive(Default)]
pub struct GstCaptureSession {
    params: Option<StreamParams>,
    running: Option<Running>,
}

impl GstCaptureSession {
    pub fn new() -> Result<Self> {
        gst::init().map_err(CameraError::GstInit)?;
        Ok(Self::default())
    }

    fn branch(source: &str, name: &str, format: &str, p: &StreamParams) -> String {
        format!(
            "{source} ! videoconvert ! video/x-raw,format={format},width={w},height={h},framerate={f}/1 \
             ! tee name={name}_tee \
             {name}_tee. ! queue max-size-buffers={q} ! appsink name={name} sync=false max-buffers={q} \
             {name}_tee. ! queue max-size-buffers={q} ! videoconvert ! x264enc tune=zerolatency speed-preset=ultrafast \
             ! h264parse ! mux. ",
            w = p.width,
            h = p.height,
            f = p.fps,
            q = p.queue_capacity,
        )
    }

    fn pipeline_description(p: &StreamParams, output: &Path) -> String {
        let mut desc = Self::branch(&p.color_source, "color", "RGB", p);
        if let Some(ir) = &p.infrared_source {
            desc.push_str(&Self::branch(ir, "infrared", "GRAY8", p));
        }
        if let Some(depth) = &p.depth_source {
            desc.push_str(&Self::branch(depth, "depth", "GRAY16_LE", p));
        }
        desc.push_str(&format!(
            "matroskamux name=mux ! filesink location=\"{}\"",
            output.display()
        ));
        desc
    }

    fn appsink(pipeline: &gst::Pipeline, name: &'static str) -> Result<gst_app::AppSink> {
        pipeline
            .by_name(name)
            .ok_or(CameraError::AppSinkNotFound(name))?
            .downcast::<gst_app::AppSink>()
            .map_err(|_| CameraError::AppSinkDowncastFailed)
    }

    /// Convert a `gst::Sample` into our [`VideoFrame`] wrapper.
    fn sample_to_frame(sample: gst::Sample, bytes_per_px: u32) -> Result<VideoFrame> {
        let buffer = sample.buffer().ok_or(CameraError::MissingBuffer)?;
        let caps   = sample.caps().ok_or(CameraError::MissingCaps)?;
        let s      = caps.structure(0).ok_or(CameraError::MissingStructure)?;
        let width  = s.get::<i32>("width").map_err(|e| CameraError::FieldError(e.to_string()))? as u32;
        let height = s.get::<i32>("height").map_err(|e| CameraError::FieldError(e.to_string()))? as u32;
        let stride = width * bytes_per_px;

        let pts = buffer
            .pts()
            .map(|t| Duration::from_nanos(t.nseconds()))
            .unwrap_or(Duration::ZERO);

        if buffer.n_memory() > 0 {
            let mem = buffer.peek_memory(0);
            if let Some(dmabuf) = mem.downcast_memory_ref::<gst_allocators::DmaBufMemory>() {
                let fd = dmabuf.fd();
                return Ok(VideoFrame {
                    backing: FrameBacking::DmaBuf { fd, sample: sample.clone() },
                    width, height, stride, pts,
                });
            }
        }

        let map = buffer.map_readable().map_err(|e| CameraError::BufferMap(e.to_string()))?;
        let bytes = map.as_slice().to_vec();
        drop(map);

        Ok(VideoFrame {
            backing: FrameBacking::Cpu(bytes),
            width, height, stride, pts,
        })
    }

    /// Secondary components get two frame intervals to show up after color.
    fn try_component(sink: Option<&gst_app::AppSink>, wait: Duration, bytes_per_px: u32) -> Result<Option<VideoFrame>> {
        let Some(sink) = sink else { return Ok(None) };
        match sink.try_pull_sample(gst::ClockTime::from_nseconds(wait.as_nanos() as u64)) {
            Some(sample) => Self::sample_to_frame(sample, bytes_per_px).map(Some),
            None => Ok(None),
        }
    }
}

impl CaptureSession for GstCaptureSession {
    fn configure(&mut self, params: &StreamParams) -> Result<()> {
        params.validate()?;
        self.params = Some(params.clone());
        Ok(())
    }

    fn start(&mut self, output: &Path) -> Result<()> {
        let params = self.params.as_ref().ok_or(CameraError::NotConfigured)?;
        if self.running.is_some() {
            return Err(CameraError::Start("session already running".into()));
        }

        let desc = Self::pipeline_description(params, output);
        debug!("pipeline: {desc}");

        let pipeline = gst::parse::launch(&desc)
            .map_err(CameraError::ParsePipeline)?
            .downcast::<gst::Pipeline>()
            .map_err(|_| CameraError::NotPipeline)?;

        let color = Self::appsink(&pipeline, "color")?;
        let infrared = match params.infrared_source {
            Some(_) => Some(Self::appsink(&pipeline, "infrared")?),
            None => None,
        };
        let depth = match params.depth_source {
            Some(_) => Some(Self::appsink(&pipeline, "depth")?),
            None => None,
        };

        if let Err(e) = pipeline.set_state(gst::State::Playing) {
            // elements that reached READY/PAUSED hold the device and the file
            let _ = pipeline.set_state(gst::State::Null);
            return Err(CameraError::StateChange(e));
        }

        info!("recording to {}", output.display());
        self.running = Some(Running { pipeline, color, infrared, depth });
        Ok(())
    }

    fn wait_for_frame_bundle(&mut self) -> Result<FrameBundle> {
        let running = self.running.as_ref().ok_or(CameraError::NotStarted)?;
        let wait = self
            .params
            .as_ref()
            .map(|p| p.frame_interval() * 2)
            .unwrap_or(Duration::from_millis(66));

        // blocking: a stalled device stalls this call
        let sample = running.color.pull_sample().map_err(|e| {
            if running.color.is_eos() {
                CameraError::EndOfStream
            } else {
                CameraError::Pull(e.to_string())
            }
        })?;
        let color = Self::sample_to_frame(sample, 3)?;

        Ok(FrameBundle {
            color: Some(color),
            infrared: Self::try_component(running.infrared.as_ref(), wait, 1)?,
            depth: Self::try_component(running.depth.as_ref(), wait, 2)?,
        })
    }

    fn stop(&mut self) -> Result<()> {
        let Some(running) = self.running.take() else {
            return Ok(());
        };

        // EOS lets matroskamux write its index before teardown
        if running.pipeline.send_event(gst::event::Eos::new()) {
            if let Some(bus) = running.pipeline.bus() {
                match bus.timed_pop_filtered(EOS_TIMEOUT, &[gst::MessageType::Eos, gst::MessageType::Error]) {
                    Some(msg) => {
                        if let gst::MessageView::Error(err) = msg.view() {
                            warn!("pipeline error while stopping: {}", err.error());
                        }
                    }
                    None => warn!("no EOS within {EOS_TIMEOUT}; recording may be truncated"),
                }
            }
        }

        running
            .pipeline
            .set_state(gst::State::Null)
            .map_err(|e| CameraError::Stop(e.to_string()))?;
        Ok(())
    }
}

impl Drop for GstCaptureSession {
    fn drop(&mut self) {
        if let Some(running) = self.running.take() {
            let _ = running.pipeline.set_state(gst::State::Null);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pipeline_tees_every_configured_source_into_the_muxer() {
        let params = StreamParams::default();
        let desc = GstCaptureSession::pipeline_description(&params, Path::new("/tmp/recorded_x.mkv"));
        assert!(desc.contains("appsink name=color"));
        assert!(desc.contains("appsink name=infrared"));
        assert!(!desc.contains("appsink name=depth"));
        assert!(desc.contains("format=GRAY8"));
        assert!(desc.contains("max-buffers=50"));
        assert!(desc.ends_with("filesink location=\"/tmp/recorded_x.mkv\""));
    }

    #[test]
    fn stop_without_start_is_harmless() {
        let mut session = GstCaptureSession::default();
        assert!(session.stop().is_ok());
    }

    #[test]
    fn start_requires_configure() {
        let mut session = GstCaptureSession::default();
        assert!(matches!(
            session.start(Path::new("/tmp/never.mkv")),
            Err(CameraError::NotConfigured)
        ));
    }
}
