// Hardware test (cargo test --features gst -- --ignored) – needs a camera
#![cfg(feature = "gst")]

use recbag_camera::{CaptureSession, GstCaptureSession, StreamParams};
use serial_test::serial;

#[test]
#[ignore]
#[serial]
fn record_a_few_bundles() {
    let dir = std::env::temp_dir().join("recbag-gst-test");
    std::fs::create_dir_all(&dir).expect("tmp dir");
    let out = dir.join("recorded_test.mkv");

    let mut cam = GstCaptureSession::new().expect("gst init");
    cam.configure(&StreamParams::default()).expect("configure");
    cam.start(&out).expect("start");
    for _ in 0..10 {
        let bundle = cam.wait_for_frame_bundle().expect("bundle");
        println!("color {} infrared {}", bundle.has_color(), bundle.has_infrared());
        assert!(bundle.has_color());
    }
    cam.stop().expect("stop");
    assert!(out.exists());
}

#[test]
#[ignore]
#[serial]
fn stop_twice_is_safe() {
    let mut cam = GstCaptureSession::new().expect("gst init");
    cam.configure(&StreamParams::default()).expect("configure");
    cam.stop().expect("first stop");
    cam.stop().expect("second stop");
}

#[test]
#[ignore]
#[serial]
fn failed_start_releases_the_pipeline_for_a_retry() {
    let dir = std::env::temp_dir().join("recbag-gst-retry");
    std::fs::create_dir_all(&dir).expect("tmp dir");

    let mut cam = GstCaptureSession::new().expect("gst init");
    let broken = StreamParams {
        color_source: "v4l2src device=/dev/nonexistent".into(),
        ..StreamParams::default()
    };
    cam.configure(&broken).expect("configure");
    assert!(cam.start(&dir.join("recorded_broken.mkv")).is_err());
    cam.stop().expect("stop after failed start");

    cam.configure(&StreamParams::default()).expect("configure");
    cam.start(&dir.join("recorded_retry.mkv")).expect("retry must get the device");
    assert!(cam.wait_for_frame_bundle().expect("bundle").has_color());
    cam.stop().expect("stop");
}

#[test]
#[ignore]
#[serial]
fn dmabuf_frames_keep_their_fd_open() {
    use recbag_camera::FrameBacking;

    let out = std::env::temp_dir().join("recorded_dmabuf.mkv");
    let mut cam = GstCaptureSession::new().expect("gst init");
    cam.configure(&StreamParams::default()).expect("configure");
    cam.start(&out).expect("start");
    let bundle = cam.wait_for_frame_bundle().expect("bundle");
    if let Some(FrameBacking::DmaBuf { fd, .. }) = bundle.color.as_ref().map(|f| &f.backing) {
        let link = format!("/proc/self/fd/{fd}");
        assert!(std::fs::metadata(link).is_ok(), "fd closed while the frame is alive");
    }
    cam.stop().expect("stop");
}
