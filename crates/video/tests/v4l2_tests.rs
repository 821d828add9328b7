#![cfg(feature = "v4l2")]

use {
    std::{fs, io},
    video::{
        CaptureConfig, ErrorClass, FrameRecord, StreamDescriptor, V4l2Device, VideoError,
        run_stream,
    },
};

#[test]
fn test_open_missing_device() {
    let err = V4l2Device::open("/dev/video-does-not-exist").unwrap_err();

    match &err {
        VideoError::Open { path, source } => {
            assert_eq!(path, "/dev/video-does-not-exist");
            assert_eq!(source.kind(), io::ErrorKind::NotFound);
        }
        other => panic!("Expected VideoError::Open, got {:?}", other),
    }
    assert_eq!(err.class(), ErrorClass::Device);
}

#[test]
fn test_open_regular_file_is_not_a_device() {
    let path = std::env::temp_dir().join(format!("video-v4l2-test-{}.bin", std::process::id()));
    fs::write(&path, b"not a device").unwrap();

    let err = V4l2Device::open(&path.to_string_lossy()).unwrap_err();

    assert!(matches!(err, VideoError::Unsupported(_)));
    assert_eq!(err.class().exit_code(), 3);

    fs::remove_file(&path).ok();
}

#[test]
fn test_run_stream_with_missing_device_creates_no_output() {
    let output = std::env::temp_dir().join(format!("video-v4l2-out-{}.raw", std::process::id()));
    let descriptor =
        StreamDescriptor::new("/dev/video-does-not-exist", output.to_string_lossy(), 1);

    let err = run_stream(&descriptor, &CaptureConfig::default(), &mut |_: &FrameRecord| {})
        .unwrap_err();

    assert_eq!(err.class(), ErrorClass::Device);
    assert!(!output.exists());
}

#[test]
fn test_run_stream_validates_descriptor() {
    let descriptor = StreamDescriptor::new("", "out.raw", 1);

    let err = run_stream(&descriptor, &CaptureConfig::default(), &mut |_: &FrameRecord| {})
        .unwrap_err();

    assert_eq!(err.class(), ErrorClass::Config);
}
