use std::{io, time::Duration};
use video::{ErrorClass, VideoError};

fn ioctl(op: &'static str, errno: i32) -> VideoError {
    VideoError::Ioctl {
        op,
        source: io::Error::from_raw_os_error(errno),
    }
}

#[test]
fn test_classes_and_exit_codes() {
    let cases = [
        (VideoError::Config("bad".to_string()), ErrorClass::Config, 2),
        (ioctl("VIDIOC_QUERYCAP", 25), ErrorClass::Device, 3),
        (VideoError::Unsupported("no capture".to_string()), ErrorClass::Device, 3),
        (
            VideoError::InsufficientBuffers {
                requested: 4,
                granted: 2,
            },
            ErrorClass::Buffer,
            4,
        ),
        (VideoError::Timeout(Duration::from_secs(2)), ErrorClass::Timeout, 5),
        (
            VideoError::ShortWrite {
                written: 1,
                expected: 2,
                source: None,
            },
            ErrorClass::Io,
            6,
        ),
        (VideoError::Worker("panicked".to_string()), ErrorClass::Internal, 1),
    ];

    for (error, class, code) in cases {
        assert_eq!(error.class(), class, "{error}");
        assert_eq!(error.class().exit_code(), code, "{error}");
    }
}

#[test]
fn test_display_names_failing_operation_and_status() {
    let err = ioctl("VIDIOC_REQBUFS", 12);
    let text = err.to_string();

    assert!(text.contains("VIDIOC_REQBUFS"), "{text}");
    assert!(text.contains("(-12)"), "{text}");
    assert_eq!(err.raw_os_error(), Some(12));
}

#[test]
fn test_open_error_keeps_kind() {
    let err = VideoError::Open {
        path: "/dev/video9".to_string(),
        source: io::Error::from(io::ErrorKind::PermissionDenied),
    };

    assert_eq!(err.class(), ErrorClass::Device);
    assert!(err.to_string().contains("/dev/video9"));
    let source = std::error::Error::source(&err).unwrap();
    assert_eq!(
        source.downcast_ref::<io::Error>().unwrap().kind(),
        io::ErrorKind::PermissionDenied
    );
}

#[test]
fn test_into_stream_error_reclassifies_ioctl_only() {
    let err = ioctl("VIDIOC_DQBUF", 5).into_stream_error();
    match &err {
        VideoError::Stream { op, .. } => assert_eq!(*op, "VIDIOC_DQBUF"),
        other => panic!("Expected VideoError::Stream, got {:?}", other),
    }
    assert_eq!(err.class(), ErrorClass::Io);

    let timeout = VideoError::Timeout(Duration::from_secs(2)).into_stream_error();
    assert_eq!(timeout.class(), ErrorClass::Timeout);
}

#[test]
fn test_from_json_error() {
    let json_err = serde_json::from_str::<u32>("nope").unwrap_err();
    let err: VideoError = json_err.into();

    assert_eq!(err.class(), ErrorClass::Config);
}
