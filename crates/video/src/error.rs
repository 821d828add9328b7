use std::{fmt, io, time::Duration};

/// Broad failure category of a capture run, used to pick the process exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    Config,
    Device,
    Buffer,
    Timeout,
    Io,
    Internal,
}

impl ErrorClass {
    pub fn exit_code(&self) -> i32 {
        match self {
            ErrorClass::Internal => 1,
            ErrorClass::Config => 2,
            ErrorClass::Device => 3,
            ErrorClass::Buffer => 4,
            ErrorClass::Timeout => 5,
            ErrorClass::Io => 6,
        }
    }
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorClass::Config => write!(f, "config"),
            ErrorClass::Device => write!(f, "device"),
            ErrorClass::Buffer => write!(f, "buffer"),
            ErrorClass::Timeout => write!(f, "timeout"),
            ErrorClass::Io => write!(f, "io"),
            ErrorClass::Internal => write!(f, "internal"),
        }
    }
}

#[derive(Debug)]
pub enum VideoError {
    /// Malformed or missing stream descriptor.
    Config(String),
    /// The capture device could not be opened.
    Open { path: String, source: io::Error },
    /// A device request failed outside of the streaming phase.
    Ioctl { op: &'static str, source: io::Error },
    /// The device lacks a required capability, or the path is not a device.
    Unsupported(String),
    /// The device granted fewer buffers than the pool needs.
    InsufficientBuffers { requested: u32, granted: u32 },
    /// Mapping the buffer at `index` into process memory failed.
    Map { index: u32, source: io::Error },
    /// No frame became ready within the wait bound.
    Timeout(Duration),
    /// A wait/dequeue/queue request failed while streaming.
    Stream { op: &'static str, source: io::Error },
    /// The device handed back a buffer the pool cannot accept.
    InvalidBuffer { index: u32, reason: String },
    /// The output sink accepted fewer bytes than the frame carried.
    ShortWrite {
        written: usize,
        expected: usize,
        source: Option<io::Error>,
    },
    /// Opening, flushing or closing the output sink failed.
    Output { op: &'static str, source: io::Error },
    /// The capture worker died before reporting a result.
    Worker(String),
}

impl VideoError {
    pub fn class(&self) -> ErrorClass {
        match self {
            VideoError::Config(_) => ErrorClass::Config,
            VideoError::Open { .. } | VideoError::Ioctl { .. } | VideoError::Unsupported(_) => {
                ErrorClass::Device
            }
            VideoError::InsufficientBuffers { .. } | VideoError::Map { .. } => ErrorClass::Buffer,
            VideoError::Timeout(_) => ErrorClass::Timeout,
            VideoError::Stream { .. }
            | VideoError::InvalidBuffer { .. }
            | VideoError::ShortWrite { .. }
            | VideoError::Output { .. } => ErrorClass::Io,
            VideoError::Worker(_) => ErrorClass::Internal,
        }
    }

    /// Underlying OS status code, if the failure came from a system call.
    pub fn raw_os_error(&self) -> Option<i32> {
        match self {
            VideoError::Open { source, .. }
            | VideoError::Ioctl { source, .. }
            | VideoError::Map { source, .. }
            | VideoError::Stream { source, .. }
            | VideoError::Output { source, .. } => source.raw_os_error(),
            VideoError::ShortWrite {
                source: Some(source),
                ..
            } => source.raw_os_error(),
            _ => None,
        }
    }

    /// Re-files a device request failure as a streaming I/O failure.
    ///
    /// Queue and dequeue requests issued by the capture loop are I/O errors
    /// for the run, even though the device reports them as ioctl failures.
    pub fn into_stream_error(self) -> Self {
        match self {
            VideoError::Ioctl { op, source } => VideoError::Stream { op, source },
            other => other,
        }
    }
}

fn status(source: &io::Error) -> String {
    match source.raw_os_error() {
        Some(code) => format!("{source} (-{code})"),
        None => source.to_string(),
    }
}

impl fmt::Display for VideoError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VideoError::Config(msg) => write!(f, "config error: {msg}"),
            VideoError::Open { path, source } => {
                write!(f, "failed to open video device \"{path}\": {}", status(source))
            }
            VideoError::Ioctl { op, source } => write!(f, "ioctl[{op}] failed: {}", status(source)),
            VideoError::Unsupported(msg) => write!(f, "unsupported device: {msg}"),
            VideoError::InsufficientBuffers { requested, granted } => write!(
                f,
                "insufficient buffer memory: requested {requested}, granted {granted}"
            ),
            VideoError::Map { index, source } => {
                write!(f, "mmap of buffer {index} failed: {}", status(source))
            }
            VideoError::Timeout(timeout) => {
                write!(f, "no frame ready within {} ms", timeout.as_millis())
            }
            VideoError::Stream { op, source } => {
                write!(f, "stream error in {op}: {}", status(source))
            }
            VideoError::InvalidBuffer { index, reason } => {
                write!(f, "invalid buffer {index}: {reason}")
            }
            VideoError::ShortWrite {
                written,
                expected,
                source,
            } => match source {
                Some(source) => write!(f, "short write ({written}/{expected}): {}", status(source)),
                None => write!(f, "short write ({written}/{expected})"),
            },
            VideoError::Output { op, source } => {
                write!(f, "output {op} failed: {}", status(source))
            }
            VideoError::Worker(msg) => write!(f, "capture worker error: {msg}"),
        }
    }
}

impl std::error::Error for VideoError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            VideoError::Open { source, .. }
            | VideoError::Ioctl { source, .. }
            | VideoError::Map { source, .. }
            | VideoError::Stream { source, .. }
            | VideoError::Output { source, .. } => Some(source),
            VideoError::ShortWrite {
                source: Some(source),
                ..
            } => Some(source),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for VideoError {
    fn from(err: serde_json::Error) -> Self {
        VideoError::Config(err.to_string())
    }
}

impl From<tokio::task::JoinError> for VideoError {
    fn from(err: tokio::task::JoinError) -> Self {
        VideoError::Worker(err.to_string())
    }
}
