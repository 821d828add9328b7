//! Memory-mapped streaming capture from a single video device into a file.
//!
//! A capture run opens the device, checks that it supports capture and
//! streaming I/O, maps a fixed pool of kernel buffers, and cycles them
//! through queue/dequeue until the requested number of frames has been
//! written. Teardown (stream off, unmap, close output, close device) runs on
//! every exit path.

pub mod capture;
pub mod config;
pub mod error;
pub mod pool;
pub mod task;
pub mod videoin;

pub use capture::{
    CaptureReport, CaptureSession, CaptureState, FrameRecord, capture, capture_to_file, negotiate,
    write_frame,
};
pub use config::{CaptureConfig, DEFAULT_CONFIG_FILE, StreamDescriptor, StreamList};
pub use error::{ErrorClass, VideoError};
pub use pool::{BufferPool, BufferState};
pub use task::CaptureTask;
pub use videoin::{
    BufferInfo, Capabilities, CaptureDevice, CropCapabilities, DequeuedBuffer, FormatDescription,
    FormatInfo, QueueToken, Rect, StreamParameters, Timecode, WaitOutcome, fourcc_string,
};

#[cfg(feature = "v4l2")]
pub use capture::run_stream;

#[cfg(feature = "v4l2")]
pub use videoin::v4l2::V4l2Device;
