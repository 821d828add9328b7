use {crate::VideoError, std::time::Duration};

pub mod fake;

#[cfg(feature = "v4l2")]
pub mod v4l2;

/// What the device reports about itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Capabilities {
    pub driver: String,
    pub card: String,
    pub bus_info: String,
    pub version: u32,
    pub capabilities: u32,
    pub device_caps: u32,
    pub capture: bool,
    pub streaming: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rect {
    pub left: i32,
    pub top: i32,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CropCapabilities {
    pub bounds: Rect,
    pub default_rect: Rect,
    pub pixel_aspect: (u32, u32),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormatDescription {
    pub index: u32,
    pub fourcc: [u8; 4],
    pub description: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormatInfo {
    pub width: u32,
    pub height: u32,
    pub fourcc: [u8; 4],
    pub bytes_per_line: u32,
    pub size_image: u32,
    pub field: u32,
    pub colorspace: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamParameters {
    pub capability: u32,
    pub capture_mode: u32,
    pub time_per_frame: (u32, u32),
    pub extended_mode: u32,
    pub read_buffers: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Timecode {
    pub kind: u32,
    pub flags: u32,
    pub frames: u8,
    pub hours: u8,
    pub minutes: u8,
    pub seconds: u8,
}

/// One kernel buffer as reported before mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferInfo {
    pub index: u32,
    pub length: usize,
    pub offset: u32,
    pub bytes_used: u32,
    pub flags: u32,
    pub field: u32,
    pub sequence: u32,
    pub memory: u32,
    pub timestamp: Duration,
    pub timecode: Timecode,
}

/// A filled buffer handed back by the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DequeuedBuffer {
    pub index: u32,
    pub bytes_used: usize,
    pub sequence: u32,
    pub timestamp: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    Ready,
    Timeout,
}

/// Renders a fourcc code like `YUYV`, replacing non-printable bytes with `.`.
pub fn fourcc_string(fourcc: &[u8; 4]) -> String {
    fourcc
        .iter()
        .map(|&b| if b.is_ascii_graphic() || b == b' ' { b as char } else { '.' })
        .collect()
}

/// Permission to move a buffer between the application and the device.
///
/// Only the buffer pool creates these, so no buffer can be queued or
/// dequeued behind the pool while a view of it is borrowed.
///
/// ```compile_fail
/// use video::{CaptureDevice, videoin::{QueueToken, fake::FakeDevice}};
///
/// let mut device = FakeDevice::new(64);
/// device.queue_buffer(0, QueueToken(())).unwrap();
/// ```
#[derive(Debug)]
pub struct QueueToken(());

impl QueueToken {
    pub(crate) fn new() -> Self {
        Self(())
    }
}

/// Everything the capture loop needs from a streaming capture device.
///
/// Device requests are synchronous. Buffer memory handed out by `map_buffer`
/// is shared with the device: the device may only write a buffer while it is
/// queued, and the application may only read it between `dequeue_buffer`
/// returning its index and the next `queue_buffer` of that index. Both calls
/// need a `QueueToken`, which keeps them inside `BufferPool`.
pub trait CaptureDevice {
    /// A mapped buffer. Dropping it unmaps the memory.
    type Region: AsRef<[u8]>;

    /// Name used in diagnostics, usually the device path.
    fn name(&self) -> &str;

    fn query_capabilities(&mut self) -> Result<Capabilities, VideoError>;
    fn crop_capabilities(&mut self) -> Result<CropCapabilities, VideoError>;
    fn enumerate_formats(&mut self) -> Result<Vec<FormatDescription>, VideoError>;
    fn current_format(&mut self) -> Result<FormatInfo, VideoError>;
    fn stream_parameters(&mut self) -> Result<StreamParameters, VideoError>;

    /// Ask the device for `count` buffers, returning how many it granted.
    fn request_buffers(&mut self, count: u32) -> Result<u32, VideoError>;
    fn query_buffer(&mut self, index: u32) -> Result<BufferInfo, VideoError>;
    fn map_buffer(&mut self, buffer: &BufferInfo) -> Result<Self::Region, VideoError>;

    fn queue_buffer(&mut self, index: u32, token: QueueToken) -> Result<(), VideoError>;
    fn wait_ready(&mut self, timeout: Duration) -> Result<WaitOutcome, VideoError>;
    fn dequeue_buffer(&mut self, token: QueueToken) -> Result<DequeuedBuffer, VideoError>;

    fn start_streaming(&mut self) -> Result<(), VideoError>;
    fn stop_streaming(&mut self) -> Result<(), VideoError>;

    /// Release the device handle.
    fn close(self) -> Result<(), VideoError>
    where
        Self: Sized;
}
