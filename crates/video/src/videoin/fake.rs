//! In-memory capture device for exercising the capture loop without hardware.
//!
//! `FakeDevice` behaves like a V4L2 mmap device: buffers are queued in FIFO
//! order, a frame is written into the oldest queued buffer when it is
//! dequeued, and mapped memory stays alive until the pool drops its region.
//! Every request is recorded in a shared `FakeLog` so tests can assert on
//! ordering and on how many regions are still mapped.

use {
    crate::{VideoError, videoin::*},
    std::{
        cell::{RefCell, UnsafeCell},
        collections::VecDeque,
        io,
        rc::{Rc, Weak},
        time::Duration,
    },
};

const FRAME_INTERVAL: Duration = Duration::from_micros(33_333);

/// One recorded device request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FakeOp {
    QueryCapabilities,
    CropCapabilities,
    EnumerateFormats,
    CurrentFormat,
    StreamParameters,
    RequestBuffers(u32),
    QueryBuffer(u32),
    Map(u32),
    Unmap(u32),
    Queue(u32),
    StreamOn,
    Wait,
    Dequeue(u32),
    StreamOff,
    Close,
    /// Free-form marker pushed by tests, e.g. from a sink.
    Note(&'static str),
}

/// A request the fake should fail, with the errno it reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FakeFailure {
    QueryCapabilities,
    CropCapabilities,
    RequestBuffers,
    QueryBuffer(u32),
    Map(u32),
    /// Fail the n-th queue request (0-based, counting priming requests).
    Queue(usize),
    StreamOn,
    StreamOff,
    /// Fail the wait before the n-th frame (0-based).
    Wait(usize),
    /// Fail the n-th dequeue (0-based).
    Dequeue(usize),
}

#[derive(Default)]
struct FakeLogInner {
    ops: Vec<FakeOp>,
    mappings: Vec<Weak<FakeMemory>>,
}

/// Shared record of everything a `FakeDevice` was asked to do.
#[derive(Clone, Default)]
pub struct FakeLog {
    inner: Rc<RefCell<FakeLogInner>>,
}

impl FakeLog {
    pub fn ops(&self) -> Vec<FakeOp> {
        self.inner.borrow().ops.clone()
    }

    pub fn note(&self, note: &'static str) {
        self.push(FakeOp::Note(note));
    }

    /// How many regions are still mapped (held by someone).
    pub fn live_mappings(&self) -> usize {
        self.inner
            .borrow()
            .mappings
            .iter()
            .filter(|m| m.strong_count() > 0)
            .count()
    }

    /// Number of recorded requests matching `predicate`.
    pub fn count(&self, predicate: impl Fn(&FakeOp) -> bool) -> usize {
        self.inner.borrow().ops.iter().filter(|op| predicate(op)).count()
    }

    fn push(&self, op: FakeOp) {
        self.inner.borrow_mut().ops.push(op);
    }
}

struct FakeMemory {
    bytes: UnsafeCell<Box<[u8]>>,
}

/// Memory "mapped" from a `FakeDevice`.
pub struct FakeRegion {
    memory: Rc<FakeMemory>,
    index: u32,
    log: FakeLog,
}

impl AsRef<[u8]> for FakeRegion {
    fn as_ref(&self) -> &[u8] {
        // the device only writes buffers that are queued, and the pool never
        // hands out a view of a queued buffer
        unsafe { &*self.memory.bytes.get() }
    }
}

impl Drop for FakeRegion {
    fn drop(&mut self) {
        self.log.push(FakeOp::Unmap(self.index));
    }
}

/// Scripted in-memory capture device.
pub struct FakeDevice {
    name: String,
    log: FakeLog,
    capture: bool,
    streaming_cap: bool,
    buffer_length: usize,
    granted: Option<u32>,
    frames: VecDeque<Vec<u8>>,
    timeout_at: Option<usize>,
    failures: Vec<FakeFailure>,
    memories: Vec<Weak<FakeMemory>>,
    queued: VecDeque<u32>,
    streaming: bool,
    queue_calls: usize,
    waits: usize,
    dequeues: usize,
}

impl FakeDevice {
    /// A device with capture and streaming support and buffers of `buffer_length` bytes.
    pub fn new(buffer_length: usize) -> Self {
        Self {
            name: "fake".to_string(),
            log: FakeLog::default(),
            capture: true,
            streaming_cap: true,
            buffer_length,
            granted: None,
            frames: VecDeque::new(),
            timeout_at: None,
            failures: Vec::new(),
            memories: Vec::new(),
            queued: VecDeque::new(),
            streaming: false,
            queue_calls: 0,
            waits: 0,
            dequeues: 0,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_capabilities(mut self, capture: bool, streaming: bool) -> Self {
        self.capture = capture;
        self.streaming_cap = streaming;
        self
    }

    /// Grant this many buffers regardless of how many are requested.
    pub fn with_granted_buffers(mut self, granted: u32) -> Self {
        self.granted = Some(granted);
        self
    }

    /// Queue up `count` frames of `size` bytes; frame `n` is filled with byte `n`.
    pub fn with_frames(mut self, count: usize, size: usize) -> Self {
        for n in 0..count {
            self.frames.push_back(vec![n as u8; size]);
        }
        self
    }

    pub fn with_frame(mut self, payload: Vec<u8>) -> Self {
        self.frames.push_back(payload);
        self
    }

    /// Report a timeout instead of readiness before the n-th frame (0-based).
    pub fn with_timeout_at(mut self, frame: usize) -> Self {
        self.timeout_at = Some(frame);
        self
    }

    pub fn with_failure(mut self, failure: FakeFailure) -> Self {
        self.failures.push(failure);
        self
    }

    pub fn log(&self) -> FakeLog {
        self.log.clone()
    }

    /// Indices currently owned by the device, oldest first.
    pub fn queued(&self) -> Vec<u32> {
        self.queued.iter().copied().collect()
    }

    fn fails(&self, failure: FakeFailure) -> bool {
        self.failures.contains(&failure)
    }

    fn ioctl_error(op: &'static str, errno: i32) -> VideoError {
        VideoError::Ioctl {
            op,
            source: io::Error::from_raw_os_error(errno),
        }
    }
}

impl CaptureDevice for FakeDevice {
    type Region = FakeRegion;

    fn name(&self) -> &str {
        &self.name
    }

    fn query_capabilities(&mut self) -> Result<Capabilities, VideoError> {
        self.log.push(FakeOp::QueryCapabilities);
        if self.fails(FakeFailure::QueryCapabilities) {
            return Err(Self::ioctl_error("VIDIOC_QUERYCAP", libc::EINVAL));
        }
        let mut capabilities = 0;
        if self.capture {
            capabilities |= 0x0000_0001;
        }
        if self.streaming_cap {
            capabilities |= 0x0400_0000;
        }
        Ok(Capabilities {
            driver: "fake".to_string(),
            card: "Fake Camera".to_string(),
            bus_info: "platform:fake".to_string(),
            version: 0x0006_0100,
            capabilities: capabilities | 0x8000_0000,
            device_caps: capabilities,
            capture: self.capture,
            streaming: self.streaming_cap,
        })
    }

    fn crop_capabilities(&mut self) -> Result<CropCapabilities, VideoError> {
        self.log.push(FakeOp::CropCapabilities);
        if self.fails(FakeFailure::CropCapabilities) {
            return Err(Self::ioctl_error("VIDIOC_CROPCAP", libc::ENOTTY));
        }
        let rect = Rect {
            left: 0,
            top: 0,
            width: 640,
            height: 480,
        };
        Ok(CropCapabilities {
            bounds: rect,
            default_rect: rect,
            pixel_aspect: (1, 1),
        })
    }

    fn enumerate_formats(&mut self) -> Result<Vec<FormatDescription>, VideoError> {
        self.log.push(FakeOp::EnumerateFormats);
        Ok(vec![
            FormatDescription {
                index: 0,
                fourcc: *b"YUYV",
                description: "YUYV 4:2:2".to_string(),
            },
            FormatDescription {
                index: 1,
                fourcc: *b"MJPG",
                description: "Motion-JPEG".to_string(),
            },
        ])
    }

    fn current_format(&mut self) -> Result<FormatInfo, VideoError> {
        self.log.push(FakeOp::CurrentFormat);
        Ok(FormatInfo {
            width: 640,
            height: 480,
            fourcc: *b"YUYV",
            bytes_per_line: 1280,
            size_image: self.buffer_length as u32,
            field: 1,
            colorspace: 8,
        })
    }

    fn stream_parameters(&mut self) -> Result<StreamParameters, VideoError> {
        self.log.push(FakeOp::StreamParameters);
        Ok(StreamParameters {
            capability: 0x1000,
            capture_mode: 0,
            time_per_frame: (1, 30),
            extended_mode: 0,
            read_buffers: 0,
        })
    }

    fn request_buffers(&mut self, count: u32) -> Result<u32, VideoError> {
        self.log.push(FakeOp::RequestBuffers(count));
        if self.fails(FakeFailure::RequestBuffers) {
            return Err(Self::ioctl_error("VIDIOC_REQBUFS", libc::ENOMEM));
        }
        let granted = self.granted.unwrap_or(count);
        self.memories = (0..granted).map(|_| Weak::new()).collect();
        Ok(granted)
    }

    fn query_buffer(&mut self, index: u32) -> Result<BufferInfo, VideoError> {
        self.log.push(FakeOp::QueryBuffer(index));
        if self.fails(FakeFailure::QueryBuffer(index)) || index as usize >= self.memories.len() {
            return Err(Self::ioctl_error("VIDIOC_QUERYBUF", libc::EINVAL));
        }
        Ok(BufferInfo {
            index,
            length: self.buffer_length,
            offset: index * self.buffer_length as u32,
            bytes_used: 0,
            flags: 0,
            field: 1,
            sequence: 0,
            memory: 1,
            timestamp: Duration::ZERO,
            timecode: Timecode::default(),
        })
    }

    fn map_buffer(&mut self, buffer: &BufferInfo) -> Result<FakeRegion, VideoError> {
        self.log.push(FakeOp::Map(buffer.index));
        if self.fails(FakeFailure::Map(buffer.index)) {
            return Err(VideoError::Map {
                index: buffer.index,
                source: io::Error::from_raw_os_error(libc::ENOMEM),
            });
        }
        let memory = Rc::new(FakeMemory {
            bytes: UnsafeCell::new(vec![0u8; buffer.length].into_boxed_slice()),
        });
        self.memories[buffer.index as usize] = Rc::downgrade(&memory);
        self.log
            .inner
            .borrow_mut()
            .mappings
            .push(Rc::downgrade(&memory));
        Ok(FakeRegion {
            memory,
            index: buffer.index,
            log: self.log.clone(),
        })
    }

    fn queue_buffer(&mut self, index: u32, _token: QueueToken) -> Result<(), VideoError> {
        self.log.push(FakeOp::Queue(index));
        let call = self.queue_calls;
        self.queue_calls += 1;
        if self.fails(FakeFailure::Queue(call)) {
            return Err(Self::ioctl_error("VIDIOC_QBUF", libc::EIO));
        }
        let mapped = self
            .memories
            .get(index as usize)
            .is_some_and(|m| m.strong_count() > 0);
        if !mapped || self.queued.contains(&index) {
            return Err(Self::ioctl_error("VIDIOC_QBUF", libc::EINVAL));
        }
        self.queued.push_back(index);
        Ok(())
    }

    fn wait_ready(&mut self, _timeout: Duration) -> Result<WaitOutcome, VideoError> {
        self.log.push(FakeOp::Wait);
        let wait = self.waits;
        self.waits += 1;
        if self.fails(FakeFailure::Wait(wait)) {
            return Err(Self::ioctl_error("poll", libc::EINTR));
        }
        let stalled = self.timeout_at == Some(self.dequeues)
            || !self.streaming
            || self.queued.is_empty()
            || self.frames.is_empty();
        if stalled {
            Ok(WaitOutcome::Timeout)
        } else {
            Ok(WaitOutcome::Ready)
        }
    }

    fn dequeue_buffer(&mut self, _token: QueueToken) -> Result<DequeuedBuffer, VideoError> {
        let dequeue = self.dequeues;
        if self.fails(FakeFailure::Dequeue(dequeue)) {
            self.log.push(FakeOp::Dequeue(u32::MAX));
            return Err(Self::ioctl_error("VIDIOC_DQBUF", libc::EIO));
        }
        if !self.streaming || self.frames.is_empty() {
            self.log.push(FakeOp::Dequeue(u32::MAX));
            return Err(Self::ioctl_error("VIDIOC_DQBUF", libc::EAGAIN));
        }
        let Some(index) = self.queued.pop_front() else {
            self.log.push(FakeOp::Dequeue(u32::MAX));
            return Err(Self::ioctl_error("VIDIOC_DQBUF", libc::EAGAIN));
        };
        self.log.push(FakeOp::Dequeue(index));
        let payload = self.frames.pop_front().unwrap_or_default();
        let memory = self.memories[index as usize]
            .upgrade()
            .ok_or_else(|| Self::ioctl_error("VIDIOC_DQBUF", libc::EFAULT))?;
        // the buffer was queued, so nothing is reading it
        let bytes = unsafe { &mut *memory.bytes.get() };
        let n = payload.len().min(bytes.len());
        bytes[..n].copy_from_slice(&payload[..n]);

        self.dequeues += 1;
        Ok(DequeuedBuffer {
            index,
            bytes_used: payload.len(),
            sequence: dequeue as u32,
            timestamp: FRAME_INTERVAL * dequeue as u32,
        })
    }

    fn start_streaming(&mut self) -> Result<(), VideoError> {
        self.log.push(FakeOp::StreamOn);
        if self.fails(FakeFailure::StreamOn) {
            return Err(Self::ioctl_error("VIDIOC_STREAMON", libc::EIO));
        }
        self.streaming = true;
        Ok(())
    }

    fn stop_streaming(&mut self) -> Result<(), VideoError> {
        self.log.push(FakeOp::StreamOff);
        if self.fails(FakeFailure::StreamOff) {
            return Err(Self::ioctl_error("VIDIOC_STREAMOFF", libc::EIO));
        }
        self.streaming = false;
        self.queued.clear();
        Ok(())
    }

    fn close(self) -> Result<(), VideoError> {
        self.log.push(FakeOp::Close);
        Ok(())
    }
}
