use {
    crate::{
        BufferPool, CaptureConfig, CaptureDevice, StreamDescriptor, VideoError, WaitOutcome,
        fourcc_string,
    },
    std::{
        fs::File,
        io::{self, Write},
        time::Duration,
    },
};

/// Where the capture loop is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureState {
    /// Buffers are being submitted and streaming started.
    Priming,
    /// Frames are being waited for, written out and resubmitted.
    Streaming,
    /// Shutting down after streaming ended, successfully or not.
    Draining,
    /// Shutting down after priming failed.
    Aborting,
    Stopped,
}

/// Metadata of one captured frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameRecord {
    pub index: u32,
    pub bytes_used: usize,
    pub sequence: u32,
    pub timestamp: Duration,
}

/// Totals of a successful capture run. Per-frame detail goes to `on_frame`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CaptureReport {
    pub frames: u32,
    pub bytes: u64,
}

/// Queue/dequeue state machine over an open device and a mapped pool.
///
/// The session never releases the pool or the device; it only guarantees
/// that streaming is stopped once it reaches `Stopped`.
pub struct CaptureSession<'a, D: CaptureDevice> {
    device: &'a mut D,
    pool: &'a mut BufferPool<D::Region>,
    state: CaptureState,
    remaining: u32,
    timeout: Duration,
    error: Option<VideoError>,
    report: CaptureReport,
}

impl<'a, D: CaptureDevice> CaptureSession<'a, D> {
    pub fn new(
        device: &'a mut D,
        pool: &'a mut BufferPool<D::Region>,
        frames: u32,
        timeout: Duration,
    ) -> Self {
        Self {
            device,
            pool,
            state: CaptureState::Priming,
            remaining: frames,
            timeout,
            error: None,
            report: CaptureReport::default(),
        }
    }

    pub fn state(&self) -> CaptureState {
        self.state
    }

    pub fn remaining(&self) -> u32 {
        self.remaining
    }

    /// The first failure seen so far, if any.
    pub fn error(&self) -> Option<&VideoError> {
        self.error.as_ref()
    }

    /// Perform one state transition.
    pub fn step<W: Write>(&mut self, sink: &mut W, on_frame: &mut dyn FnMut(&FrameRecord)) {
        self.state = match self.state {
            CaptureState::Priming => match self.prime() {
                Ok(()) if self.remaining == 0 => CaptureState::Draining,
                Ok(()) => {
                    log::info!("\"{}\" Running:", self.device.name());
                    CaptureState::Streaming
                }
                Err(error) => {
                    self.record(error);
                    CaptureState::Aborting
                }
            },
            CaptureState::Streaming if self.remaining == 0 => CaptureState::Draining,
            CaptureState::Streaming => match self.next_frame(sink) {
                Ok(frame) => {
                    on_frame(&frame);
                    self.report.frames += 1;
                    self.report.bytes += frame.bytes_used as u64;
                    CaptureState::Streaming
                }
                Err(error) => {
                    self.record(error);
                    CaptureState::Draining
                }
            },
            CaptureState::Draining | CaptureState::Aborting => {
                match self.device.stop_streaming() {
                    Ok(()) => log::info!("\"{}\" Stream OFF : OK", self.device.name()),
                    Err(error) => self.record(error),
                }
                CaptureState::Stopped
            }
            CaptureState::Stopped => CaptureState::Stopped,
        };
    }

    /// Drive the session to `Stopped` and report the first failure, if any.
    pub fn run<W: Write>(
        mut self,
        sink: &mut W,
        on_frame: &mut dyn FnMut(&FrameRecord),
    ) -> Result<CaptureReport, VideoError> {
        while self.state != CaptureState::Stopped {
            self.step(sink, on_frame);
        }
        match self.error.take() {
            Some(error) => Err(error),
            None => Ok(self.report),
        }
    }

    fn prime(&mut self) -> Result<(), VideoError> {
        self.pool.submit_all(&mut *self.device)?;
        self.device.start_streaming()?;
        log::info!("\"{}\" Stream  ON : OK", self.device.name());
        Ok(())
    }

    fn next_frame<W: Write>(&mut self, sink: &mut W) -> Result<FrameRecord, VideoError> {
        log::debug!("    Frame.{} : Waiting ...", self.remaining);
        match self
            .device
            .wait_ready(self.timeout)
            .map_err(VideoError::into_stream_error)?
        {
            WaitOutcome::Ready => {}
            WaitOutcome::Timeout => return Err(VideoError::Timeout(self.timeout)),
        }

        let buffer = self
            .pool
            .dequeue(&mut *self.device)
            .map_err(VideoError::into_stream_error)?;
        let data = &self.pool.read(buffer.index)?[..buffer.bytes_used];
        write_frame(sink, data)?;
        self.pool
            .requeue(&mut *self.device, buffer.index)
            .map_err(VideoError::into_stream_error)?;
        self.remaining -= 1;

        log::debug!(
            "    DQBUF-{} / {} bytes / seq {} / ts {}.{:06} ... QBUF-{} ... Done.",
            buffer.index,
            buffer.bytes_used,
            buffer.sequence,
            buffer.timestamp.as_secs(),
            buffer.timestamp.subsec_micros(),
            buffer.index
        );
        Ok(FrameRecord {
            index: buffer.index,
            bytes_used: buffer.bytes_used,
            sequence: buffer.sequence,
            timestamp: buffer.timestamp,
        })
    }

    fn record(&mut self, error: VideoError) {
        match &self.error {
            None => {
                log::error!("{}", error);
                self.error = Some(error);
            }
            Some(first) => log::warn!("{} (after earlier failure: {})", error, first),
        }
    }
}

/// Write one frame payload, reporting how much landed if the sink stops short.
///
/// Bytes the sink accepted before stopping stay in the sink.
pub fn write_frame<W: Write>(sink: &mut W, data: &[u8]) -> Result<(), VideoError> {
    let mut written = 0;
    while written < data.len() {
        match sink.write(&data[written..]) {
            Ok(0) => {
                return Err(VideoError::ShortWrite {
                    written,
                    expected: data.len(),
                    source: None,
                });
            }
            Ok(n) => written += n,
            Err(error) if error.kind() == io::ErrorKind::Interrupted => {}
            Err(error) => {
                return Err(VideoError::ShortWrite {
                    written,
                    expected: data.len(),
                    source: Some(error),
                });
            }
        }
    }
    Ok(())
}

/// Combine a run result with a later teardown result; the earlier error wins.
fn finish<T>(result: Result<T, VideoError>, teardown: Result<(), VideoError>) -> Result<T, VideoError> {
    match (result, teardown) {
        (result, Ok(())) => result,
        (Ok(_), Err(error)) => {
            log::error!("{}", error);
            Err(error)
        }
        (Err(first), Err(error)) => {
            log::warn!("{} (after earlier failure: {})", error, first);
            Err(first)
        }
    }
}

/// Check capture support and log what the device reports about itself.
pub fn negotiate<D: CaptureDevice>(device: &mut D) -> Result<(), VideoError> {
    let name = device.name().to_string();

    let caps = device.query_capabilities()?;
    log::info!("\"{}\" Capability:", name);
    log::info!("    driver   : {}", caps.driver);
    log::info!("    card     : {}", caps.card);
    log::info!("    bus_info : {}", caps.bus_info);
    log::info!("    version  : 0x{:08x}", caps.version);
    log::info!("    capabilities : 0x{:08x}", caps.capabilities);
    log::info!("    device_caps  : 0x{:08x}", caps.device_caps);
    if !caps.capture {
        return Err(VideoError::Unsupported(format!(
            "\"{name}\" does not support video capture"
        )));
    }
    if !caps.streaming {
        return Err(VideoError::Unsupported(format!(
            "\"{name}\" does not support streaming i/o"
        )));
    }

    match device.crop_capabilities() {
        Ok(crop) => {
            log::info!("\"{}\" CROPCAP:", name);
            for (label, rect) in [("bounds  rect", crop.bounds), ("default rect", crop.default_rect)] {
                log::info!(
                    "    {} : x[{}] / y[{}] / w[{}] / h[{}]",
                    label,
                    rect.left,
                    rect.top,
                    rect.width,
                    rect.height
                );
            }
            log::info!("    pixelaspect  : {} / {}", crop.pixel_aspect.0, crop.pixel_aspect.1);
        }
        Err(error) => log::warn!("\"{}\" {}; continuing without crop info", name, error),
    }

    log::info!("\"{}\" Format Enum:", name);
    for format in device.enumerate_formats()? {
        log::info!(
            "    <{}> PixelFormat = \"{}\", Description = {}",
            format.index + 1,
            fourcc_string(&format.fourcc),
            format.description
        );
    }

    let format = device.current_format()?;
    log::info!("\"{}\" Current Format:", name);
    log::info!("    Resolution  : {} x {}", format.width, format.height);
    log::info!("    PixelFormat : \"{}\"", fourcc_string(&format.fourcc));
    log::info!(
        "    bytesperline[{}] / sizeimage[{}]",
        format.bytes_per_line,
        format.size_image
    );
    log::info!("    Field[{}] / colorspace[{}]", format.field, format.colorspace);

    let params = device.stream_parameters()?;
    log::info!("\"{}\" Stream Parm:", name);
    log::info!("    capability   : 0x{:08x}", params.capability);
    log::info!("    capturemode  : 0x{:08x}", params.capture_mode);
    log::info!(
        "    timeperframe : {} / {}",
        params.time_per_frame.0,
        params.time_per_frame.1
    );
    log::info!("    extendedmode : 0x{:08x}", params.extended_mode);
    log::info!("    readbuffers  : 0x{:08x}", params.read_buffers);

    Ok(())
}

fn run_device<D: CaptureDevice, W: Write>(
    device: &mut D,
    sink: &mut W,
    frames: u32,
    config: &CaptureConfig,
    on_frame: &mut dyn FnMut(&FrameRecord),
) -> Result<CaptureReport, VideoError> {
    negotiate(device)?;
    let mut pool = BufferPool::create(device, config.buffer_count())?;
    let result = CaptureSession::new(device, &mut pool, frames, config.timeout()).run(sink, on_frame);
    pool.destroy();
    result
}

/// Capture `frames` frames from an open device into `sink`.
///
/// Teardown always runs in the same order: stop streaming, unmap the pool,
/// close the sink, close the device. The first failure is returned; later
/// teardown failures are only logged.
pub fn capture<D: CaptureDevice, W: Write>(
    mut device: D,
    mut sink: W,
    frames: u32,
    config: &CaptureConfig,
    on_frame: &mut dyn FnMut(&FrameRecord),
) -> Result<CaptureReport, VideoError> {
    let result = run_device(&mut device, &mut sink, frames, config, on_frame);
    let result = finish(
        result,
        sink.flush()
            .map_err(|source| VideoError::Output { op: "flush", source }),
    );
    drop(sink);
    finish(result, device.close())
}

/// Capture the descriptor's frames from `device` into its output file.
///
/// The output file is created (truncated) before the device is negotiated,
/// so a run that fails during negotiation leaves an empty file behind.
pub fn capture_to_file<D: CaptureDevice>(
    device: D,
    descriptor: &StreamDescriptor,
    config: &CaptureConfig,
    on_frame: &mut dyn FnMut(&FrameRecord),
) -> Result<CaptureReport, VideoError> {
    let sink = match File::create(&descriptor.output_path) {
        Ok(sink) => sink,
        Err(source) => {
            log::error!(
                "failed to open output file \"{}\": {}",
                descriptor.output_path,
                source
            );
            let error = VideoError::Output { op: "create", source };
            return finish(Err(error), device.close());
        }
    };

    if !descriptor.pixel_format.is_empty() || descriptor.width != 0 || descriptor.height != 0 {
        log::info!(
            "requested \"{}\" {}x{} is informational; capturing in the device's current format",
            descriptor.pixel_format,
            descriptor.width,
            descriptor.height
        );
    }

    let report = capture(device, sink, descriptor.frame_count, config, on_frame)?;
    log::info!(
        "\"{}\" captured {} frames ({} bytes) into \"{}\"",
        descriptor.device_path,
        report.frames,
        report.bytes,
        descriptor.output_path
    );
    Ok(report)
}

/// Open the descriptor's V4L2 device and capture into its output file.
#[cfg(feature = "v4l2")]
pub fn run_stream(
    descriptor: &StreamDescriptor,
    config: &CaptureConfig,
    on_frame: &mut dyn FnMut(&FrameRecord),
) -> Result<CaptureReport, VideoError> {
    descriptor.validate()?;
    let device = crate::V4l2Device::open(&descriptor.device_path)?;
    capture_to_file(device, descriptor, config, on_frame)
}
