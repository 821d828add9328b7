use {
    crate::{VideoError, videoin::*},
    std::{
        fs, io, mem,
        os::{raw::c_void, unix::fs::FileTypeExt, unix::io::RawFd},
        ptr::{self, NonNull},
        slice,
        time::Duration,
    },
    v4l::{
        Device, buffer::Type, capability::Flags, memory::Memory, v4l_sys::*, v4l2,
        v4l2::vidioc, video::Capture,
    },
};

fn check(op: &'static str, result: io::Result<()>) -> Result<(), VideoError> {
    result.map_err(|source| VideoError::Ioctl { op, source })
}

fn buffer_desc() -> v4l2_buffer {
    let mut buf: v4l2_buffer = unsafe { mem::zeroed() };
    buf.type_ = Type::VideoCapture as u32;
    buf.memory = Memory::Mmap as u32;
    buf
}

fn timestamp(buf: &v4l2_buffer) -> Duration {
    Duration::from_secs(buf.timestamp.tv_sec.max(0) as u64)
        + Duration::from_micros(buf.timestamp.tv_usec.max(0) as u64)
}

// NUL-terminated driver string
fn c_string(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}

/// A kernel capture buffer mapped into process memory.
pub struct MmapRegion {
    ptr: NonNull<u8>,
    len: usize,
    index: u32,
}

impl AsRef<[u8]> for MmapRegion {
    fn as_ref(&self) -> &[u8] {
        unsafe { slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }
}

impl Drop for MmapRegion {
    fn drop(&mut self) {
        if unsafe { libc::munmap(self.ptr.as_ptr() as *mut c_void, self.len) } != 0 {
            log::warn!(
                "munmap of buffer {} failed: {}",
                self.index,
                io::Error::last_os_error()
            );
        }
    }
}

/// V4L2 capture device using memory-mapped streaming I/O.
pub struct V4l2Device {
    path: String,
    device: Device,
    fd: RawFd,
}

impl std::fmt::Debug for V4l2Device {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("V4l2Device")
            .field("path", &self.path)
            .field("device", &"<v4l::Device>")
            .field("fd", &self.fd)
            .finish()
    }
}

impl V4l2Device {
    /// Open the device at `path` read-write and non-blocking.
    ///
    /// # Errors
    ///
    /// Returns `VideoError::Open` if the path does not exist or cannot be
    /// opened (the `io::ErrorKind` tells not-found from permission-denied),
    /// and `VideoError::Unsupported` if the path is not a character device.
    pub fn open(path: &str) -> Result<Self, VideoError> {
        let open_error = |source| VideoError::Open {
            path: path.to_string(),
            source,
        };
        let metadata = fs::metadata(path).map_err(open_error)?;
        if !metadata.file_type().is_char_device() {
            return Err(VideoError::Unsupported(format!(
                "\"{path}\" is not a character device"
            )));
        }

        let device = Device::with_path(path).map_err(open_error)?;
        let fd = device.handle().fd();
        log::debug!("opened \"{}\" (fd {})", path, fd);

        Ok(Self {
            path: path.to_string(),
            device,
            fd,
        })
    }
}

impl CaptureDevice for V4l2Device {
    type Region = MmapRegion;

    fn name(&self) -> &str {
        &self.path
    }

    fn query_capabilities(&mut self) -> Result<Capabilities, VideoError> {
        let mut cap: v4l2_capability = unsafe { mem::zeroed() };
        check("VIDIOC_QUERYCAP", unsafe {
            v4l2::ioctl(
                self.fd,
                vidioc::VIDIOC_QUERYCAP,
                &mut cap as *mut _ as *mut c_void,
            )
        })?;
        let flags = Flags::from_bits_truncate(cap.capabilities);
        Ok(Capabilities {
            driver: c_string(&cap.driver),
            card: c_string(&cap.card),
            bus_info: c_string(&cap.bus_info),
            version: cap.version,
            capabilities: cap.capabilities,
            device_caps: cap.device_caps,
            capture: flags.contains(Flags::VIDEO_CAPTURE),
            streaming: flags.contains(Flags::STREAMING),
        })
    }

    fn crop_capabilities(&mut self) -> Result<CropCapabilities, VideoError> {
        let mut cropcap: v4l2_cropcap = unsafe { mem::zeroed() };
        cropcap.type_ = Type::VideoCapture as u32;
        check("VIDIOC_CROPCAP", unsafe {
            v4l2::ioctl(
                self.fd,
                vidioc::VIDIOC_CROPCAP,
                &mut cropcap as *mut _ as *mut c_void,
            )
        })?;
        let rect = |r: v4l2_rect| Rect {
            left: r.left,
            top: r.top,
            width: r.width,
            height: r.height,
        };
        Ok(CropCapabilities {
            bounds: rect(cropcap.bounds),
            default_rect: rect(cropcap.defrect),
            pixel_aspect: (cropcap.pixelaspect.numerator, cropcap.pixelaspect.denominator),
        })
    }

    fn enumerate_formats(&mut self) -> Result<Vec<FormatDescription>, VideoError> {
        let formats = Capture::enum_formats(&self.device).map_err(|source| VideoError::Ioctl {
            op: "VIDIOC_ENUM_FMT",
            source,
        })?;
        Ok(formats
            .into_iter()
            .map(|desc| FormatDescription {
                index: desc.index,
                fourcc: desc.fourcc.repr,
                description: desc.description,
            })
            .collect())
    }

    fn current_format(&mut self) -> Result<FormatInfo, VideoError> {
        let format = Capture::format(&self.device).map_err(|source| VideoError::Ioctl {
            op: "VIDIOC_G_FMT",
            source,
        })?;
        Ok(FormatInfo {
            width: format.width,
            height: format.height,
            fourcc: format.fourcc.repr,
            bytes_per_line: format.stride,
            size_image: format.size,
            field: format.field_order as u32,
            colorspace: format.colorspace as u32,
        })
    }

    fn stream_parameters(&mut self) -> Result<StreamParameters, VideoError> {
        let mut parm: v4l2_streamparm = unsafe { mem::zeroed() };
        parm.type_ = Type::VideoCapture as u32;
        check("VIDIOC_G_PARM", unsafe {
            v4l2::ioctl(
                self.fd,
                vidioc::VIDIOC_G_PARM,
                &mut parm as *mut _ as *mut c_void,
            )
        })?;
        // capture member is the one filled for VideoCapture
        let capture = unsafe { parm.parm.capture };
        Ok(StreamParameters {
            capability: capture.capability,
            capture_mode: capture.capturemode,
            time_per_frame: (
                capture.timeperframe.numerator,
                capture.timeperframe.denominator,
            ),
            extended_mode: capture.extendedmode,
            read_buffers: capture.readbuffers,
        })
    }

    fn request_buffers(&mut self, count: u32) -> Result<u32, VideoError> {
        let mut reqbufs: v4l2_requestbuffers = unsafe { mem::zeroed() };
        reqbufs.count = count;
        reqbufs.type_ = Type::VideoCapture as u32;
        reqbufs.memory = Memory::Mmap as u32;
        check("VIDIOC_REQBUFS", unsafe {
            v4l2::ioctl(
                self.fd,
                vidioc::VIDIOC_REQBUFS,
                &mut reqbufs as *mut _ as *mut c_void,
            )
        })?;
        Ok(reqbufs.count)
    }

    fn query_buffer(&mut self, index: u32) -> Result<BufferInfo, VideoError> {
        let mut buf = buffer_desc();
        buf.index = index;
        check("VIDIOC_QUERYBUF", unsafe {
            v4l2::ioctl(
                self.fd,
                vidioc::VIDIOC_QUERYBUF,
                &mut buf as *mut _ as *mut c_void,
            )
        })?;
        Ok(BufferInfo {
            index: buf.index,
            length: buf.length as usize,
            offset: unsafe { buf.m.offset },
            bytes_used: buf.bytesused,
            flags: buf.flags,
            field: buf.field,
            sequence: buf.sequence,
            memory: buf.memory,
            timestamp: timestamp(&buf),
            timecode: Timecode {
                kind: buf.timecode.type_,
                flags: buf.timecode.flags,
                frames: buf.timecode.frames,
                hours: buf.timecode.hours,
                minutes: buf.timecode.minutes,
                seconds: buf.timecode.seconds,
            },
        })
    }

    fn map_buffer(&mut self, buffer: &BufferInfo) -> Result<MmapRegion, VideoError> {
        let ptr = unsafe {
            libc::mmap(
                ptr::null_mut(),
                buffer.length,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED,
                self.fd,
                buffer.offset as libc::off_t,
            )
        };
        if ptr == libc::MAP_FAILED {
            return Err(VideoError::Map {
                index: buffer.index,
                source: io::Error::last_os_error(),
            });
        }
        let ptr = NonNull::new(ptr as *mut u8).ok_or_else(|| VideoError::Map {
            index: buffer.index,
            source: io::Error::new(io::ErrorKind::Other, "mmap returned null"),
        })?;
        Ok(MmapRegion {
            ptr,
            len: buffer.length,
            index: buffer.index,
        })
    }

    fn queue_buffer(&mut self, index: u32, _token: QueueToken) -> Result<(), VideoError> {
        let mut buf = buffer_desc();
        buf.index = index;
        check("VIDIOC_QBUF", unsafe {
            v4l2::ioctl(self.fd, vidioc::VIDIOC_QBUF, &mut buf as *mut _ as *mut c_void)
        })
    }

    fn wait_ready(&mut self, timeout: Duration) -> Result<WaitOutcome, VideoError> {
        let mut pollfd = libc::pollfd {
            fd: self.fd,
            events: libc::POLLIN,
            revents: 0,
        };
        let timeout_ms = timeout.as_millis().min(i32::MAX as u128) as i32;
        match unsafe { libc::poll(&mut pollfd, 1, timeout_ms) } {
            0 => Ok(WaitOutcome::Timeout),
            n if n > 0 => Ok(WaitOutcome::Ready),
            _ => Err(VideoError::Ioctl {
                op: "poll",
                source: io::Error::last_os_error(),
            }),
        }
    }

    fn dequeue_buffer(&mut self, _token: QueueToken) -> Result<DequeuedBuffer, VideoError> {
        let mut buf = buffer_desc();
        check("VIDIOC_DQBUF", unsafe {
            v4l2::ioctl(self.fd, vidioc::VIDIOC_DQBUF, &mut buf as *mut _ as *mut c_void)
        })?;
        Ok(DequeuedBuffer {
            index: buf.index,
            bytes_used: buf.bytesused as usize,
            sequence: buf.sequence,
            timestamp: timestamp(&buf),
        })
    }

    fn start_streaming(&mut self) -> Result<(), VideoError> {
        let mut typ = Type::VideoCapture as u32;
        check("VIDIOC_STREAMON", unsafe {
            v4l2::ioctl(
                self.fd,
                vidioc::VIDIOC_STREAMON,
                &mut typ as *mut _ as *mut c_void,
            )
        })
    }

    fn stop_streaming(&mut self) -> Result<(), VideoError> {
        let mut typ = Type::VideoCapture as u32;
        check("VIDIOC_STREAMOFF", unsafe {
            v4l2::ioctl(
                self.fd,
                vidioc::VIDIOC_STREAMOFF,
                &mut typ as *mut _ as *mut c_void,
            )
        })
    }

    fn close(self) -> Result<(), VideoError> {
        log::debug!("closing \"{}\"", self.path);
        // the v4l handle closes the descriptor when the last reference drops
        drop(self.device);
        Ok(())
    }
}
