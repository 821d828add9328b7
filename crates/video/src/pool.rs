use crate::{CaptureDevice, DequeuedBuffer, QueueToken, VideoError};

/// Who currently owns a frame buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferState {
    /// Mapped but never submitted.
    Idle,
    /// Owned by the device, which may be writing into it.
    Queued,
    /// Handed back by the device; readable until resubmitted.
    Filled,
}

struct FrameBuffer<R> {
    region: R,
    length: usize,
    state: BufferState,
}

/// Fixed set of device buffers mapped into process memory.
///
/// The pool owns every mapped region. Dropping the pool unmaps all of them,
/// so a pool that fails halfway through creation never leaks a mapping.
///
/// Buffers only move between the application and the device through the
/// pool, so a slice returned by `read` cannot be resubmitted while it is
/// borrowed.
pub struct BufferPool<R: AsRef<[u8]>> {
    buffers: Vec<FrameBuffer<R>>,
}

impl<R: AsRef<[u8]>> std::fmt::Debug for BufferPool<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.buffers.iter().map(|b| (b.length, b.state)))
            .finish()
    }
}

impl<R: AsRef<[u8]>> BufferPool<R> {
    /// Request `count` buffers from the device and map each of them.
    ///
    /// # Errors
    ///
    /// Returns `VideoError::InsufficientBuffers` if the device grants fewer
    /// than `count` buffers, or the first query/map failure. Buffers mapped
    /// before the failure are unmapped before the error is returned.
    pub fn create<D>(device: &mut D, count: u32) -> Result<Self, VideoError>
    where
        D: CaptureDevice<Region = R>,
    {
        let granted = device.request_buffers(count)?;
        if granted < count {
            return Err(VideoError::InsufficientBuffers {
                requested: count,
                granted,
            });
        }
        if granted > count {
            log::debug!("device granted {} buffers, using {}", granted, count);
        }

        log::info!("\"{}\" MMAP Buffers:", device.name());
        let mut buffers = Vec::with_capacity(count as usize);
        for index in 0..count {
            let mapped = device
                .query_buffer(index)
                .and_then(|info| device.map_buffer(&info).map(|region| (info, region)));
            let (info, region) = match mapped {
                Ok(mapped) => mapped,
                Err(error) => {
                    log::debug!(
                        "unwinding {} mapped buffers after failure on buffer {}",
                        buffers.len(),
                        index
                    );
                    drop(buffers);
                    return Err(error);
                }
            };
            log::info!(
                "    mmap <{}/{}> : index {} / length {} / offset 0x{:08x}",
                index + 1,
                count,
                info.index,
                info.length,
                info.offset
            );
            log::info!(
                "        bytesused[{}] / flags[0x{:08x}] / field[{}] / sequence[{}] / memory[{}]",
                info.bytes_used,
                info.flags,
                info.field,
                info.sequence,
                info.memory
            );
            log::info!(
                "        timestamp {}.{:06} / timecode type[{}] | flags[0x{:x}] | frames[{}] | [{:02}:{:02}:{:02}]",
                info.timestamp.as_secs(),
                info.timestamp.subsec_micros(),
                info.timecode.kind,
                info.timecode.flags,
                info.timecode.frames,
                info.timecode.hours,
                info.timecode.minutes,
                info.timecode.seconds
            );
            buffers.push(FrameBuffer {
                region,
                length: info.length,
                state: BufferState::Idle,
            });
        }

        Ok(Self { buffers })
    }

    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }

    pub fn state(&self, index: u32) -> Option<BufferState> {
        self.buffers.get(index as usize).map(|b| b.state)
    }

    pub fn buffer_len(&self, index: u32) -> Option<usize> {
        self.buffers.get(index as usize).map(|b| b.length)
    }

    /// Hand every buffer to the device in index order.
    ///
    /// Stops at the first failure; buffers before it stay queued.
    pub fn submit_all<D>(&mut self, device: &mut D) -> Result<(), VideoError>
    where
        D: CaptureDevice<Region = R>,
    {
        for (index, buffer) in self.buffers.iter_mut().enumerate() {
            device.queue_buffer(index as u32, QueueToken::new())?;
            buffer.state = BufferState::Queued;
            log::info!("\"{}\" QBUF - <{}> : OK", device.name(), index);
        }
        Ok(())
    }

    /// Take the oldest filled buffer back from the device.
    ///
    /// # Errors
    ///
    /// Device failures are returned as-is. A buffer the pool did not queue,
    /// or one claiming more bytes than it holds, is `VideoError::InvalidBuffer`.
    pub fn dequeue<D>(&mut self, device: &mut D) -> Result<DequeuedBuffer, VideoError>
    where
        D: CaptureDevice<Region = R>,
    {
        let buffer = device.dequeue_buffer(QueueToken::new())?;
        self.mark_filled(buffer.index, buffer.bytes_used)?;
        Ok(buffer)
    }

    fn mark_filled(&mut self, index: u32, bytes_used: usize) -> Result<(), VideoError> {
        let buffer = self.buffers.get_mut(index as usize).ok_or_else(|| {
            VideoError::InvalidBuffer {
                index,
                reason: "index outside the pool".to_string(),
            }
        })?;
        if buffer.state != BufferState::Queued {
            return Err(VideoError::InvalidBuffer {
                index,
                reason: format!("dequeued while {:?}", buffer.state),
            });
        }
        if bytes_used > buffer.length {
            return Err(VideoError::InvalidBuffer {
                index,
                reason: format!("{} bytes used in a {} byte buffer", bytes_used, buffer.length),
            });
        }
        buffer.state = BufferState::Filled;
        Ok(())
    }

    /// View of a filled buffer's memory.
    ///
    /// Only filled buffers can be read; the device may be writing any other.
    pub fn read(&self, index: u32) -> Result<&[u8], VideoError> {
        match self.buffers.get(index as usize) {
            Some(buffer) if buffer.state == BufferState::Filled => Ok(buffer.region.as_ref()),
            Some(buffer) => Err(VideoError::InvalidBuffer {
                index,
                reason: format!("read while {:?}", buffer.state),
            }),
            None => Err(VideoError::InvalidBuffer {
                index,
                reason: "index outside the pool".to_string(),
            }),
        }
    }

    /// Give a consumed buffer back to the device.
    pub fn requeue<D>(&mut self, device: &mut D, index: u32) -> Result<(), VideoError>
    where
        D: CaptureDevice<Region = R>,
    {
        let buffer = self.buffers.get_mut(index as usize).ok_or_else(|| {
            VideoError::InvalidBuffer {
                index,
                reason: "index outside the pool".to_string(),
            }
        })?;
        if buffer.state != BufferState::Filled {
            return Err(VideoError::InvalidBuffer {
                index,
                reason: format!("requeued while {:?}", buffer.state),
            });
        }
        device.queue_buffer(index, QueueToken::new())?;
        buffer.state = BufferState::Queued;
        Ok(())
    }

    /// Unmap every buffer and free the pool.
    pub fn destroy(self) {
        log::debug!("unmapping {} buffers", self.buffers.len());
        drop(self);
    }
}
