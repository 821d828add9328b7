use {
    crate::{CaptureReport, FrameRecord, VideoError},
    tokio::{
        sync::mpsc,
        task::{JoinHandle, spawn_blocking},
    },
};

// capacity of the progress channel
const PROGRESS_CAPACITY: usize = 16;

/// A capture run on a blocking worker thread, with per-frame progress.
///
/// The capture loop itself stays synchronous on the worker; progress records
/// are dropped rather than stalling the loop when nobody keeps up.
pub struct CaptureTask {
    receiver: mpsc::Receiver<FrameRecord>,
    join_handle: JoinHandle<Result<CaptureReport, VideoError>>,
}

impl CaptureTask {
    /// Run `job` on a blocking thread, passing it a progress callback.
    pub fn spawn_with<F>(job: F) -> Self
    where
        F: FnOnce(&mut dyn FnMut(&FrameRecord)) -> Result<CaptureReport, VideoError>
            + Send
            + 'static,
    {
        let (sender, receiver) = mpsc::channel(PROGRESS_CAPACITY);
        let join_handle = spawn_blocking(move || {
            let mut on_frame = |frame: &FrameRecord| match sender.try_send(*frame) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(_)) => {
                    log::debug!("progress channel full, dropping frame {}", frame.sequence);
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {}
            };
            job(&mut on_frame)
        });
        Self {
            receiver,
            join_handle,
        }
    }

    /// Capture the descriptor's stream from its V4L2 device.
    #[cfg(feature = "v4l2")]
    pub fn spawn(descriptor: crate::StreamDescriptor, config: crate::CaptureConfig) -> Self {
        Self::spawn_with(move |on_frame| crate::run_stream(&descriptor, &config, on_frame))
    }

    /// Next progress record, or `None` once the worker has finished.
    pub async fn recv(&mut self) -> Option<FrameRecord> {
        self.receiver.recv().await
    }

    /// Wait for the worker and return the run's outcome.
    pub async fn join(self) -> Result<CaptureReport, VideoError> {
        drop(self.receiver);
        self.join_handle.await?
    }
}
