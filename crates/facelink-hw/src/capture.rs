//! Background capture: a camera thread publishing the latest frame.
//!
//! Consumers read the newest frame from a `watch` channel and never wait on
//! the camera. When the thread ends (stop request or device failure) the
//! channel closes, which is how readers learn the source is gone.

use crate::camera::{Camera, CameraError};
use crate::frame::Frame;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tokio::sync::watch;

/// Latest frame, `None` until the first frame arrives.
pub type FrameReceiver = watch::Receiver<Option<Arc<Frame>>>;

/// How long `stop` waits for the thread before leaving it behind.
const STOP_TIMEOUT: Duration = Duration::from_secs(2);
const STOP_POLL: Duration = Duration::from_millis(10);

/// Owner of the capture thread.
pub struct CaptureHandle {
    frames: FrameReceiver,
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<Result<(), CameraError>>>,
    stop_timeout: Duration,
}

impl CaptureHandle {
    /// Move `camera` onto a dedicated thread and start streaming.
    pub fn spawn(camera: Camera) -> std::io::Result<Self> {
        let device = camera.device_path.clone();
        Self::spawn_source(device, move |on_frame| camera.stream(on_frame))
    }

    /// Run `source` on the capture thread. It feeds frames to the callback
    /// until the callback returns `false` or capture fails.
    fn spawn_source<S>(device: String, source: S) -> std::io::Result<Self>
    where
        S: FnOnce(&mut dyn FnMut(Frame) -> bool) -> Result<(), CameraError> + Send + 'static,
    {
        let (tx, rx) = watch::channel(None);
        let stop = Arc::new(AtomicBool::new(false));
        let thread_stop = Arc::clone(&stop);

        let thread = std::thread::Builder::new()
            .name("facelink-capture".into())
            .spawn(move || {
                tracing::info!(device = %device, "capture thread started");
                let result = source(&mut |frame| {
                    tx.send_replace(Some(Arc::new(frame)));
                    !thread_stop.load(Ordering::Relaxed)
                });
                match &result {
                    Ok(()) => tracing::info!("capture thread stopped"),
                    Err(e) => tracing::error!(error = %e, "capture thread failed"),
                }
                result
            })?;

        Ok(Self {
            frames: rx,
            stop,
            thread: Some(thread),
            stop_timeout: STOP_TIMEOUT,
        })
    }

    /// A receiver for the latest frame.
    pub fn frames(&self) -> FrameReceiver {
        self.frames.clone()
    }

    /// Ask the thread to stop after its next frame and wait for it.
    ///
    /// The flag is only seen between frames. A device that stops delivering
    /// leaves the thread blocked in the driver; after a bounded wait it is
    /// detached and an error is returned instead of hanging the caller.
    pub fn stop(mut self) -> Result<(), CameraError> {
        self.shutdown()
    }

    fn shutdown(&mut self) -> Result<(), CameraError> {
        self.stop.store(true, Ordering::Relaxed);
        let Some(thread) = self.thread.take() else {
            return Ok(());
        };

        let deadline = Instant::now() + self.stop_timeout;
        while !thread.is_finished() {
            if Instant::now() >= deadline {
                tracing::warn!(
                    timeout_ms = self.stop_timeout.as_millis() as u64,
                    "capture thread did not stop; detaching"
                );
                return Err(CameraError::CaptureFailed(
                    "capture thread did not stop in time".into(),
                ));
            }
            std::thread::sleep(STOP_POLL);
        }

        thread
            .join()
            .unwrap_or_else(|_| Err(CameraError::CaptureFailed("capture thread panicked".into())))
    }
}

impl Drop for CaptureHandle {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            tracing::debug!(error = %e, "capture ended with error");
        }
    }
}
