use crate::config::Config;
use crate::navigator::BrowserNavigator;
use facelink_core::detector::DetectorError;
use facelink_core::render::RenderError;
use facelink_core::{
    FaceDetector, FrameView, ImageSurface, Navigator, OverlayPipeline, OverlayRenderer,
    OverlayStyle, PipelineStats, Point, RecognitionRecord, ScrfdDetector, Surface,
};
use facelink_hw::frame::UPLOAD_JPEG_QUALITY;
use facelink_hw::{Camera, CaptureHandle, Frame, FrameReceiver};
use facelink_remote::{RecognitionClient, RemoteError};
use serde::Serialize;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{interval, interval_at, Instant, MissedTickBehavior};

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("camera error: {0}")]
    Camera(#[from] facelink_hw::CameraError),
    #[error("detector error: {0}")]
    Detector(#[from] DetectorError),
    #[error("render error: {0}")]
    Render(#[from] RenderError),
    #[error("recognition client error: {0}")]
    Remote(#[from] RemoteError),
    #[error("capture source closed")]
    CaptureLost,
    #[error("no frame has been rendered yet")]
    NothingRendered,
    #[error("engine thread exited")]
    ChannelClosed,
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Snapshot of the engine's counters.
#[derive(Debug, Clone, Serialize)]
pub struct EngineStatus {
    pub stats: PipelineStats,
    pub surface_width: u32,
    pub surface_height: u32,
    pub recognitions_in_flight: usize,
}

/// Messages sent from D-Bus handlers to the engine loop.
enum EngineRequest {
    Click {
        pointer: Point,
        display_size: (f32, f32),
        reply: oneshot::Sender<Option<String>>,
    },
    Status {
        reply: oneshot::Sender<EngineStatus>,
    },
    Snapshot {
        path: PathBuf,
        reply: oneshot::Sender<Result<(), EngineError>>,
    },
    Shutdown,
}

/// Clone-safe handle to the engine loop.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineRequest>,
}

impl EngineHandle {
    /// Resolve a pointer press in display space. Returns the opened identity id.
    pub async fn click(
        &self,
        pointer: Point,
        display_size: (f32, f32),
    ) -> Result<Option<String>, EngineError> {
        let (reply, rx) = oneshot::channel();
        self.send(EngineRequest::Click {
            pointer,
            display_size,
            reply,
        })
        .await?;
        rx.await.map_err(|_| EngineError::ChannelClosed)
    }

    pub async fn status(&self) -> Result<EngineStatus, EngineError> {
        let (reply, rx) = oneshot::channel();
        self.send(EngineRequest::Status { reply }).await?;
        rx.await.map_err(|_| EngineError::ChannelClosed)
    }

    /// Write the last drawn overlay to `path`.
    pub async fn snapshot(&self, path: PathBuf) -> Result<(), EngineError> {
        let (reply, rx) = oneshot::channel();
        self.send(EngineRequest::Snapshot { path, reply }).await?;
        rx.await.map_err(|_| EngineError::ChannelClosed)?
    }

    /// Ask the loop to stop. In-flight recognitions are left to finish and dropped.
    pub async fn shutdown(&self) -> Result<(), EngineError> {
        self.send(EngineRequest::Shutdown).await
    }

    async fn send(&self, request: EngineRequest) -> Result<(), EngineError> {
        self.tx
            .send(request)
            .await
            .map_err(|_| EngineError::ChannelClosed)
    }
}

/// Uploads a frame and returns the backend's identities.
pub trait RecognitionBackend: Clone + Send + 'static {
    fn recognize(
        &self,
        frame: Arc<Frame>,
    ) -> impl Future<Output = anyhow::Result<Vec<RecognitionRecord>>> + Send;
}

/// Encodes frames as JPEG and sends them to the HTTP backend.
#[derive(Clone)]
pub struct RemoteBackend {
    client: RecognitionClient,
}

impl RemoteBackend {
    pub fn new(client: RecognitionClient) -> Self {
        Self { client }
    }
}

impl RecognitionBackend for RemoteBackend {
    async fn recognize(&self, frame: Arc<Frame>) -> anyhow::Result<Vec<RecognitionRecord>> {
        let jpeg =
            tokio::task::spawn_blocking(move || frame.encode_jpeg(UPLOAD_JPEG_QUALITY)).await??;
        Ok(self.client.recognize(jpeg).await?)
    }
}

/// Tick periods of the engine loop.
#[derive(Debug, Clone, Copy)]
pub struct Timing {
    pub render: Duration,
    pub recognition: Duration,
}

/// A running engine: its handle and the loop's final result.
pub struct Engine {
    pub handle: EngineHandle,
    pub exited: oneshot::Receiver<Result<(), EngineError>>,
}

/// Spawn the engine on a dedicated OS thread.
///
/// Opens the camera, loads the detector and builds the recognition client
/// before returning, so a missing device or model fails startup.
pub fn spawn_engine(config: &Config) -> Result<Engine, EngineError> {
    let camera = Camera::open(
        &config.camera_device,
        config.capture_width,
        config.capture_height,
    )?;

    let model_path = config.scrfd_model_path();
    let detector = ScrfdDetector::load(&model_path, config.detector_threshold)?;
    tracing::info!(path = %model_path, "SCRFD detector loaded");

    let font = config
        .font_path
        .as_deref()
        .map(ImageSurface::load_font)
        .transpose()?;
    if font.is_none() {
        tracing::info!("no label font configured; drawing label plates without text");
    }

    let client = RecognitionClient::new(config.api_url.clone(), config.request_timeout())?;
    tracing::info!(url = %client.base_url(), "recognition backend configured");

    let pipeline = OverlayPipeline::new(
        detector,
        OverlayRenderer::new(OverlayStyle::default(), config.debug_overlay),
        ImageSurface::new(font),
        BrowserNavigator::new(config.profile_url.clone()),
        config.correlator(),
    );
    let timing = Timing {
        render: config.render_period(),
        recognition: config.recognition_period(),
    };

    let capture = CaptureHandle::spawn(camera)?;
    let frames = capture.frames();
    let (tx, rx) = mpsc::channel::<EngineRequest>(16);
    let (exit_tx, exit_rx) = oneshot::channel();

    std::thread::Builder::new()
        .name("facelink-engine".into())
        .spawn(move || {
            tracing::info!("engine thread started");
            let result = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .map_err(EngineError::Io)
                .and_then(|rt| {
                    rt.block_on(run_loop(
                        pipeline,
                        frames,
                        RemoteBackend::new(client),
                        rx,
                        timing,
                    ))
                });

            let result = match (result, capture.stop()) {
                (Err(EngineError::CaptureLost), Err(e)) => Err(EngineError::Camera(e)),
                (result, Err(e)) => {
                    tracing::debug!(error = %e, "capture stopped with error");
                    result
                }
                (result, Ok(())) => result,
            };
            tracing::info!("engine thread exiting");
            let _ = exit_tx.send(result);
        })?;

    Ok(Engine {
        handle: EngineHandle { tx },
        exited: exit_rx,
    })
}

/// The engine loop: sole owner of the pipeline.
///
/// Render ticks, recognition ticks, recognition responses and requests are
/// multiplexed here, so the batch and the rendered list have one writer.
async fn run_loop<D, N, B>(
    mut pipeline: OverlayPipeline<D, ImageSurface, N>,
    frames: FrameReceiver,
    backend: B,
    mut requests: mpsc::Receiver<EngineRequest>,
    timing: Timing,
) -> Result<(), EngineError>
where
    D: FaceDetector + Send + 'static,
    N: Navigator + Send + 'static,
    B: RecognitionBackend,
{
    let mut render = interval(timing.render);
    render.set_missed_tick_behavior(MissedTickBehavior::Skip);
    // First recognition one period in, once the camera has settled.
    let mut recognition = interval_at(Instant::now() + timing.recognition, timing.recognition);
    recognition.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let (response_tx, mut responses) =
        mpsc::channel::<(u64, anyhow::Result<Vec<RecognitionRecord>>)>(8);
    let mut in_flight = 0usize;

    tracing::info!(
        render_ms = timing.render.as_millis() as u64,
        recognition_ms = timing.recognition.as_millis() as u64,
        "engine loop running"
    );

    loop {
        tokio::select! {
            _ = render.tick() => {
                if frames.has_changed().is_err() {
                    tracing::error!("capture source closed; stopping engine");
                    return Err(EngineError::CaptureLost);
                }
                let frame = frames.borrow().clone();
                let view = frame
                    .as_deref()
                    .map(|f| FrameView::new(&f.data, f.width, f.height));
                pipeline.render_tick(view);
            }
            _ = recognition.tick() => {
                let frame = frames.borrow().clone();
                let Some(frame) = frame.filter(|f| f.is_ready()) else {
                    tracing::debug!("no ready frame; skipping recognition tick");
                    continue;
                };
                let sequence = pipeline.begin_recognition();
                in_flight += 1;
                tracing::debug!(
                    sequence,
                    frame = frame.sequence,
                    frame_age_ms = frame.age().as_millis() as u64,
                    "recognition request issued"
                );

                let backend = backend.clone();
                let tx = response_tx.clone();
                tokio::spawn(async move {
                    let result = backend.recognize(frame).await;
                    // The loop may be gone; the response is then dropped.
                    let _ = tx.send((sequence, result)).await;
                });
            }
            Some((sequence, result)) = responses.recv() => {
                in_flight = in_flight.saturating_sub(1);
                pipeline.apply_recognition(sequence, result.map_err(|e| format!("{e:#}")));
            }
            request = requests.recv() => match request {
                None | Some(EngineRequest::Shutdown) => {
                    tracing::info!(in_flight, "engine loop stopping");
                    return Ok(());
                }
                Some(EngineRequest::Click { pointer, display_size, reply }) => {
                    let _ = reply.send(pipeline.click(pointer, display_size));
                }
                Some(EngineRequest::Status { reply }) => {
                    let surface = pipeline.surface();
                    let _ = reply.send(EngineStatus {
                        stats: pipeline.stats().clone(),
                        surface_width: surface.width(),
                        surface_height: surface.height(),
                        recognitions_in_flight: in_flight,
                    });
                }
                Some(EngineRequest::Snapshot { path, reply }) => {
                    let _ = reply.send(snapshot(pipeline.surface(), &path));
                }
            },
        }
    }
}

fn snapshot(surface: &ImageSurface, path: &std::path::Path) -> Result<(), EngineError> {
    if surface.width() == 0 || surface.height() == 0 {
        return Err(EngineError::NothingRendered);
    }
    surface.save(path)?;
    tracing::info!(path = %path.display(), "overlay snapshot written");
    Ok(())
}
