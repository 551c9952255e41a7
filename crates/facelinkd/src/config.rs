use facelink_core::correlator::{
    CorrelatorConfig, DEFAULT_CONFIDENCE_CEILING, DEFAULT_MAX_DISTANCE, DEFAULT_SCALE,
};
use facelink_core::detector::DEFAULT_SCORE_THRESHOLD;
use std::path::PathBuf;
use std::time::Duration;

/// Daemon configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// V4L2 device path (default: /dev/video0).
    pub camera_device: String,
    /// Capture size requested from the driver.
    pub capture_width: u32,
    pub capture_height: u32,
    /// Directory containing ONNX model files.
    pub model_dir: PathBuf,
    /// Minimum SCRFD score for a detection.
    pub detector_threshold: f32,
    /// Recognition backend base URL.
    pub api_url: String,
    pub request_timeout_secs: u64,
    /// Period of the recognition tick.
    pub recognition_interval_ms: u64,
    /// Render ticks per second.
    pub render_fps: u32,
    pub scale_x: f32,
    pub scale_y: f32,
    pub max_distance: f32,
    pub confidence_ceiling: f32,
    /// Profile pages live at `{profile_url}/{identity_id}`.
    pub profile_url: String,
    /// Optional TTF/OTF font for labels.
    pub font_path: Option<PathBuf>,
    /// Outline the rescaled recognizer rectangles too.
    pub debug_overlay: bool,
}

impl Config {
    /// Load configuration from `FACELINK_*` environment variables with defaults.
    pub fn from_env() -> Self {
        let model_dir = std::env::var("FACELINK_MODEL_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| facelink_core::default_model_dir());

        Self {
            camera_device: std::env::var("FACELINK_CAMERA_DEVICE")
                .unwrap_or_else(|_| "/dev/video0".to_string()),
            capture_width: env_u32("FACELINK_CAPTURE_WIDTH", 640),
            capture_height: env_u32("FACELINK_CAPTURE_HEIGHT", 480),
            model_dir,
            detector_threshold: env_f32("FACELINK_DETECTOR_THRESHOLD", DEFAULT_SCORE_THRESHOLD),
            api_url: std::env::var("FACELINK_API_URL")
                .unwrap_or_else(|_| facelink_remote::DEFAULT_API_URL.to_string()),
            request_timeout_secs: env_u64("FACELINK_REQUEST_TIMEOUT_SECS", 10),
            recognition_interval_ms: env_u64("FACELINK_RECOGNITION_INTERVAL_MS", 2000),
            render_fps: env_u32("FACELINK_RENDER_FPS", 30),
            scale_x: env_f32("FACELINK_SCALE_X", DEFAULT_SCALE),
            scale_y: env_f32("FACELINK_SCALE_Y", DEFAULT_SCALE),
            max_distance: env_f32("FACELINK_MAX_DISTANCE", DEFAULT_MAX_DISTANCE),
            confidence_ceiling: env_f32("FACELINK_CONFIDENCE_CEILING", DEFAULT_CONFIDENCE_CEILING),
            profile_url: std::env::var("FACELINK_PROFILE_URL")
                .unwrap_or_else(|_| "http://localhost:3000/users".to_string()),
            font_path: std::env::var("FACELINK_FONT_PATH").ok().map(PathBuf::from),
            debug_overlay: std::env::var("FACELINK_DEBUG_OVERLAY")
                .map(|v| v != "0")
                .unwrap_or(false),
        }
    }

    /// Path to the SCRFD detection model.
    pub fn scrfd_model_path(&self) -> String {
        self.model_dir
            .join("det_10g.onnx")
            .to_string_lossy()
            .into_owned()
    }

    pub fn correlator(&self) -> CorrelatorConfig {
        CorrelatorConfig {
            scale_x: self.scale_x,
            scale_y: self.scale_y,
            max_distance: self.max_distance,
            confidence_ceiling: self.confidence_ceiling,
        }
    }

    pub fn render_period(&self) -> Duration {
        Duration::from_secs_f64(1.0 / f64::from(self.render_fps.max(1)))
    }

    pub fn recognition_period(&self) -> Duration {
        Duration::from_millis(self.recognition_interval_ms.max(1))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

fn env_f32(key: &str, default: f32) -> f32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_u32(key: &str, default: u32) -> u32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
