//! facelink-core: Live face-overlay correlation engine.
//!
//! Local SCRFD detection every frame, nearest-centroid correlation against the
//! latest remote recognition batch, overlay rendering, and click hit-testing.

pub mod batch;
pub mod correlator;
pub mod detector;
pub mod pipeline;
pub mod render;
pub mod types;

pub use batch::{ApplyOutcome, BatchCell, RecognitionBatch};
pub use correlator::{correlate, CorrelatorConfig};
pub use detector::{FaceDetector, LocalDetector, ScrfdDetector};
pub use hit_test::Navigator;
pub use pipeline::{OverlayPipeline, PipelineStats, TickOutcome};
pub use render::{ImageSurface, OverlayRenderer, OverlayStyle, Surface};
pub use types::{
    CorrelatedFace, DetectedFace, FrameView, MatchedIdentity, Point, RecognitionRecord, Rect,
};

use std::path::PathBuf;

/// Default directory for ONNX models: `$XDG_DATA_HOME/facelink/models`.
pub fn default_model_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".local/share")
        })
        .join("facelink/models")
}
