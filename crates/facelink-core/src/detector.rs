//! Local per-frame face detection.
//!
//! [`FaceDetector`] is the opaque model capability; [`ScrfdDetector`] backs it
//! with SCRFD via ONNX Runtime. [`LocalDetector`] wraps any detector with the
//! per-tick contract: skip frames that are not ready, keep timestamps strictly
//! increasing, and never let a detector failure escape into the render loop.

use crate::types::{DetectedFace, FrameView, Rect};
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use thiserror::Error;

const SCRFD_INPUT_SIZE: usize = 640;
const SCRFD_MEAN: f32 = 127.5;
const SCRFD_STD: f32 = 128.0;
const SCRFD_NMS_THRESHOLD: f32 = 0.4;
const SCRFD_STRIDES: [usize; 3] = [8, 16, 32];
const SCRFD_ANCHORS_PER_CELL: usize = 2;

/// Default minimum SCRFD score for a candidate box.
pub const DEFAULT_SCORE_THRESHOLD: f32 = 0.5;

#[derive(Error, Debug)]
pub enum DetectorError {
    #[error("model file not found: {0}; download det_10g.onnx from insightface")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("frame not ready: {width}x{height} with {len} bytes")]
    FrameNotReady { width: u32, height: u32, len: usize },
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// A face-box model: given a frame and a monotonically increasing timestamp,
/// return zero or more boxes in frame pixel space.
pub trait FaceDetector {
    fn detect(
        &mut self,
        frame: FrameView<'_>,
        timestamp_ms: u64,
    ) -> Result<Vec<DetectedFace>, DetectorError>;
}

/// Scored box before suppression.
#[derive(Debug, Clone, Copy)]
struct Candidate {
    rect: Rect,
    score: f32,
}

/// Letterbox parameters for mapping model space back to the frame.
struct Letterbox {
    scale: f32,
    pad_x: f32,
    pad_y: f32,
}

impl Letterbox {
    fn fit(width: usize, height: usize, target: usize) -> Self {
        let scale = (target as f32 / width as f32).min(target as f32 / height as f32);
        let new_w = (width as f32 * scale).round();
        let new_h = (height as f32 * scale).round();
        Self {
            scale,
            pad_x: (target as f32 - new_w) / 2.0,
            pad_y: (target as f32 - new_h) / 2.0,
        }
    }

    fn to_frame(&self, x: f32, y: f32) -> (f32, f32) {
        ((x - self.pad_x) / self.scale, (y - self.pad_y) / self.scale)
    }
}

/// SCRFD face detector (box outputs only; landmarks are ignored).
pub struct ScrfdDetector {
    session: Session,
    score_threshold: f32,
    /// (score, bbox) output indices for strides 8, 16 and 32.
    stride_outputs: [(usize, usize); 3],
}

impl ScrfdDetector {
    /// Load the SCRFD ONNX model from the given path.
    pub fn load(model_path: &str, score_threshold: f32) -> Result<Self, DetectorError> {
        if !Path::new(model_path).exists() {
            return Err(DetectorError::ModelNotFound(model_path.to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(model_path)?;

        let output_names: Vec<String> = session
            .outputs()
            .iter()
            .map(|o| o.name().to_string())
            .collect();

        tracing::info!(
            path = model_path,
            outputs = ?output_names,
            score_threshold,
            "loaded SCRFD model"
        );

        if output_names.len() < 6 {
            return Err(DetectorError::InferenceFailed(format!(
                "SCRFD model needs score and bbox outputs for 3 strides, got {} outputs",
                output_names.len()
            )));
        }

        Ok(Self {
            session,
            score_threshold,
            stride_outputs: stride_output_indices(&output_names),
        })
    }

    fn run(&mut self, frame: FrameView<'_>) -> Result<Vec<Candidate>, DetectorError> {
        let (input, letterbox) = preprocess(frame);
        let outputs = self
            .session
            .run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let mut candidates = Vec::new();
        for (pos, &stride) in SCRFD_STRIDES.iter().enumerate() {
            let (score_idx, bbox_idx) = self.stride_outputs[pos];
            let (_, scores) = outputs[score_idx].try_extract_tensor::<f32>().map_err(|e| {
                DetectorError::InferenceFailed(format!("scores stride {stride}: {e}"))
            })?;
            let (_, bboxes) = outputs[bbox_idx].try_extract_tensor::<f32>().map_err(|e| {
                DetectorError::InferenceFailed(format!("bboxes stride {stride}: {e}"))
            })?;
            candidates.extend(decode_stride(
                scores,
                bboxes,
                stride,
                &letterbox,
                self.score_threshold,
            ));
        }
        Ok(nms(candidates, SCRFD_NMS_THRESHOLD))
    }
}

impl FaceDetector for ScrfdDetector {
    fn detect(
        &mut self,
        frame: FrameView<'_>,
        _timestamp_ms: u64,
    ) -> Result<Vec<DetectedFace>, DetectorError> {
        if !frame.is_ready() {
            return Err(DetectorError::FrameNotReady {
                width: frame.width,
                height: frame.height,
                len: frame.data.len(),
            });
        }
        Ok(self
            .run(frame)?
            .into_iter()
            .map(|c| DetectedFace { rect: c.rect })
            .collect())
    }
}

/// Map stride outputs by name (`score_8`, `bbox_16`, ...), falling back to the
/// standard export order `[scores 8/16/32, bboxes 8/16/32, kps ...]`.
fn stride_output_indices(names: &[String]) -> [(usize, usize); 3] {
    let find = |prefix: &str, stride: usize| {
        let target = format!("{prefix}_{stride}");
        names.iter().position(|n| n == &target)
    };

    let mut named = [(0, 0); 3];
    for (i, &stride) in SCRFD_STRIDES.iter().enumerate() {
        match (find("score", stride), find("bbox", stride)) {
            (Some(s), Some(b)) => named[i] = (s, b),
            _ => {
                tracing::debug!(?names, "SCRFD output names not recognized, using positional mapping");
                return [(0, 3), (1, 4), (2, 5)];
            }
        }
    }
    named
}

/// Letterbox a grayscale frame into a 1x3x640x640 tensor normalized for SCRFD.
fn preprocess(frame: FrameView<'_>) -> (Array4<f32>, Letterbox) {
    let width = frame.width as usize;
    let height = frame.height as usize;
    let letterbox = Letterbox::fit(width, height, SCRFD_INPUT_SIZE);

    let new_w = ((width as f32 * letterbox.scale).round() as usize).min(SCRFD_INPUT_SIZE);
    let new_h = ((height as f32 * letterbox.scale).round() as usize).min(SCRFD_INPUT_SIZE);
    let x0 = letterbox.pad_x.floor() as usize;
    let y0 = letterbox.pad_y.floor() as usize;
    let inv = 1.0 / letterbox.scale;

    // Padding is the mean pixel, which normalizes to 0.0.
    let mut tensor = Array4::<f32>::zeros((1, 3, SCRFD_INPUT_SIZE, SCRFD_INPUT_SIZE));

    for y in 0..new_h {
        let sy = ((y as f32 + 0.5) * inv - 0.5).max(0.0);
        let ya = (sy.floor() as usize).min(height - 1);
        let yb = (ya + 1).min(height - 1);
        let fy = sy - sy.floor();

        for x in 0..new_w {
            let sx = ((x as f32 + 0.5) * inv - 0.5).max(0.0);
            let xa = (sx.floor() as usize).min(width - 1);
            let xb = (xa + 1).min(width - 1);
            let fx = sx - sx.floor();

            let px = |yy: usize, xx: usize| frame.data[yy * width + xx] as f32;
            let top = px(ya, xa) * (1.0 - fx) + px(ya, xb) * fx;
            let bottom = px(yb, xa) * (1.0 - fx) + px(yb, xb) * fx;
            let value = (top * (1.0 - fy) + bottom * fy - SCRFD_MEAN) / SCRFD_STD;

            for c in 0..3 {
                tensor[[0, c, y0 + y, x0 + x]] = value;
            }
        }
    }

    (tensor, letterbox)
}

/// Decode anchor-free box offsets for one stride level into frame space.
fn decode_stride(
    scores: &[f32],
    bboxes: &[f32],
    stride: usize,
    letterbox: &Letterbox,
    threshold: f32,
) -> Vec<Candidate> {
    let grid = SCRFD_INPUT_SIZE / stride;
    let anchors = grid * grid * SCRFD_ANCHORS_PER_CELL;
    let s = stride as f32;

    (0..anchors)
        .filter_map(|idx| {
            let score = scores.get(idx).copied()?;
            if score <= threshold {
                return None;
            }
            let offsets = bboxes.get(idx * 4..idx * 4 + 4)?;
            let cell = idx / SCRFD_ANCHORS_PER_CELL;
            let ax = (cell % grid) as f32 * s;
            let ay = (cell / grid) as f32 * s;

            let (x1, y1) = letterbox.to_frame(ax - offsets[0] * s, ay - offsets[1] * s);
            let (x2, y2) = letterbox.to_frame(ax + offsets[2] * s, ay + offsets[3] * s);
            Some(Candidate {
                rect: Rect::new(x1, y1, x2 - x1, y2 - y1),
                score,
            })
        })
        .collect()
}

/// Greedy non-maximum suppression, highest score first.
fn nms(mut candidates: Vec<Candidate>, iou_threshold: f32) -> Vec<Candidate> {
    candidates.sort_by(|a, b| b.score.total_cmp(&a.score));

    let mut keep: Vec<Candidate> = Vec::with_capacity(candidates.len());
    for c in candidates {
        if keep.iter().all(|k| iou(&k.rect, &c.rect) <= iou_threshold) {
            keep.push(c);
        }
    }
    keep
}

fn iou(a: &Rect, b: &Rect) -> f32 {
    let inter_w = (a.right().min(b.right()) - a.x.max(b.x)).max(0.0);
    let inter_h = (a.bottom().min(b.bottom()) - a.y.max(b.y)).max(0.0);
    let inter = inter_w * inter_h;
    let union = a.width * a.height + b.width * b.height - inter;
    if union > 0.0 {
        inter / union
    } else {
        0.0
    }
}

/// Per-tick wrapper around a [`FaceDetector`].
pub struct LocalDetector<D> {
    inner: D,
    last_timestamp: Option<u64>,
}

impl<D: FaceDetector> LocalDetector<D> {
    pub fn new(inner: D) -> Self {
        Self {
            inner,
            last_timestamp: None,
        }
    }

    /// Detect faces for this tick.
    ///
    /// Returns `None` when there is no ready frame (the tick should be skipped).
    /// Detector failures are logged and reported as an empty detection list.
    pub fn detect(
        &mut self,
        frame: Option<FrameView<'_>>,
        now_ms: u64,
    ) -> Option<Vec<DetectedFace>> {
        let frame = frame.filter(|f| f.is_ready())?;

        let timestamp = match self.last_timestamp {
            Some(last) if now_ms <= last => last + 1,
            _ => now_ms,
        };
        self.last_timestamp = Some(timestamp);

        match self.inner.detect(frame, timestamp) {
            Ok(faces) => Some(faces),
            Err(e) => {
                tracing::warn!(error = %e, "local detection failed; treating frame as empty");
                Some(Vec::new())
            }
        }
    }

    pub fn inner(&self) -> &D {
        &self.inner
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cand(x: f32, y: f32, w: f32, h: f32, score: f32) -> Candidate {
        Candidate {
            rect: Rect::new(x, y, w, h),
            score,
        }
    }

    #[test]
    fn test_iou_identical() {
        let a = Rect::new(0.0, 0.0, 100.0, 100.0);
        assert!((iou(&a, &a) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_iou_partial() {
        let a = Rect::new(0.0, 0.0, 10.0, 10.0);
        let b = Rect::new(5.0, 0.0, 10.0, 10.0);
        assert!((iou(&a, &b) - 50.0 / 150.0).abs() < 1e-6);
    }

    #[test]
    fn test_nms_suppresses_overlapping() {
        let result = nms(
            vec![
                cand(5.0, 5.0, 100.0, 100.0, 0.8),
                cand(0.0, 0.0, 100.0, 100.0, 0.9),
                cand(200.0, 200.0, 50.0, 50.0, 0.7),
            ],
            0.4,
        );
        assert_eq!(result.len(), 2);
        assert!((result[0].score - 0.9).abs() < 1e-6);
        assert!((result[1].score - 0.7).abs() < 1e-6);
    }

    #[test]
    fn test_letterbox_maps_back_to_frame() {
        let lb = Letterbox::fit(320, 240, 640);
        let (x, y) = (100.0f32, 50.0f32);
        let (fx, fy) = lb.to_frame(x * lb.scale + lb.pad_x, y * lb.scale + lb.pad_y);
        assert!((fx - x).abs() < 0.1, "x: {fx}");
        assert!((fy - y).abs() < 0.1, "y: {fy}");
    }

    #[test]
    fn test_decode_stride_threshold_and_geometry() {
        // 640x640 frame: letterbox is identity.
        let lb = Letterbox::fit(640, 640, 640);
        let stride = 32;
        let anchors = (640 / stride) * (640 / stride) * SCRFD_ANCHORS_PER_CELL;
        let mut scores = vec![0.0f32; anchors];
        let mut bboxes = vec![0.0f32; anchors * 4];
        // Anchor 2 → cell 1 → (x=32, y=0).
        scores[2] = 0.9;
        bboxes[8..12].copy_from_slice(&[0.5, 0.0, 1.0, 2.0]);
        scores[3] = 0.3;

        let out = decode_stride(&scores, &bboxes, stride, &lb, 0.5);
        assert_eq!(out.len(), 1);
        let r = out[0].rect;
        assert!((r.x - 16.0).abs() < 1e-4);
        assert!((r.y - 0.0).abs() < 1e-4);
        assert!((r.width - 48.0).abs() < 1e-4);
        assert!((r.height - 64.0).abs() < 1e-4);
    }

    #[test]
    fn test_stride_output_indices_named_and_fallback() {
        let names: Vec<String> = [
            "bbox_8", "score_8", "bbox_16", "score_16", "bbox_32", "score_32",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();
        assert_eq!(stride_output_indices(&names), [(1, 0), (3, 2), (5, 4)]);

        let generic: Vec<String> = (0..9).map(|i: usize| i.to_string()).collect();
        assert_eq!(stride_output_indices(&generic), [(0, 3), (1, 4), (2, 5)]);
    }

    #[test]
    fn test_preprocess_pads_with_zero() {
        let data = vec![255u8; 64 * 32];
        let (tensor, lb) = preprocess(FrameView::new(&data, 64, 32));
        assert_eq!(tensor.shape(), &[1, 3, 640, 640]);
        assert_eq!(tensor[[0, 0, 0, 0]], 0.0);
        let inside = tensor[[0, 1, lb.pad_y as usize + 10, 10]];
        assert!((inside - (255.0 - SCRFD_MEAN) / SCRFD_STD).abs() < 1e-4);
    }

    struct Scripted {
        calls: Vec<u64>,
        fail: bool,
    }

    impl FaceDetector for Scripted {
        fn detect(
            &mut self,
            _frame: FrameView<'_>,
            timestamp_ms: u64,
        ) -> Result<Vec<DetectedFace>, DetectorError> {
            self.calls.push(timestamp_ms);
            if self.fail {
                return Err(DetectorError::InferenceFailed("boom".into()));
            }
            Ok(vec![DetectedFace {
                rect: Rect::new(1.0, 1.0, 2.0, 2.0),
            }])
        }
    }

    #[test]
    fn test_local_detector_skips_unready_frames() {
        let mut det = LocalDetector::new(Scripted { calls: vec![], fail: false });
        assert!(det.detect(None, 1).is_none());
        let empty: [u8; 0] = [];
        assert!(det.detect(Some(FrameView::new(&empty, 0, 0)), 2).is_none());
        assert!(det.inner().calls.is_empty());
    }

    #[test]
    fn test_local_detector_timestamps_strictly_increase() {
        let data = vec![0u8; 4];
        let frame = FrameView::new(&data, 2, 2);
        let mut det = LocalDetector::new(Scripted { calls: vec![], fail: false });
        det.detect(Some(frame), 10);
        det.detect(Some(frame), 10);
        det.detect(Some(frame), 5);
        det.detect(Some(frame), 50);
        assert_eq!(det.inner().calls, vec![10, 11, 12, 50]);
    }

    #[test]
    fn test_local_detector_swallows_errors() {
        let data = vec![0u8; 4];
        let mut det = LocalDetector::new(Scripted { calls: vec![], fail: true });
        let out = det.detect(Some(FrameView::new(&data, 2, 2)), 1);
        assert_eq!(out, Some(vec![]));
    }
}
