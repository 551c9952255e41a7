//! Synchronous overlay pipeline driven by the render and recognition ticks.
//!
//! One owner, two inputs: the frame handed to [`OverlayPipeline::render_tick`]
//! and the recognition responses offered through
//! [`OverlayPipeline::apply_recognition`]. The batch and the last rendered
//! list are replaced whole, never edited in place.

use crate::batch::{ApplyOutcome, BatchCell, RecognitionBatch};
use crate::correlator::{correlate, CorrelatorConfig};
use crate::detector::{FaceDetector, LocalDetector};
use crate::hit_test::{self, Navigator};
use crate::render::{OverlayRenderer, Surface};
use crate::types::{CorrelatedFace, FrameView, Point, RecognitionRecord};
use serde::Serialize;
use std::fmt::Display;
use std::sync::Arc;
use std::time::Instant;

/// Result of one render tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// No usable frame; nothing was drawn.
    NotReady,
    Rendered { detected: usize, matched: usize },
}

/// Counters exposed through the daemon's status call.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PipelineStats {
    pub frames_rendered: u64,
    pub ticks_not_ready: u64,
    pub last_detected: usize,
    pub last_matched: usize,
    pub requests_issued: u64,
    pub responses_applied: u64,
    pub responses_stale: u64,
    pub responses_failed: u64,
    pub applied_sequence: u64,
    pub batch_size: usize,
}

pub struct OverlayPipeline<D, S, N> {
    detector: LocalDetector<D>,
    renderer: OverlayRenderer,
    surface: S,
    navigator: N,
    correlator: CorrelatorConfig,
    batch: BatchCell,
    rendered: Arc<[CorrelatedFace]>,
    started: Instant,
    stats: PipelineStats,
}

impl<D, S, N> OverlayPipeline<D, S, N>
where
    D: FaceDetector,
    S: Surface,
    N: Navigator,
{
    pub fn new(
        detector: D,
        renderer: OverlayRenderer,
        surface: S,
        navigator: N,
        correlator: CorrelatorConfig,
    ) -> Self {
        Self {
            detector: LocalDetector::new(detector),
            renderer,
            surface,
            navigator,
            correlator,
            batch: BatchCell::new(),
            rendered: Vec::new().into(),
            started: Instant::now(),
            stats: PipelineStats::default(),
        }
    }

    /// Detect, correlate against the current batch, and draw.
    pub fn render_tick(&mut self, frame: Option<FrameView<'_>>) -> TickOutcome {
        let now_ms = self.started.elapsed().as_millis() as u64;
        let (Some(frame), Some(detections)) = (frame, self.detector.detect(frame, now_ms)) else {
            self.stats.ticks_not_ready += 1;
            tracing::trace!("frame not ready; skipping tick");
            return TickOutcome::NotReady;
        };

        let batch = self.batch.current();
        let faces = correlate(&detections, &batch.records, &self.correlator);
        self.renderer
            .render(&mut self.surface, frame, &faces, &batch.records, &self.correlator);

        let matched = faces.iter().filter(|f| f.is_matched()).count();
        self.rendered = faces.into();
        self.stats.frames_rendered += 1;
        self.stats.last_detected = detections.len();
        self.stats.last_matched = matched;

        TickOutcome::Rendered {
            detected: detections.len(),
            matched,
        }
    }

    /// Allocate a sequence number for a recognition request about to be sent.
    pub fn begin_recognition(&mut self) -> u64 {
        self.stats.requests_issued += 1;
        self.batch.issue()
    }

    /// Offer a completed recognition round trip.
    ///
    /// Failures keep the stored batch; responses older than the applied one
    /// are discarded.
    pub fn apply_recognition<E: Display>(
        &mut self,
        sequence: u64,
        result: Result<Vec<RecognitionRecord>, E>,
    ) -> ApplyOutcome {
        let records = match result {
            Ok(records) => records,
            Err(e) => {
                self.stats.responses_failed += 1;
                tracing::warn!(sequence, error = %e, "recognition failed; keeping previous batch");
                return ApplyOutcome::Retained;
            }
        };

        let count = records.len();
        let outcome = self.batch.apply(sequence, records);
        match outcome {
            ApplyOutcome::Applied => {
                self.stats.responses_applied += 1;
                self.stats.applied_sequence = sequence;
                self.stats.batch_size = count;
                tracing::debug!(sequence, records = count, "recognition batch applied");
            }
            ApplyOutcome::Stale { applied } => {
                self.stats.responses_stale += 1;
                tracing::debug!(sequence, applied, "discarding stale recognition response");
            }
            ApplyOutcome::Retained => {}
        }
        outcome
    }

    /// Resolve a pointer position (display space) against the last rendered list.
    pub fn click(&self, pointer: Point, display_size: (f32, f32)) -> Option<String> {
        hit_test::click(
            &self.navigator,
            pointer,
            display_size,
            (self.surface.width(), self.surface.height()),
            &self.rendered,
        )
    }

    /// Correlated faces from the last completed draw.
    pub fn rendered(&self) -> Arc<[CorrelatedFace]> {
        Arc::clone(&self.rendered)
    }

    pub fn batch(&self) -> Arc<RecognitionBatch> {
        self.batch.current()
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    pub fn stats(&self) -> &PipelineStats {
        &self.stats
    }
}
