//! Nearest-centroid correlation between local detections and remote identities.
//!
//! The correlator is a pure function of the current detections and the
//! current recognition batch. It runs fresh on every render tick.

use crate::types::{CorrelatedFace, DetectedFace, MatchedIdentity, RecognitionRecord};

/// Recognizer space is smaller than display space by this factor on each axis.
pub const DEFAULT_SCALE: f32 = 4.0;
/// Centroid distance (display pixels) at or beyond which a match is rejected.
pub const DEFAULT_MAX_DISTANCE: f32 = 200.0;
/// Highest backend score still accepted as a match (lower is better).
pub const DEFAULT_CONFIDENCE_CEILING: f32 = 0.8;

/// Tunable gates and the recognizer-to-display scale.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CorrelatorConfig {
    pub scale_x: f32,
    pub scale_y: f32,
    pub max_distance: f32,
    pub confidence_ceiling: f32,
}

impl Default for CorrelatorConfig {
    fn default() -> Self {
        Self {
            scale_x: DEFAULT_SCALE,
            scale_y: DEFAULT_SCALE,
            max_distance: DEFAULT_MAX_DISTANCE,
            confidence_ceiling: DEFAULT_CONFIDENCE_CEILING,
        }
    }
}

impl CorrelatorConfig {
    /// Whether a score falls inside `[0, confidence_ceiling]`. NaN never does.
    pub fn accepts_confidence(&self, confidence: f32) -> bool {
        (0.0..=self.confidence_ceiling).contains(&confidence)
    }
}

/// Correlate every detected face with the nearest recognition record.
///
/// Produces exactly one entry per detection, in detection order. Records whose
/// rescaled geometry is degenerate are skipped. Equidistant records resolve to
/// whichever comes first in the batch.
pub fn correlate(
    detections: &[DetectedFace],
    records: &[RecognitionRecord],
    config: &CorrelatorConfig,
) -> Vec<CorrelatedFace> {
    detections
        .iter()
        .map(|face| CorrelatedFace {
            rect: face.rect,
            identity: best_match(face, records, config),
        })
        .collect()
}

fn best_match(
    face: &DetectedFace,
    records: &[RecognitionRecord],
    config: &CorrelatorConfig,
) -> Option<MatchedIdentity> {
    let center = face.rect.center();
    if !center.is_finite() {
        return None;
    }

    let mut nearest: Option<(&RecognitionRecord, f32)> = None;
    for record in records {
        let rescaled = record.rect().scaled(config.scale_x, config.scale_y);
        if !rescaled.is_well_formed() {
            tracing::trace!(id = %record.identity_id, coords = ?record.coords, "skipping degenerate record");
            continue;
        }
        let distance = center.distance(&rescaled.center());
        if !distance.is_finite() {
            continue;
        }
        if nearest.map_or(true, |(_, best)| distance < best) {
            nearest = Some((record, distance));
        }
    }

    let (record, distance) = nearest?;
    if distance < config.max_distance && config.accepts_confidence(record.confidence) {
        Some(MatchedIdentity {
            label: record.identity_label.clone(),
            id: record.identity_id.clone(),
            confidence: record.confidence,
            distance,
        })
    } else {
        None
    }
}
