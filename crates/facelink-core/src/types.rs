use serde::{Deserialize, Serialize};

/// A point in pixel space.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    /// Euclidean distance to another point.
    pub fn distance(&self, other: &Point) -> f32 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

/// Axis-aligned rectangle: origin at the top-left corner plus extent.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Rect {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Build from the recognizer's `[x, y, w, h]` coordinate layout.
    pub fn from_coords(coords: [f32; 4]) -> Self {
        Self::new(coords[0], coords[1], coords[2], coords[3])
    }

    pub fn center(&self) -> Point {
        Point::new(self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    pub fn right(&self) -> f32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f32 {
        self.y + self.height
    }

    /// Multiply origin and extent by independent per-axis factors.
    pub fn scaled(&self, scale_x: f32, scale_y: f32) -> Rect {
        Rect::new(
            self.x * scale_x,
            self.y * scale_y,
            self.width * scale_x,
            self.height * scale_y,
        )
    }

    /// Finite origin and strictly positive, finite extent.
    pub fn is_well_formed(&self) -> bool {
        self.x.is_finite()
            && self.y.is_finite()
            && self.width.is_finite()
            && self.height.is_finite()
            && self.width > 0.0
            && self.height > 0.0
    }

    /// Inclusive point-in-rectangle test.
    pub fn contains(&self, point: Point) -> bool {
        point.x >= self.x && point.x <= self.right() && point.y >= self.y && point.y <= self.bottom()
    }
}

/// A face found by the local detector in the current frame. Display space, no identity.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectedFace {
    pub rect: Rect,
}

/// One identity returned by the remote recognition backend.
///
/// Field names follow the backend payload (`name`, `clerk_id`, `coords`, `face`);
/// the camel-case names are accepted as aliases.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecognitionRecord {
    #[serde(rename = "name", alias = "identityLabel", alias = "identity_label")]
    pub identity_label: String,
    #[serde(rename = "clerk_id", alias = "identityId", alias = "identity_id")]
    pub identity_id: String,
    /// Backend score. Lower means a closer match.
    pub confidence: f32,
    /// `[x, y, w, h]` in recognizer space.
    pub coords: [f32; 4],
    /// Encoded face crop, passed through untouched.
    #[serde(
        rename = "face",
        alias = "rawFacePatch",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub raw_face_patch: Option<serde_json::Value>,
}

impl RecognitionRecord {
    /// Rectangle in recognizer space.
    pub fn rect(&self) -> Rect {
        Rect::from_coords(self.coords)
    }
}

/// Identity attached to a detected face after correlation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchedIdentity {
    pub label: String,
    pub id: String,
    pub confidence: f32,
    /// Centroid distance in display pixels.
    pub distance: f32,
}

impl MatchedIdentity {
    /// Text shown next to the face: the name, or the id when the name is blank.
    pub fn display_label(&self) -> &str {
        if self.label.trim().is_empty() {
            &self.id
        } else {
            &self.label
        }
    }
}

/// A detected face with its correlated identity, if any. Rebuilt every frame.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CorrelatedFace {
    pub rect: Rect,
    pub identity: Option<MatchedIdentity>,
}

impl CorrelatedFace {
    pub fn is_matched(&self) -> bool {
        self.identity.is_some()
    }
}

/// Borrowed grayscale frame (`width * height` bytes, row-major).
#[derive(Debug, Clone, Copy)]
pub struct FrameView<'a> {
    pub data: &'a [u8],
    pub width: u32,
    pub height: u32,
}

impl<'a> FrameView<'a> {
    pub fn new(data: &'a [u8], width: u32, height: u32) -> Self {
        Self {
            data,
            width,
            height,
        }
    }

    /// Nonzero dimensions backed by a full pixel buffer.
    pub fn is_ready(&self) -> bool {
        self.width > 0
            && self.height > 0
            && self.data.len() >= self.width as usize * self.height as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rect_center() {
        let r = Rect::new(100.0, 100.0, 50.0, 50.0);
        assert_eq!(r.center(), Point::new(125.0, 125.0));
    }

    #[test]
    fn test_rect_scaled_by_one_is_identity() {
        let r = Rect::from_coords([28.0, 28.0, 12.0, 12.0]);
        assert_eq!(r.scaled(1.0, 1.0), r);
    }

    #[test]
    fn test_rect_scaled_independent_axes() {
        let r = Rect::from_coords([28.0, 10.0, 12.0, 6.0]);
        assert_eq!(r.scaled(4.0, 2.0), Rect::new(112.0, 20.0, 48.0, 12.0));
    }

    #[test]
    fn test_rect_well_formed() {
        assert!(Rect::new(0.0, 0.0, 1.0, 1.0).is_well_formed());
        assert!(!Rect::new(0.0, 0.0, 0.0, 1.0).is_well_formed());
        assert!(!Rect::new(0.0, 0.0, -3.0, 1.0).is_well_formed());
        assert!(!Rect::new(f32::NAN, 0.0, 1.0, 1.0).is_well_formed());
        assert!(!Rect::new(0.0, 0.0, f32::INFINITY, 1.0).is_well_formed());
    }

    #[test]
    fn test_rect_contains_edges() {
        let r = Rect::new(10.0, 10.0, 20.0, 20.0);
        assert!(r.contains(Point::new(10.0, 10.0)));
        assert!(r.contains(Point::new(30.0, 30.0)));
        assert!(!r.contains(Point::new(30.1, 20.0)));
        assert!(!r.contains(Point::new(f32::NAN, 20.0)));
    }

    #[test]
    fn test_record_parses_backend_names() {
        let json = r#"{"name":"Ana","clerk_id":"user_1","confidence":0.42,"coords":[1,2,3,4]}"#;
        let rec: RecognitionRecord = serde_json::from_str(json).unwrap();
        assert_eq!(rec.identity_label, "Ana");
        assert_eq!(rec.identity_id, "user_1");
        assert_eq!(rec.coords, [1.0, 2.0, 3.0, 4.0]);
        assert!(rec.raw_face_patch.is_none());
    }

    #[test]
    fn test_record_parses_camel_case_aliases() {
        let json = r#"{"identityLabel":"Bo","identityId":"u2","confidence":0.1,"coords":[0,0,1,1],"rawFacePatch":"aGk="}"#;
        let rec: RecognitionRecord = serde_json::from_str(json).unwrap();
        assert_eq!(rec.identity_label, "Bo");
        assert_eq!(rec.identity_id, "u2");
        assert_eq!(rec.raw_face_patch, Some(serde_json::json!("aGk=")));
    }

    #[test]
    fn test_display_label_falls_back_to_id() {
        let id = MatchedIdentity {
            label: "  ".into(),
            id: "user_9".into(),
            confidence: 0.3,
            distance: 1.0,
        };
        assert_eq!(id.display_label(), "user_9");
    }

    #[test]
    fn test_frame_view_readiness() {
        let data = vec![0u8; 6];
        assert!(FrameView::new(&data, 3, 2).is_ready());
        assert!(!FrameView::new(&data, 0, 2).is_ready());
        assert!(!FrameView::new(&data, 4, 2).is_ready());
    }
}
