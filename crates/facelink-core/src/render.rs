//! Overlay rendering: frame, boxes, identity labels and "no match" markers.
//!
//! Drawing goes through the [`Surface`] trait so the layout logic can be
//! tested without pixels. [`ImageSurface`] is the raster implementation.

use crate::correlator::CorrelatorConfig;
use crate::types::{CorrelatedFace, FrameView, RecognitionRecord, Rect};
use ab_glyph::{FontArc, PxScale};
use image::{imageops, DynamicImage, GrayImage, Rgba, RgbaImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut, text_size};
use std::path::Path;
use thiserror::Error;

pub type Color = Rgba<u8>;

#[derive(Error, Debug)]
pub enum RenderError {
    #[error("failed to read font {path}: {source}")]
    FontRead {
        path: String,
        source: std::io::Error,
    },
    #[error("invalid font data in {0}")]
    InvalidFont(String),
    #[error("image: {0}")]
    Image(#[from] image::ImageError),
}

/// Measured size of a text run, in surface pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TextExtent {
    pub width: f32,
    pub height: f32,
}

/// A 2D drawing target sized in surface pixels.
pub trait Surface {
    fn width(&self) -> u32;
    fn height(&self) -> u32;
    /// Resize the backing store; contents are discarded.
    fn resize(&mut self, width: u32, height: u32);
    fn clear(&mut self);
    fn draw_frame(&mut self, frame: FrameView<'_>);
    fn stroke_rect(&mut self, rect: Rect, color: Color);
    fn fill_rect(&mut self, rect: Rect, color: Color);
    fn measure_text(&self, text: &str, size: f32) -> TextExtent;
    /// Draw text with its top-left corner at (x, y).
    fn fill_text(&mut self, text: &str, x: f32, y: f32, size: f32, color: Color);
}

/// Colours and label metrics for the overlay.
#[derive(Debug, Clone)]
pub struct OverlayStyle {
    pub matched: Color,
    pub unmatched: Color,
    pub debug: Color,
    pub label_text: Color,
    pub label_background: Color,
    /// Horizontal gap between a box and its label.
    pub label_margin: f32,
    pub label_padding: f32,
    pub min_font_size: f32,
    /// Font size as a fraction of the box height.
    pub font_ratio: f32,
    pub no_match_text: String,
}

impl Default for OverlayStyle {
    fn default() -> Self {
        Self {
            matched: Rgba([0, 200, 83, 255]),
            unmatched: Rgba([229, 57, 53, 255]),
            debug: Rgba([255, 193, 7, 255]),
            label_text: Rgba([255, 255, 255, 255]),
            label_background: Rgba([0, 0, 0, 200]),
            label_margin: 10.0,
            label_padding: 4.0,
            min_font_size: 12.0,
            font_ratio: 0.2,
            no_match_text: "no match".to_string(),
        }
    }
}

impl OverlayStyle {
    /// Label font size for a box: `max(min_font_size, floor(height * font_ratio))`.
    pub fn font_size_for(&self, rect: &Rect) -> f32 {
        (rect.height * self.font_ratio).floor().max(self.min_font_size)
    }
}

/// Place a label plate of `extent` (plus padding) next to `anchor`.
///
/// Prefers the right side of the box, top-aligned; flips to the left side when
/// the right would overflow, then clamps into the surface.
pub fn place_label(
    anchor: &Rect,
    extent: TextExtent,
    padding: f32,
    margin: f32,
    surface_width: f32,
    surface_height: f32,
) -> Rect {
    let w = extent.width + padding * 2.0;
    let h = extent.height + padding * 2.0;

    let mut x = anchor.right() + margin;
    if x + w > surface_width {
        x = anchor.x - margin - w;
    }
    let x = x.min(surface_width - w).max(0.0);
    let y = anchor.y.min(surface_height - h).max(0.0);
    Rect::new(x, y, w, h)
}

/// Draws one frame of the overlay.
#[derive(Debug, Clone, Default)]
pub struct OverlayRenderer {
    pub style: OverlayStyle,
    /// Also outline the rescaled recognizer rectangles.
    pub debug: bool,
}

impl OverlayRenderer {
    pub fn new(style: OverlayStyle, debug: bool) -> Self {
        Self { style, debug }
    }

    /// Clear, draw the frame, then the debug layer and every correlated face.
    pub fn render<S: Surface>(
        &self,
        surface: &mut S,
        frame: FrameView<'_>,
        faces: &[CorrelatedFace],
        records: &[RecognitionRecord],
        correlator: &CorrelatorConfig,
    ) {
        if surface.width() != frame.width || surface.height() != frame.height {
            surface.resize(frame.width, frame.height);
        }
        surface.clear();
        surface.draw_frame(frame);

        if self.debug {
            for record in records {
                let rect = record.rect().scaled(correlator.scale_x, correlator.scale_y);
                if rect.is_well_formed() {
                    surface.stroke_rect(rect, self.style.debug);
                }
            }
        }

        for face in faces {
            self.draw_face(surface, face);
        }
    }

    fn draw_face<S: Surface>(&self, surface: &mut S, face: &CorrelatedFace) {
        if !face.rect.is_well_formed() {
            return;
        }
        let (text, color) = match &face.identity {
            Some(identity) => (identity.display_label(), self.style.matched),
            None => (self.style.no_match_text.as_str(), self.style.unmatched),
        };
        surface.stroke_rect(face.rect, color);

        let size = self.style.font_size_for(&face.rect);
        let extent = surface.measure_text(text, size);
        let plate = place_label(
            &face.rect,
            extent,
            self.style.label_padding,
            self.style.label_margin,
            surface.width() as f32,
            surface.height() as f32,
        );
        let background = if face.is_matched() {
            self.style.label_background
        } else {
            color
        };
        surface.fill_rect(plate, background);
        surface.fill_text(
            text,
            plate.x + self.style.label_padding,
            plate.y + self.style.label_padding,
            size,
            self.style.label_text,
        );
    }
}

/// RGBA raster surface drawn with `imageproc`.
///
/// Without a font, text is measured with a fixed advance and only the label
/// plates are drawn.
pub struct ImageSurface {
    image: RgbaImage,
    font: Option<FontArc>,
}

/// Advance per character, as a fraction of the font size, when no font is loaded.
const FALLBACK_ADVANCE: f32 = 0.6;

impl ImageSurface {
    pub fn new(font: Option<FontArc>) -> Self {
        Self {
            image: RgbaImage::new(0, 0),
            font,
        }
    }

    /// Load a TTF/OTF font for labels.
    pub fn load_font(path: &Path) -> Result<FontArc, RenderError> {
        let bytes = std::fs::read(path).map_err(|source| RenderError::FontRead {
            path: path.display().to_string(),
            source,
        })?;
        FontArc::try_from_vec(bytes)
            .map_err(|_| RenderError::InvalidFont(path.display().to_string()))
    }

    pub fn image(&self) -> &RgbaImage {
        &self.image
    }

    /// Write the current contents as an image file (format from the extension).
    pub fn save(&self, path: &Path) -> Result<(), RenderError> {
        self.image.save(path)?;
        Ok(())
    }

    fn pixel_rect(&self, rect: Rect) -> Option<imageproc::rect::Rect> {
        if !rect.is_well_formed() {
            return None;
        }
        let w = rect.width.round() as u32;
        let h = rect.height.round() as u32;
        if w == 0 || h == 0 {
            return None;
        }
        Some(imageproc::rect::Rect::at(rect.x.round() as i32, rect.y.round() as i32).of_size(w, h))
    }
}

impl Surface for ImageSurface {
    fn width(&self) -> u32 {
        self.image.width()
    }

    fn height(&self) -> u32 {
        self.image.height()
    }

    fn resize(&mut self, width: u32, height: u32) {
        self.image = RgbaImage::new(width, height);
    }

    fn clear(&mut self) {
        for p in self.image.pixels_mut() {
            *p = Rgba([0, 0, 0, 0]);
        }
    }

    fn draw_frame(&mut self, frame: FrameView<'_>) {
        if !frame.is_ready() {
            return;
        }
        let pixels = frame.width as usize * frame.height as usize;
        let Some(gray) = GrayImage::from_raw(frame.width, frame.height, frame.data[..pixels].to_vec())
        else {
            return;
        };
        // Clipped to the surface when the sizes differ.
        let rgba = DynamicImage::ImageLuma8(gray).to_rgba8();
        imageops::replace(&mut self.image, &rgba, 0, 0);
    }

    fn stroke_rect(&mut self, rect: Rect, color: Color) {
        if let Some(r) = self.pixel_rect(rect) {
            draw_hollow_rect_mut(&mut self.image, r, color);
            // Second, inset outline for a 2px stroke.
            if r.width() > 2 && r.height() > 2 {
                let inner = imageproc::rect::Rect::at(r.left() + 1, r.top() + 1)
                    .of_size(r.width() - 2, r.height() - 2);
                draw_hollow_rect_mut(&mut self.image, inner, color);
            }
        }
    }

    fn fill_rect(&mut self, rect: Rect, color: Color) {
        if let Some(r) = self.pixel_rect(rect) {
            draw_filled_rect_mut(&mut self.image, r, color);
        }
    }

    fn measure_text(&self, text: &str, size: f32) -> TextExtent {
        match &self.font {
            Some(font) => {
                let (w, h) = text_size(PxScale::from(size), font, text);
                TextExtent {
                    width: w as f32,
                    height: (h as f32).max(size),
                }
            }
            None => TextExtent {
                width: text.chars().count() as f32 * size * FALLBACK_ADVANCE,
                height: size,
            },
        }
    }

    fn fill_text(&mut self, text: &str, x: f32, y: f32, size: f32, color: Color) {
        if let Some(font) = &self.font {
            draw_text_mut(
                &mut self.image,
                color,
                x.round() as i32,
                y.round() as i32,
                PxScale::from(size),
                font,
                text,
            );
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;

    /// Draw call captured by [`RecordingSurface`].
    #[derive(Debug, Clone, PartialEq)]
    pub enum Op {
        Clear,
        Frame(u32, u32),
        Stroke(Rect, Color),
        Fill(Rect, Color),
        Text(String, f32, f32),
    }

    /// Surface that records draw calls; text is 8px per character.
    pub struct RecordingSurface {
        pub width: u32,
        pub height: u32,
        pub ops: Vec<Op>,
    }

    impl RecordingSurface {
        pub fn new() -> Self {
            Self {
                width: 0,
                height: 0,
                ops: Vec::new(),
            }
        }

        pub fn texts(&self) -> Vec<&str> {
            self.ops
                .iter()
                .filter_map(|op| match op {
                    Op::Text(t, _, _) => Some(t.as_str()),
                    _ => None,
                })
                .collect()
        }
    }

    impl Surface for RecordingSurface {
        fn width(&self) -> u32 {
            self.width
        }
        fn height(&self) -> u32 {
            self.height
        }
        fn resize(&mut self, width: u32, height: u32) {
            self.width = width;
            self.height = height;
        }
        fn clear(&mut self) {
            self.ops.clear();
            self.ops.push(Op::Clear);
        }
        fn draw_frame(&mut self, frame: FrameView<'_>) {
            self.ops.push(Op::Frame(frame.width, frame.height));
        }
        fn stroke_rect(&mut self, rect: Rect, color: Color) {
            self.ops.push(Op::Stroke(rect, color));
        }
        fn fill_rect(&mut self, rect: Rect, color: Color) {
            self.ops.push(Op::Fill(rect, color));
        }
        fn measure_text(&self, text: &str, size: f32) -> TextExtent {
            TextExtent {
                width: text.chars().count() as f32 * 8.0,
                height: size,
            }
        }
        fn fill_text(&mut self, text: &str, x: f32, y: f32, _size: f32, _color: Color) {
            self.ops.push(Op::Text(text.to_string(), x, y));
        }
    }
}
