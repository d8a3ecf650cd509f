//! Overlay surfaces for the detection cycle.

use ab_glyph::{FontVec, PxScale};
use facewatch_core::{BoundingBox, DisplaySurface};
use image::{ImageFormat, Rgb, RgbImage};
use imageproc::drawing::{draw_hollow_rect_mut, draw_text_mut};
use imageproc::rect::Rect;
use std::path::{Path, PathBuf};
use thiserror::Error;

const KNOWN_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
const UNKNOWN_COLOR: Rgb<u8> = Rgb([255, 0, 0]);
const LABEL_SCALE: f32 = 18.0;

#[derive(Error, Debug)]
pub enum DisplayError {
    #[error("cannot read font {path}: {source}")]
    FontRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid font {0}")]
    FontInvalid(PathBuf),
    #[error("cannot write snapshot: {0}")]
    Save(#[from] image::ImageError),
    #[error("cannot write snapshot: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone)]
struct Overlay {
    bbox: BoundingBox,
    label: String,
    unknown: bool,
}

/// Renders each cycle's boxes onto the frame and writes it as a PNG.
///
/// The file is replaced atomically, so readers never see a partial image.
pub struct SnapshotDisplay {
    path: PathBuf,
    font: Option<FontVec>,
    overlays: Vec<Overlay>,
}

impl SnapshotDisplay {
    pub fn new(path: impl Into<PathBuf>, font_path: Option<&Path>) -> Result<Self, DisplayError> {
        let font = match font_path {
            Some(p) => {
                let bytes = std::fs::read(p).map_err(|source| DisplayError::FontRead {
                    path: p.to_path_buf(),
                    source,
                })?;
                Some(FontVec::try_from_vec(bytes).map_err(|_| DisplayError::FontInvalid(p.to_path_buf()))?)
            }
            None => None,
        };
        Ok(Self {
            path: path.into(),
            font,
            overlays: Vec::new(),
        })
    }

    /// Draw the pending overlays onto a copy of `frame`.
    pub fn render(&self, frame: &RgbImage) -> RgbImage {
        let mut canvas = frame.clone();
        for overlay in &self.overlays {
            let color = if overlay.unknown { UNKNOWN_COLOR } else { KNOWN_COLOR };
            let Some(rect) = clip_rect(&overlay.bbox, canvas.width(), canvas.height()) else {
                continue;
            };
            draw_hollow_rect_mut(&mut canvas, rect, color);
            // Second pass one pixel inside for a 2px outline.
            if rect.width() > 2 && rect.height() > 2 {
                let inner = Rect::at(rect.left() + 1, rect.top() + 1).of_size(rect.width() - 2, rect.height() - 2);
                draw_hollow_rect_mut(&mut canvas, inner, color);
            }

            if let Some(font) = &self.font {
                let y = (rect.top() - LABEL_SCALE as i32 - 2).max(0);
                draw_text_mut(&mut canvas, color, rect.left(), y, PxScale::from(LABEL_SCALE), font, &overlay.label);
            }
        }
        canvas
    }

    fn save(&self, canvas: &RgbImage) -> Result<(), DisplayError> {
        let tmp = self.path.with_extension("png.tmp");
        canvas.save_with_format(&tmp, ImageFormat::Png)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl DisplaySurface for SnapshotDisplay {
    fn clear(&mut self) {
        self.overlays.clear();
    }

    fn draw_box(&mut self, bbox: &BoundingBox, label: &str, unknown: bool) {
        self.overlays.push(Overlay {
            bbox: bbox.clone(),
            label: label.to_string(),
            unknown,
        });
    }

    fn present(&mut self, frame: &RgbImage) {
        let canvas = self.render(frame);
        if let Err(e) = self.save(&canvas) {
            tracing::warn!(path = %self.path.display(), error = %e, "snapshot write failed");
        }
    }
}

/// Clamp a box to the image; `None` if nothing of it is visible.
fn clip_rect(bbox: &BoundingBox, width: u32, height: u32) -> Option<Rect> {
    let x0 = bbox.x.max(0.0);
    let y0 = bbox.y.max(0.0);
    let x1 = (bbox.x + bbox.width).min(width as f32);
    let y1 = (bbox.y + bbox.height).min(height as f32);
    if x1 - x0 < 1.0 || y1 - y0 < 1.0 {
        return None;
    }
    Some(Rect::at(x0 as i32, y0 as i32).of_size((x1 - x0) as u32, (y1 - y0) as u32))
}

/// Headless surface: boxes go to the debug log.
#[derive(Debug, Default)]
pub struct LogDisplay;

impl DisplaySurface for LogDisplay {
    fn clear(&mut self) {}

    fn draw_box(&mut self, bbox: &BoundingBox, label: &str, unknown: bool) {
        tracing::debug!(
            x = bbox.x,
            y = bbox.y,
            w = bbox.width,
            h = bbox.height,
            label,
            unknown,
            "face"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bbox(x: f32, y: f32, w: f32, h: f32) -> BoundingBox {
        BoundingBox {
            x,
            y,
            width: w,
            height: h,
            confidence: 0.9,
            landmarks: None,
        }
    }

    fn snapshot_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("facewatch-{}-{name}.png", std::process::id()))
    }

    #[test]
    fn test_render_colors_by_identity() {
        let mut display = SnapshotDisplay::new(snapshot_path("colors"), None).unwrap();
        let frame = RgbImage::new(64, 64);

        display.clear();
        display.draw_box(&bbox(2.0, 2.0, 20.0, 20.0), "Alice (0.30)", false);
        display.draw_box(&bbox(30.0, 30.0, 20.0, 20.0), "unknown (0.90)", true);
        let canvas = display.render(&frame);

        assert_eq!(*canvas.get_pixel(2, 2), KNOWN_COLOR);
        assert_eq!(*canvas.get_pixel(30, 30), UNKNOWN_COLOR);
        // Interior untouched.
        assert_eq!(*canvas.get_pixel(12, 12), Rgb([0, 0, 0]));
    }

    #[test]
    fn test_clear_drops_previous_boxes() {
        let mut display = SnapshotDisplay::new(snapshot_path("clear"), None).unwrap();
        let frame = RgbImage::new(32, 32);
        display.draw_box(&bbox(0.0, 0.0, 10.0, 10.0), "x", true);
        display.clear();
        assert_eq!(display.render(&frame), frame);
    }

    #[test]
    fn test_box_outside_frame_is_skipped() {
        assert!(clip_rect(&bbox(100.0, 100.0, 10.0, 10.0), 32, 32).is_none());
        let clipped = clip_rect(&bbox(-5.0, -5.0, 20.0, 20.0), 32, 32).unwrap();
        assert_eq!((clipped.left(), clipped.top(), clipped.width()), (0, 0, 15));
    }

    #[test]
    fn test_present_writes_png() {
        let path = snapshot_path("present");
        let mut display = SnapshotDisplay::new(&path, None).unwrap();
        display.draw_box(&bbox(1.0, 1.0, 5.0, 5.0), "Alice (0.10)", false);
        display.present(&RgbImage::new(16, 16));

        let written = image::open(&path).unwrap().into_rgb8();
        assert_eq!(written.dimensions(), (16, 16));
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_missing_font_is_an_error() {
        let result = SnapshotDisplay::new(snapshot_path("font"), Some(Path::new("/nonexistent/font.ttf")));
        assert!(matches!(result, Err(DisplayError::FontRead { .. })));
    }
}
