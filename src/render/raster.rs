//! In-memory RGBA canvas.

use ab_glyph::{Font, FontVec, PxScale, ScaleFont};
use anyhow::{Context, Result};
use image::{Rgba, RgbaImage, RgbImage};
use imageproc::drawing::{
    draw_filled_circle_mut, draw_hollow_rect_mut, draw_line_segment_mut, draw_text_mut, text_size,
};
use imageproc::rect::Rect;
use std::path::Path;

use super::{Color, Dimensions, RenderPoint, RenderRect, Surface};

const MAX_STROKE: f32 = 64.0;

/// Load a TrueType/OpenType font for label text.
pub fn load_font(path: &Path) -> Result<FontVec> {
    let bytes =
        std::fs::read(path).with_context(|| format!("read font {}", path.display()))?;
    FontVec::try_from_vec(bytes).with_context(|| format!("parse font {}", path.display()))
}

/// Raster surface backed by an `RgbaImage`.
///
/// Without a font, text width is estimated and glyphs are skipped; boxes,
/// skeletons and label backgrounds are still drawn.
pub struct RasterSurface {
    canvas: RgbaImage,
    font: Option<FontVec>,
}

impl RasterSurface {
    pub fn new(dimensions: Dimensions) -> Self {
        Self {
            canvas: RgbaImage::new(dimensions.width, dimensions.height),
            font: None,
        }
    }

    pub fn with_font(mut self, font: FontVec) -> Self {
        self.font = Some(font);
        self
    }

    pub fn image(&self) -> &RgbaImage {
        &self.canvas
    }

    pub fn resize(&mut self, dimensions: Dimensions) {
        if dimensions != self.dimensions() {
            self.canvas = RgbaImage::new(dimensions.width, dimensions.height);
        }
    }

    pub fn save_png(&self, path: &Path) -> Result<()> {
        self.canvas
            .save_with_format(path, image::ImageFormat::Png)
            .with_context(|| format!("write snapshot {}", path.display()))
    }

    /// Nearest-neighbour scale of `frame` onto the whole canvas.
    fn blit(&mut self, frame: &RgbImage, mirror: bool) {
        let (fw, fh) = frame.dimensions();
        let (cw, ch) = self.canvas.dimensions();
        if fw == 0 || fh == 0 || cw == 0 || ch == 0 {
            return;
        }
        for y in 0..ch {
            let sy = (y as u64 * fh as u64 / ch as u64) as u32;
            for x in 0..cw {
                let column = (x as u64 * fw as u64 / cw as u64) as u32;
                let sx = if mirror { fw - 1 - column } else { column };
                let [r, g, b] = frame.get_pixel(sx, sy).0;
                self.canvas.put_pixel(x, y, Rgba([r, g, b, 255]));
            }
        }
    }

    fn blend_pixel(&mut self, x: i64, y: i64, color: Color) {
        if x < 0 || y < 0 || x >= self.canvas.width() as i64 || y >= self.canvas.height() as i64 {
            return;
        }
        let pixel = self.canvas.get_pixel_mut(x as u32, y as u32);
        let alpha = color.a as u32;
        let inverse = 255 - alpha;
        let mix = |src: u8, dst: u8| ((src as u32 * alpha + dst as u32 * inverse) / 255) as u8;
        *pixel = Rgba([
            mix(color.r, pixel[0]),
            mix(color.g, pixel[1]),
            mix(color.b, pixel[2]),
            255,
        ]);
    }
}

fn rgba(color: Color) -> Rgba<u8> {
    Rgba([color.r, color.g, color.b, color.a])
}

impl Surface for RasterSurface {
    fn dimensions(&self) -> Dimensions {
        Dimensions::new(self.canvas.width(), self.canvas.height())
    }

    fn clear(&mut self) {
        for pixel in self.canvas.pixels_mut() {
            *pixel = Rgba([0, 0, 0, 255]);
        }
    }

    fn draw_frame_mirrored(&mut self, frame: &RgbImage) {
        self.blit(frame, true);
    }

    fn draw_frame_as_is(&mut self, frame: &RgbImage) {
        self.blit(frame, false);
    }

    fn stroke_rect(&mut self, rect: RenderRect, color: Color, line_width: f32) {
        let thickness = line_width.round().clamp(1.0, MAX_STROKE) as i32;
        let margin = thickness as f32 + 1.0;
        let (cw, ch) = (self.canvas.width() as f32, self.canvas.height() as f32);
        let Some((x0, x1)) = clamp_span(rect.x, rect.width, cw, margin) else {
            return;
        };
        let Some((y0, y1)) = clamp_span(rect.y, rect.height, ch, margin) else {
            return;
        };
        let (x, y) = (x0.round() as i32, y0.round() as i32);
        let (w, h) = ((x1 - x0).round() as i32, (y1 - y0).round() as i32);
        if w <= 0 || h <= 0 {
            return;
        }
        // Thick border as nested 1px rectangles centered on the edge.
        let inset = thickness / 2;
        for offset in 0..thickness {
            let grow = offset - inset;
            let ow = w.saturating_add(grow.saturating_mul(2));
            let oh = h.saturating_add(grow.saturating_mul(2));
            if ow <= 0 || oh <= 0 {
                continue;
            }
            let outline =
                Rect::at(x.saturating_sub(grow), y.saturating_sub(grow)).of_size(ow as u32, oh as u32);
            draw_hollow_rect_mut(&mut self.canvas, outline, rgba(color));
        }
    }

    fn draw_line(&mut self, from: RenderPoint, to: RenderPoint, color: Color, line_width: f32) {
        let thickness = line_width.round().clamp(1.0, MAX_STROKE) as i32;
        let margin = thickness as f32 + 1.0;
        let (cw, ch) = (self.canvas.width() as f32, self.canvas.height() as f32);
        let Some((from, to)) = clip_segment(from, to, cw, ch, margin) else {
            return;
        };
        let (dx, dy) = (to.x - from.x, to.y - from.y);
        let length = (dx * dx + dy * dy).sqrt();
        if length == 0.0 || thickness == 1 {
            draw_line_segment_mut(&mut self.canvas, (from.x, from.y), (to.x, to.y), rgba(color));
            return;
        }
        // Parallel 1px segments offset along the normal.
        let (nx, ny) = (-dy / length, dx / length);
        for i in 0..thickness {
            let shift = i as f32 - (thickness - 1) as f32 / 2.0;
            draw_line_segment_mut(
                &mut self.canvas,
                (from.x + nx * shift, from.y + ny * shift),
                (to.x + nx * shift, to.y + ny * shift),
                rgba(color),
            );
        }
    }

    fn fill_circle(&mut self, center: RenderPoint, radius: f32, color: Color) {
        let radius = radius.round().clamp(1.0, MAX_STROKE);
        let (cw, ch) = (self.canvas.width() as f32, self.canvas.height() as f32);
        if !(center.x.is_finite() && center.y.is_finite())
            || center.x < -radius
            || center.y < -radius
            || center.x > cw + radius
            || center.y > ch + radius
        {
            return;
        }
        draw_filled_circle_mut(
            &mut self.canvas,
            (center.x.round() as i32, center.y.round() as i32),
            radius as i32,
            rgba(color),
        );
    }

    fn fill_rect(&mut self, rect: RenderRect, color: Color) {
        let (cw, ch) = (self.canvas.width() as f32, self.canvas.height() as f32);
        let Some((x0, x1)) = clamp_span(rect.x, rect.width, cw, 0.0) else {
            return;
        };
        let Some((y0, y1)) = clamp_span(rect.y, rect.height, ch, 0.0) else {
            return;
        };
        for y in y0.round() as i64..y1.round() as i64 {
            for x in x0.round() as i64..x1.round() as i64 {
                self.blend_pixel(x, y, color);
            }
        }
    }

    fn measure_text(&self, text: &str, size: f32) -> f32 {
        match &self.font {
            Some(font) => text_size(PxScale::from(size), font, text).0 as f32,
            None => text.chars().count() as f32 * size * 0.55,
        }
    }

    fn fill_text(&mut self, text: &str, origin: RenderPoint, size: f32, color: Color) {
        let width = self.measure_text(text, size);
        let (cw, ch) = (self.canvas.width() as f32, self.canvas.height() as f32);
        if !(origin.x.is_finite() && origin.y.is_finite())
            || origin.x + width < 0.0
            || origin.x > cw
            || origin.y < 0.0
            || origin.y - size > ch
        {
            return;
        }
        let Some(font) = &self.font else {
            return;
        };
        let scale = PxScale::from(size);
        let ascent = font.as_scaled(scale).ascent();
        draw_text_mut(
            &mut self.canvas,
            rgba(color),
            origin.x.round() as i32,
            (origin.y - ascent).round() as i32,
            scale,
            font,
            text,
        );
    }
}

/// `[start, start + len]` clamped to `[-margin, limit + margin]`. `None`
/// when the span is not finite or misses that band.
fn clamp_span(start: f32, len: f32, limit: f32, margin: f32) -> Option<(f32, f32)> {
    let end = start + len;
    if !(start.is_finite() && end.is_finite()) {
        return None;
    }
    let (lo, hi) = (-margin, limit + margin);
    if end < lo || start > hi {
        return None;
    }
    Some((start.max(lo), end.min(hi)))
}

/// Liang-Barsky clip of a segment to the canvas grown by `margin`.
fn clip_segment(
    from: RenderPoint,
    to: RenderPoint,
    width: f32,
    height: f32,
    margin: f32,
) -> Option<(RenderPoint, RenderPoint)> {
    if ![from.x, from.y, to.x, to.y].iter().all(|v| v.is_finite()) {
        return None;
    }
    let (dx, dy) = (to.x - from.x, to.y - from.y);
    let (mut t0, mut t1) = (0.0f32, 1.0f32);
    for (p, q) in [
        (-dx, from.x + margin),
        (dx, width + margin - from.x),
        (-dy, from.y + margin),
        (dy, height + margin - from.y),
    ] {
        if p == 0.0 {
            if q < 0.0 {
                return None;
            }
            continue;
        }
        let r = q / p;
        if p < 0.0 {
            if r > t1 {
                return None;
            }
            t0 = t0.max(r);
        } else {
            if r < t0 {
                return None;
            }
            t1 = t1.min(r);
        }
    }
    let at = |t: f32| RenderPoint {
        x: from.x + dx * t,
        y: from.y + dy * t,
    };
    Some((at(t0), at(t1)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn frame_is_mirrored_horizontally() {
        let mut frame = RgbImage::from_pixel(4, 2, Rgb([0, 0, 0]));
        frame.put_pixel(0, 0, Rgb([255, 0, 0]));

        let mut surface = RasterSurface::new(Dimensions::new(4, 2));
        surface.draw_frame_mirrored(&frame);

        assert_eq!(surface.image().get_pixel(3, 0), &Rgba([255, 0, 0, 255]));
        assert_eq!(surface.image().get_pixel(0, 0), &Rgba([0, 0, 0, 255]));
    }

    #[test]
    fn server_frame_is_drawn_unmirrored() {
        let mut frame = RgbImage::from_pixel(4, 2, Rgb([0, 0, 0]));
        frame.put_pixel(0, 0, Rgb([255, 0, 0]));

        let mut surface = RasterSurface::new(Dimensions::new(8, 4));
        surface.draw_frame_as_is(&frame);

        assert_eq!(surface.image().get_pixel(0, 0), &Rgba([255, 0, 0, 255]));
        assert_eq!(surface.image().get_pixel(1, 1), &Rgba([255, 0, 0, 255]));
        assert_eq!(surface.image().get_pixel(7, 0), &Rgba([0, 0, 0, 255]));
    }

    #[test]
    fn frame_is_scaled_to_surface() {
        let mut frame = RgbImage::from_pixel(2, 2, Rgb([0, 0, 255]));
        frame.put_pixel(1, 1, Rgb([0, 255, 0]));

        let mut surface = RasterSurface::new(Dimensions::new(8, 8));
        surface.draw_frame_mirrored(&frame);

        // Source (1, 1) lands in the bottom-left quadrant once mirrored.
        assert_eq!(surface.image().get_pixel(1, 6), &Rgba([0, 255, 0, 255]));
        assert_eq!(surface.image().get_pixel(6, 6), &Rgba([0, 0, 255, 255]));
    }

    #[test]
    fn translucent_fill_blends() {
        let mut surface = RasterSurface::new(Dimensions::new(4, 4));
        for pixel in surface.canvas.pixels_mut() {
            *pixel = Rgba([255, 255, 255, 255]);
        }
        surface.fill_rect(
            RenderRect {
                x: 0.0,
                y: 0.0,
                width: 2.0,
                height: 2.0,
            },
            Color::BLACK.with_alpha(178),
        );
        assert_eq!(surface.image().get_pixel(0, 0), &Rgba([77, 77, 77, 255]));
        assert_eq!(surface.image().get_pixel(3, 3), &Rgba([255, 255, 255, 255]));
    }

    #[test]
    fn degenerate_shapes_are_ignored() {
        let mut surface = RasterSurface::new(Dimensions::new(10, 10));
        surface.clear();
        surface.stroke_rect(RenderRect::default(), Color::GREEN, 3.0);
        assert!(surface.image().pixels().all(|p| *p == Rgba([0, 0, 0, 255])));
    }

    #[test]
    fn geometry_far_outside_the_canvas_is_clipped() {
        let mut surface = RasterSurface::new(Dimensions::new(64, 48));
        surface.clear();
        let huge = RenderRect {
            x: -1e10,
            y: 0.0,
            width: 2e10,
            height: 10.0,
        };
        surface.fill_rect(huge, Color::BLACK.with_alpha(178));
        surface.stroke_rect(huge, Color::GREEN, 3.0);
        surface.draw_line(
            RenderPoint { x: -1e10, y: 24.0 },
            RenderPoint { x: 1e10, y: 24.0 },
            Color::RED,
            2.0,
        );
        surface.fill_circle(RenderPoint { x: 1e12, y: -1e12 }, 5.0, Color::GREEN);
        surface.fill_text("far", RenderPoint { x: f32::MAX, y: 10.0 }, 16.0, Color::WHITE);
        surface.stroke_rect(
            RenderRect {
                x: f32::NAN,
                y: 0.0,
                width: 10.0,
                height: 10.0,
            },
            Color::GREEN,
            3.0,
        );

        // Top edge of the box is on-canvas, its sides are not.
        assert_eq!(surface.image().get_pixel(32, 0), &Rgba([0, 255, 0, 255]));
        // The clipped line still crosses the whole canvas.
        assert_eq!(surface.image().get_pixel(0, 24), &Rgba([255, 0, 0, 255]));
        assert_eq!(surface.image().get_pixel(63, 24), &Rgba([255, 0, 0, 255]));
    }

    #[test]
    fn huge_bbox_renders_without_panicking() {
        use crate::detect::{BoundingBox, DetectedObject, DetectionSet};
        use crate::frame::Frame;
        use crate::render::OverlayRenderer;

        let mut surface = RasterSurface::new(Dimensions::new(64, 48));
        let frame = Frame::new(1, RgbImage::new(64, 48));
        let mut detections = DetectionSet::new();
        detections.replace(vec![DetectedObject {
            track_id: 1,
            label: "far".to_string(),
            bbox: BoundingBox::new(-1e10, 0.0, 1e10, 10.0),
            skeleton: None,
        }]);

        let stats = OverlayRenderer::default()
            .render(&mut surface, Some(&frame), frame.dimensions(), &detections)
            .unwrap();
        assert_eq!(stats.objects, 1);
    }

    #[test]
    fn text_width_is_estimated_without_font() {
        let surface = RasterSurface::new(Dimensions::new(10, 10));
        assert!(surface.measure_text("walking (ID: 1)", 16.0) > 0.0);
    }

    #[test]
    fn snapshot_is_written_as_png() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("snapshot.png");
        let mut surface = RasterSurface::new(Dimensions::new(8, 6));
        surface.clear();
        surface.save_png(&path).unwrap();

        let reloaded = image::open(&path).unwrap();
        assert_eq!((reloaded.width(), reloaded.height()), (8, 6));
    }
}
