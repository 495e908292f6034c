//! Overlay rendering.
//!
//! - `Surface`: the presentation target (raster canvas, recorder, window).
//! - `OverlayRenderer`: draws the mirrored frame plus the latest
//!   detections, mapping capture-space geometry into surface space.
//! - `geometry`: the mirror and scale transform.
//!
//! The frame is always redrawn, even when no new detections arrived, so
//! overlays persist until the next result replaces them.

mod geometry;
mod raster;
mod recording;
#[cfg(feature = "window")]
mod window;

pub use geometry::{RenderPoint, RenderRect, ScaleTransform};
pub use raster::{load_font, RasterSurface};
pub use recording::{DrawCommand, RecordingSurface};
#[cfg(feature = "window")]
pub use window::WindowPresenter;

use image::RgbImage;
use std::fmt;

use crate::detect::{DetectedObject, DetectionSet, SkeletonTopology};
use crate::error::RenderPreconditionError;
use crate::frame::Frame;
use crate::protocol::AnnotatedFrame;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

impl Dimensions {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

impl fmt::Display for Dimensions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// RGBA color; alpha 255 is opaque.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color {
    pub const GREEN: Color = Color::rgb(0, 255, 0);
    pub const RED: Color = Color::rgb(255, 0, 0);
    pub const BLACK: Color = Color::rgb(0, 0, 0);
    pub const WHITE: Color = Color::rgb(255, 255, 255);

    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 255 }
    }

    pub const fn with_alpha(self, a: u8) -> Self {
        Self { a, ..self }
    }
}

/// Presentation target the renderer draws on.
///
/// Coordinates are surface pixels with the origin top-left. Text origins
/// are baselines.
pub trait Surface {
    fn dimensions(&self) -> Dimensions;
    fn clear(&mut self);
    /// Draw `frame` flipped horizontally and scaled to fill the surface.
    fn draw_frame_mirrored(&mut self, frame: &RgbImage);
    /// Draw `frame` as delivered, scaled to fill the surface.
    fn draw_frame_as_is(&mut self, frame: &RgbImage);
    fn stroke_rect(&mut self, rect: RenderRect, color: Color, line_width: f32);
    fn draw_line(&mut self, from: RenderPoint, to: RenderPoint, color: Color, line_width: f32);
    fn fill_circle(&mut self, center: RenderPoint, radius: f32, color: Color);
    fn fill_rect(&mut self, rect: RenderRect, color: Color);
    fn measure_text(&self, text: &str, size: f32) -> f32;
    fn fill_text(&mut self, text: &str, origin: RenderPoint, size: f32, color: Color);
}

#[derive(Clone, Debug, PartialEq)]
pub struct OverlayStyle {
    pub bbox_color: Color,
    pub bbox_width: f32,
    pub skeleton_color: Color,
    pub skeleton_width: f32,
    pub joint_color: Color,
    pub joint_radius: f32,
    pub label_background: Color,
    pub label_color: Color,
    pub font_size: f32,
    pub label_height: f32,
    pub label_padding: f32,
}

impl Default for OverlayStyle {
    fn default() -> Self {
        Self {
            bbox_color: Color::GREEN,
            bbox_width: 3.0,
            skeleton_color: Color::RED,
            skeleton_width: 2.0,
            joint_color: Color::GREEN,
            joint_radius: 5.0,
            label_background: Color::BLACK.with_alpha(178),
            label_color: Color::WHITE,
            font_size: 16.0,
            label_height: 20.0,
            label_padding: 5.0,
        }
    }
}

/// What one render pass drew.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RenderStats {
    pub objects: usize,
    pub edges: usize,
    pub joints: usize,
}

pub struct OverlayRenderer {
    style: OverlayStyle,
    topology: SkeletonTopology,
}

impl OverlayRenderer {
    pub fn new(style: OverlayStyle, topology: SkeletonTopology) -> Self {
        Self { style, topology }
    }

    pub fn style(&self) -> &OverlayStyle {
        &self.style
    }

    pub fn topology(&self) -> &SkeletonTopology {
        &self.topology
    }

    /// Draw `frame` and `detections` onto `surface`.
    ///
    /// `capture` is the negotiated capture size; detection geometry is
    /// expressed in it.
    pub fn render<S: Surface + ?Sized>(
        &self,
        surface: &mut S,
        frame: Option<&Frame>,
        capture: Dimensions,
        detections: &DetectionSet,
    ) -> Result<RenderStats, RenderPreconditionError> {
        let target = surface.dimensions();
        if target.is_empty() {
            return Err(RenderPreconditionError::SurfaceNotReady);
        }
        let frame = frame.ok_or(RenderPreconditionError::NoFrame)?;
        let capture = if capture.is_empty() {
            frame.dimensions()
        } else {
            capture
        };
        let transform = ScaleTransform::new(capture, target);

        surface.clear();
        surface.draw_frame_mirrored(frame.image());

        let mut stats = RenderStats::default();
        for object in detections.objects() {
            self.draw_object(surface, &transform, object, &mut stats);
            stats.objects += 1;
        }
        Ok(stats)
    }

    /// Show a frame the service already annotated. It is drawn as received,
    /// with no local overlay on top.
    pub fn render_annotated<S: Surface + ?Sized>(
        &self,
        surface: &mut S,
        frame: &AnnotatedFrame,
    ) -> Result<RenderStats, RenderPreconditionError> {
        if surface.dimensions().is_empty() {
            return Err(RenderPreconditionError::SurfaceNotReady);
        }
        surface.clear();
        surface.draw_frame_as_is(&frame.image);
        Ok(RenderStats::default())
    }

    fn draw_object<S: Surface + ?Sized>(
        &self,
        surface: &mut S,
        transform: &ScaleTransform,
        object: &DetectedObject,
        stats: &mut RenderStats,
    ) {
        let style = &self.style;
        let rect = transform.map_bbox(&object.bbox);
        surface.stroke_rect(rect, style.bbox_color, style.bbox_width);

        let keypoints = object.keypoints();
        if !keypoints.is_empty() {
            for &(a, b) in self.topology.edges() {
                let (Some(start), Some(end)) = (keypoints.get(a), keypoints.get(b)) else {
                    continue;
                };
                if !(start.is_valid() && end.is_valid()) {
                    continue;
                }
                surface.draw_line(
                    transform.map_keypoint(start),
                    transform.map_keypoint(end),
                    style.skeleton_color,
                    style.skeleton_width,
                );
                stats.edges += 1;
            }
            for point in keypoints.iter().filter(|p| p.is_valid()) {
                surface.fill_circle(
                    transform.map_keypoint(point),
                    style.joint_radius,
                    style.joint_color,
                );
                stats.joints += 1;
            }
        }

        let caption = object.caption();
        let text_width = surface.measure_text(&caption, style.font_size);
        surface.fill_rect(
            RenderRect {
                x: rect.x,
                y: rect.y - style.label_height,
                width: text_width + 2.0 * style.label_padding,
                height: style.label_height,
            },
            style.label_background,
        );
        surface.fill_text(
            &caption,
            RenderPoint {
                x: rect.x + style.label_padding,
                y: rect.y - style.label_padding,
            },
            style.font_size,
            style.label_color,
        );
    }
}

impl Default for OverlayRenderer {
    fn default() -> Self {
        Self::new(OverlayStyle::default(), SkeletonTopology::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::{BoundingBox, Keypoint};

    fn frame(width: u32, height: u32) -> Frame {
        Frame::new(1, RgbImage::new(width, height))
    }

    fn person(skeleton: Vec<Keypoint>) -> DetectedObject {
        DetectedObject {
            track_id: 2,
            label: "walking".to_string(),
            bbox: BoundingBox::new(100.0, 100.0, 300.0, 300.0),
            skeleton: Some(skeleton),
        }
    }

    #[test]
    fn missing_frame_or_surface_is_a_precondition_error() {
        let renderer = OverlayRenderer::default();
        let detections = DetectionSet::new();

        let mut empty = RecordingSurface::new(Dimensions::new(0, 480));
        let f = frame(640, 480);
        assert_eq!(
            renderer.render(&mut empty, Some(&f), f.dimensions(), &detections),
            Err(RenderPreconditionError::SurfaceNotReady)
        );

        let mut surface = RecordingSurface::new(Dimensions::new(640, 480));
        assert_eq!(
            renderer.render(&mut surface, None, Dimensions::new(640, 480), &detections),
            Err(RenderPreconditionError::NoFrame)
        );
        assert!(surface.commands().is_empty());
    }

    #[test]
    fn frame_is_drawn_without_detections() {
        let renderer = OverlayRenderer::default();
        let mut surface = RecordingSurface::new(Dimensions::new(320, 240));
        let f = frame(640, 480);
        let stats = renderer
            .render(&mut surface, Some(&f), f.dimensions(), &DetectionSet::new())
            .unwrap();

        assert_eq!(stats, RenderStats::default());
        assert_eq!(
            surface.commands(),
            &[
                DrawCommand::Clear,
                DrawCommand::Frame {
                    width: 640,
                    height: 480
                }
            ]
        );
    }

    #[test]
    fn annotated_frame_replaces_the_live_picture() {
        let renderer = OverlayRenderer::default();
        let mut surface = RecordingSurface::new(Dimensions::new(320, 240));
        let annotated = AnnotatedFrame {
            image: RgbImage::new(640, 480),
            log: None,
        };

        let stats = renderer.render_annotated(&mut surface, &annotated).unwrap();
        assert_eq!(stats, RenderStats::default());
        assert_eq!(
            surface.commands(),
            &[
                DrawCommand::Clear,
                DrawCommand::FrameAsIs {
                    width: 640,
                    height: 480
                }
            ]
        );

        let mut empty = RecordingSurface::new(Dimensions::new(0, 0));
        assert_eq!(
            renderer.render_annotated(&mut empty, &annotated),
            Err(RenderPreconditionError::SurfaceNotReady)
        );
    }

    #[test]
    fn label_sits_above_the_box() {
        let renderer = OverlayRenderer::default();
        let mut surface = RecordingSurface::new(Dimensions::new(640, 480));
        let f = frame(640, 480);
        let mut detections = DetectionSet::new();
        detections.replace(vec![person(Vec::new())]);

        renderer
            .render(&mut surface, Some(&f), f.dimensions(), &detections)
            .unwrap();

        let caption = "walking (ID: 2)";
        let width = surface.measure_text(caption, 16.0);
        // Mirrored: x = 640 - 300.
        assert!(surface.commands().contains(&DrawCommand::FillRect {
            rect: RenderRect {
                x: 340.0,
                y: 80.0,
                width: width + 10.0,
                height: 20.0
            },
            color: Color::BLACK.with_alpha(178),
        }));
        assert!(surface.commands().contains(&DrawCommand::Text {
            text: caption.to_string(),
            origin: RenderPoint { x: 345.0, y: 95.0 },
            size: 16.0,
            color: Color::WHITE,
        }));
    }

    #[test]
    fn out_of_range_keypoints_produce_no_edges() {
        let renderer = OverlayRenderer::new(
            OverlayStyle::default(),
            SkeletonTopology::new(vec![(0, 1), (1, 5)]),
        );
        let mut surface = RecordingSurface::new(Dimensions::new(640, 480));
        let f = frame(640, 480);
        let mut detections = DetectionSet::new();
        detections.replace(vec![person(vec![
            Keypoint::Plain { x: 0.5, y: 0.5 },
            Keypoint::Plain { x: 1.2, y: 0.3 },
        ])]);

        let stats = renderer
            .render(&mut surface, Some(&f), f.dimensions(), &detections)
            .unwrap();
        assert_eq!(
            stats,
            RenderStats {
                objects: 1,
                edges: 0,
                joints: 1
            }
        );
    }

    #[test]
    fn valid_edge_is_mirrored_and_scaled() {
        let renderer = OverlayRenderer::new(
            OverlayStyle::default(),
            SkeletonTopology::new(vec![(0, 1)]),
        );
        let mut surface = RecordingSurface::new(Dimensions::new(640, 480));
        let f = frame(1280, 720);
        let mut detections = DetectionSet::new();
        detections.replace(vec![person(vec![
            Keypoint::Plain { x: 0.25, y: 0.5 },
            Keypoint::Indexed {
                id: 1,
                x: 0.75,
                y: 0.5,
            },
        ])]);

        let stats = renderer
            .render(&mut surface, Some(&f), f.dimensions(), &detections)
            .unwrap();
        assert_eq!(stats.edges, 1);
        assert!(surface.commands().contains(&DrawCommand::Line {
            from: RenderPoint { x: 480.0, y: 240.0 },
            to: RenderPoint { x: 160.0, y: 240.0 },
            color: Color::RED,
            width: 2.0,
        }));
    }
}
