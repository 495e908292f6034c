use super::Dimensions;
use crate::detect::{BoundingBox, Keypoint};

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct RenderPoint {
    pub x: f32,
    pub y: f32,
}

/// Rectangle in surface pixels, top-left origin.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct RenderRect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

/// Capture space to surface space: horizontal mirror, then scale.
///
/// The two spaces are sized independently, so every coordinate goes
/// through here; nothing assumes they match.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ScaleTransform {
    capture: Dimensions,
    target: Dimensions,
}

impl ScaleTransform {
    pub fn new(capture: Dimensions, target: Dimensions) -> Self {
        Self { capture, target }
    }

    fn scale_x(&self, value: f32) -> f32 {
        value * self.target.width as f32 / self.capture.width.max(1) as f32
    }

    fn scale_y(&self, value: f32) -> f32 {
        value * self.target.height as f32 / self.capture.height.max(1) as f32
    }

    /// Mirror a capture-space x coordinate.
    pub fn mirror_x(&self, x: f32) -> f32 {
        self.capture.width as f32 - x
    }

    /// The mirrored box's left edge is the original right edge.
    pub fn map_bbox(&self, bbox: &BoundingBox) -> RenderRect {
        RenderRect {
            x: self.scale_x(self.mirror_x(bbox.x2)),
            y: self.scale_y(bbox.y1),
            width: self.scale_x(bbox.width()),
            height: self.scale_y(bbox.height()),
        }
    }

    /// Normalized keypoint to surface pixels.
    pub fn map_keypoint(&self, point: &Keypoint) -> RenderPoint {
        let px = point.x() * self.capture.width as f32;
        let py = point.y() * self.capture.height as f32;
        RenderPoint {
            x: self.scale_x(self.mirror_x(px)),
            y: self.scale_y(py),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bbox_is_mirrored_then_scaled() {
        let transform =
            ScaleTransform::new(Dimensions::new(1280, 720), Dimensions::new(640, 480));
        let rect = transform.map_bbox(&BoundingBox::new(100.0, 100.0, 300.0, 300.0));

        assert_eq!(rect.x, 490.0);
        assert_eq!(rect.width, 100.0);
        assert!((rect.y - 66.666_67).abs() < 1e-3);
        assert!((rect.height - 133.333_33).abs() < 1e-3);
    }

    #[test]
    fn same_size_keeps_scale() {
        let transform = ScaleTransform::new(Dimensions::new(640, 480), Dimensions::new(640, 480));
        let rect = transform.map_bbox(&BoundingBox::new(10.0, 20.0, 110.0, 220.0));
        assert_eq!(
            rect,
            RenderRect {
                x: 530.0,
                y: 20.0,
                width: 100.0,
                height: 200.0
            }
        );
    }

    #[test]
    fn mirroring_twice_is_identity() {
        let transform = ScaleTransform::new(Dimensions::new(640, 480), Dimensions::new(640, 480));
        for x in [0.0, 1.0, 123.5, 320.0, 639.0, 640.0] {
            assert_eq!(transform.mirror_x(transform.mirror_x(x)), x);
        }
    }

    #[test]
    fn keypoint_maps_through_capture_pixels() {
        let transform =
            ScaleTransform::new(Dimensions::new(1280, 720), Dimensions::new(640, 480));
        let point = transform.map_keypoint(&Keypoint::Plain { x: 0.25, y: 0.5 });
        assert_eq!(point, RenderPoint { x: 480.0, y: 240.0 });
    }
}
