use serde::{Deserialize, Serialize};

use crate::error::MessageFormatError;

/// One object reported by the service.
///
/// Wire shape: `{ "bbox": [x1, y1, x2, y2], "track_id": 3, "action": "walking",
/// "skeleton": [[x, y] | [id, x, y], ...] }`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DetectedObject {
    /// Tracker identity, stable across frames for the same person.
    #[serde(default)]
    pub track_id: i64,

    /// Action (skeleton model) or emotion (emotion model) label.
    #[serde(rename = "action", alias = "emotion", alias = "label", default)]
    pub label: String,

    /// Box in capture-space pixels.
    pub bbox: BoundingBox,

    /// Normalized keypoints, in the order the pose model emits them.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skeleton: Option<Vec<Keypoint>>,
}

impl DetectedObject {
    pub fn keypoints(&self) -> &[Keypoint] {
        self.skeleton.as_deref().unwrap_or(&[])
    }

    /// Text drawn above the box.
    pub fn caption(&self) -> String {
        format!("{} (ID: {})", self.label, self.track_id)
    }
}

/// Axis-aligned box `(x1, y1)`–`(x2, y2)` in capture-space pixels.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f32; 4]", into = "[f32; 4]")]
pub struct BoundingBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl BoundingBox {
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    pub fn width(&self) -> f32 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> f32 {
        self.y2 - self.y1
    }
}

impl From<[f32; 4]> for BoundingBox {
    fn from([x1, y1, x2, y2]: [f32; 4]) -> Self {
        Self { x1, y1, x2, y2 }
    }
}

impl From<BoundingBox> for [f32; 4] {
    fn from(b: BoundingBox) -> Self {
        [b.x1, b.y1, b.x2, b.y2]
    }
}

/// Skeleton keypoint in normalized coordinates.
///
/// The two wire shapes are told apart once, here, by array length.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<f32>", into = "Vec<f32>")]
pub enum Keypoint {
    Plain { x: f32, y: f32 },
    Indexed { id: i64, x: f32, y: f32 },
}

impl Keypoint {
    pub fn x(&self) -> f32 {
        match *self {
            Keypoint::Plain { x, .. } | Keypoint::Indexed { x, .. } => x,
        }
    }

    pub fn y(&self) -> f32 {
        match *self {
            Keypoint::Plain { y, .. } | Keypoint::Indexed { y, .. } => y,
        }
    }

    /// Part id reported by the model, if the `[id, x, y]` shape was used.
    pub fn id(&self) -> Option<i64> {
        match *self {
            Keypoint::Plain { .. } => None,
            Keypoint::Indexed { id, .. } => Some(id),
        }
    }

    /// Strictly inside the unit square. Zero marks an undetected joint.
    pub fn is_valid(&self) -> bool {
        let (x, y) = (self.x(), self.y());
        x > 0.0 && x < 1.0 && y > 0.0 && y < 1.0
    }
}

impl TryFrom<Vec<f32>> for Keypoint {
    type Error = MessageFormatError;

    fn try_from(values: Vec<f32>) -> Result<Self, Self::Error> {
        match values.as_slice() {
            [x, y] => Ok(Keypoint::Plain { x: *x, y: *y }),
            [id, x, y] => Ok(Keypoint::Indexed {
                id: *id as i64,
                x: *x,
                y: *y,
            }),
            other => Err(MessageFormatError::Keypoint(other.len())),
        }
    }
}

impl From<Keypoint> for Vec<f32> {
    fn from(point: Keypoint) -> Self {
        match point {
            Keypoint::Plain { x, y } => vec![x, y],
            Keypoint::Indexed { id, x, y } => vec![id as f32, x, y],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_both_keypoint_shapes() {
        let json = r#"{
            "bbox": [10, 20, 110, 220],
            "track_id": 4,
            "action": "waving",
            "skeleton": [[0.5, 0.25], [2, 0.1, 0.9]]
        }"#;
        let object: DetectedObject = serde_json::from_str(json).unwrap();

        assert_eq!(object.track_id, 4);
        assert_eq!(object.label, "waving");
        assert_eq!(object.bbox, BoundingBox::new(10.0, 20.0, 110.0, 220.0));
        assert_eq!(
            object.keypoints(),
            &[
                Keypoint::Plain { x: 0.5, y: 0.25 },
                Keypoint::Indexed {
                    id: 2,
                    x: 0.1,
                    y: 0.9
                }
            ]
        );
    }

    #[test]
    fn emotion_label_is_accepted() {
        let json = r#"{"bbox": [0, 0, 1, 1], "track_id": 1, "emotion": "happy"}"#;
        let object: DetectedObject = serde_json::from_str(json).unwrap();
        assert_eq!(object.label, "happy");
        assert!(object.keypoints().is_empty());
        assert_eq!(object.caption(), "happy (ID: 1)");
    }

    #[test]
    fn keypoint_with_wrong_arity_is_rejected() {
        let json = r#"{"bbox": [0, 0, 1, 1], "skeleton": [[0.1, 0.2, 0.3, 0.4]]}"#;
        let err = serde_json::from_str::<DetectedObject>(json).unwrap_err();
        assert!(err.to_string().contains("2 or 3 elements"));
    }

    #[test]
    fn validity_excludes_the_unit_square_border() {
        assert!(Keypoint::Plain { x: 0.5, y: 0.5 }.is_valid());
        assert!(!Keypoint::Plain { x: 0.0, y: 0.5 }.is_valid());
        assert!(!Keypoint::Plain { x: 0.5, y: 1.0 }.is_valid());
        assert!(!Keypoint::Plain { x: 1.2, y: 0.3 }.is_valid());
        assert!(!Keypoint::Indexed {
            id: 3,
            x: -0.1,
            y: 0.3
        }
        .is_valid());
    }
}
