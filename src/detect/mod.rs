//! Detection results returned by the inference service.
//!
//! - `DetectedObject`: one tracked object (bbox, label, optional skeleton).
//! - `Keypoint`: skeleton point, resolved once at ingestion from either
//!   `[x, y]` or `[id, x, y]`.
//! - `SkeletonTopology`: static joint connections used for drawing.
//! - `DetectionSet`: the latest result list, replaced wholesale per message.

mod object;
mod topology;

pub use object::{BoundingBox, DetectedObject, Keypoint};
pub use topology::{SkeletonTopology, TRT_POSE_LINKS};

/// Latest detections, as last reported by the service.
///
/// Written only by the pipeline's inbound handler and read only by the
/// renderer. Every update replaces the whole list; nothing is merged or
/// interpolated.
#[derive(Clone, Debug, Default)]
pub struct DetectionSet {
    objects: Vec<DetectedObject>,
    generation: u64,
}

impl DetectionSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn replace(&mut self, objects: Vec<DetectedObject>) {
        self.objects = objects;
        self.generation += 1;
    }

    pub fn clear(&mut self) {
        self.replace(Vec::new());
    }

    pub fn objects(&self) -> &[DetectedObject] {
        &self.objects
    }

    /// Number of replacements applied so far.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}
