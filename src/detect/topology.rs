/// trt_pose 18-part links, as 0-based keypoint slots.
///
/// The model publishes these 1-based (COCO convention); the neck is the
/// last part.
pub const TRT_POSE_LINKS: [(usize, usize); 21] = [
    (15, 13),
    (13, 11),
    (16, 14),
    (14, 12),
    (11, 12),
    (5, 7),
    (6, 8),
    (7, 9),
    (8, 10),
    (1, 2),
    (0, 1),
    (0, 2),
    (1, 3),
    (2, 4),
    (3, 5),
    (4, 6),
    (17, 0),
    (17, 5),
    (17, 6),
    (17, 11),
    (17, 12),
];

/// Which keypoints are joined by a line.
///
/// Slots index into a `DetectedObject`'s keypoint list. The topology is
/// configured locally and shared by every object.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SkeletonTopology {
    edges: Vec<(usize, usize)>,
}

impl SkeletonTopology {
    pub fn new(edges: impl Into<Vec<(usize, usize)>>) -> Self {
        Self {
            edges: edges.into(),
        }
    }

    pub fn trt_pose() -> Self {
        Self::new(TRT_POSE_LINKS.to_vec())
    }

    pub fn edges(&self) -> &[(usize, usize)] {
        &self.edges
    }
}

impl Default for SkeletonTopology {
    fn default() -> Self {
        Self::trt_pose()
    }
}
