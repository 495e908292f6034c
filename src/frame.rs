//! Captured frames.
//!
//! - `Frame`: immutable RGB raster plus capture metadata. Shared as
//!   `Arc<Frame>` between the send path and the renderer; there is no
//!   `&mut` accessor, so a frame cannot change after capture.
//! - `epoch_millis`: wall-clock timestamp used on the wire.

use image::RgbImage;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use crate::render::Dimensions;

pub struct Frame {
    sequence: u64,
    captured_at: Instant,
    timestamp_ms: u64,
    image: RgbImage,
}

impl Frame {
    /// Wrap a freshly captured raster. Called by capture backends.
    pub fn new(sequence: u64, image: RgbImage) -> Self {
        Self {
            sequence,
            captured_at: Instant::now(),
            timestamp_ms: epoch_millis(),
            image,
        }
    }

    /// Monotonic per-device sequence number, starting at 1.
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn captured_at(&self) -> Instant {
        self.captured_at
    }

    /// Capture time in milliseconds since the Unix epoch.
    pub fn timestamp_ms(&self) -> u64 {
        self.timestamp_ms
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn dimensions(&self) -> Dimensions {
        Dimensions::new(self.image.width(), self.image.height())
    }

    pub fn image(&self) -> &RgbImage {
        &self.image
    }
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Frame")
            .field("sequence", &self.sequence)
            .field("timestamp_ms", &self.timestamp_ms)
            .field("width", &self.image.width())
            .field("height", &self.image.height())
            .finish()
    }
}

pub fn epoch_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
