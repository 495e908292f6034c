use image::{Rgb, RgbImage};
use std::sync::Arc;

use super::{CaptureConstraints, CaptureDevice, CaptureStats, NegotiatedFormat};
use crate::error::DeviceError;
use crate::frame::Frame;

/// Synthetic camera producing a moving test pattern.
///
/// Honors the requested dimensions unless built with a fixed native
/// resolution, in which case it behaves like hardware that ignores the
/// ideals. A camera built with `failing` refuses to open.
pub struct SyntheticCamera {
    device: String,
    native: Option<(u32, u32)>,
    open_error: Option<DeviceError>,
    format: Option<NegotiatedFormat>,
    frame_count: u64,
}

impl SyntheticCamera {
    pub fn new(name: &str) -> Self {
        Self {
            device: format!("stub://{}", name),
            native: None,
            open_error: None,
            format: None,
            frame_count: 0,
        }
    }

    pub fn with_native_resolution(name: &str, width: u32, height: u32) -> Self {
        Self {
            native: Some((width, height)),
            ..Self::new(name)
        }
    }

    pub fn failing(name: &str, error: DeviceError) -> Self {
        Self {
            open_error: Some(error),
            ..Self::new(name)
        }
    }

    pub fn stats(&self) -> CaptureStats {
        CaptureStats {
            frames_captured: self.frame_count,
            device: self.device.clone(),
        }
    }

    fn render_pattern(&self, width: u32, height: u32) -> RgbImage {
        // A vertical bar sweeps across a gradient so mirroring is visible.
        let bar_x = (self.frame_count * 8 % width.max(1) as u64) as u32;
        RgbImage::from_fn(width, height, |x, y| {
            if x.abs_diff(bar_x) < 4 {
                Rgb([255, 255, 255])
            } else {
                Rgb([
                    (x * 255 / width.max(1)) as u8,
                    (y * 255 / height.max(1)) as u8,
                    (self.frame_count % 256) as u8,
                ])
            }
        })
    }
}

impl CaptureDevice for SyntheticCamera {
    fn open(&mut self, constraints: &CaptureConstraints) -> Result<NegotiatedFormat, DeviceError> {
        if let Some(err) = &self.open_error {
            log::warn!("SyntheticCamera: refusing to open {}: {}", self.device, err);
            return Err(err.clone());
        }
        let (width, height) = self
            .native
            .unwrap_or((constraints.width, constraints.height));
        let format = NegotiatedFormat {
            width,
            height,
            fps: constraints.fps,
        };
        self.format = Some(format);
        log::info!(
            "SyntheticCamera: opened {} ({}x{} @ {} fps)",
            self.device,
            width,
            height,
            format.fps
        );
        Ok(format)
    }

    fn latest_frame(&mut self) -> Option<Arc<Frame>> {
        let format = self.format?;
        self.frame_count += 1;
        let image = self.render_pattern(format.width, format.height);
        Some(Arc::new(Frame::new(self.frame_count, image)))
    }

    fn close(&mut self) {
        if self.format.take().is_some() {
            log::info!("SyntheticCamera: released {}", self.device);
        }
    }

    fn is_open(&self) -> bool {
        self.format.is_some()
    }
}
