//! Camera capture.
//!
//! - `CaptureDevice`: the seam the pipeline reads frames through.
//! - `CaptureSource`: picks a backend from a device string.
//!   - `stub://<name>`: synthetic moving test pattern (tests, demos)
//!   - `/dev/videoN`: V4L2 device (feature: capture-v4l2)
//!
//! Requested dimensions are only ideals. Everything downstream reads the
//! `NegotiatedFormat` returned by `open` and never assumes the request was
//! honored.

mod convert;
mod synthetic;
#[cfg(feature = "capture-v4l2")]
mod v4l2;

use std::sync::Arc;

pub use convert::{to_rgb_image, PixelFormat};
pub use synthetic::SyntheticCamera;
#[cfg(feature = "capture-v4l2")]
pub use v4l2::V4l2Camera;

use crate::error::DeviceError;
use crate::frame::Frame;
use crate::render::Dimensions;

/// Ideal capture parameters requested from the device.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CaptureConstraints {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
}

impl Default for CaptureConstraints {
    fn default() -> Self {
        Self {
            width: 640,
            height: 480,
            fps: 30,
        }
    }
}

/// What the device actually delivers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NegotiatedFormat {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
}

impl NegotiatedFormat {
    pub fn dimensions(&self) -> Dimensions {
        Dimensions::new(self.width, self.height)
    }
}

pub trait CaptureDevice {
    /// Acquire the device. Failure is terminal for the caller.
    fn open(&mut self, constraints: &CaptureConstraints) -> Result<NegotiatedFormat, DeviceError>;

    /// Most recent decoded frame. Never blocks; `None` until the first
    /// frame arrives or after `close`.
    fn latest_frame(&mut self) -> Option<Arc<Frame>>;

    /// Release every underlying track. Safe to call repeatedly.
    fn close(&mut self);

    fn is_open(&self) -> bool;
}

impl<D: CaptureDevice + ?Sized> CaptureDevice for Box<D> {
    fn open(&mut self, constraints: &CaptureConstraints) -> Result<NegotiatedFormat, DeviceError> {
        (**self).open(constraints)
    }

    fn latest_frame(&mut self) -> Option<Arc<Frame>> {
        (**self).latest_frame()
    }

    fn close(&mut self) {
        (**self).close()
    }

    fn is_open(&self) -> bool {
        (**self).is_open()
    }
}

/// Frame counters for a capture backend.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CaptureStats {
    pub frames_captured: u64,
    pub device: String,
}

/// Capture backend chosen from a device string.
pub struct CaptureSource {
    backend: CaptureBackend,
}

enum CaptureBackend {
    Synthetic(SyntheticCamera),
    #[cfg(feature = "capture-v4l2")]
    Device(V4l2Camera),
}

impl CaptureSource {
    pub fn new(device: &str) -> Result<Self, DeviceError> {
        if let Some(name) = device.strip_prefix("stub://") {
            return Ok(Self {
                backend: CaptureBackend::Synthetic(SyntheticCamera::new(name)),
            });
        }
        #[cfg(feature = "capture-v4l2")]
        if device.starts_with("/dev/video") {
            return Ok(Self {
                backend: CaptureBackend::Device(V4l2Camera::new(device)),
            });
        }
        Err(DeviceError::Unsupported(device.to_string()))
    }

    pub fn stats(&self) -> CaptureStats {
        match &self.backend {
            CaptureBackend::Synthetic(camera) => camera.stats(),
            #[cfg(feature = "capture-v4l2")]
            CaptureBackend::Device(camera) => camera.stats(),
        }
    }
}

impl From<SyntheticCamera> for CaptureSource {
    fn from(camera: SyntheticCamera) -> Self {
        Self {
            backend: CaptureBackend::Synthetic(camera),
        }
    }
}

impl CaptureDevice for CaptureSource {
    fn open(&mut self, constraints: &CaptureConstraints) -> Result<NegotiatedFormat, DeviceError> {
        match &mut self.backend {
            CaptureBackend::Synthetic(camera) => camera.open(constraints),
            #[cfg(feature = "capture-v4l2")]
            CaptureBackend::Device(camera) => camera.open(constraints),
        }
    }

    fn latest_frame(&mut self) -> Option<Arc<Frame>> {
        match &mut self.backend {
            CaptureBackend::Synthetic(camera) => camera.latest_frame(),
            #[cfg(feature = "capture-v4l2")]
            CaptureBackend::Device(camera) => camera.latest_frame(),
        }
    }

    fn close(&mut self) {
        match &mut self.backend {
            CaptureBackend::Synthetic(camera) => camera.close(),
            #[cfg(feature = "capture-v4l2")]
            CaptureBackend::Device(camera) => camera.close(),
        }
    }

    fn is_open(&self) -> bool {
        match &self.backend {
            CaptureBackend::Synthetic(camera) => camera.is_open(),
            #[cfg(feature = "capture-v4l2")]
            CaptureBackend::Device(camera) => camera.is_open(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stub_device_selects_synthetic_backend() {
        let mut source = CaptureSource::new("stub://camera").unwrap();
        let format = source.open(&CaptureConstraints::default()).unwrap();
        assert_eq!(format.dimensions(), Dimensions::new(640, 480));
        assert!(source.latest_frame().is_some());
        assert_eq!(source.stats().device, "stub://camera");
    }

    #[test]
    fn unknown_device_is_unsupported() {
        let err = CaptureSource::new("rtsp://10.0.0.2/stream")
            .err()
            .unwrap();
        assert_eq!(
            err,
            DeviceError::Unsupported("rtsp://10.0.0.2/stream".to_string())
        );
    }
}
