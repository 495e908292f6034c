//! Failure taxonomy for the streaming pipeline.
//!
//! Four classes, each with a fixed recovery policy:
//! - `DeviceError`: camera unavailable or permission denied. Fatal to the
//!   pipeline instance; the owner must start a new one.
//! - `TransportError`: connection refused, closed, or a send failed.
//!   Recovered by the reconnect timer, only ever logged.
//! - `MessageFormatError`: an inbound payload that does not parse. The
//!   message is dropped; connection state is untouched.
//! - `RenderPreconditionError`: nothing to draw yet. The tick is a no-op.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeviceError {
    #[error("camera permission denied for {device}: {reason}")]
    PermissionDenied { device: String, reason: String },
    #[error("camera {device} unavailable: {reason}")]
    Unavailable { device: String, reason: String },
    #[error("unsupported capture device '{0}'")]
    Unsupported(String),
    #[error("capture device is not open")]
    NotOpen,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(String),
    #[error("connect to {endpoint} failed: {reason}")]
    Connect { endpoint: String, reason: String },
    #[error("send failed: {0}")]
    Send(String),
    #[error("connection closed: {0}")]
    Closed(String),
    #[error("http request failed with status {status}")]
    Http { status: u16 },
    #[error("not connected")]
    NotConnected,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MessageFormatError {
    #[error("invalid json: {0}")]
    Json(String),
    #[error("message carries none of frame/detections/error")]
    MissingPayload,
    #[error("keypoint must have 2 or 3 elements, got {0}")]
    Keypoint(usize),
    #[error("invalid base64 frame: {0}")]
    Base64(String),
    #[error("undecodable frame image: {0}")]
    Image(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RenderPreconditionError {
    #[error("no captured frame available yet")]
    NoFrame,
    #[error("presentation surface has zero size")]
    SurfaceNotReady,
}

/// Errors surfaced to the owner of a pipeline.
///
/// Only device failures escape `Pipeline::start`; every other class is
/// absorbed inside the tick loop.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Device(#[from] DeviceError),
    #[error("invalid pipeline configuration: {0}")]
    Config(String),
}
