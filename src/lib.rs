//! Live camera overlay client.
//!
//! Streams camera frames to a remote inference service and draws the
//! detections it returns (boxes, skeletons, per-track labels) back over
//! the live video, mirrored the way users expect to see themselves.
//!
//! # Pipeline
//!
//! Capture → pacing gate → in-flight guard → transport → service →
//! transport → overlay renderer → surface. The renderer redraws every
//! display tick whether or not a new result arrived.
//!
//! # Module Structure
//!
//! - `capture`: camera devices (synthetic, V4L2)
//! - `pacing`: send cadence and the single in-flight permit
//! - `protocol`: wire codec for frames and results
//! - `transport`: WebSocket and HTTP transports plus the reconnecting `Connection`
//! - `detect`: detection results and skeleton topology
//! - `render`: surfaces and the mirrored overlay renderer
//! - `pipeline`: the tick loop tying it together
//! - `config`: file and environment configuration

pub mod capture;
pub mod config;
pub mod detect;
pub mod error;
pub mod frame;
pub mod pacing;
pub mod pipeline;
pub mod protocol;
pub mod render;
pub mod transport;

pub use capture::{CaptureConstraints, CaptureDevice, CaptureSource, NegotiatedFormat, SyntheticCamera};
pub use config::PipelineConfig;
pub use detect::{BoundingBox, DetectedObject, DetectionSet, Keypoint, SkeletonTopology};
pub use error::{DeviceError, MessageFormatError, PipelineError, RenderPreconditionError, TransportError};
pub use frame::Frame;
pub use pacing::{InflightGuard, PacingScheduler, TickPlan};
pub use pipeline::{NullSink, Pipeline, PipelineStats, ResultsSink, SendOutcome, TickReport};
pub use protocol::{ActivityLog, AnnotatedFrame, InboundMessage, OutboundMessage, WireFraming};
pub use render::{load_font, OverlayRenderer, RasterSurface, RecordingSurface, Surface};
pub use transport::{
    Connection, ConnectionState, DetectionMode, Endpoint, EndpointStyle, HttpTransport,
    SocketTransport, Transport, TransportEvent, TransportKind,
};
