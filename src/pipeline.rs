//! The streaming pipeline.
//!
//! `Pipeline` ties capture, pacing, the connection and the renderer
//! together in a single-threaded loop. The owner calls `tick` once per
//! display refresh. Each tick, in order:
//! 1. drains inbound events (which also fires the reconnect timer) and
//!    reclaims a stale in-flight permit, dropping the connection it was
//!    sent on,
//! 2. renders the mirrored frame and the latest detections, or the last
//!    server-annotated frame when the service draws the overlay itself,
//! 3. sends a frame if the scheduler says one is due and the guard admits it.
//!
//! Results leave through a `ResultsSink`.

use std::sync::Arc;
use std::time::Instant;

use crate::capture::{CaptureDevice, NegotiatedFormat};
use crate::config::PipelineConfig;
use crate::detect::DetectionSet;
use crate::error::{MessageFormatError, PipelineError};
use crate::frame::Frame;
use crate::pacing::{InflightGuard, PacingScheduler};
use crate::protocol::{AnnotatedFrame, InboundMessage, OutboundMessage};
use crate::render::{OverlayRenderer, OverlayStyle, RenderStats, Surface};
use crate::transport::{
    Connection, ConnectionState, ConnectionStats, DetectionMode, Endpoint, Transport,
};

/// Receives processed results. Every method defaults to doing nothing.
pub trait ResultsSink {
    fn on_detections(&mut self, _detections: &DetectionSet) {}
    fn on_annotated_frame(&mut self, _frame: &AnnotatedFrame) {}
    fn on_server_error(&mut self, _message: &str) {}
    fn on_state_change(&mut self, _state: ConnectionState) {}
}

pub struct NullSink;

impl ResultsSink for NullSink {}

/// What happened to the send slot on one tick.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SendOutcome {
    #[default]
    NotDue,
    Sent(u64),
    /// A frame is still awaiting its response.
    DroppedInflight,
    NotConnected,
    NoFrame,
    Failed,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TickReport {
    pub rendered: Option<RenderStats>,
    pub send: SendOutcome,
    pub inbound: usize,
    pub connection: ConnectionState,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PipelineStats {
    pub ticks: u64,
    pub frames_sent: u64,
    pub dropped_inflight: u64,
    pub send_failures: u64,
    pub detections_received: u64,
    pub annotated_frames: u64,
    pub server_errors: u64,
    pub malformed: u64,
    pub expired_permits: u64,
}

pub struct Pipeline<C, T, S>
where
    C: CaptureDevice,
    T: Transport,
    S: Surface,
{
    capture: C,
    format: NegotiatedFormat,
    connection: Connection<T>,
    surface: S,
    renderer: OverlayRenderer,
    scheduler: PacingScheduler,
    guard: InflightGuard,
    detections: DetectionSet,
    /// Server-rendered picture, shown instead of the live frame until the
    /// next result.
    annotated: Option<AnnotatedFrame>,
    last_frame: Option<Arc<Frame>>,
    sink: Box<dyn ResultsSink>,
    jpeg_quality: u8,
    last_state: ConnectionState,
    stats: PipelineStats,
    shut_down: bool,
}

impl<C, T, S> Pipeline<C, T, S>
where
    C: CaptureDevice,
    T: Transport,
    S: Surface,
{
    /// Open the camera, then the connection.
    ///
    /// Only a bad endpoint or a camera failure is returned; a service that
    /// is down just leaves the connection retrying.
    pub fn start(
        config: &PipelineConfig,
        mut capture: C,
        transport: T,
        surface: S,
        now: Instant,
    ) -> Result<Self, PipelineError> {
        let endpoint = config
            .endpoint()
            .map_err(|err| PipelineError::Config(err.to_string()))?;
        let format = capture.open(&config.constraints())?;
        log::info!(
            "Pipeline: capture negotiated {}x{} @ {} fps",
            format.width,
            format.height,
            format.fps
        );

        let mut connection = Connection::new(transport, endpoint, config.reconnect_delay);
        connection.open(now);

        Ok(Self {
            capture,
            format,
            last_state: ConnectionState::Disconnected,
            connection,
            surface,
            renderer: OverlayRenderer::new(OverlayStyle::default(), config.topology()),
            scheduler: PacingScheduler::new(config.pacing.target_fps),
            guard: InflightGuard::new(config.inflight_timeout),
            detections: DetectionSet::new(),
            annotated: None,
            last_frame: None,
            sink: Box::new(NullSink),
            jpeg_quality: config.jpeg_quality,
            stats: PipelineStats::default(),
            shut_down: false,
        })
    }

    pub fn with_sink(mut self, sink: Box<dyn ResultsSink>) -> Self {
        self.sink = sink;
        self.sync_state();
        self
    }

    pub fn with_renderer(mut self, renderer: OverlayRenderer) -> Self {
        self.renderer = renderer;
        self
    }

    pub fn tick(&mut self, now: Instant) -> TickReport {
        let mut report = TickReport {
            rendered: None,
            send: SendOutcome::NotDue,
            inbound: 0,
            connection: self.connection.state(),
        };
        if self.shut_down {
            return report;
        }
        self.stats.ticks += 1;

        let poll = self.connection.poll(now);
        if poll.lost {
            if let Some(ticket) = self.guard.release() {
                log::debug!("Pipeline: connection lost with frame {} in flight", ticket.sequence);
            }
        }
        report.inbound = poll.inbound.len();
        for message in poll.inbound {
            self.handle_inbound(message);
        }
        if self.guard.expire_stale(now).is_some() {
            // Replies carry no sequence: the late one must not reach the
            // next frame's permit, so its wire goes too.
            self.stats.expired_permits += 1;
            self.connection.restart(now);
        }
        self.sync_state();

        let plan = self.scheduler.on_tick(now);
        if let Some(frame) = self.capture.latest_frame() {
            self.last_frame = Some(frame);
        }

        if plan.render {
            let rendered = match &self.annotated {
                Some(annotated) => self.renderer.render_annotated(&mut self.surface, annotated),
                None => self.renderer.render(
                    &mut self.surface,
                    self.last_frame.as_deref(),
                    self.format.dimensions(),
                    &self.detections,
                ),
            };
            match rendered {
                Ok(stats) => report.rendered = Some(stats),
                Err(err) => log::debug!("Pipeline: skipping render: {}", err),
            }
        }

        if plan.send {
            report.send = self.send_latest(now);
            self.sync_state();
        }

        report.connection = self.connection.state();
        report
    }

    /// Reconnect to the same service with another detection model.
    pub fn switch_mode(&mut self, mode: DetectionMode, now: Instant) {
        if self.shut_down {
            return;
        }
        let endpoint = self.connection.endpoint().with_mode(mode);
        self.guard.release();
        self.detections.clear();
        self.annotated = None;
        self.connection.reconfigure(endpoint, now);
        self.sync_state();
    }

    /// Stop everything: scheduler, guard, connection, camera. Idempotent.
    pub fn shutdown(&mut self) {
        if self.shut_down {
            return;
        }
        self.shut_down = true;
        self.scheduler.cancel();
        self.guard.cancel();
        self.connection.close();
        self.capture.close();
        self.sync_state();
        log::info!("Pipeline: shut down after {} ticks", self.stats.ticks);
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.connection.state()
    }

    pub fn connection_stats(&self) -> &ConnectionStats {
        self.connection.stats()
    }

    pub fn endpoint(&self) -> &Endpoint {
        self.connection.endpoint()
    }

    pub fn capture_format(&self) -> NegotiatedFormat {
        self.format
    }

    pub fn capture(&self) -> &C {
        &self.capture
    }

    pub fn transport(&self) -> &T {
        self.connection.transport()
    }

    pub fn detections(&self) -> &DetectionSet {
        &self.detections
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    pub fn surface_mut(&mut self) -> &mut S {
        &mut self.surface
    }

    /// The server-rendered frame currently on screen, if any.
    pub fn annotated(&self) -> Option<&AnnotatedFrame> {
        self.annotated.as_ref()
    }

    pub fn outstanding(&self) -> usize {
        self.guard.outstanding()
    }

    pub fn stats(&self) -> &PipelineStats {
        &self.stats
    }

    fn send_latest(&mut self, now: Instant) -> SendOutcome {
        if self.connection.state() != ConnectionState::Connected {
            return SendOutcome::NotConnected;
        }
        let Some(frame) = self.last_frame.clone() else {
            return SendOutcome::NoFrame;
        };
        if !self.guard.try_admit(frame.sequence(), now) {
            self.stats.dropped_inflight += 1;
            return SendOutcome::DroppedInflight;
        }

        let message = match OutboundMessage::encode(&frame, self.jpeg_quality) {
            Ok(message) => message,
            Err(err) => {
                log::warn!("Pipeline: failed to encode frame {}: {}", frame.sequence(), err);
                self.guard.release();
                self.stats.send_failures += 1;
                return SendOutcome::Failed;
            }
        };
        match self.connection.send(&message, now) {
            Ok(()) => {
                self.stats.frames_sent += 1;
                log::debug!(
                    "Pipeline: sent frame {} ({} bytes)",
                    message.sequence,
                    message.jpeg.len()
                );
                SendOutcome::Sent(message.sequence)
            }
            Err(_) => {
                // Already logged by the connection, which is now retrying.
                self.guard.release();
                self.stats.send_failures += 1;
                SendOutcome::Failed
            }
        }
    }

    fn handle_inbound(&mut self, message: Result<InboundMessage, MessageFormatError>) {
        self.guard.release();
        match message {
            Ok(InboundMessage::Detections(objects)) => {
                log::debug!("Pipeline: {} detections", objects.len());
                self.detections.replace(objects);
                self.annotated = None;
                self.stats.detections_received += 1;
                self.sink.on_detections(&self.detections);
            }
            Ok(InboundMessage::AnnotatedFrame(frame)) => {
                self.detections.clear();
                self.stats.annotated_frames += 1;
                self.sink.on_annotated_frame(&frame);
                self.annotated = Some(frame);
            }
            Ok(InboundMessage::ServerError(reason)) => {
                log::warn!("Pipeline: service reported an error: {}", reason);
                self.stats.server_errors += 1;
                self.sink.on_server_error(&reason);
            }
            Err(err) => {
                log::warn!("Pipeline: dropping malformed message: {}", err);
                self.stats.malformed += 1;
            }
        }
    }

    fn sync_state(&mut self) {
        let state = self.connection.state();
        if state != self.last_state {
            self.last_state = state;
            self.sink.on_state_change(state);
        }
    }
}

impl<C, T, S> Drop for Pipeline<C, T, S>
where
    C: CaptureDevice,
    T: Transport,
    S: Surface,
{
    fn drop(&mut self) {
        self.shutdown();
    }
}
