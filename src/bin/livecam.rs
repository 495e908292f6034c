//! livecam - stream a camera to an inference service and draw the results
//!
//! Frames are captured locally, paced to `target_fps`, and sent one at a
//! time; detections that come back are drawn mirrored over the live frame
//! at the display rate. Ctrl-C tears everything down.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::mpsc;
use std::time::{Duration, Instant};

use livecam_overlay::{
    load_font, AnnotatedFrame, CaptureSource, ConnectionState, DetectionSet, Pipeline,
    PipelineConfig, RasterSurface, ResultsSink, SendOutcome, TransportKind, WireFraming,
};
use livecam_overlay::render::Dimensions;

#[derive(Parser, Debug)]
#[command(author, version, about = "Stream camera frames to an inference service with live overlays")]
struct Args {
    /// Path to a TOML config file.
    #[arg(long, env = "LIVECAM_CONFIG")]
    config: Option<PathBuf>,

    /// Service base URL (ws://, wss://, http:// or https://).
    #[arg(long)]
    endpoint: Option<String>,

    /// Detection model, e.g. skeleton or emotion.
    #[arg(long)]
    mode: Option<String>,

    /// socket or http.
    #[arg(long)]
    transport: Option<TransportKind>,

    /// Socket framing: binary, base64 or json.
    #[arg(long)]
    framing: Option<WireFraming>,

    /// Capture device (stub://<name> or /dev/videoN).
    #[arg(long)]
    device: Option<String>,

    /// Outbound frame rate.
    #[arg(long)]
    target_fps: Option<u32>,

    /// Stop after this many seconds instead of waiting for Ctrl-C.
    #[arg(long)]
    seconds: Option<u64>,

    /// Write the last rendered surface to this PNG on exit.
    #[arg(long)]
    snapshot: Option<PathBuf>,

    /// Font for label text.
    #[arg(long)]
    font: Option<PathBuf>,

    /// Show the overlay in a desktop window.
    #[cfg(feature = "window")]
    #[arg(long)]
    window: bool,
}

#[derive(Default)]
struct LogSink {
    results: u64,
}

impl ResultsSink for LogSink {
    fn on_detections(&mut self, detections: &DetectionSet) {
        self.results += 1;
        for object in detections.objects() {
            log::debug!("  {} bbox={:?}", object.caption(), object.bbox);
        }
        if self.results % 50 == 0 {
            log::info!("{} results received, {} objects in view", self.results, detections.len());
        }
    }

    fn on_annotated_frame(&mut self, frame: &AnnotatedFrame) {
        self.results += 1;
        if let Some(activity) = &frame.log {
            log::info!(
                "frame {}: {} people, actions {:?}",
                activity.frame,
                activity.num_people,
                activity.actions
            );
        }
    }

    fn on_server_error(&mut self, message: &str) {
        log::warn!("inference service error: {}", message);
    }

    fn on_state_change(&mut self, state: ConnectionState) {
        log::info!("connection {}", state);
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let config = build_config(&args)?;

    let capture = CaptureSource::new(&config.capture.device)
        .with_context(|| format!("select capture device {}", config.capture.device))?;
    let transport = config.transport();
    let mut surface = RasterSurface::new(Dimensions::default());
    if let Some(path) = &config.render.font {
        surface = surface.with_font(load_font(path)?);
    }

    let mut pipeline = Pipeline::start(&config, capture, transport, surface, Instant::now())
        .context("start pipeline")?
        .with_sink(Box::new(LogSink::default()));
    let dimensions = config.render_dimensions(pipeline.capture_format().dimensions());
    pipeline.surface_mut().resize(dimensions);
    log::info!(
        "livecam: {} -> {} ({} fps out, {} Hz display, surface {})",
        config.capture.device,
        pipeline.endpoint(),
        config.pacing.target_fps,
        config.pacing.display_hz,
        dimensions
    );

    let (tx, rx) = mpsc::channel();
    ctrlc::set_handler(move || {
        let _ = tx.send(());
    })
    .context("install Ctrl-C handler")?;

    #[cfg(feature = "window")]
    let mut window = if args.window {
        Some(livecam_overlay::render::WindowPresenter::new("livecam", dimensions)?)
    } else {
        None
    };

    let deadline = args.seconds.map(|s| Instant::now() + Duration::from_secs(s));
    let interval = config.display_interval();
    loop {
        if rx.try_recv().is_ok() {
            log::info!("shutdown signal received");
            break;
        }
        let now = Instant::now();
        if deadline.is_some_and(|deadline| now >= deadline) {
            break;
        }

        let report = pipeline.tick(now);
        if let SendOutcome::Sent(sequence) = report.send {
            log::debug!("frame {} sent", sequence);
        }

        #[cfg(feature = "window")]
        if let Some(window) = window.as_mut() {
            if !window.is_open() {
                break;
            }
            window.present(pipeline.surface())?;
        }

        std::thread::sleep(interval.saturating_sub(now.elapsed()));
    }

    if let Some(path) = &args.snapshot {
        pipeline.surface().save_png(path)?;
        log::info!("snapshot written to {}", path.display());
    }
    pipeline.shutdown();

    let stats = pipeline.stats();
    log::info!(
        "sent {} frames, {} results, {} dropped while in flight, {} malformed",
        stats.frames_sent,
        stats.detections_received + stats.annotated_frames,
        stats.dropped_inflight,
        stats.malformed
    );
    Ok(())
}

fn build_config(args: &Args) -> Result<PipelineConfig> {
    let mut config = PipelineConfig::load_from(args.config.as_deref())?;
    if let Some(endpoint) = &args.endpoint {
        config.endpoint.url = endpoint.clone();
    }
    if let Some(mode) = &args.mode {
        config.endpoint.mode = mode.clone();
    }
    if let Some(transport) = args.transport {
        config.endpoint.transport = transport;
    }
    if let Some(framing) = args.framing {
        config.endpoint.framing = framing;
    }
    if let Some(device) = &args.device {
        config.capture.device = device.clone();
    }
    if let Some(fps) = args.target_fps {
        config.pacing.target_fps = fps;
    }
    if let Some(font) = &args.font {
        config.render.font = Some(font.clone());
    }
    config.validate()?;
    Ok(config)
}
