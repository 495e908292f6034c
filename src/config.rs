use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::capture::CaptureConstraints;
use crate::detect::SkeletonTopology;
use crate::protocol::{WireFraming, DEFAULT_JPEG_QUALITY};
use crate::render::Dimensions;
use crate::transport::{
    DetectionMode, Endpoint, EndpointStyle, HttpTransport, SocketTransport, Transport,
    TransportKind,
};

const DEFAULT_ENDPOINT: &str = "ws://127.0.0.1:9000";
const DEFAULT_MODE: &str = "skeleton";
const DEFAULT_DEVICE: &str = "stub://camera";
const DEFAULT_CAPTURE_WIDTH: u32 = 640;
const DEFAULT_CAPTURE_HEIGHT: u32 = 480;
const DEFAULT_CAPTURE_FPS: u32 = 30;
const DEFAULT_TARGET_FPS: u32 = 15;
const DEFAULT_DISPLAY_HZ: u32 = 60;
const DEFAULT_RECONNECT_MS: u64 = 3000;
/// 0 disables the stale-permit timeout.
const DEFAULT_INFLIGHT_TIMEOUT_MS: u64 = 0;
const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 5000;

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct PipelineConfigFile {
    endpoint: Option<EndpointConfigFile>,
    capture: Option<CaptureConfigFile>,
    pacing: Option<PacingConfigFile>,
    render: Option<RenderConfigFile>,
    reconnect_delay_ms: Option<u64>,
    /// 0 disables the stale-permit timeout.
    inflight_timeout_ms: Option<u64>,
    jpeg_quality: Option<u8>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct EndpointConfigFile {
    url: Option<String>,
    mode: Option<String>,
    style: Option<EndpointStyle>,
    transport: Option<TransportKind>,
    framing: Option<WireFraming>,
    connect_timeout_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct CaptureConfigFile {
    device: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    fps: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct PacingConfigFile {
    target_fps: Option<u32>,
    display_hz: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct RenderConfigFile {
    width: Option<u32>,
    height: Option<u32>,
    font: Option<PathBuf>,
    skeleton: Option<Vec<[usize; 2]>>,
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub endpoint: EndpointSettings,
    pub capture: CaptureSettings,
    pub pacing: PacingSettings,
    pub render: RenderSettings,
    pub reconnect_delay: Duration,
    pub inflight_timeout: Option<Duration>,
    pub jpeg_quality: u8,
}

#[derive(Debug, Clone)]
pub struct EndpointSettings {
    pub url: String,
    pub mode: String,
    pub style: EndpointStyle,
    pub transport: TransportKind,
    pub framing: WireFraming,
    pub connect_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct CaptureSettings {
    pub device: String,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
}

#[derive(Debug, Clone)]
pub struct PacingSettings {
    pub target_fps: u32,
    pub display_hz: u32,
}

/// Surface size defaults to the negotiated capture size when unset.
#[derive(Debug, Clone, Default)]
pub struct RenderSettings {
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub font: Option<PathBuf>,
    /// Skeleton edges as 0-based keypoint slots; trt_pose links when unset.
    pub skeleton: Option<Vec<(usize, usize)>>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        // Defaults are always valid.
        Self::from_file(PipelineConfigFile::default())
    }
}

impl PipelineConfig {
    /// Defaults, then the file named by `LIVECAM_CONFIG`, then env overrides.
    pub fn load() -> Result<Self> {
        let path = std::env::var("LIVECAM_CONFIG").ok().map(PathBuf::from);
        Self::load_from(path.as_deref())
    }

    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        let file_cfg = match path {
            Some(path) => read_config_file(path)?,
            None => PipelineConfigFile::default(),
        };
        let mut cfg = Self::from_file(file_cfg);
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: PipelineConfigFile) -> Self {
        let endpoint = file.endpoint.unwrap_or_default();
        let capture = file.capture.unwrap_or_default();
        let pacing = file.pacing.unwrap_or_default();
        let render = file.render.unwrap_or_default();

        Self {
            endpoint: EndpointSettings {
                url: endpoint.url.unwrap_or_else(|| DEFAULT_ENDPOINT.to_string()),
                mode: endpoint.mode.unwrap_or_else(|| DEFAULT_MODE.to_string()),
                style: endpoint.style.unwrap_or_default(),
                transport: endpoint.transport.unwrap_or_default(),
                framing: endpoint.framing.unwrap_or_default(),
                connect_timeout: Duration::from_millis(
                    endpoint
                        .connect_timeout_ms
                        .unwrap_or(DEFAULT_CONNECT_TIMEOUT_MS),
                ),
            },
            capture: CaptureSettings {
                device: capture.device.unwrap_or_else(|| DEFAULT_DEVICE.to_string()),
                width: capture.width.unwrap_or(DEFAULT_CAPTURE_WIDTH),
                height: capture.height.unwrap_or(DEFAULT_CAPTURE_HEIGHT),
                fps: capture.fps.unwrap_or(DEFAULT_CAPTURE_FPS),
            },
            pacing: PacingSettings {
                target_fps: pacing.target_fps.unwrap_or(DEFAULT_TARGET_FPS),
                display_hz: pacing.display_hz.unwrap_or(DEFAULT_DISPLAY_HZ),
            },
            render: RenderSettings {
                width: render.width,
                height: render.height,
                font: render.font,
                skeleton: render
                    .skeleton
                    .map(|edges| edges.into_iter().map(|[a, b]| (a, b)).collect()),
            },
            reconnect_delay: Duration::from_millis(
                file.reconnect_delay_ms.unwrap_or(DEFAULT_RECONNECT_MS),
            ),
            inflight_timeout: match file
                .inflight_timeout_ms
                .unwrap_or(DEFAULT_INFLIGHT_TIMEOUT_MS)
            {
                0 => None,
                ms => Some(Duration::from_millis(ms)),
            },
            jpeg_quality: file.jpeg_quality.unwrap_or(DEFAULT_JPEG_QUALITY),
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Some(url) = env_value("LIVECAM_ENDPOINT") {
            self.endpoint.url = url;
        }
        if let Some(mode) = env_value("LIVECAM_MODE") {
            self.endpoint.mode = mode;
        }
        if let Some(transport) = env_value("LIVECAM_TRANSPORT") {
            self.endpoint.transport = transport
                .parse()
                .map_err(|err| anyhow!("LIVECAM_TRANSPORT: {}", err))?;
        }
        if let Some(framing) = env_value("LIVECAM_FRAMING") {
            self.endpoint.framing = framing
                .parse()
                .map_err(|err| anyhow!("LIVECAM_FRAMING: {}", err))?;
        }
        if let Some(device) = env_value("LIVECAM_DEVICE") {
            self.capture.device = device;
        }
        if let Some(fps) = env_value("LIVECAM_TARGET_FPS") {
            self.pacing.target_fps = fps
                .parse()
                .map_err(|_| anyhow!("LIVECAM_TARGET_FPS must be an integer frame rate"))?;
        }
        if let Some(ms) = env_value("LIVECAM_RECONNECT_MS") {
            let ms: u64 = ms
                .parse()
                .map_err(|_| anyhow!("LIVECAM_RECONNECT_MS must be an integer number of milliseconds"))?;
            self.reconnect_delay = Duration::from_millis(ms);
        }
        Ok(())
    }

    /// Check invariants. Call again after applying CLI overrides.
    pub fn validate(&self) -> Result<()> {
        self.endpoint()
            .map_err(|err| anyhow!("invalid endpoint configuration: {}", err))?;
        if self.pacing.target_fps == 0 {
            return Err(anyhow!("target_fps must be greater than zero"));
        }
        if self.pacing.display_hz == 0 {
            return Err(anyhow!("display_hz must be greater than zero"));
        }
        if self.capture.width == 0 || self.capture.height == 0 {
            return Err(anyhow!("capture dimensions must be non-zero"));
        }
        if self.reconnect_delay.is_zero() {
            return Err(anyhow!("reconnect delay must be greater than zero"));
        }
        if !(1..=100).contains(&self.jpeg_quality) {
            return Err(anyhow!("jpeg_quality must be between 1 and 100"));
        }
        if matches!(self.render.width, Some(0)) || matches!(self.render.height, Some(0)) {
            return Err(anyhow!("render dimensions must be non-zero"));
        }
        Ok(())
    }

    pub fn endpoint(&self) -> Result<Endpoint, crate::error::TransportError> {
        let mode = DetectionMode::new(&self.endpoint.mode)?;
        Endpoint::new(&self.endpoint.url, mode, self.endpoint.style)
    }

    /// Unconnected transport for the configured kind. `connect_timeout`
    /// bounds the socket handshake and each HTTP request.
    pub fn transport(&self) -> Box<dyn Transport> {
        match self.endpoint.transport {
            TransportKind::Socket => Box::new(
                SocketTransport::new(self.endpoint.framing)
                    .with_connect_timeout(self.endpoint.connect_timeout),
            ),
            TransportKind::Http => {
                Box::new(HttpTransport::new().with_timeout(self.endpoint.connect_timeout))
            }
        }
    }

    pub fn constraints(&self) -> CaptureConstraints {
        CaptureConstraints {
            width: self.capture.width,
            height: self.capture.height,
            fps: self.capture.fps,
        }
    }

    pub fn topology(&self) -> SkeletonTopology {
        match &self.render.skeleton {
            Some(edges) => SkeletonTopology::new(edges.clone()),
            None => SkeletonTopology::trt_pose(),
        }
    }

    /// Surface size: configured, else the negotiated capture size.
    pub fn render_dimensions(&self, capture: Dimensions) -> Dimensions {
        Dimensions::new(
            self.render.width.unwrap_or(capture.width),
            self.render.height.unwrap_or(capture.height),
        )
    }

    /// Delay between display ticks.
    pub fn display_interval(&self) -> Duration {
        Duration::from_micros(1_000_000 / self.pacing.display_hz.max(1) as u64)
    }
}

fn env_value(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn read_config_file(path: &Path) -> Result<PipelineConfigFile> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {}", path.display()))?;
    let cfg = toml::from_str(&raw)
        .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?;
    Ok(cfg)
}
