use std::io::Write;
use std::sync::Mutex;
use std::time::Duration;

use tempfile::NamedTempFile;

use livecam_overlay::config::PipelineConfig;
use livecam_overlay::render::Dimensions;
use livecam_overlay::{EndpointStyle, TransportKind, WireFraming};

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn clear_env() {
    for key in [
        "LIVECAM_CONFIG",
        "LIVECAM_ENDPOINT",
        "LIVECAM_MODE",
        "LIVECAM_TRANSPORT",
        "LIVECAM_FRAMING",
        "LIVECAM_DEVICE",
        "LIVECAM_TARGET_FPS",
        "LIVECAM_RECONNECT_MS",
    ] {
        std::env::remove_var(key);
    }
}

fn write_config(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("temp config");
    file.write_all(contents.as_bytes()).expect("write config");
    file
}

#[test]
fn defaults_without_file_or_env() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let cfg = PipelineConfig::load().expect("load config");

    assert_eq!(cfg.endpoint.url, "ws://127.0.0.1:9000");
    assert_eq!(cfg.endpoint.mode, "skeleton");
    assert_eq!(cfg.endpoint.style, EndpointStyle::Path);
    assert_eq!(cfg.endpoint.transport, TransportKind::Socket);
    assert_eq!(cfg.endpoint.framing, WireFraming::Binary);
    assert_eq!(cfg.capture.device, "stub://camera");
    assert_eq!((cfg.capture.width, cfg.capture.height, cfg.capture.fps), (640, 480, 30));
    assert_eq!(cfg.pacing.target_fps, 15);
    assert_eq!(cfg.pacing.display_hz, 60);
    assert_eq!(cfg.reconnect_delay, Duration::from_millis(3000));
    assert_eq!(cfg.inflight_timeout, None);
    assert_eq!(cfg.jpeg_quality, 80);
    assert_eq!(cfg.topology().edges().len(), 21);
    assert_eq!(
        cfg.render_dimensions(Dimensions::new(1280, 720)),
        Dimensions::new(1280, 720)
    );
    assert_eq!(
        cfg.endpoint().unwrap().socket_url().as_str(),
        "ws://127.0.0.1:9000/ws/camera/skeleton"
    );
}

#[test]
fn loads_config_from_file_and_env_overrides() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let file = write_config(
        r#"
reconnect_delay_ms = 1500
inflight_timeout_ms = 750
jpeg_quality = 65

[endpoint]
url = "http://10.0.0.5:8000"
mode = "emotion"
style = "query"
transport = "http"
framing = "json"

[capture]
device = "stub://desk"
width = 1280
height = 720
fps = 25

[pacing]
target_fps = 5
display_hz = 30

[render]
width = 640
height = 360
skeleton = [[0, 1], [1, 2]]
"#,
    );

    std::env::set_var("LIVECAM_CONFIG", file.path());
    std::env::set_var("LIVECAM_MODE", "skeleton");
    std::env::set_var("LIVECAM_TARGET_FPS", "8");
    std::env::set_var("LIVECAM_FRAMING", "base64");

    let cfg = PipelineConfig::load().expect("load config");

    assert_eq!(cfg.endpoint.url, "http://10.0.0.5:8000");
    assert_eq!(cfg.endpoint.mode, "skeleton");
    assert_eq!(cfg.endpoint.style, EndpointStyle::Query);
    assert_eq!(cfg.endpoint.transport, TransportKind::Http);
    assert_eq!(cfg.endpoint.framing, WireFraming::Base64);
    assert_eq!(cfg.capture.device, "stub://desk");
    assert_eq!(cfg.constraints().width, 1280);
    assert_eq!(cfg.constraints().fps, 25);
    assert_eq!(cfg.pacing.target_fps, 8);
    assert_eq!(cfg.pacing.display_hz, 30);
    assert_eq!(cfg.reconnect_delay, Duration::from_millis(1500));
    assert_eq!(cfg.inflight_timeout, Some(Duration::from_millis(750)));
    assert_eq!(cfg.jpeg_quality, 65);
    assert_eq!(cfg.topology().edges(), &[(0, 1), (1, 2)]);
    assert_eq!(
        cfg.render_dimensions(Dimensions::new(1280, 720)),
        Dimensions::new(640, 360)
    );
    assert_eq!(
        cfg.endpoint().unwrap().process_frame_url().as_str(),
        "http://10.0.0.5:8000/process-frame"
    );

    clear_env();
}

#[test]
fn rejects_invalid_values() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("LIVECAM_TARGET_FPS", "fast");
    assert!(PipelineConfig::load().is_err());
    clear_env();

    std::env::set_var("LIVECAM_MODE", "../admin");
    assert!(PipelineConfig::load().is_err());
    clear_env();

    std::env::set_var("LIVECAM_TRANSPORT", "carrier-pigeon");
    assert!(PipelineConfig::load().is_err());
    clear_env();

    let file = write_config("[pacing]\ntarget_fps = 0\n");
    std::env::set_var("LIVECAM_CONFIG", file.path());
    assert!(PipelineConfig::load().is_err());
    clear_env();

    let file = write_config("[endpoint]\nurl = \"ftp://host\"\n");
    assert!(PipelineConfig::load_from(Some(file.path())).is_err());

    let file = write_config("unknown_key = 1\n");
    assert!(PipelineConfig::load_from(Some(file.path())).is_err());
}

#[test]
fn missing_config_file_is_an_error() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let dir = tempfile::tempdir().expect("temp dir");
    let missing = dir.path().join("absent.toml");
    let err = PipelineConfig::load_from(Some(&missing)).unwrap_err();
    assert!(err.to_string().contains("absent.toml"));
}
