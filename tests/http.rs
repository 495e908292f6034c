use std::io::{BufRead, BufReader, Read, Write};
use std::net::TcpListener;
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

use image::RgbImage;

use livecam_overlay::protocol::{InboundMessage, OutboundMessage};
use livecam_overlay::{
    DetectionMode, Endpoint, EndpointStyle, Frame, HttpTransport, PipelineConfig, Transport,
    TransportError, TransportEvent, TransportKind,
};

struct Captured {
    request_line: String,
    body: String,
}

/// Answer one HTTP request with `status` and `body`, reporting what was
/// received.
fn serve_once(status: &'static str, body: &'static str) -> (String, mpsc::Receiver<Captured>) {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind loopback");
    let addr = listener.local_addr().expect("local addr");
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let (stream, _) = listener.accept().expect("accept");
        let mut reader = BufReader::new(stream.try_clone().expect("clone stream"));

        let mut request_line = String::new();
        reader.read_line(&mut request_line).expect("request line");
        let mut content_length = 0usize;
        loop {
            let mut header = String::new();
            reader.read_line(&mut header).expect("header");
            let header = header.trim_end();
            if header.is_empty() {
                break;
            }
            if let Some((name, value)) = header.split_once(':') {
                if name.eq_ignore_ascii_case("content-length") {
                    content_length = value.trim().parse().expect("content length");
                }
            }
        }
        let mut request_body = vec![0u8; content_length];
        reader.read_exact(&mut request_body).expect("body");

        let mut stream = stream;
        let response = format!(
            "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            status,
            body.len(),
            body
        );
        stream.write_all(response.as_bytes()).expect("write response");
        let _ = tx.send(Captured {
            request_line: request_line.trim_end().to_string(),
            body: String::from_utf8_lossy(&request_body).into_owned(),
        });
    });
    (format!("http://{}", addr), rx)
}

fn endpoint(base: &str) -> Endpoint {
    Endpoint::new(base, DetectionMode::new("skeleton").unwrap(), EndpointStyle::Path).unwrap()
}

fn outbound() -> OutboundMessage {
    OutboundMessage::encode(&Frame::new(1, RgbImage::new(16, 16)), 80).unwrap()
}

fn wait_for_event(transport: &mut HttpTransport) -> TransportEvent {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if let Some(event) = transport.poll().into_iter().next() {
            return event;
        }
        thread::sleep(Duration::from_millis(5));
    }
    panic!("no reply within 5s");
}

#[test]
fn posts_form_and_decodes_objects() {
    let (base, captured) = serve_once(
        "200 OK",
        r#"{"objects": [{"bbox": [5, 5, 50, 80], "track_id": 2, "action": "standing"}]}"#,
    );
    let mut transport = HttpTransport::new();
    transport.connect(&endpoint(&base)).expect("connect");
    transport.send(&outbound()).expect("send");

    match wait_for_event(&mut transport) {
        TransportEvent::Inbound(Ok(InboundMessage::Detections(objects))) => {
            assert_eq!(objects.len(), 1);
            assert_eq!(objects[0].track_id, 2);
            assert_eq!(objects[0].label, "standing");
        }
        other => panic!("unexpected event {:?}", other),
    }

    let request = captured.recv_timeout(Duration::from_secs(5)).unwrap();
    assert_eq!(request.request_line, "POST /process-frame HTTP/1.1");
    assert!(request.body.contains("frame_data=data%3Aimage%2Fjpeg%3Bbase64%2C"));
    assert!(request.body.contains("timestamp="));
}

#[test]
fn non_success_status_is_an_error_event() {
    let (base, _captured) = serve_once("503 Service Unavailable", r#"{"detail": "warming up"}"#);
    let mut transport = HttpTransport::new();
    transport.connect(&endpoint(&base)).expect("connect");
    transport.send(&outbound()).expect("send");

    match wait_for_event(&mut transport) {
        TransportEvent::Error(TransportError::Http { status }) => assert_eq!(status, 503),
        other => panic!("unexpected event {:?}", other),
    }
}

#[test]
fn send_before_connect_is_rejected() {
    let mut transport = HttpTransport::new();
    assert_eq!(transport.send(&outbound()), Err(TransportError::NotConnected));
    assert!(transport.poll().is_empty());
}

#[test]
fn configured_connect_timeout_bounds_the_request() {
    // Accepts and never answers.
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind loopback");
    let base = format!("http://{}", listener.local_addr().expect("local addr"));
    let (release, hold) = mpsc::channel::<()>();
    thread::spawn(move || {
        let (_stream, _) = listener.accept().expect("accept");
        let _ = hold.recv_timeout(Duration::from_secs(10));
    });

    let mut config = PipelineConfig::default();
    config.endpoint.transport = TransportKind::Http;
    config.endpoint.url = base.clone();
    config.endpoint.connect_timeout = Duration::from_millis(300);
    let mut transport = config.transport();
    assert_eq!(transport.kind(), TransportKind::Http);
    transport.connect(&endpoint(&base)).expect("connect");

    let started = Instant::now();
    transport.send(&outbound()).expect("send");
    let event = loop {
        if let Some(event) = transport.poll().into_iter().next() {
            break event;
        }
        assert!(started.elapsed() < Duration::from_secs(5), "request outlived its timeout");
        thread::sleep(Duration::from_millis(5));
    };
    assert!(matches!(event, TransportEvent::Error(TransportError::Send(_))), "{:?}", event);
    let _ = release.send(());
}
