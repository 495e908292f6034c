//! Wire codec for the inference service.
//!
//! Outbound: one JPEG per frame, framed per connection as raw binary, a
//! base64 text frame, or a JSON envelope `{"frame_data": <data URL>,
//! "timestamp": <epoch ms>}`. The request/response flavor posts the same
//! data URL as a form field.
//!
//! Inbound (socket): `{frame?, detections?, error?, log?}` where `frame`
//! wins over `detections`, which wins over `error`. Binary socket frames
//! are server-rendered JPEGs. Inbound (request/response): `{objects: [...]}`.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use image::codecs::jpeg::JpegEncoder;
use image::RgbImage;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::detect::DetectedObject;
use crate::error::MessageFormatError;
use crate::frame::Frame;

pub const DATA_URL_PREFIX: &str = "data:image/jpeg;base64,";
pub const DEFAULT_JPEG_QUALITY: u8 = 80;

// ----------------------------------------------------------------------------
// Outbound
// ----------------------------------------------------------------------------

/// One encoded frame awaiting a response.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OutboundMessage {
    pub sequence: u64,
    pub timestamp_ms: u64,
    pub jpeg: Vec<u8>,
}

impl OutboundMessage {
    pub fn encode(frame: &Frame, quality: u8) -> Result<Self, image::ImageError> {
        let mut jpeg = Vec::new();
        JpegEncoder::new_with_quality(&mut jpeg, quality.clamp(1, 100)).encode_image(frame.image())?;
        Ok(Self {
            sequence: frame.sequence(),
            timestamp_ms: frame.timestamp_ms(),
            jpeg,
        })
    }

    pub fn data_url(&self) -> String {
        format!("{}{}", DATA_URL_PREFIX, BASE64.encode(&self.jpeg))
    }

    /// `frame_data` and `timestamp` fields of the form body.
    pub fn form_fields(&self) -> [(&'static str, String); 2] {
        [
            ("frame_data", self.data_url()),
            ("timestamp", self.timestamp_ms.to_string()),
        ]
    }
}

/// How frames are framed on a socket. Fixed for the life of a connection.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WireFraming {
    #[default]
    Binary,
    Base64,
    Json,
}

impl FromStr for WireFraming {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "binary" => Ok(WireFraming::Binary),
            "base64" => Ok(WireFraming::Base64),
            "json" => Ok(WireFraming::Json),
            other => Err(format!("unknown wire framing '{}'", other)),
        }
    }
}

impl fmt::Display for WireFraming {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            WireFraming::Binary => "binary",
            WireFraming::Base64 => "base64",
            WireFraming::Json => "json",
        })
    }
}

/// A socket frame ready to be written.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WireMessage {
    Binary(Vec<u8>),
    Text(String),
}

#[derive(Serialize)]
struct JsonEnvelope<'a> {
    frame_data: &'a str,
    timestamp: u64,
}

impl WireFraming {
    pub fn encode(self, message: &OutboundMessage) -> WireMessage {
        match self {
            WireFraming::Binary => WireMessage::Binary(message.jpeg.clone()),
            WireFraming::Base64 => WireMessage::Text(BASE64.encode(&message.jpeg)),
            WireFraming::Json => {
                let data_url = message.data_url();
                let envelope = JsonEnvelope {
                    frame_data: &data_url,
                    timestamp: message.timestamp_ms,
                };
                // Serializing a struct of a str and an integer cannot fail.
                WireMessage::Text(serde_json::to_string(&envelope).unwrap_or_default())
            }
        }
    }
}

// ----------------------------------------------------------------------------
// Inbound
// ----------------------------------------------------------------------------

/// A decoded message from the service.
#[derive(Clone, Debug)]
pub enum InboundMessage {
    /// The service drew the overlay itself.
    AnnotatedFrame(AnnotatedFrame),
    Detections(Vec<DetectedObject>),
    ServerError(String),
}

impl InboundMessage {
    pub fn kind(&self) -> &'static str {
        match self {
            InboundMessage::AnnotatedFrame(_) => "frame",
            InboundMessage::Detections(_) => "detections",
            InboundMessage::ServerError(_) => "error",
        }
    }
}

#[derive(Clone, Debug)]
pub struct AnnotatedFrame {
    pub image: RgbImage,
    pub log: Option<ActivityLog>,
}

/// Per-frame activity summary attached to server-rendered frames.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct ActivityLog {
    #[serde(rename = "Timestamp", default, deserialize_with = "string_or_number")]
    pub timestamp: String,
    #[serde(rename = "Frame", default)]
    pub frame: u64,
    #[serde(rename = "Num_People", default)]
    pub num_people: u32,
    #[serde(rename = "Actions", default)]
    pub actions: Vec<String>,
}

fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => s,
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    })
}

#[derive(Deserialize)]
struct SocketEnvelope {
    frame: Option<String>,
    detections: Option<Vec<DetectedObject>>,
    error: Option<String>,
    log: Option<serde_json::Value>,
}

#[derive(Deserialize)]
struct HttpEnvelope {
    #[serde(default)]
    objects: Vec<DetectedObject>,
}

/// Decode a socket text frame.
pub fn decode_text(text: &str) -> Result<InboundMessage, MessageFormatError> {
    let envelope: SocketEnvelope =
        serde_json::from_str(text).map_err(|err| MessageFormatError::Json(err.to_string()))?;

    if let Some(frame) = envelope.frame {
        let payload = frame.strip_prefix(DATA_URL_PREFIX).unwrap_or(&frame);
        let jpeg = BASE64
            .decode(payload.trim())
            .map_err(|err| MessageFormatError::Base64(err.to_string()))?;
        let image = decode_jpeg(&jpeg)?;
        return Ok(InboundMessage::AnnotatedFrame(AnnotatedFrame {
            image,
            log: envelope.log.and_then(parse_activity_log),
        }));
    }
    if let Some(detections) = envelope.detections {
        return Ok(InboundMessage::Detections(detections));
    }
    if let Some(error) = envelope.error {
        return Ok(InboundMessage::ServerError(error));
    }
    Err(MessageFormatError::MissingPayload)
}

/// Decode a socket binary frame: a server-rendered JPEG.
pub fn decode_binary(bytes: &[u8]) -> Result<InboundMessage, MessageFormatError> {
    Ok(InboundMessage::AnnotatedFrame(AnnotatedFrame {
        image: decode_jpeg(bytes)?,
        log: None,
    }))
}

/// Decode a `/process-frame` response body.
pub fn decode_http_response(body: &str) -> Result<InboundMessage, MessageFormatError> {
    let envelope: HttpEnvelope =
        serde_json::from_str(body).map_err(|err| MessageFormatError::Json(err.to_string()))?;
    Ok(InboundMessage::Detections(envelope.objects))
}

fn decode_jpeg(bytes: &[u8]) -> Result<RgbImage, MessageFormatError> {
    image::load_from_memory(bytes)
        .map(|image| image.to_rgb8())
        .map_err(|err| MessageFormatError::Image(err.to_string()))
}

// The service double-encodes the log as a JSON string.
fn parse_activity_log(value: serde_json::Value) -> Option<ActivityLog> {
    let parsed = match value {
        serde_json::Value::String(text) => serde_json::from_str(&text),
        other => serde_json::from_value(other),
    };
    match parsed {
        Ok(log) => Some(log),
        Err(err) => {
            log::debug!("ignoring unparseable activity log: {}", err);
            None
        }
    }
}
