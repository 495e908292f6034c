//! Connection to the inference service.
//!
//! - `Transport`: one concrete wire (WebSocket or HTTP request/response).
//! - `Connection`: owns the connection state machine and the reconnect
//!   timer on top of any `Transport`.
//! - `Endpoint`: service address plus detection mode.
//!
//! Transports never block the caller for longer than a connect timeout:
//! `poll` drains whatever has arrived and returns immediately.

mod connection;
mod endpoint;
pub mod http;
pub mod socket;

pub use connection::{Connection, ConnectionPoll, ConnectionState, ConnectionStats};
pub use endpoint::{DetectionMode, Endpoint, EndpointStyle};
pub use http::HttpTransport;
pub use socket::SocketTransport;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{MessageFormatError, TransportError};
use crate::protocol::{InboundMessage, OutboundMessage};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    #[default]
    Socket,
    Http,
}

impl FromStr for TransportKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "socket" | "ws" | "websocket" => Ok(TransportKind::Socket),
            "http" => Ok(TransportKind::Http),
            other => Err(format!("unknown transport '{}'", other)),
        }
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TransportKind::Socket => "socket",
            TransportKind::Http => "http",
        })
    }
}

/// Something that happened on the wire since the last poll.
#[derive(Debug)]
pub enum TransportEvent {
    Inbound(Result<InboundMessage, MessageFormatError>),
    Closed { reason: String },
    Error(TransportError),
}

pub trait Transport {
    /// Establish the connection. May block up to the transport's connect
    /// timeout.
    fn connect(&mut self, endpoint: &Endpoint) -> Result<(), TransportError>;

    fn send(&mut self, message: &OutboundMessage) -> Result<(), TransportError>;

    /// Drain pending events without blocking.
    fn poll(&mut self) -> Vec<TransportEvent>;

    /// Tear down the wire. Idempotent.
    fn close(&mut self);

    fn kind(&self) -> TransportKind;
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn connect(&mut self, endpoint: &Endpoint) -> Result<(), TransportError> {
        (**self).connect(endpoint)
    }

    fn send(&mut self, message: &OutboundMessage) -> Result<(), TransportError> {
        (**self).send(message)
    }

    fn poll(&mut self) -> Vec<TransportEvent> {
        (**self).poll()
    }

    fn close(&mut self) {
        (**self).close()
    }

    fn kind(&self) -> TransportKind {
        (**self).kind()
    }
}
