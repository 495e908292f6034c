//! WebSocket transport.
//!
//! The TCP connect and the upgrade handshake are blocking and bounded by
//! `connect_timeout`. Afterwards the socket is switched to non-blocking so
//! `poll` only ever drains what the kernel already has.

use std::io;
use std::net::{SocketAddr, TcpStream};
use std::time::Duration;

use tungstenite::protocol::WebSocket;
use tungstenite::stream::MaybeTlsStream;
use tungstenite::Message;

use super::{Endpoint, Transport, TransportEvent, TransportKind};
use crate::error::TransportError;
use crate::protocol::{self, OutboundMessage, WireFraming, WireMessage};

pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

type Socket = WebSocket<MaybeTlsStream<TcpStream>>;

pub struct SocketTransport {
    framing: WireFraming,
    connect_timeout: Duration,
    socket: Option<Socket>,
    pending_flush: bool,
}

impl SocketTransport {
    pub fn new(framing: WireFraming) -> Self {
        Self {
            framing,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            socket: None,
            pending_flush: false,
        }
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn framing(&self) -> WireFraming {
        self.framing
    }

    pub fn is_connected(&self) -> bool {
        self.socket.is_some()
    }

    fn open_tcp(&self, addrs: &[SocketAddr], url: &str) -> Result<TcpStream, TransportError> {
        let mut last_err = None;
        for addr in addrs {
            match TcpStream::connect_timeout(addr, self.connect_timeout) {
                Ok(stream) => return Ok(stream),
                Err(err) => last_err = Some(err),
            }
        }
        Err(TransportError::Connect {
            endpoint: url.to_string(),
            reason: last_err
                .map(|err| err.to_string())
                .unwrap_or_else(|| "host did not resolve".to_string()),
        })
    }

    fn handshake(&self, url: &str, stream: TcpStream) -> Result<Socket, TransportError> {
        let connect_err = |reason: String| TransportError::Connect {
            endpoint: url.to_string(),
            reason,
        };

        if url.starts_with("wss://") {
            #[cfg(feature = "tls")]
            {
                let (socket, _response) = tungstenite::client_tls(url, stream)
                    .map_err(|err| connect_err(err.to_string()))?;
                return Ok(socket);
            }
            #[cfg(not(feature = "tls"))]
            {
                drop(stream);
                return Err(connect_err("wss requires the `tls` feature".to_string()));
            }
        }

        let (socket, _response) = tungstenite::client(url, MaybeTlsStream::Plain(stream))
            .map_err(|err| connect_err(err.to_string()))?;
        Ok(socket)
    }

    fn flush(&mut self) -> Result<(), TransportError> {
        let Some(socket) = self.socket.as_mut() else {
            return Err(TransportError::NotConnected);
        };
        match socket.flush() {
            Ok(()) => {
                self.pending_flush = false;
                Ok(())
            }
            Err(tungstenite::Error::Io(err)) if err.kind() == io::ErrorKind::WouldBlock => {
                self.pending_flush = true;
                Ok(())
            }
            Err(err) => Err(TransportError::Send(err.to_string())),
        }
    }
}

impl Transport for SocketTransport {
    fn connect(&mut self, endpoint: &Endpoint) -> Result<(), TransportError> {
        self.close();

        let url = endpoint.socket_url();
        let addrs = url
            .socket_addrs(|| None)
            .map_err(|err| TransportError::Connect {
                endpoint: url.to_string(),
                reason: err.to_string(),
            })?;

        let stream = self.open_tcp(&addrs, url.as_str())?;
        let io_err = |err: io::Error| TransportError::Connect {
            endpoint: url.to_string(),
            reason: err.to_string(),
        };
        stream.set_nodelay(true).map_err(io_err)?;
        stream
            .set_read_timeout(Some(self.connect_timeout))
            .map_err(io_err)?;
        stream
            .set_write_timeout(Some(self.connect_timeout))
            .map_err(io_err)?;
        let raw = stream.try_clone().map_err(io_err)?;

        let socket = self.handshake(url.as_str(), stream)?;
        raw.set_read_timeout(None).map_err(io_err)?;
        raw.set_write_timeout(None).map_err(io_err)?;
        raw.set_nonblocking(true).map_err(io_err)?;

        log::info!("SocketTransport: connected to {} ({} framing)", url, self.framing);
        self.socket = Some(socket);
        self.pending_flush = false;
        Ok(())
    }

    fn send(&mut self, message: &OutboundMessage) -> Result<(), TransportError> {
        let socket = self.socket.as_mut().ok_or(TransportError::NotConnected)?;
        let frame = match self.framing.encode(message) {
            WireMessage::Binary(bytes) => Message::Binary(bytes),
            WireMessage::Text(text) => Message::Text(text),
        };
        match socket.write(frame) {
            Ok(()) => {}
            Err(tungstenite::Error::Io(err)) if err.kind() == io::ErrorKind::WouldBlock => {
                self.pending_flush = true;
                return Ok(());
            }
            Err(err) => return Err(TransportError::Send(err.to_string())),
        }
        self.flush()
    }

    fn poll(&mut self) -> Vec<TransportEvent> {
        let mut events = Vec::new();
        if self.socket.is_none() {
            return events;
        }
        if self.pending_flush {
            if let Err(err) = self.flush() {
                events.push(TransportEvent::Error(err));
                self.socket = None;
                return events;
            }
        }

        let mut lost = false;
        if let Some(socket) = self.socket.as_mut() {
            loop {
                match socket.read() {
                    Ok(Message::Text(text)) => {
                        events.push(TransportEvent::Inbound(protocol::decode_text(&text)));
                    }
                    Ok(Message::Binary(bytes)) => {
                        events.push(TransportEvent::Inbound(protocol::decode_binary(&bytes)));
                    }
                    Ok(Message::Close(frame)) => {
                        let reason = frame
                            .map(|frame| format!("{} {}", u16::from(frame.code), frame.reason))
                            .unwrap_or_else(|| "closed by peer".to_string());
                        events.push(TransportEvent::Closed { reason });
                        lost = true;
                        break;
                    }
                    Ok(_) => {}
                    Err(tungstenite::Error::Io(err)) if err.kind() == io::ErrorKind::WouldBlock => {
                        break;
                    }
                    Err(tungstenite::Error::ConnectionClosed)
                    | Err(tungstenite::Error::AlreadyClosed) => {
                        events.push(TransportEvent::Closed {
                            reason: "connection closed".to_string(),
                        });
                        lost = true;
                        break;
                    }
                    Err(err) => {
                        events.push(TransportEvent::Error(TransportError::Closed(err.to_string())));
                        lost = true;
                        break;
                    }
                }
            }
        }
        if lost {
            self.socket = None;
        }
        events
    }

    fn close(&mut self) {
        if let Some(mut socket) = self.socket.take() {
            // Best effort; the peer may already be gone.
            let _ = socket.close(None);
            let _ = socket.flush();
            log::debug!("SocketTransport: closed");
        }
        self.pending_flush = false;
    }

    fn kind(&self) -> TransportKind {
        TransportKind::Socket
    }
}

impl Drop for SocketTransport {
    fn drop(&mut self) {
        self.close();
    }
}
