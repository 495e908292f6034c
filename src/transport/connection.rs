use std::fmt;
use std::time::{Duration, Instant};

use super::{Endpoint, Transport, TransportEvent};
use crate::error::{MessageFormatError, TransportError};
use crate::protocol::{InboundMessage, OutboundMessage};

pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_millis(3000);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    /// Lost; one retry timer armed.
    Reconnecting,
    /// Closed by the owner. Terminal.
    Closed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Reconnecting => "reconnecting",
            ConnectionState::Closed => "closed",
        })
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ConnectionStats {
    pub connect_attempts: u64,
    pub connects: u64,
    pub reconnects_scheduled: u64,
    pub messages_sent: u64,
    pub messages_received: u64,
}

/// Result of one `Connection::poll`.
#[derive(Debug, Default)]
pub struct ConnectionPoll {
    /// Inbound payloads in arrival order, malformed ones included.
    pub inbound: Vec<Result<InboundMessage, MessageFormatError>>,
    /// The live connection dropped during this poll.
    pub lost: bool,
}

/// Connection state machine over a `Transport`.
///
/// The only writer of `ConnectionState`. Every loss arms exactly one
/// retry timer; the timer fires from `poll` once its deadline passes and
/// keeps re-arming until the connection succeeds or `close` is called.
pub struct Connection<T: Transport> {
    transport: T,
    endpoint: Endpoint,
    state: ConnectionState,
    retry_at: Option<Instant>,
    reconnect_delay: Duration,
    stats: ConnectionStats,
}

impl<T: Transport> Connection<T> {
    pub fn new(transport: T, endpoint: Endpoint, reconnect_delay: Duration) -> Self {
        Self {
            transport,
            endpoint,
            state: ConnectionState::Disconnected,
            retry_at: None,
            reconnect_delay,
            stats: ConnectionStats::default(),
        }
    }

    pub fn open(&mut self, now: Instant) {
        if self.state == ConnectionState::Closed {
            log::debug!("Connection: ignoring open after close");
            return;
        }
        self.retry_at = None;
        self.attempt(now);
    }

    pub fn poll(&mut self, now: Instant) -> ConnectionPoll {
        let mut outcome = ConnectionPoll::default();

        if self.state == ConnectionState::Connected {
            for event in self.transport.poll() {
                match event {
                    TransportEvent::Inbound(message) => {
                        self.stats.messages_received += 1;
                        outcome.inbound.push(message);
                    }
                    TransportEvent::Closed { reason } => {
                        log::info!("Connection: {} closed: {}", self.endpoint, reason);
                        self.schedule_reconnect(now);
                        outcome.lost = true;
                        break;
                    }
                    TransportEvent::Error(err) => {
                        log::warn!("Connection: {} failed: {}", self.endpoint, err);
                        self.schedule_reconnect(now);
                        outcome.lost = true;
                        break;
                    }
                }
            }
        }

        if self.state == ConnectionState::Reconnecting {
            if let Some(deadline) = self.retry_at {
                if now >= deadline {
                    self.retry_at = None;
                    self.attempt(now);
                }
            }
        }

        outcome
    }

    /// Send only while connected. A failed send arms the reconnect timer.
    pub fn send(&mut self, message: &OutboundMessage, now: Instant) -> Result<(), TransportError> {
        if self.state != ConnectionState::Connected {
            return Err(TransportError::NotConnected);
        }
        match self.transport.send(message) {
            Ok(()) => {
                self.stats.messages_sent += 1;
                Ok(())
            }
            Err(err) => {
                log::warn!("Connection: send to {} failed: {}", self.endpoint, err);
                self.schedule_reconnect(now);
                Err(err)
            }
        }
    }

    /// Switch endpoints: the old wire is closed before the new one opens.
    pub fn reconfigure(&mut self, endpoint: Endpoint, now: Instant) {
        if self.state == ConnectionState::Closed {
            self.endpoint = endpoint;
            return;
        }
        self.transport.close();
        self.retry_at = None;
        self.state = ConnectionState::Disconnected;
        log::info!("Connection: switching {} -> {}", self.endpoint, endpoint);
        self.endpoint = endpoint;
        self.attempt(now);
    }

    /// Drop the live wire and retry after the reconnect delay. Replies still
    /// in transit on the old wire are lost with it.
    pub fn restart(&mut self, now: Instant) {
        match self.state {
            ConnectionState::Connected | ConnectionState::Connecting => {
                log::warn!("Connection: abandoning {}", self.endpoint);
                self.schedule_reconnect(now);
            }
            ConnectionState::Disconnected
            | ConnectionState::Reconnecting
            | ConnectionState::Closed => {}
        }
    }

    pub fn close(&mut self) {
        if self.state == ConnectionState::Closed {
            return;
        }
        self.transport.close();
        self.retry_at = None;
        self.state = ConnectionState::Closed;
        log::info!("Connection: closed {}", self.endpoint);
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Deadline of the armed retry timer, if any.
    pub fn retry_at(&self) -> Option<Instant> {
        self.retry_at
    }

    pub fn stats(&self) -> &ConnectionStats {
        &self.stats
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    fn attempt(&mut self, now: Instant) {
        self.state = ConnectionState::Connecting;
        self.stats.connect_attempts += 1;
        match self.transport.connect(&self.endpoint) {
            Ok(()) => {
                self.state = ConnectionState::Connected;
                self.stats.connects += 1;
                log::info!(
                    "Connection: connected to {} via {}",
                    self.endpoint,
                    self.transport.kind()
                );
            }
            Err(err) => {
                log::warn!("Connection: connect to {} failed: {}", self.endpoint, err);
                self.schedule_reconnect(now);
            }
        }
    }

    fn schedule_reconnect(&mut self, now: Instant) {
        if self.retry_at.is_some() {
            return;
        }
        self.transport.close();
        self.state = ConnectionState::Reconnecting;
        self.retry_at = Some(now + self.reconnect_delay);
        self.stats.reconnects_scheduled += 1;
        log::info!(
            "Connection: retrying {} in {:?}",
            self.endpoint,
            self.reconnect_delay
        );
    }
}
