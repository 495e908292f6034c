//! Request/response transport: `POST <base>/process-frame`.
//!
//! Each send runs on a short-lived worker thread so the caller never waits
//! on the network. Results come back over a channel that `poll` drains.

use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::thread;
use std::time::Duration;

use super::{Endpoint, Transport, TransportEvent, TransportKind};
use crate::error::TransportError;
use crate::protocol::{self, OutboundMessage};

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

type Reply = Result<String, TransportError>;

pub struct HttpTransport {
    timeout: Duration,
    session: Option<Session>,
}

struct Session {
    agent: ureq::Agent,
    url: String,
    tx: Sender<Reply>,
    rx: Receiver<Reply>,
}

impl HttpTransport {
    pub fn new() -> Self {
        Self {
            timeout: DEFAULT_REQUEST_TIMEOUT,
            session: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl Default for HttpTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for HttpTransport {
    /// No request is made here; the first failure shows up on the first
    /// response.
    fn connect(&mut self, endpoint: &Endpoint) -> Result<(), TransportError> {
        let url = endpoint.process_frame_url().to_string();
        let agent = ureq::AgentBuilder::new().timeout(self.timeout).build();
        let (tx, rx) = mpsc::channel();
        log::info!("HttpTransport: posting frames to {}", url);
        self.session = Some(Session { agent, url, tx, rx });
        Ok(())
    }

    fn send(&mut self, message: &OutboundMessage) -> Result<(), TransportError> {
        let session = self.session.as_ref().ok_or(TransportError::NotConnected)?;
        let agent = session.agent.clone();
        let url = session.url.clone();
        let tx = session.tx.clone();
        let [frame_data, timestamp] = message.form_fields();

        thread::Builder::new()
            .name("livecam-http".to_string())
            .spawn(move || {
                let reply = post_frame(&agent, &url, &frame_data, &timestamp);
                // The receiver is gone once the transport was closed.
                let _ = tx.send(reply);
            })
            .map_err(|err| TransportError::Send(err.to_string()))?;
        Ok(())
    }

    fn poll(&mut self) -> Vec<TransportEvent> {
        let mut events = Vec::new();
        let Some(session) = self.session.as_ref() else {
            return events;
        };
        loop {
            match session.rx.try_recv() {
                Ok(Ok(body)) => {
                    events.push(TransportEvent::Inbound(protocol::decode_http_response(&body)));
                }
                Ok(Err(err)) => events.push(TransportEvent::Error(err)),
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
        events
    }

    fn close(&mut self) {
        if self.session.take().is_some() {
            log::debug!("HttpTransport: closed");
        }
    }

    fn kind(&self) -> TransportKind {
        TransportKind::Http
    }
}

fn post_frame(agent: &ureq::Agent, url: &str, frame_data: &(&str, String), timestamp: &(&str, String)) -> Reply {
    let response = agent
        .post(url)
        .send_form(&[
            (frame_data.0, frame_data.1.as_str()),
            (timestamp.0, timestamp.1.as_str()),
        ])
        .map_err(|err| match err {
            ureq::Error::Status(status, _) => TransportError::Http { status },
            ureq::Error::Transport(transport) => TransportError::Send(transport.to_string()),
        })?;
    response
        .into_string()
        .map_err(|err| TransportError::Send(format!("read response: {}", err)))
}
