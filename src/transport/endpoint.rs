use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use url::Url;

use crate::error::TransportError;

/// Detection model selected on the service (`skeleton`, `emotion`, ...).
///
/// Restricted to `[A-Za-z0-9_]+` so it can be spliced into a path or a
/// query string without escaping.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct DetectionMode(String);

impl DetectionMode {
    pub fn new(mode: &str) -> Result<Self, TransportError> {
        let valid =
            !mode.is_empty() && mode.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
        if !valid {
            return Err(TransportError::InvalidEndpoint(format!(
                "detection mode '{}' must match [A-Za-z0-9_]+",
                mode
            )));
        }
        Ok(Self(mode.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for DetectionMode {
    type Err = TransportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl fmt::Display for DetectionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Where the mode goes in the socket URL.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EndpointStyle {
    /// `/ws/camera/<mode>`
    #[default]
    Path,
    /// `/ws/camera?model=<mode>`
    Query,
}

impl FromStr for EndpointStyle {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "path" => Ok(EndpointStyle::Path),
            "query" => Ok(EndpointStyle::Query),
            other => Err(format!("unknown endpoint style '{}'", other)),
        }
    }
}

/// Service base URL plus detection mode.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Endpoint {
    base: Url,
    mode: DetectionMode,
    style: EndpointStyle,
}

impl Endpoint {
    /// Accepts `ws`, `wss`, `http` and `https` bases. Any path on the base
    /// is kept as a prefix.
    pub fn new(base: &str, mode: DetectionMode, style: EndpointStyle) -> Result<Self, TransportError> {
        let base = Url::parse(base.trim())
            .map_err(|err| TransportError::InvalidEndpoint(format!("{}: {}", base, err)))?;
        match base.scheme() {
            "ws" | "wss" | "http" | "https" => {}
            other => {
                return Err(TransportError::InvalidEndpoint(format!(
                    "unsupported scheme '{}'",
                    other
                )))
            }
        }
        if base.host_str().is_none() {
            return Err(TransportError::InvalidEndpoint(format!("{} has no host", base)));
        }
        Ok(Self { base, mode, style })
    }

    pub fn base(&self) -> &Url {
        &self.base
    }

    pub fn mode(&self) -> &DetectionMode {
        &self.mode
    }

    pub fn style(&self) -> EndpointStyle {
        self.style
    }

    /// Same service, different detection mode.
    pub fn with_mode(&self, mode: DetectionMode) -> Self {
        Self {
            mode,
            ..self.clone()
        }
    }

    /// WebSocket URL for the current mode. `http(s)` bases are mapped to
    /// `ws(s)`.
    pub fn socket_url(&self) -> Url {
        let mut url = self.base.clone();
        let scheme = match url.scheme() {
            "http" => Some("ws"),
            "https" => Some("wss"),
            _ => None,
        };
        if let Some(scheme) = scheme {
            // http->ws keeps the url "special", so this cannot fail.
            let _ = url.set_scheme(scheme);
        }
        url.set_query(None);
        match self.style {
            EndpointStyle::Path => {
                url.set_path(&join_path(self.base.path(), &format!("ws/camera/{}", self.mode)));
            }
            EndpointStyle::Query => {
                url.set_path(&join_path(self.base.path(), "ws/camera"));
                url.query_pairs_mut().append_pair("model", self.mode.as_str());
            }
        }
        url
    }

    /// Request/response URL: `<base>/process-frame`, always `http(s)`.
    pub fn process_frame_url(&self) -> Url {
        let mut url = self.base.clone();
        let scheme = match url.scheme() {
            "ws" => Some("http"),
            "wss" => Some("https"),
            _ => None,
        };
        if let Some(scheme) = scheme {
            let _ = url.set_scheme(scheme);
        }
        url.set_query(None);
        url.set_path(&join_path(self.base.path(), "process-frame"));
        url
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}]", self.base, self.mode)
    }
}

fn join_path(prefix: &str, tail: &str) -> String {
    format!("{}/{}", prefix.trim_end_matches('/'), tail)
}
