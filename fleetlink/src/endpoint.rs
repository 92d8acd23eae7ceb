//! Channel target resolution.
//!
//! The node listens for the persistent channel on its own port (81). When the
//! dashboard is served through an HTTPS proxy the channel is remapped (8443 by
//! default) and can be overridden per page with `?ws_port=N`.

use crate::error::{LinkError, Result};
use reqwest::Url;
use std::fmt;

pub const INSECURE_PORT: u16 = 81;
pub const SECURE_PORT: u16 = 8443;
const PORT_OVERRIDE_PARAM: &str = "ws_port";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub secure: bool,
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    pub fn resolve(hostname: &str, port_override: Option<u16>, secure: bool) -> Self {
        let port = port_override.unwrap_or(if secure { SECURE_PORT } else { INSECURE_PORT });
        Self {
            secure,
            host: hostname.to_string(),
            port,
        }
    }

    pub fn scheme(&self) -> &'static str {
        if self.secure {
            "wss"
        } else {
            "ws"
        }
    }

    pub fn url(&self) -> String {
        format!("{}://{}:{}", self.scheme(), self.host, self.port)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.url())
    }
}

/// Addressing context of the page the client was loaded from.
#[derive(Debug, Clone)]
pub struct PageContext {
    origin: Url,
    hostname: String,
    secure: bool,
    port_override: Option<u16>,
}

impl PageContext {
    pub fn parse(page_url: &str) -> Result<Self> {
        let origin = Url::parse(page_url)
            .map_err(|e| LinkError::Config(format!("invalid page url '{page_url}': {e}")))?;
        let hostname = origin
            .host_str()
            .ok_or_else(|| LinkError::Config(format!("page url '{page_url}' has no host")))?
            .to_string();
        let secure = origin.scheme() == "https";

        // A non-numeric override is ignored rather than rejected.
        let port_override = origin
            .query_pairs()
            .find(|(key, _)| key == PORT_OVERRIDE_PARAM)
            .and_then(|(_, value)| value.parse::<u16>().ok());

        Ok(Self {
            origin,
            hostname,
            secure,
            port_override,
        })
    }

    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    pub fn is_secure(&self) -> bool {
        self.secure
    }

    pub fn port_override(&self) -> Option<u16> {
        self.port_override
    }

    pub fn endpoint(&self) -> Endpoint {
        Endpoint::resolve(&self.hostname, self.port_override, self.secure)
    }

    /// Same-origin URL for one of the node's HTTP endpoints.
    pub fn api_url(&self, path: &str) -> Result<Url> {
        self.origin
            .join(path)
            .map_err(|e| LinkError::Config(format!("invalid api path '{path}': {e}")))
    }
}
