//! Error type shared by every component of the link layer.
//!
//! None of these conditions is fatal: transport failures feed the reconnect
//! state machine, poll failures keep the previous rendering, and version
//! check failures fall back to the cache.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum LinkError {
    /// Outbound send attempted while the channel is not open.
    #[error("not connected to the node")]
    NotConnected,
    #[error("transport error: {0}")]
    Transport(String),
    #[error("malformed payload: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("unexpected http status {0}")]
    Status(u16),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl LinkError {
    /// Whether the error came from the persistent channel itself.
    pub fn is_transport(&self) -> bool {
        matches!(self, LinkError::Transport(_))
    }
}

pub type Result<T, E = LinkError> = std::result::Result<T, E>;
