//! Transport abstraction for the persistent channel.
//!
//! The connection manager only sees `Transport::open` and the three channel
//! operations, which keeps the state machine testable against a scripted
//! transport. `WsTransport` is the WebSocket implementation used against
//! real nodes.

use crate::endpoint::Endpoint;
use crate::error::{LinkError, Result};
use futures::{SinkExt, StreamExt};
use std::future::Future;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, warn};

/// Lifecycle or data event observed on an open channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    Text(String),
    Closed { code: Option<u16>, reason: String },
    Error(String),
}

pub trait Channel: Send + 'static {
    fn send(&mut self, text: String) -> impl Future<Output = Result<()>> + Send;

    /// Wait for the next event. After `Closed` or `Error` the channel is
    /// not polled again.
    fn next_event(&mut self) -> impl Future<Output = ChannelEvent> + Send;

    fn close(&mut self) -> impl Future<Output = ()> + Send;
}

pub trait Transport: Send + 'static {
    type Channel: Channel;

    fn open(&mut self, endpoint: &Endpoint) -> impl Future<Output = Result<Self::Channel>> + Send;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct WsTransport;

pub struct WsChannel {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl Transport for WsTransport {
    type Channel = WsChannel;

    async fn open(&mut self, endpoint: &Endpoint) -> Result<WsChannel> {
        let (stream, response) = tokio_tungstenite::connect_async(endpoint.url())
            .await
            .map_err(|e| LinkError::Transport(e.to_string()))?;
        debug!("websocket handshake with {} -> {}", endpoint, response.status());
        Ok(WsChannel { stream })
    }
}

impl Channel for WsChannel {
    async fn send(&mut self, text: String) -> Result<()> {
        self.stream
            .send(Message::Text(text.into()))
            .await
            .map_err(|e| LinkError::Transport(e.to_string()))
    }

    async fn next_event(&mut self) -> ChannelEvent {
        loop {
            match self.stream.next().await {
                Some(Ok(Message::Text(text))) => {
                    let text: &str = &text;
                    return ChannelEvent::Text(text.to_owned());
                }
                Some(Ok(Message::Binary(bytes))) => {
                    // The node only speaks JSON; let the decoder reject junk.
                    return ChannelEvent::Text(String::from_utf8_lossy(&bytes).into_owned());
                }
                Some(Ok(Message::Close(frame))) => {
                    let (code, reason) = match frame {
                        Some(frame) => {
                            let reason: &str = &frame.reason;
                            (Some(u16::from(frame.code)), reason.to_owned())
                        }
                        None => (None, String::new()),
                    };
                    return ChannelEvent::Closed { code, reason };
                }
                Some(Ok(_)) => continue,
                Some(Err(e)) => {
                    warn!("websocket error: {}", e);
                    return ChannelEvent::Error(e.to_string());
                }
                None => {
                    return ChannelEvent::Closed {
                        code: None,
                        reason: "stream ended".to_string(),
                    }
                }
            }
        }
    }

    async fn close(&mut self) {
        if let Err(e) = self.stream.close(None).await {
            debug!("websocket close: {}", e);
        }
    }
}
