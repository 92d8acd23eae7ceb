/*!
Scripted transport for connection-manager tests

Every `open` consumes the next scripted `OpenOutcome` (accepting once the
script runs out). All channels share one recorder, so tests can read the
frames that were actually transmitted and push inbound events into
whichever channel is currently open.
*/

use fleetlink::endpoint::Endpoint;
use fleetlink::error::{LinkError, Result};
use fleetlink::transport::{Channel, ChannelEvent, Transport};
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OpenOutcome {
    Accept,
    Refuse(String),
    /// Never resolves; the attempt stays in flight until shutdown.
    Hang,
}

#[derive(Default)]
struct Recorder {
    script: VecDeque<OpenOutcome>,
    open_attempts: u32,
    opened: u32,
    closes: u32,
    sent: Vec<(u32, String)>,
    fail_sends: bool,
    live: Option<mpsc::UnboundedSender<ChannelEvent>>,
    endpoints: Vec<String>,
}

/// Mock transport standing in for the WebSocket connector
#[derive(Clone, Default)]
pub struct MockTransport {
    recorder: Arc<Mutex<Recorder>>,
}

pub struct MockChannel {
    /// 1-based, in open order.
    id: u32,
    events: mpsc::UnboundedReceiver<ChannelEvent>,
    recorder: Arc<Mutex<Recorder>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue outcomes for the next attempts, in order.
    pub fn script<I: IntoIterator<Item = OpenOutcome>>(&self, outcomes: I) -> &Self {
        self.recorder.lock().unwrap().script.extend(outcomes);
        self
    }

    /// The next `n` attempts are refused.
    pub fn refuse_next(&self, n: usize) -> &Self {
        self.script((0..n).map(|i| OpenOutcome::Refuse(format!("refused #{}", i + 1))))
    }

    pub fn fail_sends(&self, fail: bool) {
        self.recorder.lock().unwrap().fail_sends = fail;
    }

    /// Push an event into the open channel. Returns false if none is open.
    pub fn push_event(&self, event: ChannelEvent) -> bool {
        match self.recorder.lock().unwrap().live.as_ref() {
            Some(tx) => tx.send(event).is_ok(),
            None => false,
        }
    }

    pub fn push_text<S: Into<String>>(&self, text: S) -> bool {
        self.push_event(ChannelEvent::Text(text.into()))
    }

    pub fn push_json(&self, value: &Value) -> bool {
        self.push_text(value.to_string())
    }

    /// Simulate the node dropping the socket (abnormal closure).
    pub fn drop_connection(&self) -> bool {
        self.push_event(ChannelEvent::Closed {
            code: Some(1006),
            reason: String::new(),
        })
    }

    pub fn open_attempts(&self) -> u32 {
        self.recorder.lock().unwrap().open_attempts
    }

    pub fn opened(&self) -> u32 {
        self.recorder.lock().unwrap().opened
    }

    pub fn closes(&self) -> u32 {
        self.recorder.lock().unwrap().closes
    }

    pub fn endpoints(&self) -> Vec<String> {
        self.recorder.lock().unwrap().endpoints.clone()
    }

    pub fn sent_frames(&self) -> Vec<String> {
        let recorder = self.recorder.lock().unwrap();
        recorder.sent.iter().map(|(_, frame)| frame.clone()).collect()
    }

    /// Frames transmitted on the `channel`-th opened channel (1-based).
    pub fn sent_on_channel(&self, channel: u32) -> Vec<String> {
        let recorder = self.recorder.lock().unwrap();
        recorder
            .sent
            .iter()
            .filter(|(id, _)| *id == channel)
            .map(|(_, frame)| frame.clone())
            .collect()
    }

    /// Sent frames parsed as JSON; unparseable frames are skipped.
    pub fn sent_json(&self) -> Vec<Value> {
        self.sent_frames()
            .iter()
            .filter_map(|f| serde_json::from_str(f).ok())
            .collect()
    }

    pub fn clear(&self) {
        let mut recorder = self.recorder.lock().unwrap();
        recorder.sent.clear();
        recorder.endpoints.clear();
    }
}

impl Transport for MockTransport {
    type Channel = MockChannel;

    async fn open(&mut self, endpoint: &Endpoint) -> Result<MockChannel> {
        let outcome = {
            let mut recorder = self.recorder.lock().unwrap();
            recorder.open_attempts += 1;
            recorder.endpoints.push(endpoint.url());
            recorder.script.pop_front().unwrap_or(OpenOutcome::Accept)
        };

        match outcome {
            OpenOutcome::Accept => {
                let (tx, rx) = mpsc::unbounded_channel();
                let mut recorder = self.recorder.lock().unwrap();
                recorder.opened += 1;
                // Replacing the sender ends any previous channel's stream.
                recorder.live = Some(tx);
                log::debug!("[MOCK] opened {}", endpoint);
                Ok(MockChannel {
                    id: recorder.opened,
                    events: rx,
                    recorder: self.recorder.clone(),
                })
            }
            OpenOutcome::Refuse(reason) => {
                log::debug!("[MOCK] refused {}: {}", endpoint, reason);
                Err(LinkError::Transport(reason))
            }
            OpenOutcome::Hang => std::future::pending().await,
        }
    }
}

impl Channel for MockChannel {
    async fn send(&mut self, text: String) -> Result<()> {
        let mut recorder = self.recorder.lock().unwrap();
        if recorder.fail_sends {
            return Err(LinkError::Transport("send failed".into()));
        }
        recorder.sent.push((self.id, text));
        Ok(())
    }

    async fn next_event(&mut self) -> ChannelEvent {
        match self.events.recv().await {
            Some(event) => event,
            None => ChannelEvent::Closed {
                code: None,
                reason: "replaced".to_string(),
            },
        }
    }

    async fn close(&mut self) {
        let mut recorder = self.recorder.lock().unwrap();
        recorder.closes += 1;
        recorder.live = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn endpoint() -> Endpoint {
        Endpoint::resolve("192.168.4.1", None, false)
    }

    #[tokio::test]
    async fn test_scripted_outcomes() {
        let mut transport = MockTransport::new();
        transport.refuse_next(2);

        assert!(transport.open(&endpoint()).await.is_err());
        assert!(transport.open(&endpoint()).await.is_err());
        assert!(transport.open(&endpoint()).await.is_ok());
        assert_eq!(transport.open_attempts(), 3);
        assert_eq!(transport.opened(), 1);
        assert_eq!(transport.endpoints()[0], "ws://192.168.4.1:81");
    }

    #[tokio::test]
    async fn test_events_and_sends() {
        let mut transport = MockTransport::new();
        assert!(!transport.push_text("{}"));

        let mut channel = transport.open(&endpoint()).await.unwrap();
        assert!(transport.push_text(r#"{"type":"hello"}"#));
        assert_eq!(
            channel.next_event().await,
            ChannelEvent::Text(r#"{"type":"hello"}"#.to_string())
        );

        channel.send(r#"{"cmd":"arm"}"#.to_string()).await.unwrap();
        assert_eq!(transport.sent_json(), vec![serde_json::json!({"cmd": "arm"})]);

        assert_eq!(transport.sent_on_channel(1).len(), 1);
        assert!(transport.sent_on_channel(2).is_empty());

        transport.fail_sends(true);
        assert!(channel.send("x".to_string()).await.is_err());

        channel.close().await;
        assert_eq!(transport.closes(), 1);
        assert!(!transport.push_text("{}"));
    }
}
