//! Persistent link to the local node.
//!
//! `ConnectionManager` owns exactly one channel at a time and drives the
//! `LinkStateMachine` from a single tokio task:
//! - automatic reconnection with `BackoffPolicy` delays
//! - in-order delivery of decoded messages to the `MessageDispatcher`
//! - at-most-once outbound sends, refused with `NotConnected` while down
//! - explicit `start()` / `shutdown()` lifecycle

mod machine;

pub use machine::{ConnectionState, Connectivity, Effect, LinkStateMachine};

use crate::backoff::BackoffPolicy;
use crate::dispatch::{decode, InboundMessage, MessageDispatcher};
use crate::endpoint::Endpoint;
use crate::error::{LinkError, Result};
use crate::state::{new_state, snapshot, Shared};
use crate::transport::{Channel, ChannelEvent, Transport};
use serde::Serialize;
use std::pin::Pin;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Sleep;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct LinkStatus {
    state: ConnectionState,
    attempts: u32,
}

pub struct ConnectionManager<T: Transport> {
    endpoint: Endpoint,
    transport: T,
    policy: BackoffPolicy,
    dispatcher: MessageDispatcher,
    observers: Vec<mpsc::UnboundedSender<Connectivity>>,
}

impl<T: Transport> ConnectionManager<T> {
    pub fn new(endpoint: Endpoint, transport: T) -> Self {
        Self {
            endpoint,
            transport,
            policy: BackoffPolicy::default(),
            dispatcher: MessageDispatcher::new(),
            observers: Vec::new(),
        }
    }

    pub fn with_backoff(mut self, policy: BackoffPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_dispatcher(mut self, dispatcher: MessageDispatcher) -> Self {
        self.dispatcher = dispatcher;
        self
    }

    pub fn dispatcher(&self) -> MessageDispatcher {
        self.dispatcher.clone()
    }

    /// Register a connectivity observer. Must be called before `start()` to
    /// see the first transition.
    pub fn watch_connectivity(&mut self) -> mpsc::UnboundedReceiver<Connectivity> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.observers.push(tx);
        rx
    }

    /// Spawn the driver task and begin connecting.
    pub fn start(self) -> LinkHandle {
        let status = new_state(LinkStatus {
            state: ConnectionState::Disconnected,
            attempts: 0,
        });
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        let endpoint = self.endpoint.clone();
        let dispatcher = self.dispatcher.clone();

        let driver = Driver {
            machine: LinkStateMachine::new(self.policy),
            endpoint: self.endpoint,
            transport: self.transport,
            dispatcher: self.dispatcher,
            observers: self.observers,
            status: status.clone(),
            outbound_rx,
            shutdown_rx,
        };
        let task = tokio::spawn(driver.run());

        LinkHandle {
            endpoint,
            dispatcher,
            status,
            outbound_tx,
            shutdown_tx: Some(shutdown_tx),
            task: Some(task),
        }
    }
}

/// Caller-side view of a running connection manager.
pub struct LinkHandle {
    endpoint: Endpoint,
    dispatcher: MessageDispatcher,
    status: Shared<LinkStatus>,
    outbound_tx: mpsc::UnboundedSender<String>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl LinkHandle {
    pub fn state(&self) -> ConnectionState {
        snapshot(&self.status).state
    }

    /// Consecutive failed attempts since the last successful open.
    pub fn attempts(&self) -> u32 {
        snapshot(&self.status).attempts
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub fn dispatcher(&self) -> &MessageDispatcher {
        &self.dispatcher
    }

    pub fn subscribe<F>(&self, handler: F)
    where
        F: Fn(&InboundMessage) + Send + Sync + 'static,
    {
        self.dispatcher.subscribe(handler);
    }

    /// Serialize and transmit `message`. Fails with `NotConnected` unless the
    /// link is up; nothing is queued for a later connection.
    pub fn send<M: Serialize + ?Sized>(&self, message: &M) -> Result<()> {
        if !self.is_connected() {
            return Err(LinkError::NotConnected);
        }
        let text = serde_json::to_string(message)?;
        self.outbound_tx
            .send(text)
            .map_err(|_| LinkError::NotConnected)
    }

    /// Stop the manager: cancel any pending retry, close the channel and
    /// wait for the driver task. No handler or observer runs afterwards.
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!("connection task ended abnormally: {}", e);
            }
        }
    }
}

enum LoopEvent<C> {
    Opened(Result<C>),
    Channel(ChannelEvent),
    Outbound(String),
    RetryFired,
    Shutdown,
}

struct Driver<T: Transport> {
    machine: LinkStateMachine,
    endpoint: Endpoint,
    transport: T,
    dispatcher: MessageDispatcher,
    observers: Vec<mpsc::UnboundedSender<Connectivity>>,
    status: Shared<LinkStatus>,
    outbound_rx: mpsc::UnboundedReceiver<String>,
    shutdown_rx: oneshot::Receiver<()>,
}

impl<T: Transport> Driver<T> {
    async fn run(mut self) {
        info!("connecting to {}", self.endpoint);
        let mut channel: Option<T::Channel> = None;
        let mut retry: Option<Pin<Box<Sleep>>> = None;

        let effects = self.machine.start();
        self.apply(effects, &mut channel, &mut retry).await;

        loop {
            let event = match self.machine.state() {
                ConnectionState::Connecting => tokio::select! {
                    result = self.transport.open(&self.endpoint) => LoopEvent::Opened(result),
                    _ = &mut self.shutdown_rx => LoopEvent::Shutdown,
                },
                ConnectionState::Connected => match channel.as_mut() {
                    Some(ch) => tokio::select! {
                        event = ch.next_event() => LoopEvent::Channel(event),
                        Some(text) = self.outbound_rx.recv() => LoopEvent::Outbound(text),
                        _ = &mut self.shutdown_rx => LoopEvent::Shutdown,
                    },
                    None => LoopEvent::Channel(ChannelEvent::Error("channel missing".into())),
                },
                ConnectionState::Reconnecting => match retry.as_mut() {
                    Some(timer) => tokio::select! {
                        _ = timer.as_mut() => LoopEvent::RetryFired,
                        _ = &mut self.shutdown_rx => LoopEvent::Shutdown,
                    },
                    None => LoopEvent::RetryFired,
                },
                ConnectionState::Disconnected => break,
            };

            let effects = match event {
                LoopEvent::Opened(Ok(ch)) => {
                    self.discard_stale_outbound();
                    channel = Some(ch);
                    info!("connected to {}", self.endpoint);
                    self.machine.on_open()
                }
                LoopEvent::Opened(Err(e)) => {
                    warn!("connection to {} failed: {}", self.endpoint, e);
                    self.machine.on_error()
                }
                LoopEvent::Channel(ChannelEvent::Text(payload)) => {
                    self.deliver(&payload);
                    Vec::new()
                }
                LoopEvent::Channel(ChannelEvent::Closed { code, reason }) => {
                    channel = None;
                    info!(
                        "channel closed (code={:?}, reason={}), reconnect #{}",
                        code,
                        if reason.is_empty() { "none" } else { reason.as_str() },
                        self.machine.attempts() + 1
                    );
                    self.machine.on_closed()
                }
                LoopEvent::Channel(ChannelEvent::Error(e)) => {
                    warn!("channel error on {}: {}", self.endpoint, e);
                    if let Some(mut ch) = channel.take() {
                        ch.close().await;
                    }
                    self.machine.on_error()
                }
                LoopEvent::Outbound(text) => match channel.as_mut() {
                    Some(ch) => match ch.send(text).await {
                        Ok(()) => Vec::new(),
                        Err(e) => {
                            warn!("send failed: {}", e);
                            if let Some(mut ch) = channel.take() {
                                ch.close().await;
                            }
                            self.machine.on_error()
                        }
                    },
                    None => {
                        debug!("dropping outbound frame, channel gone");
                        Vec::new()
                    }
                },
                LoopEvent::RetryFired => {
                    retry = None;
                    debug!("retry timer fired, attempt #{}", self.machine.attempts() + 1);
                    self.machine.on_retry_fired()
                }
                LoopEvent::Shutdown => self.machine.shutdown(),
            };

            self.apply(effects, &mut channel, &mut retry).await;
        }

        info!("connection manager for {} stopped", self.endpoint);
    }

    async fn apply(
        &mut self,
        effects: Vec<Effect>,
        channel: &mut Option<T::Channel>,
        retry: &mut Option<Pin<Box<Sleep>>>,
    ) {
        // Published before observers run so they can send right away.
        *self.status.lock() = LinkStatus {
            state: self.machine.state(),
            attempts: self.machine.attempts(),
        };

        for effect in effects {
            match effect {
                // The loop opens whenever the machine is in `Connecting`.
                Effect::Open => {}
                Effect::Notify(change) => self.notify(change),
                Effect::ScheduleRetry(delay) => {
                    debug!("next attempt in {:?}", delay);
                    *retry = Some(Box::pin(tokio::time::sleep(delay)));
                }
                Effect::CancelRetry => *retry = None,
                Effect::CloseChannel => {
                    if let Some(mut ch) = channel.take() {
                        ch.close().await;
                    }
                }
            }
        }

    }

    fn notify(&mut self, change: Connectivity) {
        match change {
            Connectivity::Connected => info!("link established"),
            Connectivity::Disconnected { attempts } => {
                info!("link lost ({} failed attempts)", attempts)
            }
        }
        self.observers.retain(|tx| tx.send(change).is_ok());
    }

    fn deliver(&self, payload: &str) {
        match decode(payload) {
            Ok(message) => {
                self.dispatcher.dispatch(&message);
            }
            Err(e) => warn!("dropping malformed payload ({} bytes): {}", payload.len(), e),
        }
    }

    fn discard_stale_outbound(&mut self) {
        let mut dropped = 0;
        while self.outbound_rx.try_recv().is_ok() {
            dropped += 1;
        }
        if dropped > 0 {
            debug!("discarded {} outbound frames from a previous connection", dropped);
        }
    }
}
