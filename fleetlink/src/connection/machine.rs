//! Pure connection state machine.
//!
//! Every lifecycle event is a transition function returning the effects the
//! driver has to carry out. No I/O happens here, so the whole lifecycle can
//! be exercised without a socket.

use crate::backoff::BackoffPolicy;
use serde::Serialize;
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
}

/// Observer notification emitted when connectivity changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum Connectivity {
    Connected,
    /// `attempts` is the number of consecutive failed attempts so far.
    Disconnected { attempts: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    Open,
    Notify(Connectivity),
    ScheduleRetry(Duration),
    CancelRetry,
    CloseChannel,
}

#[derive(Debug, Clone)]
pub struct LinkStateMachine {
    state: ConnectionState,
    attempts: u32,
    retry_pending: bool,
    policy: BackoffPolicy,
}

impl LinkStateMachine {
    pub fn new(policy: BackoffPolicy) -> Self {
        Self {
            state: ConnectionState::Disconnected,
            attempts: 0,
            retry_pending: false,
            policy,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn retry_pending(&self) -> bool {
        self.retry_pending
    }

    /// Explicit start. Only valid from `Disconnected`.
    pub fn start(&mut self) -> Vec<Effect> {
        if self.state != ConnectionState::Disconnected {
            return Vec::new();
        }
        self.state = ConnectionState::Connecting;
        vec![Effect::Open]
    }

    pub fn on_open(&mut self) -> Vec<Effect> {
        if self.state != ConnectionState::Connecting {
            debug!("ignoring open event in state {:?}", self.state);
            return Vec::new();
        }
        self.state = ConnectionState::Connected;
        self.attempts = 0;
        vec![Effect::Notify(Connectivity::Connected)]
    }

    pub fn on_closed(&mut self) -> Vec<Effect> {
        self.fail()
    }

    pub fn on_error(&mut self) -> Vec<Effect> {
        self.fail()
    }

    fn fail(&mut self) -> Vec<Effect> {
        match self.state {
            ConnectionState::Connecting | ConnectionState::Connected => {}
            // Close after error (or error after close) for the same failure.
            ConnectionState::Reconnecting | ConnectionState::Disconnected => {
                debug!("suppressing duplicate failure in state {:?}", self.state);
                return Vec::new();
            }
        }

        self.state = ConnectionState::Reconnecting;
        self.attempts = self.attempts.saturating_add(1);

        let mut effects = vec![Effect::Notify(Connectivity::Disconnected {
            attempts: self.attempts,
        })];
        if !self.retry_pending {
            self.retry_pending = true;
            effects.push(Effect::ScheduleRetry(self.policy.next_delay(self.attempts)));
        }
        effects
    }

    pub fn on_retry_fired(&mut self) -> Vec<Effect> {
        self.retry_pending = false;
        if self.state != ConnectionState::Reconnecting {
            return Vec::new();
        }
        self.state = ConnectionState::Connecting;
        vec![Effect::Open]
    }

    pub fn shutdown(&mut self) -> Vec<Effect> {
        let was_connected = self.state == ConnectionState::Connected;
        self.state = ConnectionState::Disconnected;

        let mut effects = Vec::new();
        if self.retry_pending {
            self.retry_pending = false;
            effects.push(Effect::CancelRetry);
        }
        effects.push(Effect::CloseChannel);
        if was_connected {
            effects.push(Effect::Notify(Connectivity::Disconnected {
                attempts: self.attempts,
            }));
        }
        effects
    }
}
