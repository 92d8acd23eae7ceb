//! Fan-out of decoded inbound messages to registered subscribers.
//!
//! Subscriptions last for the life of the process. Handlers run
//! synchronously on the connection task, in registration order, and a
//! panicking handler does not stop the ones registered after it.

use crate::error::Result;
use crate::state::{new_state, Shared};
use serde_json::Value;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{debug, error};

/// Structured record decoded from one channel payload.
pub type InboundMessage = Value;

pub type Handler = Arc<dyn Fn(&InboundMessage) + Send + Sync>;

/// Parse one text payload received on the channel.
pub fn decode(payload: &str) -> Result<InboundMessage> {
    Ok(serde_json::from_str(payload)?)
}

#[derive(Clone, Default)]
pub struct MessageDispatcher {
    handlers: Shared<Vec<Handler>>,
}

impl MessageDispatcher {
    pub fn new() -> Self {
        Self {
            handlers: new_state(Vec::new()),
        }
    }

    pub fn subscribe<F>(&self, handler: F)
    where
        F: Fn(&InboundMessage) + Send + Sync + 'static,
    {
        self.handlers.lock().push(Arc::new(handler));
    }

    pub fn subscriber_count(&self) -> usize {
        self.handlers.lock().len()
    }

    /// Deliver `message` to every subscriber. Returns how many handlers
    /// completed without panicking.
    pub fn dispatch(&self, message: &InboundMessage) -> usize {
        // Snapshot so a handler may subscribe without deadlocking.
        let handlers: Vec<Handler> = self.handlers.lock().clone();
        let mut delivered = 0;

        for (index, handler) in handlers.iter().enumerate() {
            match catch_unwind(AssertUnwindSafe(|| handler(message))) {
                Ok(()) => delivered += 1,
                Err(_) => error!("message handler #{} panicked, continuing", index),
            }
        }

        debug!("dispatched message to {}/{} handlers", delivered, handlers.len());
        delivered
    }
}

impl std::fmt::Debug for MessageDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageDispatcher")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_handlers_run_in_registration_order() {
        let dispatcher = MessageDispatcher::new();
        let seen = new_state(Vec::new());

        for id in 0..3 {
            let seen = seen.clone();
            dispatcher.subscribe(move |msg| seen.lock().push((id, msg["type"].clone())));
        }

        let delivered = dispatcher.dispatch(&json!({"type": "race_start"}));
        assert_eq!(delivered, 3);
        let seen = seen.lock();
        assert_eq!(seen.iter().map(|(id, _)| *id).collect::<Vec<_>>(), vec![0, 1, 2]);
        assert!(seen.iter().all(|(_, t)| t == "race_start"));
    }

    #[test]
    fn test_panicking_handler_is_isolated() {
        let dispatcher = MessageDispatcher::new();
        let after = new_state(0u32);

        dispatcher.subscribe(|_| panic!("bad handler"));
        let counter = after.clone();
        dispatcher.subscribe(move |_| *counter.lock() += 1);

        assert_eq!(dispatcher.dispatch(&json!({"type": "finish"})), 1);
        assert_eq!(*after.lock(), 1);
    }

    #[test]
    fn test_decode_rejects_malformed_payload() {
        assert!(decode("{\"type\":\"state\",\"armed\":true}").is_ok());
        assert!(decode("{\"type\":").is_err());
        assert!(decode("").is_err());
    }
}
