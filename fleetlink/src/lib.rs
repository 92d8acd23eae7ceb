//! FleetLink - resilient client link to a race-timing node
//!
//! Keeps a live channel to the local node and watches the rest of the fleet:
//! - Connection manager with automatic reconnection and capped backoff
//! - Publish/subscribe dispatch of decoded node messages
//! - Periodic fleet roster with per-role dedup
//! - Cached, fail-soft firmware update check

pub mod backoff;
pub mod config;
pub mod connection;
pub mod dispatch;
pub mod endpoint;
pub mod error;
pub mod fleet;
pub mod health;
pub mod state;
pub mod transport;
pub mod updater;

pub use backoff::BackoffPolicy;
pub use config::ClientConfig;
pub use connection::{ConnectionManager, ConnectionState, Connectivity, LinkHandle};
pub use dispatch::{InboundMessage, MessageDispatcher};
pub use endpoint::{Endpoint, PageContext};
pub use error::{LinkError, Result};
pub use fleet::{FleetAggregator, FleetPoller, FleetSnapshot, PeerRecord, Role, RosterView, SelfInfo};
pub use health::LinkHealth;
pub use transport::{Channel, ChannelEvent, Transport, WsTransport};
pub use updater::{compare_versions, ReleaseInfo, UpdateChecker, UpdateStatus};
