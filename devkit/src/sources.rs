/*!
Fake data sources for the fleet poller and the update checker

Both fakes are cheap to clone: the test keeps one handle to change the
served data and read call counters while the code under test owns another.
*/

use fleetlink::error::{LinkError, Result};
use fleetlink::fleet::{FleetSource, PeerRecord, SelfInfo};
use fleetlink::updater::{ReleaseInfo, ReleaseSource};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Default)]
struct FleetState {
    self_info: Option<SelfInfo>,
    peers: Option<Vec<PeerRecord>>,
    info_delay: Duration,
    peer_delay: Duration,
}

/// Serves `/api/info` and `/api/peers` from memory. `None` answers 503.
#[derive(Clone, Default)]
pub struct MockFleetSource {
    state: Arc<Mutex<FleetState>>,
    info_calls: Arc<AtomicU32>,
    peer_calls: Arc<AtomicU32>,
}

impl MockFleetSource {
    pub fn new(self_info: Option<SelfInfo>, peers: Option<Vec<PeerRecord>>) -> Self {
        let source = Self::default();
        source.set_self_info(self_info);
        source.set_peers(peers);
        source
    }

    pub fn set_self_info(&self, info: Option<SelfInfo>) {
        self.state.lock().unwrap().self_info = info;
    }

    pub fn set_peers(&self, peers: Option<Vec<PeerRecord>>) {
        self.state.lock().unwrap().peers = peers;
    }

    /// Make each `/api/info` answer take `delay` on the tokio clock.
    pub fn set_info_delay(&self, delay: Duration) {
        self.state.lock().unwrap().info_delay = delay;
    }

    pub fn set_peer_delay(&self, delay: Duration) {
        self.state.lock().unwrap().peer_delay = delay;
    }

    pub fn info_calls(&self) -> u32 {
        self.info_calls.load(Ordering::SeqCst)
    }

    pub fn peer_calls(&self) -> u32 {
        self.peer_calls.load(Ordering::SeqCst)
    }
}

impl FleetSource for MockFleetSource {
    async fn fetch_self_info(&self) -> Result<SelfInfo> {
        self.info_calls.fetch_add(1, Ordering::SeqCst);
        let delay = self.state.lock().unwrap().info_delay;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        let info = self.state.lock().unwrap().self_info.clone();
        info.ok_or(LinkError::Status(503))
    }

    async fn fetch_peers(&self) -> Result<Vec<PeerRecord>> {
        self.peer_calls.fetch_add(1, Ordering::SeqCst);
        let delay = self.state.lock().unwrap().peer_delay;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        let peers = self.state.lock().unwrap().peers.clone();
        peers.ok_or(LinkError::Status(503))
    }
}

/// Stands in for the GitHub "latest release" endpoint.
#[derive(Clone, Default)]
pub struct MockReleaseSource {
    latest: Arc<Mutex<Option<ReleaseInfo>>>,
    fetches: Arc<AtomicU32>,
}

impl MockReleaseSource {
    pub fn new(latest: Option<ReleaseInfo>) -> Self {
        Self {
            latest: Arc::new(Mutex::new(latest)),
            fetches: Arc::new(AtomicU32::new(0)),
        }
    }

    pub fn with_tag(tag: &str) -> Self {
        Self::new(Some(ReleaseInfo::from_tag(tag)))
    }

    /// Every fetch fails until a release is set again.
    pub fn offline() -> Self {
        Self::new(None)
    }

    pub fn set_latest(&self, latest: Option<ReleaseInfo>) {
        *self.latest.lock().unwrap() = latest;
    }

    pub fn fetches(&self) -> u32 {
        self.fetches.load(Ordering::SeqCst)
    }
}

impl ReleaseSource for MockReleaseSource {
    async fn fetch_latest(&self) -> Result<ReleaseInfo> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let latest = self.latest.lock().unwrap().clone();
        latest.ok_or_else(|| LinkError::Transport("network unreachable".into()))
    }
}
