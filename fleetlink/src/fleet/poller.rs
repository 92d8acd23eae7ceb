//! Periodic roster polling.

use super::{FleetAggregator, FleetSnapshot, PeerRecord, SelfInfo};
use crate::endpoint::PageContext;
use crate::error::{LinkError, Result};
use crate::updater::LocalVersion;
use serde::de::DeserializeOwned;
use std::future::Future;
use std::time::Duration;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// The two independent data sources read on every cycle.
pub trait FleetSource: Send + Sync + 'static {
    fn fetch_self_info(&self) -> impl Future<Output = Result<SelfInfo>> + Send;
    fn fetch_peers(&self) -> impl Future<Output = Result<Vec<PeerRecord>>> + Send;
}

/// Reads `/api/info`, `/api/peers` and `/api/version` from the node that
/// served the page.
#[derive(Debug, Clone)]
pub struct HttpFleetSource {
    client: reqwest::Client,
    page: PageContext,
}

impl HttpFleetSource {
    pub fn new(page: PageContext) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self { client, page })
    }

    pub fn with_client(page: PageContext, client: reqwest::Client) -> Self {
        Self { client, page }
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = self.page.api_url(path)?;
        let response = self.client.get(url).send().await?;
        if !response.status().is_success() {
            return Err(LinkError::Status(response.status().as_u16()));
        }
        Ok(response.json().await?)
    }

    pub async fn fetch_local_version(&self) -> Result<LocalVersion> {
        self.get_json("/api/version").await
    }
}

impl FleetSource for HttpFleetSource {
    async fn fetch_self_info(&self) -> Result<SelfInfo> {
        self.get_json("/api/info").await
    }

    async fn fetch_peers(&self) -> Result<Vec<PeerRecord>> {
        self.get_json("/api/peers").await
    }
}

pub struct FleetPoller;

impl FleetPoller {
    /// Start polling: one cycle right away, then one per `every`. The timer
    /// is created once and lives until `shutdown()`.
    pub fn start<S: FleetSource>(source: S, every: Duration) -> FleetHandle {
        let (snapshot_tx, snapshot_rx) = watch::channel(FleetSnapshot::default());
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();

        let task = tokio::spawn(async move {
            let mut aggregator = FleetAggregator::new();
            let mut ticker = interval(every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            info!("fleet poller started ({:?} interval)", every);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {}
                    _ = &mut shutdown_rx => break,
                }

                let fetches = async { tokio::join!(source.fetch_self_info(), source.fetch_peers()) };
                let (self_info, peers) = tokio::select! {
                    results = fetches => results,
                    _ = &mut shutdown_rx => break,
                };

                let snapshot = aggregator.merge(self_info, peers).clone();
                debug!("fleet cycle {} merged", snapshot.cycle);
                snapshot_tx.send_replace(snapshot);
            }

            info!("fleet poller stopped");
        });

        FleetHandle {
            snapshots: snapshot_rx,
            shutdown_tx: Some(shutdown_tx),
            task: Some(task),
        }
    }
}

pub struct FleetHandle {
    snapshots: watch::Receiver<FleetSnapshot>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl FleetHandle {
    pub fn latest(&self) -> FleetSnapshot {
        self.snapshots.borrow().clone()
    }

    /// Receiver that wakes on every merged cycle.
    pub fn subscribe(&self) -> watch::Receiver<FleetSnapshot> {
        self.snapshots.clone()
    }

    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!("fleet poller ended abnormally: {}", e);
            }
        }
    }
}
