//! FleetLink Monitor - headless watcher for a race-timing node
//!
//! Connects to the node the dashboard is served from and keeps logging:
//! - Link state and reconnect attempts
//! - Race state broadcasts pushed over the channel
//! - Fleet roster and local node summary
//! - Firmware update availability

use anyhow::{Context, Result};
use fleetlink::config::ClientConfig;
use fleetlink::connection::ConnectionManager;
use fleetlink::endpoint::PageContext;
use fleetlink::fleet::{FleetPoller, FleetSnapshot, HttpFleetSource};
use fleetlink::health::LinkHealth;
use fleetlink::transport::WsTransport;
use fleetlink::updater::{FileCacheStore, GitHubReleaseSource, UpdateChecker, UpdateStatus};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

const PAGE_URL_ENV: &str = "FLEETLINK_PAGE_URL";

struct Monitor {
    config: ClientConfig,
    page: PageContext,
}

impl Monitor {
    async fn new() -> Result<Self> {
        let mut config = ClientConfig::load()
            .await
            .context("Failed to load configuration")?;
        if let Ok(url) = std::env::var(PAGE_URL_ENV) {
            config.node.page_url = url;
        }

        let page = PageContext::parse(&config.node.page_url).context("Invalid node page URL")?;
        info!("node page {} -> channel {}", config.node.page_url, page.endpoint());

        Ok(Self { config, page })
    }

    async fn run(self) -> Result<()> {
        // Channel
        let mut manager = ConnectionManager::new(self.page.endpoint(), WsTransport)
            .with_backoff(self.config.link.backoff());
        let mut changes = manager.watch_connectivity();
        let link = manager.start();

        link.subscribe(|msg| match msg.get("state").and_then(|s| s.as_str()) {
            Some(state) => info!("race state: {}", state),
            None => debug!("node message: {}", msg),
        });

        let health = LinkHealth::new();
        let health_task = {
            let health = health.clone();
            tokio::spawn(async move {
                while let Some(change) = changes.recv().await {
                    health.record(change);
                    info!("link {}", health.badge());
                }
            })
        };

        // Fleet
        let source = HttpFleetSource::new(self.page.clone()).context("Failed to build HTTP client")?;
        let fleet = FleetPoller::start(source.clone(), self.config.fleet.poll_interval());
        let mut snapshots = fleet.subscribe();

        // Updates
        let update_task = if self.config.update.enabled {
            Some(self.spawn_update_checks(source).context("Failed to start update checks")?)
        } else {
            info!("update checks disabled");
            None
        };

        let mut last_roster = String::new();
        let ctrl_c = tokio::signal::ctrl_c();
        tokio::pin!(ctrl_c);

        loop {
            tokio::select! {
                changed = snapshots.changed() => {
                    if changed.is_err() {
                        warn!("fleet poller stopped unexpectedly");
                        break;
                    }
                    let snapshot = snapshots.borrow_and_update().clone();
                    log_snapshot(&snapshot, &mut last_roster);
                }
                signal = &mut ctrl_c => {
                    if let Err(e) = signal {
                        warn!("could not listen for Ctrl-C: {}", e);
                    }
                    info!("shutdown requested");
                    break;
                }
            }
        }

        if let Some(task) = update_task {
            task.abort();
        }
        fleet.shutdown().await;
        link.shutdown().await;
        // Ends once the connection manager drops its observer.
        if let Err(e) = health_task.await {
            warn!("health task ended abnormally: {}", e);
        }

        let report = health.report();
        info!(
            "stopped after {}s ({} disconnects, last status {})",
            report.uptime_seconds, report.link_reconnects, report.link_status
        );
        Ok(())
    }

    fn spawn_update_checks(&self, source: HttpFleetSource) -> Result<JoinHandle<()>> {
        let releases = GitHubReleaseSource::new(&self.config.update.github_repo)?;
        let store = FileCacheStore::new(FileCacheStore::default_path()?);
        debug!("update cache at {}", store.path().display());

        let mut checker = UpdateChecker::new(releases, store).with_ttl(self.config.update.cache_ttl());
        let every = self.config.update.check_interval();

        Ok(tokio::spawn(async move {
            let mut ticker = interval(every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let local = match source.fetch_local_version().await {
                    Ok(version) => version,
                    Err(e) => {
                        warn!("local version unavailable, skipping update check: {}", e);
                        continue;
                    }
                };
                match checker.check(&local.firmware, false).await {
                    UpdateStatus::Available {
                        current,
                        latest,
                        critical,
                    } => {
                        if critical {
                            warn!("critical firmware update: {} -> {}", current, latest);
                        } else {
                            info!("firmware update available: {} -> {}", current, latest);
                        }
                    }
                    UpdateStatus::UpToDate { current } => info!("firmware {} is up to date", current),
                    UpdateStatus::Unknown { current } => {
                        debug!("latest firmware unknown (running {})", current)
                    }
                }
            }
        }))
    }
}

fn log_snapshot(snapshot: &FleetSnapshot, last_roster: &mut String) {
    if let Some(summary) = &snapshot.self_summary {
        debug!(
            "{} fw {} | {} dBm ({:?}) | heap {} | up {}",
            summary.hostname, summary.firmware, summary.rssi_dbm, summary.signal, summary.heap, summary.uptime
        );
        if let Some(clock) = &summary.clock {
            debug!("clock sync: {}", clock.label());
        }
    }

    if let Some(roster) = &snapshot.roster {
        let rendered = roster.to_string();
        if rendered != *last_roster {
            info!("fleet: {}", rendered);
            *last_roster = rendered;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("fleetlink=info,fleetlink_monitor=info")),
        )
        .init();

    info!("FleetLink monitor starting...");

    let monitor = Monitor::new().await.context("Failed to create monitor")?;
    monitor.run().await.context("Monitor execution failed")?;

    Ok(())
}
