//! Fleet roster aggregation.
//!
//! Every poll cycle fetches the local node's self info and its peer list,
//! then merges them into a `FleetSnapshot`:
//! - one roster slot per fleet role, in track order, local role excluded
//! - best status per role (online < stale < offline < anything else)
//! - failed sources keep the previous rendering
//! - clock-sync readout for the node that owns time synchronization

mod poller;
mod roster;
mod summary;

pub use poller::{FleetHandle, FleetPoller, FleetSource, HttpFleetSource, DEFAULT_POLL_INTERVAL};
pub use roster::{build_roster, dedup_peers, RosterEntry, RosterSlot, RosterView};
pub use summary::{
    classify_clock_offset, format_bytes, format_uptime, summarize_self, ClockSync, SelfSummary,
    SignalQuality,
};

use crate::error::Result;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Start,
    Speedtrap,
    Finish,
    Telemetry,
}

impl Role {
    /// Track flow order, also the roster rendering order.
    pub const ALL: [Role; 4] = [Role::Start, Role::Speedtrap, Role::Finish, Role::Telemetry];

    pub fn parse(raw: &str) -> Option<Role> {
        match raw.trim().to_lowercase().as_str() {
            "start" => Some(Role::Start),
            "speedtrap" => Some(Role::Speedtrap),
            "finish" => Some(Role::Finish),
            "telemetry" => Some(Role::Telemetry),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Start => "start",
            Role::Speedtrap => "speedtrap",
            Role::Finish => "finish",
            Role::Telemetry => "telemetry",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Role::Start => "Start",
            Role::Speedtrap => "Trap",
            Role::Finish => "Finish",
            Role::Telemetry => "Telem",
        }
    }

    /// The finish gate runs cross-node clock synchronization.
    pub fn is_sync_authority(&self) -> bool {
        matches!(self, Role::Finish)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerStatus {
    Online,
    Stale,
    Offline,
    Unrecognized(String),
}

impl PeerStatus {
    pub fn parse(raw: &str) -> PeerStatus {
        let lowered = raw.trim().to_lowercase();
        match lowered.as_str() {
            "online" => PeerStatus::Online,
            "stale" => PeerStatus::Stale,
            "offline" => PeerStatus::Offline,
            _ => PeerStatus::Unrecognized(lowered),
        }
    }

    /// Lower is better.
    pub fn rank(&self) -> u8 {
        match self {
            PeerStatus::Online => 0,
            PeerStatus::Stale => 1,
            PeerStatus::Offline => 2,
            PeerStatus::Unrecognized(_) => 9,
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            PeerStatus::Online => "online",
            PeerStatus::Stale => "stale",
            PeerStatus::Offline => "offline",
            PeerStatus::Unrecognized(raw) => raw.as_str(),
        }
    }
}

fn lenient_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

/// Any JSON number, floats rounded (the node prints large doubles in
/// exponent form). `null` and non-numbers decode as `None`.
fn lenient_number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<i64>, D::Error> {
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::Number(n)) => n.as_i64().or_else(|| {
            n.as_f64()
                .filter(|f| f.is_finite())
                .map(|f| f.round() as i64)
        }),
        _ => None,
    })
}

fn lenient_i32<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i32, D::Error> {
    Ok(lenient_number(deserializer)?
        .map(|n| n.clamp(i64::from(i32::MIN), i64::from(i32::MAX)) as i32)
        .unwrap_or_default())
}

fn lenient_u64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
    Ok(lenient_number(deserializer)?
        .map(|n| n.max(0) as u64)
        .unwrap_or_default())
}

/// One entry of the node's `/api/peers` list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerRecord {
    #[serde(default, deserialize_with = "lenient_string")]
    pub role: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub hostname: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub status: String,
}

impl PeerRecord {
    pub fn new(role: &str, hostname: &str, status: &str) -> Self {
        Self {
            role: role.to_string(),
            hostname: hostname.to_string(),
            status: status.to_string(),
        }
    }

    /// Grouping key; a record without a role groups under "unknown".
    pub fn role_key(&self) -> String {
        let role = self.role.trim().to_lowercase();
        if role.is_empty() {
            "unknown".to_string()
        } else {
            role
        }
    }

    /// A record without a status counts as offline.
    pub fn peer_status(&self) -> PeerStatus {
        if self.status.trim().is_empty() {
            PeerStatus::Offline
        } else {
            PeerStatus::parse(&self.status)
        }
    }
}

/// The local node's `/api/info` record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelfInfo {
    #[serde(default, deserialize_with = "lenient_string")]
    pub role: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub hostname: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub firmware: String,
    #[serde(default, deserialize_with = "lenient_i32")]
    pub wifi_rssi: i32,
    #[serde(default, deserialize_with = "lenient_u64")]
    pub free_heap: u64,
    #[serde(default, deserialize_with = "lenient_u64")]
    pub uptime_s: u64,
    /// Signed offset to the fleet clock in microseconds.
    #[serde(default, deserialize_with = "lenient_number")]
    pub clock_offset_us: Option<i64>,
}

impl SelfInfo {
    pub fn local_role(&self) -> Option<Role> {
        Role::parse(&self.role)
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct FleetSnapshot {
    pub local_role: Option<Role>,
    pub self_summary: Option<SelfSummary>,
    pub roster: Option<RosterView>,
    /// Completed poll cycles.
    pub cycle: u64,
}

/// Owns the last rendered self summary and roster.
#[derive(Debug, Default)]
pub struct FleetAggregator {
    snapshot: FleetSnapshot,
}

impl FleetAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> &FleetSnapshot {
        &self.snapshot
    }

    pub fn local_role(&self) -> Option<Role> {
        self.snapshot.local_role
    }

    /// Merge one poll cycle. Self info is applied first so the roster
    /// excludes the freshest local role.
    pub fn merge(
        &mut self,
        self_info: Result<SelfInfo>,
        peers: Result<Vec<PeerRecord>>,
    ) -> &FleetSnapshot {
        self.snapshot.cycle += 1;

        match self_info {
            Ok(info) => {
                self.snapshot.local_role = info.local_role();
                self.snapshot.self_summary = Some(summarize_self(&info));
            }
            Err(e) => warn!("self info unavailable, keeping previous summary: {}", e),
        }

        match peers {
            Ok(records) => {
                debug!("merging {} peer records", records.len());
                self.snapshot.roster = Some(build_roster(&records, self.snapshot.local_role));
            }
            Err(e) => warn!("peer list unavailable, keeping previous roster: {}", e),
        }

        &self.snapshot
    }
}
