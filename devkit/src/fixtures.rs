/*!
Payload builders for node traffic

Mirrors what a timing node sends and accepts: state broadcasts on the
channel, commands from the dashboard, and the JSON bodies of the fleet
endpoints.
*/

use fleetlink::fleet::{PeerRecord, SelfInfo};
use serde_json::{json, Value};

/// Builds channel messages in the node's wire shape.
pub struct NodeMessageBuilder;

impl NodeMessageBuilder {
    /// Race state broadcast (`IDLE`, `ARMED`, `RACING`, `FINISHED`).
    pub fn state<S: Into<String>>(state: S, role: &str, online_peers: u32) -> Value {
        json!({
            "state": state.into(),
            "connected": online_peers > 0,
            "role": role,
            "peerCount": online_peers,
            "onlinePeers": online_peers,
            "totalRuns": 0,
            "dryRun": false,
            "ts": chrono::Utc::now().to_rfc3339(),
        })
    }

    /// Finished run with elapsed time in microseconds.
    pub fn finished_run(run: u32, elapsed_us: i64) -> Value {
        json!({
            "state": "FINISHED",
            "totalRuns": run,
            "elapsed_us": elapsed_us,
        })
    }

    /// Dashboard command (`arm`, `reset`, `syncClock`, ...).
    pub fn command<S: Into<String>>(cmd: S) -> Value {
        json!({ "cmd": cmd.into() })
    }

    pub fn command_with<S: Into<String>>(cmd: S, key: &str, value: Value) -> Value {
        let mut message = Self::command(cmd);
        message[key] = value;
        message
    }
}

/// Canned fleet data.
pub struct FleetFixtures;

impl FleetFixtures {
    pub fn self_info(role: &str, hostname: &str) -> SelfInfo {
        SelfInfo {
            role: role.to_string(),
            hostname: hostname.to_string(),
            firmware: "2.6.1".to_string(),
            wifi_rssi: -58,
            free_heap: 187_392,
            uptime_s: 3_725,
            clock_offset_us: None,
        }
    }

    pub fn finish_node(clock_offset_us: i64) -> SelfInfo {
        SelfInfo {
            clock_offset_us: Some(clock_offset_us),
            ..Self::self_info("finish", "masstrap-finish")
        }
    }

    /// One peer per role, all online.
    pub fn full_fleet() -> Vec<PeerRecord> {
        vec![
            PeerRecord::new("start", "masstrap-start", "online"),
            PeerRecord::new("speedtrap", "masstrap-trap", "online"),
            PeerRecord::new("finish", "masstrap-finish", "online"),
            PeerRecord::new("telemetry", "masstrap-telem", "online"),
        ]
    }

    /// `/api/peers` body as the node serves it, including a null field.
    pub fn peers_body() -> Value {
        json!([
            { "role": "start", "hostname": "masstrap-start", "status": "online" },
            { "role": "speedtrap", "hostname": "masstrap-trap", "status": "stale" },
            { "role": "speedtrap", "hostname": "masstrap-trap-2", "status": "online" },
            { "role": null, "hostname": "mystery", "status": "online" },
        ])
    }
}
