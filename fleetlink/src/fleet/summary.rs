//! Self summary rendering: signal, memory, uptime and clock-sync readouts.

use super::{Role, SelfInfo};

const SECONDS_BUCKET_US: u64 = 500_000;
const MILLIS_BUCKET_US: u64 = 1_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalQuality {
    Strong,
    Fair,
    Weak,
}

impl SignalQuality {
    pub fn from_rssi(rssi_dbm: i32) -> Self {
        if rssi_dbm > -50 {
            SignalQuality::Strong
        } else if rssi_dbm > -70 {
            SignalQuality::Fair
        } else {
            SignalQuality::Weak
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClockSync {
    /// Offset still zero: no sync round has completed.
    NotSynchronized,
    Synchronized { offset_us: i64, label: String },
}

impl ClockSync {
    pub fn label(&self) -> &str {
        match self {
            ClockSync::NotSynchronized => "not yet synchronized",
            ClockSync::Synchronized { label, .. } => label.as_str(),
        }
    }
}

/// Classify a clock offset (µs) and bucket its magnitude for display.
pub fn classify_clock_offset(offset_us: i64) -> ClockSync {
    if offset_us == 0 {
        return ClockSync::NotSynchronized;
    }

    let abs_us = offset_us.unsigned_abs();
    // Integer rounding keeps halves rounding away from zero.
    let label = if abs_us >= SECONDS_BUCKET_US {
        let tenths = (abs_us + 50_000) / 100_000;
        format!("{}.{}s", tenths / 10, tenths % 10)
    } else if abs_us >= MILLIS_BUCKET_US {
        format!("{}ms", (abs_us + 500) / 1_000)
    } else {
        format!("{}\u{00B5}s", abs_us)
    };

    ClockSync::Synchronized { offset_us, label }
}

pub fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = 1024 * 1024;
    match bytes {
        0 => "--".to_string(),
        b if b > MB => format!("{:.1} MB", b as f64 / MB as f64),
        b if b > KB => format!("{:.1} KB", b as f64 / KB as f64),
        b => format!("{} B", b),
    }
}

pub fn format_uptime(seconds: u64) -> String {
    let h = seconds / 3600;
    let m = (seconds % 3600) / 60;
    let s = seconds % 60;
    if h > 0 {
        format!("{h}h {m}m {s}s")
    } else if m > 0 {
        format!("{m}m {s}s")
    } else {
        format!("{s}s")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelfSummary {
    pub hostname: String,
    pub role: Option<Role>,
    pub firmware: String,
    pub rssi_dbm: i32,
    pub signal: SignalQuality,
    pub heap: String,
    pub uptime: String,
    /// Only present on the sync authority when it reported an offset.
    pub clock: Option<ClockSync>,
}

pub fn summarize_self(info: &SelfInfo) -> SelfSummary {
    let role = info.local_role();
    let clock = match (role, info.clock_offset_us) {
        (Some(r), Some(offset)) if r.is_sync_authority() => Some(classify_clock_offset(offset)),
        _ => None,
    };

    SelfSummary {
        hostname: if info.hostname.is_empty() {
            "unknown".to_string()
        } else {
            info.hostname.clone()
        },
        role,
        firmware: info.firmware.clone(),
        rssi_dbm: info.wifi_rssi,
        signal: SignalQuality::from_rssi(info.wifi_rssi),
        heap: format_bytes(info.free_heap),
        uptime: format_uptime(info.uptime_s),
        clock,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clock_offset_buckets() {
        assert_eq!(classify_clock_offset(0), ClockSync::NotSynchronized);
        assert_eq!(classify_clock_offset(0).label(), "not yet synchronized");
        assert_eq!(classify_clock_offset(500_000).label(), "0.5s");
        assert_eq!(classify_clock_offset(-1_250_000).label(), "1.3s");
        assert_eq!(classify_clock_offset(2_500).label(), "3ms");
        assert_eq!(classify_clock_offset(-2_499).label(), "2ms");
        assert_eq!(classify_clock_offset(700_000).label(), "0.7s");
        assert_eq!(classify_clock_offset(-499_999).label(), "500ms");
        assert_eq!(classify_clock_offset(999).label(), "999\u{00B5}s");
        assert_eq!(
            classify_clock_offset(-42),
            ClockSync::Synchronized { offset_us: -42, label: "42\u{00B5}s".into() }
        );
    }

    #[test]
    fn test_format_helpers() {
        assert_eq!(format_bytes(0), "--");
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(180_000), "175.8 KB");
        assert_eq!(format_bytes(3 * 1024 * 1024), "3.0 MB");
        assert_eq!(format_uptime(59), "59s");
        assert_eq!(format_uptime(61), "1m 1s");
        assert_eq!(format_uptime(3_725), "1h 2m 5s");
    }

    #[test]
    fn test_signal_buckets() {
        assert_eq!(SignalQuality::from_rssi(-45), SignalQuality::Strong);
        assert_eq!(SignalQuality::from_rssi(-50), SignalQuality::Fair);
        assert_eq!(SignalQuality::from_rssi(-70), SignalQuality::Weak);
    }

    #[test]
    fn test_clock_only_on_sync_authority() {
        let mut info = SelfInfo {
            role: "finish".into(),
            hostname: String::new(),
            firmware: "2.6.0".into(),
            wifi_rssi: -55,
            free_heap: 0,
            uptime_s: 5,
            clock_offset_us: Some(0),
        };
        let summary = summarize_self(&info);
        assert_eq!(summary.hostname, "unknown");
        assert_eq!(summary.clock, Some(ClockSync::NotSynchronized));

        info.role = "start".into();
        assert_eq!(summarize_self(&info).clock, None);

        info.role = "finish".into();
        info.clock_offset_us = None;
        assert_eq!(summarize_self(&info).clock, None);
    }
}
