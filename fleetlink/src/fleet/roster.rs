//! Peer dedup and per-role roster construction.

use super::{PeerRecord, PeerStatus, Role};
use std::fmt;

/// What the roster knows about one role.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RosterSlot {
    Discovered { hostname: String, status: PeerStatus },
    /// No peer ever reported this role. Distinct from a known node that is offline.
    Undiscovered,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RosterEntry {
    pub role: Role,
    pub slot: RosterSlot,
}

impl RosterEntry {
    pub fn is_discovered(&self) -> bool {
        matches!(self.slot, RosterSlot::Discovered { .. })
    }

    pub fn status(&self) -> Option<&PeerStatus> {
        match &self.slot {
            RosterSlot::Discovered { status, .. } => Some(status),
            RosterSlot::Undiscovered => None,
        }
    }
}

/// One entry per fleet role except the local one, in track order.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RosterView {
    entries: Vec<RosterEntry>,
}

impl RosterView {
    pub fn entries(&self) -> &[RosterEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, role: Role) -> Option<&RosterEntry> {
        self.entries.iter().find(|e| e.role == role)
    }

    pub fn roles(&self) -> Vec<Role> {
        self.entries.iter().map(|e| e.role).collect()
    }
}

impl fmt::Display for RosterView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, entry) in self.entries.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            match &entry.slot {
                RosterSlot::Discovered { status, .. } => {
                    write!(f, "\u{25CF} {} [{}]", entry.role.label(), status.as_str())?
                }
                RosterSlot::Undiscovered => write!(f, "\u{25CF} {} [unknown]", entry.role.label())?,
            }
        }
        Ok(())
    }
}

/// Keep the best-ranked record per role; on equal rank the first one seen
/// wins. Output keeps the order in which roles first appeared.
pub fn dedup_peers(records: &[PeerRecord]) -> Vec<PeerRecord> {
    let mut best: Vec<(String, u8, &PeerRecord)> = Vec::new();

    for record in records {
        let key = record.role_key();
        let rank = record.peer_status().rank();
        match best.iter_mut().find(|(role, _, _)| *role == key) {
            Some(slot) if rank < slot.1 => *slot = (key, rank, record),
            Some(_) => {}
            None => best.push((key, rank, record)),
        }
    }

    best.into_iter().map(|(_, _, record)| record.clone()).collect()
}

/// Build the roster from a fresh peer list. `local_role` is left out.
pub fn build_roster(records: &[PeerRecord], local_role: Option<Role>) -> RosterView {
    let survivors = dedup_peers(records);

    let entries = Role::ALL
        .iter()
        .copied()
        .filter(|role| Some(*role) != local_role)
        .map(|role| {
            let slot = survivors
                .iter()
                .find(|p| p.role_key() == role.as_str())
                .map(|p| RosterSlot::Discovered {
                    hostname: p.hostname.clone(),
                    status: p.peer_status(),
                })
                .unwrap_or(RosterSlot::Undiscovered);
            RosterEntry { role, slot }
        })
        .collect();

    RosterView { entries }
}
