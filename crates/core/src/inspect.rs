#![warn(missing_docs)]
//! Serializable snapshots of a member's view of the ring.
//!
//! The stabilization daemon logs one [`NodeInfo`] per pass as a JSON line,
//! and tests read the same structure straight off a
//! [`NodeRing`](crate::dht::NodeRing). Nothing here feeds back into the
//! protocol.

use serde::Deserialize;
use serde::Serialize;

use crate::dht::election::Role;
use crate::dht::finger::Finger;

/// A pointer to another member, flattened for serialization.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PeerInfo {
    /// The `address:port` the member serves on.
    pub endpoint: String,
    /// The member's ring id.
    pub id: u64,
}

impl From<&Finger> for PeerInfo {
    fn from(finger: &Finger) -> Self {
        Self {
            endpoint: finger.endpoint(),
            id: finger.id.value(),
        }
    }
}

/// Everything a member believes about the ring at one instant.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NodeInfo {
    /// This member's ring id.
    pub id: u64,
    /// The id as upper-case hex.
    pub id_hex: String,
    /// The endpoint this member serves on.
    pub endpoint: String,
    /// Election role.
    pub role: Role,
    /// Who this member believes leads the ring.
    pub leader: PeerInfo,
    /// Immediate successor.
    pub successor1: PeerInfo,
    /// Backup successor.
    pub successor2: PeerInfo,
    /// Immediate predecessor.
    pub predecessor1: PeerInfo,
    /// Backup predecessor.
    pub predecessor2: PeerInfo,
    /// Finger slots compressed into runs of equal ids, each run
    /// `(id, first_slot, last_slot)` with `None` for unresolved slots.
    pub fingers: Vec<(Option<u64>, u64, u64)>,
    /// Number of locally held entries, replicas included.
    pub stored_keys: usize,
}

/// Compress consecutive equal items into `(item, first_index, last_index)`
/// runs. Neighbouring finger slots usually resolve to the same member, so
/// a 32-slot table logs as a handful of runs.
pub fn compress_runs<T: PartialEq>(items: impl Iterator<Item = T>) -> Vec<(T, u64, u64)> {
    let mut runs: Vec<(T, u64, u64)> = Vec::new();
    for (index, item) in items.enumerate() {
        let index = index as u64;
        match runs.last_mut() {
            Some((value, _, end)) if *value == item => *end = index,
            _ => runs.push((item, index, index)),
        }
    }
    runs
}
