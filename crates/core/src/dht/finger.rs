#![warn(missing_docs)]
//! Finger table for maintaining the ring topology.
//!
//! Slot `i` ideally holds the owner of the id `2^i` past this node, so the
//! table spans the ring in doubling strides and a lookup halves the
//! remaining distance per hop.

use std::fmt;
use std::ops::Index;

use serde::Deserialize;
use serde::Serialize;

use crate::dht::id::RingId;

/// A pointer to a ring member: the endpoint it serves on plus its ring id.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Finger {
    /// Address the member listens on.
    pub address: String,
    /// Port the member listens on.
    pub port: u16,
    /// Ring id, the hash of `address:port`.
    pub id: RingId,
}

impl Finger {
    /// Build a pointer for an endpoint, deriving the id from `address:port`.
    pub fn new(address: impl Into<String>, port: u16) -> Self {
        let address = address.into();
        let id = RingId::of(&format!("{address}:{port}"));
        Self { address, port, id }
    }

    /// The `address:port` form used on the wire.
    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.address, self.port)
    }
}

impl fmt::Display for Finger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}({})", self.address, self.port, self.id)
    }
}

/// Finger table holding a fixed number of slots, some possibly unresolved.
#[derive(Clone, Debug)]
pub struct FingerTable {
    id: RingId,
    size: usize,
    slots: Vec<Option<Finger>>,
}

impl FingerTable {
    /// An empty table for the member with id `id`.
    pub fn new(id: RingId, size: usize) -> Self {
        Self {
            id,
            size,
            slots: vec![None; size],
        }
    }

    /// A table with every slot pointing at `own`, the state of a member
    /// seeding a fresh ring alone.
    pub fn seeded(own: &Finger, size: usize) -> Self {
        Self {
            id: own.id,
            size,
            slots: vec![Some(own.clone()); size],
        }
    }

    /// Number of slots.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Get finger at `index`.
    pub fn get(&self, index: usize) -> Option<&Finger> {
        self.slots.get(index).and_then(|f| f.as_ref())
    }

    /// Set finger at `index` to `finger`.
    pub fn set(&mut self, index: usize, finger: Finger) {
        if index >= self.size {
            tracing::error!("set finger index {} out of range {}", index, self.size);
            return;
        }
        tracing::debug!(
            "set finger {} of {} to {}",
            index,
            self.id,
            finger
        );
        self.slots[index] = Some(finger);
    }

    /// The populated finger whose id most closely follows `target`
    /// clockwise. `None` when the table is entirely unresolved.
    pub fn closest_following(&self, target: RingId) -> Option<Finger> {
        let mut best: Option<(&Finger, u64)> = None;
        for finger in self.slots.iter().flatten() {
            let distance = (finger.id - target).value();
            match best {
                Some((_, shortest)) if shortest <= distance => {}
                _ => best = Some((finger, distance)),
            }
        }
        best.map(|(finger, _)| finger.clone())
    }

    /// Whether any slot points at the member with id `id`.
    pub fn references(&self, id: RingId) -> bool {
        self.slots.iter().flatten().any(|f| f.id == id)
    }

    /// All slots in order.
    pub fn list(&self) -> &[Option<Finger>] {
        &self.slots
    }
}

impl Index<usize> for FingerTable {
    type Output = Option<Finger>;

    fn index(&self, index: usize) -> &Self::Output {
        &self.slots[index]
    }
}
