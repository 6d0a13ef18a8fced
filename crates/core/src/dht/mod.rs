#![warn(missing_docs)]
//! Implementation of Ringlet's DHT
//! which is based on CHORD, ref: <https://pdos.csail.mit.edu/papers/ton:chord/paper-ton.pdf>
//! With high probability, the number of nodes that must be contacted to find a successor in an N-node network is O(log N).

pub mod chord;
/// Ring leader election, Chang-Roberts style.
pub mod election;
/// Finger table for Ringlet
pub mod finger;
pub mod heartbeat;
pub mod id;
pub mod stabilization;
pub mod types;

pub use chord::NodeRing;
pub use chord::RouteDecision;
pub use election::Role;
pub use finger::Finger;
pub use finger::FingerTable;
pub use heartbeat::Heartbeat;
pub use id::RingId;
pub use stabilization::Stabilization;
pub use types::Periodic;

#[cfg(test)]
pub mod tests {
    use super::*;

    /// A finger with a hand-picked id, for exercising ring logic without
    /// hashing real endpoints.
    pub fn peer(id: u64) -> Finger {
        Finger {
            address: "10.0.0.1".to_string(),
            port: 9000,
            id: RingId::from(id),
        }
    }
}
