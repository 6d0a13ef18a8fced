//! Constant variables.

use std::time::Duration;

/// Finger table width. The identifier space is `2^M` wide, and slot `i`
/// of the table targets the id `2^i` past the owner.
pub const M: usize = 32;

/// Number of identifiers on the ring, `2^M`.
pub const RING_SIZE: u64 = 1 << M;

/// Copies of each key held at quiescence: the owner plus its two successors.
pub const REPLICATION_FACTOR: usize = 3;

/// Grace period before the first stabilization pass.
pub const STABILIZE_DELAY: Duration = Duration::from_secs(10);

/// Interval between stabilization passes.
pub const STABILIZE_INTERVAL: Duration = Duration::from_secs(10);

/// Sleep between attempts while rebuilding the ring through the backup
/// successor.
pub const STABILIZE_RETRY_DELAY: Duration = Duration::from_secs(2);

/// Grace period before the first heartbeat pass, long enough for a fresh
/// member to finish its first stabilization.
pub const HEARTBEAT_DELAY: Duration = Duration::from_secs(30);

/// Interval between heartbeat passes.
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(5);

/// Deadline for establishing an outbound connection.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(3);

/// Deadline for a single reply line on an established connection.
pub const REPLY_TIMEOUT: Duration = Duration::from_secs(10);
