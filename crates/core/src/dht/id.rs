#![warn(missing_docs)]
//! Ring identifier type and hashing.
//!
//! A [`RingId`] is an element of the finite ring of integers modulo
//! [`RING_SIZE`]. Node endpoints and keys are both hashed onto the same
//! ring, and all distance arithmetic wraps around it, so `a - b` is always
//! the clockwise distance from `b` to `a`.

use std::ops::Add;
use std::ops::Neg;
use std::ops::Sub;
use std::str::FromStr;

use serde::Deserialize;
use serde::Serialize;
use sha1::Digest;
use sha1::Sha1;

use crate::consts::RING_SIZE;
use crate::error::Error;
use crate::error::Result;

/// An identifier on the ring, in `[0, RING_SIZE)`.
#[derive(
    Copy, Clone, Debug, Default, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize,
)]
pub struct RingId(u64);

impl RingId {
    /// Hash an arbitrary string onto the ring.
    ///
    /// The SHA-1 digest of the UTF-8 bytes is folded to four bytes by
    /// XOR-ing its five four-byte groups, and the fold is read as a
    /// big-endian integer. The fold only ever populates 32 bits, so the
    /// result is already inside the ring for the default width.
    pub fn of(input: &str) -> Self {
        let digest = Sha1::digest(input.as_bytes());
        let mut folded = [0u8; 4];
        for (i, byte) in folded.iter_mut().enumerate() {
            *byte = digest[i] ^ digest[i + 4] ^ digest[i + 8] ^ digest[i + 12] ^ digest[i + 16];
        }
        Self(u64::from(u32::from_be_bytes(folded)) % RING_SIZE)
    }

    /// The raw value of this id.
    pub fn value(self) -> u64 {
        self.0
    }

    /// The folded digest as upper-case hex, for diagnostics.
    pub fn to_hex(self) -> String {
        format!("{:08X}", self.0)
    }

    /// Whether this id lies in the clockwise interval `(from, to]`.
    ///
    /// A degenerate interval where `from == to` covers the whole ring,
    /// which is what a member whose predecessor is itself expects.
    pub fn in_open_closed(self, from: RingId, to: RingId) -> bool {
        if from == to {
            return true;
        }
        self != from && (self - from).0 <= (to - from).0
    }
}

impl From<u64> for RingId {
    fn from(value: u64) -> Self {
        Self(value % RING_SIZE)
    }
}

impl FromStr for RingId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        s.parse::<u64>()
            .map(Self::from)
            .map_err(|_| Error::InvalidRingId(s.to_string()))
    }
}

impl std::fmt::Display for RingId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Neg for RingId {
    type Output = Self;

    fn neg(self) -> Self {
        Self((RING_SIZE - self.0) % RING_SIZE)
    }
}

impl Add for RingId {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self((self.0 + rhs.0) % RING_SIZE)
    }
}

impl Add<u64> for RingId {
    type Output = Self;

    fn add(self, rhs: u64) -> Self {
        self + Self::from(rhs)
    }
}

impl Sub for RingId {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        self + (-rhs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fold_known_answers() {
        assert_eq!(RingId::of("127.0.0.1:9000").value(), 405900688);
        assert_eq!(RingId::of("127.0.0.1:9001").value(), 2173012035);
        assert_eq!(RingId::of("apple").value(), 3698026390);
        assert_eq!(RingId::of("banana").value(), 3215606579);
    }

    #[test]
    fn test_fold_is_deterministic() {
        assert_eq!(RingId::of("chord"), RingId::of("chord"));
        assert_ne!(RingId::of("chord"), RingId::of("chord "));
    }

    #[test]
    fn test_hex_is_zero_padded() {
        assert_eq!(RingId::of("chord").to_hex(), "08AEF9A3");
        assert_eq!(RingId::from(0u64).to_hex(), "00000000");
    }

    #[test]
    fn test_modular_arithmetic_wraps() {
        let almost = RingId::from(RING_SIZE - 1);
        assert_eq!(almost + 2u64, RingId::from(1u64));
        assert_eq!(RingId::from(1u64) - RingId::from(2u64), almost);
        let a = RingId::from(123u64);
        assert_eq!(a - a, RingId::from(0u64));
        assert_eq!(-(-a), a);
    }

    #[test]
    fn test_interval_membership() {
        let (a, b) = (RingId::from(10u64), RingId::from(20u64));
        assert!(RingId::from(15u64).in_open_closed(a, b));
        assert!(RingId::from(20u64).in_open_closed(a, b), "right end included");
        assert!(!RingId::from(10u64).in_open_closed(a, b), "left end excluded");
        assert!(!RingId::from(25u64).in_open_closed(a, b));
    }

    #[test]
    fn test_interval_wraps_around_zero() {
        let (a, b) = (RingId::from(RING_SIZE - 5), RingId::from(5u64));
        assert!(RingId::from(RING_SIZE - 1).in_open_closed(a, b));
        assert!(RingId::from(0u64).in_open_closed(a, b));
        assert!(RingId::from(5u64).in_open_closed(a, b));
        assert!(!RingId::from(6u64).in_open_closed(a, b));
        assert!(!RingId::from(RING_SIZE - 5).in_open_closed(a, b));
    }

    #[test]
    fn test_degenerate_interval_covers_ring() {
        let a = RingId::from(42u64);
        assert!(RingId::from(0u64).in_open_closed(a, a));
        assert!(RingId::from(41u64).in_open_closed(a, a));
        assert!(RingId::from(42u64).in_open_closed(a, a));
    }
}
