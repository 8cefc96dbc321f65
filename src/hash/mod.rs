//! Hash Space
//!
//! Every key and every node lives on the same 128-bit circle. Coordinates are
//! produced by Murmur3 (x64, 128-bit variant) and compared as big-endian
//! unsigned integers, so byte order and numeric order agree.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;


/// Seed shared by every node; changing it re-partitions the whole keyspace.
pub const SEED: u32 = 42;

/// Width of a coordinate in bytes.
pub const POSITION_BYTES: usize = 16;

/// Content digest used by the ring and the radix tree.
pub type Digest = [u8; 16];

/// Murmur3 x64/128 of `data`.
pub fn digest(data: &[u8]) -> Digest {
    let mut reader = data;
    // reading from an in-memory slice cannot fail
    murmur3::murmur3_x64_128(&mut reader, SEED)
        .unwrap_or_default()
        .to_be_bytes()
}

/// Accumulates several byte strings and digests them as one.
#[derive(Default)]
pub struct Hasher {
    buf: Vec<u8>,
}

impl Hasher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, data: &[u8]) -> &mut Self {
        self.buf.extend_from_slice(data);
        self
    }

    pub fn finish(&self) -> Digest {
        digest(&self.buf)
    }
}

/// A coordinate on the ring.
#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Position(pub [u8; POSITION_BYTES]);

impl Position {
    pub const ZERO: Position = Position([0; POSITION_BYTES]);
    pub const MAX: Position = Position([0xff; POSITION_BYTES]);

    /// The ring coordinate of an arbitrary key.
    pub fn of(key: &[u8]) -> Self {
        Position(digest(key))
    }

    pub fn from_u128(value: u128) -> Self {
        Position(value.to_be_bytes())
    }

    pub fn as_u128(&self) -> u128 {
        u128::from_be_bytes(self.0)
    }

    /// Reads the first 16 bytes of `bytes`, zero padding short input.
    pub fn from_prefix(bytes: &[u8]) -> Self {
        let mut out = [0u8; POSITION_BYTES];
        let n = bytes.len().min(POSITION_BYTES);
        out[..n].copy_from_slice(&bytes[..n]);
        Position(out)
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0; POSITION_BYTES]
    }

    /// The coordinate directly after this one, wrapping at the top.
    pub fn next(&self) -> Self {
        Position::from_u128(self.as_u128().wrapping_add(1))
    }

    /// Whether `self` lies in the half open arc `[from, to)`.
    ///
    /// The arc wraps when `to <= from`; `from == to` covers the whole circle.
    pub fn within(&self, from: &Position, to: &Position) -> bool {
        match from.cmp(to) {
            std::cmp::Ordering::Less => from <= self && self < to,
            std::cmp::Ordering::Greater => from <= self || self < to,
            std::cmp::Ordering::Equal => true,
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:032x}", self.as_u128())
    }
}

impl fmt::Debug for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Position({})", self)
    }
}

impl FromStr for Position {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        u128::from_str_radix(s.trim_start_matches("0x"), 16).map(Position::from_u128)
    }
}
