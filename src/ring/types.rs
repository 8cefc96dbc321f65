use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

use crate::hash::Position;

/// A ring member: where it sits and how to reach it.
///
/// Ordered by position first, then address, so members sharing a coordinate
/// still have a total order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Remote {
    pub pos: Position,
    pub addr: String,
}

impl Remote {
    pub fn new(pos: Position, addr: impl Into<String>) -> Self {
        Self {
            pos,
            addr: addr.into(),
        }
    }
}

impl Ord for Remote {
    fn cmp(&self, other: &Self) -> Ordering {
        self.pos
            .cmp(&other.pos)
            .then_with(|| self.addr.cmp(&other.addr))
    }
}

impl PartialOrd for Remote {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Remote {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.addr, self.pos)
    }
}
