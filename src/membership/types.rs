use std::sync::atomic::{AtomicU8, Ordering};

/// Lifecycle of a membership node. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum NodeState {
    Created = 0,
    Started = 1,
    Stopped = 2,
}

impl NodeState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => NodeState::Created,
            1 => NodeState::Started,
            _ => NodeState::Stopped,
        }
    }
}

/// Atomic cell holding a [`NodeState`].
#[derive(Debug)]
pub struct Lifecycle(AtomicU8);

impl Lifecycle {
    pub fn new() -> Self {
        Self(AtomicU8::new(NodeState::Created as u8))
    }

    pub fn get(&self) -> NodeState {
        NodeState::from_u8(self.0.load(Ordering::SeqCst))
    }

    /// Moves from `from` to `to`; false if the current state is not `from`.
    pub fn advance(&self, from: NodeState, to: NodeState) -> bool {
        self.0
            .compare_exchange(from as u8, to as u8, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}
