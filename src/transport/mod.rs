//! RPC Transport
//!
//! Internal calls are HTTP `POST /rpc/{Service}/{Method}` with bincode bodies.
//!
//! - **`switchboard`**: the outbound side, one pooled client per process node
//!   with retry and backoff.
//! - **`codec`**: helpers handlers use to decode requests and encode replies.

pub mod codec;
pub mod switchboard;

pub use codec::{RpcResponse, decode, reply};
pub use switchboard::Switchboard;
