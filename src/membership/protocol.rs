//! `Node.*` endpoints.
//!
//! | Endpoint | Request | Response |
//! |---|---|---|
//! | `Notify` | caller's `Remote` | the callee's ring after inserting the caller |
//! | `Ring` | `()` | the callee's ring |
//! | `Ping` | `()` | `()` |
//! | `GetSuccessor` | `Position` | the member owning that position in the callee's view |

pub const ENDPOINT_NOTIFY: &str = "/rpc/Node/Notify";
pub const ENDPOINT_RING: &str = "/rpc/Node/Ring";
pub const ENDPOINT_PING: &str = "/rpc/Node/Ping";
pub const ENDPOINT_GET_SUCCESSOR: &str = "/rpc/Node/GetSuccessor";
