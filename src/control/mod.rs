//! Outgoing half of the wire protocol

pub mod protocol;

pub use protocol::{ControlResponse, OutgoingMessage, PermissionDecision};
