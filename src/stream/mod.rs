//! Broadcast signaling handlers and ICE server provisioning.

pub mod signaling;
pub mod turn;
