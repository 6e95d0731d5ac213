//! Viewer-side reconnection logic.

pub mod controller;
pub mod viewer;

pub use controller::{
    ControllerTiming, PeerHandle, ReconnectionController, Timer, TimerKind, ViewerAction,
    ViewerInput, ViewerState,
};
pub use viewer::{PeerEvent, PeerEventSender, PeerTransport, TransportError, ViewerClient};
