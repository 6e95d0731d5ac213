//! Viewer-side reconnection state machine.
//!
//! [`ReconnectionController`] owns no sockets or timers. It consumes
//! [`ViewerInput`]s (server events, transport callbacks, timer expiries) and
//! returns the [`ViewerAction`]s the driver must carry out, so every transition
//! can be exercised directly in tests.

use std::time::Duration;

use serde_json::Value;

use crate::hub::PartyId;
use crate::ws::protocol::RetryHints;

/// Connection state as believed by the viewer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ViewerState {
    #[default]
    Idle,
    Negotiating,
    Connected,
    Retrying,
}

/// Identifies one peer-connection instance. A new handle is minted for every
/// accepted offer; inputs carrying an older handle are stale and ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PeerHandle(u64);

impl PeerHandle {
    pub fn generation(self) -> u64 {
        self.0
    }
}

/// Timers the driver keeps on the controller's behalf.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Timer {
    /// Deadline for the track of negotiation attempt `attempt`.
    Negotiation { attempt: u64 },
    /// Next retry tick.
    Retry,
}

impl Timer {
    pub fn kind(self) -> TimerKind {
        match self {
            Timer::Negotiation { .. } => TimerKind::Negotiation,
            Timer::Retry => TimerKind::Retry,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerKind {
    Negotiation,
    Retry,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ViewerInput {
    /// The signaling socket is up and the server sent `welcome`.
    SignalingConnected,
    /// The signaling socket was lost.
    SignalingLost,
    BroadcasterAvailable,
    /// `broadcaster-disconnected`, `broadcaster-stopped` or `broadcaster-terminated`.
    BroadcasterGone,
    NoBroadcaster,
    Offer { from: PartyId, payload: Value },
    RemoteCandidate { from: PartyId, candidate: Value },
    /// The transport gathered a local candidate for `handle`.
    LocalCandidate { handle: PeerHandle, candidate: Value },
    /// The transport delivered a live media track on `handle`.
    TrackReceived { handle: PeerHandle },
    TransportFailed { handle: PeerHandle },
    TimerFired(Timer),
}

#[derive(Debug, Clone, PartialEq)]
pub enum ViewerAction {
    SendWatcher,
    /// Create a peer connection for `handle`, apply the offer and send the
    /// resulting answer to `broadcaster`.
    AnswerOffer {
        handle: PeerHandle,
        broadcaster: PartyId,
        offer: Value,
    },
    AddRemoteCandidate { handle: PeerHandle, candidate: Value },
    SendCandidate { target: PartyId, candidate: Value },
    ClosePeer(PeerHandle),
    /// (Re)arm a timer. Arming replaces any pending timer of the same kind.
    ArmTimer { timer: Timer, after: Duration },
    CancelTimer(TimerKind),
}

/// Durations driving the controller's timers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControllerTiming {
    pub negotiation_timeout: Duration,
    pub retry_interval: Duration,
}

impl Default for ControllerTiming {
    fn default() -> Self {
        Self {
            negotiation_timeout: Duration::from_secs(5),
            retry_interval: Duration::from_secs(2),
        }
    }
}

impl From<RetryHints> for ControllerTiming {
    fn from(hints: RetryHints) -> Self {
        Self {
            negotiation_timeout: Duration::from_millis(hints.negotiation_timeout_ms),
            retry_interval: Duration::from_millis(hints.retry_interval_ms),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ActivePeer {
    handle: PeerHandle,
    live: bool,
}

#[derive(Debug)]
pub struct ReconnectionController {
    state: ViewerState,
    timing: ControllerTiming,
    signaling_up: bool,
    /// At most one peer connection exists at a time.
    peer: Option<ActivePeer>,
    broadcaster: Option<PartyId>,
    /// A `watcher` went out and no offer has answered it yet.
    watcher_pending: bool,
    next_handle: u64,
    attempt: u64,
}

impl ReconnectionController {
    pub fn new(timing: ControllerTiming) -> Self {
        Self {
            state: ViewerState::Idle,
            timing,
            signaling_up: false,
            peer: None,
            broadcaster: None,
            watcher_pending: false,
            next_handle: 0,
            attempt: 0,
        }
    }

    pub fn state(&self) -> ViewerState {
        self.state
    }

    pub fn timing(&self) -> ControllerTiming {
        self.timing
    }

    /// Replace the timing, e.g. with hints from `welcome`. Applies to timers
    /// armed from now on.
    pub fn set_timing(&mut self, timing: ControllerTiming) {
        self.timing = timing;
    }

    pub fn current_handle(&self) -> Option<PeerHandle> {
        self.peer.map(|p| p.handle)
    }

    pub fn broadcaster(&self) -> Option<&PartyId> {
        self.broadcaster.as_ref()
    }

    pub fn has_live_track(&self) -> bool {
        self.peer.is_some_and(|p| p.live)
    }

    /// Apply one input and return the actions to perform, in order.
    pub fn handle(&mut self, input: ViewerInput) -> Vec<ViewerAction> {
        let mut actions = Vec::new();

        match input {
            ViewerInput::SignalingConnected => {
                self.signaling_up = true;
                if self.can_start_attempt() {
                    self.begin_attempt(&mut actions);
                }
            }
            ViewerInput::SignalingLost => {
                self.signaling_up = false;
                self.teardown(&mut actions);
                self.enter_retrying(&mut actions);
            }
            ViewerInput::BroadcasterAvailable => {
                if self.signaling_up && self.can_start_attempt() {
                    self.begin_attempt(&mut actions);
                }
            }
            ViewerInput::BroadcasterGone => {
                self.teardown(&mut actions);
                self.enter_retrying(&mut actions);
            }
            ViewerInput::NoBroadcaster => {
                if self.state == ViewerState::Negotiating && self.peer.is_none() {
                    self.watcher_pending = false;
                    self.enter_retrying(&mut actions);
                }
            }
            ViewerInput::Offer { from, payload } => self.accept_offer(from, payload, &mut actions),
            ViewerInput::RemoteCandidate { from, candidate } => {
                if let (Some(peer), Some(broadcaster)) = (self.peer, &self.broadcaster) {
                    if *broadcaster == from {
                        actions.push(ViewerAction::AddRemoteCandidate {
                            handle: peer.handle,
                            candidate,
                        });
                    }
                }
            }
            ViewerInput::LocalCandidate { handle, candidate } => {
                if self.is_current(handle) {
                    if let Some(target) = &self.broadcaster {
                        actions.push(ViewerAction::SendCandidate {
                            target: target.clone(),
                            candidate,
                        });
                    }
                }
            }
            ViewerInput::TrackReceived { handle } => {
                if self.is_current(handle) {
                    if let Some(peer) = self.peer.as_mut() {
                        peer.live = true;
                    }
                    match self.state {
                        ViewerState::Negotiating => {
                            actions.push(ViewerAction::CancelTimer(TimerKind::Negotiation));
                        }
                        ViewerState::Retrying => {
                            actions.push(ViewerAction::CancelTimer(TimerKind::Retry));
                        }
                        ViewerState::Idle | ViewerState::Connected => {}
                    }
                    self.state = ViewerState::Connected;
                }
            }
            ViewerInput::TransportFailed { handle } => {
                if self.is_current(handle) {
                    self.teardown(&mut actions);
                    self.enter_retrying(&mut actions);
                }
            }
            ViewerInput::TimerFired(Timer::Negotiation { attempt }) => {
                // A late track may still arrive on the open handle while retrying.
                if self.state == ViewerState::Negotiating && attempt == self.attempt {
                    self.enter_retrying(&mut actions);
                }
            }
            ViewerInput::TimerFired(Timer::Retry) => {
                if self.state == ViewerState::Retrying {
                    if self.signaling_up && !self.has_live_track() {
                        self.begin_attempt(&mut actions);
                    } else {
                        self.arm(Timer::Retry, &mut actions);
                    }
                }
            }
        }

        actions
    }

    fn can_start_attempt(&self) -> bool {
        matches!(self.state, ViewerState::Idle | ViewerState::Retrying) && !self.has_live_track()
    }

    fn is_current(&self, handle: PeerHandle) -> bool {
        self.current_handle() == Some(handle)
    }

    /// Send `watcher` and enter Negotiating with a fresh deadline.
    fn begin_attempt(&mut self, actions: &mut Vec<ViewerAction>) {
        self.teardown(actions);
        if self.state == ViewerState::Retrying {
            actions.push(ViewerAction::CancelTimer(TimerKind::Retry));
        }
        self.attempt += 1;
        self.watcher_pending = true;
        actions.push(ViewerAction::SendWatcher);
        self.arm(
            Timer::Negotiation {
                attempt: self.attempt,
            },
            actions,
        );
        self.state = ViewerState::Negotiating;
    }

    /// Whether an offer from `from` belongs to this viewer's session: it must
    /// come from the broadcaster already negotiated with, or answer a pending
    /// `watcher` when none is known yet.
    fn expects_offer_from(&self, from: &PartyId) -> bool {
        match &self.broadcaster {
            Some(broadcaster) => broadcaster == from,
            None => self.watcher_pending,
        }
    }

    fn accept_offer(&mut self, from: PartyId, offer: Value, actions: &mut Vec<ViewerAction>) {
        if !self.expects_offer_from(&from) {
            tracing::debug!(
                from = %from,
                broadcaster = ?self.broadcaster,
                "Ignoring unsolicited offer"
            );
            return;
        }
        self.teardown(actions);

        match self.state {
            ViewerState::Negotiating => {}
            ViewerState::Retrying => {
                actions.push(ViewerAction::CancelTimer(TimerKind::Retry));
                self.start_deadline(actions);
            }
            ViewerState::Idle | ViewerState::Connected => self.start_deadline(actions),
        }

        self.next_handle += 1;
        let handle = PeerHandle(self.next_handle);
        self.peer = Some(ActivePeer {
            handle,
            live: false,
        });
        self.broadcaster = Some(from.clone());
        self.state = ViewerState::Negotiating;
        actions.push(ViewerAction::AnswerOffer {
            handle,
            broadcaster: from,
            offer,
        });
    }

    fn start_deadline(&mut self, actions: &mut Vec<ViewerAction>) {
        self.attempt += 1;
        self.arm(
            Timer::Negotiation {
                attempt: self.attempt,
            },
            actions,
        );
    }

    fn enter_retrying(&mut self, actions: &mut Vec<ViewerAction>) {
        match self.state {
            ViewerState::Retrying => {}
            ViewerState::Negotiating => {
                actions.push(ViewerAction::CancelTimer(TimerKind::Negotiation));
                self.arm(Timer::Retry, actions);
            }
            ViewerState::Idle | ViewerState::Connected => self.arm(Timer::Retry, actions),
        }
        self.state = ViewerState::Retrying;
    }

    fn teardown(&mut self, actions: &mut Vec<ViewerAction>) {
        if let Some(peer) = self.peer.take() {
            actions.push(ViewerAction::ClosePeer(peer.handle));
        }
        self.broadcaster = None;
        self.watcher_pending = false;
    }

    fn arm(&self, timer: Timer, actions: &mut Vec<ViewerAction>) {
        let after = match timer.kind() {
            TimerKind::Negotiation => self.timing.negotiation_timeout,
            TimerKind::Retry => self.timing.retry_interval,
        };
        actions.push(ViewerAction::ArmTimer { timer, after });
    }
}

impl Default for ReconnectionController {
    fn default() -> Self {
        Self::new(ControllerTiming::default())
    }
}
