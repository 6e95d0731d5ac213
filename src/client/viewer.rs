//! Async viewer client: runs a [`ReconnectionController`] against a live
//! signaling socket and a pluggable media transport.

use std::collections::VecDeque;

use async_trait::async_trait;
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::time::{sleep_until, Instant};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use crate::client::controller::{
    ReconnectionController, Timer, TimerKind, ViewerAction, ViewerInput, ViewerState,
};
use crate::client::PeerHandle;
use crate::hub::PartyId;
use crate::stream::turn::IceServer;
use crate::ws::protocol::{ArtifactRequest, CandidateRequest, ClientEvent, ServerEvent};

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("peer {0:?} does not exist")]
    UnknownPeer(PeerHandle),

    #[error("negotiation failed: {0}")]
    Negotiation(String),
}

/// Asynchronous notifications from the media layer.
#[derive(Debug, Clone, PartialEq)]
pub enum PeerEvent {
    LocalCandidate { handle: PeerHandle, candidate: Value },
    Track { handle: PeerHandle },
    Failed { handle: PeerHandle },
}

impl From<PeerEvent> for ViewerInput {
    fn from(event: PeerEvent) -> Self {
        match event {
            PeerEvent::LocalCandidate { handle, candidate } => {
                ViewerInput::LocalCandidate { handle, candidate }
            }
            PeerEvent::Track { handle } => ViewerInput::TrackReceived { handle },
            PeerEvent::Failed { handle } => ViewerInput::TransportFailed { handle },
        }
    }
}

pub type PeerEventSender = mpsc::UnboundedSender<PeerEvent>;

/// The media layer behind the viewer: creates peer connections and answers
/// offers. Session descriptions and candidates stay opaque JSON.
#[async_trait]
pub trait PeerTransport: Send {
    /// Called once before the client starts; the transport reports
    /// candidates, tracks and failures on `events`.
    fn attach(&mut self, events: PeerEventSender);

    /// Create the peer connection for `handle`, apply `offer` and return the answer.
    async fn answer(
        &mut self,
        handle: PeerHandle,
        offer: Value,
        ice_servers: &[IceServer],
    ) -> Result<Value, TransportError>;

    async fn add_remote_candidate(
        &mut self,
        handle: PeerHandle,
        candidate: Value,
    ) -> Result<(), TransportError>;

    async fn close(&mut self, handle: PeerHandle);
}

/// Pending timer deadlines, one slot per kind.
#[derive(Debug, Default)]
struct Deadlines {
    negotiation: Option<(Timer, Instant)>,
    retry: Option<(Timer, Instant)>,
}

impl Deadlines {
    fn slot(&mut self, kind: TimerKind) -> &mut Option<(Timer, Instant)> {
        match kind {
            TimerKind::Negotiation => &mut self.negotiation,
            TimerKind::Retry => &mut self.retry,
        }
    }

    fn clear(&mut self) {
        self.negotiation = None;
        self.retry = None;
    }
}

/// Sleep until the deadline, or forever when none is armed.
async fn fire(deadline: Option<(Timer, Instant)>) -> Timer {
    match deadline {
        Some((timer, at)) => {
            sleep_until(at).await;
            timer
        }
        None => std::future::pending().await,
    }
}

pub struct ViewerClient<T: PeerTransport> {
    url: String,
    transport: T,
    controller: ReconnectionController,
    deadlines: Deadlines,
    peer_rx: mpsc::UnboundedReceiver<PeerEvent>,
    ice_servers: Vec<IceServer>,
    party_id: Option<PartyId>,
    state_tx: watch::Sender<ViewerState>,
}

impl<T: PeerTransport> ViewerClient<T> {
    pub fn new(url: impl Into<String>, mut transport: T, controller: ReconnectionController) -> Self {
        let (peer_tx, peer_rx) = mpsc::unbounded_channel();
        transport.attach(peer_tx);
        let (state_tx, _) = watch::channel(controller.state());
        Self {
            url: url.into(),
            transport,
            controller,
            deadlines: Deadlines::default(),
            peer_rx,
            ice_servers: Vec::new(),
            party_id: None,
            state_tx,
        }
    }

    /// Observe controller state changes.
    pub fn subscribe(&self) -> watch::Receiver<ViewerState> {
        self.state_tx.subscribe()
    }

    /// Connect, follow the broadcast, and reconnect the signaling socket
    /// whenever it drops. Runs until the task is cancelled.
    pub async fn run(mut self) {
        loop {
            match connect_async(self.url.as_str()).await {
                Ok((ws, _)) => {
                    tracing::info!(url = %self.url, "Signaling connected");
                    self.session(ws).await;
                    tracing::info!(
                        party_id = ?self.party_id,
                        "Signaling lost"
                    );
                }
                Err(e) => {
                    tracing::warn!(url = %self.url, error = %e, "Signaling connect failed");
                }
            }

            self.party_id = None;
            self.apply(ViewerInput::SignalingLost, None).await;
            // Timers would only re-arm without a socket.
            self.deadlines.clear();
            tokio::time::sleep(self.controller.timing().retry_interval).await;
        }
    }

    /// Drive one signaling connection until it closes.
    async fn session(&mut self, ws: WebSocketStream<MaybeTlsStream<TcpStream>>) {
        let (mut sink, mut stream) = ws.split();

        loop {
            let negotiation = self.deadlines.negotiation;
            let retry = self.deadlines.retry;

            tokio::select! {
                frame = stream.next() => match frame {
                    Some(Ok(Message::Text(text))) => {
                        if let Some(input) = self.on_server_text(text.as_str()) {
                            self.apply(input, Some(&mut sink)).await;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => return,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        tracing::warn!(error = %e, "Signaling receive error");
                        return;
                    }
                },
                Some(event) = self.peer_rx.recv() => {
                    self.apply(event.into(), Some(&mut sink)).await;
                }
                timer = fire(negotiation) => {
                    self.deadlines.negotiation = None;
                    self.apply(ViewerInput::TimerFired(timer), Some(&mut sink)).await;
                }
                timer = fire(retry) => {
                    self.deadlines.retry = None;
                    self.apply(ViewerInput::TimerFired(timer), Some(&mut sink)).await;
                }
            }
        }
    }

    /// Translate a server frame into a controller input, recording session
    /// details from `welcome` on the way.
    fn on_server_text(&mut self, text: &str) -> Option<ViewerInput> {
        let event = match serde_json::from_str::<ServerEvent>(text) {
            Ok(event) => event,
            Err(e) => {
                tracing::debug!(error = %e, "Ignoring undecodable server event");
                return None;
            }
        };

        match event {
            ServerEvent::Welcome(welcome) => {
                tracing::debug!(party_id = %welcome.id, "Received welcome");
                self.party_id = Some(welcome.id);
                self.ice_servers = welcome.ice_servers;
                self.controller.set_timing(welcome.retry.into());
                Some(ViewerInput::SignalingConnected)
            }
            ServerEvent::BroadcasterAvailable => Some(ViewerInput::BroadcasterAvailable),
            ServerEvent::BroadcasterDisconnected
            | ServerEvent::BroadcasterStopped
            | ServerEvent::BroadcasterTerminated => Some(ViewerInput::BroadcasterGone),
            ServerEvent::NoBroadcaster => Some(ViewerInput::NoBroadcaster),
            ServerEvent::Offer(artifact) => Some(ViewerInput::Offer {
                from: artifact.sender,
                payload: artifact.payload,
            }),
            ServerEvent::IceCandidate(artifact) => Some(ViewerInput::RemoteCandidate {
                from: artifact.sender,
                candidate: artifact.payload,
            }),
            ServerEvent::UpdateUsers(presence) => {
                tracing::debug!(
                    total = presence.total,
                    active_streams = presence.active_streams,
                    "Presence update"
                );
                None
            }
            other => {
                tracing::trace!(event = ?other, "Unhandled server event");
                None
            }
        }
    }

    /// Feed an input to the controller and execute the resulting actions.
    /// Transport errors become follow-up inputs.
    async fn apply(&mut self, input: ViewerInput, mut sink: Option<&mut WsSink>) {
        let mut pending = VecDeque::from([input]);

        while let Some(input) = pending.pop_front() {
            for action in self.controller.handle(input) {
                if let Some(followup) = self.execute(action, sink.as_deref_mut()).await {
                    pending.push_back(followup);
                }
            }
        }

        self.state_tx.send_replace(self.controller.state());
    }

    async fn execute(
        &mut self,
        action: ViewerAction,
        sink: Option<&mut WsSink>,
    ) -> Option<ViewerInput> {
        match action {
            ViewerAction::SendWatcher => send(sink, &ClientEvent::Watcher).await,
            ViewerAction::AnswerOffer {
                handle,
                broadcaster,
                offer,
            } => match self.transport.answer(handle, offer, &self.ice_servers).await {
                Ok(answer) => {
                    let event = ClientEvent::Answer(ArtifactRequest {
                        payload: answer,
                        target: broadcaster,
                    });
                    send(sink, &event).await;
                }
                Err(e) => {
                    tracing::warn!(handle = handle.generation(), error = %e, "Answer failed");
                    return Some(ViewerInput::TransportFailed { handle });
                }
            },
            ViewerAction::AddRemoteCandidate { handle, candidate } => {
                if let Err(e) = self.transport.add_remote_candidate(handle, candidate).await {
                    tracing::warn!(handle = handle.generation(), error = %e, "Remote candidate rejected");
                    return Some(ViewerInput::TransportFailed { handle });
                }
            }
            ViewerAction::SendCandidate { target, candidate } => {
                let event = ClientEvent::IceCandidate(CandidateRequest { candidate, target });
                send(sink, &event).await;
            }
            ViewerAction::ClosePeer(handle) => self.transport.close(handle).await,
            ViewerAction::ArmTimer { timer, after } => {
                *self.deadlines.slot(timer.kind()) = Some((timer, Instant::now() + after));
            }
            ViewerAction::CancelTimer(kind) => *self.deadlines.slot(kind) = None,
        }
        None
    }
}

/// Send a client event. A failed send surfaces as a closed read half.
async fn send(sink: Option<&mut WsSink>, event: &ClientEvent) {
    let Some(sink) = sink else {
        return;
    };
    match serde_json::to_string(event) {
        Ok(text) => {
            if let Err(e) = sink.send(Message::Text(text.into())).await {
                tracing::debug!(error = %e, "Signaling send failed");
            }
        }
        Err(e) => tracing::warn!(error = %e, "Failed to encode client event"),
    }
}
