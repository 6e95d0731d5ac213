pub mod actor;
pub mod handler;
pub mod protocol;

use tokio::sync::mpsc;

use protocol::ServerEvent;

/// Sender half of a connection's outbound event channel.
/// The hub keeps a clone per party to push events to that client.
pub type ConnectionSender = mpsc::UnboundedSender<ServerEvent>;

/// Queue an event for a client. A closed channel means the connection is
/// already gone, which is not an error for fire-and-forget delivery.
pub fn send_event(tx: &ConnectionSender, event: ServerEvent) {
    let _ = tx.send(event);
}
