//! Live connection registry.
//!
//! Owned by the event loop; connection tasks are registered when they
//! announce themselves and unregistered when they close. Sending to a
//! connection that is already gone is a quiet no-op, which is exactly
//! what a `ProfileReleased` signal racing a disconnect needs.

use std::collections::HashMap;

use powerd_core::ipc::{ConnectionId, ServerMessage};
use tokio::sync::mpsc;
use tracing::debug;

/// Outgoing message senders of all live connections.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    connections: HashMap<ConnectionId, mpsc::UnboundedSender<ServerMessage>>,
}

impl ConnectionRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a new connection.
    pub fn register(&mut self, id: ConnectionId, sender: mpsc::UnboundedSender<ServerMessage>) {
        self.connections.insert(id, sender);
    }

    /// Drop a connection. Its writer task ends once the sender is gone.
    pub fn unregister(&mut self, id: ConnectionId) {
        self.connections.remove(&id);
    }

    /// Number of live connections.
    #[must_use]
    pub fn len(&self) -> usize {
        self.connections.len()
    }

    /// Whether no connection is live.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// Send a message to one connection, if it is still live.
    pub fn send_to(&self, id: ConnectionId, message: &ServerMessage) {
        let Some(sender) = self.connections.get(&id) else {
            debug!("not delivering message to closed {id}");
            return;
        };
        if sender.send(message.clone()).is_err() {
            debug!("writer for {id} is gone");
        }
    }

    /// Send a message to every live connection.
    pub fn broadcast(&self, message: &ServerMessage) {
        for sender in self.connections.values() {
            let _ = sender.send(message.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use powerd_core::ipc::DaemonResponse;

    use super::*;

    #[test]
    fn send_to_unknown_connection_is_a_no_op() {
        let registry = ConnectionRegistry::new();
        registry.send_to(
            ConnectionId(7),
            &ServerMessage::Reply {
                id: 1,
                response: DaemonResponse::Ok,
            },
        );
    }

    #[test]
    fn broadcast_reaches_every_connection() {
        let mut registry = ConnectionRegistry::new();
        let (tx1, mut rx1) = mpsc::unbounded_channel();
        let (tx2, mut rx2) = mpsc::unbounded_channel();
        registry.register(ConnectionId(1), tx1);
        registry.register(ConnectionId(2), tx2);

        registry.broadcast(&ServerMessage::Reply {
            id: 9,
            response: DaemonResponse::Ok,
        });

        assert!(rx1.try_recv().is_ok());
        assert!(rx2.try_recv().is_ok());

        registry.unregister(ConnectionId(1));
        assert_eq!(registry.len(), 1);
    }
}
