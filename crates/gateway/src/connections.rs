//! C6: the WebSocket connection registry (§4.6).
//!
//! Tracks every open `/ws/chat/{session_id}` connection so a turn's events
//! can be delivered without the orchestrator knowing anything about
//! transports. Modeled on the node registry's sink-per-connection pattern:
//! each connection gets its own outbound channel, and a broadcast just
//! fans a frame out to every sink registered for a session, dropping ones
//! that have gone away.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;
use tokio::sync::mpsc;

use sa_domain::trace::TraceEvent;

use crate::api::ws::ServerFrame;

const OUTBOUND_CAPACITY: usize = 64;

struct Connection {
    id: u64,
    sender: mpsc::Sender<ServerFrame>,
}

#[derive(Default)]
pub struct ConnectionRegistry {
    next_id: AtomicU64,
    by_session: RwLock<HashMap<String, Vec<Connection>>>,
}

/// Handle returned by [`ConnectionRegistry::register`]; drop it (or call
/// [`ConnectionHandle::close`]) to deregister.
pub struct ConnectionHandle {
    session_id: String,
    id: u64,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new connection for `session_id` and returns the
    /// receiver the transport task should forward to the socket, plus a
    /// handle to deregister on disconnect.
    pub fn register(&self, session_id: &str) -> (ConnectionHandle, mpsc::Receiver<ServerFrame>) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(OUTBOUND_CAPACITY);

        let connection_count = {
            let mut by_session = self.by_session.write();
            let conns = by_session.entry(session_id.to_string()).or_default();
            conns.push(Connection { id, sender: tx });
            conns.len()
        };

        TraceEvent::ConnectionAttached {
            session_id: session_id.to_string(),
            connection_count,
        }
        .emit();

        (
            ConnectionHandle {
                session_id: session_id.to_string(),
                id,
            },
            rx,
        )
    }

    /// Deregisters a connection. `reason` is free text describing why the
    /// transport loop ended (e.g. `"client_closed"`, `"send_error"`).
    pub fn deregister(&self, handle: &ConnectionHandle, reason: &str) {
        let mut by_session = self.by_session.write();
        if let Some(conns) = by_session.get_mut(&handle.session_id) {
            conns.retain(|c| c.id != handle.id);
            if conns.is_empty() {
                by_session.remove(&handle.session_id);
            }
        }
        drop(by_session);

        TraceEvent::ConnectionClosed {
            session_id: handle.session_id.clone(),
            reason: reason.to_string(),
        }
        .emit();
    }

    /// Sends `frame` to every connection registered for `session_id`.
    /// Connections whose receiver has been dropped are pruned so the
    /// registry never accumulates dead entries.
    pub async fn broadcast(&self, session_id: &str, frame: ServerFrame) {
        let senders: Vec<mpsc::Sender<ServerFrame>> = {
            let by_session = self.by_session.read();
            match by_session.get(session_id) {
                Some(conns) => conns.iter().map(|c| c.sender.clone()).collect(),
                None => return,
            }
        };

        let mut dead = Vec::new();
        for sender in &senders {
            if sender.send(frame.clone()).await.is_err() {
                dead.push(sender.clone());
            }
        }

        if !dead.is_empty() {
            let mut by_session = self.by_session.write();
            if let Some(conns) = by_session.get_mut(session_id) {
                conns.retain(|c| !dead.iter().any(|d| d.same_channel(&c.sender)));
                if conns.is_empty() {
                    by_session.remove(session_id);
                }
            }
        }
    }

    pub fn connection_count(&self, session_id: &str) -> usize {
        self.by_session
            .read()
            .get(session_id)
            .map(|c| c.len())
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::ws::ServerFrame;

    #[tokio::test]
    async fn broadcast_reaches_every_registered_connection() {
        let registry = ConnectionRegistry::new();
        let (_h1, mut rx1) = registry.register("s1");
        let (_h2, mut rx2) = registry.register("s1");

        registry.broadcast("s1", ServerFrame::Pong).await;

        assert!(matches!(rx1.try_recv().unwrap(), ServerFrame::Pong));
        assert!(matches!(rx2.try_recv().unwrap(), ServerFrame::Pong));
    }

    #[tokio::test]
    async fn deregister_stops_future_delivery() {
        let registry = ConnectionRegistry::new();
        let (handle, _rx) = registry.register("s1");
        registry.deregister(&handle, "test");
        assert_eq!(registry.connection_count("s1"), 0);
    }

    #[tokio::test]
    async fn dropped_receiver_is_pruned_on_broadcast() {
        let registry = ConnectionRegistry::new();
        let (_handle, rx) = registry.register("s1");
        drop(rx);
        registry.broadcast("s1", ServerFrame::Pong).await;
        assert_eq!(registry.connection_count("s1"), 0);
    }
}
