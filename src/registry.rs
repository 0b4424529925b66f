use axum::extract::ws::Message;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc::UnboundedSender;
use uuid::Uuid;

/// Live WebSocket connections, keyed by chat session id.
///
/// Each connection registers the sender half of its outbound channel on
/// connect and removes it on disconnect. Registering a session id that is
/// already present replaces the old entry, which drops the previous sender
/// and closes the stale connection's outbound channel.
#[derive(Clone, Default)]
pub struct ConnectionRegistry {
    connections: Arc<Mutex<HashMap<Uuid, UnboundedSender<Message>>>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&self, session_id: Uuid, tx: UnboundedSender<Message>) {
        let mut connections = match self.connections.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        connections.insert(session_id, tx);
    }

    pub fn remove(&self, session_id: &Uuid) {
        let mut connections = match self.connections.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        connections.remove(session_id);
    }

    pub fn len(&self) -> usize {
        match self.connections.lock() {
            Ok(guard) => guard.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn test_remove_closes_the_outbound_channel() {
        let registry = ConnectionRegistry::new();
        let session_id = Uuid::new_v4();
        let (tx, mut rx) = mpsc::unbounded_channel();

        registry.put(session_id, tx);
        assert_eq!(registry.len(), 1);

        registry.remove(&session_id);
        assert!(registry.is_empty());

        // The registry held the only sender, so the channel is now closed.
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_reconnect_replaces_the_stale_entry() {
        let registry = ConnectionRegistry::new();
        let session_id = Uuid::new_v4();
        let (tx1, mut rx1) = mpsc::unbounded_channel();
        let (tx2, mut rx2) = mpsc::unbounded_channel();

        registry.put(session_id, tx1);
        registry.put(session_id, tx2);
        assert_eq!(registry.len(), 1);

        // The first connection's channel closed when its sender was replaced.
        assert!(rx1.recv().await.is_none());

        // The second connection's channel is still open, just idle.
        assert!(matches!(
            rx2.try_recv(),
            Err(mpsc::error::TryRecvError::Empty)
        ));
    }

    #[tokio::test]
    async fn test_sessions_are_tracked_independently() {
        let registry = ConnectionRegistry::new();
        let first = Uuid::new_v4();
        let second = Uuid::new_v4();
        let (tx1, _rx1) = mpsc::unbounded_channel();
        let (tx2, mut rx2) = mpsc::unbounded_channel();

        registry.put(first, tx1);
        registry.put(second, tx2);
        assert_eq!(registry.len(), 2);

        registry.remove(&first);
        assert_eq!(registry.len(), 1);
        assert!(matches!(
            rx2.try_recv(),
            Err(mpsc::error::TryRecvError::Empty)
        ));
    }
}
