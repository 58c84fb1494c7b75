//! Registry of live front-end connections

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

use tokio::sync::mpsc;
use tracing::debug;

use super::protocol::OutboundMessage;

/// Synthetic identity of one connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Outbound half of a connection plus its session state
#[derive(Debug)]
struct PortEntry {
    name: String,
    tab_id: Option<u64>,
    outbound: mpsc::UnboundedSender<OutboundMessage>,
    commit_message: Option<String>,
}

/// Connections keyed by id, mutated only on connect and disconnect
///
/// The lock is never held across an await point.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    next_id: AtomicU64,
    ports: Mutex<HashMap<ConnectionId, PortEntry>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &self,
        name: impl Into<String>,
        tab_id: Option<u64>,
        outbound: mpsc::UnboundedSender<OutboundMessage>,
    ) -> ConnectionId {
        let id = ConnectionId(self.next_id.fetch_add(1, Ordering::Relaxed) + 1);
        self.lock().insert(
            id,
            PortEntry {
                name: name.into(),
                tab_id,
                outbound,
                commit_message: None,
            },
        );
        id
    }

    /// Drop a connection and everything it owns; false if it was unknown
    pub fn unregister(&self, id: ConnectionId) -> bool {
        self.lock().remove(&id).is_some()
    }

    pub fn contains(&self, id: ConnectionId) -> bool {
        self.lock().contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Port name and tab id of a connection
    pub fn describe(&self, id: ConnectionId) -> Option<(String, Option<u64>)> {
        self.lock().get(&id).map(|p| (p.name.clone(), p.tab_id))
    }

    /// Deliver `message` to one connection; false if it is gone
    pub fn send(&self, id: ConnectionId, message: OutboundMessage) -> bool {
        let ports = self.lock();
        let Some(port) = ports.get(&id) else {
            debug!(connection = %id, "Dropping message for disconnected port");
            return false;
        };
        if port.outbound.send(message).is_err() {
            debug!(connection = %id, "Dropping message for closed port");
            return false;
        }
        true
    }

    pub fn set_commit_message(&self, id: ConnectionId, message: String) -> bool {
        match self.lock().get_mut(&id) {
            Some(port) => {
                port.commit_message = Some(message);
                true
            }
            None => false,
        }
    }

    /// Take the pending commit message, leaving none behind
    pub fn take_commit_message(&self, id: ConnectionId) -> Option<String> {
        self.lock()
            .get_mut(&id)
            .and_then(|port| port.commit_message.take())
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<ConnectionId, PortEntry>> {
        self.ports
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::UploadStatus;

    #[test]
    fn test_register_and_unregister() {
        let registry = ConnectionRegistry::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        let a = registry.register("bolt", Some(7), tx.clone());
        let b = registry.register("bolt", Some(8), tx);

        assert_ne!(a, b);
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.describe(a), Some(("bolt".to_string(), Some(7))));

        assert!(registry.unregister(a));
        assert!(!registry.unregister(a));
        assert!(!registry.contains(a));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_send_targets_only_one_port() {
        let registry = ConnectionRegistry::new();
        let (tx_a, mut rx_a) = mpsc::unbounded_channel();
        let (tx_b, mut rx_b) = mpsc::unbounded_channel();
        let a = registry.register("a", None, tx_a);
        let _b = registry.register("b", None, tx_b);

        let msg = OutboundMessage::UploadStatus {
            status: UploadStatus::success("done"),
        };
        assert!(registry.send(a, msg.clone()));
        assert_eq!(rx_a.try_recv().unwrap(), msg);
        assert!(rx_b.try_recv().is_err());
    }

    #[test]
    fn test_send_to_gone_port_is_dropped() {
        let registry = ConnectionRegistry::new();
        let (tx, rx) = mpsc::unbounded_channel();
        let id = registry.register("a", None, tx);
        drop(rx);

        let msg = OutboundMessage::ProtocolError {
            message: "x".to_string(),
        };
        assert!(!registry.send(id, msg.clone()));
        registry.unregister(id);
        assert!(!registry.send(id, msg));
    }

    #[test]
    fn test_commit_message_taken_once() {
        let registry = ConnectionRegistry::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        let id = registry.register("a", None, tx);

        assert!(registry.set_commit_message(id, "first".to_string()));
        assert_eq!(registry.take_commit_message(id).as_deref(), Some("first"));
        assert_eq!(registry.take_commit_message(id), None);
    }
}
