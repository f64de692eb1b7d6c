//! Connection registry: who is online, and where to reach them

use parking_lot::{Mutex, MutexGuard};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Serialized frame queued for a client
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    pub payload: String,
}

impl OutboundMessage {
    pub fn new(payload: impl Into<String>) -> Self {
        Self {
            payload: payload.into(),
        }
    }
}

/// A live transport session
pub struct ClientConnection {
    /// Unique connection ID
    pub id: Uuid,
    /// Queue drained by the connection's writer task
    tx: mpsc::Sender<OutboundMessage>,
}

impl ClientConnection {
    pub fn new(tx: mpsc::Sender<OutboundMessage>) -> Self {
        Self {
            id: Uuid::new_v4(),
            tx,
        }
    }

    /// Queue a message without waiting.
    ///
    /// Fails when the queue is full or the writer is gone.
    pub fn send(&self, msg: OutboundMessage) -> Result<(), mpsc::error::TrySendError<OutboundMessage>> {
        self.tx.try_send(msg)
    }

    /// Whether the writer side has gone away
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

impl PartialEq for ClientConnection {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for ClientConnection {}

impl std::fmt::Debug for ClientConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConnection").field("id", &self.id).finish()
    }
}

/// Identity -> connection map shared by every connection task
#[derive(Default)]
pub struct ConnectionRegistry {
    entries: Mutex<HashMap<String, Arc<ClientConnection>>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the registry lock.
    ///
    /// Everything done through the guard happens as one critical section, so
    /// count/notify/mutate sequences cannot interleave with other connections.
    pub fn lock(&self) -> RegistryGuard<'_> {
        RegistryGuard {
            entries: self.entries.lock(),
        }
    }

    pub fn bind(&self, identity: impl Into<String>, handle: Arc<ClientConnection>) -> Option<Arc<ClientConnection>> {
        self.lock().bind(identity, handle)
    }

    pub fn unbind_by_handle(&self, handle: &ClientConnection) -> Option<String> {
        self.lock().unbind_by_handle(handle)
    }

    pub fn lookup(&self, identity: &str) -> Option<Arc<ClientConnection>> {
        self.lock().lookup(identity).cloned()
    }

    pub fn count(&self) -> usize {
        self.lock().count()
    }

    /// Sorted snapshot of the identities currently online
    pub fn identities(&self) -> Vec<String> {
        let mut identities: Vec<String> = self.lock().entries.keys().cloned().collect();
        identities.sort();
        identities
    }
}

/// Exclusive access to the registry
pub struct RegistryGuard<'a> {
    entries: MutexGuard<'a, HashMap<String, Arc<ClientConnection>>>,
}

impl RegistryGuard<'_> {
    /// Bind `identity` to `handle`, returning the handle it replaced.
    ///
    /// The replaced handle is left open and keeps its transport session; it is
    /// only forgotten here.
    pub fn bind(&mut self, identity: impl Into<String>, handle: Arc<ClientConnection>) -> Option<Arc<ClientConnection>> {
        self.entries.insert(identity.into(), handle)
    }

    /// Remove the entry pointing at `handle` and return its identity
    pub fn unbind_by_handle(&mut self, handle: &ClientConnection) -> Option<String> {
        let identity = self
            .entries
            .iter()
            .find(|(_, conn)| conn.id == handle.id)
            .map(|(identity, _)| identity.clone())?;

        self.entries.remove(&identity);
        Some(identity)
    }

    pub fn lookup(&self, identity: &str) -> Option<&Arc<ClientConnection>> {
        self.entries.get(identity)
    }

    pub fn count(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Visit every (identity, connection) pair in no particular order
    pub fn for_each<F>(&self, mut f: F)
    where
        F: FnMut(&str, &Arc<ClientConnection>),
    {
        for (identity, conn) in self.entries.iter() {
            f(identity, conn);
        }
    }
}
