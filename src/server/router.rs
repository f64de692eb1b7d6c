//! Message routing and fan-out

use crate::protocol::{ClientMessage, FileUpload, ProtocolError, ServerMessage};
use crate::server::registry::{ClientConnection, ConnectionRegistry, OutboundMessage, RegistryGuard};
use crate::storage::FileSink;
use serde::Serialize;
use serde_json::{Map, Value};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// What handling one inbound frame led to
#[derive(Debug)]
pub enum Dispatch {
    /// Frame was routed; number of connections the result was queued for
    Delivered(usize),
    /// Frame was rejected and an error reply was queued for the sender
    Rejected(ProtocolError),
    /// A file write is in flight; resolves to the number of notices queued
    Deferred(JoinHandle<usize>),
}

/// Dispatches decoded frames using the registry as its only shared state
#[derive(Clone)]
pub struct MessageRouter {
    registry: Arc<ConnectionRegistry>,
    sink: Arc<dyn FileSink>,
}

impl MessageRouter {
    pub fn new(registry: Arc<ConnectionRegistry>, sink: Arc<dyn FileSink>) -> Self {
        Self { registry, sink }
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// Number of signed-in identities
    pub fn online_count(&self) -> usize {
        self.registry.count()
    }

    /// Handle one raw frame received on `conn`
    pub fn handle_message(&self, conn: &Arc<ClientConnection>, raw: &[u8]) -> Dispatch {
        let msg = match ClientMessage::decode(raw) {
            Ok(msg) => msg,
            Err(e) => {
                warn!(conn_id = %conn.id, error = %e, "Rejected message");
                reply(conn, &e.reply());
                return Dispatch::Rejected(e);
            }
        };

        debug!(conn_id = %conn.id, protocol = msg.protocol(), "Routing message");

        match msg {
            ClientMessage::Signin { from } => Dispatch::Delivered(self.signin(conn, from)),
            ClientMessage::Broadcast(fields) => Dispatch::Delivered(self.broadcast(fields)),
            ClientMessage::P2p { to, fields } => Dispatch::Delivered(self.p2p(&to, fields)),
            ClientMessage::File(upload) => Dispatch::Deferred(self.file(upload)),
        }
    }

    /// Forget the identity bound to `conn` and tell everyone it left
    pub fn handle_disconnect(&self, conn: &ClientConnection) -> usize {
        let mut registry = self.registry.lock();

        let Some(identity) = registry.unbind_by_handle(conn) else {
            debug!(conn_id = %conn.id, "Connection closed before signing in");
            return 0;
        };

        let online_count = registry.count();
        let delivered = match encode(&ServerMessage::Offline {
            offline: identity.clone(),
            online_count,
        }) {
            Some(notice) => fan_out(&registry, &notice),
            None => 0,
        };

        info!(identity = %identity, online_count, "Client went offline");
        delivered
    }

    fn signin(&self, conn: &Arc<ClientConnection>, from: String) -> usize {
        let mut registry = self.registry.lock();

        // Announce before binding so the newcomer does not hear about itself.
        let mut delivered = 0;
        if !registry.is_empty() {
            if let Some(notice) = encode(&ServerMessage::Online {
                online: from.clone(),
                online_count: registry.count() + 1,
            }) {
                delivered = fan_out(&registry, &notice);
            }
        }

        if let Some(previous) = registry.bind(from.clone(), conn.clone()) {
            if previous.id != conn.id {
                warn!(
                    identity = %from,
                    previous_conn_id = %previous.id,
                    conn_id = %conn.id,
                    "Identity re-bound; previous connection stays open without an entry"
                );
            }
        }

        info!(identity = %from, conn_id = %conn.id, online_count = registry.count(), "Client signed in");
        delivered
    }

    fn broadcast(&self, fields: Map<String, Value>) -> usize {
        let Some(msg) = encode(&Value::Object(fields)) else {
            return 0;
        };

        let registry = self.registry.lock();
        fan_out(&registry, &msg)
    }

    fn p2p(&self, to: &str, fields: Map<String, Value>) -> usize {
        let registry = self.registry.lock();

        let Some(target) = registry.lookup(to) else {
            debug!(to = to, "No connection for direct message target, dropping");
            return 0;
        };

        let Some(msg) = encode(&Value::Object(fields)) else {
            return 0;
        };

        match target.send(msg) {
            Ok(()) => 1,
            Err(e) => {
                debug!(to = to, conn_id = %target.id, error = %e, "Failed to deliver direct message");
                0
            }
        }
    }

    fn file(&self, upload: FileUpload) -> JoinHandle<usize> {
        let registry = self.registry.clone();
        let sink = self.sink.clone();

        tokio::spawn(async move {
            let FileUpload {
                from,
                filename,
                content,
            } = upload;

            if let Err(e) = sink.write(&filename, &content).await {
                warn!(from = %from, filename = %filename, error = %e, "Failed to store upload");
                return 0;
            }

            let Some(notice) = encode(&ServerMessage::File {
                from: from.clone(),
                filename: filename.clone(),
            }) else {
                return 0;
            };

            let registry = registry.lock();
            let delivered = fan_out(&registry, &notice);
            info!(from = %from, filename = %filename, delivered, "File shared");
            delivered
        })
    }
}

/// Queue `msg` on every registered connection.
///
/// A full or closed queue only costs that one recipient.
fn fan_out(registry: &RegistryGuard<'_>, msg: &OutboundMessage) -> usize {
    let mut delivered = 0;

    registry.for_each(|identity, conn| match conn.send(msg.clone()) {
        Ok(()) => delivered += 1,
        Err(e) => {
            // Expected while a peer is disconnecting
            debug!(
                identity = identity,
                conn_id = %conn.id,
                error = %e,
                "Failed to queue message (buffer full or disconnected)"
            );
        }
    });

    delivered
}

fn reply<T: Serialize>(conn: &ClientConnection, body: &T) {
    let Some(msg) = encode(body) else {
        return;
    };

    if let Err(e) = conn.send(msg) {
        debug!(conn_id = %conn.id, error = %e, "Failed to queue reply");
    }
}

fn encode<T: Serialize>(body: &T) -> Option<OutboundMessage> {
    match serde_json::to_string(body) {
        Ok(payload) => Some(OutboundMessage::new(payload)),
        Err(e) => {
            error!(error = %e, "Failed to serialize outbound message");
            None
        }
    }
}
