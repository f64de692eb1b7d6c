//! chatrelay - WebSocket chat relay
//!
//! Clients sign in with a self-chosen identity, then broadcast to everyone,
//! message a single peer, or upload a file that is announced to all peers.
//! Presence changes are pushed to every connected client.

pub mod protocol;
pub mod server;
pub mod storage;

pub use protocol::{ClientMessage, ErrorReply, ProtocolError, ServerMessage};
pub use server::{ConnectionRegistry, MessageRouter, RelayServer, RelayServerConfig};
pub use storage::{DiskFileSink, FileSink, MemoryFileSink, StorageError};
