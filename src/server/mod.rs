//! Relay server implementation
//!
//! Handles WebSocket connections, identity binding, and message fan-out.

mod registry;
mod router;
pub mod transport;
pub mod websocket;

pub use registry::{ClientConnection, ConnectionRegistry, OutboundMessage, RegistryGuard};
pub use router::{Dispatch, MessageRouter};
pub use transport::{RelayServer, RelayServerConfig, DEFAULT_OUTBOUND_BUFFER, DEFAULT_PORT};
pub use websocket::{create_router, WsState};
