//! Wire protocol for the relay
//!
//! Every frame is a JSON object with a `protocol` discriminator:
//! - `signin`: `{"protocol":"signin","from":"alice"}`
//! - `broadcast`: `{"protocol":"broadcast","from":"alice",...}` (forwarded verbatim)
//! - `p2p`: `{"protocol":"p2p","from":"alice","to":"bob",...}` (forwarded verbatim)
//! - `file`: `{"protocol":"file","from":"alice","filename":"a.txt","content":...}`
//!
//! The server answers with presence notices (`online`/`offline`), file notices,
//! or a bare `{"error":...}` object sent back to the originating connection.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Reply text for a frame whose `protocol` is not one of the known tags
pub const UNRECOGNIZED_PROTOCOL: &str = "unrecognized protocol";

/// Reply text for any frame that could not be decoded or handled
pub const PROCESSING_ERROR: &str = "server error processing message";

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("malformed message: {0}")]
    Json(#[from] serde_json::Error),

    #[error("message is null")]
    NullMessage,

    #[error("unrecognized protocol '{0}'")]
    UnknownProtocol(String),

    #[error("identity cannot be empty")]
    EmptyIdentity,
}

impl ProtocolError {
    /// The reply sent back to the connection that produced this error.
    ///
    /// Only an unknown tag gets its own text; everything else collapses into
    /// the generic processing error.
    pub fn reply(&self) -> ErrorReply {
        match self {
            ProtocolError::UnknownProtocol(_) => ErrorReply::unrecognized_protocol(),
            _ => ErrorReply::processing_error(),
        }
    }
}

/// Body of an uploaded file.
///
/// Accepts a plain string, an array of byte values, or the `{"type":"Buffer","data":[...]}`
/// shape produced when a Node buffer is serialized to JSON.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum FileContent {
    Text(String),
    Bytes(Vec<u8>),
    Buffer { data: Vec<u8> },
}

impl FileContent {
    fn into_bytes(self) -> Vec<u8> {
        match self {
            FileContent::Text(text) => text.into_bytes(),
            FileContent::Bytes(bytes) | FileContent::Buffer { data: bytes } => bytes,
        }
    }
}

#[derive(Deserialize)]
struct SigninFields {
    from: String,
}

#[derive(Deserialize)]
struct DirectFields {
    to: String,
}

#[derive(Deserialize)]
struct FileFields {
    from: String,
    filename: String,
    content: FileContent,
}

/// A file handed to the relay for storage
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileUpload {
    pub from: String,
    pub filename: String,
    pub content: Vec<u8>,
}

/// A decoded inbound frame
#[derive(Debug, Clone, PartialEq)]
pub enum ClientMessage {
    /// Bind an identity to the sending connection
    Signin { from: String },
    /// Fan out to every signed-in connection; carries the original object
    Broadcast(Map<String, Value>),
    /// Deliver to a single identity; carries the original object
    P2p { to: String, fields: Map<String, Value> },
    /// Store a file, then announce it
    File(FileUpload),
}

impl ClientMessage {
    /// Decode a raw frame
    pub fn decode(raw: &[u8]) -> Result<Self, ProtocolError> {
        let value: Value = serde_json::from_slice(raw)?;
        Self::from_value(value)
    }

    /// Decode an already-parsed JSON value
    pub fn from_value(value: Value) -> Result<Self, ProtocolError> {
        // A scalar has no `protocol` field, so it is reported like any unknown tag.
        let tag = match &value {
            Value::Null => return Err(ProtocolError::NullMessage),
            Value::Object(fields) => match fields.get("protocol") {
                Some(Value::String(tag)) => tag.clone(),
                Some(other) => return Err(ProtocolError::UnknownProtocol(other.to_string())),
                None => return Err(ProtocolError::UnknownProtocol(String::new())),
            },
            other => return Err(ProtocolError::UnknownProtocol(other.to_string())),
        };

        match tag.as_str() {
            "signin" => {
                let SigninFields { from } = SigninFields::deserialize(&value)?;
                if from.is_empty() {
                    return Err(ProtocolError::EmptyIdentity);
                }
                Ok(ClientMessage::Signin { from })
            }
            "broadcast" => Ok(ClientMessage::Broadcast(into_fields(value))),
            "p2p" => {
                let DirectFields { to } = DirectFields::deserialize(&value)?;
                Ok(ClientMessage::P2p {
                    to,
                    fields: into_fields(value),
                })
            }
            "file" => {
                let FileFields {
                    from,
                    filename,
                    content,
                } = FileFields::deserialize(value)?;
                Ok(ClientMessage::File(FileUpload {
                    from,
                    filename,
                    content: content.into_bytes(),
                }))
            }
            _ => Err(ProtocolError::UnknownProtocol(tag)),
        }
    }

    /// The protocol tag this message was decoded from
    pub fn protocol(&self) -> &'static str {
        match self {
            ClientMessage::Signin { .. } => "signin",
            ClientMessage::Broadcast(_) => "broadcast",
            ClientMessage::P2p { .. } => "p2p",
            ClientMessage::File(_) => "file",
        }
    }
}

fn into_fields(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(fields) => fields,
        _ => Map::new(),
    }
}

/// Messages the server originates
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "protocol", rename_all = "snake_case")]
pub enum ServerMessage {
    /// An identity signed in
    Online {
        online: String,
        #[serde(rename = "onlineCount")]
        online_count: usize,
    },
    /// An identity disconnected
    Offline {
        offline: String,
        #[serde(rename = "onlineCount")]
        online_count: usize,
    },
    /// A file was stored
    File { from: String, filename: String },
}

/// Error reply sent only to the connection that caused it
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorReply {
    pub error: String,
}

impl ErrorReply {
    pub fn unrecognized_protocol() -> Self {
        Self {
            error: UNRECOGNIZED_PROTOCOL.to_string(),
        }
    }

    pub fn processing_error() -> Self {
        Self {
            error: PROCESSING_ERROR.to_string(),
        }
    }
}
