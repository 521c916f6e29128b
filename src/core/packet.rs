//! Packet contract and the default packet type.
//!
//! The framing layer never looks inside a payload. It only needs a packet to
//! turn itself into bytes, to be rebuilt from the exact bytes of one frame, and
//! to name itself for logs.

use serde::{Deserialize, Serialize};
use std::borrow::Cow;

use crate::error::{ProtocolError, Result};

/// A value that can travel inside one frame.
pub trait WirePacket: Sized + Send + Sync + 'static {
    /// Serialize into the frame payload.
    fn to_bytes(&self) -> Result<Vec<u8>>;

    /// Rebuild from exactly the payload bytes of one frame.
    fn from_bytes(bytes: &[u8]) -> Result<Self>;

    /// Diagnostic name, used in logs only.
    fn identifier(&self) -> Cow<'_, str>;
}

/// Identifier plus opaque payload, bincode encoded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Packet {
    pub identifier: String,
    pub payload: Vec<u8>,
}

impl Packet {
    pub fn new(identifier: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            identifier: identifier.into(),
            payload: payload.into(),
        }
    }
}

impl WirePacket for Packet {
    fn to_bytes(&self) -> Result<Vec<u8>> {
        bincode::serialize(self).map_err(|e| ProtocolError::SerializeError(e.to_string()))
    }

    fn from_bytes(bytes: &[u8]) -> Result<Self> {
        bincode::deserialize(bytes).map_err(|e| ProtocolError::DeserializeError(e.to_string()))
    }

    fn identifier(&self) -> Cow<'_, str> {
        Cow::Borrowed(&self.identifier)
    }
}
