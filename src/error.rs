//! # Error Types
//!
//! Error handling for peers and the frame protocol.
//!
//! ## Error Categories
//! - **I/O Errors**: transport read/write faults
//! - **Framing Errors**: ambiguous length prefix, oversized frame, peer closed mid-frame
//! - **Packet Errors**: payload (de)serialization failures
//! - **Lifecycle Errors**: operations invoked in the wrong peer state, timeouts
//! - **Configuration Errors**: unreadable or invalid configuration
//!
//! Inside a running peer nothing is propagated to the caller: the receive loop
//! turns its terminal error into a log line plus a `Disconnected` event, and the
//! send path reports through [`SendOutcome`](crate::peer::SendOutcome).
//!
//! ## Example Usage
//! ```rust
//! use dataflow::error::{ProtocolError, Result};
//! use tracing::error;
//!
//! fn check_len(len: usize, max: usize) -> Result<()> {
//!     if len > max {
//!         return Err(ProtocolError::OversizedPacket(len));
//!     }
//!     Ok(())
//! }
//!
//! if let Err(e) = check_len(70_000, 65_536) {
//!     error!(error = %e, "Frame rejected");
//! }
//! ```

use std::io;
use thiserror::Error;

/// Error message constants to reduce allocations in error paths.
pub mod constants {
    /// Lifecycle errors
    pub const ERR_ALREADY_CONNECTED: &str = "Peer is already connected";
    pub const ERR_ALREADY_DISCONNECTED: &str = "Peer has already been disconnected";

    /// Framing errors
    pub const ERR_AMBIGUOUS_LENGTH: &str = "Ambiguous packet length";
    pub const ERR_PEER_CLOSED: &str = "Peer ended connection";
    pub const ERR_OVERSIZED_PACKET: &str = "Packet exceeds maximum frame size";

    /// Send path
    pub const ERR_NOT_WRITABLE: &str = "The network stream is closed or not writable";
}

/// ProtocolError is the primary error type for all peer operations
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Serialize error: {0}")]
    SerializeError(String),

    #[error("Deserialize error: {0}")]
    DeserializeError(String),

    /// The stream ended where a length prefix was expected.
    #[error("Ambiguous packet length")]
    AmbiguousLength,

    /// The stream ended partway through a frame payload.
    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Packet too large: {0} bytes")]
    OversizedPacket(usize),

    #[error("Invalid peer state: {0}")]
    InvalidState(String),

    #[error("Timeout occurred")]
    Timeout,

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl ProtocolError {
    /// True when the error means the remote side went away rather than
    /// sending something malformed.
    pub fn is_peer_closed(&self) -> bool {
        match self {
            ProtocolError::ConnectionClosed => true,
            ProtocolError::Io(e) => matches!(
                e.kind(),
                io::ErrorKind::ConnectionReset
                    | io::ErrorKind::ConnectionAborted
                    | io::ErrorKind::BrokenPipe
                    | io::ErrorKind::UnexpectedEof
            ),
            _ => false,
        }
    }
}

/// Type alias for Results using ProtocolError
pub type Result<T> = std::result::Result<T, ProtocolError>;
