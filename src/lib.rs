//! # DataFlow
//!
//! Length-prefixed bidirectional network peers.
//!
//! A [`Peer`] owns one established duplex byte stream. Outbound packets are
//! serialized, checked against a maximum frame size and written as one frame;
//! a receive loop decodes inbound frames and publishes them on an
//! [`EventBus`] together with `Connected` and `Disconnected` lifecycle events.
//!
//! ## Wire Format
//! ```text
//! [Length(4, u32 little-endian)] [Payload(Length)]
//! ```
//!
//! ## Modules
//! - [`core`]: frame codec and the packet contract
//! - [`peer`]: peer lifecycle, send path, receive loop, events
//! - [`transport`]: TCP dial/accept helpers
//! - [`config`]: configuration loading and validation
//! - [`utils`]: logging, timeouts, metrics
//! - [`error`]: error taxonomy

#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]

pub mod config;
pub mod core;
pub mod error;
pub mod peer;
pub mod transport;
pub mod utils;

pub use crate::config::{DataFlowConfig, PeerConfig, MAX_FRAME_SIZE};
pub use crate::core::codec::FrameCodec;
pub use crate::core::packet::{Packet, WirePacket};
pub use crate::error::{ProtocolError, Result};
pub use crate::peer::{
    EventBus, EventSubscription, PacketEvent, Peer, PeerEvent, PeerId, PeerStatus, SendOutcome,
};
