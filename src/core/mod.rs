//! # Core Protocol Components
//!
//! Frame codec and the packet contract.
//!
//! ## Components
//! - **Codec**: Tokio codec for length-prefixed framing over byte streams
//! - **Packet**: the `WirePacket` contract and the default `Packet` type
//!
//! ## Wire Format
//! ```text
//! [Length(4, little-endian)] [Payload(Length)]
//! ```
//!
//! ## Safety Limits
//! - Length is validated against the maximum frame size before allocation
//! - Oversized packets are refused by the encoder and never reach the wire

pub mod codec;
pub mod packet;
