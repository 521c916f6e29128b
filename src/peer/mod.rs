//! # Peers
//!
//! A [`Peer`] owns one established duplex stream, frames outbound packets onto
//! it and runs a receive loop that republishes inbound frames as events on an
//! [`EventBus`].
//!
//! ```rust,no_run
//! use dataflow::peer::{EventBus, Peer, PeerEvent};
//! use dataflow::Packet;
//!
//! # async fn run() -> dataflow::Result<()> {
//! let (local, _remote) = tokio::io::duplex(64 * 1024);
//! let bus: EventBus<Packet> = EventBus::new();
//! let mut events = bus.subscribe();
//!
//! let peer = Peer::with_defaults(local, bus);
//! peer.connect()?;
//! peer.send(&Packet::new("hello", vec![1, 2, 3])).await;
//!
//! while let Some(event) = events.recv().await {
//!     if let PeerEvent::Disconnected(id) = event {
//!         println!("{id} went away");
//!         break;
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod core;
pub mod events;
pub mod id;

pub use self::core::{Peer, PeerStatus, SendOutcome};
pub use events::{EventBus, EventSubscription, PacketEvent, PeerEvent};
pub use id::PeerId;

#[cfg(test)]
mod tests;
