//! # Transports
//!
//! Ways of obtaining the duplex stream a [`Peer`](crate::peer::Peer) runs on.
//! A peer accepts any `AsyncRead + AsyncWrite` stream; this module adds the
//! TCP dial and accept paths.

pub mod tcp;

pub use tcp::PeerListener;
