//! TCP constructors for peers.
//!
//! These only establish the stream; the returned peers are Idle until
//! [`Peer::connect`] starts their receive loop.

use std::net::SocketAddr;
use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};
use tracing::{debug, info, instrument};

use crate::config::PeerConfig;
use crate::core::packet::WirePacket;
use crate::error::{ProtocolError, Result};
use crate::peer::{EventBus, Peer, PeerId};
use crate::utils::timeout::{with_timeout_error, DEFAULT_TIMEOUT};

/// Wrap an established TCP stream, labelling the peer with its remote address.
pub fn from_stream<P: WirePacket>(
    stream: TcpStream,
    events: EventBus<P>,
    config: PeerConfig,
) -> Result<Peer<TcpStream, P>> {
    stream.set_nodelay(true)?;
    let remote = stream.peer_addr()?;
    Ok(Peer::new(
        stream,
        PeerId::new(),
        remote.to_string(),
        events,
        config,
    ))
}

/// Dial `addr`, bounded by [`DEFAULT_TIMEOUT`].
#[instrument(skip_all)]
pub async fn connect<A, P>(
    addr: A,
    events: EventBus<P>,
    config: PeerConfig,
) -> Result<Peer<TcpStream, P>>
where
    A: ToSocketAddrs,
    P: WirePacket,
{
    let stream = with_timeout_error(
        async { TcpStream::connect(addr).await.map_err(ProtocolError::from) },
        DEFAULT_TIMEOUT,
    )
    .await?;
    let peer = from_stream(stream, events, config)?;
    debug!(peer = %peer.id(), remote = %peer.remote(), "Dialed peer");
    Ok(peer)
}

/// Accepts inbound TCP connections as Idle peers sharing one event bus.
pub struct PeerListener<P> {
    listener: TcpListener,
    events: EventBus<P>,
    config: PeerConfig,
}

impl<P: WirePacket> PeerListener<P> {
    #[instrument(skip_all)]
    pub async fn bind<A: ToSocketAddrs>(
        addr: A,
        events: EventBus<P>,
        config: PeerConfig,
    ) -> Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        info!(address = %listener.local_addr()?, "Listening for peers");
        Ok(Self {
            listener,
            events,
            config,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Wait for the next inbound connection.
    pub async fn accept(&self) -> Result<Peer<TcpStream, P>> {
        let (stream, addr) = self.listener.accept().await?;
        debug!(remote = %addr, "Accepted connection");
        from_stream(stream, self.events.clone(), self.config.clone())
    }
}
