//! Peer lifecycle and packet events.
//!
//! An [`EventBus`] is a cheap, cloneable fan-out point. Any number of peers may
//! publish into the same bus; every event carries the [`PeerId`] of the peer
//! that raised it so subscribers can tell them apart. A subscription lives as
//! long as its [`EventSubscription`]; dropping it unsubscribes.
//!
//! Delivery is unbounded per subscriber, so a slow consumer never loses events.

use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::mpsc;

use super::id::PeerId;

/// A decoded packet and the peer it arrived on.
#[derive(Debug)]
pub struct PacketEvent<P> {
    peer: PeerId,
    packet: Arc<P>,
}

impl<P> PacketEvent<P> {
    pub fn new(peer: PeerId, packet: P) -> Self {
        Self {
            peer,
            packet: Arc::new(packet),
        }
    }

    pub fn peer_id(&self) -> PeerId {
        self.peer
    }

    pub fn packet(&self) -> &P {
        &self.packet
    }

    /// Shared handle to the packet, for consumers that outlive the event.
    pub fn packet_arc(&self) -> Arc<P> {
        Arc::clone(&self.packet)
    }
}

impl<P> Clone for PacketEvent<P> {
    fn clone(&self) -> Self {
        Self {
            peer: self.peer,
            packet: Arc::clone(&self.packet),
        }
    }
}

#[derive(Debug)]
pub enum PeerEvent<P> {
    Connected(PeerId),
    Disconnected(PeerId),
    PacketReceived(PacketEvent<P>),
}

impl<P> PeerEvent<P> {
    pub fn peer_id(&self) -> PeerId {
        match self {
            PeerEvent::Connected(id) | PeerEvent::Disconnected(id) => *id,
            PeerEvent::PacketReceived(event) => event.peer_id(),
        }
    }
}

impl<P> Clone for PeerEvent<P> {
    fn clone(&self) -> Self {
        match self {
            PeerEvent::Connected(id) => PeerEvent::Connected(*id),
            PeerEvent::Disconnected(id) => PeerEvent::Disconnected(*id),
            PeerEvent::PacketReceived(event) => PeerEvent::PacketReceived(event.clone()),
        }
    }
}

type Subscribers<P> = Arc<Mutex<Vec<mpsc::UnboundedSender<PeerEvent<P>>>>>;

pub struct EventBus<P> {
    subscribers: Subscribers<P>,
}

impl<P> EventBus<P> {
    pub fn new() -> Self {
        Self {
            subscribers: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Register a new subscriber. Only events published afterwards are seen.
    pub fn subscribe(&self) -> EventSubscription<P> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(tx);
        EventSubscription { rx }
    }

    /// Deliver `event` to every live subscriber, pruning dropped ones.
    pub fn publish(&self, event: PeerEvent<P>) {
        let mut subscribers = self
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }

    pub fn subscriber_count(&self) -> usize {
        let mut subscribers = self
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        subscribers.retain(|tx| !tx.is_closed());
        subscribers.len()
    }
}

impl<P> Clone for EventBus<P> {
    fn clone(&self) -> Self {
        Self {
            subscribers: Arc::clone(&self.subscribers),
        }
    }
}

impl<P> Default for EventBus<P> {
    fn default() -> Self {
        Self::new()
    }
}

/// Receiving end of an [`EventBus`] subscription.
pub struct EventSubscription<P> {
    rx: mpsc::UnboundedReceiver<PeerEvent<P>>,
}

impl<P> EventSubscription<P> {
    /// Wait for the next event. Returns `None` once every bus handle is gone.
    pub async fn recv(&mut self) -> Option<PeerEvent<P>> {
        self.rx.recv().await
    }

    /// Next already-queued event, if any.
    pub fn try_recv(&mut self) -> Option<PeerEvent<P>> {
        self.rx.try_recv().ok()
    }

    /// Drain everything queued right now.
    pub fn drain(&mut self) -> Vec<PeerEvent<P>> {
        let mut events = Vec::new();
        while let Ok(event) = self.rx.try_recv() {
            events.push(event);
        }
        events
    }
}
