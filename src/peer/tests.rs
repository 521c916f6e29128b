// test-only module included via peer/mod.rs
#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use std::borrow::Cow;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncWriteExt, DuplexStream};

use super::*;
use crate::config::PeerConfig;
use crate::core::packet::{Packet, WirePacket};

const EVENT_WAIT: Duration = Duration::from_secs(2);

fn config(max_frame_size: usize) -> PeerConfig {
    PeerConfig {
        max_frame_size,
        disconnect_timeout: Duration::from_secs(1),
        ..PeerConfig::default()
    }
}

fn peer(stream: DuplexStream, max: usize) -> (Peer<DuplexStream>, EventSubscription<Packet>) {
    let bus = EventBus::new();
    let events = bus.subscribe();
    let peer = Peer::new(stream, PeerId::new(), "duplex", bus, config(max));
    (peer, events)
}

async fn next_event(events: &mut EventSubscription<Packet>) -> PeerEvent<Packet> {
    tokio::time::timeout(EVENT_WAIT, events.recv())
        .await
        .expect("timed out waiting for event")
        .expect("event bus closed")
}

fn raw_frame(packet: &Packet) -> Vec<u8> {
    let body = packet.to_bytes().unwrap();
    let mut frame = (body.len() as u32).to_le_bytes().to_vec();
    frame.extend_from_slice(&body);
    frame
}

/// Let any stray events land before asserting there are none.
async fn settle() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}

#[tokio::test]
async fn test_send_receive_then_disconnect_both_sides() {
    let (a_io, b_io) = tokio::io::duplex(64 * 1024);
    let (a, mut a_events) = peer(a_io, 1024);
    let (b, mut b_events) = peer(b_io, 1024);

    a.connect().unwrap();
    b.connect().unwrap();
    assert!(matches!(next_event(&mut a_events).await, PeerEvent::Connected(id) if id == a.id()));
    assert!(matches!(next_event(&mut b_events).await, PeerEvent::Connected(id) if id == b.id()));

    let outcome = a.send(&Packet::new("A", vec![1, 2, 3])).await;
    assert!(outcome.is_sent());

    match next_event(&mut b_events).await {
        PeerEvent::PacketReceived(event) => {
            assert_eq!(event.peer_id(), b.id());
            assert_eq!(event.packet().identifier, "A");
            assert_eq!(event.packet().payload, vec![1, 2, 3]);
        }
        other => panic!("expected packet, got {other:?}"),
    }

    a.disconnect().await;
    assert!(matches!(next_event(&mut a_events).await, PeerEvent::Disconnected(id) if id == a.id()));
    // The remote loop sees end of stream and closes its own side.
    assert!(matches!(next_event(&mut b_events).await, PeerEvent::Disconnected(id) if id == b.id()));

    b.disconnect().await;
    settle().await;
    assert!(a_events.try_recv().is_none());
    assert!(b_events.try_recv().is_none());
    assert_eq!(a.status(), PeerStatus::Disconnected);
    assert_eq!(b.status(), PeerStatus::Disconnected);
}

#[tokio::test]
async fn test_connect_twice_is_rejected() {
    let (a_io, _b_io) = tokio::io::duplex(1024);
    let (a, mut events) = peer(a_io, 1024);

    a.connect().unwrap();
    assert!(matches!(a.connect(), Err(crate::ProtocolError::InvalidState(_))));
    assert_eq!(a.status(), PeerStatus::Connected);

    a.disconnect().await;
    assert!(matches!(a.connect(), Err(crate::ProtocolError::InvalidState(_))));

    let events = events.drain();
    let connected = events.iter().filter(|e| matches!(e, PeerEvent::Connected(_))).count();
    assert_eq!(connected, 1);
}

#[tokio::test]
async fn test_disconnect_is_idempotent() {
    let (a_io, _b_io) = tokio::io::duplex(1024);
    let (a, mut events) = peer(a_io, 1024);

    a.connect().unwrap();
    a.disconnect().await;
    a.disconnect().await;
    settle().await;

    let disconnects = events
        .drain()
        .into_iter()
        .filter(|e| matches!(e, PeerEvent::Disconnected(_)))
        .count();
    assert_eq!(disconnects, 1);
    assert_eq!(a.metrics().snapshot().disconnects, 1);
}

#[tokio::test]
async fn test_disconnect_idle_peer_raises_nothing() {
    let (a_io, _b_io) = tokio::io::duplex(1024);
    let (a, mut events) = peer(a_io, 1024);

    assert_eq!(a.status(), PeerStatus::Idle);
    a.disconnect().await;
    assert_eq!(a.status(), PeerStatus::Disconnected);
    assert!(!a.is_writable().await);
    assert!(events.try_recv().is_none());
}

#[tokio::test]
async fn test_oversized_packet_never_reaches_the_wire() {
    let (a_io, b_io) = tokio::io::duplex(64 * 1024);
    let (a, _a_events) = peer(a_io, 64);
    let (b, mut b_events) = peer(b_io, 64);
    a.connect().unwrap();
    b.connect().unwrap();
    let _ = next_event(&mut b_events).await;

    let big = Packet::new("big", vec![0u8; 100]);
    match a.send(&big).await {
        SendOutcome::Oversized { len, max } => {
            assert_eq!(len, big.to_bytes().unwrap().len());
            assert_eq!(max, 64);
        }
        other => panic!("expected oversized, got {other:?}"),
    }

    // If any byte of the big packet had been written, this frame would be misread.
    assert!(a.send(&Packet::new("small", vec![9])).await.is_sent());
    match next_event(&mut b_events).await {
        PeerEvent::PacketReceived(event) => assert_eq!(event.packet().identifier, "small"),
        other => panic!("expected small packet, got {other:?}"),
    }

    assert_eq!(a.metrics().snapshot().oversized_dropped, 1);
    assert_eq!(a.metrics().snapshot().frames_sent, 1);
    assert_eq!(a.status(), PeerStatus::Connected);
}

#[tokio::test]
async fn test_remote_close_ends_loop_with_one_disconnect() {
    let (a_io, b_io) = tokio::io::duplex(1024);
    let (a, mut events) = peer(a_io, 1024);
    a.connect().unwrap();
    let _ = next_event(&mut events).await;

    drop(b_io);

    assert!(matches!(next_event(&mut events).await, PeerEvent::Disconnected(_)));
    assert_eq!(a.status(), PeerStatus::Disconnected);
    assert!(!a.is_writable().await);

    a.disconnect().await;
    settle().await;
    assert!(events.try_recv().is_none());
}

#[tokio::test]
async fn test_close_mid_payload_disconnects() {
    let (a_io, mut b_io) = tokio::io::duplex(1024);
    let (a, mut events) = peer(a_io, 1024);
    a.connect().unwrap();
    let _ = next_event(&mut events).await;

    b_io.write_all(&[10, 0, 0, 0, 1, 2]).await.unwrap();
    drop(b_io);

    assert!(matches!(next_event(&mut events).await, PeerEvent::Disconnected(_)));
    let snapshot = a.metrics().snapshot();
    assert_eq!(snapshot.frames_received, 0);
    assert_eq!(snapshot.receive_failures, 1);
}

#[tokio::test]
async fn test_oversized_length_prefix_disconnects_without_payload() {
    let (a_io, mut b_io) = tokio::io::duplex(1024);
    let (a, mut events) = peer(a_io, 1024);
    a.connect().unwrap();
    let _ = next_event(&mut events).await;

    // Claims 4 GiB and keeps the stream open.
    b_io.write_all(&u32::MAX.to_le_bytes()).await.unwrap();

    assert!(matches!(next_event(&mut events).await, PeerEvent::Disconnected(_)));
    assert_eq!(a.metrics().snapshot().receive_failures, 1);
    drop(b_io);
}

#[tokio::test]
async fn test_frames_split_across_reads_are_reassembled() {
    let (a_io, mut b_io) = tokio::io::duplex(1024);
    let (a, mut events) = peer(a_io, 1024);
    a.connect().unwrap();
    let _ = next_event(&mut events).await;

    let packet = Packet::new("slow", (0u8..50).collect::<Vec<_>>());
    for byte in raw_frame(&packet) {
        b_io.write_all(&[byte]).await.unwrap();
        tokio::task::yield_now().await;
    }

    match next_event(&mut events).await {
        PeerEvent::PacketReceived(event) => assert_eq!(event.packet(), &packet),
        other => panic!("expected packet, got {other:?}"),
    }
    a.disconnect().await;
}

#[tokio::test]
async fn test_send_after_stream_release_is_not_writable() {
    let (a_io, b_io) = tokio::io::duplex(1024);
    let (a, mut events) = peer(a_io, 1024);
    a.connect().unwrap();
    let _ = next_event(&mut events).await;

    drop(b_io);
    assert!(matches!(next_event(&mut events).await, PeerEvent::Disconnected(_)));

    let outcome = a.send(&Packet::new("late", vec![1])).await;
    assert_eq!(outcome, SendOutcome::NotWritable);
    settle().await;
    assert!(events.try_recv().is_none(), "no second Disconnected");
    assert_eq!(a.metrics().snapshot().send_failures, 1);
}

#[tokio::test]
async fn test_no_packets_after_disconnect_returns() {
    let (a_io, b_io) = tokio::io::duplex(64 * 1024);
    let (a, _a_events) = peer(a_io, 1024);
    let (b, mut b_events) = peer(b_io, 1024);
    a.connect().unwrap();
    b.connect().unwrap();

    for i in 0..20u8 {
        a.send(&Packet::new(format!("p{i}"), vec![i])).await;
    }
    b.disconnect().await;

    let events = b_events.drain();
    assert!(matches!(events.first(), Some(PeerEvent::Connected(_))));
    assert!(matches!(events.last(), Some(PeerEvent::Disconnected(_))));

    settle().await;
    assert!(b_events.try_recv().is_none());
    a.disconnect().await;
}

#[tokio::test]
async fn test_disconnect_cancels_read_of_partial_payload() {
    let (a_io, mut b_io) = tokio::io::duplex(1024);
    let (a, mut events) = peer(a_io, 1024);
    a.connect().unwrap();

    // Announces 100 bytes, delivers 3, then stalls with the stream open.
    b_io.write_all(&[100, 0, 0, 0, 1, 2, 3]).await.unwrap();
    settle().await;

    tokio::time::timeout(Duration::from_millis(500), a.disconnect())
        .await
        .expect("disconnect blocked on a pending payload read");

    let events = events.drain();
    assert_eq!(events.len(), 2, "got {events:?}");
    assert!(matches!(events[0], PeerEvent::Connected(_)));
    assert!(matches!(events[1], PeerEvent::Disconnected(_)));

    let snapshot = a.metrics().snapshot();
    assert_eq!(snapshot.frames_received, 0);
    assert_eq!(snapshot.receive_failures, 0);
    drop(b_io);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_disconnect_is_bounded_when_a_send_holds_the_writer() {
    let (a_io, _b_io) = tokio::io::duplex(64);
    let bus = EventBus::new();
    let mut events = bus.subscribe();
    let config = PeerConfig {
        disconnect_timeout: Duration::from_millis(100),
        ..config(64 * 1024)
    };
    let a = Arc::new(Peer::new(a_io, PeerId::new(), "stalled", bus, config));
    a.connect().unwrap();

    // The remote never reads, so this write parks with the writer lock held.
    let sender = Arc::clone(&a);
    let blocked = tokio::spawn(async move {
        sender.send(&Packet::new("stuck", vec![7u8; 10 * 1024])).await
    });
    settle().await;
    assert!(!blocked.is_finished());

    let started = Instant::now();
    a.disconnect().await;
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_millis(100), "returned after {elapsed:?}");
    assert!(elapsed < Duration::from_secs(1), "took {elapsed:?}");

    settle().await;
    let disconnects = events
        .drain()
        .into_iter()
        .filter(|e| matches!(e, PeerEvent::Disconnected(_)))
        .count();
    assert_eq!(disconnects, 1);
    assert_eq!(a.status(), PeerStatus::Disconnected);

    blocked.abort();
}

#[tokio::test]
async fn test_write_failure_reports_failed_and_one_disconnect() {
    let (a_io, b_io) = tokio::io::duplex(1024);
    // Left Idle so no receive loop releases the writer first.
    let (a, mut events) = peer(a_io, 1024);
    drop(b_io);

    assert_eq!(a.send(&Packet::new("first", vec![1])).await, SendOutcome::Failed);
    assert_eq!(a.send(&Packet::new("second", vec![2])).await, SendOutcome::Failed);

    settle().await;
    let events = events.drain();
    assert_eq!(events.len(), 1, "got {events:?}");
    assert!(matches!(events[0], PeerEvent::Disconnected(id) if id == a.id()));

    let snapshot = a.metrics().snapshot();
    assert_eq!(snapshot.send_failures, 2);
    assert_eq!(snapshot.disconnects, 1);
    assert_eq!(snapshot.frames_sent, 0);
}

#[derive(Debug)]
struct Unencodable;

impl WirePacket for Unencodable {
    fn to_bytes(&self) -> crate::Result<Vec<u8>> {
        Err(crate::ProtocolError::SerializeError("unsupported value".to_string()))
    }

    fn from_bytes(_bytes: &[u8]) -> crate::Result<Self> {
        Ok(Unencodable)
    }

    fn identifier(&self) -> Cow<'_, str> {
        Cow::Borrowed("unencodable")
    }
}

#[tokio::test]
async fn test_unserializable_packet_is_dropped_without_disconnect() {
    let (a_io, _b_io) = tokio::io::duplex(1024);
    let bus = EventBus::<Unencodable>::new();
    let mut events = bus.subscribe();
    let a = Peer::new(a_io, PeerId::new(), "duplex", bus, config(1024));
    a.connect().unwrap();

    assert_eq!(a.send(&Unencodable).await, SendOutcome::Unserializable);

    settle().await;
    let events = events.drain();
    assert_eq!(events.len(), 1, "got {events:?}");
    assert!(matches!(events[0], PeerEvent::Connected(_)));
    assert!(a.is_writable().await);
    assert_eq!(a.status(), PeerStatus::Connected);
    a.disconnect().await;
}
