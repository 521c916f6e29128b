//! A single framed connection and its receive loop.
//!
//! Lifecycle is one-shot: `Idle -> Connected -> Disconnected`. A peer is never
//! reconnected; build a new one for a new stream.
//!
//! Three paths can end a lifecycle: [`Peer::disconnect`], a receive loop that
//! hits end of stream or a transport/protocol error, and a failed write in
//! [`Peer::send`]. Whichever gets there first raises `Disconnected`; the others
//! stay silent.

use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::task::JoinHandle;
use tokio_util::codec::{FramedRead, FramedWrite};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, trace, warn};

use crate::config::PeerConfig;
use crate::core::codec::FrameCodec;
use crate::core::packet::{Packet, WirePacket};
use crate::error::{constants, ProtocolError, Result};
use crate::utils::metrics::PeerMetrics;
use crate::utils::timeout::with_timeout;

use super::events::{EventBus, PacketEvent, PeerEvent};
use super::id::PeerId;

type FrameWriter<S> = FramedWrite<WriteHalf<S>, FrameCodec>;
type FrameReader<S> = FramedRead<ReadHalf<S>, FrameCodec>;

/// What happened to a packet handed to [`Peer::send`].
///
/// Failures are already logged and, where they end the connection, signalled
/// with a `Disconnected` event. The outcome is informational.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// A full frame carrying `len` payload bytes was written and flushed.
    Sent { len: usize },
    /// The stream had already been released; nothing was written.
    NotWritable,
    /// The packet could not be serialized; nothing was written.
    Unserializable,
    /// The serialized packet exceeded the frame limit and was dropped.
    Oversized { len: usize, max: usize },
    /// The write failed partway or entirely.
    Failed,
}

impl SendOutcome {
    pub fn is_sent(&self) -> bool {
        matches!(self, SendOutcome::Sent { .. })
    }
}

/// Externally visible lifecycle stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerStatus {
    Idle,
    Connected,
    Disconnected,
}

enum PeerState<S> {
    Idle(ReadHalf<S>),
    Connected {
        task: JoinHandle<()>,
        cancel: CancellationToken,
    },
    Disconnected,
}

/// State touched by both the caller-facing API and the receive task.
struct Shared<S, P> {
    id: PeerId,
    remote: String,
    config: PeerConfig,
    // `None` once released; the lock spans a whole frame write.
    writer: tokio::sync::Mutex<Option<FrameWriter<S>>>,
    events: EventBus<P>,
    metrics: Arc<PeerMetrics>,
    disconnect_raised: AtomicBool,
}

impl<S, P> Shared<S, P>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
    P: WirePacket,
{
    /// Raise `Disconnected` unless this lifecycle already did.
    fn notify_disconnected(&self) -> bool {
        if self.disconnect_raised.swap(true, Ordering::AcqRel) {
            return false;
        }
        self.metrics.disconnected();
        self.events.publish(PeerEvent::Disconnected(self.id));
        true
    }

    /// Shut down and drop the write half if it is still held.
    async fn release_writer(&self) {
        let writer = self.writer.lock().await.take();
        if let Some(mut writer) = writer {
            if let Err(e) = writer.get_mut().shutdown().await {
                debug!(peer = %self.id, error = %e, "Stream shutdown failed");
            }
        }
    }
}

/// One established connection speaking the length-prefixed frame protocol.
pub struct Peer<S, P = Packet> {
    shared: Arc<Shared<S, P>>,
    state: Mutex<PeerState<S>>,
}

impl<S, P> Peer<S, P>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
    P: WirePacket,
{
    /// Wrap an already established stream. The peer starts Idle.
    pub fn new(
        stream: S,
        id: PeerId,
        remote: impl Into<String>,
        events: EventBus<P>,
        config: PeerConfig,
    ) -> Self {
        let (reader, writer) = tokio::io::split(stream);
        let codec = FrameCodec::new(config.max_frame_size);

        let shared = Arc::new(Shared {
            id,
            remote: remote.into(),
            writer: tokio::sync::Mutex::new(Some(FramedWrite::new(writer, codec))),
            config,
            events,
            metrics: Arc::new(PeerMetrics::new()),
            disconnect_raised: AtomicBool::new(false),
        });

        Self {
            shared,
            state: Mutex::new(PeerState::Idle(reader)),
        }
    }

    /// Random identity, unlabelled remote, default configuration.
    pub fn with_defaults(stream: S, events: EventBus<P>) -> Self {
        Self::new(stream, PeerId::new(), "unknown", events, PeerConfig::default())
    }

    pub fn id(&self) -> PeerId {
        self.shared.id
    }

    pub fn remote(&self) -> &str {
        &self.shared.remote
    }

    pub fn config(&self) -> &PeerConfig {
        &self.shared.config
    }

    pub fn events(&self) -> &EventBus<P> {
        &self.shared.events
    }

    pub fn metrics(&self) -> Arc<PeerMetrics> {
        Arc::clone(&self.shared.metrics)
    }

    /// Current stage. A Connected peer whose receive loop has already ended
    /// reports `Disconnected`.
    pub fn status(&self) -> PeerStatus {
        match &*self.lock_state() {
            PeerState::Idle(_) => PeerStatus::Idle,
            PeerState::Connected { task, .. } if !task.is_finished() => PeerStatus::Connected,
            _ => PeerStatus::Disconnected,
        }
    }

    /// Whether the write half is still held.
    pub async fn is_writable(&self) -> bool {
        self.shared.writer.lock().await.is_some()
    }

    fn lock_state(&self) -> MutexGuard<'_, PeerState<S>> {
        // The state lock is never held across a panic point.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Start the receive loop on the current tokio runtime.
    ///
    /// `Connected` is published before the loop reads anything. Transport
    /// problems are not reported here; they end the loop later.
    #[instrument(skip(self), fields(peer = %self.shared.id, remote = %self.shared.remote))]
    pub fn connect(&self) -> Result<()> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|e| {
            ProtocolError::InvalidState(format!("connect requires a tokio runtime: {e}"))
        })?;

        let mut state = self.lock_state();
        let reader = match std::mem::replace(&mut *state, PeerState::Disconnected) {
            PeerState::Idle(reader) => reader,
            other => {
                let reason = match other {
                    PeerState::Connected { .. } => constants::ERR_ALREADY_CONNECTED,
                    _ => constants::ERR_ALREADY_DISCONNECTED,
                };
                *state = other;
                return Err(ProtocolError::InvalidState(reason.to_string()));
            }
        };

        let frames = FramedRead::with_capacity(
            reader,
            FrameCodec::new(self.shared.config.max_frame_size),
            self.shared.config.read_buffer_capacity,
        );
        let cancel = CancellationToken::new();

        self.shared
            .events
            .publish(PeerEvent::Connected(self.shared.id));

        let task = runtime.spawn(receive_loop(
            Arc::clone(&self.shared),
            frames,
            cancel.clone(),
        ));
        *state = PeerState::Connected { task, cancel };

        info!("Established connection with {}", self.shared.remote);
        Ok(())
    }

    /// Stop the receive loop, release the stream and raise `Disconnected`.
    ///
    /// Waits for the loop to exit, bounded by `disconnect_timeout`; past that
    /// the loop is aborted and teardown continues. Once this returns no further
    /// `PacketReceived` is raised for this peer. Idempotent.
    #[instrument(skip(self), fields(peer = %self.shared.id, remote = %self.shared.remote))]
    pub async fn disconnect(&self) {
        let previous = std::mem::replace(&mut *self.lock_state(), PeerState::Disconnected);
        let timeout = self.shared.config.disconnect_timeout;

        match previous {
            PeerState::Disconnected => {
                debug!("Peer already disconnected");
            }
            PeerState::Idle(reader) => {
                drop(reader);
                if with_timeout(self.shared.release_writer(), timeout).await.is_err() {
                    warn!("Timed out releasing the stream of an idle peer");
                }
                debug!("Released idle peer");
            }
            PeerState::Connected { mut task, cancel } => {
                info!("Disconnected from {}", self.shared.remote);
                cancel.cancel();

                match with_timeout(&mut task, timeout).await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => warn!(error = %e, "Receive loop ended abnormally"),
                    Err(_) => {
                        warn!(
                            timeout_ms = timeout.as_millis() as u64,
                            "Receive loop did not stop in time, aborting"
                        );
                        task.abort();
                        let _ = task.await;
                    }
                }

                if with_timeout(self.shared.release_writer(), timeout).await.is_err() {
                    warn!("Timed out releasing the stream; a send is still blocked on it");
                }
                self.shared.notify_disconnected();
                self.shared.metrics.log_summary(self.shared.remote.as_str());
            }
        }
    }

    /// Frame and write one packet.
    ///
    /// Concurrent calls are serialized per peer, so frames never interleave.
    /// Errors are logged and reported through [`SendOutcome`]; a stream that
    /// cannot be written raises `Disconnected`.
    #[instrument(skip(self, packet), fields(peer = %self.shared.id, identifier = %packet.identifier()))]
    pub async fn send(&self, packet: &P) -> SendOutcome {
        let shared = &self.shared;

        if !self.is_writable().await {
            return self.not_writable(packet);
        }

        let bytes = match packet.to_bytes() {
            Ok(bytes) => bytes,
            Err(e) => {
                error!(
                    error = %e,
                    "Unable to serialize packet with identifier {}",
                    packet.identifier()
                );
                return SendOutcome::Unserializable;
            }
        };

        let len = bytes.len();
        let max = shared.config.max_frame_size;
        if len > max {
            shared.metrics.oversized_drop();
            warn!(
                len,
                max,
                "Dismissing large packet with identifier {}: {}",
                packet.identifier(),
                constants::ERR_OVERSIZED_PACKET
            );
            return SendOutcome::Oversized { len, max };
        }

        let mut writer = shared.writer.lock().await;
        let Some(frames) = writer.as_mut() else {
            drop(writer);
            return self.not_writable(packet);
        };

        match frames.send(Bytes::from(bytes)).await {
            Ok(()) => {
                drop(writer);
                shared.metrics.frame_sent(len as u64);
                trace!(len, "Packet sent");
                SendOutcome::Sent { len }
            }
            Err(e) => {
                drop(writer);
                shared.metrics.send_failure();
                shared.notify_disconnected();
                error!(
                    error = %e,
                    "Unable to send packet with identifier {}",
                    packet.identifier()
                );
                SendOutcome::Failed
            }
        }
    }

    fn not_writable(&self, packet: &P) -> SendOutcome {
        self.shared.metrics.send_failure();
        self.shared.notify_disconnected();
        error!(
            "Unable to send packet with identifier {}. {}",
            packet.identifier(),
            constants::ERR_NOT_WRITABLE
        );
        SendOutcome::NotWritable
    }
}

impl<S, P> Drop for Peer<S, P> {
    fn drop(&mut self) {
        // Stop the loop; it exits through the cancellation path and drops the stream.
        let state = self.state.get_mut().unwrap_or_else(PoisonError::into_inner);
        if let PeerState::Connected { cancel, .. } = state {
            cancel.cancel();
        }
    }
}

async fn receive_loop<S, P>(
    shared: Arc<Shared<S, P>>,
    mut frames: FrameReader<S>,
    cancel: CancellationToken,
) where
    S: AsyncRead + AsyncWrite + Send + 'static,
    P: WirePacket,
{
    let result = read_frames(&shared, &mut frames, &cancel).await;
    drop(frames);

    let Err(e) = result else {
        debug!(peer = %shared.id, "Receive operation was cancelled");
        return;
    };

    shared.metrics.receive_failure();
    shared.notify_disconnected();

    match &e {
        ProtocolError::AmbiguousLength | ProtocolError::OversizedPacket(_) => warn!(
            peer = %shared.id,
            error = %e,
            "Invalid frame from {}, closing connection",
            shared.remote
        ),
        e if e.is_peer_closed() => warn!(
            peer = %shared.id,
            error = %e,
            "Peer {} disconnected: {}",
            shared.remote,
            constants::ERR_PEER_CLOSED
        ),
        _ => warn!(
            peer = %shared.id,
            error = %e,
            "Receive from {} failed, closing connection",
            shared.remote
        ),
    }

    shared.release_writer().await;
}

/// Decode frames until cancelled (`Ok`) or the stream fails (`Err`).
async fn read_frames<S, P>(
    shared: &Shared<S, P>,
    frames: &mut FrameReader<S>,
    cancel: &CancellationToken,
) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
    P: WirePacket,
{
    loop {
        // Every read, including partial payload reads buffered inside the
        // codec, is raced against cancellation.
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(()),
            next = frames.next() => next,
        };

        let payload = match next {
            Some(frame) => frame?,
            None => return Err(ProtocolError::AmbiguousLength),
        };

        let packet = P::from_bytes(&payload)?;
        let len = payload.len();
        shared.metrics.frame_received(len as u64);
        debug!(
            peer = %shared.id,
            identifier = %packet.identifier(),
            len,
            "Packet received from {}",
            shared.remote
        );

        shared
            .events
            .publish(PeerEvent::PacketReceived(PacketEvent::new(shared.id, packet)));
    }
}
