//! Length-prefixed frame codec.
//!
//! ```text
//! [Length(4, u32 little-endian)] [Payload(Length)]
//! ```
//!
//! The decoder validates the announced length against the configured maximum
//! before reserving any space for the payload, and buffers partial reads of
//! both the prefix and the payload.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::config::{LENGTH_PREFIX_SIZE, MAX_FRAME_SIZE};
use crate::error::{ProtocolError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameCodec {
    max_frame_size: usize,
}

impl FrameCodec {
    pub fn new(max_frame_size: usize) -> Self {
        Self { max_frame_size }
    }

    pub fn max_frame_size(&self) -> usize {
        self.max_frame_size
    }

    /// Read the announced payload length without consuming anything.
    #[inline]
    fn peek_length(src: &BytesMut) -> Option<usize> {
        if src.len() < LENGTH_PREFIX_SIZE {
            return None;
        }
        let mut prefix = [0u8; LENGTH_PREFIX_SIZE];
        prefix.copy_from_slice(&src[..LENGTH_PREFIX_SIZE]);
        Some(u32::from_le_bytes(prefix) as usize)
    }
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new(MAX_FRAME_SIZE)
    }
}

impl Decoder for FrameCodec {
    type Item = BytesMut;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        let Some(len) = Self::peek_length(src) else {
            return Ok(None);
        };

        if len > self.max_frame_size {
            return Err(ProtocolError::OversizedPacket(len));
        }

        let total = LENGTH_PREFIX_SIZE + len;
        if src.len() < total {
            src.reserve(total - src.len());
            return Ok(None);
        }

        src.advance(LENGTH_PREFIX_SIZE);
        Ok(Some(src.split_to(len)))
    }

    /// At end of stream a clean frame boundary yields `None`; a truncated
    /// prefix is [`ProtocolError::AmbiguousLength`] and a truncated payload
    /// is [`ProtocolError::ConnectionClosed`].
    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        match self.decode(src)? {
            Some(frame) => Ok(Some(frame)),
            None if src.is_empty() => Ok(None),
            None if src.len() < LENGTH_PREFIX_SIZE => Err(ProtocolError::AmbiguousLength),
            None => Err(ProtocolError::ConnectionClosed),
        }
    }
}

impl Encoder<Bytes> for FrameCodec {
    type Error = ProtocolError;

    fn encode(&mut self, payload: Bytes, dst: &mut BytesMut) -> Result<()> {
        let len = payload.len();
        if len > self.max_frame_size {
            return Err(ProtocolError::OversizedPacket(len));
        }
        // max_frame_size is validated well below u32::MAX
        let prefix = u32::try_from(len).map_err(|_| ProtocolError::OversizedPacket(len))?;

        dst.reserve(LENGTH_PREFIX_SIZE + len);
        dst.put_u32_le(prefix);
        dst.extend_from_slice(&payload);
        Ok(())
    }
}
