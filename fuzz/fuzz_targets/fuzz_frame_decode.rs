#![no_main]

use bytes::BytesMut;
use dataflow::{FrameCodec, Packet, WirePacket};
use libfuzzer_sys::fuzz_target;
use tokio_util::codec::Decoder;

fuzz_target!(|data: &[u8]| {
    // Arbitrary wire bytes must never panic or allocate past the frame limit
    let mut codec = FrameCodec::new(64 * 1024);
    let mut buf = BytesMut::from(data);
    while let Ok(Some(frame)) = codec.decode(&mut buf) {
        let _ = Packet::from_bytes(&frame);
    }
    let _ = codec.decode_eof(&mut buf);
});
