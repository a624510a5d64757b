use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{FrameError, Result};
use crate::message::payload_len;

/// Frame header: sync (2) + msg id (1) + length (2, big-endian) = 5 bytes.
pub const HEADER_SIZE: usize = 5;

/// Sync bytes prefixing every frame.
pub const SYNC: [u8; 2] = [0xAA, 0x55];

/// Smallest possible frame: header plus the trailing checksum byte.
pub const MIN_FRAME_SIZE: usize = HEADER_SIZE + 1;

/// A framed message as it travels on the wire.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    /// Message id (see [`crate::message`]).
    pub msg_id: u8,
    /// The message payload.
    pub payload: Bytes,
}

impl Frame {
    /// Create a new frame.
    pub fn new(msg_id: u8, payload: impl Into<Bytes>) -> Self {
        Self {
            msg_id,
            payload: payload.into(),
        }
    }

    /// The total wire size of this frame (header + payload + checksum).
    pub fn wire_size(&self) -> usize {
        HEADER_SIZE + self.payload.len() + 1
    }
}

/// Additive checksum over msg id, both length bytes, and the payload.
fn checksum(msg_id: u8, payload: &[u8]) -> u8 {
    let len = payload.len() as u16;
    let head = msg_id
        .wrapping_add((len >> 8) as u8)
        .wrapping_add((len & 0xFF) as u8);
    payload.iter().fold(head, |acc, &b| acc.wrapping_add(b))
}

/// Encode a frame into the wire format.
///
/// Wire format:
/// ```text
/// ┌────────────┬─────────┬───────────┬────────────────┬──────────┐
/// │ Sync (2B)  │ MsgId   │ Length    │ Payload        │ Checksum │
/// │ 0xAA 0x55  │ (1B)    │ (2B BE)   │ (Length bytes) │ (1B)     │
/// └────────────┴─────────┴───────────┴────────────────┴──────────┘
/// ```
///
/// Fails if `msg_id` is not a known message or `payload` does not have that
/// message's fixed length.
pub fn encode_frame(msg_id: u8, payload: &[u8], dst: &mut BytesMut) -> Result<()> {
    let expected = payload_len(msg_id).ok_or(FrameError::UnknownMsgId(msg_id))?;
    if payload.len() != expected {
        return Err(FrameError::InvalidPayload {
            msg_id,
            len: payload.len(),
            expected,
        });
    }
    dst.reserve(HEADER_SIZE + payload.len() + 1);
    dst.put_slice(&SYNC);
    dst.put_u8(msg_id);
    dst.put_u16(payload.len() as u16);
    dst.put_slice(payload);
    dst.put_u8(checksum(msg_id, payload));
    Ok(())
}

/// Outcome of a single [`decode_frame`] pass over the receive buffer.
#[derive(Debug)]
pub enum DecodeOutcome {
    /// A complete, checksum-valid frame was consumed from the buffer.
    Frame(Frame),
    /// The buffer holds no complete frame yet; append more bytes and retry.
    NeedMore,
    /// A frame candidate failed validation. Its sync bytes were discarded;
    /// call again to re-scan the remainder.
    Resynced,
}

/// Decode one frame from the front of `src`.
///
/// Noise ahead of the next sync pair is dropped quietly. A candidate whose
/// msg id, declared length, or checksum is invalid is abandoned by discarding
/// the two sync bytes that started it, so a sync pair hiding later in its
/// body is found on the next pass. Neither case is an error: corrupt input
/// is expected on a UART and the stream recovers at the next good frame.
pub fn decode_frame(src: &mut BytesMut) -> DecodeOutcome {
    match find_sync(src) {
        Some(0) => {}
        Some(pos) => src.advance(pos),
        None => {
            // A trailing lone 0xAA may be the first half of a sync pair
            // split across reads; everything before it is noise.
            let keep = usize::from(src.last() == Some(&SYNC[0]));
            let garbage = src.len() - keep;
            src.advance(garbage);
            return DecodeOutcome::NeedMore;
        }
    }

    if src.len() < HEADER_SIZE {
        return DecodeOutcome::NeedMore;
    }

    let msg_id = src[2];
    let declared = u16::from_be_bytes([src[3], src[4]]) as usize;

    // Check the id/length pair against the fixed-length table before waiting
    // for the body, so a corrupt length field cannot stall the stream.
    match payload_len(msg_id) {
        Some(expected) if expected == declared => {}
        _ => {
            src.advance(SYNC.len());
            return DecodeOutcome::Resynced;
        }
    }

    let total = HEADER_SIZE + declared + 1;
    if src.len() < total {
        return DecodeOutcome::NeedMore;
    }

    let expected_chk = checksum(msg_id, &src[HEADER_SIZE..HEADER_SIZE + declared]);
    if src[total - 1] != expected_chk {
        src.advance(SYNC.len());
        return DecodeOutcome::Resynced;
    }

    src.advance(HEADER_SIZE);
    let payload = src.split_to(declared).freeze();
    src.advance(1); // checksum byte

    DecodeOutcome::Frame(Frame { msg_id, payload })
}

fn find_sync(src: &[u8]) -> Option<usize> {
    src.windows(SYNC.len()).position(|w| w == SYNC)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{TELEMETRY, TELEMETRY_PAYLOAD_LEN, VELOCITY, VELOCITY_PAYLOAD_LEN};

    fn encoded(msg_id: u8, payload: &[u8]) -> BytesMut {
        let mut buf = BytesMut::new();
        encode_frame(msg_id, payload, &mut buf).unwrap();
        buf
    }

    fn expect_frame(buf: &mut BytesMut) -> Frame {
        match decode_frame(buf) {
            DecodeOutcome::Frame(frame) => frame,
            other => panic!("expected a frame, got {other:?}"),
        }
    }

    #[test]
    fn test_checksum_known_vectors() {
        // msg id 0x01 + len 0x00 0x08 + eight zero bytes = 0x09
        assert_eq!(checksum(VELOCITY, &[0u8; 8]), 0x09);
        // msg id 0x02 + len 0x00 0x2C + all-zero payload = 0x2E
        assert_eq!(checksum(TELEMETRY, &[0u8; 44]), 0x2E);
        // Sum wraps modulo 256.
        assert_eq!(checksum(VELOCITY, &[0xFF; 8]), 0x09u8.wrapping_add(248));
    }

    #[test]
    fn test_encode_decode_roundtrip() {
        let payload: Vec<u8> = (0..VELOCITY_PAYLOAD_LEN as u8).collect();
        let mut buf = encoded(VELOCITY, &payload);
        assert_eq!(buf.len(), HEADER_SIZE + payload.len() + 1);

        let frame = expect_frame(&mut buf);
        assert_eq!(frame.msg_id, VELOCITY);
        assert_eq!(frame.payload.as_ref(), &payload[..]);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_encode_rejects_wrong_length() {
        let mut buf = BytesMut::new();
        let result = encode_frame(VELOCITY, &[0u8; 7], &mut buf);
        assert!(matches!(
            result,
            Err(FrameError::InvalidPayload {
                msg_id: VELOCITY,
                len: 7,
                expected: VELOCITY_PAYLOAD_LEN,
            })
        ));
        assert!(buf.is_empty());
    }

    #[test]
    fn test_encode_rejects_unknown_msg_id() {
        let mut buf = BytesMut::new();
        let result = encode_frame(0x7F, b"", &mut buf);
        assert!(matches!(result, Err(FrameError::UnknownMsgId(0x7F))));
    }

    #[test]
    fn test_decode_incomplete_header() {
        let mut buf = BytesMut::from(&[0xAA, 0x55, 0x01][..]);
        assert!(matches!(decode_frame(&mut buf), DecodeOutcome::NeedMore));
        assert_eq!(buf.len(), 3);
    }

    #[test]
    fn test_decode_incomplete_payload() {
        let mut buf = encoded(VELOCITY, &[0u8; 8]);
        buf.truncate(HEADER_SIZE + 3);
        assert!(matches!(decode_frame(&mut buf), DecodeOutcome::NeedMore));
        assert_eq!(buf.len(), HEADER_SIZE + 3);
    }

    #[test]
    fn test_decode_discards_leading_noise() {
        let mut buf = BytesMut::from(&[0x00, 0x13, 0x37, 0xFE][..]);
        buf.extend_from_slice(&encoded(VELOCITY, &[0u8; 8]));

        let frame = expect_frame(&mut buf);
        assert_eq!(frame.msg_id, VELOCITY);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_decode_keeps_trailing_half_sync() {
        let mut buf = BytesMut::from(&[0x13, 0x37, 0xAA][..]);
        assert!(matches!(decode_frame(&mut buf), DecodeOutcome::NeedMore));
        assert_eq!(buf.as_ref(), &[0xAA]);

        // The second half of the sync pair and the rest of the frame arrive.
        let frame = encoded(VELOCITY, &[7u8; 8]);
        buf.extend_from_slice(&frame[1..]);
        let frame = expect_frame(&mut buf);
        assert_eq!(frame.payload.as_ref(), &[7u8; 8]);
    }

    #[test]
    fn test_decode_pure_noise_leaves_empty_buffer() {
        let mut buf = BytesMut::from(&[0x01, 0x02, 0x03, 0x04, 0x05][..]);
        assert!(matches!(decode_frame(&mut buf), DecodeOutcome::NeedMore));
        assert!(buf.is_empty());
    }

    #[test]
    fn test_decode_bad_checksum_resyncs_to_next_frame() {
        // A velocity-shaped candidate with garbage payload and a wrong
        // checksum, followed immediately by a valid telemetry frame.
        let mut buf = BytesMut::new();
        buf.extend_from_slice(&[0xAA, 0x55, 0x01, 0x00, 0x08]);
        buf.extend_from_slice(&[0xDE, 0xAD, 0xBE, 0xEF, 0x55, 0x66, 0x77, 0x88]);
        buf.extend_from_slice(&[0x00]); // wrong checksum
        let telemetry = encoded(TELEMETRY, &[3u8; TELEMETRY_PAYLOAD_LEN]);
        buf.extend_from_slice(&telemetry);

        assert!(matches!(decode_frame(&mut buf), DecodeOutcome::Resynced));
        let frame = expect_frame(&mut buf);
        assert_eq!(frame.msg_id, TELEMETRY);
        assert_eq!(frame.payload.as_ref(), &[3u8; TELEMETRY_PAYLOAD_LEN]);
    }

    #[test]
    fn test_decode_length_mismatch_resyncs() {
        // Known id, wrong declared length: resync without waiting for a body.
        let mut buf = BytesMut::from(&[0xAA, 0x55, 0x01, 0x00, 0x07][..]);
        assert!(matches!(decode_frame(&mut buf), DecodeOutcome::Resynced));
        assert_eq!(buf.as_ref(), &[0x01, 0x00, 0x07]);
    }

    #[test]
    fn test_decode_unknown_msg_id_resyncs() {
        let mut buf = BytesMut::from(&[0xAA, 0x55, 0x42, 0x00, 0x08][..]);
        assert!(matches!(decode_frame(&mut buf), DecodeOutcome::Resynced));
    }

    #[test]
    fn test_decode_huge_declared_length_does_not_stall() {
        // 0xFFFF declared length must resync immediately, not wait for 64 KiB.
        let mut buf = BytesMut::from(&[0xAA, 0x55, 0x02, 0xFF, 0xFF, 0x00][..]);
        assert!(matches!(decode_frame(&mut buf), DecodeOutcome::Resynced));
    }

    #[test]
    fn test_single_byte_corruption_always_rejected() {
        let payload: Vec<u8> = (0..8u8).map(|i| i.wrapping_mul(37)).collect();
        let clean = encoded(VELOCITY, &payload);

        for pos in HEADER_SIZE..HEADER_SIZE + payload.len() {
            let mut corrupted = BytesMut::from(clean.as_ref());
            corrupted[pos] = corrupted[pos].wrapping_add(1);
            assert!(
                matches!(decode_frame(&mut corrupted), DecodeOutcome::Resynced),
                "corruption at byte {pos} was not rejected"
            );
        }
    }

    #[test]
    fn test_multiple_frames() {
        let mut buf = encoded(VELOCITY, &[1u8; 8]);
        buf.extend_from_slice(&encoded(TELEMETRY, &[2u8; 44]));

        let f1 = expect_frame(&mut buf);
        assert_eq!(f1.msg_id, VELOCITY);
        let f2 = expect_frame(&mut buf);
        assert_eq!(f2.msg_id, TELEMETRY);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_sync_pair_inside_bad_frame_body_is_found() {
        // The corrupt candidate hides a real frame starting inside its body.
        let inner = encoded(VELOCITY, &[9u8; 8]);
        let mut buf = BytesMut::from(&[0xAA, 0x55, 0x01, 0x00, 0x08][..]);
        buf.extend_from_slice(&inner);
        buf.extend_from_slice(&[0x00]); // stray byte

        assert!(matches!(decode_frame(&mut buf), DecodeOutcome::Resynced));
        let frame = expect_frame(&mut buf);
        assert_eq!(frame.payload.as_ref(), &[9u8; 8]);
    }

    #[test]
    fn test_frame_wire_size() {
        let frame = Frame::new(VELOCITY, Bytes::from_static(&[0u8; 8]));
        assert_eq!(frame.wire_size(), HEADER_SIZE + 8 + 1);
    }
}
