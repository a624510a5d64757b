//! Sync-delimited binary framing for the rover control link.
//!
//! Every frame on the wire carries:
//! - 2 sync bytes (0xAA 0x55) for stream recovery
//! - a 1-byte message id
//! - a 2-byte big-endian payload length
//! - the fixed-length payload (big-endian f32 fields)
//! - a 1-byte additive checksum
//!
//! Corrupt input never surfaces as an error from the decode path: the
//! decoder drops the bad candidate, re-scans for the next sync pair, and
//! keeps counters so sustained noise is still observable.

pub mod codec;
pub mod decoder;
pub mod error;
pub mod message;

pub use codec::{
    decode_frame, encode_frame, DecodeOutcome, Frame, HEADER_SIZE, MIN_FRAME_SIZE, SYNC,
};
pub use decoder::{DecodeStats, DecoderConfig, StreamDecoder};
pub use error::{FrameError, Result};
pub use message::{
    msg_name, payload_len, Telemetry, VelocityCommand, TELEMETRY, TELEMETRY_PAYLOAD_LEN, VELOCITY,
    VELOCITY_PAYLOAD_LEN,
};
