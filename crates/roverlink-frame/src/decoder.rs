use bytes::BytesMut;
use tracing::warn;

use crate::codec::{decode_frame, DecodeOutcome, Frame};

/// Configuration for [`StreamDecoder`].
#[derive(Debug, Clone, Copy)]
pub struct DecoderConfig {
    /// Consecutive resyncs tolerated before the streak is reported.
    pub burst_threshold: u32,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self { burst_threshold: 8 }
    }
}

/// Cumulative decode statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct DecodeStats {
    /// Complete frames decoded.
    pub frames_decoded: u64,
    /// Candidates discarded during resynchronization.
    pub resyncs: u64,
    /// Resync streaks that crossed the burst threshold.
    pub bursts: u64,
}

/// Accumulating stream decoder.
///
/// Feed raw bytes as they arrive with [`extend`](Self::extend), then pull
/// complete frames with [`next_frame`](Self::next_frame). Corrupt candidates
/// are dropped quietly; a checksum failure on a serial line is routine, not
/// an event worth a log line. Only a streak of consecutive failures longer
/// than the burst threshold is logged, once per streak, after which a good
/// frame re-arms reporting.
#[derive(Debug)]
pub struct StreamDecoder {
    buf: BytesMut,
    config: DecoderConfig,
    stats: DecodeStats,
    burst_len: u32,
    burst_reported: bool,
}

impl StreamDecoder {
    pub fn new() -> Self {
        Self::with_config(DecoderConfig::default())
    }

    pub fn with_config(config: DecoderConfig) -> Self {
        Self {
            buf: BytesMut::new(),
            config,
            stats: DecodeStats::default(),
            burst_len: 0,
            burst_reported: false,
        }
    }

    /// Append bytes received from the transport.
    pub fn extend(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Pull the next complete frame out of the buffer, resynchronizing past
    /// corrupt candidates as needed. Returns `None` once the buffered bytes
    /// hold no further complete frame.
    pub fn next_frame(&mut self) -> Option<Frame> {
        loop {
            match decode_frame(&mut self.buf) {
                DecodeOutcome::Frame(frame) => {
                    self.stats.frames_decoded += 1;
                    self.burst_len = 0;
                    self.burst_reported = false;
                    return Some(frame);
                }
                DecodeOutcome::NeedMore => return None,
                DecodeOutcome::Resynced => {
                    self.stats.resyncs += 1;
                    self.burst_len += 1;
                    if self.burst_len > self.config.burst_threshold && !self.burst_reported {
                        self.stats.bursts += 1;
                        self.burst_reported = true;
                        warn!(
                            consecutive = self.burst_len,
                            buffered = self.buf.len(),
                            total_resyncs = self.stats.resyncs,
                            "sustained frame decode failures, resynchronizing"
                        );
                    }
                }
            }
        }
    }

    /// Cumulative counters since construction.
    pub fn stats(&self) -> DecodeStats {
        self.stats
    }

    /// Bytes currently buffered while waiting for a complete frame.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }
}

impl Default for StreamDecoder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::encode_frame;
    use crate::message::{Telemetry, VELOCITY};

    fn velocity_frame_bytes(fill: u8) -> BytesMut {
        let mut buf = BytesMut::new();
        encode_frame(VELOCITY, &[fill; 8], &mut buf).unwrap();
        buf
    }

    /// A velocity-shaped candidate that fails its checksum.
    fn bad_candidate() -> Vec<u8> {
        let mut bytes = velocity_frame_bytes(0x11).to_vec();
        let last = bytes.len() - 1;
        bytes[last] = bytes[last].wrapping_add(1);
        bytes
    }

    #[test]
    fn test_frame_across_partial_feeds() {
        let frame = velocity_frame_bytes(0x22);
        let mut decoder = StreamDecoder::new();

        for &byte in &frame[..frame.len() - 1] {
            decoder.extend(&[byte]);
            assert!(decoder.next_frame().is_none());
        }
        decoder.extend(&[frame[frame.len() - 1]]);

        let decoded = decoder.next_frame().expect("complete frame");
        assert_eq!(decoded.msg_id, VELOCITY);
        assert_eq!(decoder.stats().frames_decoded, 1);
        assert_eq!(decoder.stats().resyncs, 0);
    }

    #[test]
    fn test_noise_is_not_a_resync() {
        let mut decoder = StreamDecoder::new();
        decoder.extend(&[0x00, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06]);
        assert!(decoder.next_frame().is_none());
        assert_eq!(decoder.stats().resyncs, 0);
        assert_eq!(decoder.stats().bursts, 0);
    }

    #[test]
    fn test_resyncs_below_threshold_stay_quiet() {
        let mut decoder = StreamDecoder::new();
        for _ in 0..3 {
            decoder.extend(&bad_candidate());
        }
        decoder.extend(&velocity_frame_bytes(0x33));

        let frame = decoder.next_frame().expect("valid frame after noise");
        assert_eq!(frame.payload.as_ref(), &[0x33; 8]);
        assert_eq!(decoder.stats().resyncs, 3);
        assert_eq!(decoder.stats().bursts, 0);
    }

    #[test]
    fn test_burst_reported_once_per_streak() {
        let threshold = DecoderConfig::default().burst_threshold;
        let mut decoder = StreamDecoder::new();

        for _ in 0..threshold + 3 {
            decoder.extend(&bad_candidate());
        }
        assert!(decoder.next_frame().is_none());
        assert_eq!(decoder.stats().resyncs, u64::from(threshold) + 3);
        assert_eq!(decoder.stats().bursts, 1);

        // A good frame ends the streak and re-arms reporting.
        decoder.extend(&velocity_frame_bytes(0x44));
        assert!(decoder.next_frame().is_some());

        for _ in 0..threshold + 1 {
            decoder.extend(&bad_candidate());
        }
        assert!(decoder.next_frame().is_none());
        assert_eq!(decoder.stats().bursts, 2);
    }

    #[test]
    fn test_interleaved_telemetry_and_garbage() {
        let telemetry = Telemetry {
            battery_voltage: 11.7,
            ..Telemetry::default()
        };
        let mut wire = BytesMut::new();
        telemetry.encode_framed(&mut wire).unwrap();

        let mut decoder = StreamDecoder::new();
        decoder.extend(&[0xFF, 0xFE]);
        decoder.extend(&bad_candidate());
        decoder.extend(&wire);

        let frame = decoder.next_frame().expect("telemetry frame");
        let decoded = Telemetry::try_from(&frame).unwrap();
        assert_eq!(decoded.battery_voltage, 11.7);
        assert!(decoder.next_frame().is_none());
        assert_eq!(decoder.stats().frames_decoded, 1);
        assert_eq!(decoder.stats().resyncs, 1);
    }
}
