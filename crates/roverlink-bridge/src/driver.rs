//! Link driver: owns the byte channel to the motor controller.
//!
//! Wraps a [`LinkStream`] with the stream decoder for inbound telemetry
//! and frame encoding for outbound commands. On any transport error the
//! driver drops the channel and re-opens it with exponential backoff, so
//! callers never see a hard failure, only a temporarily silent link.

use std::time::{Duration, Instant};

use bytes::BytesMut;
use serde::Serialize;
use tracing::{debug, info, warn};

use roverlink_frame::{Frame, StreamDecoder, VelocityCommand};
use roverlink_transport::{LinkEndpoint, LinkStream};

use crate::config::LinkConfig;
use crate::error::{LinkError, Result};

/// Upper bound on bytes drained per poll, so a flooding peer cannot pin
/// the control loop inside one tick.
const MAX_POLL_BYTES: usize = 16 * 1024;

/// Cumulative link health counters. Monotonic over the driver's life,
/// surviving reconnects.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LinkStats {
    pub frames_decoded: u64,
    pub resyncs: u64,
    pub resync_bursts: u64,
    pub send_failures: u64,
    pub reconnects: u64,
}

pub struct LinkDriver {
    /// Where to re-dial after a failure. `None` for adopted streams,
    /// which cannot be re-opened.
    endpoint: Option<LinkEndpoint>,
    config: LinkConfig,
    stream: Option<Box<dyn LinkStream>>,
    decoder: StreamDecoder,
    encode_buf: BytesMut,
    next_attempt_at: Option<Instant>,
    reconnect_delay: Duration,
    ever_connected: bool,
    /// True once the current outage has been warned about. Further open
    /// failures in the same outage log at debug.
    down_reported: bool,
    send_failures: u64,
    reconnects: u64,
}

impl LinkDriver {
    /// Driver for `endpoint`. Does not connect; the first
    /// [`Self::ensure_connected`] or send/poll call does.
    pub fn new(endpoint: LinkEndpoint, config: LinkConfig) -> Self {
        let reconnect_delay = config.reconnect_initial;
        Self {
            endpoint: Some(endpoint),
            decoder: StreamDecoder::with_config(config.decoder),
            config,
            stream: None,
            encode_buf: BytesMut::new(),
            next_attempt_at: None,
            reconnect_delay,
            ever_connected: false,
            down_reported: false,
            send_failures: 0,
            reconnects: 0,
        }
    }

    /// Adopt an already open stream. Used with in-memory links in tests;
    /// once the stream fails there is nothing to reconnect to.
    pub fn from_stream(stream: Box<dyn LinkStream>, config: LinkConfig) -> Self {
        let reconnect_delay = config.reconnect_initial;
        Self {
            endpoint: None,
            decoder: StreamDecoder::with_config(config.decoder),
            config,
            stream: Some(stream),
            encode_buf: BytesMut::new(),
            next_attempt_at: None,
            reconnect_delay,
            ever_connected: true,
            down_reported: false,
            send_failures: 0,
            reconnects: 0,
        }
    }

    pub fn connected(&self) -> bool {
        self.stream.is_some()
    }

    pub fn endpoint(&self) -> Option<&LinkEndpoint> {
        self.endpoint.as_ref()
    }

    pub fn stats(&self) -> LinkStats {
        let decode = self.decoder.stats();
        LinkStats {
            frames_decoded: decode.frames_decoded,
            resyncs: decode.resyncs,
            resync_bursts: decode.bursts,
            send_failures: self.send_failures,
            reconnects: self.reconnects,
        }
    }

    /// Open the link if it is down and a retry is due. Returns whether
    /// the link is usable afterwards. Failed attempts double the retry
    /// delay up to the configured ceiling; a success resets it.
    pub fn ensure_connected(&mut self, now: Instant) -> bool {
        if self.stream.is_some() {
            return true;
        }
        let Some(endpoint) = &self.endpoint else {
            return false;
        };
        if let Some(at) = self.next_attempt_at {
            if now < at {
                return false;
            }
        }
        match endpoint.open(self.config.baud) {
            Ok(stream) => {
                info!(endpoint = %endpoint, "link connected");
                self.stream = Some(stream);
                self.next_attempt_at = None;
                self.reconnect_delay = self.config.reconnect_initial;
                self.down_reported = false;
                if self.ever_connected {
                    self.reconnects += 1;
                } else {
                    self.ever_connected = true;
                }
                true
            }
            Err(err) => {
                if self.down_reported {
                    debug!(
                        endpoint = %endpoint,
                        error = %err,
                        retry_in_s = self.reconnect_delay.as_secs_f64(),
                        "link open failed"
                    );
                } else {
                    warn!(
                        endpoint = %endpoint,
                        error = %err,
                        retry_in_s = self.reconnect_delay.as_secs_f64(),
                        "link open failed"
                    );
                    self.down_reported = true;
                }
                self.next_attempt_at = Some(now + self.reconnect_delay);
                self.reconnect_delay =
                    (self.reconnect_delay * 2).min(self.config.reconnect_max);
                false
            }
        }
    }

    /// Drain available bytes and return every complete frame found.
    /// Returns an empty vec while the link is down.
    pub fn poll_receive(&mut self, now: Instant) -> Vec<Frame> {
        let mut frames = Vec::new();
        if self.ensure_connected(now) {
            let mut chunk = [0u8; 512];
            let mut drained = 0usize;
            while drained < MAX_POLL_BYTES {
                let n = match self.stream.as_mut() {
                    Some(stream) => match stream.read(&mut chunk) {
                        Ok(0) => break,
                        Ok(n) => n,
                        Err(err) => {
                            warn!(error = %err, "link read failed, closing");
                            self.stream = None;
                            self.down_reported = true;
                            break;
                        }
                    },
                    None => break,
                };
                self.decoder.extend(&chunk[..n]);
                drained += n;
            }
        }
        while let Some(frame) = self.decoder.next_frame() {
            frames.push(frame);
        }
        frames
    }

    /// Clamp `cmd` into the configured limits, frame it, and write it
    /// out. A transport failure closes the link and schedules a
    /// reconnect.
    pub fn send_velocity(&mut self, cmd: VelocityCommand, now: Instant) -> Result<()> {
        if !self.ensure_connected(now) {
            return Err(LinkError::NotConnected);
        }
        let clamped = self.config.bounds.clamp(cmd);
        self.encode_buf.clear();
        clamped.encode_framed(&mut self.encode_buf)?;

        let outcome = match self.stream.as_mut() {
            Some(stream) => {
                let mut result = stream.write_all(&self.encode_buf);
                if result.is_ok() {
                    result = stream.flush();
                }
                result
            }
            None => return Err(LinkError::NotConnected),
        };
        if let Err(err) = outcome {
            self.send_failures += 1;
            warn!(error = %err, "link write failed, closing");
            self.stream = None;
            self.down_reported = true;
            return Err(err.into());
        }
        Ok(())
    }
}

impl std::fmt::Debug for LinkDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LinkDriver")
            .field("endpoint", &self.endpoint)
            .field("connected", &self.connected())
            .field("stats", &self.stats())
            .finish()
    }
}
