//! Typed payloads for the two messages on the rover control link.
//!
//! Message ids below 0x10 are claimed by the drive controller firmware.
//! Ids are never reused across payload layouts; a layout change gets a new
//! id.

use bytes::{Buf, BufMut, BytesMut};
use serde::Serialize;

use crate::codec::{encode_frame, Frame};
use crate::error::{FrameError, Result};

/// Velocity command, host → rover.
pub const VELOCITY: u8 = 0x01;

/// Telemetry report, rover → host.
pub const TELEMETRY: u8 = 0x02;

/// Payload size for [`VELOCITY`]: 2 × f32.
pub const VELOCITY_PAYLOAD_LEN: usize = 8;

/// Payload size for [`TELEMETRY`]: 11 × f32.
pub const TELEMETRY_PAYLOAD_LEN: usize = 44;

/// Fixed payload length for a message id, or `None` for ids not on the wire.
pub fn payload_len(msg_id: u8) -> Option<usize> {
    match msg_id {
        VELOCITY => Some(VELOCITY_PAYLOAD_LEN),
        TELEMETRY => Some(TELEMETRY_PAYLOAD_LEN),
        _ => None,
    }
}

/// Returns a human-readable name for a message id.
pub fn msg_name(msg_id: u8) -> &'static str {
    match msg_id {
        VELOCITY => "VELOCITY",
        TELEMETRY => "TELEMETRY",
        _ => "UNKNOWN",
    }
}

/// Commanded chassis velocity.
///
/// Positive `linear_mps` drives forward; positive `angular_rps` yaws
/// counter-clockwise seen from above.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct VelocityCommand {
    pub linear_mps: f32,
    pub angular_rps: f32,
}

impl VelocityCommand {
    /// The fail-safe stop command.
    pub const ZERO: Self = Self {
        linear_mps: 0.0,
        angular_rps: 0.0,
    };

    pub fn new(linear_mps: f32, angular_rps: f32) -> Self {
        Self {
            linear_mps,
            angular_rps,
        }
    }

    /// True when both fields are finite (no NaN, no infinities).
    pub fn is_finite(&self) -> bool {
        self.linear_mps.is_finite() && self.angular_rps.is_finite()
    }

    /// True when every field is within `epsilon` of `other`.
    pub fn approx_eq(&self, other: &Self, epsilon: f32) -> bool {
        (self.linear_mps - other.linear_mps).abs() <= epsilon
            && (self.angular_rps - other.angular_rps).abs() <= epsilon
    }

    /// Append the 8-byte wire payload (2 × f32, big-endian).
    pub fn encode_payload(&self, dst: &mut BytesMut) {
        dst.put_f32(self.linear_mps);
        dst.put_f32(self.angular_rps);
    }

    /// Parse the 8-byte wire payload.
    pub fn decode_payload(mut payload: &[u8]) -> Result<Self> {
        if payload.len() != VELOCITY_PAYLOAD_LEN {
            return Err(FrameError::InvalidPayload {
                msg_id: VELOCITY,
                len: payload.len(),
                expected: VELOCITY_PAYLOAD_LEN,
            });
        }
        Ok(Self {
            linear_mps: payload.get_f32(),
            angular_rps: payload.get_f32(),
        })
    }

    /// Append this command to `dst` as a complete wire frame.
    pub fn encode_framed(&self, dst: &mut BytesMut) -> Result<()> {
        let mut payload = BytesMut::with_capacity(VELOCITY_PAYLOAD_LEN);
        self.encode_payload(&mut payload);
        encode_frame(VELOCITY, &payload, dst)
    }
}

impl TryFrom<&Frame> for VelocityCommand {
    type Error = FrameError;

    fn try_from(frame: &Frame) -> Result<Self> {
        if frame.msg_id != VELOCITY {
            return Err(FrameError::WrongMessage {
                msg_id: frame.msg_id,
                expected: VELOCITY,
            });
        }
        Self::decode_payload(&frame.payload)
    }
}

/// One telemetry report from the drive controller.
///
/// Field order matches the wire layout exactly: wheel targets, wheel
/// actuals, battery, accelerometer, gyro.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct Telemetry {
    pub left_target_rpm: f32,
    pub right_target_rpm: f32,
    pub left_actual_rpm: f32,
    pub right_actual_rpm: f32,
    pub battery_voltage: f32,
    pub accel_x: f32,
    pub accel_y: f32,
    pub accel_z: f32,
    pub gyro_x: f32,
    pub gyro_y: f32,
    pub gyro_z: f32,
}

impl Telemetry {
    /// Append the 44-byte wire payload (11 × f32, big-endian).
    pub fn encode_payload(&self, dst: &mut BytesMut) {
        dst.put_f32(self.left_target_rpm);
        dst.put_f32(self.right_target_rpm);
        dst.put_f32(self.left_actual_rpm);
        dst.put_f32(self.right_actual_rpm);
        dst.put_f32(self.battery_voltage);
        dst.put_f32(self.accel_x);
        dst.put_f32(self.accel_y);
        dst.put_f32(self.accel_z);
        dst.put_f32(self.gyro_x);
        dst.put_f32(self.gyro_y);
        dst.put_f32(self.gyro_z);
    }

    /// Parse the 44-byte wire payload.
    pub fn decode_payload(mut payload: &[u8]) -> Result<Self> {
        if payload.len() != TELEMETRY_PAYLOAD_LEN {
            return Err(FrameError::InvalidPayload {
                msg_id: TELEMETRY,
                len: payload.len(),
                expected: TELEMETRY_PAYLOAD_LEN,
            });
        }
        Ok(Self {
            left_target_rpm: payload.get_f32(),
            right_target_rpm: payload.get_f32(),
            left_actual_rpm: payload.get_f32(),
            right_actual_rpm: payload.get_f32(),
            battery_voltage: payload.get_f32(),
            accel_x: payload.get_f32(),
            accel_y: payload.get_f32(),
            accel_z: payload.get_f32(),
            gyro_x: payload.get_f32(),
            gyro_y: payload.get_f32(),
            gyro_z: payload.get_f32(),
        })
    }

    /// Append this report to `dst` as a complete wire frame.
    pub fn encode_framed(&self, dst: &mut BytesMut) -> Result<()> {
        let mut payload = BytesMut::with_capacity(TELEMETRY_PAYLOAD_LEN);
        self.encode_payload(&mut payload);
        encode_frame(TELEMETRY, &payload, dst)
    }
}

impl TryFrom<&Frame> for Telemetry {
    type Error = FrameError;

    fn try_from(frame: &Frame) -> Result<Self> {
        if frame.msg_id != TELEMETRY {
            return Err(FrameError::WrongMessage {
                msg_id: frame.msg_id,
                expected: TELEMETRY,
            });
        }
        Self::decode_payload(&frame.payload)
    }
}
