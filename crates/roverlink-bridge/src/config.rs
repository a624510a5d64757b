//! Configuration for the bridge components.
//!
//! Defaults match the reference rover hardware (115200 baud UART, 50 Hz
//! control rate). Every knob can be overridden before the bridge is built.

use std::time::Duration;

use roverlink_frame::{DecoderConfig, VelocityCommand};
use roverlink_transport::LinkEndpoint;

/// Symmetric velocity limits applied to every outgoing command.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VelocityBounds {
    pub max_linear_mps: f32,
    pub max_angular_rps: f32,
}

impl Default for VelocityBounds {
    fn default() -> Self {
        Self {
            max_linear_mps: 0.6,
            max_angular_rps: 2.0,
        }
    }
}

impl VelocityBounds {
    /// Clamp both components into `[-max, max]`.
    pub fn clamp(&self, cmd: VelocityCommand) -> VelocityCommand {
        VelocityCommand {
            linear_mps: cmd.linear_mps.clamp(-self.max_linear_mps, self.max_linear_mps),
            angular_rps: cmd.angular_rps.clamp(-self.max_angular_rps, self.max_angular_rps),
        }
    }

    /// True when both components are finite and within the limits.
    pub fn contains(&self, cmd: &VelocityCommand) -> bool {
        cmd.is_finite()
            && cmd.linear_mps.abs() <= self.max_linear_mps
            && cmd.angular_rps.abs() <= self.max_angular_rps
    }
}

/// Arbitration timing.
#[derive(Debug, Clone, Copy)]
pub struct ArbiterConfig {
    /// A teleop command older than this stops steering the rover.
    pub teleop_timeout: Duration,
    /// Same cutoff for the autonomy planner, which updates less often.
    pub autonomy_timeout: Duration,
    /// Commands outside these limits are rejected at submission.
    pub bounds: VelocityBounds,
    /// Telemetry older than this is reported as invalid in snapshots.
    pub telemetry_stale_after: Duration,
}

impl Default for ArbiterConfig {
    fn default() -> Self {
        Self {
            teleop_timeout: Duration::from_millis(500),
            autonomy_timeout: Duration::from_millis(1000),
            bounds: VelocityBounds::default(),
            telemetry_stale_after: Duration::from_millis(1000),
        }
    }
}

/// Link driver tuning.
#[derive(Debug, Clone)]
pub struct LinkConfig {
    /// Serial baud rate. Ignored by TCP endpoints.
    pub baud: u32,
    /// Delay before the first reconnect attempt after a failure.
    pub reconnect_initial: Duration,
    /// Backoff ceiling. Doubling stops here.
    pub reconnect_max: Duration,
    /// Outgoing commands are clamped into these limits before encoding.
    pub bounds: VelocityBounds,
    pub decoder: DecoderConfig,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            baud: 115_200,
            reconnect_initial: Duration::from_secs(1),
            reconnect_max: Duration::from_secs(8),
            bounds: VelocityBounds::default(),
            decoder: DecoderConfig::default(),
        }
    }
}

/// Control loop timing.
#[derive(Debug, Clone, Copy)]
pub struct LoopConfig {
    /// Tick period. 20 ms gives the 50 Hz rate the firmware expects.
    pub tick_period: Duration,
    /// Maximum silence between sends while the command is unchanged.
    pub heartbeat_interval: Duration,
    /// Component deltas at or below this do not count as a change.
    pub command_epsilon: f32,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            tick_period: Duration::from_millis(20),
            heartbeat_interval: Duration::from_millis(50),
            command_epsilon: 1e-4,
        }
    }
}

/// Everything needed to stand up a bridge against one endpoint.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    pub endpoint: LinkEndpoint,
    pub link: LinkConfig,
    pub arbiter: ArbiterConfig,
    pub control: LoopConfig,
}

impl BridgeConfig {
    pub fn new(endpoint: LinkEndpoint) -> Self {
        Self {
            endpoint,
            link: LinkConfig::default(),
            arbiter: ArbiterConfig::default(),
            control: LoopConfig::default(),
        }
    }

    /// Apply one limit set to both the submission check and the wire clamp.
    pub fn with_bounds(mut self, bounds: VelocityBounds) -> Self {
        self.link.bounds = bounds;
        self.arbiter.bounds = bounds;
        self
    }
}
