//! Command source arbitration.
//!
//! Multiple producers (a teleop UI, an autonomy planner) submit velocity
//! commands concurrently. On every control tick the arbiter picks one
//! winner by fixed priority, demoting any source whose latest command has
//! aged past its timeout. With no fresh source the rover is commanded to
//! a stop, so a vanished operator can never leave it driving blind.
//!
//! All methods take `&self` and synchronize on an internal mutex, so one
//! arbiter can be shared between ingress threads and the control loop.

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{debug, info};

use roverlink_frame::{Telemetry, VelocityCommand};

use crate::config::ArbiterConfig;
use crate::driver::LinkStats;
use crate::error::SubmitError;

/// A producer of velocity commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CommandSource {
    Teleop,
    Autonomy,
}

impl CommandSource {
    pub fn name(&self) -> &'static str {
        match self {
            CommandSource::Teleop => "teleop",
            CommandSource::Autonomy => "autonomy",
        }
    }
}

/// Arbitration order, highest priority first. A fresh entry earlier in
/// the table always wins over anything later.
pub const SOURCE_PRIORITY: [CommandSource; 2] = [CommandSource::Teleop, CommandSource::Autonomy];

/// Who is currently steering the rover.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkMode {
    /// No fresh source. The loop is sending the stop command.
    Idle,
    Teleop,
    Autonomy,
}

impl From<CommandSource> for LinkMode {
    fn from(source: CommandSource) -> Self {
        match source {
            CommandSource::Teleop => LinkMode::Teleop,
            CommandSource::Autonomy => LinkMode::Autonomy,
        }
    }
}

impl LinkMode {
    pub fn name(&self) -> &'static str {
        match self {
            LinkMode::Idle => "idle",
            LinkMode::Teleop => "teleop",
            LinkMode::Autonomy => "autonomy",
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct SourceSlot {
    cmd: VelocityCommand,
    updated_at: Instant,
}

#[derive(Debug)]
struct State {
    teleop: Option<SourceSlot>,
    autonomy: Option<SourceSlot>,
    telemetry: Option<(Telemetry, Instant)>,
    link_connected: bool,
    link_stats: LinkStats,
    mode: LinkMode,
}

/// One source's view in a [`StateSnapshot`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SourceStatus {
    /// Latest accepted command, if the source ever submitted one.
    pub command: Option<VelocityCommand>,
    /// Seconds since the last accepted command.
    pub age_s: Option<f64>,
    /// True while the command is inside the source's timeout window.
    pub fresh: bool,
}

/// Latest telemetry in a [`StateSnapshot`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TelemetryStatus {
    pub sample: Option<Telemetry>,
    pub age_s: Option<f64>,
    /// False until a sample exists and it is younger than the staleness
    /// cutoff. UIs grey out telemetry panels on this flag.
    pub valid: bool,
}

/// Link health in a [`StateSnapshot`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LinkStatus {
    pub connected: bool,
    pub stats: LinkStats,
}

/// Point-in-time view of the whole bridge, for status endpoints and the
/// monitor UI. Taking a snapshot never changes arbitration outcomes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct StateSnapshot {
    pub mode: LinkMode,
    /// The command the loop is sending right now.
    pub command: VelocityCommand,
    pub teleop: SourceStatus,
    pub autonomy: SourceStatus,
    pub telemetry: TelemetryStatus,
    pub link: LinkStatus,
}

/// Shared arbitration state.
pub struct CommandArbiter {
    state: Mutex<State>,
    config: ArbiterConfig,
}

impl CommandArbiter {
    pub fn new(config: ArbiterConfig) -> Self {
        Self {
            state: Mutex::new(State {
                teleop: None,
                autonomy: None,
                telemetry: None,
                link_connected: false,
                link_stats: LinkStats::default(),
                mode: LinkMode::Idle,
            }),
            config,
        }
    }

    pub fn config(&self) -> &ArbiterConfig {
        &self.config
    }

    // The state holds plain data and every critical section is a handful
    // of field reads, so a poisoned mutex cannot leave it inconsistent.
    // The control loop must keep running, so recover the guard.
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Submit a command from `source`, stamped `at`. Rejects non-finite
    /// or out-of-range values without touching existing state.
    pub fn submit(
        &self,
        source: CommandSource,
        linear_mps: f32,
        angular_rps: f32,
        at: Instant,
    ) -> Result<(), SubmitError> {
        let cmd = self.validate(linear_mps, angular_rps)?;
        let mut state = self.lock();
        let slot = Some(SourceSlot {
            cmd,
            updated_at: at,
        });
        match source {
            CommandSource::Teleop => state.teleop = slot,
            CommandSource::Autonomy => state.autonomy = slot,
        }
        debug!(
            source = source.name(),
            linear_mps, angular_rps, "command accepted"
        );
        Ok(())
    }

    /// [`Self::submit`] for teleop, stamped with the current time.
    pub fn submit_teleop(&self, linear_mps: f32, angular_rps: f32) -> Result<(), SubmitError> {
        self.submit(CommandSource::Teleop, linear_mps, angular_rps, Instant::now())
    }

    /// [`Self::submit`] for autonomy, stamped with the current time.
    pub fn submit_autonomy(&self, linear_mps: f32, angular_rps: f32) -> Result<(), SubmitError> {
        self.submit(
            CommandSource::Autonomy,
            linear_mps,
            angular_rps,
            Instant::now(),
        )
    }

    /// Resolve the command to send at time `now`.
    ///
    /// Scans [`SOURCE_PRIORITY`] for the first source whose latest
    /// command has age at most its timeout. Falls back to the zero
    /// command in [`LinkMode::Idle`] when no source qualifies.
    pub fn effective_command(&self, now: Instant) -> (VelocityCommand, LinkMode) {
        let mut state = self.lock();
        self.resolve(&mut state, now)
    }

    /// Store the latest telemetry sample, stamped `at`.
    pub fn record_telemetry(&self, sample: Telemetry, at: Instant) {
        let mut state = self.lock();
        state.telemetry = Some((sample, at));
    }

    /// Record link health reported by the driver.
    pub fn record_link_status(&self, connected: bool, stats: LinkStats) {
        let mut state = self.lock();
        state.link_connected = connected;
        state.link_stats = stats;
    }

    /// Capture the full bridge state at time `now`.
    pub fn snapshot(&self, now: Instant) -> StateSnapshot {
        let mut state = self.lock();
        let (command, mode) = self.resolve(&mut state, now);

        let source_status = |slot: &Option<SourceSlot>, timeout: Duration| match slot {
            Some(slot) => {
                let age = now.saturating_duration_since(slot.updated_at);
                SourceStatus {
                    command: Some(slot.cmd),
                    age_s: Some(age.as_secs_f64()),
                    fresh: age <= timeout,
                }
            }
            None => SourceStatus {
                command: None,
                age_s: None,
                fresh: false,
            },
        };

        let telemetry = match &state.telemetry {
            Some((sample, at)) => {
                let age = now.saturating_duration_since(*at);
                TelemetryStatus {
                    sample: Some(*sample),
                    age_s: Some(age.as_secs_f64()),
                    valid: age <= self.config.telemetry_stale_after,
                }
            }
            None => TelemetryStatus {
                sample: None,
                age_s: None,
                valid: false,
            },
        };

        StateSnapshot {
            mode,
            command,
            teleop: source_status(&state.teleop, self.config.teleop_timeout),
            autonomy: source_status(&state.autonomy, self.config.autonomy_timeout),
            telemetry,
            link: LinkStatus {
                connected: state.link_connected,
                stats: state.link_stats,
            },
        }
    }

    fn validate(&self, linear_mps: f32, angular_rps: f32) -> Result<VelocityCommand, SubmitError> {
        if !linear_mps.is_finite() {
            return Err(SubmitError::NonFinite {
                field: "linear_mps",
            });
        }
        if !angular_rps.is_finite() {
            return Err(SubmitError::NonFinite {
                field: "angular_rps",
            });
        }
        let bounds = self.config.bounds;
        if linear_mps.abs() > bounds.max_linear_mps {
            return Err(SubmitError::OutOfRange {
                field: "linear_mps",
                value: linear_mps,
                limit: bounds.max_linear_mps,
            });
        }
        if angular_rps.abs() > bounds.max_angular_rps {
            return Err(SubmitError::OutOfRange {
                field: "angular_rps",
                value: angular_rps,
                limit: bounds.max_angular_rps,
            });
        }
        Ok(VelocityCommand::new(linear_mps, angular_rps))
    }

    fn resolve(&self, state: &mut State, now: Instant) -> (VelocityCommand, LinkMode) {
        let winner = SOURCE_PRIORITY.iter().find_map(|&source| {
            let (slot, timeout) = match source {
                CommandSource::Teleop => (&state.teleop, self.config.teleop_timeout),
                CommandSource::Autonomy => (&state.autonomy, self.config.autonomy_timeout),
            };
            let slot = slot.as_ref()?;
            let age = now.saturating_duration_since(slot.updated_at);
            (age <= timeout).then_some((slot.cmd, LinkMode::from(source)))
        });
        let (cmd, mode) = winner.unwrap_or((VelocityCommand::ZERO, LinkMode::Idle));
        if mode != state.mode {
            info!(
                from = state.mode.name(),
                to = mode.name(),
                "control mode changed"
            );
            state.mode = mode;
        }
        (cmd, mode)
    }
}
