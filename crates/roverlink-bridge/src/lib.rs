//! Supervisory bridge between command sources and the drive controller.
//!
//! Three pieces cooperate here:
//!
//! - [`CommandArbiter`] merges concurrent teleop and autonomy commands
//!   into one winner by priority, with per-source staleness timeouts and
//!   a stop-command failsafe.
//! - [`LinkDriver`] owns the serial or TCP channel, frames outgoing
//!   commands, decodes incoming telemetry, and reconnects with backoff.
//! - [`ControlLoop`] ties them together at a fixed 50 Hz rate.
//!
//! The arbiter is shared behind an [`std::sync::Arc`]; everything else is
//! owned by the loop thread.

pub mod arbiter;
pub mod config;
pub mod control;
pub mod driver;
pub mod error;

pub use arbiter::{
    CommandArbiter, CommandSource, LinkMode, LinkStatus, SourceStatus, StateSnapshot,
    TelemetryStatus, SOURCE_PRIORITY,
};
pub use config::{ArbiterConfig, BridgeConfig, LinkConfig, LoopConfig, VelocityBounds};
pub use control::{ControlLoop, LoopHandle};
pub use driver::{LinkDriver, LinkStats};
pub use error::{LinkError, Result, SubmitError};

use std::sync::Arc;

impl BridgeConfig {
    /// Build the shared arbiter and a ready-to-spawn control loop for
    /// this configuration.
    pub fn build(self) -> (Arc<CommandArbiter>, ControlLoop) {
        let arbiter = Arc::new(CommandArbiter::new(self.arbiter));
        let driver = LinkDriver::new(self.endpoint, self.link);
        let control = ControlLoop::new(driver, Arc::clone(&arbiter), self.control);
        (arbiter, control)
    }
}
