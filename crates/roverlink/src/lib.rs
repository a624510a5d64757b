//! Host-side link stack for small differential-drive rovers.
//!
//! roverlink talks a compact framed binary protocol to a motor
//! controller over UART or TCP: velocity commands out, telemetry back.
//! Multiple command sources are merged by priority with staleness
//! timeouts, and a lost operator always degrades to a stop command.
//!
//! # Crate Structure
//!
//! - [`transport`] — Byte channels (serial port, TCP) behind one trait
//! - [`frame`] — Wire codec: sync-delimited frames with checksums
//! - [`bridge`] — Arbitration, link driver, and the 50 Hz control loop

/// Re-export transport types.
pub mod transport {
    pub use roverlink_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use roverlink_frame::*;
}

/// Re-export bridge types.
pub mod bridge {
    pub use roverlink_bridge::*;
}
