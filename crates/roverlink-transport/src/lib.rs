//! Byte-channel transports for the rover control link.
//!
//! The control loop talks to the drive controller through [`LinkStream`], a
//! duplex channel with non-blocking reads. Three implementations:
//!
//! - [`SerialLink`] — the UART on real hardware
//! - [`TcpLink`] — ser2net-style bench rigs and loopback test rigs
//! - [`MemoryLink`] — in-process pair for unit and integration tests
//!
//! [`LinkEndpoint`] parses the operator-facing endpoint string and opens the
//! right implementation.

pub mod endpoint;
pub mod error;
pub mod mem;
pub mod serial;
pub mod tcp;
pub mod traits;

pub use endpoint::LinkEndpoint;
pub use error::{Result, TransportError};
pub use mem::MemoryLink;
pub use serial::SerialLink;
pub use tcp::TcpLink;
pub use traits::LinkStream;
