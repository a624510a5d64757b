use std::fmt;
use std::str::FromStr;

use crate::error::{Result, TransportError};
use crate::serial::SerialLink;
use crate::tcp::TcpLink;
use crate::traits::LinkStream;

/// Where the drive controller is reachable.
///
/// Parsed from `serial:<device>`, `tcp:<host>:<port>`, or a bare absolute
/// device path (treated as serial).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEndpoint {
    Serial { device: String },
    Tcp { addr: String },
}

impl LinkEndpoint {
    /// Open the endpoint. `baud` applies to serial endpoints only.
    pub fn open(&self, baud: u32) -> Result<Box<dyn LinkStream>> {
        match self {
            Self::Serial { device } => Ok(Box::new(SerialLink::open(device, baud)?)),
            Self::Tcp { addr } => Ok(Box::new(TcpLink::connect(addr)?)),
        }
    }
}

impl FromStr for LinkEndpoint {
    type Err = TransportError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = |reason: &str| TransportError::InvalidEndpoint {
            endpoint: s.to_string(),
            reason: reason.to_string(),
        };

        if let Some(device) = s.strip_prefix("serial:") {
            if device.is_empty() {
                return Err(invalid("missing device path"));
            }
            return Ok(Self::Serial {
                device: device.to_string(),
            });
        }
        if let Some(addr) = s.strip_prefix("tcp:") {
            if !addr.contains(':') {
                return Err(invalid("expected tcp:<host>:<port>"));
            }
            return Ok(Self::Tcp {
                addr: addr.to_string(),
            });
        }
        if s.starts_with('/') {
            return Ok(Self::Serial {
                device: s.to_string(),
            });
        }
        Err(invalid(
            "expected serial:<device>, tcp:<host>:<port>, or an absolute device path",
        ))
    }
}

impl fmt::Display for LinkEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Serial { device } => write!(f, "serial:{device}"),
            Self::Tcp { addr } => write!(f, "tcp:{addr}"),
        }
    }
}
