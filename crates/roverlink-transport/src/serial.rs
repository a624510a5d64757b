use std::io::{Read, Write};
use std::time::Duration;

use tracing::info;

use crate::error::{Result, TransportError};
use crate::traits::LinkStream;

/// Serial-port link to the drive controller (8N1, no flow control).
pub struct SerialLink {
    port: Box<dyn serialport::SerialPort>,
    device: String,
}

impl SerialLink {
    /// Port read timeout. Near zero so `read` returns whatever the UART has
    /// buffered without eating into the control loop's tick budget.
    const READ_TIMEOUT: Duration = Duration::from_micros(100);

    /// Open `device` at `baud`.
    pub fn open(device: &str, baud: u32) -> Result<Self> {
        let port = serialport::new(device, baud)
            .data_bits(serialport::DataBits::Eight)
            .parity(serialport::Parity::None)
            .stop_bits(serialport::StopBits::One)
            .flow_control(serialport::FlowControl::None)
            .timeout(Self::READ_TIMEOUT)
            .open()
            .map_err(|e| TransportError::Serial {
                device: device.to_string(),
                source: e,
            })?;

        info!(device, baud, "serial link open");

        Ok(Self {
            port,
            device: device.to_string(),
        })
    }

    pub fn device(&self) -> &str {
        &self.device
    }
}

impl LinkStream for SerialLink {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        match self.port.read(buf) {
            Ok(n) => Ok(n),
            // The port timeout expiring is the idle case.
            Err(e) if e.kind() == std::io::ErrorKind::TimedOut => Ok(0),
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => Ok(0),
            Err(e) => Err(e.into()),
        }
    }

    fn write_all(&mut self, buf: &[u8]) -> Result<()> {
        self.port.write_all(buf)?;
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.port.flush()?;
        Ok(())
    }
}

impl std::fmt::Debug for SerialLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialLink")
            .field("device", &self.device)
            .finish()
    }
}
