use crate::error::Result;

/// A connected duplex byte channel to the drive controller.
///
/// Reads never wait for data: `read` returns `Ok(0)` when the channel is
/// idle, so a caller on a fixed tick can drain whatever has arrived and move
/// on. Writes push the whole buffer within a short bounded time or fail.
/// `TransportError::Closed` from either direction means the link is gone and
/// must be reopened.
pub trait LinkStream: Send {
    /// Read pending bytes, up to `buf.len()`. `Ok(0)` means nothing is
    /// currently available, not end of stream.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize>;

    /// Write the whole buffer.
    fn write_all(&mut self, buf: &[u8]) -> Result<()>;

    /// Push any transport-level buffering toward the device.
    fn flush(&mut self) -> Result<()>;
}
