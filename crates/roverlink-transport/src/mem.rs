use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};

use crate::error::{Result, TransportError};
use crate::traits::LinkStream;

#[derive(Debug, Default)]
struct Pipe {
    buf: VecDeque<u8>,
    closed: bool,
}

/// In-process loopback link.
///
/// [`MemoryLink::pair`] returns two connected ends; bytes written to one are
/// read from the other. Dropping an end surfaces `Closed` on its peer once
/// the buffered bytes are drained. Test rigs use the far end to stand in for
/// the drive controller.
#[derive(Debug)]
pub struct MemoryLink {
    rx: Arc<Mutex<Pipe>>,
    tx: Arc<Mutex<Pipe>>,
}

impl MemoryLink {
    /// Create a connected pair of links.
    pub fn pair() -> (MemoryLink, MemoryLink) {
        let a = Arc::new(Mutex::new(Pipe::default()));
        let b = Arc::new(Mutex::new(Pipe::default()));
        (
            MemoryLink {
                rx: Arc::clone(&a),
                tx: Arc::clone(&b),
            },
            MemoryLink { rx: b, tx: a },
        )
    }

    /// Bytes written by the peer and not yet read.
    pub fn pending(&self) -> usize {
        lock(&self.rx).buf.len()
    }
}

// The pipes hold plain bytes; a panicking peer cannot leave them in a state
// worth refusing to read.
fn lock(pipe: &Mutex<Pipe>) -> std::sync::MutexGuard<'_, Pipe> {
    pipe.lock().unwrap_or_else(PoisonError::into_inner)
}

impl LinkStream for MemoryLink {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let mut rx = lock(&self.rx);
        if rx.buf.is_empty() {
            return if rx.closed {
                Err(TransportError::Closed)
            } else {
                Ok(0)
            };
        }
        let n = buf.len().min(rx.buf.len());
        for slot in buf.iter_mut().take(n) {
            *slot = rx.buf.pop_front().unwrap_or_default();
        }
        Ok(n)
    }

    fn write_all(&mut self, buf: &[u8]) -> Result<()> {
        let mut tx = lock(&self.tx);
        if tx.closed {
            return Err(TransportError::Closed);
        }
        tx.buf.extend(buf);
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}

impl Drop for MemoryLink {
    fn drop(&mut self) {
        lock(&self.rx).closed = true;
        lock(&self.tx).closed = true;
    }
}
