use std::io::{ErrorKind, Read, Write};
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::time::{Duration, Instant};

use tracing::info;

use crate::error::{Result, TransportError};
use crate::traits::LinkStream;

/// TCP byte-stream link.
///
/// Covers bench rigs that expose the controller UART through a ser2net-style
/// raw TCP bridge, and the loopback rigs used in tests. The socket runs in
/// non-blocking mode; frames are tiny, so Nagle stays off.
pub struct TcpLink {
    stream: TcpStream,
    peer: SocketAddr,
}

impl TcpLink {
    const CONNECT_TIMEOUT: Duration = Duration::from_secs(2);
    /// Upper bound on one `write_all`; the control loop must never stall a
    /// full tick behind a congested socket.
    const WRITE_TIMEOUT: Duration = Duration::from_millis(50);

    /// Connect to `addr` (`host:port`).
    pub fn connect(addr: &str) -> Result<Self> {
        let peer = addr
            .to_socket_addrs()
            .map_err(|e| TransportError::Connect {
                addr: addr.to_string(),
                source: e,
            })?
            .next()
            .ok_or_else(|| TransportError::InvalidEndpoint {
                endpoint: addr.to_string(),
                reason: "no address resolved".to_string(),
            })?;

        let stream = TcpStream::connect_timeout(&peer, Self::CONNECT_TIMEOUT).map_err(|e| {
            TransportError::Connect {
                addr: addr.to_string(),
                source: e,
            }
        })?;
        stream.set_nodelay(true)?;
        stream.set_nonblocking(true)?;

        info!(%peer, "tcp link open");

        Ok(Self { stream, peer })
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }
}

impl LinkStream for TcpLink {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        match self.stream.read(buf) {
            // EOF on TCP means the peer is gone, unlike the idle Ok(0).
            Ok(0) => Err(TransportError::Closed),
            Ok(n) => Ok(n),
            Err(e) if e.kind() == ErrorKind::WouldBlock => Ok(0),
            Err(e) if e.kind() == ErrorKind::Interrupted => Ok(0),
            Err(e) => Err(e.into()),
        }
    }

    fn write_all(&mut self, buf: &[u8]) -> Result<()> {
        let deadline = Instant::now() + Self::WRITE_TIMEOUT;
        let mut written = 0;
        while written < buf.len() {
            match self.stream.write(&buf[written..]) {
                Ok(0) => return Err(TransportError::Closed),
                Ok(n) => written += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) if e.kind() == ErrorKind::WouldBlock => {
                    if Instant::now() >= deadline {
                        return Err(e.into());
                    }
                    std::thread::sleep(Duration::from_micros(200));
                }
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.stream.flush()?;
        Ok(())
    }
}

impl std::fmt::Debug for TcpLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TcpLink").field("peer", &self.peer).finish()
    }
}
