/// Errors that can occur opening or using a link transport.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The endpoint string could not be parsed.
    #[error("invalid endpoint {endpoint:?}: {reason}")]
    InvalidEndpoint { endpoint: String, reason: String },

    /// Failed to open the serial device.
    #[error("failed to open serial device {device}: {source}")]
    Serial {
        device: String,
        source: serialport::Error,
    },

    /// Failed to connect to a TCP endpoint.
    #[error("failed to connect to {addr}: {source}")]
    Connect {
        addr: String,
        source: std::io::Error,
    },

    /// An I/O error occurred on the stream.
    #[error("link I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The remote side closed the stream.
    #[error("connection closed by peer")]
    Closed,
}

pub type Result<T> = std::result::Result<T, TransportError>;
