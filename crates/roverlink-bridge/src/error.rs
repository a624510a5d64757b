use roverlink_frame::FrameError;
use roverlink_transport::TransportError;

/// Errors surfaced by the link driver.
#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    /// No channel is open right now. The driver keeps retrying in the
    /// background; callers should treat this as transient.
    #[error("link not connected")]
    NotConnected,

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Frame(#[from] FrameError),
}

pub type Result<T> = std::result::Result<T, LinkError>;

/// Why a submitted command was refused. Rejected submissions leave the
/// arbiter state untouched.
#[derive(Debug, Clone, Copy, PartialEq, thiserror::Error)]
pub enum SubmitError {
    #[error("{field} is not a finite number")]
    NonFinite { field: &'static str },

    #[error("{field} {value} exceeds limit {limit}")]
    OutOfRange {
        field: &'static str,
        value: f32,
        limit: f32,
    },
}
