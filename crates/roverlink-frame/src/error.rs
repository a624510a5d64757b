/// Errors that can occur during frame encoding/decoding.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The message id is not in the wire-format table.
    #[error("unknown message id 0x{0:02X}")]
    UnknownMsgId(u8),

    /// The payload length does not match the fixed length for the message id.
    #[error("invalid payload for message 0x{msg_id:02X} ({len} bytes, expected {expected})")]
    InvalidPayload {
        msg_id: u8,
        len: usize,
        expected: usize,
    },

    /// The frame carries a different message than the caller asked for.
    #[error("unexpected message 0x{msg_id:02X}, expected 0x{expected:02X}")]
    WrongMessage { msg_id: u8, expected: u8 },
}

pub type Result<T> = std::result::Result<T, FrameError>;
