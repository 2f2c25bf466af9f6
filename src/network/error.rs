//! Transport errors. Outbound failures are expected while peers come and go;
//! callers log them and move on.

use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to dial {address}: {source}")]
    DialFailed { address: String, source: io::Error },

    #[error("timed out talking to {0}")]
    Timeout(String),

    #[error("failed to encode message: {0}")]
    EncodeFailed(bincode::Error),

    #[error("failed to decode message: {0}")]
    DecodeFailed(bincode::Error),

    #[error("frame of {0} bytes exceeds the limit")]
    FrameTooLarge(usize),

    #[error("failed to send: {0}")]
    SendFailed(io::Error),

    #[error("failed to receive: {0}")]
    ReceiveFailed(io::Error),
}
