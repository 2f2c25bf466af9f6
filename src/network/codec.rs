//! Length-prefixed framing: a 4-byte big-endian payload length followed by a
//! bincode-encoded [`Message`].

use std::io::ErrorKind;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use super::error::TransportError;
use super::message::Message;

/// Upper bound on a single payload.
pub const MAX_FRAME_LEN: usize = 8 * 1024 * 1024;

pub fn encode(message: &Message) -> Result<Vec<u8>, TransportError> {
    let payload = bincode::serialize(message).map_err(TransportError::EncodeFailed)?;
    if payload.len() > MAX_FRAME_LEN {
        return Err(TransportError::FrameTooLarge(payload.len()));
    }
    let mut frame = Vec::with_capacity(4 + payload.len());
    frame.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    frame.extend_from_slice(&payload);
    Ok(frame)
}

pub fn decode(payload: &[u8]) -> Result<Message, TransportError> {
    bincode::deserialize(payload).map_err(TransportError::DecodeFailed)
}

pub async fn write_frame<W>(writer: &mut W, message: &Message) -> Result<(), TransportError>
where
    W: AsyncWrite + Unpin,
{
    let frame = encode(message)?;
    writer
        .write_all(&frame)
        .await
        .map_err(TransportError::SendFailed)?;
    writer.flush().await.map_err(TransportError::SendFailed)
}

/// Read one frame. `Ok(None)` when the peer closed the connection before
/// sending anything.
pub async fn read_frame<R>(reader: &mut R) -> Result<Option<Message>, TransportError>
where
    R: AsyncRead + Unpin,
{
    let mut len = [0u8; 4];
    match reader.read_exact(&mut len).await {
        Ok(_) => {}
        Err(err) if err.kind() == ErrorKind::UnexpectedEof => return Ok(None),
        Err(err) => return Err(TransportError::ReceiveFailed(err)),
    }

    let len = u32::from_be_bytes(len) as usize;
    if len > MAX_FRAME_LEN {
        return Err(TransportError::FrameTooLarge(len));
    }

    let mut payload = vec![0u8; len];
    reader
        .read_exact(&mut payload)
        .await
        .map_err(TransportError::ReceiveFailed)?;
    decode(&payload).map(Some)
}
