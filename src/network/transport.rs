use std::future::Future;
use std::time::Duration;

use log::debug;
use tokio::net::TcpStream;
use tokio::time::timeout;

use super::codec::{read_frame, write_frame};
use super::error::TransportError;
use super::message::Message;

/// One-shot TCP delivery. Every operation is bounded by `timeout`, so a stalled
/// peer never blocks the caller for longer than that.
#[derive(Debug, Clone)]
pub struct TcpTransport {
    timeout: Duration,
}

impl TcpTransport {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    async fn bounded<T>(
        &self,
        address: &str,
        op: impl Future<Output = Result<T, TransportError>>,
    ) -> Result<T, TransportError> {
        timeout(self.timeout, op)
            .await
            .map_err(|_| TransportError::Timeout(address.to_string()))?
    }

    async fn dial(&self, address: &str) -> Result<TcpStream, TransportError> {
        self.bounded(address, async {
            TcpStream::connect(address)
                .await
                .map_err(|source| TransportError::DialFailed {
                    address: address.to_string(),
                    source,
                })
        })
        .await
    }

    /// Write one message on an already open connection.
    pub async fn send(&self, stream: &mut TcpStream, message: &Message) -> Result<(), TransportError> {
        let peer = peer_label(stream);
        self.bounded(&peer, write_frame(stream, message)).await
    }

    /// Read one message from an open connection; `None` if the peer hung up.
    pub async fn receive(&self, stream: &mut TcpStream) -> Result<Option<Message>, TransportError> {
        let peer = peer_label(stream);
        self.bounded(&peer, read_frame(stream)).await
    }

    /// Dial `address` and deliver `message` without waiting for an answer.
    pub async fn send_to(&self, address: &str, message: &Message) -> Result<(), TransportError> {
        let mut stream = self.dial(address).await?;
        self.send(&mut stream, message).await?;
        debug!("sent {} to {address}", message.kind());
        Ok(())
    }

    /// Dial `address`, deliver `message` and wait for at most one reply on the
    /// same connection.
    pub async fn request(
        &self,
        address: &str,
        message: &Message,
    ) -> Result<Option<Message>, TransportError> {
        let mut stream = self.dial(address).await?;
        self.send(&mut stream, message).await?;
        let reply = self.receive(&mut stream).await?;
        debug!(
            "{} to {address} answered with {}",
            message.kind(),
            reply.as_ref().map_or("nothing", Message::kind)
        );
        Ok(reply)
    }
}

fn peer_label(stream: &TcpStream) -> String {
    stream
        .peer_addr()
        .map(|addr| addr.to_string())
        .unwrap_or_else(|_| "unknown peer".to_string())
}
