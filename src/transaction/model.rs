use serde::{Deserialize, Serialize};

/// An opaque value transfer carried inside a block.
///
/// The ledger never interprets `sender` or `receiver`; they only take part in
/// the block hash.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub sender: Vec<u8>,
    pub receiver: Vec<u8>,
    pub amount: f64,
}

impl Transaction {
    pub fn new(sender: impl Into<Vec<u8>>, receiver: impl Into<Vec<u8>>, amount: f64) -> Self {
        Self {
            sender: sender.into(),
            receiver: receiver.into(),
            amount,
        }
    }

    /// Append `sender || receiver || amount` to a block hash preimage.
    /// `f64`'s `Display` is the shortest string that parses back to the same value.
    pub fn write_preimage(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&self.sender);
        buf.extend_from_slice(&self.receiver);
        buf.extend_from_slice(self.amount.to_string().as_bytes());
    }
}
