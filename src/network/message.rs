use serde::{Deserialize, Serialize};

use crate::blockchain::Block;

/// Top-level wire envelope. One envelope travels per framed payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Message {
    Block(BlockMessage),
    Node(NodeMessage),
}

/// Block propagation and chain synchronization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum BlockMessage {
    GetLatestBlockRequest,
    GetBlockRequest { hash: String },
    BlockResponse { block: Block },
    BlockchainSyncRequest { hash: String, sender_address: String },
    BlocksResponse { blocks: Vec<Block> },
}

/// Peer discovery handshake.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum NodeMessage {
    WelcomeRequest { sender_address: String },
    WelcomeResponse { peers: Vec<String> },
}

impl Message {
    /// Short name for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Message::Block(BlockMessage::GetLatestBlockRequest) => "GetLatestBlockRequest",
            Message::Block(BlockMessage::GetBlockRequest { .. }) => "GetBlockRequest",
            Message::Block(BlockMessage::BlockResponse { .. }) => "BlockResponse",
            Message::Block(BlockMessage::BlockchainSyncRequest { .. }) => "BlockchainSyncRequest",
            Message::Block(BlockMessage::BlocksResponse { .. }) => "BlocksResponse",
            Message::Node(NodeMessage::WelcomeRequest { .. }) => "WelcomeRequest",
            Message::Node(NodeMessage::WelcomeResponse { .. }) => "WelcomeResponse",
        }
    }
}

impl Message {
    /// False for messages whose handlers never answer; those are delivered
    /// without waiting on the connection.
    pub fn expects_reply(&self) -> bool {
        !matches!(
            self,
            Message::Block(BlockMessage::BlocksResponse { .. })
                | Message::Node(NodeMessage::WelcomeResponse { .. })
        )
    }
}

impl From<BlockMessage> for Message {
    fn from(msg: BlockMessage) -> Self {
        Message::Block(msg)
    }
}

impl From<NodeMessage> for Message {
    fn from(msg: NodeMessage) -> Self {
        Message::Node(msg)
    }
}

/// What a handler wants sent after processing an inbound message.
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    /// Write back on the connection the request arrived on.
    Reply(Message),
    /// Dial `address` and deliver there.
    Forward { address: String, message: Message },
}

impl Outbound {
    pub fn reply(msg: impl Into<Message>) -> Self {
        Outbound::Reply(msg.into())
    }

    pub fn forward(address: impl Into<String>, msg: impl Into<Message>) -> Self {
        Outbound::Forward {
            address: address.into(),
            message: msg.into(),
        }
    }
}
