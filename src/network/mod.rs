pub mod codec;
pub mod error;
pub mod message;
pub mod peers;
pub mod sync;
pub mod transport;

pub use message::{BlockMessage, Message, NodeMessage, Outbound};
pub use peers::PeerRegistry;
pub use sync::SyncHandler;
pub use transport::TcpTransport;
