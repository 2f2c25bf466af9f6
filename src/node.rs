//! Peer-to-peer node: accepts framed messages, routes them to the sync and
//! handshake handlers, and drives outbound exchanges.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::blockchain::{Block, Blockchain};
use crate::config::NodeConfig;
use crate::network::{
    BlockMessage, Message, NodeMessage, Outbound, PeerRegistry, SyncHandler, TcpTransport,
};

/// Upper bound on request/reply rounds within one outbound exchange.
const MAX_EXCHANGE_ROUNDS: usize = 128;

pub struct Node {
    address: String,
    chain: Arc<Blockchain>,
    peers: Arc<PeerRegistry>,
    sync: SyncHandler,
    transport: TcpTransport,
    broadcast_interval: Duration,
    fanout: usize,
}

impl Node {
    pub fn new(config: &NodeConfig, chain: Arc<Blockchain>) -> Self {
        let address = config.node_address.clone();
        Self {
            peers: Arc::new(PeerRegistry::new(address.clone())),
            sync: SyncHandler::new(chain.clone(), address.clone()),
            transport: TcpTransport::new(config.network_timeout),
            broadcast_interval: config.broadcast_interval,
            fanout: config.broadcast_fanout,
            address,
            chain,
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn chain(&self) -> &Arc<Blockchain> {
        &self.chain
    }

    pub fn peers(&self) -> &Arc<PeerRegistry> {
        &self.peers
    }

    /// Route an inbound message to its handler.
    pub fn dispatch(&self, message: Message) -> Option<Outbound> {
        match message {
            Message::Block(msg) => self.sync.handle(msg),
            Message::Node(msg) => self.peers.handle(msg),
        }
    }

    /// Accept connections until shutdown; each connection gets its own task.
    pub async fn serve(self: Arc<Self>, listener: TcpListener, mut shutdown: watch::Receiver<bool>) {
        info!("peer listener on {}", self.address);
        loop {
            tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok((stream, remote)) => {
                        let node = self.clone();
                        tokio::spawn(async move { node.handle_connection(stream, remote).await });
                    }
                    Err(err) => warn!("accept failed: {err}"),
                },
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        info!("peer listener on {} stopped", self.address);
    }

    async fn handle_connection(&self, mut stream: TcpStream, remote: SocketAddr) {
        let message = match self.transport.receive(&mut stream).await {
            Ok(Some(message)) => message,
            Ok(None) => return,
            Err(err) => {
                warn!("dropping message from {remote}: {err}");
                return;
            }
        };
        debug!("{} from {remote}", message.kind());

        match self.dispatch(message) {
            Some(Outbound::Reply(reply)) => {
                if let Err(err) = self.transport.send(&mut stream, &reply).await {
                    warn!("reply {} to {remote} failed: {err}", reply.kind());
                }
            }
            Some(Outbound::Forward { address, message }) => {
                // Release the requester before dialing out.
                drop(stream);
                self.exchange(&address, message).await;
            }
            None => {}
        }
    }

    /// Deliver `message` to `address` and keep the conversation going for as
    /// long as replies produce more work.
    ///
    /// A reply is dispatched locally; a resulting reply goes back to the same
    /// peer and a forward switches to the new target. When a pushed block
    /// makes the peer ask for its parent, the block is parked and pushed again
    /// once the peer has caught up with its ancestors.
    pub async fn exchange(&self, address: &str, message: Message) {
        let mut target = address.to_string();
        let mut message = message;
        let mut parked: Vec<Message> = Vec::new();

        for _ in 0..MAX_EXCHANGE_ROUNDS {
            let sent = if message.expects_reply() {
                self.transport.request(&target, &message).await
            } else {
                self.transport.send_to(&target, &message).await.map(|()| None)
            };
            let reply = match sent {
                Ok(reply) => reply,
                Err(err) => {
                    warn!("{} to {target} failed: {err}", message.kind());
                    return;
                }
            };

            let asks_for_parent = matches!(
                reply,
                Some(Message::Block(BlockMessage::GetBlockRequest { .. }))
            );
            if asks_for_parent && matches!(message, Message::Block(BlockMessage::BlockResponse { .. })) {
                parked.push(message.clone());
            }

            match reply.and_then(|reply| self.dispatch(reply)) {
                Some(Outbound::Reply(next)) => message = next,
                Some(Outbound::Forward { address, message: next }) => {
                    parked.clear();
                    target = address;
                    message = next;
                }
                None => match parked.pop() {
                    Some(next) => message = next,
                    None => return,
                },
            }
        }
        warn!("exchange with {target} cut off after {MAX_EXCHANGE_ROUNDS} rounds");
    }

    /// Handshake with the bootstrap peer: register it and learn its peers.
    pub async fn join(&self, bootstrap: &str) {
        if bootstrap == self.address {
            return;
        }
        self.peers.add(bootstrap);
        info!("joining network via {bootstrap}");
        let welcome = NodeMessage::WelcomeRequest {
            sender_address: self.address.clone(),
        };
        self.exchange(bootstrap, welcome.into()).await;
        info!("known peers after join: {}", self.peers.len());
    }

    /// Ask `peer` for every block after our latest one.
    pub async fn request_sync(&self, peer: &str) {
        let request = BlockMessage::BlockchainSyncRequest {
            hash: self.chain.get_latest_block().hash(),
            sender_address: self.address.clone(),
        };
        self.exchange(peer, request.into()).await;
    }

    /// Push `block` to a random subset of peers, one task per peer.
    pub fn push_block(self: &Arc<Self>, block: Block) -> Vec<JoinHandle<()>> {
        let targets = self.peers.random_subset(self.fanout);
        debug!("pushing block #{} to {} peers", block.index, targets.len());
        targets
            .into_iter()
            .map(|peer| {
                let node = self.clone();
                let message: Message = BlockMessage::BlockResponse {
                    block: block.clone(),
                }
                .into();
                tokio::spawn(async move { node.exchange(&peer, message).await })
            })
            .collect()
    }

    pub fn broadcast_latest_block(self: &Arc<Self>) -> Vec<JoinHandle<()>> {
        self.push_block(self.chain.get_latest_block())
    }

    /// Periodic gossip of the latest block plus immediate pushes of
    /// checkpoints announced by the miner.
    pub fn spawn_broadcaster(
        self: Arc<Self>,
        mut announcements: mpsc::UnboundedReceiver<Block>,
        mut shutdown: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.broadcast_interval);
            // The first tick completes immediately.
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if self.peers.is_empty() {
                            debug!("no peers to gossip with");
                        } else {
                            self.broadcast_latest_block();
                        }
                    }
                    Some(block) = announcements.recv() => {
                        info!("announcing checkpoint #{} {}", block.index, block.hash());
                        self.push_block(block);
                    }
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                }
            }
            debug!("broadcaster stopped");
        })
    }
}
