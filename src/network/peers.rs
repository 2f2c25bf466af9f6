use std::sync::Mutex;

use log::{debug, info};
use rand::seq::SliceRandom;

use super::message::{NodeMessage, Outbound};

/// Known peer addresses, deduplicated by exact equality, in discovery order.
/// The node's own address is never stored.
#[derive(Debug)]
pub struct PeerRegistry {
    own_address: String,
    peers: Mutex<Vec<String>>,
}

impl PeerRegistry {
    pub fn new(own_address: impl Into<String>) -> Self {
        Self {
            own_address: own_address.into(),
            peers: Mutex::new(Vec::new()),
        }
    }

    /// Register `address` unless it is empty, our own, or already known.
    /// Returns true if it was added.
    pub fn add(&self, address: &str) -> bool {
        if address.is_empty() || address == self.own_address {
            return false;
        }
        // Check and append under one lock so concurrent handshakes cannot
        // register the same address twice.
        let mut peers = self.peers.lock().expect("mutex poisoned");
        if peers.iter().any(|p| p == address) {
            return false;
        }
        peers.push(address.to_string());
        info!("registered peer {address}");
        true
    }

    /// Add every address; returns how many were new.
    pub fn merge<'a>(&self, addresses: impl IntoIterator<Item = &'a str>) -> usize {
        addresses.into_iter().filter(|a| self.add(a)).count()
    }

    pub fn all(&self) -> Vec<String> {
        self.peers.lock().expect("mutex poisoned").clone()
    }

    #[cfg(test)]
    pub fn contains(&self, address: &str) -> bool {
        self.peers
            .lock()
            .expect("mutex poisoned")
            .iter()
            .any(|p| p == address)
    }

    pub fn len(&self) -> usize {
        self.peers.lock().expect("mutex poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Up to `count` distinct peers picked uniformly at random.
    pub fn random_subset(&self, count: usize) -> Vec<String> {
        let peers = self.peers.lock().expect("mutex poisoned");
        peers
            .choose_multiple(&mut rand::thread_rng(), count)
            .cloned()
            .collect()
    }

    /// Handshake handler.
    pub fn handle(&self, message: NodeMessage) -> Option<Outbound> {
        match message {
            NodeMessage::WelcomeRequest { sender_address } => {
                self.add(&sender_address);
                Some(Outbound::reply(NodeMessage::WelcomeResponse { peers: self.all() }))
            }
            NodeMessage::WelcomeResponse { peers } => {
                let added = self.merge(peers.iter().map(String::as_str));
                debug!("welcome response: {} peers, {added} new", peers.len());
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::message::Message;

    #[test]
    fn repeated_welcome_registers_sender_once() {
        let registry = PeerRegistry::new("127.0.0.1:3000");
        let request = NodeMessage::WelcomeRequest {
            sender_address: "127.0.0.1:3001".into(),
        };

        let first = registry.handle(request.clone());
        let second = registry.handle(request);

        assert_eq!(registry.all(), vec!["127.0.0.1:3001".to_string()]);
        let expected = Some(Outbound::Reply(Message::Node(NodeMessage::WelcomeResponse {
            peers: vec!["127.0.0.1:3001".into()],
        })));
        assert_eq!(first, expected);
        assert_eq!(second, expected);
    }

    #[test]
    fn welcome_response_merges_without_duplicates_or_self() {
        let registry = PeerRegistry::new("a:1");
        registry.add("b:2");
        let outbound = registry.handle(NodeMessage::WelcomeResponse {
            peers: vec!["a:1".into(), "b:2".into(), "c:3".into(), "c:3".into(), "".into()],
        });
        assert_eq!(outbound, None);
        assert_eq!(registry.all(), vec!["b:2".to_string(), "c:3".to_string()]);
        assert!(!registry.contains("a:1"));
    }

    #[test]
    fn random_subset_is_bounded_and_distinct() {
        let registry = PeerRegistry::new("self:0");
        for port in 1..=5 {
            registry.add(&format!("peer:{port}"));
        }
        let mut picked = registry.random_subset(3);
        assert_eq!(picked.len(), 3);
        picked.sort();
        picked.dedup();
        assert_eq!(picked.len(), 3);
        assert!(picked.iter().all(|p| registry.contains(p)));
        assert_eq!(registry.random_subset(10).len(), 5);
        assert!(PeerRegistry::new("x:0").random_subset(3).is_empty());
    }

    #[test]
    fn concurrent_adds_of_same_address_keep_one() {
        let registry = std::sync::Arc::new(PeerRegistry::new("self:0"));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = registry.clone();
                std::thread::spawn(move || registry.add("peer:1"))
            })
            .collect();
        let added = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|added| *added)
            .count();
        assert_eq!(added, 1);
        assert_eq!(registry.len(), 1);
    }
}
