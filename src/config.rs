use std::env;
use std::time::Duration;

use crate::blockchain::ForkPolicy;

/// Node settings, read from the environment (optionally seeded by `.env`).
#[derive(Debug, Clone, PartialEq)]
pub struct NodeConfig {
    /// HTTP status API bind host.
    pub host: String,
    /// HTTP status API port.
    pub port: u16,
    /// Peer protocol listen address; also the address announced to peers.
    pub node_address: String,
    pub bootstrap_address: Option<String>,
    pub mining_enabled: bool,
    pub mine_interval: Duration,
    pub broadcast_interval: Duration,
    pub broadcast_fanout: usize,
    pub network_timeout: Duration,
    pub fork_policy: ForkPolicy,
    /// Pins the genesis timestamp so that independently started nodes share a root.
    pub genesis_timestamp: Option<u64>,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            node_address: "127.0.0.1:3000".to_string(),
            bootstrap_address: None,
            mining_enabled: true,
            mine_interval: Duration::from_secs(10),
            broadcast_interval: Duration::from_secs(5),
            broadcast_fanout: 3,
            network_timeout: Duration::from_millis(5000),
            fork_policy: ForkPolicy::AllowForks,
            genesis_timestamp: None,
        }
    }
}

impl NodeConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from an arbitrary key lookup. Missing or unparsable values fall
    /// back to the defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let parsed = |key: &str| lookup(key).and_then(|v| v.trim().parse::<u64>().ok());
        let text = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        Self {
            host: text("HOST").unwrap_or(defaults.host),
            port: lookup("PORT")
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(defaults.port),
            node_address: text("NODE_ADDRESS").unwrap_or(defaults.node_address),
            bootstrap_address: text("BOOTSTRAP_ADDRESS"),
            mining_enabled: lookup("MINING_ENABLED")
                .and_then(|v| parse_bool(&v))
                .unwrap_or(defaults.mining_enabled),
            mine_interval: parsed("MINE_INTERVAL_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.mine_interval),
            broadcast_interval: parsed("BROADCAST_INTERVAL_SECS")
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs)
                .unwrap_or(defaults.broadcast_interval),
            broadcast_fanout: parsed("BROADCAST_FANOUT")
                .map(|n| n as usize)
                .unwrap_or(defaults.broadcast_fanout),
            network_timeout: parsed("NETWORK_TIMEOUT_MS")
                .filter(|ms| *ms > 0)
                .map(Duration::from_millis)
                .unwrap_or(defaults.network_timeout),
            fork_policy: lookup("FORK_POLICY")
                .and_then(|v| parse_fork_policy(&v))
                .unwrap_or(defaults.fork_policy),
            genesis_timestamp: parsed("GENESIS_TIMESTAMP"),
        }
    }

    /// Bootstrap peer to join, unless it is unset or this node itself.
    pub fn join_target(&self) -> Option<&str> {
        self.bootstrap_address
            .as_deref()
            .filter(|addr| *addr != self.node_address)
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn parse_fork_policy(value: &str) -> Option<ForkPolicy> {
    match value.trim().to_ascii_lowercase().as_str() {
        "allow" | "forks" => Some(ForkPolicy::AllowForks),
        "unique" | "unique_index" => Some(ForkPolicy::UniqueIndex),
        _ => None,
    }
}
