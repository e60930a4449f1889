//! Rumor node settings
use std::net::SocketAddr;
use std::time::Duration;

use crate::error::Result;
use crate::peer::PeerId;

pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

pub const STANDARD_PORT_UDP: u16 = 8420;
pub const DEFAULT_PORT_UDP: &str = "8420";

pub const DEFAULT_GOSSIP_FANOUT: usize = 8;
pub const DEFAULT_MIN_NETWORK_SIZE: usize = 10;
pub const DEFAULT_BROADCAST_RETENTION_SECS: u64 = 600;
pub const DEFAULT_RPC_REQUEST_TTL_MS: u64 = 30_000;
pub const DEFAULT_PEER_REQUEST_TTL_MS: u64 = 10_000;
pub const DEFAULT_EVICTION_CHANNEL_CAPACITY: usize = 1024;

/// Constants of the gossip termination bound and accounting retention
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GossipSettings {
    // Max peers sampled per broadcast call
    pub fanout: usize,
    // Floor applied to the peer population before computing the bound
    pub min_network_size: usize,
    // How long a broadcast accounting record lives after creation
    pub retention: Duration,
}

impl Default for GossipSettings {
    fn default() -> Self {
        Self {
            fanout: DEFAULT_GOSSIP_FANOUT,
            min_network_size: DEFAULT_MIN_NETWORK_SIZE,
            retention: Duration::from_secs(DEFAULT_BROADCAST_RETENTION_SECS),
        }
    }
}

impl GossipSettings {
    pub fn validate(&self) -> Result<()> {
        if self.fanout == 0 {
            return Err(crate::config_error!("gossip fanout must be at least 1"));
        }
        // Otherwise the termination bound is zero and nothing is ever gossiped
        if self.min_network_size <= self.fanout {
            return Err(crate::config_error!(
                "minimum network size {} must exceed gossip fanout {}",
                self.min_network_size,
                self.fanout
            ));
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CorrelationSettings {
    pub rpc_request_ttl: Duration,
    pub peer_request_ttl: Duration,
    // Buffered events per eviction subscriber before it starts lagging
    pub eviction_channel_capacity: usize,
}

impl Default for CorrelationSettings {
    fn default() -> Self {
        Self {
            rpc_request_ttl: Duration::from_millis(DEFAULT_RPC_REQUEST_TTL_MS),
            peer_request_ttl: Duration::from_millis(DEFAULT_PEER_REQUEST_TTL_MS),
            eviction_channel_capacity: DEFAULT_EVICTION_CHANNEL_CAPACITY,
        }
    }
}

#[derive(Clone, Debug)]
pub struct Settings {
    // Server listen address
    pub listen_address: String,

    // UDP listen port for gossip and peer messages
    pub listen_port_udp: u16,

    // Cluster configuration information: known peers
    pub topology: Vec<SocketAddr>,

    pub gossip: GossipSettings,
    pub correlation: CorrelationSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            listen_address: "0.0.0.0".to_string(),
            listen_port_udp: STANDARD_PORT_UDP,
            topology: Vec::new(),
            gossip: GossipSettings::default(),
            correlation: CorrelationSettings::default(),
        }
    }
}

impl Settings {
    pub fn peer_id(&self) -> PeerId {
        PeerId::from_host_port(&self.listen_address, self.listen_port_udp)
    }

    pub fn listen_socket_address(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.listen_address, self.listen_port_udp)
            .parse::<SocketAddr>()
            .map_err(|e| {
                crate::config_error!(
                    "Invalid listen address {}:{}: {}",
                    self.listen_address,
                    self.listen_port_udp,
                    e
                )
            })
    }

    pub fn validate(&self) -> Result<()> {
        self.gossip.validate()?;
        self.listen_socket_address()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let settings = Settings::default();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.gossip.fanout, 8);
        assert_eq!(settings.gossip.min_network_size, 10);
    }

    #[test]
    fn test_zero_fanout_rejected() {
        let gossip = GossipSettings {
            fanout: 0,
            ..GossipSettings::default()
        };
        assert!(gossip.validate().is_err());
    }

    #[test]
    fn test_network_floor_must_exceed_fanout() {
        let gossip = GossipSettings {
            fanout: 10,
            min_network_size: 10,
            ..GossipSettings::default()
        };
        assert!(matches!(gossip.validate(), Err(crate::error::RumorError::Config(_))));
    }

    #[test]
    fn test_bad_listen_address() {
        let settings = Settings {
            listen_address: "not-an-ip".to_string(),
            ..Settings::default()
        };
        assert!(settings.listen_socket_address().is_err());
    }

    #[test]
    fn test_peer_id_is_stable() {
        let settings = Settings::default();
        assert_eq!(settings.peer_id(), settings.peer_id());
    }
}
