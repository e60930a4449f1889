//! CLI for this application
//!
use std::net::SocketAddr;
use std::time::Duration;

use crate::settings;

#[derive(Clone, Debug, clap::Parser)]
#[command(name = settings::APP_NAME, version = settings::APP_VERSION)]
pub struct Cli {
    // Server listen address
    #[clap(
        long,
        default_value = "0.0.0.0",
        env("RUMOR_LISTEN_ADDRESS"),
        help = "IP Address to listen on"
    )]
    pub listen_address: String,

    // UDP listen port for gossip
    #[clap(
        long,
        default_value = settings::DEFAULT_PORT_UDP,
        env("RUMOR_UDP_LISTEN_PORT"),
        help = "Port to bind the rumor UDP socket to"
    )]
    pub listen_port_udp: u16,

    #[clap(
        long,
        default_value_t = settings::DEFAULT_GOSSIP_FANOUT,
        env("RUMOR_GOSSIP_FANOUT"),
        help = "Max peers an envelope is forwarded to per broadcast"
    )]
    pub gossip_fanout: usize,

    #[clap(
        long,
        default_value_t = settings::DEFAULT_MIN_NETWORK_SIZE,
        env("RUMOR_MIN_NETWORK_SIZE"),
        help = "Floor applied to the peer count when computing the gossip bound"
    )]
    pub min_network_size: usize,

    #[clap(
        long,
        default_value_t = settings::DEFAULT_BROADCAST_RETENTION_SECS,
        env("RUMOR_BROADCAST_RETENTION_SECONDS"),
        help = "Seconds a broadcast accounting record is retained"
    )]
    pub broadcast_retention_seconds: u64,

    #[clap(
        long,
        default_value_t = settings::DEFAULT_RPC_REQUEST_TTL_MS,
        env("RUMOR_RPC_REQUEST_TTL_MS"),
        help = "Milliseconds an RPC request waits for its response"
    )]
    pub rpc_request_ttl_ms: u64,

    #[clap(
        long,
        default_value_t = settings::DEFAULT_PEER_REQUEST_TTL_MS,
        env("RUMOR_PEER_REQUEST_TTL_MS"),
        help = "Milliseconds a peer request waits for its response"
    )]
    pub peer_request_ttl_ms: u64,

    // Cluster configuration information: topology
    #[clap(
        long,
        value_delimiter = ',',
        env("RUMOR_TOPOLOGY"),
        help = "UDP addresses of known peers (e.g., 10.0.0.2:8420,10.0.0.3:8420)"
    )]
    pub topology: Vec<SocketAddr>,
}

impl Cli {
    pub fn into_settings(self) -> settings::Settings {
        settings::Settings {
            listen_address: self.listen_address,
            listen_port_udp: self.listen_port_udp,
            topology: self.topology,
            gossip: settings::GossipSettings {
                fanout: self.gossip_fanout,
                min_network_size: self.min_network_size,
                retention: Duration::from_secs(self.broadcast_retention_seconds),
            },
            correlation: settings::CorrelationSettings {
                rpc_request_ttl: Duration::from_millis(self.rpc_request_ttl_ms),
                peer_request_ttl: Duration::from_millis(self.peer_request_ttl_ms),
                ..settings::CorrelationSettings::default()
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;

    #[test]
    fn test_parse_topology_and_gossip_flags() {
        let cli = Cli::parse_from([
            "rumor",
            "--listen-address",
            "127.0.0.1",
            "--listen-port-udp",
            "9000",
            "--gossip-fanout",
            "4",
            "--topology",
            "127.0.0.1:9001,127.0.0.1:9002",
        ]);
        let settings = cli.into_settings();
        assert_eq!(settings.listen_port_udp, 9000);
        assert_eq!(settings.gossip.fanout, 4);
        assert_eq!(settings.topology.len(), 2);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_defaults() {
        let settings = Cli::parse_from(["rumor"]).into_settings();
        assert_eq!(settings.gossip, settings::GossipSettings::default());
        assert!(settings.topology.is_empty());
    }
}
