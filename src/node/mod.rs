//! Gossip Node
//!
//! A running peer: one UDP socket, the peer table built from the configured
//! topology, and a [`NodeController`] loop fed by the socket receiver and by
//! commands from [`GossipNode`] handles.
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::UdpSocket;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::info;

pub mod commands;
pub mod controller;

pub use commands::NodeCommand;
pub use controller::NodeController;

use crate::correlation::{ReputationChange, SettingsExpiry};
use crate::error::{Result, RumorError};
use crate::peer::{PeerId, PeerTable};
use crate::protocol::ProtocolMessage;
use crate::settings::Settings;
use crate::transport::{UdpReceiver, UdpTransport};

const CHANNEL_CAPACITY: usize = 1000;

/// Whether `candidate` reaches the socket bound at `bound`.
///
/// A socket bound to the wildcard or loopback address is reachable through
/// any local address on its port.
fn is_own_address(bound: SocketAddr, candidate: SocketAddr) -> bool {
    if bound == candidate {
        return true;
    }
    let local = |addr: SocketAddr| addr.ip().is_loopback() || addr.ip().is_unspecified();
    bound.port() == candidate.port() && local(bound) && local(candidate)
}

pub struct GossipNode {
    local_peer: PeerId,
    local_addr: SocketAddr,
    peers: Arc<PeerTable>,
    controller: Arc<NodeController>,
    command_tx: mpsc::Sender<NodeCommand>,
    receiver_task: JoinHandle<()>,
    controller_task: JoinHandle<()>,
}

impl std::fmt::Debug for GossipNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GossipNode")
            .field("local_peer", &self.local_peer)
            .field("local_addr", &self.local_addr)
            .field("peers", &self.peers)
            .finish()
    }
}

impl GossipNode {
    /// Bind the node's socket and start its receive and controller loops
    pub async fn start(settings: Settings) -> Result<Self> {
        settings.validate()?;
        let bind_addr = settings.listen_socket_address()?;
        let socket = UdpSocket::bind(bind_addr)
            .await
            .map_err(|e| crate::transport_error!("Failed to bind {}: {}", bind_addr, e))?;
        let socket = Arc::new(socket);
        let receiver = UdpReceiver::from_socket(Arc::clone(&socket))?;
        let local_addr = receiver.local_addr();
        // Derived from the bound address so an ephemeral port gets its own id
        let local_peer = PeerId::from_socket_addr(local_addr);

        let peers = Arc::new(PeerTable::from_addresses(
            local_peer,
            settings
                .topology
                .iter()
                .copied()
                .filter(|addr| !is_own_address(local_addr, *addr)),
        )?);
        info!(
            "[{}] Starting gossip node on {} with {} known peers",
            local_peer,
            local_addr,
            settings.topology.len()
        );

        let transport = Arc::new(UdpTransport::new(socket, Arc::clone(&peers)));
        let expiry = Arc::new(SettingsExpiry::new(&settings.correlation, &settings.gossip));
        let controller = Arc::new(NodeController::new(
            local_peer,
            settings.gossip.clone(),
            &settings.correlation,
            expiry,
            peers.clone(),
            transport,
        )?);

        let (inbound_tx, inbound_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let (command_tx, command_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let receiver_task = receiver.start(inbound_tx);
        let controller_task = tokio::spawn(Arc::clone(&controller).run(inbound_rx, command_rx));

        Ok(Self {
            local_peer,
            local_addr,
            peers,
            controller,
            command_tx,
            receiver_task,
            controller_task,
        })
    }

    pub fn local_peer(&self) -> PeerId {
        self.local_peer
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn peers(&self) -> &Arc<PeerTable> {
        &self.peers
    }

    pub fn controller(&self) -> &Arc<NodeController> {
        &self.controller
    }

    pub fn subscribe_messages(&self) -> broadcast::Receiver<ProtocolMessage> {
        self.controller.subscribe_messages()
    }

    pub fn subscribe_reputation(&self) -> broadcast::Receiver<ReputationChange> {
        self.controller.subscribe_reputation()
    }

    /// Gossip `message` to the network
    pub async fn broadcast(&self, message: ProtocolMessage) -> Result<usize> {
        let (resp_chan, resp_rx) = oneshot::channel();
        self.send_command(NodeCommand::Broadcast { message, resp_chan })
            .await?;
        Self::await_reply(resp_rx).await
    }

    pub async fn send_request(&self, target: PeerId, message: ProtocolMessage) -> Result<()> {
        let (resp_chan, resp_rx) = oneshot::channel();
        self.send_command(NodeCommand::SendRequest {
            target,
            message,
            resp_chan,
        })
        .await?;
        Self::await_reply(resp_rx).await
    }

    pub async fn send_direct(&self, target: PeerId, message: ProtocolMessage) -> Result<()> {
        let (resp_chan, resp_rx) = oneshot::channel();
        self.send_command(NodeCommand::SendDirect {
            target,
            message,
            resp_chan,
        })
        .await?;
        Self::await_reply(resp_rx).await
    }

    async fn send_command(&self, cmd: NodeCommand) -> Result<()> {
        self.command_tx.send(cmd).await.map_err(|e| {
            RumorError::Concurrency(format!("Node controller is not running: {}", e))
        })
    }

    async fn await_reply<T>(resp_rx: oneshot::Receiver<Result<T>>) -> Result<T> {
        resp_rx.await.map_err(|e| {
            RumorError::Concurrency(format!("Node controller dropped the reply: {}", e))
        })?
    }

    /// Stop both loops and wait for the controller to exit
    pub async fn shutdown(self) {
        info!("[{}] Shutting down gossip node", self.local_peer);
        self.receiver_task.abort();
        self.controller_task.abort();
        let _ = self.controller_task.await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::peer::PeerPopulation;

    #[test]
    fn test_wildcard_bind_recognizes_loopback_topology_entry() {
        let bound: SocketAddr = "0.0.0.0:7946".parse().unwrap();
        assert!(is_own_address(bound, "127.0.0.1:7946".parse().unwrap()));
        assert!(is_own_address(bound, "0.0.0.0:7946".parse().unwrap()));
        assert!(!is_own_address(bound, "127.0.0.1:7947".parse().unwrap()));
        assert!(!is_own_address(bound, "10.0.0.5:7946".parse().unwrap()));
    }

    #[test]
    fn test_own_entry_left_out_of_peer_table() {
        let bound: SocketAddr = "0.0.0.0:7946".parse().unwrap();
        let topology: Vec<SocketAddr> = vec![
            "127.0.0.1:7946".parse().unwrap(),
            "127.0.0.1:7947".parse().unwrap(),
        ];
        let peers = PeerTable::from_addresses(
            PeerId::from_socket_addr(bound),
            topology
                .into_iter()
                .filter(|addr| !is_own_address(bound, *addr)),
        )
        .unwrap();

        assert_eq!(peers.count(), 1);
    }
}
