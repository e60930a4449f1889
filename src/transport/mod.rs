//! UDP Transport Module
//!
//! One bound UDP socket per node, used both to receive (see [`UdpReceiver`])
//! and to send fire-and-forget datagrams to peers resolved through the
//! [`PeerTable`].
pub mod receiver;
pub mod traits;

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::net::UdpSocket;
use tracing::trace;

use crate::error::Result;
use crate::peer::{PeerId, PeerTable};
pub use receiver::{ReceiverStats, UdpReceiver};
pub use traits::Transport;

#[derive(Clone, Debug)]
pub struct UdpTransport {
    socket: Arc<UdpSocket>,
    peers: Arc<PeerTable>,
    stats: Arc<TransportStats>,
}

/// Transport statistics
#[derive(Debug, Default)]
pub struct TransportStats {
    pub messages_sent: AtomicU64,
    pub bytes_sent: AtomicU64,
    pub send_errors: AtomicU64,
}

impl UdpTransport {
    /// Send through `socket`, resolving peers via `peers`
    pub fn new(socket: Arc<UdpSocket>, peers: Arc<PeerTable>) -> Self {
        Self {
            socket,
            peers,
            stats: Arc::new(TransportStats::default()),
        }
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    pub fn peers(&self) -> &Arc<PeerTable> {
        &self.peers
    }

    pub fn messages_sent(&self) -> u64 {
        self.stats.messages_sent.load(Ordering::Relaxed)
    }

    pub fn send_errors(&self) -> u64 {
        self.stats.send_errors.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl Transport for UdpTransport {
    async fn send_to_peer(&self, target: PeerId, data: Bytes) -> Result<()> {
        let addr = match self.peers.address_of(target)? {
            Some(addr) => addr,
            None => {
                self.stats.send_errors.fetch_add(1, Ordering::Relaxed);
                return Err(crate::transport_error!("Unknown peer {}", target));
            }
        };

        match self.socket.send_to(&data, addr).await {
            Ok(sent) => {
                self.stats.messages_sent.fetch_add(1, Ordering::Relaxed);
                self.stats
                    .bytes_sent
                    .fetch_add(sent as u64, Ordering::Relaxed);
                trace!("Sent {} bytes to peer {} at {}", sent, target, addr);
                Ok(())
            }
            Err(e) => {
                self.stats.send_errors.fetch_add(1, Ordering::Relaxed);
                Err(crate::transport_error!(
                    "Failed to send to peer {} at {}: {}",
                    target,
                    addr,
                    e
                ))
            }
        }
    }
}
