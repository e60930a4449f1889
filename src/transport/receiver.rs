//! UDP Receiver
//!
//! Reads datagrams off the node's socket and hands them to the node's
//! inbound loop over a channel.
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error};

use crate::error::Result;
use crate::protocol::MAX_DATAGRAM_SIZE;

pub struct UdpReceiver {
    socket: Arc<UdpSocket>,
    local_addr: SocketAddr,
    stats: Arc<ReceiverStats>,
}

/// Statistics for the receiver
#[derive(Debug, Default)]
pub struct ReceiverStats {
    pub messages_received: AtomicU64,
    pub receive_errors: AtomicU64,
}

impl UdpReceiver {
    /// Bind a fresh socket on `bind_addr`
    pub async fn bind(bind_addr: SocketAddr) -> Result<Self> {
        let socket = UdpSocket::bind(bind_addr)
            .await
            .map_err(|e| crate::transport_error!("Socket creation failed: {}", e))?;
        Self::from_socket(Arc::new(socket))
    }

    /// Receive on a socket that is also used for sending
    pub fn from_socket(socket: Arc<UdpSocket>) -> Result<Self> {
        let local_addr = socket
            .local_addr()
            .map_err(|e| crate::transport_error!("Socket has no local address: {}", e))?;
        Ok(Self {
            socket,
            local_addr,
            stats: Arc::new(ReceiverStats::default()),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn socket(&self) -> Arc<UdpSocket> {
        Arc::clone(&self.socket)
    }

    /// Forward every datagram into `inbound` until the channel closes
    pub fn start(&self, inbound: mpsc::Sender<(Bytes, SocketAddr)>) -> JoinHandle<()> {
        let socket = Arc::clone(&self.socket);
        let stats = Arc::clone(&self.stats);
        let local_addr = self.local_addr;

        tokio::spawn(async move {
            let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];
            loop {
                match socket.recv_from(&mut buf).await {
                    Ok((len, addr)) => {
                        stats.messages_received.fetch_add(1, Ordering::Relaxed);
                        let data = Bytes::copy_from_slice(&buf[..len]);
                        if inbound.send((data, addr)).await.is_err() {
                            debug!("[{}] Inbound channel closed, receiver exiting", local_addr);
                            break;
                        }
                    }
                    Err(e) => {
                        // Continue receiving despite errors
                        stats.receive_errors.fetch_add(1, Ordering::Relaxed);
                        error!("[{}] UDP receive error: {}", local_addr, e);
                    }
                }
            }
        })
    }

    pub fn messages_received(&self) -> u64 {
        self.stats.messages_received.load(Ordering::Relaxed)
    }

    pub fn receive_errors(&self) -> u64 {
        self.stats.receive_errors.load(Ordering::Relaxed)
    }
}
