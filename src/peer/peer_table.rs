//! Peer Table
//!
//! Known reachable peers and their socket addresses. The gossip layer only
//! sees it through [`PeerPopulation`]: a count and a uniform random sample.
use std::net::SocketAddr;
use std::sync::RwLock;

use indexmap::IndexMap;
use tracing::error;

use super::PeerId;
use crate::error::Result;

/// Read-only view of the current peer population
pub trait PeerPopulation: Send + Sync {
    /// Number of currently reachable peers
    fn count(&self) -> usize;

    /// Up to `n` distinct peers, chosen uniformly at random.
    ///
    /// Returns every known peer when fewer than `n` are known.
    fn sample(&self, n: usize) -> Vec<PeerId>;
}

pub struct PeerTable {
    local_peer: PeerId,
    // IndexMap for cheap uniform index sampling
    peers: RwLock<IndexMap<PeerId, SocketAddr>>,
}

impl PeerTable {
    pub fn new(local_peer: PeerId) -> Self {
        Self {
            local_peer,
            peers: RwLock::new(IndexMap::new()),
        }
    }

    /// Build a table from socket addresses, skipping our own address
    pub fn from_addresses(
        local_peer: PeerId,
        addresses: impl IntoIterator<Item = SocketAddr>,
    ) -> Result<Self> {
        let table = Self::new(local_peer);
        for addr in addresses {
            table.add_peer(addr)?;
        }
        Ok(table)
    }

    pub fn local_peer(&self) -> PeerId {
        self.local_peer
    }

    /// Add a peer by address, deriving its id. Returns `None` for our own address.
    pub fn add_peer(&self, addr: SocketAddr) -> Result<Option<PeerId>> {
        let peer_id = PeerId::from_socket_addr(addr);
        if peer_id == self.local_peer {
            return Ok(None);
        }
        self.insert(peer_id, addr)?;
        Ok(Some(peer_id))
    }

    pub fn insert(&self, peer_id: PeerId, addr: SocketAddr) -> Result<()> {
        self.peers.write()?.insert(peer_id, addr);
        Ok(())
    }

    pub fn remove_peer(&self, peer_id: PeerId) -> Result<bool> {
        Ok(self.peers.write()?.swap_remove(&peer_id).is_some())
    }

    pub fn address_of(&self, peer_id: PeerId) -> Result<Option<SocketAddr>> {
        Ok(self.peers.read()?.get(&peer_id).copied())
    }

    pub fn peer_at_address(&self, addr: SocketAddr) -> Result<Option<PeerId>> {
        Ok(self
            .peers
            .read()?
            .iter()
            .find(|(_, peer_addr)| **peer_addr == addr)
            .map(|(peer_id, _)| *peer_id))
    }

    pub fn get_peers(&self) -> Result<Vec<PeerId>> {
        Ok(self.peers.read()?.keys().copied().collect())
    }
}

impl PeerPopulation for PeerTable {
    fn count(&self) -> usize {
        self.peers.read().map(|peers| peers.len()).unwrap_or(0)
    }

    fn sample(&self, n: usize) -> Vec<PeerId> {
        let peers = match self.peers.read() {
            Ok(peers) => peers,
            Err(e) => {
                error!("[{}] Peer table lock poisoned: {}", self.local_peer, e);
                return Vec::new();
            }
        };
        let amount = n.min(peers.len());
        let mut rng = rand::rng();
        rand::seq::index::sample(&mut rng, peers.len(), amount)
            .into_iter()
            .filter_map(|idx| peers.get_index(idx).map(|(peer_id, _)| *peer_id))
            .collect()
    }
}

impl std::fmt::Debug for PeerTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PeerTable")
            .field("local_peer", &self.local_peer)
            .field("peer_count", &self.count())
            .finish()
    }
}
