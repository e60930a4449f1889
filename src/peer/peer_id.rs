use std::hash::{DefaultHasher, Hash, Hasher};
use std::net::SocketAddr;

use bincode::{Decode, Encode};

/// Unique identifier for a peer on the network
#[derive(Clone, Copy, Debug, Default, PartialEq, PartialOrd, Ord, Eq, Hash, Encode, Decode)]
pub struct PeerId(u32);

impl PeerId {
    pub fn new(id: u32) -> Self {
        Self(id)
    }

    pub fn value(&self) -> u32 {
        self.0
    }

    /// Generate a deterministic peer id from hostname and port
    ///
    /// Stable across restarts as long as the hostname and port stay the same.
    pub fn from_host_port(hostname: &str, port: u16) -> Self {
        let mut hasher = DefaultHasher::new();
        hostname.hash(&mut hasher);
        port.hash(&mut hasher);
        Self(hasher.finish() as u32)
    }

    pub fn from_socket_addr(addr: SocketAddr) -> Self {
        Self::from_host_port(&addr.ip().to_string(), addr.port())
    }
}

impl From<u32> for PeerId {
    fn from(id: u32) -> Self {
        PeerId(id)
    }
}

impl std::fmt::Display for PeerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
