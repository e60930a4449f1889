//! How long each kind of correlated record may live.
use std::time::Duration;

use crate::settings::{CorrelationSettings, GossipSettings};

/// Kinds of records kept in correlation caches
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RecordKind {
    /// Request sent by the RPC layer to a client/node
    RpcRequest,
    /// Request sent to another peer (ping, discovery, votes, file transfer)
    PeerRequest,
    /// Gossip accounting for one broadcast
    Broadcast,
}

pub trait ExpiryPolicy: Send + Sync {
    fn ttl_for(&self, kind: RecordKind) -> Duration;
}

/// Expiry policy backed by node settings
#[derive(Clone, Debug)]
pub struct SettingsExpiry {
    correlation: CorrelationSettings,
    broadcast_retention: Duration,
}

impl SettingsExpiry {
    pub fn new(correlation: &CorrelationSettings, gossip: &GossipSettings) -> Self {
        Self {
            correlation: correlation.clone(),
            broadcast_retention: gossip.retention,
        }
    }
}

impl ExpiryPolicy for SettingsExpiry {
    fn ttl_for(&self, kind: RecordKind) -> Duration {
        match kind {
            RecordKind::RpcRequest => self.correlation.rpc_request_ttl,
            RecordKind::PeerRequest => self.correlation.peer_request_ttl,
            RecordKind::Broadcast => self.broadcast_retention,
        }
    }
}

/// Same TTL for every kind; handy for forcing quick evictions in tests
#[derive(Clone, Copy, Debug)]
pub struct FixedExpiry(pub Duration);

impl ExpiryPolicy for FixedExpiry {
    fn ttl_for(&self, _kind: RecordKind) -> Duration {
        self.0
    }
}
