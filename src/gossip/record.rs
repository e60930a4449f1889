//! Broadcast accounting and the gossip termination bound.
use crate::settings::GossipSettings;

/// Per-correlation-id accounting kept while a broadcast is being gossiped
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BroadcastRecord {
    /// Envelopes this node has forwarded for the id
    pub gossip_count: u32,
    /// Envelopes for the id that arrived from other peers
    pub received_count: u32,
    /// Peer population when the record was created
    pub peer_network_size: usize,
}

impl BroadcastRecord {
    pub fn new(peer_network_size: usize) -> Self {
        Self {
            gossip_count: 0,
            received_count: 0,
            peer_network_size,
        }
    }

    /// Whether another fan-out round is still within the bound
    pub fn can_gossip(&self, settings: &GossipSettings) -> bool {
        self.gossip_count < max_gossip_cycles(self, settings)
    }
}

/// `ceil(ln(max(floor, N) / fanout) / max(1, gossip_count / fanout))`
///
/// `gossip_count / fanout` is integer division: the number of full fan-out
/// rounds already spent. A non-positive result means no more gossip.
pub fn max_gossip_cycles(record: &BroadcastRecord, settings: &GossipSettings) -> u32 {
    let fanout = settings.fanout.max(1);
    let network_size = record.peer_network_size.max(settings.min_network_size);
    let spread = (network_size as f64 / fanout as f64).ln();
    let rounds = (record.gossip_count as usize / fanout).max(1);

    let cycles = (spread / rounds as f64).ceil();
    if cycles.is_finite() && cycles > 0.0 {
        cycles as u32
    } else {
        0
    }
}
