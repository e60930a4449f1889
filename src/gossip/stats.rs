use std::sync::atomic::{AtomicU64, Ordering};

/// Counters for the broadcast manager
#[derive(Debug, Default)]
pub struct GossipStats {
    pub broadcasts_started: AtomicU64,
    pub broadcasts_suppressed: AtomicU64,
    pub envelopes_dispatched: AtomicU64,
    pub send_failures: AtomicU64,
    pub envelopes_received: AtomicU64,
}

/// Point-in-time copy of [`GossipStats`]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct GossipStatsSnapshot {
    pub broadcasts_started: u64,
    pub broadcasts_suppressed: u64,
    pub envelopes_dispatched: u64,
    pub send_failures: u64,
    pub envelopes_received: u64,
}

impl GossipStats {
    pub fn snapshot(&self) -> GossipStatsSnapshot {
        GossipStatsSnapshot {
            broadcasts_started: self.broadcasts_started.load(Ordering::Relaxed),
            broadcasts_suppressed: self.broadcasts_suppressed.load(Ordering::Relaxed),
            envelopes_dispatched: self.envelopes_dispatched.load(Ordering::Relaxed),
            send_failures: self.send_failures.load(Ordering::Relaxed),
            envelopes_received: self.envelopes_received.load(Ordering::Relaxed),
        }
    }
}
