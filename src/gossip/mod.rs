//! Epidemic broadcast: accounting records, the termination bound and the
//! manager that fans envelopes out to random peers.
pub mod broadcast_manager;
pub mod record;
pub mod stats;

pub use broadcast_manager::BroadcastManager;
pub use record::{max_gossip_cycles, BroadcastRecord};
pub use stats::{GossipStats, GossipStatsSnapshot};
