//! Peer identity and the population view the gossip layer samples from.
pub mod peer_id;
pub mod peer_table;

pub use peer_id::PeerId;
pub use peer_table::{PeerPopulation, PeerTable};
