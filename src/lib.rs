pub mod cli;
pub mod correlation;
pub mod error;
pub mod gossip;
pub mod node;
pub mod peer;
pub mod protocol;
pub mod settings;
pub mod transport;
