//! Transport trait for the gossip and correlation layers
//!
//! The layers above only ever push opaque bytes at a peer. Framing, sockets
//! and address resolution stay behind this trait.
use async_trait::async_trait;
use bytes::Bytes;

use crate::error::Result;
use crate::peer::PeerId;

/// Fire-and-forget delivery of encoded messages to peers
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send data to a specific peer by PeerId
    async fn send_to_peer(&self, target: PeerId, data: Bytes) -> Result<()>;
}
