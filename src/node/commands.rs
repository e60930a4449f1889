//! Commands sent to a running node's controller loop.
use tokio::sync::oneshot;

use crate::error::Result;
use crate::peer::PeerId;
use crate::protocol::ProtocolMessage;

#[derive(Debug)]
pub enum NodeCommand {
    /// Gossip a message to the network; replies with the number of peers contacted
    Broadcast {
        message: ProtocolMessage,
        resp_chan: oneshot::Sender<Result<usize>>,
    },
    /// Send a request to one peer and wait for its response to be correlated
    SendRequest {
        target: PeerId,
        message: ProtocolMessage,
        resp_chan: oneshot::Sender<Result<()>>,
    },
    /// Send a message to one peer without correlation
    SendDirect {
        target: PeerId,
        message: ProtocolMessage,
        resp_chan: oneshot::Sender<Result<()>>,
    },
}
