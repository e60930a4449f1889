//! Peer reputation on top of request/response correlation.
//!
//! Every correlated exchange with a peer says something about that peer:
//! answering raises its standing, sending responses nobody asked for or
//! never answering lowers it.
use std::sync::Arc;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::cache::EvictionReason;
use super::expiry::{ExpiryPolicy, RecordKind};
use super::manager::{EvictionEvent, MessageCorrelationManager, PendingRequest};
use super::CorrelationId;
use crate::error::Result;
use crate::peer::PeerId;
use crate::protocol::ProtocolMessage;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ReputationEvent {
    ResponseReceived,
    UnCorrelatableMessage,
    NoResponseReceived,
}

impl ReputationEvent {
    /// Score delta applied to the peer
    pub fn amount(&self) -> i32 {
        match self {
            ReputationEvent::ResponseReceived => 10,
            ReputationEvent::UnCorrelatableMessage => -10,
            ReputationEvent::NoResponseReceived => -10,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ReputationChange {
    pub peer: PeerId,
    pub event: ReputationEvent,
}

/// Correlation manager for peer-to-peer requests that also reports
/// reputation changes for the peers involved.
pub struct PeerMessageCorrelationManager {
    local_peer: PeerId,
    correlation: Arc<MessageCorrelationManager<ProtocolMessage>>,
    reputation: broadcast::Sender<ReputationChange>,
    forwarder: JoinHandle<()>,
}

impl std::fmt::Debug for PeerMessageCorrelationManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PeerMessageCorrelationManager")
            .field("local_peer", &self.local_peer)
            .field("correlation", &self.correlation)
            .finish()
    }
}

impl PeerMessageCorrelationManager {
    pub fn new(
        local_peer: PeerId,
        expiry: Arc<dyn ExpiryPolicy>,
        channel_capacity: usize,
    ) -> Result<Self> {
        let correlation = Arc::new(MessageCorrelationManager::new(
            local_peer,
            RecordKind::PeerRequest,
            expiry,
            channel_capacity,
        )?);
        let (reputation, _) = broadcast::channel(channel_capacity.max(1));

        let evictions = correlation.subscribe();
        let forwarder = tokio::spawn(Self::penalize_unanswered(
            local_peer,
            evictions,
            reputation.clone(),
        ));

        Ok(Self {
            local_peer,
            correlation,
            reputation,
            forwarder,
        })
    }

    async fn penalize_unanswered(
        local_peer: PeerId,
        mut evictions: broadcast::Receiver<EvictionEvent<ProtocolMessage>>,
        reputation: broadcast::Sender<ReputationChange>,
    ) {
        loop {
            match evictions.recv().await {
                Ok(event) => {
                    if event.reason != EvictionReason::Expired {
                        continue;
                    }
                    debug!(
                        "[{}] Peer {} never answered {} ({})",
                        local_peer, event.recipient, event.correlation_id, event.content.type_url
                    );
                    let _ = reputation.send(ReputationChange {
                        peer: event.recipient,
                        event: ReputationEvent::NoResponseReceived,
                    });
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(
                        "[{}] Reputation tracking skipped {} eviction events",
                        local_peer, skipped
                    );
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    }

    pub fn add_pending_request(&self, request: ProtocolMessage, recipient: PeerId) {
        self.correlation
            .add_pending_request(PendingRequest::new(request, recipient));
    }

    /// Match a response from a peer and record what it says about that peer.
    ///
    /// Type mismatches are returned to the caller without a reputation change.
    pub fn try_match_response(&self, response: &ProtocolMessage) -> Result<bool> {
        let matched = self.correlation.try_match_response(response)?;
        let event = if matched {
            ReputationEvent::ResponseReceived
        } else {
            debug!(
                "[{}] Uncorrelated {} from peer {}",
                self.local_peer, response.type_url, response.sender
            );
            ReputationEvent::UnCorrelatableMessage
        };
        let _ = self.reputation.send(ReputationChange {
            peer: response.sender,
            event,
        });
        Ok(matched)
    }

    pub fn remove_pending(&self, correlation_id: &CorrelationId) -> bool {
        self.correlation.remove_pending(correlation_id)
    }

    pub fn pending_count(&self) -> usize {
        self.correlation.pending_count()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ReputationChange> {
        self.reputation.subscribe()
    }

    pub fn subscribe_evictions(&self) -> broadcast::Receiver<EvictionEvent<ProtocolMessage>> {
        self.correlation.subscribe()
    }
}

impl Drop for PeerMessageCorrelationManager {
    fn drop(&mut self) {
        self.forwarder.abort();
    }
}
