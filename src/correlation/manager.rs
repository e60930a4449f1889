//! Message Correlation Manager
//!
//! Typed request/response matcher on top of [`CorrelationCache`]. One generic
//! implementation serves every protocol that correlates replies (RPC, peer
//! discovery, file transfer, voting); only the payload type and record kind
//! differ.
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::broadcast;
use tracing::{debug, trace};

use super::cache::{CorrelationCache, Evicted, EvictionReason};
use super::expiry::{ExpiryPolicy, RecordKind};
use super::CorrelationId;
use crate::error::{Result, RumorError};
use crate::peer::PeerId;
use crate::protocol::{request_type_for, ProtocolMessage};

/// Anything that can be matched by correlation id and declared type
pub trait Correlatable {
    fn correlation_id(&self) -> CorrelationId;
    fn type_url(&self) -> &str;
}

impl Correlatable for ProtocolMessage {
    fn correlation_id(&self) -> CorrelationId {
        self.correlation_id
    }

    fn type_url(&self) -> &str {
        &self.type_url
    }
}

/// Outbound request waiting for its response
#[derive(Clone, Debug)]
pub struct PendingRequest<M> {
    pub content: M,
    pub recipient: PeerId,
    pub sent_at: Instant,
}

impl<M> PendingRequest<M> {
    pub fn new(content: M, recipient: PeerId) -> Self {
        Self {
            content,
            recipient,
            sent_at: Instant::now(),
        }
    }
}

/// Published when a pending request leaves the cache unanswered
#[derive(Clone, Debug)]
pub struct EvictionEvent<M> {
    pub correlation_id: CorrelationId,
    pub content: M,
    pub recipient: PeerId,
    pub reason: EvictionReason,
}

pub struct MessageCorrelationManager<M> {
    local_peer: PeerId,
    kind: RecordKind,
    expiry: Arc<dyn ExpiryPolicy>,
    pending: CorrelationCache<PendingRequest<M>>,
    evictions: broadcast::Sender<EvictionEvent<M>>,
}

impl<M> std::fmt::Debug for MessageCorrelationManager<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageCorrelationManager")
            .field("local_peer", &self.local_peer)
            .field("kind", &self.kind)
            .field("pending", &self.pending.len())
            .field("subscribers", &self.evictions.receiver_count())
            .finish()
    }
}

impl<M> MessageCorrelationManager<M>
where
    M: Correlatable + Clone + Send + Sync + 'static,
{
    pub fn new(
        local_peer: PeerId,
        kind: RecordKind,
        expiry: Arc<dyn ExpiryPolicy>,
        eviction_channel_capacity: usize,
    ) -> Result<Self> {
        let (evictions, _) = broadcast::channel(eviction_channel_capacity.max(1));
        let publisher = evictions.clone();
        // Replacement is an overwrite by the caller, not an unanswered request.
        let pending = CorrelationCache::with_eviction_callback(
            move |evicted: Evicted<PendingRequest<M>>| {
                if evicted.reason == EvictionReason::Replaced {
                    return;
                }
                debug!(
                    "[{}] Pending {} to peer {} evicted: {}",
                    local_peer,
                    evicted.id, evicted.value.recipient, evicted.reason
                );
                let event = EvictionEvent {
                    correlation_id: evicted.id,
                    content: evicted.value.content,
                    recipient: evicted.value.recipient,
                    reason: evicted.reason,
                };
                // Only fails when nobody is subscribed
                if publisher.send(event).is_err() {
                    trace!("[{}] No eviction subscribers for {}", local_peer, evicted.id);
                }
            },
        )?;

        Ok(Self {
            local_peer,
            kind,
            expiry,
            pending,
            evictions,
        })
    }

    pub fn local_peer(&self) -> PeerId {
        self.local_peer
    }

    pub fn kind(&self) -> RecordKind {
        self.kind
    }

    /// Remember an outbound request until it expires
    pub fn add_pending_request(&self, request: PendingRequest<M>) {
        let correlation_id = request.content.correlation_id();
        let ttl = self.expiry.ttl_for(self.kind);
        trace!(
            "[{}] Awaiting response to {} from peer {} for {:?}",
            self.local_peer,
            correlation_id,
            request.recipient,
            ttl
        );
        self.pending.put(correlation_id, request, ttl);
    }

    /// Match an inbound response against its pending request.
    ///
    /// `Ok(false)` means nothing is pending under that id (late, duplicate or
    /// foreign response). A pending request of the wrong type yields
    /// [`RumorError::TypeMismatch`]. Matching leaves the entry in place; it
    /// only leaves on expiry.
    pub fn try_match_response<R: Correlatable>(&self, response: &R) -> Result<bool> {
        let correlation_id = response.correlation_id();
        let pending = match self.pending.try_get(&correlation_id) {
            Some(pending) => pending,
            None => return Ok(false),
        };

        let request_type = pending.content.type_url();
        let expected = request_type_for(response.type_url()).map_err(|_| {
            RumorError::TypeMismatch {
                request_type: request_type.to_string(),
                response_type: response.type_url().to_string(),
            }
        })?;

        if expected != request_type {
            return Err(RumorError::TypeMismatch {
                request_type: request_type.to_string(),
                response_type: response.type_url().to_string(),
            });
        }
        Ok(true)
    }

    /// Pending request stored under `correlation_id`, if any
    pub fn pending_request(&self, correlation_id: &CorrelationId) -> Option<PendingRequest<M>> {
        self.pending.try_get(correlation_id)
    }

    /// Stop waiting for a response; publishes one `Removed` eviction event
    pub fn remove_pending(&self, correlation_id: &CorrelationId) -> bool {
        self.pending.remove(correlation_id)
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Attach a new subscriber to the eviction stream
    pub fn subscribe(&self) -> broadcast::Receiver<EvictionEvent<M>> {
        self.evictions.subscribe()
    }
}

/// Correlation manager used by the RPC layer
pub type RpcMessageCorrelationManager = MessageCorrelationManager<ProtocolMessage>;
