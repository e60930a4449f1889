//! Broadcast Manager
//!
//! Epidemic dissemination of messages. `broadcast` wraps a message in an
//! envelope and forwards it to a random sample of peers; `receive` unwraps
//! envelopes arriving from other peers. A [`BroadcastRecord`] per correlation
//! id counts forwards and receipts and lives for the retention window from
//! its creation. Forwarding stops once the record's `gossip_count` reaches
//! [`max_gossip_cycles`].
//!
//! Record updates and peer sampling happen under the record's shard lock and
//! never touch the network. Each envelope send runs as its own task.
use std::sync::atomic::Ordering;
use std::sync::Arc;

use bytes::Bytes;
use tracing::{debug, trace, warn};

use super::record::{max_gossip_cycles, BroadcastRecord};
use super::stats::{GossipStats, GossipStatsSnapshot};
use crate::correlation::{CorrelationCache, CorrelationId, ExpiryPolicy, RecordKind};
use crate::error::Result;
use crate::peer::{PeerId, PeerPopulation};
use crate::protocol::ProtocolMessage;
use crate::settings::GossipSettings;
use crate::transport::Transport;

pub struct BroadcastManager {
    local_peer: PeerId,
    settings: GossipSettings,
    expiry: Arc<dyn ExpiryPolicy>,
    records: CorrelationCache<BroadcastRecord>,
    peers: Arc<dyn PeerPopulation>,
    transport: Arc<dyn Transport>,
    stats: Arc<GossipStats>,
}

impl std::fmt::Debug for BroadcastManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BroadcastManager")
            .field("local_peer", &self.local_peer)
            .field("settings", &self.settings)
            .field("records", &self.records.len())
            .finish()
    }
}

impl BroadcastManager {
    /// Create a manager gossiping on behalf of `local_peer`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(
        local_peer: PeerId,
        settings: GossipSettings,
        expiry: Arc<dyn ExpiryPolicy>,
        peers: Arc<dyn PeerPopulation>,
        transport: Arc<dyn Transport>,
    ) -> Result<Self> {
        settings.validate()?;
        Ok(Self {
            local_peer,
            settings,
            expiry,
            records: CorrelationCache::new()?,
            peers,
            transport,
            stats: Arc::new(GossipStats::default()),
        })
    }

    pub fn local_peer(&self) -> PeerId {
        self.local_peer
    }

    pub fn settings(&self) -> &GossipSettings {
        &self.settings
    }

    /// Gossip `message` to a random sample of peers.
    ///
    /// Returns how many peers the envelope was dispatched to; zero when the
    /// termination bound is reached or no peers are known. Delivery happens
    /// in the background and per-peer failures are only logged.
    pub fn broadcast(&self, message: ProtocolMessage) -> Result<usize> {
        if message.is_broadcast() {
            return Err(crate::protocol_error!(
                "Message {} is already a broadcast envelope",
                message.correlation_id
            ));
        }

        let correlation_id = message.correlation_id;
        let envelope = message.into_broadcast_envelope(self.local_peer)?;
        let data = Bytes::from(envelope.encode()?);

        let network_size = self.peers.count();
        let ttl = self.expiry.ttl_for(RecordKind::Broadcast);
        let targets = self.records.modify_or_insert_with(
            correlation_id,
            ttl,
            || BroadcastRecord::new(network_size),
            |record| {
                let bound = max_gossip_cycles(record, &self.settings);
                if record.gossip_count >= bound {
                    trace!(
                        "[{}] Broadcast {} done: gossip_count {} reached bound {}",
                        self.local_peer,
                        correlation_id,
                        record.gossip_count,
                        bound
                    );
                    return Vec::new();
                }
                let targets = self.peers.sample(self.settings.fanout);
                record.gossip_count = record.gossip_count.saturating_add(targets.len() as u32);
                targets
            },
        );

        if targets.is_empty() {
            self.stats
                .broadcasts_suppressed
                .fetch_add(1, Ordering::Relaxed);
            return Ok(0);
        }

        debug!(
            "[{}] Gossiping {} to {} peers",
            self.local_peer,
            correlation_id,
            targets.len()
        );
        self.stats.broadcasts_started.fetch_add(1, Ordering::Relaxed);
        self.stats
            .envelopes_dispatched
            .fetch_add(targets.len() as u64, Ordering::Relaxed);

        for target in &targets {
            self.dispatch(*target, correlation_id, data.clone());
        }
        Ok(targets.len())
    }

    fn dispatch(&self, target: PeerId, correlation_id: CorrelationId, data: Bytes) {
        let transport = Arc::clone(&self.transport);
        let stats = Arc::clone(&self.stats);
        let local_peer = self.local_peer;
        tokio::spawn(async move {
            if let Err(e) = transport.send_to_peer(target, data).await {
                stats.send_failures.fetch_add(1, Ordering::Relaxed);
                warn!(
                    error_type = e.error_type(),
                    "[{}] Failed to gossip {} to peer {}: {}", local_peer, correlation_id, target, e
                );
            }
        });
    }

    /// Unwrap an envelope received from another peer and count the arrival.
    ///
    /// Returns the inner message for local delivery. Repeated arrivals of the
    /// same envelope are returned every time.
    pub fn receive(&self, envelope: &ProtocolMessage) -> Result<ProtocolMessage> {
        if !envelope.is_broadcast() {
            return Err(crate::protocol_error!(
                "Expected a broadcast envelope, got {} ({})",
                envelope.type_url,
                envelope.correlation_id
            ));
        }
        let inner = envelope.unwrap_broadcast()?;

        let network_size = self.peers.count();
        let ttl = self.expiry.ttl_for(RecordKind::Broadcast);
        let received_count = self.records.modify_or_insert_with(
            envelope.correlation_id,
            ttl,
            || BroadcastRecord::new(network_size),
            |record| {
                record.received_count = record.received_count.saturating_add(1);
                record.received_count
            },
        );
        self.stats.envelopes_received.fetch_add(1, Ordering::Relaxed);

        trace!(
            "[{}] Received {} ({}) from peer {}, seen {} times",
            self.local_peer,
            envelope.correlation_id,
            inner.type_url,
            envelope.sender,
            received_count
        );
        Ok(inner)
    }

    /// Accounting record for `correlation_id`, if still retained
    pub fn record(&self, correlation_id: &CorrelationId) -> Option<BroadcastRecord> {
        self.records.try_get(correlation_id)
    }

    /// Drop the accounting record for `correlation_id` before it expires
    pub fn remove(&self, correlation_id: &CorrelationId) -> bool {
        self.records.remove(correlation_id)
    }

    pub fn tracked_broadcasts(&self) -> usize {
        self.records.len()
    }

    pub fn stats(&self) -> GossipStatsSnapshot {
        self.stats.snapshot()
    }
}
