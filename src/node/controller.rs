//! Node Controller
//!
//! Owns the broadcast and correlation managers and runs the node's central
//! loop: inbound datagrams go through the inbound pipeline, outbound
//! commands go out over the transport.
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::{broadcast, mpsc};
use tokio::time;
use tracing::{debug, error, info, warn};

use super::commands::NodeCommand;
use crate::correlation::{ExpiryPolicy, PeerMessageCorrelationManager, ReputationChange};
use crate::error::Result;
use crate::gossip::BroadcastManager;
use crate::peer::{PeerId, PeerPopulation};
use crate::protocol::ProtocolMessage;
use crate::settings::{CorrelationSettings, GossipSettings};
use crate::transport::Transport;

const DELIVERY_CHANNEL_CAPACITY: usize = 1024;
const STATS_LOG_INTERVAL: Duration = Duration::from_secs(60);

pub struct NodeController {
    local_peer: PeerId,
    transport: Arc<dyn Transport>,
    broadcasts: BroadcastManager,
    correlation: PeerMessageCorrelationManager,
    delivered: broadcast::Sender<ProtocolMessage>,
}

impl std::fmt::Debug for NodeController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeController")
            .field("local_peer", &self.local_peer)
            .field("broadcasts", &self.broadcasts)
            .field("correlation", &self.correlation)
            .finish()
    }
}

impl NodeController {
    pub fn new(
        local_peer: PeerId,
        gossip: GossipSettings,
        correlation: &CorrelationSettings,
        expiry: Arc<dyn ExpiryPolicy>,
        peers: Arc<dyn PeerPopulation>,
        transport: Arc<dyn Transport>,
    ) -> Result<Self> {
        let broadcasts = BroadcastManager::new(
            local_peer,
            gossip,
            Arc::clone(&expiry),
            peers,
            Arc::clone(&transport),
        )?;
        let correlation = PeerMessageCorrelationManager::new(
            local_peer,
            expiry,
            correlation.eviction_channel_capacity,
        )?;
        let (delivered, _) = broadcast::channel(DELIVERY_CHANNEL_CAPACITY);

        Ok(Self {
            local_peer,
            transport,
            broadcasts,
            correlation,
            delivered,
        })
    }

    pub fn local_peer(&self) -> PeerId {
        self.local_peer
    }

    pub fn broadcasts(&self) -> &BroadcastManager {
        &self.broadcasts
    }

    pub fn correlation(&self) -> &PeerMessageCorrelationManager {
        &self.correlation
    }

    /// Messages delivered to local handlers, envelopes already unwrapped
    pub fn subscribe_messages(&self) -> broadcast::Receiver<ProtocolMessage> {
        self.delivered.subscribe()
    }

    pub fn subscribe_reputation(&self) -> broadcast::Receiver<ReputationChange> {
        self.correlation.subscribe()
    }

    /// Run one inbound datagram through the pipeline.
    ///
    /// Responses are correlated first and dropped when nothing is pending for
    /// them. Broadcast envelopes are unwrapped, delivered and gossiped on.
    /// Returns the delivered message, or `None` when it was dropped.
    pub fn handle_inbound(&self, data: &[u8]) -> Result<Option<ProtocolMessage>> {
        let message = ProtocolMessage::decode(data)?;

        if message.is_response() && !self.correlation.try_match_response(&message)? {
            debug!(
                "[{}] Dropping uncorrelated {} {} from peer {}",
                self.local_peer, message.type_url, message.correlation_id, message.sender
            );
            return Ok(None);
        }

        if message.is_broadcast() {
            let inner = self.broadcasts.receive(&message)?;
            self.deliver(inner.clone());
            match self.broadcasts.broadcast(inner.clone()) {
                Ok(0) => {}
                Ok(forwarded) => debug!(
                    "[{}] Forwarded {} to {} peers",
                    self.local_peer, inner.correlation_id, forwarded
                ),
                Err(e) => warn!(
                    error_type = e.error_type(),
                    "[{}] Could not forward {}: {}", self.local_peer, inner.correlation_id, e
                ),
            }
            return Ok(Some(inner));
        }

        self.deliver(message.clone());
        Ok(Some(message))
    }

    fn deliver(&self, message: ProtocolMessage) {
        // Only fails when nobody is subscribed
        let _ = self.delivered.send(message);
    }

    pub fn broadcast(&self, message: ProtocolMessage) -> Result<usize> {
        self.broadcasts.broadcast(message)
    }

    /// Send a request to `target` and wait for its response to be correlated
    pub async fn send_request(&self, target: PeerId, message: ProtocolMessage) -> Result<()> {
        if !message.is_request() {
            return Err(crate::protocol_error!(
                "{} is not a request type",
                message.type_url
            ));
        }
        let data = Bytes::from(message.encode()?);
        let correlation_id = message.correlation_id;
        self.correlation.add_pending_request(message, target);

        if let Err(e) = self.transport.send_to_peer(target, data).await {
            // Nothing went out, so nothing can come back
            self.correlation.remove_pending(&correlation_id);
            return Err(e);
        }
        Ok(())
    }

    /// Send a message to `target` without correlation
    pub async fn send_direct(&self, target: PeerId, message: ProtocolMessage) -> Result<()> {
        let data = Bytes::from(message.encode()?);
        self.transport.send_to_peer(target, data).await
    }

    async fn handle_command(&self, cmd: NodeCommand) {
        match cmd {
            NodeCommand::Broadcast { message, resp_chan } => {
                if resp_chan.send(self.broadcast(message)).is_err() {
                    error!("[{}] Failed sending oneshot broadcast response", self.local_peer);
                }
            }
            NodeCommand::SendRequest {
                target,
                message,
                resp_chan,
            } => {
                let result = self.send_request(target, message).await;
                if resp_chan.send(result).is_err() {
                    error!("[{}] Failed sending oneshot request response", self.local_peer);
                }
            }
            NodeCommand::SendDirect {
                target,
                message,
                resp_chan,
            } => {
                let result = self.send_direct(target, message).await;
                if resp_chan.send(result).is_err() {
                    error!("[{}] Failed sending oneshot direct response", self.local_peer);
                }
            }
        }
    }

    pub fn log_stats(&self) {
        let stats = self.broadcasts.stats();
        debug!(
            "[{}] Gossip stats: {} tracked, {} started, {} suppressed, {} dispatched, {} failed, {} received; {} pending requests",
            self.local_peer,
            self.broadcasts.tracked_broadcasts(),
            stats.broadcasts_started,
            stats.broadcasts_suppressed,
            stats.envelopes_dispatched,
            stats.send_failures,
            stats.envelopes_received,
            self.correlation.pending_count()
        );
    }

    /// Central loop: exits once both channels are closed
    pub async fn run(
        self: Arc<Self>,
        mut inbound_rx: mpsc::Receiver<(Bytes, SocketAddr)>,
        mut command_rx: mpsc::Receiver<NodeCommand>,
    ) {
        info!("[{}] Starting node IO loop", self.local_peer);
        let mut stats_timer = time::interval(STATS_LOG_INTERVAL);
        let mut inbound_open = true;
        let mut commands_open = true;

        while inbound_open || commands_open {
            tokio::select! {
                datagram = inbound_rx.recv(), if inbound_open => match datagram {
                    Some((data, peer_addr)) => {
                        if let Err(e) = self.handle_inbound(&data) {
                            warn!(
                                error_type = e.error_type(),
                                "[{}] Error processing message from {}: {}", self.local_peer, peer_addr, e
                            );
                        }
                    }
                    None => inbound_open = false,
                },
                cmd = command_rx.recv(), if commands_open => match cmd {
                    Some(cmd) => self.handle_command(cmd).await,
                    None => commands_open = false,
                },
                _ = stats_timer.tick() => self.log_stats(),
            }
        }
        info!("[{}] Node IO loop channels closed, exiting", self.local_peer);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::correlation::{FixedExpiry, ReputationEvent};
    use crate::error::RumorError;

    #[derive(Default)]
    struct RecordingTransport {
        sent: Mutex<Vec<(PeerId, Bytes)>>,
        fail: bool,
    }

    #[async_trait]
    impl Transport for RecordingTransport {
        async fn send_to_peer(&self, target: PeerId, data: Bytes) -> Result<()> {
            if self.fail {
                return Err(crate::transport_error!("peer {} unreachable", target));
            }
            self.sent.lock().unwrap().push((target, data));
            Ok(())
        }
    }

    struct FixedPopulation(Vec<PeerId>);

    impl PeerPopulation for FixedPopulation {
        fn count(&self) -> usize {
            self.0.len()
        }

        fn sample(&self, n: usize) -> Vec<PeerId> {
            self.0.iter().take(n).copied().collect()
        }
    }

    fn controller(transport: Arc<RecordingTransport>) -> NodeController {
        NodeController::new(
            PeerId::new(1),
            GossipSettings::default(),
            &CorrelationSettings::default(),
            Arc::new(FixedExpiry(Duration::from_secs(30))),
            Arc::new(FixedPopulation((2..=6).map(PeerId::new).collect())),
            transport,
        )
        .unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_direct_message_is_delivered() {
        let controller = controller(Arc::default());
        let mut delivered = controller.subscribe_messages();
        let ping = ProtocolMessage::originate("PingRequest", vec![], PeerId::new(2));

        let result = controller.handle_inbound(&ping.encode().unwrap()).unwrap();
        assert_eq!(result, Some(ping.clone()));
        assert_eq!(delivered.recv().await.unwrap(), ping);
    }

    #[tokio::test(start_paused = true)]
    async fn test_uncorrelated_response_is_dropped() {
        let controller = controller(Arc::default());
        let mut delivered = controller.subscribe_messages();
        let mut reputation = controller.subscribe_reputation();
        let stray = ProtocolMessage::originate("PingResponse", vec![], PeerId::new(3));

        assert_eq!(controller.handle_inbound(&stray.encode().unwrap()).unwrap(), None);
        assert!(delivered.try_recv().is_err());
        assert_eq!(
            reputation.recv().await.unwrap().event,
            ReputationEvent::UnCorrelatableMessage
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_request_response_round_trip() {
        let transport = Arc::new(RecordingTransport::default());
        let controller = controller(transport.clone());
        let ping = ProtocolMessage::originate("PingRequest", vec![], PeerId::new(1));

        controller.send_request(PeerId::new(2), ping.clone()).await.unwrap();
        assert_eq!(controller.correlation().pending_count(), 1);
        assert_eq!(transport.sent.lock().unwrap()[0].0, PeerId::new(2));

        let pong = ProtocolMessage::respond_to(&ping, vec![1], PeerId::new(2)).unwrap();
        let delivered = controller.handle_inbound(&pong.encode().unwrap()).unwrap();
        assert_eq!(delivered, Some(pong));
    }

    #[tokio::test(start_paused = true)]
    async fn test_mismatched_response_surfaces_error() {
        let controller = controller(Arc::default());
        let ping = ProtocolMessage::originate("PingRequest", vec![], PeerId::new(1));
        controller.send_request(PeerId::new(2), ping.clone()).await.unwrap();

        let wrong = ProtocolMessage::new(
            "PeerNeighborsResponse",
            vec![],
            PeerId::new(2),
            ping.correlation_id,
        );
        let err = controller.handle_inbound(&wrong.encode().unwrap()).unwrap_err();
        assert!(matches!(err, RumorError::TypeMismatch { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_request_rejects_non_request() {
        let controller = controller(Arc::default());
        let pong = ProtocolMessage::originate("PingResponse", vec![], PeerId::new(1));
        let err = controller.send_request(PeerId::new(2), pong).await.unwrap_err();
        assert!(err.is_caller_fault());
        assert_eq!(controller.correlation().pending_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_request_send_is_not_pending() {
        let transport = Arc::new(RecordingTransport {
            fail: true,
            ..RecordingTransport::default()
        });
        let controller = controller(transport);
        let ping = ProtocolMessage::originate("PingRequest", vec![], PeerId::new(1));

        let err = controller.send_request(PeerId::new(2), ping).await.unwrap_err();
        assert!(matches!(err, RumorError::Transport(_)));
        assert_eq!(controller.correlation().pending_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_envelope_is_unwrapped_delivered_and_forwarded() {
        let transport = Arc::new(RecordingTransport::default());
        let controller = controller(transport.clone());
        let mut delivered = controller.subscribe_messages();
        let vote = ProtocolMessage::originate("VoteBroadcast", vec![3], PeerId::new(9));
        let envelope = vote.clone().into_broadcast_envelope(PeerId::new(9)).unwrap();

        let result = controller.handle_inbound(&envelope.encode().unwrap()).unwrap();
        assert_eq!(result, Some(vote.clone()));
        assert_eq!(delivered.recv().await.unwrap(), vote);

        let record = controller.broadcasts().record(&vote.correlation_id).unwrap();
        assert_eq!(record.received_count, 1);
        assert_eq!(record.gossip_count, 5);

        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(transport.sent.lock().unwrap().len(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_garbage_is_serialization_error() {
        let controller = controller(Arc::default());
        let err = controller.handle_inbound(&[0xde, 0xad]).unwrap_err();
        assert_eq!(err.error_type(), "serialization_error");
    }
}
