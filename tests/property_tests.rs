use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use proptest::prelude::*;

use rumor::correlation::FixedExpiry;
use rumor::error::Result;
use rumor::gossip::{max_gossip_cycles, BroadcastManager, BroadcastRecord};
use rumor::peer::{PeerId, PeerPopulation};
use rumor::protocol::{request_type_for, response_type_for, ProtocolMessage};
use rumor::settings::GossipSettings;
use rumor::transport::Transport;

struct NullTransport;

#[async_trait]
impl Transport for NullTransport {
    async fn send_to_peer(&self, _target: PeerId, _data: Bytes) -> Result<()> {
        Ok(())
    }
}

struct CountedPopulation(usize);

impl PeerPopulation for CountedPopulation {
    fn count(&self) -> usize {
        self.0
    }

    fn sample(&self, n: usize) -> Vec<PeerId> {
        (0..n.min(self.0) as u32).map(PeerId::new).collect()
    }
}

fn gossip_settings(fanout: usize, floor_margin: usize) -> GossipSettings {
    GossipSettings {
        fanout,
        min_network_size: fanout + floor_margin,
        ..GossipSettings::default()
    }
}

proptest! {
    #[test]
    fn test_bound_positive_for_fresh_records(
        network_size in 0usize..1_000_000,
        fanout in 1usize..32,
        floor_margin in 1usize..64,
    ) {
        let settings = gossip_settings(fanout, floor_margin);
        let bound = max_gossip_cycles(&BroadcastRecord::new(network_size), &settings);
        prop_assert!(bound >= 1);
    }

    #[test]
    fn test_bound_never_grows_with_gossip_count(
        network_size in 0usize..100_000,
        gossip_count in 0u32..10_000,
        extra in 1u32..1_000,
    ) {
        let settings = GossipSettings::default();
        let before = BroadcastRecord { gossip_count, ..BroadcastRecord::new(network_size) };
        let after = BroadcastRecord { gossip_count: gossip_count + extra, ..before };
        prop_assert!(max_gossip_cycles(&after, &settings) <= max_gossip_cycles(&before, &settings));
    }

    #[test]
    fn test_bound_is_logarithmic_in_network_size(network_size in 10usize..10_000_000) {
        let settings = GossipSettings::default();
        let bound = max_gossip_cycles(&BroadcastRecord::new(network_size), &settings);
        let expected = ((network_size as f64) / 8.0).ln().ceil() as u32;
        prop_assert_eq!(bound, expected.max(1));
    }

    #[test]
    fn test_broadcast_only_proceeds_below_bound(
        network_size in 0usize..500,
        fanout in 1usize..16,
        floor_margin in 1usize..32,
        calls in 1usize..12,
    ) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .unwrap();
        runtime.block_on(async {
            let settings = gossip_settings(fanout, floor_margin);
            let manager = BroadcastManager::new(
                PeerId::new(u32::MAX),
                settings.clone(),
                Arc::new(FixedExpiry(Duration::from_secs(600))),
                Arc::new(CountedPopulation(network_size)),
                Arc::new(NullTransport),
            )
            .unwrap();
            let message = ProtocolMessage::originate("BlockBroadcast", vec![], PeerId::new(1));
            let id = message.correlation_id;

            for _ in 0..calls {
                let before = manager.record(&id);
                let sent = manager.broadcast(message.clone()).unwrap();
                let after = manager.record(&id).unwrap();

                let gossip_before = before.map(|r| r.gossip_count).unwrap_or(0);
                prop_assert_eq!(after.gossip_count, gossip_before + sent as u32);
                prop_assert!(sent <= fanout);
                if sent > 0 {
                    let bound = max_gossip_cycles(
                        &before.unwrap_or_else(|| BroadcastRecord::new(network_size)),
                        &settings,
                    );
                    prop_assert!(gossip_before < bound);
                }
            }
            Ok(())
        })?;
    }

    #[test]
    fn test_suffix_swap_round_trips(stem in "[A-Z][a-zA-Z]{0,20}") {
        let request = format!("{}Request", stem);
        let response = response_type_for(&request).unwrap();
        prop_assert_eq!(request_type_for(&response).unwrap(), request);
    }
}
