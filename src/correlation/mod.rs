//! Correlation Layer
//!
//! Matches asynchronous request/response pairs exchanged with peers. A
//! [`CorrelationCache`] keeps each pending exchange alive for a bounded time,
//! [`MessageCorrelationManager`] validates responses against it and publishes
//! unanswered requests on an eviction stream, and
//! [`PeerMessageCorrelationManager`] turns both into peer reputation changes.
pub mod cache;
pub mod correlation_id;
pub mod expiry;
pub mod manager;
pub mod reputation;

pub use cache::{CorrelationCache, Evicted, EvictionReason};
pub use correlation_id::CorrelationId;
pub use expiry::{ExpiryPolicy, FixedExpiry, RecordKind, SettingsExpiry};
pub use manager::{
    Correlatable, EvictionEvent, MessageCorrelationManager, PendingRequest,
    RpcMessageCorrelationManager,
};
pub use reputation::{PeerMessageCorrelationManager, ReputationChange, ReputationEvent};
